//! End-to-end session tests against a scripted in-memory control port.
//!
//! Each test plugs a [`common::ScriptedPort`] into the controller through a
//! dialer, so the full stack runs: framer, parser task, request correlation
//! and authentication.

mod common;

use common::{protocolinfo, ScriptedPort, OK};
use std::time::Duration;
use torc::{
    AuthMethod, ControlError, ControlRequest, Controller, ControllerConfig, EventType, Reply,
    Signal,
};

async fn connected(port: &ScriptedPort) -> Controller {
    common::init_tracing();
    let mut controller =
        Controller::with_dialer(ControllerConfig::default().log_comms(true), port.dialer());
    controller.connect().await.expect("handshake should succeed");
    controller
}

// ============================================================================
// Connection Tests
// ============================================================================

mod connection {
    use super::*;

    #[tokio::test]
    async fn test_connect_authenticates() {
        let port = ScriptedPort::new().open_handshake();
        let controller = connected(&port).await;

        assert!(controller.is_connected());
        assert!(controller.is_authenticated());
        assert_eq!(controller.authenticator(), Some(AuthMethod::Null));
        assert_eq!(port.received(), vec!["PROTOCOLINFO 1", "AUTHENTICATE"]);
    }

    #[tokio::test]
    async fn test_connect_twice_dials_once() {
        let port = ScriptedPort::new().open_handshake();
        let mut controller = connected(&port).await;

        controller.connect().await.unwrap();
        assert_eq!(port.dial_count(), 1);
        assert_eq!(port.remaining(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_close() {
        let port = ScriptedPort::new().open_handshake().open_handshake();
        let mut controller = connected(&port).await;

        controller.close().await;
        assert!(!controller.is_connected());
        assert!(!controller.is_authenticated());

        controller.connect().await.unwrap();
        assert!(controller.is_authenticated());
        assert_eq!(port.dial_count(), 2);
    }

    #[tokio::test]
    async fn test_request_after_close() {
        let port = ScriptedPort::new().open_handshake();
        let mut controller = connected(&port).await;
        controller.close().await;
        controller.close().await;

        let err = controller.get_info(["version"]).await.unwrap_err();
        assert!(matches!(err, ControlError::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_with_explicit_dialer() {
        let port = ScriptedPort::new().open_handshake();
        let mut controller = Controller::new(ControllerConfig::default());

        controller.connect_with(&port.dialer()).await.unwrap();
        assert!(controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_dial_error_is_connection_failed() {
        let port = ScriptedPort::new();
        let config = ControllerConfig::default();
        let mut controller = Controller::with_dialer(config, port.dialer());

        let refused = |_: String, _: String| async {
            Err::<torc::BoxedTransport, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
        };
        let err = controller.connect_with(&refused).await.unwrap_err();
        assert!(matches!(err, ControlError::ConnectionFailed(ref m) if m.contains("refused")));
        assert!(!controller.is_connected());
        assert_eq!(port.dial_count(), 0);
    }

    #[tokio::test]
    async fn test_server_hang_up_closes_session() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect_then_hang_up("GETINFO version");
        let mut controller = connected(&port).await;

        let err = controller.get_info(["version"]).await.unwrap_err();
        assert!(matches!(err, ControlError::ConnectionClosed));
        assert!(!controller.is_connected());
        assert!(!controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_quit_closes_session() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("QUIT", "250 closing connection\r\n");
        let mut controller = connected(&port).await;

        controller.quit().await.unwrap();
        assert!(!controller.is_connected());
    }
}

// ============================================================================
// Authentication Tests
// ============================================================================

mod authentication {
    use super::*;

    #[tokio::test]
    async fn test_cookie_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let cookie = dir.path().join("control_auth_cookie");
        std::fs::write(&cookie, [0xABu8; 32]).unwrap();
        let cookie_path = cookie.to_str().unwrap();

        let port = ScriptedPort::new()
            .expect(
                "PROTOCOLINFO 1",
                protocolinfo("COOKIE,SAFECOOKIE,NULL", Some(cookie_path)),
            )
            .expect(&format!("AUTHENTICATE {}", "ab".repeat(32)), OK);
        let controller = connected(&port).await;

        assert_eq!(controller.authenticator(), Some(AuthMethod::Cookie));
        assert!(controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_configured_cookie_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cookie = dir.path().join("my_cookie");
        std::fs::write(&cookie, [0x01u8; 32]).unwrap();

        let port = ScriptedPort::new()
            .expect("PROTOCOLINFO 1", protocolinfo("COOKIE", Some("/nonexistent/cookie")))
            .expect(&format!("AUTHENTICATE {}", "01".repeat(32)), OK);

        let config = ControllerConfig::default().cookie_file(&cookie);
        let mut controller = Controller::with_dialer(config, port.dialer());
        controller.connect().await.unwrap();
        assert!(controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_unreadable_cookie_aborts_connect() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing_cookie");

        let port = ScriptedPort::new().expect(
            "PROTOCOLINFO 1",
            protocolinfo("COOKIE", Some(missing.to_str().unwrap())),
        );
        let mut controller = Controller::with_dialer(ControllerConfig::default(), port.dialer());

        let err = controller.connect().await.unwrap_err();
        match err {
            ControlError::CookieFile { path, source } => {
                assert_eq!(path, missing);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected cookie error, got {:?}", other),
        }
        assert!(!controller.is_connected());
        assert_eq!(port.received(), vec!["PROTOCOLINFO 1"]);
    }

    #[tokio::test]
    async fn test_password_authentication() {
        let port = ScriptedPort::new()
            .expect("PROTOCOLINFO 1", protocolinfo("HASHEDPASSWORD", None))
            .expect(r#"AUTHENTICATE "s3cret \"quoted\"""#, OK);

        let config = ControllerConfig::default().password(r#"s3cret "quoted""#);
        let mut controller = Controller::with_dialer(config, port.dialer());
        controller.connect().await.unwrap();

        assert_eq!(controller.authenticator(), Some(AuthMethod::HashedPassword));
        assert!(controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_password_required_but_missing() {
        let port = ScriptedPort::new()
            .expect("PROTOCOLINFO 1", protocolinfo("HASHEDPASSWORD", None));
        let mut controller = Controller::with_dialer(ControllerConfig::default(), port.dialer());

        let err = controller.connect().await.unwrap_err();
        assert!(err.is_auth_failure());
        assert!(!controller.is_connected());
        assert_eq!(port.received(), vec!["PROTOCOLINFO 1"]);
    }

    #[tokio::test]
    async fn test_rejected_authentication() {
        let port = ScriptedPort::new()
            .expect("PROTOCOLINFO 1", protocolinfo("HASHEDPASSWORD", None))
            .expect(
                "AUTHENTICATE \"wrong\"",
                "515 Authentication failed: Password did not match HashedControlPassword value\r\n",
            );

        let config = ControllerConfig::default().password("wrong");
        let mut controller = Controller::with_dialer(config, port.dialer());

        let err = controller.connect().await.unwrap_err();
        assert!(matches!(err, ControlError::AuthenticationFailed(ref m) if m.contains("515")));
        assert!(!controller.is_authenticated());
        assert!(!controller.is_connected());
        assert_eq!(controller.authenticator(), None);
    }

    #[tokio::test]
    async fn test_preference_order_decides() {
        let port = ScriptedPort::new()
            .expect("PROTOCOLINFO 1", protocolinfo("COOKIE,NULL", Some("/unused")))
            .expect("AUTHENTICATE", OK);

        let config = ControllerConfig::default().auth_preferences([AuthMethod::Null, AuthMethod::Cookie]);
        let mut controller = Controller::with_dialer(config, port.dialer());
        controller.connect().await.unwrap();

        assert_eq!(controller.authenticator(), Some(AuthMethod::Null));
    }

    #[tokio::test]
    async fn test_no_compatible_method() {
        let port = ScriptedPort::new()
            .expect("PROTOCOLINFO 1", protocolinfo("SAFECOOKIE", Some("/unused")));
        let mut controller = Controller::with_dialer(ControllerConfig::default(), port.dialer());

        let err = controller.connect().await.unwrap_err();
        assert!(matches!(err, ControlError::NoCompatibleAuthMethod(ref m) if m == "SAFECOOKIE"));
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn test_safe_cookie_is_not_implemented() {
        let port = ScriptedPort::new()
            .expect("PROTOCOLINFO 1", protocolinfo("SAFECOOKIE,NULL", Some("/unused")));

        let config = ControllerConfig::default().auth_preferences([AuthMethod::SafeCookie]);
        let mut controller = Controller::with_dialer(config, port.dialer());

        let err = controller.connect().await.unwrap_err();
        assert!(matches!(err, ControlError::NotImplemented(_)));
        assert!(!controller.is_connected());
        assert_eq!(port.received(), vec!["PROTOCOLINFO 1"]);
    }

    #[tokio::test]
    async fn test_protocol_info_accessors() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("PROTOCOLINFO 1", protocolinfo("COOKIE,HASHEDPASSWORD", Some("/run/tor/cookie")));
        let mut controller = connected(&port).await;

        let info = controller.protocol_info().await.unwrap();
        assert_eq!(info.protocol(), Some(1));
        assert_eq!(info.auth_methods(), vec!["COOKIE", "HASHEDPASSWORD"]);
        assert_eq!(info.auth_cookie_file().as_deref(), Some("/run/tor/cookie"));
        assert_eq!(info.version().get("Tor").map(String::as_str), Some("0.4.8.10"));
    }
}

// ============================================================================
// Request/Response Tests
// ============================================================================

mod requests {
    use super::*;

    #[tokio::test]
    async fn test_get_info_with_data_block() {
        let port = ScriptedPort::new().open_handshake().expect(
            "GETINFO version config-text",
            "250-version=0.4.8.10\r\n250+config-text=\r\nSocksPort 9050\r\nControlPort 9051\r\n.\r\n250 OK\r\n",
        );
        let mut controller = connected(&port).await;

        let info = controller.get_info(["version", "config-text"]).await.unwrap();
        assert!(info.is_success());
        assert_eq!(info.value().as_deref(), Some("0.4.8.10"));
        assert_eq!(
            info.value_of("config-text").as_deref(),
            Some("SocksPort 9050\nControlPort 9051")
        );
    }

    #[tokio::test]
    async fn test_get_conf() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("GETCONF SocksPort", "250 SocksPort=9050\r\n")
            .expect(
                "GETCONF SocksPort ORPort",
                "250-SocksPort=9050\r\n250 ORPort\r\n",
            );
        let mut controller = connected(&port).await;

        let conf = controller.get_conf(["SocksPort"]).await.unwrap();
        assert_eq!(conf.value().as_deref(), Some("9050"));

        let conf = controller.get_conf(["SocksPort", "ORPort"]).await.unwrap();
        let values = conf.values();
        assert_eq!(values["SocksPort"], "9050");
        assert_eq!(values["ORPort"], "");
    }

    #[tokio::test]
    async fn test_rejected_command_is_still_a_reply() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("GETINFO bogus", "552 Unrecognized key \"bogus\"\r\n");
        let mut controller = connected(&port).await;

        let info = controller.get_info(["bogus"]).await.unwrap();
        assert!(!info.is_success());
        assert_eq!(info.status(), 552);
        assert!(controller.is_connected());
    }

    #[tokio::test]
    async fn test_signal_rejection_is_an_error() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("SIGNAL NEWNYM", OK)
            .expect("SIGNAL DORMANT", "552 Unrecognized signal code \"DORMANT\"\r\n");
        let mut controller = connected(&port).await;

        controller.signal(Signal::Newnym).await.unwrap();
        let err = controller.signal(Signal::Dormant).await.unwrap_err();
        assert!(matches!(err, ControlError::CommandRejected { code: 552, .. }));
    }

    #[tokio::test]
    async fn test_multi_line_request() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("+LOADCONF", "")
            .expect("SocksPort 9050", "")
            .expect(".", OK);
        let mut controller = connected(&port).await;

        let request = ControlRequest::from_lines(vec![
            "+LOADCONF".to_string(),
            "SocksPort 9050".to_string(),
            ".".to_string(),
        ]);
        let reply = controller.request(&request).await.unwrap();
        assert!(reply.is_success());
        assert_eq!(port.remaining(), 0);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let port = ScriptedPort::new().open_handshake().expect(
            "GETINFO version",
            "250-version=0.4.8.10\r\nXYZ not a reply\r\n250-bare=lf\n250 OK\r\n",
        );
        let mut controller = connected(&port).await;

        let info = controller.get_info(["version"]).await.unwrap();
        let values = info.values();
        assert_eq!(values.len(), 1);
        assert_eq!(values["version"], "0.4.8.10");
    }

    #[tokio::test]
    async fn test_unknown_separator_discards_partial_reply() {
        let port = ScriptedPort::new().open_handshake().expect(
            "GETINFO fresh",
            "250-stale=1\r\n250*oops\r\n250-fresh=2\r\n250 OK\r\n",
        );
        let mut controller = connected(&port).await;

        let info = controller.get_info(["fresh"]).await.unwrap();
        assert_eq!(info.value().as_deref(), Some("2"));
        assert_eq!(info.value_of("stale"), None);
    }

    #[tokio::test]
    async fn test_empty_key_list_is_rejected_locally() {
        let port = ScriptedPort::new().open_handshake();
        let mut controller = connected(&port).await;

        let err = controller.get_info(Vec::<String>::new()).await.unwrap_err();
        assert!(matches!(err, ControlError::ConfigurationError(_)));
        assert_eq!(port.received().len(), 2);
    }
}

// ============================================================================
// Timeout and Late Reply Tests
// ============================================================================

mod timeouts {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_reply_is_discarded() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("GETINFO slow", "")
            .expect(
                "GETINFO version",
                "250-slow=late\r\n250 OK\r\n250-version=0.4.8.10\r\n250 OK\r\n",
            );
        let mut controller = connected(&port).await;

        let started = tokio::time::Instant::now();
        let err = controller.get_info(["slow"]).await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, ControlError::Timeout(d) if d == Duration::from_secs(5)));
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_millis(5100));
        assert!(controller.is_connected());
        assert_eq!(controller.pending_late_replies(), 1);

        let info = controller.get_info(["version"]).await.unwrap();
        assert_eq!(info.value().as_deref(), Some("0.4.8.10"));
        assert_eq!(controller.pending_late_replies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_recovers_from_lost_reply() {
        let version = "250-version=0.4.8.10\r\n250 OK\r\n";
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("GETINFO lost", "250 OK\n")
            .expect("GETINFO version", version)
            .expect("GETINFO version", version)
            .expect("GETINFO version", version);
        let mut controller = connected(&port).await;

        assert!(controller.get_info(["lost"]).await.unwrap_err().is_timeout());
        assert_eq!(controller.pending_late_replies(), 1);

        // The first reply after the loss is taken as the owed one.
        assert!(controller.get_info(["version"]).await.unwrap_err().is_timeout());
        assert_eq!(controller.pending_late_replies(), 0);

        for _ in 0..2 {
            let info = controller.get_info(["version"]).await.unwrap();
            assert_eq!(info.value().as_deref(), Some("0.4.8.10"));
            assert_eq!(controller.pending_late_replies(), 0);
        }
        assert!(controller.is_connected());
        assert_eq!(port.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_request_timeout() {
        let port = ScriptedPort::new().open_handshake().expect("GETINFO slow", "");
        let mut controller = connected(&port).await;

        let request = ControlRequest::new("GETINFO slow").with_timeout(Duration::from_millis(250));
        let started = tokio::time::Instant::now();
        let err = controller.request(&request).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_forgets_late_replies() {
        let port = ScriptedPort::new().open_handshake().expect("GETINFO slow", "");
        let mut controller = connected(&port).await;

        assert!(controller.get_info(["slow"]).await.is_err());
        controller.close().await;
        assert_eq!(controller.pending_late_replies(), 0);
    }
}

// ============================================================================
// Event Tests
// ============================================================================

mod events {
    use super::*;

    #[tokio::test]
    async fn test_events_do_not_answer_requests() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("SETEVENTS CIRC BW", OK)
            .expect(
                "GETINFO version",
                "650 BW 1024 2048\r\n650 CIRC 7 CLOSED REASON=FINISHED\r\n250-version=0.4.8.10\r\n250 OK\r\n",
            );
        let mut controller = connected(&port).await;

        controller.set_events([EventType::Circ, EventType::Bw]).await.unwrap();
        let info = controller.get_info(["version"]).await.unwrap();
        assert_eq!(info.value().as_deref(), Some("0.4.8.10"));

        let events = controller.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), Some(EventType::Bw));
        assert_eq!(events[0].data, "1024 2048");
        assert_eq!(events[1].name, "CIRC");
        assert_eq!(events[1].fields().get("REASON").map(String::as_str), Some("FINISHED"));

        assert!(controller.take_events().is_empty());
    }

    #[tokio::test]
    async fn test_event_after_reply_is_kept() {
        let port = ScriptedPort::new()
            .open_handshake()
            .expect("SIGNAL NEWNYM", "250 OK\r\n650 SIGNAL NEWNYM\r\n")
            .expect("GETINFO version", "250-version=0.4.8.10\r\n250 OK\r\n");
        let mut controller = connected(&port).await;

        controller.signal(Signal::Newnym).await.unwrap();
        let info = controller.get_info(["version"]).await.unwrap();
        assert_eq!(info.value().as_deref(), Some("0.4.8.10"));

        let events = controller.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), Some(EventType::Signal));
    }
}
