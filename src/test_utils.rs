//! # Test utilities
//!
//! Reply builders, wire fixtures, and an in-memory control port for testing
//! code built on this crate.
//!
//! Enable this module in other crates with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! torc = { version = "0.1", features = ["test-utils"] }
//! ```
//!
//! ## Mock control port
//!
//! ```rust,ignore
//! use torc::test_utils::{fixtures, MockControlPort};
//! use torc::{Controller, ControllerConfig};
//!
//! let port = MockControlPort::new(|line| match line {
//!     "PROTOCOLINFO 1" => fixtures::protocolinfo_response("NULL", None),
//!     _ => fixtures::ok_response(),
//! });
//!
//! let mut controller = Controller::with_dialer(ControllerConfig::default(), port.dialer());
//! controller.connect().await?;
//! ```

/// Canned wire text. Every function returns complete CRLF-terminated lines.
pub mod fixtures {
    use super::MockReply;

    /// `250 OK`.
    pub fn ok_response() -> String {
        MockReply::ok().build()
    }

    /// PROTOCOLINFO reply advertising `methods` (comma separated).
    pub fn protocolinfo_response(methods: &str, cookie_file: Option<&str>) -> String {
        let auth = match cookie_file {
            Some(path) => format!("AUTH METHODS={} COOKIEFILE=\"{}\"", methods, path),
            None => format!("AUTH METHODS={}", methods),
        };

        MockReply::new()
            .mid("PROTOCOLINFO 1")
            .mid(&auth)
            .mid("VERSION Tor=\"0.4.8.10\"")
            .finish()
            .build()
    }

    /// GETINFO version reply.
    pub fn version_response() -> String {
        MockReply::new().mid("version=0.4.8.10").finish().build()
    }

    /// Single-line GETCONF SocksPort reply.
    pub fn socksport_response() -> String {
        MockReply::new().end(250, "SocksPort=9050").build()
    }

    /// Bandwidth event.
    pub fn bandwidth_event() -> String {
        MockReply::new().end(650, "BW 1024 2048").build()
    }

    /// Circuit event with key/value fields.
    pub fn circuit_closed_event() -> String {
        MockReply::new().end(650, "CIRC 12345 CLOSED REASON=FINISHED").build()
    }

    /// Authentication rejection.
    pub fn auth_rejected_response() -> String {
        MockReply::error(515, "Authentication failed: Password did not match").build()
    }

    /// Unknown command.
    pub fn unrecognized_response(keyword: &str) -> String {
        MockReply::error(510, &format!("Unrecognized command \"{}\"", keyword)).build()
    }
}

/// Builder for wire-format replies.
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    lines: Vec<String>,
}

impl MockReply {
    /// Create a new empty reply.
    pub fn new() -> Self {
        Self::default()
    }

    /// `250 OK`.
    pub fn ok() -> Self {
        Self::new().end(250, "OK")
    }

    /// A single end-reply line with `code`.
    pub fn error(code: u16, message: &str) -> Self {
        Self::new().end(code, message)
    }

    /// Add a `250-` line.
    pub fn mid(mut self, text: &str) -> Self {
        self.lines.push(format!("250-{}", text));
        self
    }

    /// Add a `250+` line followed by `body` and the `.` terminator.
    pub fn data(mut self, text: &str, body: &[&str]) -> Self {
        self.lines.push(format!("250+{}", text));
        self.lines.extend(body.iter().map(|l| l.to_string()));
        self.lines.push(".".to_string());
        self
    }

    /// Add an arbitrary raw line.
    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// Add an end-reply line.
    pub fn end(mut self, code: u16, text: &str) -> Self {
        self.lines.push(format!("{:03} {}", code, text));
        self
    }

    /// Add the closing `250 OK`.
    pub fn finish(self) -> Self {
        self.end(250, "OK")
    }

    /// Build the reply as a string.
    pub fn build(&self) -> String {
        self.lines.iter().map(|l| format!("{}\r\n", l)).collect()
    }

    /// Build the reply as bytes.
    pub fn as_bytes(&self) -> Vec<u8> {
        self.build().into_bytes()
    }
}

#[cfg(feature = "tokio-runtime")]
pub use self::mock_port::MockControlPort;

#[cfg(feature = "tokio-runtime")]
mod mock_port {
    use crate::dialer::{BoxedTransport, Dialer};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    type Handler = Box<dyn FnMut(&str) -> String + Send>;

    /// An in-memory control port.
    ///
    /// Each dial opens a fresh duplex stream served by a spawned task. The
    /// task passes every received line to the handler and writes back
    /// whatever it returns; an empty string sends nothing.
    #[derive(Clone)]
    pub struct MockControlPort {
        handler: Arc<Mutex<Handler>>,
        received: Arc<Mutex<Vec<String>>>,
        dials: Arc<AtomicUsize>,
    }

    impl MockControlPort {
        /// Create a port answering with `handler`.
        pub fn new<F>(handler: F) -> Self
        where
            F: FnMut(&str) -> String + Send + 'static,
        {
            Self {
                handler: Arc::new(Mutex::new(Box::new(handler))),
                received: Arc::new(Mutex::new(Vec::new())),
                dials: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Lines received so far, across all connections.
        pub fn received(&self) -> Vec<String> {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// How many times the port was dialed.
        pub fn dial_count(&self) -> usize {
            self.dials.load(Ordering::SeqCst)
        }

        /// A dialer connecting to this port regardless of address.
        pub fn dialer(&self) -> impl Dialer + 'static {
            let port = self.clone();
            move |_network: String, _address: String| {
                let port = port.clone();
                async move { Ok::<BoxedTransport, io::Error>(port.open()) }
            }
        }

        fn open(&self) -> BoxedTransport {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let (client, server) = tokio::io::duplex(16 * 1024);
            tokio::spawn(self.clone().serve(server));
            Box::new(client)
        }

        async fn serve(self, stream: DuplexStream) {
            let (read_half, mut write_half) = tokio::io::split(stream);
            let mut lines = BufReader::new(read_half).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                self.received
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(line.clone());

                let reply = {
                    let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
                    (&mut **handler)(&line)
                };

                if reply.is_empty() {
                    continue;
                }
                if write_half.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    }
}
