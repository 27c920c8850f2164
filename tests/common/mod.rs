//! Scripted in-memory control port shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use torc::{BoxedTransport, Dialer};

/// Initialise logging once; `RUST_LOG=torc=debug` shows the session.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Step {
    expect: String,
    reply: String,
    hang_up: bool,
}

/// A control port that expects an exact sequence of request lines.
///
/// Every received line is checked against the next step. A match sends the
/// step's reply; a mismatch answers `510` so the test sees a failure reply.
#[derive(Clone, Default)]
pub struct ScriptedPort {
    steps: Arc<Mutex<VecDeque<Step>>>,
    received: Arc<Mutex<Vec<String>>>,
    dials: Arc<AtomicUsize>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `line` with `reply` (empty sends nothing).
    pub fn expect(self, line: &str, reply: impl Into<String>) -> Self {
        self.push(line, reply.into(), false);
        self
    }

    /// Read `line`, then drop the connection without replying.
    pub fn expect_then_hang_up(self, line: &str) -> Self {
        self.push(line, String::new(), true);
        self
    }

    /// PROTOCOLINFO advertising only NULL, then a successful bare
    /// `AUTHENTICATE`.
    pub fn open_handshake(self) -> Self {
        self.expect("PROTOCOLINFO 1", protocolinfo("NULL", None))
            .expect("AUTHENTICATE", OK)
    }

    fn push(&self, line: &str, reply: String, hang_up: bool) {
        self.steps.lock().unwrap().push_back(Step {
            expect: line.to_string(),
            reply,
            hang_up,
        });
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    pub fn dialer(&self) -> impl Dialer + 'static {
        let port = self.clone();
        move |network: String, _address: String| {
            let port = port.clone();
            async move {
                if network != "tcp" && network != "unix" {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, network));
                }
                port.dials.fetch_add(1, Ordering::SeqCst);
                let (client, server) = tokio::io::duplex(16 * 1024);
                tokio::spawn(port.serve(server));
                Ok::<BoxedTransport, io::Error>(Box::new(client))
            }
        }
    }

    async fn serve(self, stream: DuplexStream) {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            self.received.lock().unwrap().push(line.clone());

            let step = self.steps.lock().unwrap().pop_front();
            let (reply, hang_up) = match step {
                Some(step) if step.expect == line => (step.reply, step.hang_up),
                Some(step) => (
                    format!("510 expected {:?}, got {:?}\r\n", step.expect, line),
                    false,
                ),
                None => (format!("510 unscripted {:?}\r\n", line), false),
            };

            if hang_up {
                return;
            }
            if !reply.is_empty() && write_half.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

pub const OK: &str = "250 OK\r\n";

pub fn protocolinfo(methods: &str, cookie_file: Option<&str>) -> String {
    let auth = match cookie_file {
        Some(path) => format!("250-AUTH METHODS={} COOKIEFILE=\"{}\"\r\n", methods, path),
        None => format!("250-AUTH METHODS={}\r\n", methods),
    };
    format!(
        "250-PROTOCOLINFO 1\r\n{}250-VERSION Tor=\"0.4.8.10\"\r\n250 OK\r\n",
        auth
    )
}
