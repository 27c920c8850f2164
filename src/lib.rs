//! # torc
//!
//! An async client session for the Tor control protocol.
//!
//! The crate covers the session layer of a control-port client:
//!
//! - Splitting the inbound stream into CRLF lines and assembling them into
//!   complete replies (mid-reply lines, data blocks, end-reply line)
//! - Pairing each request with its reply under a per-request timeout
//! - Picking an authentication method from what the server advertises and
//!   running it (cookie, password, or open access)
//! - A few typed commands on top (PROTOCOLINFO, GETINFO, GETCONF, SIGNAL,
//!   SETEVENTS, QUIT)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use torc::{Controller, ControllerConfig, Reply, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ControllerConfig::new().tcp("127.0.0.1:9051").with_env();
//!     let mut controller = Controller::new(config);
//!
//!     // Dial, discover auth methods, authenticate
//!     controller.connect().await?;
//!
//!     let info = controller.get_info(["version"]).await?;
//!     if info.is_success() {
//!         println!("Connected to Tor {}", info.value().unwrap_or_default());
//!     }
//!
//!     controller.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Raw requests
//!
//! Anything not modelled as a typed command can be sent as a
//! [`ControlRequest`]. The reply comes back as a [`ResponseBuffer`]:
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use torc::ControlRequest;
//!
//! # async fn example(controller: &mut torc::Controller) -> torc::Result<()> {
//! let request = ControlRequest::new("GETINFO traffic/read traffic/written")
//!     .with_timeout(Duration::from_secs(2));
//! let reply = controller.request(&request).await?;
//!
//! for (key, value) in reply.values() {
//!     println!("{} = {}", key, value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Only one request may be outstanding at a time; every session operation
//! takes `&mut self`.
//!
//! ## Logging
//!
//! Diagnostics go through `tracing`. Raw wire traffic is logged at debug
//! level under the `torc::comms` target when
//! [`ControllerConfig::log_comms`] is set, or when `TORC_LOG_COMMS` is
//! non-empty and [`ControllerConfig::with_env`] was applied.
//!
//! ## Feature Flags
//!
//! - `tokio-runtime` (default): the controller, framer, dialer and every
//!   async operation. Without it only the value types, the synchronous
//!   parser and authenticator selection are built.
//! - `test-utils`: reply builders, fixtures and an in-memory control port.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod parser;
pub mod protocol;

#[cfg(feature = "tokio-runtime")]
pub mod controller;
#[cfg(feature = "tokio-runtime")]
pub mod dialer;
#[cfg(feature = "tokio-runtime")]
pub mod framer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main types for convenience
pub use error::{is_success_status, ControlError, Result, StatusClass};

#[cfg(feature = "tokio-runtime")]
pub use controller::Controller;
#[cfg(feature = "tokio-runtime")]
pub use dialer::{BoxedTransport, Dialer, TcpDialer, Transport};

pub use auth::{select_authenticator, AuthMethod, ProtocolInfo};
pub use commands::{GetConfResponse, GetInfoResponse, Signal};
pub use config::{ConnectionAddress, ControllerConfig};
pub use events::{Event, EventType};
pub use message::{ControlRequest, ControlResponse, Reply};
pub use parser::Parser;
pub use protocol::{
    parse_key_value_pairs, quote_string, DataReplyLine, EndReplyLine, LineBuffer, MidReplyLine,
    ResponseBuffer,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
