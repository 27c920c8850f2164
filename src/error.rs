//! Error types for the control session.
//!
//! Framing and classification problems on the inbound stream are recovered
//! inside the parser and never show up here. Everything else is returned from
//! the operation that was attempted.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for all control session operations.
#[derive(Error, Debug)]
pub enum ControlError {
    /// I/O error occurred during communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation needing a connection was attempted without one.
    #[error("Not connected")]
    NotConnected,

    /// The reader stopped while a reply was still awaited.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// No reply arrived within the request's timeout.
    #[error("Timed out after {0:?} waiting for reply")]
    Timeout(Duration),

    /// None of the preferred authentication methods was advertised.
    #[error("No compatible authentication method (server offered: {0})")]
    NoCompatibleAuthMethod(String),

    /// The chosen authentication exchange did not succeed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The authentication cookie could not be read.
    #[error("Failed to read cookie file '{}': {source}", path.display())]
    CookieFile {
        /// Path that was read.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: io::Error,
    },

    /// The requested functionality is declared but not implemented.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// Command was rejected by the server.
    #[error("Command rejected (code {code}): {message}")]
    CommandRejected {
        /// The status code of the end-reply line.
        code: i32,
        /// The end-reply line's text.
        message: String,
    },

    /// Protocol error - unexpected response content.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl ControlError {
    /// Returns true if this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ControlError::Timeout(_))
    }

    /// Returns true if this error came out of authentication negotiation.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ControlError::NoCompatibleAuthMethod(_)
                | ControlError::AuthenticationFailed(_)
                | ControlError::CookieFile { .. }
                | ControlError::NotImplemented(_)
        )
    }
}

/// Result type alias for control session operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Status code family, keyed on the first digit.
///
/// ```text
/// 2yz  positive completion
/// 4yz  temporary negative completion
/// 5yz  permanent negative completion
/// 6yz  asynchronous reply
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2yz - command succeeded.
    Positive,
    /// 4yz - command failed but may be retried later.
    TemporaryNegative,
    /// 5yz - command failed and should not be retried as-is.
    PermanentNegative,
    /// 6yz - unsolicited event.
    Asynchronous,
    /// Anything else, including the unparsed sentinel.
    Other,
}

impl StatusClass {
    /// Classify a status code.
    pub fn of(status: i32) -> Self {
        match status {
            200..=299 => StatusClass::Positive,
            400..=499 => StatusClass::TemporaryNegative,
            500..=599 => StatusClass::PermanentNegative,
            600..=699 => StatusClass::Asynchronous,
            _ => StatusClass::Other,
        }
    }
}

/// Success rule for status codes: only the 300-599 range is failure.
///
/// Unparsed codes (the `-1` sentinel) and anything outside that range,
/// including async 6yz codes, count as success.
pub fn is_success_status(status: i32) -> bool {
    !(300..=599).contains(&status)
}
