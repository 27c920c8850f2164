//! Request and response values exchanged through a [`Controller`].
//!
//! Typed command responses wrap a [`ControlResponse`] and get the status
//! accessors from the [`Reply`] trait.
//!
//! [`Controller`]: crate::Controller

use crate::error::{is_success_status, ControlError, Result};
use crate::protocol::{LineBuffer, ResponseBuffer};
use std::time::Duration;

/// Default time to wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// An outbound command: one or more lines plus a reply timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    lines: LineBuffer,
    timeout: Duration,
}

impl ControlRequest {
    /// A single-line request with the default timeout.
    pub fn new(line: impl Into<String>) -> Self {
        Self::from_lines(LineBuffer::from(line.into()))
    }

    /// A request made of several lines.
    pub fn from_lines(lines: impl Into<LineBuffer>) -> Self {
        Self {
            lines: lines.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Replace the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long to wait for the reply.
    pub fn response_timeout(&self) -> Duration {
        self.timeout
    }

    /// The lines to send.
    pub fn serialize(&self) -> &LineBuffer {
        &self.lines
    }

    /// The command keyword, for logging.
    pub fn keyword(&self) -> &str {
        self.lines
            .lines()
            .first()
            .and_then(|l| l.split_whitespace().next())
            .unwrap_or("")
    }
}

/// A request paired with the buffer that answered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    request: ControlRequest,
    buffer: ResponseBuffer,
}

impl ControlResponse {
    /// Pair a request with its reply.
    pub fn new(request: ControlRequest, buffer: ResponseBuffer) -> Self {
        Self { request, buffer }
    }

    /// The request that was sent.
    pub fn request(&self) -> &ControlRequest {
        &self.request
    }

    /// The reply buffer.
    pub fn buffer(&self) -> &ResponseBuffer {
        &self.buffer
    }

    /// Take the reply buffer.
    pub fn into_buffer(self) -> ResponseBuffer {
        self.buffer
    }

    /// Status of the end-reply line.
    pub fn status(&self) -> i32 {
        self.buffer.status()
    }

    /// Text of the end-reply line.
    pub fn status_text(&self) -> &str {
        self.buffer.status_text()
    }

    /// False only for 3xx, 4xx and 5xx statuses.
    pub fn is_success(&self) -> bool {
        is_success_status(self.status())
    }

    /// Convert into a `Result`, turning a failure status into
    /// [`ControlError::CommandRejected`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ControlError::CommandRejected {
                code: self.status(),
                message: self.status_text().to_string(),
            })
        }
    }
}

/// Shared accessors for every typed response.
pub trait Reply: From<ControlResponse> {
    /// The wrapped response.
    fn response(&self) -> &ControlResponse;

    /// Status of the end-reply line.
    fn status(&self) -> i32 {
        self.response().status()
    }

    /// Text of the end-reply line.
    fn status_text(&self) -> &str {
        self.response().status_text()
    }

    /// See [`ControlResponse::is_success`].
    fn is_success(&self) -> bool {
        self.response().is_success()
    }

    /// The reply buffer.
    fn buffer(&self) -> &ResponseBuffer {
        self.response().buffer()
    }
}

impl Reply for ControlResponse {
    fn response(&self) -> &ControlResponse {
        self
    }
}
