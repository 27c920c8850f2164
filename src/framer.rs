//! CRLF line framing over an async byte stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Splits a byte stream into terminator-stripped lines.
///
/// A unit that does not end in CRLF (a bare `\n`, or trailing bytes at end
/// of stream) is logged and dropped; the stream is otherwise still trusted.
pub struct LineFramer<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineFramer<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(512),
        }
    }

    /// Wait for the next complete line.
    ///
    /// Returns `None` once the stream ends or fails to read; either way no
    /// further lines will be produced.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            self.buf.clear();

            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => {
                    debug!("End of stream");
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Error reading from control connection: {}", e);
                    return None;
                }
            }

            match self.buf.strip_suffix(b"\r\n") {
                Some(line) => return Some(String::from_utf8_lossy(line).into_owned()),
                None => {
                    warn!(
                        "Protocol error, no CRLF line ending: {:?}",
                        String::from_utf8_lossy(&self.buf)
                    );
                }
            }
        }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
