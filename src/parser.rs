//! Reply parser state machine.
//!
//! Lines are classified by their 3-digit status code and the separator that
//! follows it. Mid-reply lines and data blocks accumulate into the buffer in
//! progress; an end-reply line completes it. The parser has no notion of
//! which request a message answers. Correlation is the controller's job.

use crate::protocol::{
    DataReplyLine, EndReplyLine, LineError, LineKind, MidReplyLine, ReplyLine, ResponseBuffer,
    END_OF_DATA,
};
use tracing::{debug, error, warn};

#[cfg(feature = "tokio-runtime")]
use crate::framer::LineFramer;
#[cfg(feature = "tokio-runtime")]
use tokio::{io::AsyncBufRead, sync::mpsc};

/// Parser state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Waiting for a status line.
    Ready,
    /// Accumulating the body of the most recent data reply.
    InDataBlock(DataReplyLine),
}

/// Builds [`ResponseBuffer`]s from framed lines.
#[derive(Debug)]
pub struct Parser {
    state: State,
    mid_reply_lines: Vec<MidReplyLine>,
    data_reply_lines: Vec<DataReplyLine>,
    log_comms: bool,
}

impl Parser {
    /// Create a parser. With `log_comms` set, every completed message is
    /// logged line by line under the `torc::comms` target.
    pub fn new(log_comms: bool) -> Self {
        Self {
            state: State::Ready,
            mid_reply_lines: Vec::new(),
            data_reply_lines: Vec::new(),
            log_comms,
        }
    }

    /// Current state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Whether the parser is between status lines.
    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    /// Discard everything accumulated for the message in progress.
    pub fn reset(&mut self) {
        self.state = State::Ready;
        self.mid_reply_lines.clear();
        self.data_reply_lines.clear();
    }

    /// Feed one terminator-stripped line. Returns the completed buffer when
    /// the line was an end-reply line.
    pub fn feed(&mut self, line: &str) -> Option<ResponseBuffer> {
        if let State::InDataBlock(block) = &mut self.state {
            if line != END_OF_DATA {
                block.body.push(line.to_string());
                return None;
            }

            if let State::InDataBlock(block) = std::mem::replace(&mut self.state, State::Ready) {
                self.data_reply_lines.push(block);
            }
            return None;
        }

        let reply = match ReplyLine::parse(line) {
            Ok(reply) => reply,
            Err(LineError::Malformed(line)) => {
                warn!("Discarding unparseable reply line: {:?}", line);
                return None;
            }
            Err(e @ LineError::UnknownSeparator { .. }) => {
                error!("Failed to classify reply line, resetting message: {}", e);
                self.reset();
                return None;
            }
        };

        match reply.kind {
            LineKind::Mid => {
                self.mid_reply_lines
                    .push(MidReplyLine::new(reply.status, reply.text));
                None
            }
            LineKind::Data => {
                self.state = State::InDataBlock(DataReplyLine::new(reply.status, reply.text));
                None
            }
            LineKind::End => Some(self.complete(EndReplyLine::new(reply.status, reply.text))),
        }
    }

    fn complete(&mut self, end_reply_line: EndReplyLine) -> ResponseBuffer {
        let buffer = ResponseBuffer::new(
            std::mem::take(&mut self.mid_reply_lines),
            std::mem::take(&mut self.data_reply_lines),
            end_reply_line,
        );

        if self.log_comms {
            for line in buffer.raw_lines() {
                debug!(target: "torc::comms", ">> {}", line);
            }
        }

        buffer
    }

    /// Drive the parser from `framer` until the stream ends or `out` is
    /// closed, handing every completed buffer to `out`.
    ///
    /// `out` should have capacity 1 so at most one completed message waits
    /// for a consumer.
    #[cfg(feature = "tokio-runtime")]
    pub async fn run<R>(mut self, mut framer: LineFramer<R>, out: mpsc::Sender<ResponseBuffer>)
    where
        R: AsyncBufRead + Unpin,
    {
        while let Some(line) = framer.next_line().await {
            if let Some(buffer) = self.feed(&line) {
                if out.send(buffer).await.is_err() {
                    debug!("Reply receiver dropped, stopping parser");
                    return;
                }
            }
        }

        if !self.is_ready() || !self.mid_reply_lines.is_empty() {
            debug!("Stream ended inside an unfinished message");
        }
        debug!("Parser stopped");
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(false)
    }
}
