//! Asynchronous events.
//!
//! The server may send 6xx messages at any time once events are subscribed
//! with SETEVENTS. They share the stream with command replies and are parsed
//! the same way; the controller sets them aside instead of treating them as
//! the answer to a request.

use crate::error::StatusClass;
use crate::protocol::{parse_key_value_pairs, ResponseBuffer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Commonly subscribed event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Circuit status changed.
    Circ,
    /// Stream status changed.
    Stream,
    /// OR connection status changed.
    OrConn,
    /// Bandwidth used in the last second.
    Bw,
    /// Notice log message.
    Notice,
    /// Warning log message.
    Warn,
    /// Error log message.
    Error,
    /// Network status changed.
    Ns,
    /// Signal received.
    Signal,
    /// Configuration changed.
    ConfChanged,
    /// Client status event.
    StatusClient,
    /// Network liveness changed.
    NetworkLiveness,
}

impl EventType {
    /// Get the event name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Circ => "CIRC",
            EventType::Stream => "STREAM",
            EventType::OrConn => "ORCONN",
            EventType::Bw => "BW",
            EventType::Notice => "NOTICE",
            EventType::Warn => "WARN",
            EventType::Error => "ERR",
            EventType::Ns => "NS",
            EventType::Signal => "SIGNAL",
            EventType::ConfChanged => "CONF_CHANGED",
            EventType::StatusClient => "STATUS_CLIENT",
            EventType::NetworkLiveness => "NETWORK_LIVENESS",
        }
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CIRC" => Ok(EventType::Circ),
            "STREAM" => Ok(EventType::Stream),
            "ORCONN" => Ok(EventType::OrConn),
            "BW" => Ok(EventType::Bw),
            "NOTICE" => Ok(EventType::Notice),
            "WARN" => Ok(EventType::Warn),
            "ERR" => Ok(EventType::Error),
            "NS" => Ok(EventType::Ns),
            "SIGNAL" => Ok(EventType::Signal),
            "CONF_CHANGED" => Ok(EventType::ConfChanged),
            "STATUS_CLIENT" => Ok(EventType::StatusClient),
            "NETWORK_LIVENESS" => Ok(EventType::NetworkLiveness),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// An unsolicited 6xx message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Status code, 600-699.
    pub code: i32,
    /// Event name, the first word of the event's first line.
    pub name: String,
    /// The rest of the first line.
    pub data: String,
    /// The complete message.
    pub buffer: ResponseBuffer,
}

impl Event {
    /// Wrap a buffer if its status marks it as asynchronous.
    pub fn from_buffer(buffer: ResponseBuffer) -> Option<Self> {
        if StatusClass::of(buffer.status()) != StatusClass::Asynchronous {
            return None;
        }

        // Multi-line events put the name on the first mid-reply or data
        // line; single-line ones on the end line.
        let first = buffer
            .mid_reply_lines
            .first()
            .map(|l| l.text.as_str())
            .or_else(|| buffer.data_reply_lines.first().map(|l| l.text.as_str()))
            .unwrap_or_else(|| buffer.status_text());

        let (name, data) = match first.split_once(' ') {
            Some((name, data)) => (name.to_string(), data.to_string()),
            None => (first.to_string(), String::new()),
        };

        Some(Self {
            code: buffer.status(),
            name,
            data,
            buffer,
        })
    }

    /// The known event type, if the name is one.
    pub fn event_type(&self) -> Option<EventType> {
        self.name.parse().ok()
    }

    /// `KEY=VALUE` pairs found in the first line.
    pub fn fields(&self) -> HashMap<String, String> {
        parse_key_value_pairs(&self.data)
    }
}
