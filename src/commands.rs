//! Typed commands.
//!
//! Only a handful of commands are modelled. Each typed response wraps the
//! shared [`ControlResponse`] and reads what it needs out of the buffer.

use crate::message::{ControlResponse, Reply};
use crate::protocol::parse_key_value_pairs;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "tokio-runtime")]
use crate::auth::ProtocolInfo;
#[cfg(feature = "tokio-runtime")]
use crate::controller::Controller;
#[cfg(feature = "tokio-runtime")]
use crate::error::{ControlError, Result};
#[cfg(feature = "tokio-runtime")]
use crate::message::ControlRequest;
#[cfg(feature = "tokio-runtime")]
use tracing::debug;

/// Capability discovery.
pub const COMMAND_PROTOCOLINFO: &str = "PROTOCOLINFO";
/// Runtime information query.
pub const COMMAND_GETINFO: &str = "GETINFO";
/// Configuration query.
pub const COMMAND_GETCONF: &str = "GETCONF";
/// Event subscription.
pub const COMMAND_SETEVENTS: &str = "SETEVENTS";
/// Signal delivery.
pub const COMMAND_SIGNAL: &str = "SIGNAL";
/// Connection teardown.
pub const COMMAND_QUIT: &str = "QUIT";

/// PROTOCOLINFO version this client speaks.
pub const PROTOCOLINFO_VERSION: u32 = 1;

/// GETINFO reply.
#[derive(Debug, Clone)]
pub struct GetInfoResponse {
    response: ControlResponse,
}

impl From<ControlResponse> for GetInfoResponse {
    fn from(response: ControlResponse) -> Self {
        Self { response }
    }
}

impl Reply for GetInfoResponse {
    fn response(&self) -> &ControlResponse {
        &self.response
    }
}

impl GetInfoResponse {
    /// Value of the first key in the reply.
    pub fn value(&self) -> Option<String> {
        self.buffer().first_value()
    }

    /// Value of the first line whose key starts with `key`.
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.buffer().value_of(key)
    }

    /// Every key/value pair in the reply.
    pub fn values(&self) -> HashMap<String, String> {
        self.buffer().values()
    }
}

/// GETCONF reply.
///
/// The server puts the last (or only) setting on the end-reply line, so
/// lookups cover mid-reply lines and the end line.
#[derive(Debug, Clone)]
pub struct GetConfResponse {
    response: ControlResponse,
}

impl From<ControlResponse> for GetConfResponse {
    fn from(response: ControlResponse) -> Self {
        Self { response }
    }
}

impl Reply for GetConfResponse {
    fn response(&self) -> &ControlResponse {
        &self.response
    }
}

impl GetConfResponse {
    fn settings(&self) -> impl Iterator<Item = &str> {
        let buffer = self.buffer();
        let end = Some(buffer.status_text()).filter(|_| self.is_success());
        buffer
            .mid_reply_lines
            .iter()
            .map(|l| l.text.as_str())
            .chain(end)
    }

    /// Value of the first setting in the reply.
    pub fn value(&self) -> Option<String> {
        self.settings().next().map(|text| setting_value(text).to_string())
    }

    /// Value of the first setting whose key starts with `key`.
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.settings()
            .find(|text| text.starts_with(key))
            .map(|text| setting_value(text).to_string())
    }

    /// Every setting in the reply. A setting without `=` maps to `""`.
    pub fn values(&self) -> HashMap<String, String> {
        self.settings()
            .map(|text| match text.split_once('=') {
                Some((key, value)) if value.starts_with('"') => {
                    let value = parse_key_value_pairs(text)
                        .remove(key)
                        .unwrap_or_else(|| value.to_string());
                    (key.to_string(), value)
                }
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (text.to_string(), String::new()),
            })
            .collect()
    }
}

fn setting_value(text: &str) -> &str {
    text.split_once('=').map(|(_, v)| v).unwrap_or("")
}

/// Signals accepted by `SIGNAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Reload configuration.
    Reload,
    /// Controlled shutdown.
    Shutdown,
    /// Dump stats to the log.
    Dump,
    /// Switch logging to debug.
    Debug,
    /// Immediate shutdown.
    Halt,
    /// Use new circuits for new connections.
    Newnym,
    /// Forget cached DNS results.
    ClearDnsCache,
    /// Log a heartbeat message.
    Heartbeat,
    /// Wake from dormant mode.
    Active,
    /// Enter dormant mode.
    Dormant,
}

impl Signal {
    /// Wire name of the signal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Reload => "RELOAD",
            Signal::Shutdown => "SHUTDOWN",
            Signal::Dump => "DUMP",
            Signal::Debug => "DEBUG",
            Signal::Halt => "HALT",
            Signal::Newnym => "NEWNYM",
            Signal::ClearDnsCache => "CLEARDNSCACHE",
            Signal::Heartbeat => "HEARTBEAT",
            Signal::Active => "ACTIVE",
            Signal::Dormant => "DORMANT",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RELOAD" | "HUP" => Ok(Signal::Reload),
            "SHUTDOWN" | "INT" => Ok(Signal::Shutdown),
            "DUMP" | "USR1" => Ok(Signal::Dump),
            "DEBUG" | "USR2" => Ok(Signal::Debug),
            "HALT" | "TERM" => Ok(Signal::Halt),
            "NEWNYM" => Ok(Signal::Newnym),
            "CLEARDNSCACHE" => Ok(Signal::ClearDnsCache),
            "HEARTBEAT" => Ok(Signal::Heartbeat),
            "ACTIVE" => Ok(Signal::Active),
            "DORMANT" => Ok(Signal::Dormant),
            _ => Err(format!("Unknown signal: {}", s)),
        }
    }
}

/// `KEYWORD arg1 arg2 ...`
pub fn command_line<I, S>(keyword: &str, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = keyword.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg.as_ref());
    }
    line
}

#[cfg(feature = "tokio-runtime")]
impl Controller {
    fn command(&self, line: String) -> ControlRequest {
        ControlRequest::new(line).with_timeout(self.config().request_timeout)
    }

    /// Ask the server for its protocol version and authentication methods.
    pub async fn protocol_info(&mut self) -> Result<ProtocolInfo> {
        let request = self.command(format!("{} {}", COMMAND_PROTOCOLINFO, PROTOCOLINFO_VERSION));
        let response = self.exchange(request).await?.into_result()?;
        Ok(response.into())
    }

    /// Query one or more GETINFO keys.
    pub async fn get_info<I, S>(&mut self, keys: I) -> Result<GetInfoResponse>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line = command_line(COMMAND_GETINFO, keys);
        if line == COMMAND_GETINFO {
            return Err(ControlError::ConfigurationError("GETINFO needs at least one key".into()));
        }
        let request = self.command(line);
        self.call(request).await
    }

    /// Query one or more configuration settings.
    pub async fn get_conf<I, S>(&mut self, keys: I) -> Result<GetConfResponse>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line = command_line(COMMAND_GETCONF, keys);
        if line == COMMAND_GETCONF {
            return Err(ControlError::ConfigurationError("GETCONF needs at least one key".into()));
        }
        let request = self.command(line);
        self.call(request).await
    }

    /// Send a signal.
    pub async fn signal(&mut self, signal: Signal) -> Result<()> {
        debug!("Sending signal {}", signal);
        let request = self.command(command_line(COMMAND_SIGNAL, [signal.as_str()]));
        self.exchange(request).await?.into_result()?;
        Ok(())
    }

    /// Replace the event subscription. An empty list unsubscribes.
    pub async fn set_events<I, S>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = self.command(command_line(COMMAND_SETEVENTS, events));
        self.exchange(request).await?.into_result()?;
        Ok(())
    }

    /// Ask the server to close the connection, then close our side.
    pub async fn quit(&mut self) -> Result<()> {
        let request = self.command(COMMAND_QUIT.to_string());
        let result = self.exchange(request).await.and_then(ControlResponse::into_result);
        self.close().await;
        result.map(|_| ())
    }
}
