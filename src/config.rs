//! Configuration for a control session.

use crate::auth::AuthMethod;
use crate::message::DEFAULT_REQUEST_TIMEOUT;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that turns on wire-traffic logging.
pub const LOG_COMMS_ENV: &str = "TORC_LOG_COMMS";

/// Configuration for a [`Controller`](crate::Controller).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// The address to connect to.
    pub address: ConnectionAddress,
    /// Password for HASHEDPASSWORD authentication.
    pub password: Option<String>,
    /// Cookie file to use instead of the one the server advertises.
    pub cookie_file: Option<PathBuf>,
    /// Authentication methods to try, most preferred first.
    pub auth_preferences: Vec<AuthMethod>,
    /// Upper bound on establishing the transport.
    pub connect_timeout: Duration,
    /// Reply timeout for requests built by the controller.
    pub request_timeout: Duration,
    /// Log raw wire traffic at debug level under `torc::comms`.
    pub log_comms: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            address: ConnectionAddress::default(),
            password: None,
            cookie_file: None,
            auth_preferences: AuthMethod::default_preferences(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            log_comms: false,
        }
    }
}

impl ControllerConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply settings from the environment.
    ///
    /// A non-empty `TORC_LOG_COMMS` enables comms logging.
    pub fn with_env(mut self) -> Self {
        if std::env::var_os(LOG_COMMS_ENV).is_some_and(|v| !v.is_empty()) {
            self.log_comms = true;
        }
        self
    }

    /// Set the connection address.
    pub fn address(mut self, address: ConnectionAddress) -> Self {
        self.address = address;
        self
    }

    /// Connect over TCP to `host:port`.
    pub fn tcp(mut self, host_port: impl Into<String>) -> Self {
        self.address = ConnectionAddress::Tcp(host_port.into());
        self
    }

    /// Connect to a Unix socket.
    pub fn unix(mut self, path: impl Into<PathBuf>) -> Self {
        self.address = ConnectionAddress::Unix(path.into());
        self
    }

    /// Set the password for HASHEDPASSWORD authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Override the advertised cookie file.
    pub fn cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }

    /// Set the authentication preference order.
    pub fn auth_preferences(mut self, preferences: impl Into<Vec<AuthMethod>>) -> Self {
        self.auth_preferences = preferences.into();
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable comms logging.
    pub fn log_comms(mut self, enabled: bool) -> Self {
        self.log_comms = enabled;
        self
    }
}

/// The address of the control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAddress {
    /// TCP `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    Unix(PathBuf),
}

impl Default for ConnectionAddress {
    fn default() -> Self {
        ConnectionAddress::Tcp("127.0.0.1:9051".to_string())
    }
}

impl ConnectionAddress {
    /// Parse an address string.
    ///
    /// Supports:
    /// - `host:port` for TCP
    /// - `unix:/path/to/socket` for Unix sockets
    pub fn parse(s: &str) -> Result<Self, String> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(format!("Invalid address '{}': empty socket path", s));
            }
            return Ok(ConnectionAddress::Unix(PathBuf::from(path)));
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(ConnectionAddress::Tcp(s.to_string()))
            }
            _ => Err(format!("Invalid address '{}': expected host:port", s)),
        }
    }

    /// Network name handed to the dialer.
    pub fn network(&self) -> &'static str {
        match self {
            ConnectionAddress::Tcp(_) => "tcp",
            ConnectionAddress::Unix(_) => "unix",
        }
    }

    /// Address handed to the dialer.
    pub fn target(&self) -> String {
        match self {
            ConnectionAddress::Tcp(addr) => addr.clone(),
            ConnectionAddress::Unix(path) => path.display().to_string(),
        }
    }
}

impl std::fmt::Display for ConnectionAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionAddress::Tcp(addr) => write!(f, "{}", addr),
            ConnectionAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}
