//! Authentication negotiation.
//!
//! The server lists its accepted methods in the PROTOCOLINFO reply. The
//! client walks its own preference list in order and picks the first method
//! the server advertised; that method then performs a single AUTHENTICATE
//! exchange.

use crate::error::{ControlError, Result};
use crate::message::{ControlResponse, Reply};
use crate::protocol::parse_key_value_pairs;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

#[cfg(feature = "tokio-runtime")]
use crate::controller::Controller;
#[cfg(feature = "tokio-runtime")]
use crate::message::ControlRequest;
#[cfg(feature = "tokio-runtime")]
use crate::protocol::quote_string;
#[cfg(feature = "tokio-runtime")]
use std::path::PathBuf;
#[cfg(feature = "tokio-runtime")]
use tracing::info;

/// Keyword of the authentication command.
pub const COMMAND_AUTHENTICATE: &str = "AUTHENTICATE";

/// Expected size of an authentication cookie.
pub const COOKIE_LEN: usize = 32;

/// Authentication strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    /// Open control port, empty AUTHENTICATE.
    Null,
    /// Password sent as a quoted string.
    HashedPassword,
    /// Contents of the cookie file sent as hex.
    Cookie,
    /// Challenge/response over the cookie. Not implemented.
    SafeCookie,
}

impl AuthMethod {
    /// Parse an advertised method name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NULL" => Some(AuthMethod::Null),
            "HASHEDPASSWORD" => Some(AuthMethod::HashedPassword),
            "COOKIE" => Some(AuthMethod::Cookie),
            "SAFECOOKIE" => Some(AuthMethod::SafeCookie),
            _ => None,
        }
    }

    /// The name the server advertises for this method.
    pub fn method_name(&self) -> &'static str {
        match self {
            AuthMethod::Null => "NULL",
            AuthMethod::HashedPassword => "HASHEDPASSWORD",
            AuthMethod::Cookie => "COOKIE",
            AuthMethod::SafeCookie => "SAFECOOKIE",
        }
    }

    /// Cookie, then password, then open access.
    pub fn default_preferences() -> Vec<AuthMethod> {
        vec![AuthMethod::Cookie, AuthMethod::HashedPassword, AuthMethod::Null]
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

/// Pick the first preferred method the server advertised.
pub fn select_authenticator<S: AsRef<str>>(
    preferences: &[AuthMethod],
    advertised: &[S],
) -> Result<AuthMethod> {
    preferences
        .iter()
        .copied()
        .find(|method| advertised.iter().any(|m| m.as_ref() == method.method_name()))
        .ok_or_else(|| {
            let offered: Vec<&str> = advertised.iter().map(AsRef::as_ref).collect();
            ControlError::NoCompatibleAuthMethod(offered.join(","))
        })
}

/// PROTOCOLINFO reply.
#[derive(Debug, Clone)]
pub struct ProtocolInfo {
    response: ControlResponse,
}

impl From<ControlResponse> for ProtocolInfo {
    fn from(response: ControlResponse) -> Self {
        Self { response }
    }
}

impl Reply for ProtocolInfo {
    fn response(&self) -> &ControlResponse {
        &self.response
    }
}

impl ProtocolInfo {
    fn find_line(&self, prefix: &str) -> Option<&str> {
        self.buffer()
            .mid_reply_lines
            .iter()
            .map(|l| l.text.as_str())
            .find(|text| text.starts_with(prefix))
    }

    fn variables(&self, keyword: &str) -> HashMap<String, String> {
        self.find_line(keyword)
            .map(|text| parse_key_value_pairs(&text[keyword.len()..]))
            .unwrap_or_default()
    }

    /// Protocol version from the `PROTOCOLINFO` line.
    pub fn protocol(&self) -> Option<u32> {
        self.find_line("PROTOCOLINFO")?
            .split_once(' ')?
            .1
            .trim()
            .parse()
            .ok()
    }

    /// Key/value pairs from the `AUTH` line.
    pub fn auth(&self) -> HashMap<String, String> {
        self.variables("AUTH")
    }

    /// Advertised method names, in the server's order.
    pub fn auth_methods(&self) -> Vec<String> {
        self.auth()
            .get("METHODS")
            .map(|m| m.split(',').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default()
    }

    /// Advertised cookie file, if any.
    pub fn auth_cookie_file(&self) -> Option<String> {
        self.auth().remove("COOKIEFILE")
    }

    /// Key/value pairs from the `VERSION` line.
    pub fn version(&self) -> HashMap<String, String> {
        self.variables("VERSION")
    }
}

/// Read the authentication cookie from a file.
pub fn read_cookie_file(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path).map_err(|source| ControlError::CookieFile {
        path: path.to_path_buf(),
        source,
    })?;

    if data.len() != COOKIE_LEN {
        warn!(
            "Cookie file '{}' has unexpected length {} (expected {})",
            path.display(),
            data.len(),
            COOKIE_LEN
        );
    }

    debug!("Read {} byte cookie from '{}'", data.len(), path.display());
    Ok(data)
}

/// Format cookie data as lowercase hex for the AUTHENTICATE command.
pub fn format_cookie_hex(cookie: &[u8]) -> String {
    hex::encode(cookie)
}

#[cfg(feature = "tokio-runtime")]
impl AuthMethod {
    /// Run this method's exchange on `controller`.
    ///
    /// Sets the controller's authenticated flag from the reply status.
    pub async fn authenticate(&self, controller: &mut Controller, info: &ProtocolInfo) -> Result<()> {
        let line = match self {
            AuthMethod::Null => {
                info!("Attempting open authentication");
                COMMAND_AUTHENTICATE.to_string()
            }
            AuthMethod::HashedPassword => {
                info!("Attempting password authentication");
                let password = controller.config().password.as_deref().ok_or_else(|| {
                    ControlError::AuthenticationFailed(
                        "HASHEDPASSWORD selected but no password configured".to_string(),
                    )
                })?;
                format!("{} {}", COMMAND_AUTHENTICATE, quote_string(password))
            }
            AuthMethod::Cookie => {
                info!("Attempting cookie authentication");
                let path = match &controller.config().cookie_file {
                    Some(path) => path.clone(),
                    None => info.auth_cookie_file().map(PathBuf::from).ok_or_else(|| {
                        ControlError::AuthenticationFailed(
                            "COOKIE selected but no cookie file advertised".to_string(),
                        )
                    })?,
                };
                let cookie = read_cookie_file(&path)?;
                format!("{} {}", COMMAND_AUTHENTICATE, format_cookie_hex(&cookie))
            }
            AuthMethod::SafeCookie => {
                info!("Attempting safe-cookie authentication");
                return Err(ControlError::NotImplemented("SAFECOOKIE authentication"));
            }
        };

        let request = ControlRequest::new(line).with_timeout(controller.config().request_timeout);
        let response = controller.exchange(request).await?;

        controller.set_authenticated(response.is_success());
        if !response.is_success() {
            return Err(ControlError::AuthenticationFailed(format!(
                "{} rejected ({}): {}",
                self,
                response.status(),
                response.status_text()
            )));
        }

        debug!("Authenticated with {}", self);
        Ok(())
    }
}
