//! Service configuration
//!
//! Service-level defaults are loaded from environment variables (a
//! `.env` file is honored). Per-user overrides are merged over the
//! defaults when resolving the backend for a user: a user for whom no
//! host or credentials resolve is served by the in-memory store.
//!
//! Remote variables:
//! - `WEBMAIL_IMAP_HOST`, `WEBMAIL_IMAP_PORT`
//! - `WEBMAIL_IMAP_SECURITY` (`tls` or `starttls`)
//! - `WEBMAIL_IMAP_USERNAME`, `WEBMAIL_IMAP_PASSWORD`
//! - `WEBMAIL_IMAP_SENT_MAILBOX`
//! - `WEBMAIL_IMAP_ALLOW_INVALID_CERTS` (`1`/`true`)
//!
//! Relay variables:
//! - `WEBMAIL_SMTP_HOST`, `WEBMAIL_SMTP_PORT`
//! - `WEBMAIL_SMTP_USERNAME`, `WEBMAIL_SMTP_PASSWORD`

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Transport security for remote mail sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Implicit TLS from the first byte (usually port 993).
    Tls,
    /// Plain TCP upgraded via STARTTLS (usually port 143).
    StartTls,
}

impl Security {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "tls" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!(
                "invalid security mode '{other}' (expected tls or starttls)"
            ))),
        }
    }

    const fn default_port(self) -> u16 {
        match self {
            Self::Tls => 993,
            Self::StartTls => 143,
        }
    }
}

/// Partial remote connection settings. `None` fields fall through to
/// the service defaults at resolution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub security: Option<Security>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sent_mailbox: Option<String>,
    pub allow_invalid_certs: Option<bool>,
}

impl RemoteOverrides {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Fully resolved remote connection descriptor.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub security: Security,
    pub username: String,
    pub password: String,
    pub sent_mailbox: Option<String>,
    pub allow_invalid_certs: bool,
}

/// Merge user-level overrides over service defaults and resolve.
///
/// Resolution requires a host and credentials; port and security have
/// protocol defaults. Returns `None` when the user is in-memory-backed.
#[must_use]
pub fn resolve_remote(
    user: Option<&RemoteOverrides>,
    defaults: Option<&RemoteOverrides>,
) -> Option<RemoteConfig> {
    fn pick<T: Clone>(
        user: Option<&RemoteOverrides>,
        defaults: Option<&RemoteOverrides>,
        get: impl Fn(&RemoteOverrides) -> Option<T>,
    ) -> Option<T> {
        user.and_then(&get).or_else(|| defaults.and_then(&get))
    }

    let host = pick(user, defaults, |o| o.host.clone())?;
    let username = pick(user, defaults, |o| o.username.clone())?;
    let password = pick(user, defaults, |o| o.password.clone())?;
    let security = pick(user, defaults, |o| o.security).unwrap_or(Security::Tls);

    Some(RemoteConfig {
        host,
        port: pick(user, defaults, |o| o.port).unwrap_or_else(|| security.default_port()),
        security,
        username,
        password,
        sent_mailbox: pick(user, defaults, |o| o.sent_mailbox.clone()),
        allow_invalid_certs: pick(user, defaults, |o| o.allow_invalid_certs).unwrap_or(false),
    })
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Everything the service needs at construction time.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub remote_defaults: Option<RemoteOverrides>,
    pub smtp: Option<SmtpConfig>,
}

impl ServiceConfig {
    /// Load the configuration from environment variables, reading a
    /// `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on unparseable ports or security modes.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let remote = RemoteOverrides {
            host: env::var("WEBMAIL_IMAP_HOST").ok(),
            port: parse_port("WEBMAIL_IMAP_PORT")?,
            security: match env::var("WEBMAIL_IMAP_SECURITY") {
                Ok(raw) => Some(Security::parse(&raw)?),
                Err(_) => None,
            },
            username: env::var("WEBMAIL_IMAP_USERNAME").ok(),
            password: env::var("WEBMAIL_IMAP_PASSWORD").ok(),
            sent_mailbox: env::var("WEBMAIL_IMAP_SENT_MAILBOX").ok(),
            allow_invalid_certs: env::var("WEBMAIL_IMAP_ALLOW_INVALID_CERTS")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        };

        let smtp = match env::var("WEBMAIL_SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: parse_port("WEBMAIL_SMTP_PORT")?.unwrap_or(587),
                username: env::var("WEBMAIL_SMTP_USERNAME").ok(),
                password: env::var("WEBMAIL_SMTP_PASSWORD").ok(),
            }),
            Err(_) => None,
        };

        Ok(Self {
            remote_defaults: Some(remote).filter(|r| !r.is_empty()),
            smtp,
        })
    }

    /// Whether the service defaults alone make every user
    /// protocol-backed; local fan-out delivery is skipped in that case.
    #[must_use]
    pub fn all_remote(&self) -> bool {
        resolve_remote(None, self.remote_defaults.as_ref()).is_some()
    }
}

fn parse_port(var: &str) -> Result<Option<u16>> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {var}: {e}"))),
        Err(_) => Ok(None),
    }
}
