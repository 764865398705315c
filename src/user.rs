//! User records and public projections

use crate::config::RemoteOverrides;
use serde::Serialize;
use uuid::Uuid;

pub type UserId = Uuid;

/// An account known to the service.
///
/// `email` is the unique, case-insensitive lookup key and is stored
/// lower-cased. `remote` holds per-user connection overrides; whether
/// the user is actually protocol-backed is decided at resolution time
/// by merging these over the service defaults.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub credential_hash: String,
    pub remote: Option<RemoteOverrides>,
}

impl User {
    /// `"Name <email>"` form used as the From header on outbound mail.
    #[must_use]
    pub fn formatted_address(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

/// Public-safe projection of a [`User`], returned by provisioning.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub remote_backed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_host: Option<String>,
}
