//! Message model shared by both mailbox backends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Draft,
    Unread,
    Read,
    Sent,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Unread => "unread",
            Self::Read => "read",
            Self::Sent => "sent",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mail message. Each message is owned by exactly one mailbox of one
/// user; cross-user delivery always creates a fresh copy with its own id.
///
/// For in-memory users `id` is a generated UUID; for protocol-backed
/// users it is the stringified provider sequence id, and `body` may stay
/// empty until lazily fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub status: MessageStatus,
    pub mailbox: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Fresh id for a locally created message.
    #[must_use]
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Render the message as a minimal RFC 2822 document
    /// (From/To/Subject/Date headers, blank line, body) for appending to
    /// a remote mailbox.
    #[must_use]
    pub fn to_rfc2822(&self) -> Vec<u8> {
        let date = self.sent_at.unwrap_or(self.created_at);
        format!(
            "From: {}\r\n\
             To: {}\r\n\
             Subject: {}\r\n\
             Date: {}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             {}",
            self.from,
            self.to,
            self.subject,
            date.to_rfc2822(),
            self.body,
        )
        .into_bytes()
    }
}
