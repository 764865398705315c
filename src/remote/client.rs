//! Protocol client contract
//!
//! The adapter drives remote sessions through this trait; the real
//! implementation lives in [`crate::remote::imap`] and tests provide a
//! scripted in-process one. A client is created unconnected by the
//! [`ClientFactory`]; every adapter operation owns one client for
//! exactly one connect → work → disconnect cycle.

use crate::config::RemoteConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// An IMAP message flag. System flags carry the `\` prefix on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
}

impl Flag {
    /// The wire representation of this flag.
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

/// Special-use role advertised by the provider for a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialUse {
    Sent,
    Drafts,
    Archive,
    Junk,
    Trash,
}

/// One remote mailbox as reported by LIST.
#[derive(Debug, Clone)]
pub struct RemoteMailboxInfo {
    pub path: String,
    /// `false` when the provider flags the mailbox non-selectable.
    pub selectable: bool,
    pub special_use: Option<SpecialUse>,
}

/// Per-mailbox counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    pub messages: u32,
    pub unseen: u32,
}

/// Address from a wire envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    pub name: Option<String>,
    pub address: String,
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => {
                write!(f, "{name} <{}>", self.address)
            }
            _ => f.write_str(&self.address),
        }
    }
}

/// Envelope metadata independent of the body.
#[derive(Debug, Clone, Default)]
pub struct RemoteEnvelope {
    pub from: Vec<RemoteAddress>,
    pub to: Vec<RemoteAddress>,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// A message as fetched from the remote store. `seq` is the 1-based
/// sequence position within its mailbox.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub seq: u32,
    pub envelope: RemoteEnvelope,
    pub seen: bool,
    pub internal_date: Option<DateTime<Utc>>,
    /// Raw RFC 2822 source; only present on full fetches.
    pub raw: Option<Vec<u8>>,
}

#[async_trait]
pub trait MailClient: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Enumerate the account's mailboxes.
    async fn list_mailboxes(&mut self) -> Result<Vec<RemoteMailboxInfo>>;

    /// Message and unseen counters for one mailbox.
    async fn status(&mut self, path: &str) -> Result<MailboxStatus>;

    /// Open a mailbox, returning its message count, or `None` when it
    /// does not exist. The mailbox stays selected for subsequent
    /// fetch/flag calls on this client.
    async fn open_mailbox(&mut self, path: &str) -> Result<Option<u32>>;

    /// Fetch metadata for an inclusive sequence range of the selected
    /// mailbox.
    async fn fetch_range(&mut self, first: u32, last: u32) -> Result<Vec<RemoteMessage>>;

    /// Fetch one message of the selected mailbox including raw source.
    async fn fetch_full(&mut self, seq: u32) -> Result<Option<RemoteMessage>>;

    /// Add flags to one message of the selected mailbox.
    async fn add_flags(&mut self, seq: u32, flags: &[Flag]) -> Result<()>;

    /// Append a raw message to a mailbox; returns the sequence id the
    /// provider assigned to it.
    async fn append(
        &mut self,
        path: &str,
        raw: &[u8],
        flags: &[Flag],
        date: DateTime<Utc>,
    ) -> Result<u32>;
}

/// Creates unconnected clients from a resolved connection descriptor.
pub trait ClientFactory: Send + Sync {
    fn open(&self, config: &RemoteConfig) -> Box<dyn MailClient>;
}
