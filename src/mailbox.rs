//! Mailbox names, summaries and listing order
//!
//! In-memory mailboxes use fixed lower-case names; protocol-backed users
//! see whatever paths their provider reports. Listings for both backends
//! come back in the same fixed priority order: inbox first, then sent,
//! drafts, archive, spam/junk, trash, then everything else
//! alphabetically, ties broken alphabetically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// In-memory mailbox names.
pub const INBOX: &str = "inbox";
pub const SENT: &str = "sent";
pub const DRAFTS: &str = "drafts";
pub const ARCHIVE: &str = "archive";

/// Every mailbox name the in-memory backend recognizes.
pub const KNOWN: [&str; 4] = [INBOX, SENT, DRAFTS, ARCHIVE];

/// Whether the in-memory backend recognizes `name` as a mailbox.
#[must_use]
pub fn is_known(name: &str) -> bool {
    KNOWN.contains(&name)
}

/// Summary row returned by mailbox listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxSummary {
    pub name: String,
    pub total: u32,
    pub unread: u32,
}

/// Well-known mailbox role, classified by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxKind {
    Inbox,
    Sent,
    Drafts,
    Archive,
    Spam,
    Trash,
    Custom,
}

impl MailboxKind {
    /// Classify a mailbox name (case-insensitive substring match, the
    /// way providers name their folders).
    #[must_use]
    pub fn classify(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower == "inbox" {
            Self::Inbox
        } else if lower.contains("sent") {
            Self::Sent
        } else if lower.contains("draft") {
            Self::Drafts
        } else if lower.contains("archive") {
            Self::Archive
        } else if lower.contains("spam") || lower.contains("junk") {
            Self::Spam
        } else if lower.contains("trash") {
            Self::Trash
        } else {
            Self::Custom
        }
    }

    /// Position in the fixed listing order.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Inbox => 0,
            Self::Sent => 1,
            Self::Drafts => 2,
            Self::Archive => 3,
            Self::Spam => 4,
            Self::Trash => 5,
            Self::Custom => 6,
        }
    }
}

/// Sort summaries into the fixed listing order.
pub fn sort_summaries(summaries: &mut [MailboxSummary]) {
    summaries.sort_by(|a, b| {
        let pa = MailboxKind::classify(&a.name).priority();
        let pb = MailboxKind::classify(&b.name).priority();
        match pa.cmp(&pb) {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        }
    });
}
