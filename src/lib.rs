//! Demo webmail service core
//!
//! Authenticates users, stores messages in per-user mailboxes, and can
//! proxy a user's mailbox state through a remote IMAP server. Two
//! backends implement one contract (a synchronous in-memory store and
//! a session-per-operation protocol adapter), and the [`MailService`]
//! orchestrator decides per user which one governs their mail.
//!
//! HTTP routing, sessions and the demo UI live outside this crate; the
//! boundary speaks [`Message`], [`MailboxSummary`] and the error kinds
//! in [`Error`].

pub mod address;
pub mod backend;
pub mod config;
pub mod error;
pub mod hasher;
pub mod mailbox;
pub mod message;
pub mod relay;
pub mod remote;
pub mod service;
pub mod store;
pub mod user;

pub use backend::MailboxBackend;
pub use config::{RemoteConfig, RemoteOverrides, Security, ServiceConfig, SmtpConfig};
pub use error::{Error, Result};
pub use mailbox::MailboxSummary;
pub use message::{Message, MessageStatus};
pub use remote::RemoteMailbox;
pub use service::{ComposeRequest, MailService, NewUser};
pub use store::MemoryStore;
pub use user::{User, UserId, UserProfile};
