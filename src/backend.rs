//! Backend contract shared by the in-memory store and the protocol
//! adapter
//!
//! The orchestrator resolves a user's backend once per operation and
//! then talks to this trait only; nothing downstream branches on the
//! backend type.

use crate::error::Result;
use crate::mailbox::MailboxSummary;
use crate::message::Message;
use crate::user::User;
use async_trait::async_trait;

#[async_trait]
pub trait MailboxBackend: Send + Sync {
    /// List the user's mailboxes with total and unread counts, in the
    /// fixed priority order.
    async fn list_mailboxes(&self, user: &User) -> Result<Vec<MailboxSummary>>;

    /// List the messages of one mailbox, newest first.
    async fn list_messages(&self, user: &User, mailbox: &str) -> Result<Vec<Message>>;

    /// Fetch one message by id.
    async fn get_message(&self, user: &User, id: &str) -> Result<Message>;

    /// Mark a message read. Idempotent.
    async fn mark_read(&self, user: &User, id: &str) -> Result<Message>;
}
