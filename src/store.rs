//! In-memory mailbox store
//!
//! Synchronous per-user mailbox state: every user owns a set of named
//! mailboxes holding newest-first message lists, plus a flat id index
//! for direct lookups and a set of outstanding draft ids. All mutation
//! happens under a single lock in short critical sections, so the
//! operations are atomic with respect to each other.

use crate::backend::MailboxBackend;
use crate::error::{Error, Result};
use crate::mailbox::{self, MailboxSummary};
use crate::message::{Message, MessageStatus};
use crate::user::{User, UserId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Mailboxes created for every new user. The drafts mailbox appears
/// when the first draft is created.
const DEFAULT_MAILBOXES: [&str; 3] = [mailbox::INBOX, mailbox::SENT, mailbox::ARCHIVE];

#[derive(Debug, Default)]
struct UserBoxes {
    /// Mailbox name -> newest-first message list.
    boxes: HashMap<String, Vec<Message>>,
    /// Flat index: message id -> owning mailbox name. Kept in lockstep
    /// with `boxes` under the store lock.
    index: HashMap<String, String>,
    /// Ids of messages still in draft state.
    drafts: HashSet<String>,
}

impl UserBoxes {
    fn find(&self, id: &str) -> Option<&Message> {
        let owner = self.index.get(id)?;
        self.boxes.get(owner)?.iter().find(|m| m.id == id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<UserId, UserBoxes>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, UserBoxes>> {
        self.users.lock().expect("mailbox state lock poisoned")
    }

    /// Create the default mailboxes for a user. Idempotent.
    pub fn init_user(&self, user_id: UserId) {
        let mut users = self.lock();
        let boxes = users.entry(user_id).or_default();
        for name in DEFAULT_MAILBOXES {
            boxes.boxes.entry(name.to_string()).or_default();
        }
    }

    /// List the user's mailboxes with totals and unread counts.
    pub fn list_mailboxes(&self, user_id: UserId) -> Result<Vec<MailboxSummary>> {
        let users = self.lock();
        let boxes = known_user(&users, user_id)?;

        let mut summaries: Vec<MailboxSummary> = boxes
            .boxes
            .iter()
            .map(|(name, list)| MailboxSummary {
                name: name.clone(),
                total: list.len() as u32,
                unread: list
                    .iter()
                    .filter(|m| m.status == MessageStatus::Unread)
                    .count() as u32,
            })
            .collect();
        mailbox::sort_summaries(&mut summaries);
        Ok(summaries)
    }

    /// List the messages of one mailbox, newest first.
    pub fn list_messages(&self, user_id: UserId, mailbox_name: &str) -> Result<Vec<Message>> {
        let users = self.lock();
        let boxes = known_user(&users, user_id)?;
        boxes
            .boxes
            .get(mailbox_name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown mailbox: {mailbox_name}")))
    }

    /// Look up one message by id.
    pub fn get_message(&self, user_id: UserId, id: &str) -> Result<Message> {
        let users = self.lock();
        let boxes = known_user(&users, user_id)?;
        boxes
            .find(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown message: {id}")))
    }

    /// Prepend a message to its mailbox and index it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] when `message.mailbox` is not a
    /// name this backend recognizes.
    pub fn store_message(&self, user_id: UserId, message: Message) -> Result<Message> {
        let mut users = self.lock();
        let boxes = known_user_mut(&mut users, user_id)?;

        if !boxes.boxes.contains_key(&message.mailbox) && !mailbox::is_known(&message.mailbox) {
            return Err(Error::NotFound(format!(
                "unknown mailbox: {}",
                message.mailbox
            )));
        }

        boxes
            .index
            .insert(message.id.clone(), message.mailbox.clone());
        boxes
            .boxes
            .entry(message.mailbox.clone())
            .or_default()
            .insert(0, message.clone());
        Ok(message)
    }

    /// Mark a message read. Idempotent: marking an already-read message
    /// succeeds and refreshes `updated_at` only.
    pub fn mark_read(&self, user_id: UserId, id: &str) -> Result<Message> {
        let mut users = self.lock();
        let boxes = known_user_mut(&mut users, user_id)?;

        let owner = boxes
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown message: {id}")))?;
        let list = boxes
            .boxes
            .get_mut(&owner)
            .ok_or_else(|| Error::NotFound(format!("unknown mailbox: {owner}")))?;
        let position = list
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("unknown message: {id}")))?;

        let mut updated = list.remove(position);
        updated.status = MessageStatus::Read;
        updated.updated_at = Utc::now();
        list.insert(position, updated.clone());
        Ok(updated)
    }

    /// Validate and store a new draft.
    pub fn create_draft(
        &self,
        user_id: UserId,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<Message> {
        for (field, value) in [("from", from), ("to", to), ("subject", subject)] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{field} is required")));
            }
        }

        let now = Utc::now();
        let draft = Message {
            id: Message::generate_id(),
            from: from.trim().to_string(),
            to: to.trim().to_string(),
            subject: subject.trim().to_string(),
            body: body.to_string(),
            status: MessageStatus::Draft,
            mailbox: mailbox::DRAFTS.to_string(),
            created_at: now,
            updated_at: now,
            sent_at: None,
        };

        let mut users = self.lock();
        let boxes = known_user_mut(&mut users, user_id)?;
        boxes
            .boxes
            .entry(mailbox::DRAFTS.to_string())
            .or_default()
            .insert(0, draft.clone());
        boxes
            .index
            .insert(draft.id.clone(), mailbox::DRAFTS.to_string());
        boxes.drafts.insert(draft.id.clone());
        Ok(draft)
    }

    /// Send a draft: the draft becomes the sent copy and a fresh unread
    /// copy lands in the owner's inbox (single-mailbox demo delivery).
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id, [`Error::Conflict`] when
    /// the draft was already sent.
    pub fn send_draft(&self, user_id: UserId, id: &str) -> Result<Message> {
        let mut users = self.lock();
        let boxes = known_user_mut(&mut users, user_id)?;

        if !boxes.drafts.contains(id) {
            return Err(match boxes.find(id) {
                Some(m) if m.status == MessageStatus::Sent => {
                    Error::Conflict("draft already sent".into())
                }
                _ => Error::NotFound(format!("unknown draft: {id}")),
            });
        }

        let drafts_list = boxes
            .boxes
            .get_mut(mailbox::DRAFTS)
            .ok_or_else(|| Error::NotFound(format!("unknown draft: {id}")))?;
        let position = drafts_list
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("unknown draft: {id}")))?;

        let now = Utc::now();
        let mut sent = drafts_list.remove(position);
        sent.status = MessageStatus::Sent;
        sent.mailbox = mailbox::SENT.to_string();
        sent.updated_at = now;
        sent.sent_at = Some(now);

        boxes
            .boxes
            .entry(mailbox::SENT.to_string())
            .or_default()
            .insert(0, sent.clone());
        boxes.index.insert(sent.id.clone(), sent.mailbox.clone());
        boxes.drafts.remove(id);

        // Self-delivery: the demo's single-mailbox mode delivers a fresh
        // unread copy to the owner's inbox.
        let inbox_copy = Message {
            id: Message::generate_id(),
            from: sent.from.clone(),
            to: sent.to.clone(),
            subject: sent.subject.clone(),
            body: sent.body.clone(),
            status: MessageStatus::Unread,
            mailbox: mailbox::INBOX.to_string(),
            created_at: now,
            updated_at: now,
            sent_at: None,
        };
        boxes
            .index
            .insert(inbox_copy.id.clone(), inbox_copy.mailbox.clone());
        boxes
            .boxes
            .entry(mailbox::INBOX.to_string())
            .or_default()
            .insert(0, inbox_copy);

        Ok(sent)
    }
}

fn known_user(
    users: &HashMap<UserId, UserBoxes>,
    user_id: UserId,
) -> Result<&UserBoxes> {
    users
        .get(&user_id)
        .ok_or_else(|| Error::NotFound(format!("unknown user: {user_id}")))
}

fn known_user_mut(
    users: &mut HashMap<UserId, UserBoxes>,
    user_id: UserId,
) -> Result<&mut UserBoxes> {
    users
        .get_mut(&user_id)
        .ok_or_else(|| Error::NotFound(format!("unknown user: {user_id}")))
}

#[async_trait]
impl MailboxBackend for MemoryStore {
    async fn list_mailboxes(&self, user: &User) -> Result<Vec<MailboxSummary>> {
        self.list_mailboxes(user.id)
    }

    async fn list_messages(&self, user: &User, mailbox: &str) -> Result<Vec<Message>> {
        self.list_messages(user.id, mailbox)
    }

    async fn get_message(&self, user: &User, id: &str) -> Result<Message> {
        self.get_message(user.id, id)
    }

    async fn mark_read(&self, user: &User, id: &str) -> Result<Message> {
        self.mark_read(user.id, id)
    }
}
