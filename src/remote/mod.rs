//! Protocol-backed mailbox adapter
//!
//! Presents the same mailbox/message contract as the in-memory store,
//! backed by a remote mail server. Every operation runs one
//! connect → work → disconnect cycle on a fresh client. Disconnect
//! always runs; a failing disconnect is logged rather than propagated
//! since the unit of work has already produced its result.
//!
//! The adapter keeps two per-user caches: mapped messages keyed by
//! `(user, id)` so a get-after-list needs no refetch (bodies fill in
//! lazily, and a cached body survives metadata-only refreshes), and the
//! resolved "Sent" mailbox path.

pub mod client;
pub mod imap;

use crate::backend::MailboxBackend;
use crate::config::{RemoteConfig, RemoteOverrides, resolve_remote};
use crate::error::{Error, Result};
use crate::mailbox::{self, MailboxSummary};
use crate::message::{Message, MessageStatus};
use crate::user::{User, UserId};
use async_trait::async_trait;
use chrono::Utc;
use client::{ClientFactory, Flag, MailClient, MailboxStatus, RemoteAddress, RemoteMessage, SpecialUse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Maximum number of messages returned per mailbox listing.
const LIST_WINDOW: u32 = 50;

/// Names recognized as the sent mailbox when the provider does not
/// advertise one.
const SENT_NAMES: [&str; 3] = ["sent", "sent items", "sent messages"];

/// Last-resort sent mailbox path.
const SENT_FALLBACK: &str = "Sent";

/// Remote mailbox backend.
pub struct RemoteMailbox {
    factory: Arc<dyn ClientFactory>,
    defaults: Option<RemoteOverrides>,
    messages: Mutex<HashMap<(UserId, String), Message>>,
    sent_paths: Mutex<HashMap<UserId, String>>,
}

impl RemoteMailbox {
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>, defaults: Option<RemoteOverrides>) -> Self {
        Self {
            factory,
            defaults,
            messages: Mutex::new(HashMap::new()),
            sent_paths: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the connection descriptor for a user; `None` means the
    /// user is in-memory-backed.
    #[must_use]
    pub fn resolve(&self, user: &User) -> Option<RemoteConfig> {
        resolve_remote(user.remote.as_ref(), self.defaults.as_ref())
    }

    fn config_for(&self, user: &User) -> Result<RemoteConfig> {
        self.resolve(user).ok_or_else(|| {
            Error::Config(format!("user {} has no remote configuration", user.email))
        })
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<(UserId, String), Message>> {
        self.messages.lock().expect("message cache lock poisoned")
    }

    async fn session(&self, config: &RemoteConfig) -> Result<Box<dyn MailClient>> {
        let mut client = self.factory.open(config);
        if let Err(e) = client.connect().await {
            finish(client).await;
            return Err(e);
        }
        Ok(client)
    }

    /// List the user's remote mailboxes with per-mailbox counters.
    pub async fn list_mailboxes_for(&self, user: &User) -> Result<Vec<MailboxSummary>> {
        let config = self.config_for(user)?;
        let mut client = self.session(&config).await?;
        let result = list_mailboxes_inner(client.as_mut()).await;
        finish(client).await;
        result
    }

    /// List the last messages of one remote mailbox, newest first.
    pub async fn list_messages_for(&self, user: &User, mailbox_name: &str) -> Result<Vec<Message>> {
        let config = self.config_for(user)?;
        let mut client = self.session(&config).await?;
        let result = list_messages_inner(client.as_mut(), mailbox_name).await;
        finish(client).await;

        let mut messages: Vec<Message> = result?
            .iter()
            .map(|remote| map_message(remote, mailbox_name))
            .collect();

        let mut cache = self.cache();
        for message in &mut messages {
            let key = (user.id, message.id.clone());
            // Merge rule: keep an already-fetched body, overwrite
            // everything else with the fresh metadata.
            if let Some(cached) = cache.get(&key)
                && message.body.is_empty()
                && !cached.body.is_empty()
            {
                message.body = cached.body.clone();
            }
            cache.insert(key, message.clone());
        }
        drop(cache);

        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    /// Fetch one message, lazily loading its body from the remote side.
    pub async fn get_message_for(&self, user: &User, id: &str) -> Result<Message> {
        let cached = self.cache().get(&(user.id, id.to_string())).cloned();
        let Some(cached) = cached else {
            return Err(Error::NotFound(format!("unknown message: {id}")));
        };
        if !cached.body.is_empty() {
            return Ok(cached);
        }

        let seq = parse_seq(id)?;
        let config = self.config_for(user)?;
        let mut client = self.session(&config).await?;
        let result = fetch_full_inner(client.as_mut(), &cached.mailbox, seq).await;
        finish(client).await;

        let Some(remote) = result? else {
            return Err(Error::NotFound(format!("unknown message: {id}")));
        };

        let merged = map_message(&remote, &cached.mailbox);
        self.cache()
            .insert((user.id, merged.id.clone()), merged.clone());
        Ok(merged)
    }

    /// Mark a message read remotely and in the cache. Idempotent:
    /// adding an already-present flag is a remote no-op.
    pub async fn mark_read_for(&self, user: &User, id: &str) -> Result<Message> {
        let cached = self.cache().get(&(user.id, id.to_string())).cloned();
        let Some(mut cached) = cached else {
            return Err(Error::NotFound(format!("unknown message: {id}")));
        };

        let seq = parse_seq(id)?;
        let config = self.config_for(user)?;
        let mut client = self.session(&config).await?;
        let result = mark_read_inner(client.as_mut(), &cached.mailbox, seq).await;
        finish(client).await;
        result?;

        cached.status = MessageStatus::Read;
        cached.updated_at = Utc::now();
        self.cache()
            .insert((user.id, cached.id.clone()), cached.clone());
        Ok(cached)
    }

    /// Persist a sent copy remotely and re-key the message with the
    /// provider-assigned id and the resolved sent mailbox. The copy is
    /// appended pre-flagged seen: one's own sent mail starts read.
    pub async fn append_sent(&self, user: &User, mut message: Message) -> Result<Message> {
        let config = self.config_for(user)?;
        let cached_path = self
            .sent_paths
            .lock()
            .expect("sent path cache lock poisoned")
            .get(&user.id)
            .cloned();

        let mut client = self.session(&config).await?;
        let result = append_inner(client.as_mut(), &config, cached_path, &message).await;
        finish(client).await;
        let (path, seq) = result?;

        self.sent_paths
            .lock()
            .expect("sent path cache lock poisoned")
            .insert(user.id, path.clone());

        message.id = seq.to_string();
        message.mailbox = path;
        message.status = MessageStatus::Read;
        message.updated_at = Utc::now();
        self.cache()
            .insert((user.id, message.id.clone()), message.clone());
        Ok(message)
    }
}

#[async_trait]
impl MailboxBackend for RemoteMailbox {
    async fn list_mailboxes(&self, user: &User) -> Result<Vec<MailboxSummary>> {
        self.list_mailboxes_for(user).await
    }

    async fn list_messages(&self, user: &User, mailbox: &str) -> Result<Vec<Message>> {
        self.list_messages_for(user, mailbox).await
    }

    async fn get_message(&self, user: &User, id: &str) -> Result<Message> {
        self.get_message_for(user, id).await
    }

    async fn mark_read(&self, user: &User, id: &str) -> Result<Message> {
        self.mark_read_for(user, id).await
    }
}

/// Close a session, logging (not propagating) disconnect failures.
async fn finish(mut client: Box<dyn MailClient>) {
    if let Err(e) = client.disconnect().await {
        warn!("failed to close remote session: {}", e);
    }
}

async fn list_mailboxes_inner(client: &mut dyn MailClient) -> Result<Vec<MailboxSummary>> {
    let mut summaries = Vec::new();
    for info in client.list_mailboxes().await? {
        if !info.selectable {
            debug!("skipping non-selectable mailbox {}", info.path);
            continue;
        }
        let status = match client.status(&info.path).await {
            Ok(status) => status,
            Err(e) => {
                warn!("status for {} failed: {}", info.path, e);
                MailboxStatus::default()
            }
        };
        summaries.push(MailboxSummary {
            name: info.path,
            total: status.messages,
            unread: status.unseen,
        });
    }
    mailbox::sort_summaries(&mut summaries);
    Ok(summaries)
}

async fn list_messages_inner(
    client: &mut dyn MailClient,
    mailbox_name: &str,
) -> Result<Vec<RemoteMessage>> {
    let Some(exists) = client.open_mailbox(mailbox_name).await? else {
        return Ok(Vec::new());
    };
    if exists == 0 {
        return Ok(Vec::new());
    }
    let first = exists.saturating_sub(LIST_WINDOW - 1).max(1);
    client.fetch_range(first, exists).await
}

async fn fetch_full_inner(
    client: &mut dyn MailClient,
    mailbox_name: &str,
    seq: u32,
) -> Result<Option<RemoteMessage>> {
    if client.open_mailbox(mailbox_name).await?.is_none() {
        return Ok(None);
    }
    client.fetch_full(seq).await
}

async fn mark_read_inner(client: &mut dyn MailClient, mailbox_name: &str, seq: u32) -> Result<()> {
    if client.open_mailbox(mailbox_name).await?.is_none() {
        return Err(Error::Remote(format!(
            "mailbox {mailbox_name} is no longer available"
        )));
    }
    client.add_flags(seq, &[Flag::Seen]).await
}

async fn append_inner(
    client: &mut dyn MailClient,
    config: &RemoteConfig,
    cached_path: Option<String>,
    message: &Message,
) -> Result<(String, u32)> {
    let path = match config.sent_mailbox.clone().or(cached_path) {
        Some(path) => path,
        None => resolve_sent_path(client).await?,
    };
    let raw = message.to_rfc2822();
    let date = message.sent_at.unwrap_or(message.created_at);
    let seq = client.append(&path, &raw, &[Flag::Seen], date).await?;
    Ok((path, seq))
}

/// Find the remote sent mailbox: provider special-use flag first, then
/// well-known names, then the literal `Sent`.
async fn resolve_sent_path(client: &mut dyn MailClient) -> Result<String> {
    let mailboxes = client.list_mailboxes().await?;
    if let Some(info) = mailboxes
        .iter()
        .find(|i| i.special_use == Some(SpecialUse::Sent))
    {
        return Ok(info.path.clone());
    }
    if let Some(info) = mailboxes
        .iter()
        .find(|i| SENT_NAMES.contains(&i.path.to_ascii_lowercase().as_str()))
    {
        return Ok(info.path.clone());
    }
    Ok(SENT_FALLBACK.to_string())
}

fn parse_seq(id: &str) -> Result<u32> {
    id.parse()
        .map_err(|_| Error::NotFound(format!("unknown message: {id}")))
}

/// Map a wire-level message into the service's message shape.
fn map_message(remote: &RemoteMessage, mailbox_name: &str) -> Message {
    let created_at = remote
        .internal_date
        .or(remote.envelope.date)
        .unwrap_or_else(Utc::now);
    let status = if remote.seen {
        MessageStatus::Read
    } else {
        MessageStatus::Unread
    };

    Message {
        id: remote.seq.to_string(),
        from: join_addresses(&remote.envelope.from),
        to: join_addresses(&remote.envelope.to),
        subject: remote
            .envelope
            .subject
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "(no subject)".to_string()),
        body: remote.raw.as_deref().map(extract_body_text).unwrap_or_default(),
        status,
        mailbox: mailbox_name.to_string(),
        created_at,
        updated_at: created_at,
        sent_at: None,
    }
}

fn join_addresses(addresses: &[RemoteAddress]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extract display text from raw RFC 2822 source: the first text/plain
/// part, else the text/html source, else the top-level body.
fn extract_body_text(raw: &[u8]) -> String {
    let Ok(parsed) = mailparse::parse_mail(raw) else {
        return String::from_utf8_lossy(raw).into_owned();
    };
    if let Some(text) = find_part(&parsed, "text/plain") {
        return text;
    }
    if let Some(html) = find_part(&parsed, "text/html") {
        return html;
    }
    parsed
        .get_body()
        .unwrap_or_else(|_| String::from_utf8_lossy(raw).into_owned())
}

fn find_part(mail: &mailparse::ParsedMail<'_>, mime: &str) -> Option<String> {
    if mail.ctype.mimetype.eq_ignore_ascii_case(mime) {
        return mail.get_body().ok();
    }
    mail.subparts.iter().find_map(|part| find_part(part, mime))
}
