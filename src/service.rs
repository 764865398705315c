//! Mailbox service orchestrator
//!
//! Owns the user records and routes every mailbox/message operation to
//! whichever backend resolves for the user: the in-memory store, or the
//! protocol adapter when a usable remote configuration can be assembled
//! from user-level overrides merged over the service defaults.

use crate::address::{self, ParsedAddress};
use crate::backend::MailboxBackend;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::hasher::{CredentialHasher, Sha256Hasher};
use crate::mailbox::{self, MailboxSummary};
use crate::message::{Message, MessageStatus};
use crate::relay::{LogRelay, OutgoingMail, Relay, RelayAuth, SmtpRelay};
use crate::remote::RemoteMailbox;
use crate::remote::client::ClientFactory;
use crate::remote::imap::ImapClientFactory;
use crate::store::MemoryStore;
use crate::user::{User, UserId, UserProfile};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;

/// Provisioning payload for [`MailService::ensure_user`].
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub remote: Option<crate::config::RemoteOverrides>,
}

/// Compose payload for sending and for drafts.
#[derive(Debug, Clone, Default)]
pub struct ComposeRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
struct UserTable {
    by_id: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
}

/// The webmail service core.
pub struct MailService {
    config: ServiceConfig,
    store: MemoryStore,
    remote: RemoteMailbox,
    relay: Arc<dyn Relay>,
    hasher: Arc<dyn CredentialHasher>,
    users: Mutex<UserTable>,
}

impl MailService {
    /// Build a service with the default collaborators: an SMTP relay
    /// when one is configured (a logging relay otherwise), SHA-256
    /// credential digests, and the IMAP client factory.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let relay: Arc<dyn Relay> = match config.smtp.clone() {
            Some(smtp) => Arc::new(SmtpRelay::new(smtp)),
            None => Arc::new(LogRelay),
        };
        Self::with_collaborators(config, relay, Arc::new(Sha256Hasher), Arc::new(ImapClientFactory))
    }

    /// Build a service with explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: ServiceConfig,
        relay: Arc<dyn Relay>,
        hasher: Arc<dyn CredentialHasher>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let remote = RemoteMailbox::new(factory, config.remote_defaults.clone());
        Self {
            config,
            store: MemoryStore::new(),
            remote,
            relay,
            hasher,
            users: Mutex::new(UserTable::default()),
        }
    }

    fn table(&self) -> MutexGuard<'_, UserTable> {
        self.users.lock().expect("user table lock poisoned")
    }

    /// Create the account for `email`, or update it when it already
    /// exists (fresh credential digest, name and overrides).
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] on a malformed email or short password.
    pub fn ensure_user(&self, new_user: NewUser) -> Result<UserProfile> {
        let email = new_user.email.trim().to_ascii_lowercase();
        if !address::is_valid_address(&email) {
            return Err(Error::Validation("email must be a valid address".into()));
        }
        if new_user.password.len() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let credential_hash = self.hasher.hash(&new_user.password);
        let mut table = self.table();

        let user = match table.by_email.get(&email).copied() {
            Some(id) => {
                let existing = table
                    .by_id
                    .get_mut(&id)
                    .expect("user email index out of sync");
                existing.credential_hash = credential_hash;
                existing.name = new_user.name.trim().to_string();
                existing.remote = new_user.remote;
                debug!("updated user {}", existing.email);
                existing.clone()
            }
            None => {
                let user = User {
                    id: Uuid::new_v4(),
                    email: email.clone(),
                    name: new_user.name.trim().to_string(),
                    credential_hash,
                    remote: new_user.remote,
                };
                self.store.init_user(user.id);
                table.by_email.insert(email, user.id);
                table.by_id.insert(user.id, user.clone());
                info!("provisioned user {}", user.email);
                user
            }
        };
        drop(table);

        Ok(self.profile(&user))
    }

    /// Look up a user by credentials. Returns `None` on unknown email
    /// or digest mismatch; bad credentials are not an error.
    #[must_use]
    pub fn authenticate(&self, email: &str, password: &str) -> Option<User> {
        let email = email.trim().to_ascii_lowercase();
        let table = self.table();
        let user = table.by_email.get(&email).and_then(|id| table.by_id.get(id))?;
        if self.hasher.verify(password, &user.credential_hash) {
            Some(user.clone())
        } else {
            None
        }
    }

    /// Resolve a user id to its record.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for ids the service never issued.
    pub fn user(&self, user_id: UserId) -> Result<User> {
        self.table()
            .by_id
            .get(&user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown user: {user_id}")))
    }

    fn user_by_email(&self, email: &str) -> Option<User> {
        let table = self.table();
        table
            .by_email
            .get(email)
            .and_then(|id| table.by_id.get(id))
            .cloned()
    }

    fn profile(&self, user: &User) -> UserProfile {
        let remote = self.remote.resolve(user);
        UserProfile {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            remote_backed: remote.is_some(),
            remote_host: remote.map(|c| c.host),
        }
    }

    fn backend_for(&self, user: &User) -> &dyn MailboxBackend {
        if self.remote.resolve(user).is_some() {
            &self.remote
        } else {
            &self.store
        }
    }

    /// List the user's mailboxes.
    pub async fn list_mailboxes(&self, user_id: UserId) -> Result<Vec<MailboxSummary>> {
        let user = self.user(user_id)?;
        self.backend_for(&user).list_mailboxes(&user).await
    }

    /// List one mailbox's messages, newest first.
    pub async fn list_messages(&self, user_id: UserId, mailbox_name: &str) -> Result<Vec<Message>> {
        let user = self.user(user_id)?;
        self.backend_for(&user).list_messages(&user, mailbox_name).await
    }

    /// Fetch one message by id.
    pub async fn get_message(&self, user_id: UserId, id: &str) -> Result<Message> {
        let user = self.user(user_id)?;
        self.backend_for(&user).get_message(&user, id).await
    }

    /// Mark one message read. Idempotent.
    pub async fn mark_read(&self, user_id: UserId, id: &str) -> Result<Message> {
        let user = self.user(user_id)?;
        self.backend_for(&user).mark_read(&user, id).await
    }

    /// Send a message: validate, normalize recipients, dispatch through
    /// the relay, persist the sent copy on the user's backend, then fan
    /// out local inbox copies to known in-memory recipients.
    pub async fn send_message(&self, user_id: UserId, request: ComposeRequest) -> Result<Message> {
        let user = self.user(user_id)?;
        if request.to.trim().is_empty() {
            return Err(Error::Validation("to is required".into()));
        }
        if request.subject.trim().is_empty() {
            return Err(Error::Validation("subject is required".into()));
        }
        let recipients = address::parse_addresses(&request.to);
        if recipients.is_empty() {
            return Err(Error::Validation(
                "to must include at least one valid email address".into(),
            ));
        }
        let to = recipients
            .iter()
            .map(|r| r.formatted.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let now = Utc::now();
        let message = Message {
            id: Message::generate_id(),
            from: user.formatted_address(),
            to,
            subject: request.subject.trim().to_string(),
            body: request.body,
            status: MessageStatus::Sent,
            mailbox: mailbox::SENT.to_string(),
            created_at: now,
            updated_at: now,
            sent_at: Some(now),
        };

        let remote_config = self.remote.resolve(&user);
        let auth = remote_config.as_ref().map(|config| RelayAuth {
            username: config.username.clone(),
            password: config.password.clone(),
        });
        self.relay
            .send_mail(&OutgoingMail {
                from: message.from.clone(),
                to: message.to.clone(),
                subject: message.subject.clone(),
                text: message.body.clone(),
                auth,
            })
            .await?;

        let sent = if remote_config.is_some() {
            self.remote.append_sent(&user, message).await?
        } else {
            self.store.store_message(user.id, message)?
        };

        if self.config.all_remote() {
            debug!("all users are provider-backed, skipping local fan-out");
        } else {
            self.fan_out(&recipients, &sent);
        }
        Ok(sent)
    }

    /// Deliver a fresh unread inbox copy to every recipient that is a
    /// locally known, in-memory-backed account. Unknown and
    /// provider-backed recipients receive nothing here; their delivery
    /// happens through the real provider.
    fn fan_out(&self, recipients: &[ParsedAddress], sent: &Message) {
        for recipient in recipients {
            let Some(target) = self.user_by_email(&recipient.address) else {
                continue;
            };
            if self.remote.resolve(&target).is_some() {
                continue;
            }

            let now = Utc::now();
            let copy = Message {
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
            match self.store.store_message(target.id, copy) {
                Ok(_) => debug!("delivered local copy to {}", recipient.address),
                Err(e) => warn!("local delivery to {} failed: {}", recipient.address, e),
            }
        }
    }

    /// Create a draft in the user's in-memory drafts mailbox. Drafts
    /// are local even for protocol-backed users.
    pub fn create_draft(&self, user_id: UserId, request: &ComposeRequest) -> Result<Message> {
        let user = self.user(user_id)?;
        self.store.create_draft(
            user.id,
            &user.formatted_address(),
            &request.to,
            &request.subject,
            &request.body,
        )
    }

    /// Send a previously created draft.
    pub fn send_draft(&self, user_id: UserId, draft_id: &str) -> Result<Message> {
        let user = self.user(user_id)?;
        self.store.send_draft(user.id, draft_id)
    }
}
