//! IMAP implementation of the protocol client
//!
//! Session lifecycle: TCP connect, then either an immediate TLS
//! handshake or a STARTTLS upgrade, then LOGIN. Certificate
//! verification uses the webpki roots unless the connection descriptor
//! opts into accepting invalid certificates (bridge-style servers with
//! self-signed certs).

use crate::config::{RemoteConfig, Security};
use crate::error::{Error, Result};
use crate::remote::client::{
    ClientFactory, Flag, MailClient, MailboxStatus, RemoteAddress, RemoteEnvelope, RemoteMailboxInfo,
    RemoteMessage, SpecialUse,
};
use async_imap::Session;
use async_imap::types::Fetch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// A TLS-wrapped IMAP session.
type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// IMAP client for one remote account.
pub struct ImapClient {
    config: RemoteConfig,
    session: Option<ImapSession>,
}

impl ImapClient {
    #[must_use]
    pub const fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Remote("client is not connected".into()))
    }

    fn tls_connector(&self) -> TlsConnector {
        let config = if self.config.allow_invalid_certs {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };
        TlsConnector::from(Arc::new(config))
    }
}

#[async_trait]
impl MailClient for ImapClient {
    async fn connect(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!("connecting to mail server at {}", addr);

        let tcp_stream = TcpStream::connect(&addr).await?;
        let connector = self.tls_connector();
        let server_name = ServerName::try_from(self.config.host.clone())
            .map_err(|e| Error::Remote(format!("invalid server name: {e}")))?;

        let tls_stream = match self.config.security {
            Security::Tls => connector
                .connect(server_name, tcp_stream)
                .await
                .map_err(|e| Error::Remote(format!("TLS handshake failed: {e}")))?,
            Security::StartTls => {
                let mut client = async_imap::Client::new(tcp_stream.compat());
                client
                    .run_command_and_check_ok("STARTTLS", None)
                    .await
                    .map_err(|e| Error::Remote(format!("STARTTLS failed: {e}")))?;
                let inner = client.into_inner().into_inner();
                connector
                    .connect(server_name, inner)
                    .await
                    .map_err(|e| Error::Remote(format!("TLS handshake failed: {e}")))?
            }
        };

        let tls_client = async_imap::Client::new(tls_stream.compat());
        let session = tls_client
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|(e, _)| Error::Remote(format!("login failed: {e}")))?;

        info!("connected to mail server at {}", addr);
        self.session = Some(session);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session
                .logout()
                .await
                .map_err(|e| Error::Remote(format!("logout failed: {e}")))?;
            debug!("disconnected from mail server");
        }
        Ok(())
    }

    async fn list_mailboxes(&mut self) -> Result<Vec<RemoteMailboxInfo>> {
        let session = self.session()?;
        let mut stream = session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| Error::Remote(format!("LIST failed: {e}")))?;

        let mut mailboxes = Vec::new();
        while let Some(item) = stream.next().await {
            let Ok(name) = item else { continue };
            let attrs: Vec<String> = name
                .attributes()
                .iter()
                .map(|a| format!("{a:?}"))
                .collect();
            mailboxes.push(RemoteMailboxInfo {
                path: name.name().to_string(),
                selectable: !attrs.iter().any(|a| {
                    let lower = a.to_lowercase();
                    lower.contains("noselect") || lower.contains("nonexistent")
                }),
                special_use: special_use_from_attrs(&attrs),
            });
        }
        drop(stream);

        Ok(mailboxes)
    }

    async fn status(&mut self, path: &str) -> Result<MailboxStatus> {
        let session = self.session()?;
        let mailbox = session
            .examine(path)
            .await
            .map_err(|e| Error::Remote(format!("EXAMINE {path} failed: {e}")))?;
        let unseen = session
            .search("UNSEEN")
            .await
            .map_err(|e| Error::Remote(format!("SEARCH UNSEEN failed: {e}")))?;
        Ok(MailboxStatus {
            messages: mailbox.exists,
            unseen: unseen.len() as u32,
        })
    }

    async fn open_mailbox(&mut self, path: &str) -> Result<Option<u32>> {
        let session = self.session()?;
        match session.select(path).await {
            Ok(mailbox) => Ok(Some(mailbox.exists)),
            Err(e) => {
                debug!("SELECT {} failed: {}", path, e);
                Ok(None)
            }
        }
    }

    async fn fetch_range(&mut self, first: u32, last: u32) -> Result<Vec<RemoteMessage>> {
        let session = self.session()?;
        let range = format!("{first}:{last}");
        let mut stream = session
            .fetch(&range, "(FLAGS ENVELOPE INTERNALDATE)")
            .await
            .map_err(|e| Error::Remote(format!("FETCH {range} failed: {e}")))?;

        let mut messages = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(fetch) => messages.push(map_fetch(&fetch)),
                Err(e) => warn!("skipping unreadable message: {}", e),
            }
        }
        drop(stream);

        Ok(messages)
    }

    async fn fetch_full(&mut self, seq: u32) -> Result<Option<RemoteMessage>> {
        let session = self.session()?;
        let mut stream = session
            .fetch(
                seq.to_string(),
                "(FLAGS ENVELOPE INTERNALDATE BODY.PEEK[])",
            )
            .await
            .map_err(|e| Error::Remote(format!("FETCH {seq} failed: {e}")))?;

        let mut found = None;
        while let Some(item) = stream.next().await {
            if let Ok(fetch) = item {
                found = Some(map_fetch(&fetch));
            }
        }
        drop(stream);

        Ok(found)
    }

    async fn add_flags(&mut self, seq: u32, flags: &[Flag]) -> Result<()> {
        let session = self.session()?;
        let joined = flags
            .iter()
            .map(|f| f.as_imap_str())
            .collect::<Vec<_>>()
            .join(" ");
        let mut stream = session
            .store(seq.to_string(), format!("+FLAGS ({joined})"))
            .await
            .map_err(|e| Error::Remote(format!("STORE {seq} failed: {e}")))?;

        // Drain the per-message FETCH responses.
        while let Some(item) = stream.next().await {
            let _ = item;
        }
        drop(stream);

        Ok(())
    }

    async fn append(
        &mut self,
        path: &str,
        raw: &[u8],
        flags: &[Flag],
        _date: DateTime<Utc>,
    ) -> Result<u32> {
        let session = self.session()?;
        let joined = flags
            .iter()
            .map(|f| f.as_imap_str())
            .collect::<Vec<_>>()
            .join(" ");
        let flag_str = format!("({joined})");

        // The server stamps its own INTERNALDATE on the appended copy.
        session
            .append(path, Some(flag_str.as_str()), None::<&str>, raw)
            .await
            .map_err(|e| Error::Remote(format!("APPEND {path} failed: {e}")))?;

        // Without UIDPLUS the new message's id is its position at the
        // end of the mailbox.
        let mailbox = session
            .select(path)
            .await
            .map_err(|e| Error::Remote(format!("SELECT {path} failed: {e}")))?;
        Ok(mailbox.exists)
    }
}

/// Default factory producing [`ImapClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapClientFactory;

impl ClientFactory for ImapClientFactory {
    fn open(&self, config: &RemoteConfig) -> Box<dyn MailClient> {
        Box::new(ImapClient::new(config.clone()))
    }
}

fn special_use_from_attrs(attrs: &[String]) -> Option<SpecialUse> {
    for attr in attrs {
        let lower = attr.to_lowercase();
        if lower.contains("sent") {
            return Some(SpecialUse::Sent);
        }
        if lower.contains("draft") {
            return Some(SpecialUse::Drafts);
        }
        if lower.contains("junk") || lower.contains("spam") {
            return Some(SpecialUse::Junk);
        }
        if lower.contains("trash") || lower.contains("deleted") {
            return Some(SpecialUse::Trash);
        }
        if lower.contains("archive") {
            return Some(SpecialUse::Archive);
        }
    }
    None
}

fn map_fetch(fetch: &Fetch) -> RemoteMessage {
    let envelope = fetch.envelope().map(map_envelope).unwrap_or_default();
    let seen = fetch
        .flags()
        .any(|f| matches!(f, async_imap::types::Flag::Seen));

    RemoteMessage {
        seq: fetch.message,
        envelope,
        seen,
        internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        raw: fetch.body().map(<[u8]>::to_vec),
    }
}

fn map_envelope(envelope: &imap_proto::types::Envelope<'_>) -> RemoteEnvelope {
    RemoteEnvelope {
        from: envelope
            .from
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(map_address)
            .collect(),
        to: envelope
            .to
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(map_address)
            .collect(),
        subject: envelope.subject.as_ref().map(|s| decode_header(s)),
        date: envelope.date.as_ref().and_then(|d| {
            let text = String::from_utf8_lossy(d);
            DateTime::parse_from_rfc2822(text.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }),
    }
}

fn map_address(address: &imap_proto::types::Address<'_>) -> RemoteAddress {
    let name = address
        .name
        .as_ref()
        .map(|n| decode_header(n))
        .filter(|n| !n.is_empty());
    let mailbox = address
        .mailbox
        .as_ref()
        .map(|m| String::from_utf8_lossy(m).to_string())
        .unwrap_or_default();
    let host = address
        .host
        .as_ref()
        .map(|h| String::from_utf8_lossy(h).to_string())
        .unwrap_or_default();
    let full = if host.is_empty() {
        mailbox
    } else {
        format!("{mailbox}@{host}")
    };
    RemoteAddress {
        name,
        address: full,
    }
}

/// Decode RFC 2047 encoded-words (e.g. `=?utf-8?Q?...?=`) in raw
/// envelope bytes, falling back to lossy UTF-8.
fn decode_header(raw: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(raw);
    if !lossy.contains("=?") {
        return lossy.into_owned();
    }
    // Build a synthetic header so mailparse can decode it.
    let fake_header = format!("X: {lossy}");
    match mailparse::parse_header(fake_header.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => lossy.into_owned(),
    }
}

/// Certificate verifier that accepts all certificates (for servers with
/// self-signed certs, opted into via `allow_invalid_certs`).
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
