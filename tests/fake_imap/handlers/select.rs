//! SELECT / EXAMINE command handler.
//!
//! Opens a folder and responds with metadata. The key pieces are:
//!
//! - `* N EXISTS` -- total number of messages in the folder.
//! - `* OK [UIDVALIDITY V]` -- a value that changes if the folder's
//!   UID space is reset. Clients use this to invalidate UID caches.
//!
//! EXAMINE is the read-only variant of SELECT; the only difference in
//! the response is the `[READ-ONLY]` code on the tagged OK.
//!
//! Returns the selected folder name (or `None` if not found).

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the SELECT or EXAMINE command. Returns the selected folder
/// name.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    read_only: bool,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} NO Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return None;
    };

    // RFC 3501 Section 6.3.1: required FLAGS response
    let _ = write_line(
        stream,
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n",
    )
    .await;

    let exists = format!("* {} EXISTS\r\n", folder.messages.len());
    let _ = write_line(stream, &exists).await;

    // RFC 3501 Section 6.3.1: required RECENT response
    let _ = write_line(stream, "* 0 RECENT\r\n").await;

    let _ = write_line(stream, "* OK [UIDVALIDITY 1]\r\n").await;

    let uidnext = folder.messages.len() + 1;
    let _ = write_line(stream, &format!("* OK [UIDNEXT {uidnext}]\r\n")).await;

    let _ = write_line(
        stream,
        "* OK [PERMANENTFLAGS (\\Seen \\Deleted)] Limited\r\n",
    )
    .await;

    // RFC 3501 Section 7.1: UNSEEN (first unseen message)
    if let Some(pos) = folder.messages.iter().position(|m| !m.seen) {
        let _ = write_line(stream, &format!("* OK [UNSEEN {}]\r\n", pos + 1)).await;
    }

    let mode = if read_only { "READ-ONLY" } else { "READ-WRITE" };
    let verb = if read_only { "EXAMINE" } else { "SELECT" };
    let resp = format!("{tag} OK [{mode}] {verb} completed\r\n");
    let _ = write_line(stream, &resp).await;
    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::{MailboxBuilder, TestMessage};
    use tokio::io::BufReader;

    const DATE: &str = "Mon, 01 Jan 2024 12:00:00 +0000";

    fn message() -> TestMessage {
        TestMessage::new("a@b.com", "c@d.com", "Test", DATE, "Body")
    }

    async fn run(
        tag: &str,
        folder_name: &str,
        read_only: bool,
        mailbox: &Mailbox,
    ) -> (String, Option<String>) {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let selected = handle_select(tag, folder_name, read_only, mailbox, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        (String::from_utf8(buf).unwrap(), selected)
    }

    #[tokio::test]
    async fn selects_existing_folder() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .message(message())
            .message(message().seen())
            .build();

        let (output, selected) = run("A1", "INBOX", false, &mailbox).await;

        assert_eq!(selected, Some("INBOX".to_string()));
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("UIDVALIDITY"));
        assert!(output.contains("A1 OK [READ-WRITE] SELECT completed"));
    }

    #[tokio::test]
    async fn examine_reports_read_only() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let (output, selected) = run("A1", "INBOX", true, &mailbox).await;

        assert_eq!(selected, Some("INBOX".to_string()));
        assert!(output.contains("A1 OK [READ-ONLY] EXAMINE completed"));
    }

    #[tokio::test]
    async fn returns_none_for_missing_folder() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let (output, selected) = run("A1", "NoSuchFolder", false, &mailbox).await;

        assert!(selected.is_none());
        assert!(output.contains("A1 NO Folder not found"));
    }

    #[tokio::test]
    async fn sends_unseen_for_first_unseen_message() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .message(message().seen())
            .message(message().seen())
            .message(message())
            .build();
        let (output, _) = run("A1", "INBOX", false, &mailbox).await;
        assert!(output.contains("* OK [UNSEEN 3]"));
    }
}
