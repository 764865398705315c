#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI driver for the webmail service core
//!
//! `demo` runs a scripted in-memory scenario. The other subcommands
//! operate on the account configured through `WEBMAIL_EMAIL` /
//! `WEBMAIL_PASSWORD`, backed by the remote server from the
//! `WEBMAIL_IMAP_*` environment (or the in-memory store when none is
//! configured).

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use webmail::{ComposeRequest, MailService, Message, NewUser, ServiceConfig, UserId};

#[derive(Parser)]
#[command(name = "webmail-cli")]
#[command(about = "Drive the demo webmail service from the terminal")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scripted in-memory scenario with two demo accounts
    Demo,

    /// List the configured account's mailboxes
    Mailboxes,

    /// List messages in a mailbox
    Messages {
        /// Mailbox to list from
        #[arg(long, default_value = "INBOX")]
        mailbox: String,

        /// Maximum number of messages to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a single message by id
    Show {
        /// Message id
        id: String,
    },

    /// Mark a message read
    MarkRead {
        /// Message id
        id: String,
    },

    /// Send a message
    Send {
        #[arg(long)]
        to: String,

        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "")]
        body: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if matches!(args.command, Command::Demo) {
        return cmd_demo(&args).await;
    }

    let service = MailService::new(ServiceConfig::from_env()?);
    let user_id = env_user(&service)?;

    match &args.command {
        Command::Demo => unreachable!("handled above"),
        Command::Mailboxes => cmd_mailboxes(&service, &args, user_id).await?,
        Command::Messages { mailbox, limit } => {
            cmd_messages(&service, &args, user_id, mailbox, *limit).await?;
        }
        Command::Show { id } => {
            let message = service.get_message(user_id, id).await?;
            print_message(&args, &message)?;
        }
        Command::MarkRead { id } => {
            let message = service.mark_read(user_id, id).await?;
            print_message(&args, &message)?;
        }
        Command::Send { to, subject, body } => {
            let message = service
                .send_message(
                    user_id,
                    ComposeRequest {
                        to: to.clone(),
                        subject: subject.clone(),
                        body: body.clone(),
                    },
                )
                .await?;
            print_message(&args, &message)?;
        }
    }

    Ok(())
}

/// Provision the account described by `WEBMAIL_EMAIL` /
/// `WEBMAIL_PASSWORD` and return its id.
fn env_user(service: &MailService) -> anyhow::Result<UserId> {
    let email = std::env::var("WEBMAIL_EMAIL")
        .map_err(|_| anyhow::anyhow!("WEBMAIL_EMAIL not set"))?;
    let password = std::env::var("WEBMAIL_PASSWORD")
        .map_err(|_| anyhow::anyhow!("WEBMAIL_PASSWORD not set"))?;
    let name = std::env::var("WEBMAIL_NAME").unwrap_or_default();

    let profile = service.ensure_user(NewUser {
        email,
        password,
        name,
        remote: None,
    })?;
    Ok(profile.id)
}

async fn cmd_demo(args: &Args) -> anyhow::Result<()> {
    let service = MailService::new(ServiceConfig::default());

    let alice = service.ensure_user(NewUser {
        email: "alice@demo.local".into(),
        password: "alice-pass".into(),
        name: "Alice".into(),
        remote: None,
    })?;
    let bob = service.ensure_user(NewUser {
        email: "bob@demo.local".into(),
        password: "bob-pass".into(),
        name: "Bob".into(),
        remote: None,
    })?;

    service
        .send_message(
            alice.id,
            ComposeRequest {
                to: "Bob <bob@demo.local>".into(),
                subject: "Welcome".into(),
                body: "Hello from the demo scenario.".into(),
            },
        )
        .await?;

    let draft = service.create_draft(
        bob.id,
        &ComposeRequest {
            to: "bob@demo.local".into(),
            subject: "Note to self".into(),
            body: "Drafted, then sent to myself.".into(),
        },
    )?;
    service.send_draft(bob.id, &draft.id)?;

    for profile in [&alice, &bob] {
        let summaries = service.list_mailboxes(profile.id).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            continue;
        }
        println!("{} <{}>", profile.name, profile.email);
        for summary in &summaries {
            println!(
                "  {:<10} {:>3} total {:>3} unread",
                summary.name, summary.total, summary.unread
            );
        }
    }

    Ok(())
}

async fn cmd_mailboxes(service: &MailService, args: &Args, user_id: UserId) -> anyhow::Result<()> {
    let summaries = service.list_mailboxes(user_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            println!(
                "{:<30} {:>5} total {:>5} unread",
                summary.name, summary.total, summary.unread
            );
        }
    }

    Ok(())
}

async fn cmd_messages(
    service: &MailService,
    args: &Args,
    user_id: UserId,
    mailbox: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let messages = service.list_messages(user_id, mailbox).await?;
    let display: Vec<&Message> = messages.iter().take(limit).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&display)?);
    } else {
        print_message_table(&display);
    }

    Ok(())
}

fn print_message(args: &Args, message: &Message) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&message)?);
        return Ok(());
    }

    println!("Id:      {}", message.id);
    println!("Date:    {}", message.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("From:    {}", message.from);
    println!("To:      {}", message.to);
    println!("Subject: {}", message.subject);
    println!("Status:  {}", message.status);
    println!("Mailbox: {}", message.mailbox);
    println!("\n--- Body ---\n");
    println!("{}", message.body);
    Ok(())
}

fn print_message_table(messages: &[&Message]) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }

    let header = format!(
        "{:<8} {:<17} {:<8} {:<28} {}",
        "Id", "Date", "Status", "From", "Subject"
    );
    println!("{header}");
    println!("{}", "-".repeat(100));

    for message in messages {
        println!(
            "{:<8} {:<17} {:<8} {:<28} {}",
            truncate(&message.id, 8),
            message.created_at.format("%Y-%m-%d %H:%M"),
            message.status,
            truncate(&message.from, 26),
            truncate(&message.subject, 40),
        );
    }

    println!("\n{} message(s)", messages.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
