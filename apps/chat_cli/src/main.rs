use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use client_core::{
    format::{day_label, last_seen_label, message_time, relative_time, resolve_reaction},
    reconcile::reaction_summary,
    AlwaysOnline, ChatClient, ClientEvent, SendOutcome, TimelineEntry, TimelineItem,
};
use shared::domain::MessageId;
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Parser, Debug)]
#[command(about = "Sync and post to a chat room from the terminal")]
struct Args {
    /// TOML settings file. Defaults to ./chat.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the session, then load participants and the newest messages.
    Sync,
    /// Load the page before the oldest loaded message.
    Older,
    Send {
        text: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
    React {
        message_id: String,
        /// Emoji, or 1-6 for 👍 ❤️ 😄 😮 😂 😢.
        emoji: String,
    },
    /// Retry messages queued while offline.
    Flush,
    Participants {
        #[arg(long)]
        search: Option<String>,
    },
    /// Bootstrap, then poll until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|err| {
        error!(%database_url, "failed to open local state: {err:#}");
        err
    })?;
    info!(%database_url, base_url = %settings.base_url, "chat_cli: starting");
    let client =
        ChatClient::open(settings.client_config(), storage, Arc::new(AlwaysOnline)).await?;

    match args.command {
        Command::Sync => {
            let check = client.bootstrap().await?;
            if check.rotated {
                println!("new session {}", check.info.session_uuid);
            }
            print_timeline(&client).await;
        }
        Command::Older => {
            let appended = client.load_older().await?;
            print_timeline(&client).await;
            match client.messages().chronological().await.first() {
                Some(oldest) => println!(
                    "loaded {appended} older message(s); oldest from {}",
                    relative_time(oldest.message.sent_at, Utc::now())
                ),
                None => println!("loaded {appended} older message(s)"),
            }
        }
        Command::Send { text, reply_to } => {
            let reply_to = reply_to.map(MessageId::new);
            match client.send_message(&text, reply_to).await? {
                SendOutcome::Delivered(message) => println!("sent {}", message.uuid),
                SendOutcome::Queued { temp_id } => {
                    println!("offline, queued as {temp_id}; run `flush` once reconnected")
                }
            }
        }
        Command::React { message_id, emoji } => {
            let emoji = resolve_reaction(&emoji);
            client
                .add_reaction(&MessageId::new(message_id), emoji)
                .await?;
            println!("reaction {emoji} saved");
        }
        Command::Flush => {
            let delivered = client.process_queue().await?;
            let queued = client.messages().pending().await.len();
            println!("delivered {delivered}, {queued} still queued");
        }
        Command::Participants { search } => {
            let participants = match search {
                Some(query) => client.participants().search(&query).await,
                None => client.participants().list().await,
            };
            let now = Utc::now();
            for participant in participants {
                let seen = participant
                    .last_seen_at
                    .map(|ts| format!("last seen {}", last_seen_label(ts, now)))
                    .unwrap_or_else(|| "online".to_string());
                println!(
                    "{:<24} {:<36} {seen}",
                    participant.name,
                    participant.uuid.as_str()
                );
            }
        }
        Command::Watch => watch(client).await?,
    }

    Ok(())
}

async fn watch(client: Arc<ChatClient>) -> Result<()> {
    client.bootstrap().await?;
    print_timeline(&client).await;
    let mut events = client.subscribe_events();
    let poller = client.spawn_poller();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::MessagesChanged) => print_timeline(&client).await,
                Ok(ClientEvent::SyncFailed(err)) => eprintln!("sync failed: {}", err.message),
                Ok(ClientEvent::SessionInvalidated) => {
                    eprintln!("session rejected by server; local state cleared");
                    break;
                }
                Ok(other) => info!(?other, "chat_cli: event"),
                Err(err) => info!("chat_cli: event stream: {err}"),
            },
        }
    }

    poller.abort();
    Ok(())
}

async fn print_timeline(client: &ChatClient) {
    let today = Local::now().date_naive();
    for item in client.grouped_timeline(&Local).await {
        match item {
            TimelineItem::DateSeparator(date) => {
                println!("\n----- {} -----", day_label(date, today))
            }
            TimelineItem::Group(group) => {
                let sender = client.participants().display_name(&group.sender).await;
                println!("{sender}:");
                for entry in &group.items {
                    println!("  {}", render_entry(entry));
                }
            }
        }
    }
}

fn render_entry(entry: &TimelineEntry) -> String {
    let message = &entry.message;
    let mut line = format!(
        "[{}] {} {}",
        message_time(message.sent_at, &Local),
        message.uuid,
        message.text
    );
    if let Some(target) = &message.reply_to_message_uuid {
        line.push_str(&format!(" (reply to {target})"));
    }
    if message.is_edited() {
        line.push_str(" (edited)");
    }
    if !message.attachments.is_empty() {
        line.push_str(&format!(" [{} attachment(s)]", message.attachments.len()));
    }
    for (value, count) in reaction_summary(&message.reactions) {
        line.push_str(&format!(" {value}{count}"));
    }
    if entry.is_pending() {
        line.push_str(" (sending)");
    }
    line
}
