//! CLI parser, config loading and command handlers.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use message_store::{Message, MessageStore, StoreConfig};

/// Default log file when LOG_FILE is unset.
pub const DEFAULT_LOG_FILE: &str = "logs/relay-store.log";

#[derive(Parser, Debug)]
#[command(name = "relay-store")]
#[command(about = "Inspect and maintain the relay message store", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database to open; overrides MESSAGE_STORE_URL.
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List messages not yet sent, newest first.
    Pending,
    /// List sent messages, newest first.
    Sent,
    /// List the first N messages in storage order.
    List {
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Print one message as JSON.
    Show { uuid: String },
    /// Print total, pending and sent counts.
    Stats,
    /// Insert messages from a JSON array file in one batch.
    Import { file: PathBuf },
    /// Write every message to stdout as a JSON array.
    Export,
    /// Delete every sent message.
    PurgeSent,
    /// Delete every message.
    PurgeAll,
}

/// Load StoreConfig from environment. If `database` is provided it overrides MESSAGE_STORE_URL.
pub fn load_config(database: Option<String>) -> Result<StoreConfig> {
    let mut config = StoreConfig::from_env()?;
    if let Some(url) = database {
        config.database_url = url;
    }
    config.validate()?;
    Ok(config)
}

/// LOG_FILE or [`DEFAULT_LOG_FILE`].
pub fn log_file() -> String {
    env::var("LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string())
}

/// Reads a JSON array of messages.
pub fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Read messages from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Parse messages in {}", path.display()))
}

const BODY_PREVIEW_LEN: usize = 60;

fn print_table(messages: &[Message]) {
    if messages.is_empty() {
        println!("No messages.");
        return;
    }
    println!(
        "{:<36} {:<19} {:<11} {:<11} {:>7} {}",
        "uuid", "timestamp", "type", "status", "retries", "body_preview"
    );
    println!("{}", "-".repeat(120));
    for m in messages {
        let preview: String = m.body.chars().take(BODY_PREVIEW_LEN).collect();
        println!(
            "{:<36} {:<19} {:<11} {:<11} {:>7} {}",
            m.uuid,
            m.timestamp.format("%Y-%m-%d %H:%M:%S"),
            m.message_type.as_str(),
            m.status.as_str(),
            m.retries,
            preview.replace('\n', " ")
        );
    }
}

/// Runs one command against the store.
pub async fn run(store: &MessageStore, command: Commands) -> Result<()> {
    match command {
        Commands::Pending => print_table(&store.fetch_pending().await?),
        Commands::Sent => print_table(&store.fetch_sent().await?),
        Commands::List { limit } => print_table(&store.fetch_by_limit(limit).await?),
        Commands::Show { uuid } => match store.fetch_by_uuid(uuid.as_str()).await? {
            Some(message) => println!("{}", serde_json::to_string_pretty(&message)?),
            None => anyhow::bail!("No message with uuid {}", uuid),
        },
        Commands::Stats => {
            let stats = store.stats().await?;
            println!(
                "Total: {}, Pending: {}, Sent: {}",
                stats.total, stats.pending, stats.sent
            );
        }
        Commands::Import { file } => {
            let messages = read_messages(&file)?;
            let count = messages.len();
            store
                .put_many(messages)
                .await
                .context("Insert imported messages")?;
            println!("Imported {} message(s).", count);
        }
        Commands::Export => {
            let messages = store.fetch_all().await?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        Commands::PurgeSent => {
            let rows = store.delete_all_sent().await?;
            println!("Deleted {} sent message(s).", rows);
        }
        Commands::PurgeAll => {
            let rows = store.delete_all().await?;
            println!("Deleted {} message(s).", rows);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use message_store::{MessageStatus, MessageType};

    #[test]
    fn test_parse_list_with_limit() {
        let cli = Cli::try_parse_from(["relay-store", "list", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::List { limit: 5 }));
        assert!(cli.database.is_none());
    }

    #[test]
    fn test_parse_global_database_flag() {
        let cli =
            Cli::try_parse_from(["relay-store", "purge-sent", "--database", "x.db"]).unwrap();
        assert!(matches!(cli.command, Commands::PurgeSent));
        assert_eq!(cli.database.as_deref(), Some("x.db"));
    }

    #[test]
    fn test_read_messages_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"uuid":"j1","body":"hi","from":null,"timestamp":"2024-01-01T00:00:00Z",
                "message_type":"TASK","status":"PENDING"}]"#,
        )
        .unwrap();

        let messages = read_messages(&path).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].uuid, "j1");
        assert_eq!(messages[0].message_type, MessageType::Task);
        assert_eq!(messages[0].status, MessageStatus::Pending);
        assert_eq!(messages[0].retries, 0);
    }

    #[tokio::test]
    async fn test_import_then_purge_sent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        let batch = vec![
            Message::new("a", None, MessageType::Task).with_uuid("i1"),
            Message::new("b", None, MessageType::Task)
                .with_uuid("i2")
                .with_status(MessageStatus::Sent),
        ];
        std::fs::write(&path, serde_json::to_string(&batch).unwrap()).unwrap();
        let store = MessageStore::with_current_runtime(StoreConfig::in_memory());

        run(&store, Commands::Import { file: path }).await.unwrap();
        run(&store, Commands::PurgeSent).await.unwrap();

        let remaining = store.fetch_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].uuid, "i1");
        assert!(run(&store, Commands::Show { uuid: "i2".to_string() }).await.is_err());
    }
}
