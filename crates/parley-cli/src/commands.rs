//! Command implementations.

use anyhow::{anyhow, Context, Result};
use parley_core::config::Settings;
use parley_core::conversation::Conversation;
use parley_core::crypto::{HybridCipher, PublicKey, StaticKeypair};
use parley_core::fanout::Fanout;
use parley_core::identity::{self, LocalIdentity};
use parley_core::peer::{Peer, PeerDirectory};
use parley_core::protocol::PlainMessage;
use parley_core::storage::{Database, DatabaseConfig};
use parley_core::transport::{DeliveryClient, MessageSink, Server};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Shared state for all commands: settings plus the opened database.
pub struct App {
    settings: Settings,
    db: Database,
}

impl App {
    /// Load settings (falling back to defaults when the file is missing)
    /// and open the database.
    pub fn open(config_path: &str) -> Result<Self> {
        let settings = if Path::new(config_path).exists() {
            Settings::load(config_path).context("loading settings")?
        } else {
            Settings::default()
        };
        let db = Database::open(&DatabaseConfig::at(settings.db_path()))
            .context("opening database")?;
        Ok(Self { settings, db })
    }

    fn local_identity(&self, nickname: &str) -> Result<LocalIdentity> {
        Ok(identity::load_or_generate(
            &self.db,
            nickname,
            self.settings.nick_len_limit(),
        )?)
    }
}

/// Create the local identity, or show the existing one.
pub fn init(app: &App, nickname: &str) -> Result<()> {
    let identity = app.local_identity(nickname)?;
    println!("identity ready");
    print_identity(&identity, &app.settings);
    Ok(())
}

/// Show the local identity.
pub fn identity(app: &App) -> Result<()> {
    let identity = app.local_identity("MissingNo")?;
    print_identity(&identity, &app.settings);
    Ok(())
}

fn print_identity(identity: &LocalIdentity, settings: &Settings) {
    println!("id:          {}", identity.id());
    println!("nickname:    {}", identity.nickname());
    println!("public key:  {}", identity.public_key_text());
    println!("fingerprint: {}", identity.fingerprint());
    println!("address:     {}:{}", settings.host(), settings.port());
}

/// Store a new contact.
pub fn add_contact(
    app: &App,
    nickname: &str,
    key: &str,
    host: &str,
    port: u16,
    id: Option<String>,
) -> Result<()> {
    PublicKey::from_text(key).context("the given public key is not usable")?;

    let peer = Peer::new(
        id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        nickname,
        key,
        host,
        port,
        app.settings.nick_len_limit(),
    );
    app.db.add_contact(&peer)?;
    println!("added contact {} ({})", peer.nickname, peer.id);
    Ok(())
}

/// List all contacts.
pub fn contacts(app: &App) -> Result<()> {
    let contacts = app.db.list_contacts()?;
    if contacts.is_empty() {
        println!("no contacts yet; use `parley add`");
        return Ok(());
    }
    for peer in contacts {
        println!("{}  {}  {}:{}", peer.id, peer.nickname, peer.host, peer.port);
    }
    Ok(())
}

/// Start a direct conversation with a known contact.
pub fn talk(app: &App, contact_id: &str) -> Result<()> {
    let host = app.db.lookup(contact_id)?;
    let conversation = Conversation::direct(host);
    app.db.add_conversation(&conversation)?;
    println!(
        "conversation {} with {}",
        conversation.id(),
        conversation.name()
    );
    Ok(())
}

/// Create a group conversation from known contacts.
pub fn new_group(app: &App, name: &str, member_ids: &[String]) -> Result<()> {
    let mut members = Vec::with_capacity(member_ids.len());
    for id in member_ids {
        members.push(app.db.lookup(id)?);
    }
    let conversation = Conversation::group(name, members)
        .ok_or_else(|| anyhow!("a group needs at least one member"))?;
    app.db.add_conversation(&conversation)?;
    println!("group {} ({})", conversation.name(), conversation.id());
    Ok(())
}

/// List all conversations.
pub fn conversations(app: &App) -> Result<()> {
    let conversations = app.db.list_conversations()?;
    if conversations.is_empty() {
        println!("no conversations yet; use `parley talk` or `parley new-group`");
        return Ok(());
    }
    for conversation in conversations {
        let kind = if conversation.is_host() { "group" } else { "direct" };
        println!(
            "{}  {}  {} ({} participant{})",
            conversation.id(),
            kind,
            conversation.name(),
            conversation.participants().len(),
            if conversation.participants().len() == 1 { "" } else { "s" },
        );
    }
    Ok(())
}

/// Send one message to every participant of a conversation.
pub async fn send(app: &App, conversation_id: &str, text: &str) -> Result<()> {
    let identity = app.local_identity("MissingNo")?;
    let conversation = app
        .db
        .get_conversation(conversation_id)?
        .ok_or_else(|| anyhow!("no conversation with id {}", conversation_id))?;

    // A double slash sends a literal slash without flagging a command.
    let (content, literal) = match text.strip_prefix("//") {
        Some(rest) => (format!("/{}", rest), true),
        None => (text.to_string(), false),
    };
    let mut msg = PlainMessage::new(content, conversation.id(), identity.id());
    if literal {
        msg.is_command = false;
    }

    let fanout = Fanout::new(
        HybridCipher::new(&app.settings),
        DeliveryClient::new(&app.settings),
    );
    let report = fanout.broadcast(&msg, &conversation).await;

    for failed_id in &report.failed {
        let nickname = app
            .db
            .get_contact(failed_id)?
            .map(|p| p.nickname)
            .unwrap_or_else(|| failed_id.clone());
        eprintln!("sending to '{}' failed", nickname);
    }
    if report.all_delivered() {
        msg.mark_sent();
        println!("delivered to {} participant(s)", report.attempted());
    } else {
        println!(
            "delivered to {} of {} participant(s)",
            report.delivered.len(),
            report.attempted()
        );
    }
    app.db.add_message(&msg)?;
    Ok(())
}

/// Print the stored history of a conversation.
pub fn history(app: &App, conversation_id: &str, limit: u32) -> Result<()> {
    let identity = app.local_identity("MissingNo")?;
    let messages = app.db.messages_for_conversation(conversation_id, limit)?;
    for msg in messages {
        let sender = if msg.sender_id == identity.id() {
            identity.nickname().to_string()
        } else {
            app.db
                .get_contact(&msg.sender_id)?
                .map(|p| p.nickname)
                .unwrap_or_else(|| short_id(&msg.sender_id))
        };
        let marker = if msg.is_command { " (command)" } else { "" };
        println!(
            "[{}] {}{}: {}",
            format_time(msg.timestamp),
            sender,
            marker,
            msg.content
        );
    }
    Ok(())
}

/// Run the inbound server until interrupted, printing received messages.
pub async fn listen(app: &App) -> Result<()> {
    let identity = app.local_identity("MissingNo")?;
    let local = StaticKeypair::from_secret_bytes(identity.keypair().secret_bytes());

    let server = Server::bind(&app.settings).await?;
    let addr = server.local_addr()?;
    let handle = server.handle();

    // The sink runs on the server task; give it its own connection.
    let sink_db = Database::open(&DatabaseConfig::at(app.settings.db_path()))?;
    let sink = Arc::new(RecordingSink {
        db: Mutex::new(sink_db),
    });

    let task = tokio::spawn(server.run(HybridCipher::new(&app.settings), local, sink));
    println!("listening on {} as {} - ctrl-c to stop", addr, identity.nickname());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    tracing::info!("interrupt received, shutting down");
    handle.shutdown().await;
    task.await.context("server task")?;
    Ok(())
}

/// Prints inbound messages and appends them to the history.
struct RecordingSink {
    db: Mutex<Database>,
}

impl MessageSink for RecordingSink {
    fn accept(&self, message: PlainMessage) -> parley_core::Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|_| parley_core::Error::Storage("sink lock poisoned".into()))?;

        let sender = db
            .get_contact(&message.sender_id)?
            .map(|p| p.nickname)
            .unwrap_or_else(|| short_id(&message.sender_id));

        if message.is_command {
            // Commands are displayed, never executed here.
            println!(
                "[{}] {} sent a command: {}",
                format_time(message.timestamp),
                sender,
                message.content
            );
        } else {
            println!(
                "[{}] {}: {}",
                format_time(message.timestamp),
                sender,
                message.content
            );
        }

        db.add_message(&message)?;
        Ok(())
    }
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}
