//! Parley command-line interface
//!
//! A terminal client for peer-to-peer encrypted messaging. The identity is
//! generated automatically on first run; contacts are exchanged by hand as
//! UUID + public key + address.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Parley - peer-to-peer encrypted messaging
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the settings file
    #[arg(short, long, default_value = "parley.conf")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local identity (happens automatically on first run)
    Init {
        /// Display name for the local user
        #[arg(short, long, default_value = "MissingNo")]
        nickname: String,
    },

    /// Show the local identity
    Identity,

    /// Add a contact
    Add {
        /// Display name for the contact
        nickname: String,

        /// Contact's public key (base64)
        #[arg(short, long)]
        key: String,

        /// Contact's hostname or IP
        #[arg(long)]
        host: String,

        /// Contact's server port
        #[arg(short, long)]
        port: u16,

        /// Contact's UUID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// List contacts
    Contacts,

    /// Start a direct conversation with a contact
    Talk {
        /// The contact's UUID
        contact: String,
    },

    /// Create a group conversation
    NewGroup {
        /// Display name of the group
        name: String,

        /// UUIDs of the member contacts
        #[arg(required = true)]
        members: Vec<String>,
    },

    /// List conversations
    Conversations,

    /// Send a message to a conversation
    Send {
        /// The conversation's UUID
        conversation: String,

        /// Message text. A leading `/` marks a command for the receiving
        /// side; type `//` to send a literal slash.
        message: String,
    },

    /// Show the history of a conversation
    History {
        /// The conversation's UUID
        conversation: String,

        /// Number of messages to show
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Run the server and print inbound messages until interrupted
    Listen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app = commands::App::open(&cli.config)?;

    match cli.command {
        Commands::Init { nickname } => commands::init(&app, &nickname),
        Commands::Identity => commands::identity(&app),
        Commands::Add {
            nickname,
            key,
            host,
            port,
            id,
        } => commands::add_contact(&app, &nickname, &key, &host, port, id),
        Commands::Contacts => commands::contacts(&app),
        Commands::Talk { contact } => commands::talk(&app, &contact),
        Commands::NewGroup { name, members } => commands::new_group(&app, &name, &members),
        Commands::Conversations => commands::conversations(&app),
        Commands::Send {
            conversation,
            message,
        } => commands::send(&app, &conversation, &message).await,
        Commands::History {
            conversation,
            limit,
        } => commands::history(&app, &conversation, limit),
        Commands::Listen => commands::listen(&app).await,
    }
}
