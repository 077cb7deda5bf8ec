//! Parley terminal client entry point.
//!
//! # Usage
//!
//! ```bash
//! # Token from the environment, open conversation 42 on start
//! PARLEY_TOKEN=... parley --api-url http://localhost:8080 --conversation 42
//!
//! # Token file re-read on every reconnect
//! parley --url ws://chat.example.com/ws-chat --token-file ~/.parley/token
//! ```

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use parley_cli::Runtime;
use parley_client::{
    ConversationId, FileTokenStore, Messenger, MessengerConfig, StaticToken, TokenStore, WebSocketConnector,
    rest::HttpConversationApi, token_subject,
};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley terminal client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Terminal client for Parley conversations")]
#[command(version)]
struct Args {
    /// Broker WebSocket endpoint
    #[arg(short, long, default_value = "ws://localhost:8080/ws-chat")]
    url: String,

    /// REST API base URL
    ///
    /// Without it there is no history and no conversation directory.
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token (takes precedence over --token-file)
    #[arg(long, env = "PARLEY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// File holding the bearer token, re-read on every connect
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Conversation to open after connecting
    #[arg(short, long)]
    conversation: Option<u64>,

    /// Time allowed for the broker to confirm the connection
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// Quiet period after the last keystroke before "stopped typing"
    #[arg(long, default_value = "3000")]
    typing_window_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let tokens: Arc<dyn TokenStore> = match (args.token, args.token_file) {
        (Some(token), _) => Arc::new(StaticToken::new(token)),
        (None, Some(path)) => Arc::new(FileTokenStore::new(path)),
        (None, None) => {
            tracing::warn!("No token provided - connecting without credentials");
            Arc::new(StaticToken::none())
        },
    };
    let own = tokens.token().as_deref().and_then(token_subject);

    let config = MessengerConfig::default()
        .with_connect_timeout(Duration::from_millis(args.connect_timeout_ms))
        .with_typing_window(Duration::from_millis(args.typing_window_ms));

    tracing::info!(url = %args.url, user = ?own, "Parley client starting");
    let messenger = Messenger::new(WebSocketConnector::new(args.url), Arc::clone(&tokens), config);
    let api = args.api_url.map(|url| HttpConversationApi::new(&url, tokens));

    Runtime::new(messenger, api, own)
        .run(args.conversation.map(ConversationId), BufReader::new(tokio::io::stdin()), io::stdout())
        .await?;

    Ok(())
}
