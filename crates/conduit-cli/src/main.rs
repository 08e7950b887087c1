//! Conduit CLI: an MCP server speaking JSON-RPC over stdio.

mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use conduit_config::{CliOverrides, ConduitConfig, StorageKind};
use conduit_jsonrpc::{KeepAliveSession, PendingResponseBag};
use conduit_mcp::{LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS, ServerInfo, mcp_handler};
use conduit_session::{
    FileSessionStorage, MemorySessionStorage, Session, SessionIdentifier, SessionStorage,
};
use conduit_tools::ToolRegistry;
use conduit_types::{Clock, SystemClock};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use transport::{Outbox, StdioServer};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "conduit", version, about = "An MCP server speaking JSON-RPC over stdio")]
struct Cli {
    /// Config directory (overrides CONDUIT_CONFIG_DIR)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Session storage backend: memory or file
    #[arg(long)]
    storage: Option<StorageKind>,

    /// Directory for file-backed sessions
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Resume an existing session by ID
    #[arg(long)]
    session: Option<Uuid>,

    /// Re-send messages recorded after this event ID before serving
    #[arg(long, requires = "session")]
    last_event_id: Option<String>,

    /// User the session belongs to
    #[arg(long)]
    user: Option<String>,

    /// Seconds between keep-alive pings (0 disables them)
    #[arg(long)]
    keepalive_secs: Option<u64>,

    /// Seconds the client has to answer a server request
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging. Stdout carries the protocol, so logs go to stderr.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    let config = ConduitConfig::load(CliOverrides {
        config_dir: cli.config_dir,
        storage: cli.storage,
        session_dir: cli.session_dir,
        keepalive_secs: cli.keepalive_secs,
        request_timeout_secs: cli.request_timeout_secs,
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let storage: Arc<dyn SessionStorage> = match config.storage {
        StorageKind::Memory => Arc::new(MemorySessionStorage::new()),
        StorageKind::File => Arc::new(
            FileSessionStorage::new(config.session_dir.clone()).with_context(|| {
                format!(
                    "Failed to open session directory {}",
                    config.session_dir.display()
                )
            })?,
        ),
    };

    let session = open_session(cli.session, cli.user, Arc::clone(&storage))?;
    let identifier = session.identifier().clone();
    tracing::info!("Serving session {identifier} ({:?} storage)", config.storage);

    let handler = mcp_handler(
        server_info(&config),
        Arc::new(ToolRegistry::with_builtins()),
        identifier,
        storage,
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pending = PendingResponseBag::new(Arc::clone(&clock), config.request_timeout);
    let keepalive = config
        .keepalive
        .map(|interval| KeepAliveSession::new(Arc::clone(&clock), interval));

    let mut outbox = Outbox::open(session)?;
    let mut stdout = tokio::io::stdout();
    if let Some(event_id) = &cli.last_event_id {
        let replayed = outbox.replay_after(&mut stdout, event_id).await?;
        tracing::info!("Replayed {replayed} message(s) after event {event_id}");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut server = StdioServer::new(handler, outbox, pending, keepalive, config.gc_interval);
    server
        .run(BufReader::new(tokio::io::stdin()), stdout, cancel)
        .await?;

    let outbox = server.outbox();
    tracing::info!(
        "Session {} closed; resume with --session {} (server stream {})",
        outbox.session().identifier(),
        outbox.session().identifier().session_id,
        outbox.stream_id()
    );
    Ok(())
}

/// Resume the named session, or start a fresh one.
fn open_session(
    session_id: Option<Uuid>,
    user: Option<String>,
    storage: Arc<dyn SessionStorage>,
) -> Result<Session> {
    let Some(session_id) = session_id else {
        return Ok(Session::create(storage, user)?);
    };
    let mut identifier = SessionIdentifier::new(session_id);
    identifier.user_identifier = user;
    let session = Session::open(identifier, storage)?;
    if !session.exists()? {
        tracing::warn!("Session {} not found, starting it fresh", session.identifier());
    }
    Ok(session)
}

fn server_info(config: &ConduitConfig) -> ServerInfo {
    let protocol_version = match &config.protocol_version {
        Some(version) if SUPPORTED_PROTOCOL_VERSIONS.contains(&version.as_str()) => version.clone(),
        Some(version) => {
            tracing::warn!(
                "Unsupported protocol_version {version} in config, using {LATEST_PROTOCOL_VERSION}"
            );
            LATEST_PROTOCOL_VERSION.to_string()
        }
        None => LATEST_PROTOCOL_VERSION.to_string(),
    };
    ServerInfo {
        name: config.server_name.clone(),
        version: config.server_version.clone(),
        instructions: config.instructions.clone(),
        protocol_version,
        meta: None,
    }
}
