// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Margin comment hub binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use margin_app_core::{config::ConfigService, MemoryCommentStore};
use margin_changeset::CommentOnlyValidator;
use margin_config_fs::FsConfigStore;
use margin_session_service::{serve, Hub, Settings};
use tokio::net::UnixListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Margin comment hub")]
struct Args {
    /// Unix socket to listen on (overrides `session_host.socket_path`)
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Directory holding the JSON config blobs (defaults to the platform config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let store = match args.config_dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    }
    .context("open config dir")?;
    let config = ConfigService::new(store);
    let settings = Settings::load(&config).context("load settings")?;
    info!(
        config_dir = %config.store().base().display(),
        reserved = %settings.host.reserved_attribute,
        aliases = settings.aliases.aliases.len(),
        "settings loaded"
    );

    let socket_path = args
        .socket
        .unwrap_or_else(|| PathBuf::from(&settings.host.socket_path));

    let hub = Arc::new(Hub::new(
        Arc::new(MemoryCommentStore::new()),
        Arc::new(settings.aliases),
        settings.permissions,
        CommentOnlyValidator::new(settings.host.reserved_attribute),
    ));

    // Remove stale socket if present
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("bind {}", socket_path.display()))?;
    info!("comment hub listening at {}", socket_path.display());

    tokio::select! {
        result = serve(listener, hub) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}
