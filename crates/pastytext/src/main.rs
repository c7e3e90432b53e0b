//! # pastytext
//!
//! Shared clipboard server binary: loads settings, opens the paste store,
//! and serves HTTP + WebSocket until interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use pasty_core::constants::VERSION;
use pasty_core::logging;
use pasty_server::{PastyServer, ServerConfig};
use pasty_settings::{PastySettings, StoreSettings};
use pasty_store::{PasteRepository, PasteStore};
use tracing::{info, warn};

/// pastytext server.
#[derive(Parser, Debug)]
#[command(name = "pastytext", version, about = "Shared clipboard server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long, short)]
    port: Option<u16>,

    /// `SQLite` file for persisted pastes (overrides `DB_FILE`).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Directory of static client files served at `/`.
    #[arg(long)]
    web_dir: Option<PathBuf>,

    /// Maximum pastes retained.
    #[arg(long)]
    capacity: Option<usize>,

    /// Settings file (default `~/.pastytext/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut PastySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.store.db_path = Some(path.to_string_lossy().into_owned());
        }
        if let Some(dir) = &self.web_dir {
            settings.server.web_dir = Some(dir.to_string_lossy().into_owned());
        }
        if let Some(capacity) = self.capacity {
            settings.store.capacity = capacity;
        }
    }
}

/// Open the paste store, backed by `SQLite` when a path is configured.
fn open_store(settings: &StoreSettings) -> Result<PasteStore> {
    let Some(db_path) = settings.db_path.as_deref() else {
        info!(capacity = settings.capacity, "using in-memory paste store");
        return Ok(PasteStore::new(settings.capacity));
    };
    let path = Path::new(db_path);
    let repository = PasteRepository::open(path)
        .with_context(|| format!("failed to open paste database {}", path.display()))?;
    let store = PasteStore::with_repository(settings.capacity, repository)
        .context("failed to load persisted pastes")?;
    info!(
        db_path,
        capacity = settings.capacity,
        restored = store.len(),
        "using persistent paste store"
    );
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.config.clone().unwrap_or_else(pasty_settings::settings_path);
    let mut settings = pasty_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("invalid settings")?;

    if settings.logging.json {
        logging::init_json_subscriber(&settings.logging.level);
    } else {
        logging::init_subscriber(&settings.logging.level);
    }

    let metrics = pasty_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;
    let store = open_store(&settings.store)?;
    let server =
        PastyServer::new(ServerConfig::from(&settings.server), store).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    info!(version = VERSION, "pastytext listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    if !server.stop(handle).await {
        warn!("shutdown timed out before every session closed");
    }
    info!("shutdown complete");
    Ok(())
}
