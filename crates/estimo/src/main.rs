//! Estimo server binary.
//!
//! Settings come from `~/.estimo/settings.json` (or `--settings`), then
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use estimo_core::logging::{LogFormat, init_subscriber};
use estimo_core::{LiveRoomStore, RoomRepository, TaskRepository};
use estimo_server::{EstimoServer, ServerConfig};
use estimo_service::AppServices;
use estimo_settings::{EstimoSettings, StorageBackend};
use estimo_store::sqlite::{ConnectionConfig, open_pool};
use estimo_store::{
    InMemoryRoomRepository, InMemoryTaskRepository, ReaperConfig, RoomStateStore,
    SqliteRoomRepository, SqliteTaskRepository,
};
use tracing::info;

/// Estimo planning-poker server.
#[derive(Parser, Debug)]
#[command(name = "estimo", about = "Planning-poker estimation server")]
struct Cli {
    /// Settings file (defaults to `~/.estimo/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Store rooms and tasks in this `SQLite` file instead of memory.
    #[arg(long)]
    sqlite: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut EstimoSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.sqlite {
            settings.storage.backend = StorageBackend::Sqlite;
            settings.storage.sqlite_path = path.to_string_lossy().into_owned();
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn build_services(settings: &EstimoSettings, live: Arc<RoomStateStore>) -> Result<AppServices> {
    let live = live as Arc<dyn LiveRoomStore>;
    let services = match settings.storage.backend {
        StorageBackend::Memory => AppServices::new(
            Arc::new(InMemoryRoomRepository::new()) as Arc<dyn RoomRepository>,
            Arc::new(InMemoryTaskRepository::new()) as Arc<dyn TaskRepository>,
            live,
        ),
        StorageBackend::Sqlite => {
            let path = &settings.storage.sqlite_path;
            if path != ":memory:" {
                ensure_parent_dir(Path::new(path))?;
            }
            let pool = open_pool(path, &ConnectionConfig::default())
                .with_context(|| format!("Failed to open database: {path}"))?;
            AppServices::new(
                Arc::new(SqliteRoomRepository::new(pool.clone())) as Arc<dyn RoomRepository>,
                Arc::new(SqliteTaskRepository::new(pool)) as Arc<dyn TaskRepository>,
                live,
            )
        }
    };
    Ok(services)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match &args.settings {
        Some(path) => estimo_settings::load_settings_from_path(path),
        None => estimo_settings::load_settings(),
    }
    .context("Failed to load settings")?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let live = Arc::new(RoomStateStore::new(ReaperConfig {
        cleanup_interval: settings.memory.cleanup_interval(),
        room_ttl: settings.memory.room_ttl(),
    }));
    let services = build_services(&settings, live.clone())?;

    let server = EstimoServer::new(ServerConfig::from(&settings.server), services);
    let reaper = live.spawn_reaper(server.shutdown().token());
    server.shutdown().track("reaper", reaper);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    server.shutdown().track("http", handle);
    info!(
        %addr,
        backend = ?settings.storage.backend,
        room_ttl_secs = settings.memory.room_ttl_secs,
        "estimo listening"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down");
    let clean = server
        .shutdown()
        .graceful_shutdown(Some(settings.server.shutdown_timeout()))
        .await;
    info!(clean, "shutdown complete");
    Ok(())
}
