//! Default command: upload, then keep watching

use crate::auth;
use crate::config::Settings;
use crate::http::HttpUploader;
use crate::orchestrator::Orchestrator;
use anyhow::{Context, Result};
use journal::StatusStore;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};

pub async fn run(settings: Settings) -> Result<()> {
    if settings.uploads.is_empty() && !settings.is_watching() && !settings.reupload {
        warn!("Nothing to do: pass --upload, --watch or --reupload");
        return Ok(());
    }

    // 1. Credentials (interactive recovery on failure)
    let mut stdin = BufReader::new(tokio::io::stdin());
    let credentials = auth::load_with_recovery(&settings.auth_file, &mut stdin).await?;
    let uploader = Arc::new(HttpUploader::new(credentials).context("Failed to build HTTP client")?);

    // 2. Status database
    std::fs::create_dir_all(&settings.db_dir).with_context(|| {
        format!("Failed to create database directory {}", settings.db_dir.display())
    })?;
    let store = StatusStore::open(&settings.db_dir).with_context(|| {
        format!("Failed to open status database in {}", settings.db_dir.display())
    })?;
    info!("Status database: {} known files", store.count());

    // 3. Upload and watch until Ctrl-C
    let orchestrator = Orchestrator::new(settings, Arc::new(store), uploader)?;
    let summary = orchestrator.run(shutdown_signal()).await?;

    println!("{} Done ({})", "✓".green(), summary);
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
