use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use dataset_ingestion::cli::{parse_command, run_command, Command};
use dataset_ingestion::config::Config;
use dataset_ingestion::pipeline::IngestionEngine;
use dataset_ingestion::server::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load this crate's .env regardless of current working directory, and override any pre-set envs
    let _ = dotenvy::from_filename_override(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .init();

    // Load configuration
    let cfg = Config::from_env();
    let args: Vec<String> = std::env::args().collect();
    let command = parse_command(&args)?;
    if command != Command::Serve {
        return run_command(command, &cfg);
    }
    tracing::info!(
        dataset = %cfg.active_dataset_path.display(),
        backup_dir = %cfg.backup_dir.display(),
        reload_mode = ?cfg.reload_mode,
        uploads_enabled = !cfg.admin_password.is_empty(),
        "Loaded configuration"
    );

    let engine = IngestionEngine::new(&cfg);
    match engine.store().load() {
        Ok(table) => tracing::info!(rows = table.row_count(), "Active dataset ready"),
        Err(e) => tracing::warn!(error = %e, "Active dataset could not be loaded; waiting for an upload"),
    }

    let app = build_router(engine, &cfg);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port).parse()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(port = cfg.port, "Port is already in use. Another ingestion service might be running. Try changing PORT env var or stop the other process.");
            }
            return Err(e.into());
        }
    };
    tracing::info!(port = cfg.port, "Ingestion service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
