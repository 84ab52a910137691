//! `sparkd`: the Spark pre-tool advisory daemon. Wires the HTTP ingest
//! surface and the timer-driven bridge cycle on top of `spark-core`
//! (spec.md §2, §6).

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use spark_core::era;
use spark_core::error::{Error, Result};
use spark_core::state_dir::StateDir;

use sparkd::cli::Opts;
use sparkd::state::AppState;
use sparkd::{bridge_task, http};

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(opts).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("sparkd exiting: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(opts: Opts) -> Result<()> {
    let state_dir = StateDir::open(opts.resolved_state_dir())?;

    let era = era::load_or_init(state_dir.era())?;
    info!(era_id = era.id, "era loaded");

    let token = resolve_token(&opts, &state_dir)?;

    if !opts.allow_remote && opts.bind_host != "127.0.0.1" && opts.bind_host != "localhost" {
        return Err(Error::fatal(format!(
            "refusing to bind to {} without --allow-remote (spec.md §6 loopback-by-default policy)",
            opts.bind_host
        )));
    }
    if opts.allow_remote && token.is_none() {
        return Err(Error::fatal(
            "--allow-remote requires an auth token (SPARKD_TOKEN or --token)",
        ));
    }

    let app_state = Arc::new(AppState::open(state_dir.clone(), token)?);

    let tuneables_path = opts.tuneables_path.clone().unwrap_or_else(|| state_dir.tuneables());
    let bridge_interval = opts.bridge_interval();
    let bridge_state = app_state.clone();
    let bridge_handle = tokio::spawn(async move {
        bridge_task::run(bridge_state, bridge_interval, tuneables_path).await;
    });

    let router = http::router(app_state.clone());
    let addr = format!("{}:{}", opts.bind_host, opts.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::fatal(format!("binding {addr}: {e}")))?;
    info!(addr, "sparkd listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::fatal(format!("server error: {e}")))?;

    bridge_handle.abort();
    Ok(())
}

fn resolve_token(opts: &Opts, state_dir: &StateDir) -> Result<Option<String>> {
    if let Some(token) = &opts.token {
        return Ok(Some(token.clone()));
    }
    let token_file = state_dir.token_file();
    if token_file.exists() {
        let contents = std::fs::read_to_string(&token_file).map_err(Error::from)?;
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
    Ok(None)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("installing Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
