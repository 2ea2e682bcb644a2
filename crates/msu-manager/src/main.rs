mod cli;

use crate::cli::Args;
use anyhow::Context;
use clap::Parser;
use msu_manager::config::load_settings;
use msu_manager::controller::LifecycleController;
use msu_manager::logging::init_tracing;
use msu_manager::transport::{http, udp};
use msu_manager::uplink::UplinkMonitor;
use std::sync::Arc;
use system_utils::{ProcessRunner, TokioProcessRunner};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args.config)?;
    let _log_guard = init_tracing(settings.log_level, args.log_dir.as_deref())?;

    info!(
        config = %args.config.display(),
        http_listen_addr = %args.http_listen_addr,
        "msu-manager starting"
    );
    info!(settings = ?settings, "effective configuration");

    let shutdown = CancellationToken::new();
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);

    let mut udp_task = None;
    let controller = match &settings.controller {
        Some(controller_settings) => {
            let controller = LifecycleController::new(
                controller_settings.shutdown_delay,
                controller_settings.shutdown_command.clone(),
                Arc::clone(&runner),
            );
            let socket = udp::bind_udp_listener(controller_settings.udp_bind_addr).await?;
            info!(addr = %controller_settings.udp_bind_addr, "udp command listener started");
            udp_task = Some(tokio::spawn(udp::run_udp_listener(
                socket,
                controller.clone(),
                shutdown.clone(),
            )));
            Some(controller)
        }
        None => {
            info!("msu controller disabled");
            None
        }
    };

    let uplink_task = match &settings.uplink {
        Some(uplink_settings) => {
            let monitor = UplinkMonitor::new(uplink_settings, Arc::clone(&runner));
            let shutdown = shutdown.clone();
            Some(tokio::spawn(async move { monitor.run(shutdown).await }))
        }
        None => {
            info!("uplink monitor disabled");
            None
        }
    };

    let listener = TcpListener::bind(&args.http_listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", args.http_listen_addr))?;
    info!(addr = %args.http_listen_addr, "http endpoint listening");

    tokio::spawn(wait_for_shutdown(shutdown.clone()));
    http::serve(listener, http::router(controller), shutdown.clone()).await?;

    shutdown.cancel();
    if let Some(task) = udp_task {
        join_background("udp listener", task).await;
    }
    if let Some(task) = uplink_task {
        join_background("uplink monitor", task).await;
    }
    info!("msu-manager stopped");
    Ok(())
}

/// Waits for a background task; returns `false` if it panicked or was aborted.
async fn join_background(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(task = name, error = %err, "background task ended abnormally");
            false
        }
    }
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    wait_for_signal().await;
    info!("shutdown signal received");
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
