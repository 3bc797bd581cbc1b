// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: wires configuration into the device adapter, controller
//! client, telemetry collector, and reconciliation loop, then runs until a
//! shutdown signal arrives.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::controller::ControllerClient;
use crate::device::HttpDeviceApi;
use crate::reconcile::Reconciler;

/// Run the agent until SIGTERM or SIGINT, then shut down every background
/// task in turn. Returns once shutdown is complete.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let shutdown = CancellationToken::new();

    let device = Arc::new(HttpDeviceApi::new(
        config.device_addr.clone(),
        config.device_id.clone(),
        config.controller_timeout(),
    )?);

    let controller = ControllerClient::new(
        config.controller_addr.clone(),
        config.device_id.clone(),
        config.location_id.clone(),
        config.controller_timeout(),
    )?;

    let telemetry = if config.telemetry_enabled {
        let storage = Arc::new(dz_telemetry::FileStorage::new(&config.telemetry_storage_path)?);
        let collector = Arc::new(dz_telemetry::Collector::new(config.telemetry_config(), storage).await?);
        collector.start().await?;
        tracing::info!(port = config.telemetry_port, "telemetry collector started");
        Some(collector)
    } else {
        tracing::info!("telemetry collector disabled");
        None
    };

    let reconciler = Arc::new(Reconciler::new(
        device,
        controller,
        telemetry.clone(),
        config.telemetry_peers_file.clone(),
        config.device_id.clone(),
        config.max_lock_age(),
        config.controller_timeout(),
    ));

    let loop_handle = tokio::spawn(Arc::clone(&reconciler).run_loop(config.poll_interval(), shutdown.clone()));

    wait_for_shutdown_signal(&shutdown).await?;

    tracing::info!("shutdown signal received; stopping");
    loop_handle.await?;
    if let Some(collector) = telemetry {
        collector.stop().await;
    }

    Ok(())
}

async fn wait_for_shutdown_signal(shutdown: &CancellationToken) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
    shutdown.cancel();
    Ok(())
}
