//! Application orchestrator: wires the sink components together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use framesink_ingest::{CommandNotifier, IngestService, LogNotifier, Notifier};
use framesink_protocol::messages::RegisterSinkRequest;
use framesink_registry::{RegistrationLoop, TcpDirectory, advertised_address};
use framesink_server::{DispatchPool, RpcServer};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::handler::IngestHandler;

/// Runs the sink until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // -- Ingest service --
    let notifier: Arc<dyn Notifier> = match config.notify_command.as_deref() {
        Some(template) if !template.trim().is_empty() => {
            Arc::new(CommandNotifier::new(template))
        }
        _ => Arc::new(LogNotifier),
    };
    let service = Arc::new(IngestService::new(config.ingest_config()?, notifier));

    // -- Dispatch pool + RPC server --
    let pool = Arc::new(DispatchPool::new(config.pool_config()).context("cannot start workers")?);
    let server = RpcServer::new(
        config.server_config(),
        IngestHandler::new(Arc::clone(&service)),
        Arc::clone(&pool),
    );
    let server_run = Arc::clone(&server);
    let server_task = tokio::spawn(async move { server_run.run().await });

    // Wait for the server to bind.
    let port = loop {
        let p = server.port().await;
        if p > 0 {
            break p;
        }
        if server_task.is_finished() {
            return match server_task.await {
                Ok(Err(e)) => Err(e).context("RPC server failed to start"),
                Ok(Ok(())) => Err(anyhow::anyhow!("RPC server stopped before binding")),
                Err(e) => Err(e).context("RPC server task failed"),
            };
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    tracing::info!(
        port,
        workers = pool.worker_count(),
        data_dir = %config.data_dir.display(),
        "sink ready"
    );

    // -- Registration --
    let registration = match config.registration.identity()? {
        Some(identity) => {
            let address = match &config.registration.advertise_address {
                Some(addr) => addr.clone(),
                None => advertised_address(port)?.to_string(),
            };
            let directory = TcpDirectory::new(
                &config.registration.directory_host,
                config.registration.directory_port,
            );
            tracing::info!(directory = %directory.addr(), %address, id = %identity.id, "registration enabled");
            let request = RegisterSinkRequest {
                address,
                id: identity.id,
                credential: identity.credential,
            };
            let heartbeat =
                RegistrationLoop::new(directory, request, config.registration.interval());
            Some(tokio::spawn(heartbeat.run(cancel.child_token())))
        }
        None => {
            tracing::info!("no registration key configured; not registering");
            None
        }
    };

    // -- Stalled-session eviction --
    if let Some(max_idle) = config.idle_timeout() {
        let service = Arc::clone(&service);
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(max_idle.min(Duration::from_secs(60)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let sweep = Arc::clone(&service);
                let evicted = match tokio::task::spawn_blocking(move || sweep.evict_stalled(max_idle))
                    .await
                {
                    Ok(evicted) => evicted,
                    Err(e) => {
                        tracing::error!("eviction task failed: {e}");
                        continue;
                    }
                };
                for evicted in evicted {
                    tracing::warn!(
                        id = %evicted.id,
                        path = ?evicted.path,
                        bytes = evicted.bytes_written,
                        remaining = evicted.remaining,
                        "abandoned stalled transfer"
                    );
                }
            }
        });
    }

    // -- Main loop: wait for shutdown --
    let mut server_task = server_task;
    let stopped_early = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            None
        }
        result = &mut server_task => {
            tracing::error!("RPC server stopped unexpectedly");
            Some(result)
        }
    };

    // -- Graceful shutdown --
    tracing::info!("stopping services...");
    cancel.cancel();
    server.shutdown();
    let server_result = match stopped_early {
        Some(result) => result,
        None => server_task.await,
    };
    match server_result {
        Ok(Err(e)) => tracing::error!("server error: {e}"),
        Err(e) => tracing::error!("server task failed: {e}"),
        Ok(Ok(())) => {}
    }

    let workers = Arc::clone(&pool);
    tokio::task::spawn_blocking(move || workers.shutdown())
        .await
        .context("worker shutdown failed")?;

    if let Some(task) = registration {
        match task.await {
            Ok(stats) => tracing::info!(
                attempts = stats.attempts,
                successes = stats.successes,
                unregistered = stats.unregistered,
                "registration stopped"
            ),
            Err(e) => tracing::error!("registration task failed: {e}"),
        }
    }

    let pending = service.active_sessions();
    if !pending.is_empty() {
        tracing::warn!(count = pending.len(), ids = ?pending, "in-progress transfers abandoned");
    }
    Ok(())
}
