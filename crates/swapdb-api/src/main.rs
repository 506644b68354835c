// SWAPDB harness server
// Decision: Populate first, then serve the control surface while the sampler and probe read
// Decision: Sampler or probe failure ends the process; control request failures never do

mod control;
mod startup;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use swapdb_harness::{
    BackgroundHandle, BatchExecutor, HarnessConfig, KeyProbe, ProbeError, SampleTarget,
    SamplerError, SamplerStats, VerificationFlag, VerificationSampler,
};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Why the supervision loop woke up
enum Exit {
    Signal,
    Sampler(Result<Result<SamplerStats, SamplerError>, JoinError>),
    Probe(Result<Result<u64, ProbeError>, JoinError>),
    Server(Result<std::io::Result<()>, JoinError>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "swapdb_api=debug,swapdb_harness=debug,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("swapdb-api starting...");
    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    let config = HarnessConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        backend = ?config.backend,
        redis_addr = %config.redis_addr,
        databases = ?config.databases,
        key_count = config.key_count,
        max_concurrency = config.batch.max_concurrency,
        "Harness configured"
    );

    // Connect and populate
    let stores = startup::connect(&config)
        .await
        .context("Failed to connect to store")?;

    let verification = Arc::new(VerificationFlag::new());
    let executor = BatchExecutor::new(config.batch, verification.reader());

    startup::populate(&executor, &stores, config.key_count)
        .await
        .context("Initial population failed")?;

    // Control surface and probe go through the first configured database
    let primary = config
        .primary_database()
        .and_then(|db| stores.iter().find(|store| store.db() == db))
        .cloned()
        .ok_or_else(|| anyhow!("No databases configured"))?;
    let app = control::routes(control::AppState {
        store: Arc::clone(&primary),
        verification,
        op_timeout: config.batch.op_timeout,
    })
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", config.http_addr);

    let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();
    let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_stop_rx.await;
            })
            .await
    });

    // Background readers
    let targets = stores.iter().cloned().map(SampleTarget::new).collect();
    let mut sampler = VerificationSampler::new(executor, targets, config.key_count)
        .with_pass_interval(config.sampler_interval)
        .spawn();
    let mut probe = KeyProbe::new(primary, config.probe_key.clone(), config.probe_interval)
        .with_op_timeout(config.batch.op_timeout)
        .spawn();

    let exit = tokio::select! {
        result = sampler.wait() => Exit::Sampler(result),
        result = probe.wait() => Exit::Probe(result),
        result = &mut server => Exit::Server(result),
        _ = tokio::signal::ctrl_c() => Exit::Signal,
    };

    let sampler_running = !matches!(exit, Exit::Sampler(_));
    let probe_running = !matches!(exit, Exit::Probe(_));
    let server_running = !matches!(exit, Exit::Server(_));

    let outcome = match exit {
        Exit::Signal => {
            tracing::info!("Received shutdown signal");
            Ok(())
        }
        Exit::Sampler(result) => match result {
            Ok(Ok(stats)) => Err(anyhow!(
                "verification sampler exited after {} passes",
                stats.passes
            )),
            Ok(Err(e)) => Err(e).context("Verification failed"),
            Err(e) => Err(e).context("Verification sampler crashed"),
        },
        Exit::Probe(result) => match result {
            Ok(Ok(reads)) => Err(anyhow!("key probe exited after {} reads", reads)),
            Ok(Err(e)) => Err(e).context("Key probe failed"),
            Err(e) => Err(e).context("Key probe crashed"),
        },
        Exit::Server(result) => match result {
            Ok(Ok(())) => Err(anyhow!("control server exited")),
            Ok(Err(e)) => Err(e).context("Server error"),
            Err(e) => Err(e).context("Control server crashed"),
        },
    };

    // Stop whatever is still running
    if sampler_running {
        stop("verification sampler", sampler).await;
    }
    if probe_running {
        stop("key probe", probe).await;
    }
    if server_running {
        let _ = server_stop_tx.send(());
        if let Err(e) = server.await {
            tracing::warn!("Control server did not stop cleanly: {}", e);
        }
    }

    match &outcome {
        Ok(()) => tracing::info!("swapdb-api shutdown complete"),
        Err(e) => tracing::error!("swapdb-api stopping: {:#}", e),
    }
    outcome
}

async fn stop<T, E>(name: &str, handle: BackgroundHandle<Result<T, E>>)
where
    T: std::fmt::Debug,
    E: std::fmt::Display,
{
    match handle.shutdown().await {
        Ok(Ok(result)) => tracing::info!(?result, "{} stopped", name),
        Ok(Err(e)) => tracing::warn!("{} stopped with error: {}", name, e),
        Err(e) => tracing::warn!("{} did not stop cleanly: {}", name, e),
    }
}
