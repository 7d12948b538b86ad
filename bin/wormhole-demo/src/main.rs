//! Demonstrates a future signalled from several tasks, with the caller blocked on its gate until the last delayed
//! signal arrives.

#![deny(warnings)]
#![deny(missing_docs)]

use std::time::Duration;

use anyhow::Context as _;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use wormhole::{gate, FutureConfiguration, FutureHandle};

const LAST_PAYLOAD: &str = "completed after 4 seconds";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("WORMHOLE_LOG_LEVEL")
                .from_env_lossy(),
        )
        .with_ansi(true)
        .with_target(true)
        .init();

    let config = FutureConfiguration::from_environment("wormhole").context("Failed to load configuration.")?;

    match run(config).await {
        Ok(()) => info!("wormhole-demo stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run(config: FutureConfiguration) -> anyhow::Result<()> {
    let future = FutureHandle::from_configuration(&config);
    info!(future_id = future.id(), mode = %future.mode(), "wormhole-demo starting...");

    let releaser = future.clone();
    future.register_complete(move |payload| {
        let message = payload.as_str().unwrap_or("<non-string payload>");
        info!("Future completed: {}", message);

        if message == LAST_PAYLOAD {
            if let Err(e) = gate::unblock(&releaser) {
                error!(error = %e, "Failed to release gate.");
            }
        }
    })?;
    future.register_finally(|| info!("Future finished."))?;

    for (delay, payload) in [(2, "completed after 2 seconds"), (4, LAST_PAYLOAD)] {
        let signaller = future.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            if let Err(e) = signaller.signal_complete(payload) {
                error!(error = %e, "Failed to signal future.");
            }
        });
    }

    for i in 0..10 {
        future.signal_complete(format!("completed immediately ({})", i))?;
    }

    info!("Waiting for the last delayed signal...");
    gate::block_async(&future).await?;

    future.settle().await.context("Handlers failed while settling.")?;

    for (i, event) in future.events().into_iter().enumerate() {
        let kind = event.kind();
        let payload = event.into_payload();
        info!("Event #{}: {} {:?}", i, kind, payload);
    }
    info!(signal_count = future.signal_count(), "Timeline complete.");

    future.destroy()?;
    Ok(())
}
