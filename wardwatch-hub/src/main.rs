/**
 * WARDWATCH HUB - Point d'entrée
 *
 * Charge .env + wardwatch.yaml, initialise les logs, lie les trois ports
 * puis tourne jusqu'à Ctrl-C.
 */

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wardwatch_hub::{load_config, Monitor};

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wardwatch_hub=info")),
        )
        .init();

    let cfg = load_config().await;
    info!("starting wardwatch hub on {}", cfg.host);

    let monitor = Monitor::bind(cfg).await.context("startup aborted")?;
    monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("monitor failed")?;

    Ok(())
}
