//! Standalone chess session server.
//!
//! Environment:
//! - `ROOKERY_BIND`: listen address, default `0.0.0.0:5001`
//! - `ROOKERY_IDLE_SECS`: idle timeout in seconds, `0` disables it
//! - `RUST_LOG`: log filter, default `info`

use std::time::Duration;

use rookery::prelude::*;

const DEFAULT_ADDR: &str = "0.0.0.0:5001";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let bind = std::env::var("ROOKERY_BIND").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let mut builder = RookeryServer::builder().bind(&bind);
    if let Ok(secs) = std::env::var("ROOKERY_IDLE_SECS") {
        let secs: u64 = secs.parse()?;
        builder = builder.idle_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }

    let server = builder.build().await?;
    tracing::info!(addr = %server.local_addr()?, "chess server listening");

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
