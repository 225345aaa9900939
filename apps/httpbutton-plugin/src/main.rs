#![forbid(unsafe_code)]

use anyhow::Result;
use httpbutton::{Config, Plugin};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let launch = match deck::parse_launch_args(std::env::args_os()) {
        Ok(launch) => launch,
        Err(error) => error.exit(),
    };
    let config = Config::from_env()?;
    info!(
        port = launch.port,
        plugin = %launch.plugin_id(),
        data_dir = %config.data_dir.display(),
        "starting plugin"
    );

    let plugin = Plugin::new(launch, config)?;
    plugin.run().await
}
