//! framesink sink daemon entry point.

mod app;
mod config;
mod handler;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting framesink sink");

    let path = match std::env::args_os().nth(1) {
        Some(arg) => arg.into(),
        None => config::default_config_path(),
    };
    let config = config::Config::load(&path)?;
    tracing::info!(
        path = %path.display(),
        data_dir = %config.data_dir.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("sink shut down cleanly");
    Ok(())
}
