mod bootstrap;
mod commands;
mod lock;
mod orchestrator;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use absentia_core::collab::{
    InMemoryChatPlatform, InMemoryHrSystem, InMemoryTemplateRenderer, ScriptedDateExtractor,
};
use absentia_core::config::{AppConfig, LogFormat, LoggingConfig};

use crate::orchestrator::Collaborators;

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config.logging);
    info!(
        leave_channel = %config.chat.leave_channel,
        tick_interval_secs = config.orchestrator.tick_interval_secs,
        "starting absence compliance orchestrator"
    );

    // Wire adapters for the concrete chat platform, HR system, and date
    // extractor plug in here; the defaults run the pipeline against the
    // in-process collaborators.
    let collab = Collaborators {
        chat: Arc::new(InMemoryChatPlatform::new()),
        hr: Arc::new(InMemoryHrSystem::new()),
        extractor: Arc::new(ScriptedDateExtractor::new()),
        templates: Arc::new(InMemoryTemplateRenderer::new()),
    };

    let app = bootstrap::build(config, collab).await?;
    app.orchestrator.run().await;
    // Flush the WAL before the lock drops so the next start sees a
    // clean database.
    app.pool.close().await;
    info!("orchestrator stopped");
    Ok(())
}
