//! Craniodistraction measurement console - Main Entry Point
//!
//! Loads the configuration, opens the database and runs the session state
//! machine behind a line-oriented console.

use anyhow::Context;
use cranio::{
    app::{spawn_stdin_reader, ConsoleApp},
    backend::ThreadProcessFactory,
    config::{ensure_app_data_dir, AppConfig, LOG_DIR},
    db::Database,
    session::{DeviceSensorFactory, SessionContext, SessionMachine},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let data_dir = ensure_app_data_dir().context("Failed to create app data directory")?;

    // Log to stderr and to a daily file in the app data directory
    let file_appender = tracing_appender::rolling::daily(data_dir.join(LOG_DIR), "cranio.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cranio=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    tracing::info!("Starting cranio");

    let mut config = AppConfig::load_or_default();
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    let database_path = config.database_path()?;
    let database = Database::open(&database_path)
        .with_context(|| format!("Failed to open database {}", database_path.display()))?;

    let ui_interval = config.acquisition.ui_update_interval();
    let process_factory = ThreadProcessFactory::new(config.acquisition.poll_interval());
    let context = SessionContext::new(
        database,
        config,
        Box::new(DeviceSensorFactory),
        Box::new(process_factory),
    );
    let machine = SessionMachine::new(context).context("Failed to start session machine")?;

    let mut app = ConsoleApp::new(machine, ui_interval, std::io::stdout());
    app.run(spawn_stdin_reader())?;

    tracing::info!("Shutting down...");
    Ok(())
}
