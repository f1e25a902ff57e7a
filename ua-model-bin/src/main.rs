use clap::Parser;
use std::{env::current_dir, path::PathBuf};
use tracing::info;
use ua_model_common::{
    apply_runtime_dir,
    constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE_NAME},
    Logger, Settings,
};
use ua_model_error::{ModelError, ModelResult};

mod app;

use app::Application;

/// ua-model - OPC UA information model engine
///
/// Builds an address space from type templates, instantiates the BoilerDemo
/// model and serves its methods on a worker pool until interrupted.
#[derive(Parser)]
#[command(name = "ua-model")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "OPC UA information model engine", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, 'ua-model.toml' in the current working directory is
    /// used when it exists.
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ModelResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| ModelError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };
    let settings = Settings::new(&config_path.to_string_lossy())?;

    // Relative log paths resolve under the runtime directory.
    apply_runtime_dir(&settings.general.runtime_dir)?;
    let mut logger = Logger::new(Some(settings.logging.level()));
    logger.initialize(&settings.logging.dir, &settings.logging.file_name)?;
    info!(config = %config_path.display(), "Settings loaded");

    let app = Application::start(settings).await?;
    app.wait_for_shutdown_signal().await?;
    app.shutdown().await
}
