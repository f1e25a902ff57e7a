//! Ambient runtime pieces shared by the ua-model executables: the layered
//! settings loader and the tracing logger.
pub mod constants;
pub mod logger;
pub mod settings;

pub use logger::Logger;
pub use settings::Settings;

use ua_model_error::{ModelError, ModelResult};

/// Switch the process working directory to the configured runtime directory,
/// creating it if needed. `"."` and an empty value leave it unchanged.
pub fn apply_runtime_dir(runtime_dir: &str) -> ModelResult<()> {
    let dir = runtime_dir.trim();
    if dir.is_empty() || dir == "." {
        return Ok(());
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        ModelError::InitializationError(format!("Failed to create runtime_dir {dir}: {e}"))
    })?;
    std::env::set_current_dir(dir).map_err(|e| {
        ModelError::InitializationError(format!("Failed to enter runtime_dir {dir}: {e}"))
    })?;
    Ok(())
}
