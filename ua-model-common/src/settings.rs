use crate::constants::{DEMO_NAMESPACE_URI, ENV_PREFIX, ENV_SEPARATOR};
use config::{Config, Environment, File};
use serde::{self, Deserialize};
use std::{ops::Deref, str::FromStr, sync::Arc};
use tracing::Level;
use ua_model_core::method::WorkerPoolConfig;
use ua_model_error::ModelResult;

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Load the optional TOML file at `config_path`, then apply `UAM__*`
    /// environment overrides on top.
    pub fn new(config_path: &str) -> ModelResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("address_space.boilers")
                    .with_list_parse_key("address_space.machines"),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self(Arc::new(Inner::default()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub address_space: AddressSpaceSettings,
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    #[serde(default)]
    pub simulation: Simulation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Directory the process switches into before anything else runs, so
    /// relative paths such as the log directory resolve under it.
    #[serde(default = "General::runtime_dir_default")]
    pub runtime_dir: String,
}

impl Default for General {
    fn default() -> Self {
        General {
            runtime_dir: General::runtime_dir_default(),
        }
    }
}

impl General {
    fn runtime_dir_default() -> String {
        ".".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    #[serde(default = "Logging::level_default")]
    pub level: String,
    #[serde(default = "Logging::dir_default")]
    pub dir: String,
    #[serde(default = "Logging::file_name_default")]
    pub file_name: String,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: Logging::level_default(),
            dir: Logging::dir_default(),
            file_name: Logging::file_name_default(),
        }
    }
}

impl Logging {
    fn level_default() -> String {
        "info".into()
    }

    fn dir_default() -> String {
        "logs".into()
    }

    fn file_name_default() -> String {
        "ua-model.log".into()
    }

    /// The configured level, falling back to INFO for unknown names.
    pub fn level(&self) -> Level {
        Level::from_str(self.level.trim()).unwrap_or(Level::INFO)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressSpaceSettings {
    #[serde(default = "AddressSpaceSettings::namespace_uri_default")]
    pub namespace_uri: String,
    /// Browse names of the boilers instantiated at startup.
    #[serde(default = "AddressSpaceSettings::boilers_default")]
    pub boilers: Vec<String>,
    #[serde(default = "AddressSpaceSettings::machines_default")]
    pub machines: Vec<String>,
}

impl Default for AddressSpaceSettings {
    fn default() -> Self {
        AddressSpaceSettings {
            namespace_uri: AddressSpaceSettings::namespace_uri_default(),
            boilers: AddressSpaceSettings::boilers_default(),
            machines: AddressSpaceSettings::machines_default(),
        }
    }
}

impl AddressSpaceSettings {
    fn namespace_uri_default() -> String {
        DEMO_NAMESPACE_URI.into()
    }

    fn boilers_default() -> Vec<String> {
        vec!["Boiler1".into()]
    }

    fn machines_default() -> Vec<String> {
        vec!["Machine1".into()]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Simulation {
    #[serde(default = "Simulation::enabled_default")]
    pub enabled: bool,
    #[serde(default = "Simulation::interval_ms_default")]
    pub interval_ms: u64,
    /// Largest change applied to a simulated value per tick.
    #[serde(default = "Simulation::rate_default")]
    pub rate: f64,
    /// Set points sent to every boiler through `Fill`/`Heat` when the
    /// simulation starts.
    #[serde(default = "Simulation::fill_set_point_default")]
    pub fill_set_point: f64,
    #[serde(default = "Simulation::temperature_set_point_default")]
    pub temperature_set_point: f64,
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation {
            enabled: Simulation::enabled_default(),
            interval_ms: Simulation::interval_ms_default(),
            rate: Simulation::rate_default(),
            fill_set_point: Simulation::fill_set_point_default(),
            temperature_set_point: Simulation::temperature_set_point_default(),
        }
    }
}

impl Simulation {
    fn enabled_default() -> bool {
        false
    }

    fn interval_ms_default() -> u64 {
        1000
    }

    fn rate_default() -> f64 {
        0.5
    }

    fn fill_set_point_default() -> f64 {
        75.0
    }

    fn temperature_set_point_default() -> f64 {
        60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::new("definitely-not-here.toml").unwrap();
        assert_eq!(settings.general.runtime_dir, ".");
        assert_eq!(settings.address_space.namespace_uri, DEMO_NAMESPACE_URI);
        assert_eq!(settings.address_space.boilers, vec!["Boiler1".to_string()]);
        assert_eq!(settings.logging.file_name, "ua-model.log");
        assert!(!settings.simulation.enabled);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("ua-model-settings-{}.toml", std::process::id()));
        fs::write(
            &path,
            r#"
[logging]
level = "debug"

[address_space]
boilers = ["BoilerA", "BoilerB"]

[worker_pool]
workers = 2

[simulation]
enabled = true
interval_ms = 250
"#,
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(settings.logging.level(), Level::DEBUG);
        assert_eq!(settings.logging.dir, "logs");
        assert_eq!(settings.address_space.boilers, vec!["BoilerA", "BoilerB"]);
        assert_eq!(settings.address_space.machines, vec!["Machine1"]);
        assert_eq!(settings.worker_pool.workers, 2);
        assert_eq!(settings.worker_pool.queue_capacity, 64);
        assert!(settings.simulation.enabled);
        assert_eq!(settings.simulation.interval_ms, 250);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let logging = Logging {
            level: "chatty".into(),
            ..Default::default()
        };
        assert_eq!(logging.level(), Level::INFO);
    }
}
