// Constants shared by the ua-model crates

/// The default configuration file name, loaded from the working directory
/// when no `--config` is given.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "ua-model.toml";

/// Environment variable that overrides the configuration file path.
pub const CONFIG_PATH_ENV: &str = "UAM_CONFIG";

/// Prefix of environment variables overriding individual settings,
/// e.g. `UAM__WORKER_POOL__WORKERS=8`.
pub const ENV_PREFIX: &str = "UAM";

/// Separator between nested keys in environment variables.
pub const ENV_SEPARATOR: &str = "__";

/// The namespace URI of the demo information model.
pub const DEMO_NAMESPACE_URI: &str = "urn:ua-model:demo";
