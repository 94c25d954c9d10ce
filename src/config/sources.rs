use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "MEDIABOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mediabox.toml";
const ENV_PREFIX: &str = "MEDIABOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();
    load_from_sources(&config_path())
}

/// Path of the TOML file: `MEDIABOX_CONFIG` or `config/mediabox.toml`
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: &Path) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        builder = builder.add_source(File::from(config_path).required(false));
    }

    // MEDIABOX__JOBS__EVICTION_TTL_SECS -> jobs.eviction_ttl_secs
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .list_separator(" ")
            .with_list_parse_key("fetcher.extra_args")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
