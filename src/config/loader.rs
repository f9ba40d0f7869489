//! Configuration Loader
//!
//! Layers, lowest precedence first:
//!
//! 1. Built-in defaults ([`ServiceConfig::default`])
//! 2. TOML file named by `ORDERS_CONFIG_PATH`, if set
//! 3. `DATABASE_URL`
//! 4. `ORDERS_`-prefixed variables, `__` between nesting levels
//!    (`ORDERS_CACHE__TTL_SECONDS=600`, `ORDERS_LOG__QUEUE_NAME=orders`)

use std::collections::HashMap;
use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use tracing::{debug, info};
use validator::Validate;

use super::error::{ConfigResult, ConfigurationError};
use super::ServiceConfig;

pub const ENV_PREFIX: &str = "ORDERS";
pub const CONFIG_PATH_ENV: &str = "ORDERS_CONFIG_PATH";
const DATABASE_URL_ENV: &str = "DATABASE_URL";

impl ServiceConfig {
    /// Load from the process environment
    pub fn load() -> ConfigResult<Self> {
        Self::load_from_vars(std::env::vars().collect())
    }

    /// Load using `vars` in place of the process environment
    pub fn load_from_vars(vars: HashMap<String, String>) -> ConfigResult<Self> {
        let mut builder = defaults()?;

        if let Some(path) = vars.get(CONFIG_PATH_ENV) {
            if !Path::new(path).is_file() {
                return Err(ConfigurationError::FileNotFound(path.clone()));
            }
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }

        finish(builder, vars)
    }

    /// Load with `toml` as the file layer
    pub fn from_toml_str(toml: &str, vars: HashMap<String, String>) -> ConfigResult<Self> {
        let builder = defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        finish(builder, vars)
    }
}

fn defaults() -> ConfigResult<ConfigBuilder<DefaultState>> {
    let defaults = Config::try_from(&ServiceConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}

fn finish(
    builder: ConfigBuilder<DefaultState>,
    vars: HashMap<String, String>,
) -> ConfigResult<ServiceConfig> {
    let mut builder = builder;

    if let Some(url) = vars.get(DATABASE_URL_ENV) {
        let database_url = HashMap::from([("DATABASE__URL".to_string(), url.clone())]);
        builder = builder.add_source(
            Environment::default()
                .separator("__")
                .source(Some(database_url)),
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(Some(vars)),
    );

    let config: ServiceConfig = builder.build()?.try_deserialize()?;
    config.validate()?;

    debug!(config = ?config.sanitized(), "Configuration loaded");
    Ok(config)
}
