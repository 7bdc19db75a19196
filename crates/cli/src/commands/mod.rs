pub mod analyze;
pub mod config_cmd;
pub mod memory;
pub mod status;
pub mod sweep;

use std::path::Path;

use atelier_config::AppConfig;

/// Load the configuration from `path`, or from the default location.
/// Environment overrides apply in both cases.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}
