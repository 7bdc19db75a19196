//! `atelier config`: Configuration management commands.

use std::path::{Path, PathBuf};

use atelier_config::AppConfig;

use super::load_config;

fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn template() {
    println!("{}", AppConfig::default_toml());
}

pub fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(path: Option<&Path>) {
    println!("{}", config_file(path).display());
}

pub fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating {}...", config_file(path).display());

    match load_config(path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if config.memory.redis_url.is_none() {
                warnings.push("No redis_url: the hot tier is disabled");
            }
            if config.memory.database_url.is_none() {
                warnings.push("No database_url: the warm tier is disabled");
            }
            if config.memory.default_ttl_hours == 0 {
                warnings.push("default_ttl_hours = 0: entries never expire");
            }
            let engines = &config.engines;
            if !(engines.rule_based.enabled
                || engines.semantic.enabled
                || engines.statistical.enabled
                || engines.knowledge.enabled)
            {
                warnings.push("Every engine is disabled: results carry structural scores only");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e);
        }
    }

    Ok(())
}
