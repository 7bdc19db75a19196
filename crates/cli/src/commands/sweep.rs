//! `atelier sweep`: Delete expired memory entries once.

use std::path::Path;

use atelier_memory::TieredMemoryStore;

use super::load_config;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let store = TieredMemoryStore::from_config(&config.memory).await;

    let report = store.sweep().await;
    println!(
        "Swept {} expired entries (warm: {}, cold: {})",
        report.total(),
        report.warm,
        report.cold
    );
    Ok(())
}
