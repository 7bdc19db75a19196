//! `atelier memory`: List stored memory entries.

use std::path::Path;

use atelier_core::memory::{MemoryFilter, MemoryKind};
use atelier_memory::TieredMemoryStore;

use super::load_config;

pub async fn list(
    config_path: Option<&Path>,
    mission: &str,
    agent: Option<String>,
    session: Option<String>,
    kind: Option<&str>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let filter = MemoryFilter {
        agent_id: agent,
        session_id: session,
        kind: kind.map(str::parse::<MemoryKind>).transpose()?,
    };

    let store = TieredMemoryStore::from_config(&config.memory).await;
    let entries = store.retrieve(mission, &filter, limit).await?;

    if entries.is_empty() {
        println!("No memory entries for mission {mission}.");
        return Ok(());
    }

    println!("Memory entries for mission {mission}");
    println!();
    for entry in &entries {
        let expires = entry
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".into());
        println!(
            "  {} [{}] priority={} agent={} session={}",
            entry.id,
            entry.kind(),
            u8::from(entry.priority),
            entry.agent_id,
            entry.session_id
        );
        println!("      created {} · expires {expires}", entry.created_at.to_rfc3339());
        println!("      {}", serde_json::to_string(&entry.content)?);
    }
    Ok(())
}
