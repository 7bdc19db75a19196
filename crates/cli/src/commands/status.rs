//! `atelier status`: Show configuration, tier health and engines.

use std::path::Path;

use atelier_orchestrator::AnalysisOrchestrator;

use super::load_config;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    println!("Atelier Status");
    println!("==============");
    println!("  Config dir:     {}", atelier_config::AppConfig::config_dir().display());
    println!(
        "  Redis:          {}",
        config.memory.redis_url.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "  Database:       {}",
        config.memory.database_url.as_deref().unwrap_or("(not configured)")
    );
    println!("  Default TTL:    {}h", config.memory.default_ttl_hours);
    println!("  Engine budget:  {}ms", config.engines.default_timeout_ms);

    let orchestrator = AnalysisOrchestrator::from_config(&config).await;

    println!();
    println!("Memory tiers");
    for tier in orchestrator.store().status().await {
        let level = tier.level.to_string();
        let mark = if tier.healthy { "✅" } else { "⚠️ " };
        match tier.detail {
            Some(detail) => println!("  {mark} {level:<5} {:<10} {detail}", tier.backend),
            None => println!("  {mark} {level:<5} {}", tier.backend),
        }
    }

    println!();
    println!("Engines");
    for cap in orchestrator.capabilities() {
        if cap.available {
            println!("  ✅ {:<12} {}", cap.name, cap.features.join(", "));
        } else {
            println!(
                "  ⚠️  {:<12} {}",
                cap.name,
                cap.degradation_reason.as_deref().unwrap_or("unavailable")
            );
        }
    }

    Ok(())
}
