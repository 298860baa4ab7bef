//! Config command handlers

use crate::config::Config;
use crate::db::Store;

pub fn cmd_init() -> anyhow::Result<()> {
    if Config::create_default_if_missing()? {
        println!("✓ Config file created. Edit config.toml and run again.");
    } else {
        println!("config.toml already exists, leaving it untouched.");
    }
    Ok(())
}

/// `validate()` has already run by the time this is reached.
pub async fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    println!("✓ Configuration is valid");
    println!("  Database:        {}", config.general.database_path);
    println!("  Port:            {}", config.server.port);
    println!("  Token lifetime:  {}s", config.tokens.default_expiry_seconds);
    println!(
        "  Code lifetime:   {}m",
        config.invitations.default_code_lifetime_minutes
    );
    println!("  Metrics:         {}", config.observability.metrics_enabled);

    let store = Store::from_config(&config.general).await?;
    store.ping().await?;
    println!("✓ Database reachable, migrations applied");

    Ok(())
}
