use std::path::Path;

use anyhow::{Context, Result};
use tursotap_engine::{check_connection, open_state_backend, parse_config, validate_config};

/// Execute the `check` command: validate config, source connectivity and state.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse tap config: {}", config_path.display()))?;

    validate_config(&config)?;
    println!("Tap configuration: OK");

    let source_ok = match check_connection(&config).await {
        Ok(message) => {
            println!("Source:            OK");
            println!("  {message}");
            true
        }
        Err(e) => {
            println!("Source:            FAILED");
            println!("  {e:#}");
            false
        }
    };

    let state_ok = match open_state_backend(&config.state) {
        Ok(_) => {
            println!("State backend:     OK");
            true
        }
        Err(e) => {
            println!("State backend:     FAILED");
            println!("  {e:#}");
            false
        }
    };

    if source_ok && state_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
