use std::path::Path;

use anyhow::{Context, Result};
use tursotap_engine::{discover_tables, parse_config};

/// Execute the `discover` command: print every source table as JSON.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse tap config: {}", config_path.display()))?;

    let tables = discover_tables(&config).await?;

    for table in &tables {
        let key = table.primary_key.columns().join(", ");
        eprintln!(
            "{} ({} column(s){})",
            table.schema.table,
            table.schema.columns.len(),
            if key.is_empty() {
                String::new()
            } else {
                format!(", primary key: {key}")
            }
        );
    }

    let json = serde_json::to_string_pretty(&tables).context("Failed to serialize catalog")?;
    println!("{json}");
    Ok(())
}
