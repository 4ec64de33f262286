use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tursotap_engine::{open_state_backend, parse_config, run_tap, JsonLinesSink, RunResult};

/// Execute the `run` command: parse the config and replicate every table.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse tap config: {}", config_path.display()))?;
    let state = open_state_backend(&config.state)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after the current batch");
            on_interrupt.cancel();
        }
    });

    let result = run_tap(&config, state, Box::new(JsonLinesSink::stdout()), cancel).await?;
    print_summary(&config.tap, &result);

    let failed = result.failures().count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} table(s) failed", result.tables.len());
    }
    Ok(())
}

// Summary goes to stderr so stdout stays a clean message stream.
fn print_summary(tap: &str, result: &RunResult) {
    let status = if result.is_success() {
        "completed"
    } else {
        "completed with failures"
    };
    eprintln!("Tap '{tap}' {status}.");
    eprintln!("  Records read:    {}", result.total_records());
    eprintln!("  Duration:        {:.2}s", result.duration_secs);
    if result.duration_secs > 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let rate = result.total_records() as f64 / result.duration_secs;
        eprintln!("  Throughput:      {rate:.0} rows/sec");
    }
    for table in &result.tables {
        eprintln!(
            "  {:<24} {:<6} {} record(s) in {} batch(es)",
            table.table,
            table.status.to_string(),
            table.records,
            table.batches
        );
        if let Some(failure) = &table.failure {
            eprintln!("    {failure}");
        }
    }
}
