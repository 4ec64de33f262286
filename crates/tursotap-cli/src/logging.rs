use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Send logs to stderr, filtered by `RUST_LOG` or else `level`.
///
/// Colors are only used when stderr is a terminal, so redirected logs stay
/// plain text. stdout is never written to; it carries the message stream.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr = std::io::stderr;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(stderr().is_terminal())
        .with_writer(stderr)
        .init();
}
