//! Structured logging setup, called once from `main`. Task payload text is
//! never logged above `debug` — the ranker exists to redact exactly the
//! PII that would otherwise end up in an `info`-level log line.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
