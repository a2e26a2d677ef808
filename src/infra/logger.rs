// src/infra/logger.rs — Structured logging with tracing

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. The default directive scopes to this
/// crate's spans; `LOGEVAL_LOG` overrides it entirely. Repeated calls are
/// no-ops, so tests can initialize without coordinating.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("LOGEVAL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("logeval={level}")));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_logging("debug");
        init_logging("info");
    }
}
