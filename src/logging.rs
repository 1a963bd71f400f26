use crate::error::BenchError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber, logging to stderr.
///
/// `RUST_LOG` wins over `level` when set. Later calls are ignored.
pub fn init_tracing(level: &str) -> Result<(), BenchError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| BenchError::Config {
            field: "log-level".to_string(),
            reason: e.to_string(),
        })?,
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
    Ok(())
}
