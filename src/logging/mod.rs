use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Install the global subscriber, failing if one is already set.
pub fn try_init_logging() -> Result<(), SetGlobalDefaultError> {
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .compact();

    let subscriber = Registry::default().with(filter).with(formatting_layer);

    tracing::subscriber::set_global_default(subscriber)
}

/// Install the global subscriber; a second call keeps the first one.
pub fn init_logging() {
    if try_init_logging().is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}
