use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError};

/// Environment variable that overrides the configured level directives.
const LEVEL_ENV: &str = "KEEL_LOG";

pub(crate) fn text(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let layer = fmt::layer()
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_timer(mk_timer());

    install(tracing_subscriber::registry().with(mk_filter(&cfg.level)?).with(layer))
}

pub(crate) fn json(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_ansi(false)
        .with_target(cfg.with_targets)
        .with_timer(mk_timer());

    install(tracing_subscriber::registry().with(mk_filter(&cfg.level)?).with(layer))
}

#[cfg(all(target_os = "linux", feature = "journald"))]
pub(crate) fn journald(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("keel".to_string());

    install(tracing_subscriber::registry().with(mk_filter(&cfg.level)?).with(layer))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
pub(crate) fn journald(_cfg: &LoggerConfig) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

/// `KEEL_LOG` wins over the configured directives when set.
pub(crate) fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    let directives = std::env::var(LEVEL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| level.to_string());
    EnvFilter::try_new(&directives).map_err(|_| LoggerError::InvalidLogLevel(directives))
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let s = e.to_string();
        if s.contains("already been set") {
            LoggerError::AlreadyInitialized
        } else {
            LoggerError::InitializationFailed(s)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_accepts_directives() {
        assert!(mk_filter("info,keel_core=trace").is_ok());
    }

    #[test]
    fn filter_rejects_garbage() {
        if std::env::var(LEVEL_ENV).is_ok() {
            return;
        }
        assert!(matches!(
            mk_filter("keel=verbose"),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }
}
