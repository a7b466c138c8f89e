//! Bridges the `log` facade to a host-provided logger.

use std::sync::{Arc, OnceLock};

/// Receives log records from the core.
///
/// Implemented by the host app and registered once with [`set_logger`].
///
/// ```rust
/// use keyguard_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// object KeyguardLogcat : Logger {
///     override fun log(level: LogLevel, message: String) {
///         Log.println(level.toPriority(), "Keyguard", message)
///     }
/// }
///
/// setLogger(KeyguardLogcat) // once, from Application.onCreate
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Records one message at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Lifecycle steps (key generated, transform finalized).
    Debug,
    /// Informational messages.
    Info,
    /// Recoverable anomalies (alias overwritten, prompt denied).
    Warn,
    /// Failures.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

const CRATE_PREFIX: &str = "keyguard";

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct ForeignLogger;

/// Debug and trace records are only forwarded from our own modules.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    level <= log::Level::Info || module_path.is_some_and(|path| path.starts_with(CRATE_PREFIX))
}

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        } else {
            eprintln!("keyguard logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Registers the host logger and installs it as the `log` backend.
///
/// Only the first call has an effect; later calls are ignored.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("keyguard logger already set");
        return;
    }
    if let Err(e) = init_logger() {
        eprintln!("failed to install keyguard logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(log::Level::Debug, Some("keyguard_core::cipher") => true ; "own debug")]
    #[test_case(log::Level::Trace, Some("rsa::algorithms") => false ; "foreign trace")]
    #[test_case(log::Level::Debug, None => false ; "unknown module debug")]
    #[test_case(log::Level::Warn, Some("rsa::algorithms") => true ; "foreign warn")]
    #[test_case(log::Level::Error, None => true ; "unknown module error")]
    fn test_should_forward(level: log::Level, module_path: Option<&str>) -> bool {
        should_forward(level, module_path)
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
        assert_eq!(LogLevel::from(log::Level::Trace), LogLevel::Trace);
    }
}
