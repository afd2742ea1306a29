//! Logger initialization for embedding applications and tests.

use log::LevelFilter;

use crate::error_handling::InitializationError;

/// Logging level for the subsystem.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Copy, Debug)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Installs an `env_logger` logger at `level`.
///
/// `RUST_LOG` still wins when set, so operators can turn individual modules up
/// or down without a rebuild. Fails if a logger is already installed.
pub fn init_logging(level: LogLevel) -> Result<(), InitializationError> {
    env_logger::Builder::from_default_env()
        .filter_level(level.into())
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::Error);
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::Warn);
        assert_eq!(LevelFilter::from(LogLevel::Info), LevelFilter::Info);
        assert_eq!(LevelFilter::from(LogLevel::Debug), LevelFilter::Debug);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::Trace);
    }

    #[test]
    fn test_log_level_ordering() {
        // Error < Warn < Info < Debug < Trace
        assert!(LevelFilter::from(LogLevel::Error) < LevelFilter::from(LogLevel::Warn));
        assert!(LevelFilter::from(LogLevel::Info) < LevelFilter::from(LogLevel::Trace));
    }
}
