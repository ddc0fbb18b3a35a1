//! Tracing and logging setup shared by binaries.

/// Initialize process-wide tracing, picking the format from `MONEYFLOW_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() -> Result<LogFormat, LogFormatError> {
    let format = LogFormat::from_env()?;
    tracing::init_with(format);
    Ok(format)
}

/// Tracing configuration (filters, formatters).
pub mod tracing;

pub use self::tracing::{ENV_LOG_FORMAT, LogFormat, LogFormatError, init_with};
