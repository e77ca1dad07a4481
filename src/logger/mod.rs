//! Structured console logging for the trading pipeline
//!
//! Provides a small, ergonomic logging API with standard levels
//! (Error/Warning/Info/Debug/Verbose), per-component tags and runtime
//! filtering. Output goes to the console only; nothing is persisted.
//!
//! ## Usage
//!
//! ```rust
//! use perpbot::logger::{self, LogTag};
//!
//! logger::info(LogTag::Risk, "circuit breaker reset");
//! logger::warning(LogTag::Ai, "oracle call failed, using fallback");
//! ```

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, set_logger_config, update_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (diagnostic detail, gated per tag)
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (trace detail)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_always_logs() {
        assert!(core::should_log(&LogTag::System, LogLevel::Error));
    }

    #[test]
    fn test_debug_gated_by_tag() {
        update_logger_config(|c| {
            c.debug_modes.clear();
        });
        assert!(!core::should_log(&LogTag::Ai, LogLevel::Debug));

        update_logger_config(|c| {
            c.debug_modes.insert("ai".to_string(), true);
        });
        assert!(core::should_log(&LogTag::Ai, LogLevel::Debug));

        update_logger_config(|c| {
            c.debug_modes.clear();
        });
    }
}
