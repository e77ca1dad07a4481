/// Runtime logger configuration
///
/// Manages which log levels are shown, which tags have debug mode
/// enabled, and whether colored console output is used.

use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Logger runtime configuration
#[derive(Clone)]
pub struct LoggerConfig {
    /// Minimum log level to display
    pub min_level: LogLevel,

    /// Per-tag debug mode flags
    pub debug_modes: HashMap<String, bool>,

    /// Per-tag verbose mode flags
    pub verbose_modes: HashMap<String, bool>,

    /// Specific tags to enable (empty = all enabled)
    pub enabled_tags: HashSet<String>,

    /// Console output enabled
    pub console_enabled: bool,

    /// Color output enabled
    pub colors_enabled: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_modes: HashMap::new(),
            verbose_modes: HashMap::new(),
            enabled_tags: HashSet::new(),
            console_enabled: true,
            colors_enabled: true,
        }
    }
}

/// Global logger configuration singleton
static LOGGER_CONFIG: Lazy<Arc<RwLock<LoggerConfig>>> =
    Lazy::new(|| Arc::new(RwLock::new(LoggerConfig::default())));

/// Get a copy of the current logger configuration
pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Set the logger configuration (replaces entire config)
pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// Update logger configuration with a closure
pub fn update_logger_config<F>(f: F)
where
    F: FnOnce(&mut LoggerConfig),
{
    let mut config = LOGGER_CONFIG.write().unwrap_or_else(|e| e.into_inner());
    f(&mut config);
}

/// Check if debug mode is enabled for a specific tag
pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = get_logger_config();
    config
        .debug_modes
        .get(&tag.to_debug_key())
        .copied()
        .unwrap_or(false)
}

/// Check if verbose mode is enabled for a specific tag
pub fn is_verbose_enabled_for_tag(tag: &LogTag) -> bool {
    let config = get_logger_config();
    config
        .verbose_modes
        .get(&tag.to_debug_key())
        .copied()
        .unwrap_or(false)
}
