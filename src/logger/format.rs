/// Console formatting and writing
///
/// Renders `HH:MM:SS [LEVEL] [TAG] message` with level-dependent colors
/// when colors are enabled.

use super::config::get_logger_config;
use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Utc;
use colored::Colorize;

pub fn format_and_log(tag: LogTag, level: LogLevel, message: &str) {
    let config = get_logger_config();
    if !config.console_enabled {
        return;
    }

    let ts = Utc::now().format("%H:%M:%S");
    let line = format!("{} [{}] [{}] {}", ts, level.as_str(), tag.as_str(), message);

    if !config.colors_enabled {
        println!("{}", line);
        return;
    }

    let colored_line = match level {
        LogLevel::Error => line.red().bold(),
        LogLevel::Warning => line.yellow(),
        LogLevel::Info => line.normal(),
        LogLevel::Debug => line.cyan(),
        LogLevel::Verbose => line.dimmed(),
    };

    println!("{}", colored_line);
}
