//! 日志模块
//!
//! 提供跨前端的统一日志级别和条目定义。
//! 核心库本身通过 `log` 门面输出，前端负责安装订阅者。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 日志级别
///
/// 数值越小越严重，`PartialOrd` 可直接用于过滤。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// 在当前过滤级别下是否显示 `other`
    pub fn allows(&self, other: LogLevel) -> bool {
        other <= *self
    }

    /// 在 Info 和 Debug 之间切换
    pub fn toggle_verbose(&self) -> Self {
        if *self >= LogLevel::Debug {
            LogLevel::Info
        } else {
            LogLevel::Debug
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// 日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
        }
    }

    /// target 的最后一段，例如 `wifisender_core::transfer::receiver` 取 `receiver`
    pub fn short_target(&self) -> &str {
        self.target.rsplit("::").next().unwrap_or(&self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filtering() {
        assert!(LogLevel::Info.allows(LogLevel::Warn));
        assert!(LogLevel::Info.allows(LogLevel::Info));
        assert!(!LogLevel::Info.allows(LogLevel::Debug));
        assert_eq!(LogLevel::Info.toggle_verbose(), LogLevel::Debug);
        assert_eq!(LogLevel::Trace.toggle_verbose(), LogLevel::Info);
    }

    #[test]
    fn test_parse_tracing_levels() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_short_target() {
        let entry = LogEntry::new(LogLevel::Warn, "wifisender_core::transfer::receiver", "x");
        assert_eq!(entry.short_target(), "receiver");
        let entry = LogEntry::new(LogLevel::Info, "wifisender_tui", "x");
        assert_eq!(entry.short_target(), "wifisender_tui");
    }

    #[test]
    fn test_display_honors_width() {
        assert_eq!(format!("{:<5}|", LogLevel::Warn), "WARN |");
        assert_eq!(format!("{:<5}|", LogLevel::Error), "ERROR|");
        assert_eq!(LogLevel::Info.to_string(), "INFO");
    }
}
