//! Leveled stderr logging for the TrustEngine driver
//!
//! Lines are written under the stderr lock so concurrent agents never
//! interleave within a line.
//!
//! # Environment Variables
//!
//! - `TE_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5)
//! - `TE_LOG_FLUSH=1` - flush stderr after every line
//!
//! # Usage
//!
//! ```ignore
//! use te_core::{te_err, te_info, te_dbg};
//!
//! te_info!("sca: agent up, cq_thresh={}", thresh);
//! te_dbg!("sca: slot {} queued", slot);
//! te_err!("hash: eq read failed: {}", e);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Once;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or number; `None` for anything else
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "dbg" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "E",
            LogLevel::Warn => "W",
            LogLevel::Info => "I",
            LogLevel::Debug => "D",
            LogLevel::Trace => "T",
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static FLUSH: AtomicBool = AtomicBool::new(false);
static ENV: Once = Once::new();

/// Apply `TE_LOG_LEVEL` / `TE_LOG_FLUSH`. Runs once; later calls are no-ops.
pub fn init() {
    ENV.call_once(|| {
        if let Some(level) = std::env::var("TE_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
        {
            LEVEL.store(level as u8, Ordering::Relaxed);
        }
        if let Ok(v) = std::env::var("TE_LOG_FLUSH") {
            FLUSH.store(
                matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
                Ordering::Relaxed,
            );
        }
    });
}

#[inline]
pub fn log_level() -> LogLevel {
    init();
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Override the level (takes precedence over the environment)
pub fn set_log_level(level: LogLevel) {
    init();
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush(enabled: bool) {
    init();
    FLUSH.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

#[doc(hidden)]
pub fn _emit(level: Option<LogLevel>, args: std::fmt::Arguments<'_>) {
    if let Some(l) = level {
        if !enabled(l) {
            return;
        }
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = match level {
        Some(l) => writeln!(out, "te[{}] {}", l.tag(), args),
        None => writeln!(out, "{}", args),
    };
    if FLUSH.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

/// Unconditional line on stderr
#[macro_export]
macro_rules! te_print {
    ($($arg:tt)*) => {{
        $crate::tlog::_emit(None, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! te_err {
    ($($arg:tt)*) => {{
        $crate::tlog::_emit(Some($crate::tlog::LogLevel::Error), format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! te_warn {
    ($($arg:tt)*) => {{
        $crate::tlog::_emit(Some($crate::tlog::LogLevel::Warn), format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! te_info {
    ($($arg:tt)*) => {{
        $crate::tlog::_emit(Some($crate::tlog::LogLevel::Info), format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! te_dbg {
    ($($arg:tt)*) => {{
        $crate::tlog::_emit(Some($crate::tlog::LogLevel::Debug), format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! te_trace {
    ($($arg:tt)*) => {{
        $crate::tlog::_emit(Some($crate::tlog::LogLevel::Trace), format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert_eq!(LogLevel::from_u8(42), LogLevel::Trace);
    }

    #[test]
    fn test_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" 1 "), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_off_is_never_enabled() {
        assert!(!enabled(LogLevel::Off));
    }

    #[test]
    fn test_macros_compile() {
        te_err!("err {}", 1);
        te_warn!("warn");
        te_info!("info {:?}", Some(3));
        te_dbg!("dbg");
        te_trace!("trace");
    }
}
