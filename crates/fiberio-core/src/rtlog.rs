//! Kernel-style leveled logging macros.
//!
//! A tiny structured-logging facade, deliberately not `log`/`tracing`: the
//! runtime has no business pulling in a logging facade crate for a handful
//! of call sites in the scheduler and backends. Output goes to stderr,
//! gated by a process-wide level, with an optional elapsed-time prefix.
//!
//! # Environment variables
//!
//! - `RT_LOG_LEVEL` — `off`/`error`/`warn`/`info`/`debug`/`trace` (or 0-5)
//! - `RT_LOG_TIME` — include an elapsed-nanosecond prefix
//! - `RT_LOG_FLUSH` — flush stderr after every line (useful when chasing a crash)

use crate::env::env_get_bool;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

/// Log levels, ordered from least to most verbose.
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
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

fn ensure_init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    START_TIME.get_or_init(Instant::now);
    FLUSH_ENABLED.store(env_get_bool("RT_LOG_FLUSH", false), Ordering::Relaxed);
    TIME_ENABLED.store(env_get_bool("RT_LOG_TIME", false), Ordering::Relaxed);
    if let Ok(val) = std::env::var("RT_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Set the log level programmatically (overrides `RT_LOG_LEVEL`).
pub fn set_log_level(level: LogLevel) {
    ensure_init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

fn log_level() -> LogLevel {
    ensure_init();
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

fn elapsed_ns() -> u64 {
    ensure_init();
    START_TIME.get().unwrap().elapsed().as_nanos() as u64
}

#[doc(hidden)]
pub fn _log_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    if TIME_ENABLED.load(Ordering::Relaxed) {
        let _ = write!(handle, "[{}] ", elapsed_ns());
    }
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

/// Error-level log.
#[macro_export]
macro_rules! rterror {
    ($($arg:tt)*) => {{
        $crate::rtlog::_log_impl($crate::rtlog::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warn-level log.
#[macro_export]
macro_rules! rtwarn {
    ($($arg:tt)*) => {{
        $crate::rtlog::_log_impl($crate::rtlog::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info-level log.
#[macro_export]
macro_rules! rtinfo {
    ($($arg:tt)*) => {{
        $crate::rtlog::_log_impl($crate::rtlog::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Trace-level log.
#[macro_export]
macro_rules! rttrace {
    ($($arg:tt)*) => {{
        $crate::rtlog::_log_impl($crate::rtlog::LogLevel::Trace, format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn macros_compile_and_respect_off() {
        set_log_level(LogLevel::Off);
        rterror!("err {}", 1);
        rtwarn!("warn");
        rtinfo!("info {}", "x");
        rttrace!("trace");
        set_log_level(LogLevel::Info);
    }
}
