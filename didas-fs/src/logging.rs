//! Per-partition log gating
//!
//! Records go through the `log` facade, but only when the level is enabled
//! by the options of the partition that emits them.

/// Log through `log` if `$level` passes the filter held by `$holder`.
///
/// `$holder` is anything with a `log_level()` method returning a
/// [`log::LevelFilter`].
macro_rules! pt_log {
    ($holder:expr, $level:expr, $($arg:tt)+) => {{
        let level: log::Level = $level;
        if level <= $holder.log_level() {
            log::log!(target: "didas_fs", level, $($arg)+);
        }
    }};
}

macro_rules! pt_error {
    ($holder:expr, $($arg:tt)+) => { pt_log!($holder, log::Level::Error, $($arg)+) };
}

macro_rules! pt_warn {
    ($holder:expr, $($arg:tt)+) => { pt_log!($holder, log::Level::Warn, $($arg)+) };
}

macro_rules! pt_debug {
    ($holder:expr, $($arg:tt)+) => { pt_log!($holder, log::Level::Debug, $($arg)+) };
}

macro_rules! pt_trace {
    ($holder:expr, $($arg:tt)+) => { pt_log!($holder, log::Level::Trace, $($arg)+) };
}
