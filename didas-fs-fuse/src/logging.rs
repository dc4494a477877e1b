//! Console logger

use core::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Add escape sequence to print with color in Linux console
macro_rules! with_color {
    ($args: ident, $color_code: ident) => {{
        format_args!("\u{1B}[{}m{}\u{1B}[0m", $color_code as u8, $args)
    }};
}

/// Print msg with color to stderr
pub fn print_in_color(args: fmt::Arguments, color_code: u8) {
    eprint!("{}", with_color!(args, color_code));
}

/// a simple logger
struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 34,  // Blue
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        print_in_color(
            format_args!(
                "[{:>5}][{}:{}] {}\n",
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            ),
            color,
        );
    }
    fn flush(&self) {}
}

/// Level named by the `LOG` environment variable
pub fn level_from_env() -> LevelFilter {
    match std::env::var("LOG").as_deref() {
        Ok("ERROR") => LevelFilter::Error,
        Ok("WARN") => LevelFilter::Warn,
        Ok("INFO") => LevelFilter::Info,
        Ok("DEBUG") => LevelFilter::Debug,
        Ok("TRACE") => LevelFilter::Trace,
        _ => LevelFilter::Error,
    }
}

/// initiate logger
pub fn init() {
    static LOGGER: SimpleLogger = SimpleLogger;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_from_env());
    }
}
