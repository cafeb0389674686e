use std::sync::atomic::{AtomicU8, Ordering};
use colored::Colorize;

/// How chatty the tool is. `Error` only reports failures, `Detail` reports
/// useful progress, `Info` reports everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Detail = 1,
    Info = 2,
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Error as u8);

/// Sets the process-wide log level. Called once from the CLI.
pub fn set_level(level: Level) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

fn enabled(level: Level) -> bool {
    LEVEL.load(Ordering::Relaxed) >= level as u8
}

/// Logs a non-fatal error. The pipeline keeps going after these.
pub fn error(message: &str) {
    if enabled(Level::Error) {
        eprintln!("{} {}", "Error:".red(), message);
    }
}

/// Logs progress that is useful when watching a build.
pub fn detail(message: &str) {
    if enabled(Level::Detail) {
        println!("{}", message);
    }
}

/// Logs everything else.
pub fn info(message: &str) {
    if enabled(Level::Info) {
        println!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Detail);
        assert!(Level::Detail < Level::Info);
    }

    #[test]
    fn test_set_level_filters() {
        set_level(Level::Detail);
        assert!(enabled(Level::Error));
        assert!(enabled(Level::Detail));
        assert!(!enabled(Level::Info));
        set_level(Level::Error);
    }
}
