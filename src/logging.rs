//! Logger setup for binaries and harnesses embedding the player
//!
//! Verbosity maps to a default filter (0 = warn, 1 = info, 2 = debug,
//! 3+ = trace). `RUST_LOG` still wins when set.

use log::LevelFilter;

/// Level filter for a `-v` count
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install `env_logger` on stderr with millisecond timestamps.
///
/// Returns an error if a logger is already installed.
pub fn init(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let default_level = level_for(verbosity).as_str().to_lowercase();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(7), LevelFilter::Trace);
    }

    #[test]
    fn test_init_only_once() {
        // first call may lose to another test's logger; the second never succeeds
        let _ = init(2);
        assert!(init(2).is_err());
    }
}
