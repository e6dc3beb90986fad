//! Logger initialization.
//!
//! `RUST_LOG` wins over the configured level so a single run can be made
//! more verbose without touching configuration files.

use log::LevelFilter;

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

/// Parse a configured `logLevel` value.
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|value| value.trim().parse::<LevelFilter>().ok())
        .unwrap_or(DEFAULT_LEVEL)
}

/// Install `env_logger` writing to stderr.
///
/// Returns false when a logger is already installed (tests, embedders).
pub fn init_logging(level: Option<&str>) -> bool {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(level))
        .target(env_logger::Target::Stderr)
        .format_timestamp_millis();
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_accepts_case_insensitive_names() {
        assert_eq!(parse_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("TRACE")), LevelFilter::Trace);
        assert_eq!(parse_level(Some(" off ")), LevelFilter::Off);
    }

    #[test]
    fn parse_level_falls_back_to_warn() {
        assert_eq!(parse_level(None), LevelFilter::Warn);
        assert_eq!(parse_level(Some("chatty")), LevelFilter::Warn);
    }

    #[test]
    fn second_initialization_is_harmless() {
        init_logging(Some("debug"));
        assert!(!init_logging(Some("info")));
    }
}
