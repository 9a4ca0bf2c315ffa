use std::str::FromStr;

use tracing::Level;

use crate::config::LogConfig;
use crate::error::{ServerError, ServerResult};

pub fn parse_level(level: &str) -> ServerResult<Level> {
    Level::from_str(level.trim()).map_err(|_| ServerError::Config(format!("unknown log level {level:?}")))
}

/// Install the global fmt subscriber, writing to stderr. Returns `false` if
/// one was already installed, which leaves the existing subscriber in place.
pub fn init_tracing(config: &LogConfig) -> ServerResult<bool> {
    let level = parse_level(&config.level)?;
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(config.ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(%level, ansi = config.ansi, "tracing initialised");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" WARN ").unwrap(), Level::WARN);
        assert!(matches!(parse_level("loud"), Err(ServerError::Config(_))));
    }

    #[test]
    fn second_init_is_harmless() {
        let config = LogConfig {
            level: "error".into(),
            ansi: false,
        };
        let _ = init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }

    #[test]
    fn bad_level_fails_before_installing() {
        let config = LogConfig {
            level: "chatty".into(),
            ansi: false,
        };
        assert!(init_tracing(&config).is_err());
    }
}
