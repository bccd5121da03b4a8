//! Tracing subscriber setup driven by [`LoggingConfig`].

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber for the given configuration.
///
/// `RUST_LOG` takes precedence over the configured directives. An already
/// installed subscriber is left in place, so the call is safe from tests and
/// from hosts that configure tracing themselves.
///
/// # Errors
///
/// Returns an error if the configured level does not parse.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    config.parse_level()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let _ = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggingConfig {
            level: "chatty".to_string(),
            ..Default::default()
        };
        assert!(init_logging(&config).is_err());
    }
}
