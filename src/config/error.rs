//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value `{value}` for environment variable {key}")]
    Env { key: String, value: String },

    #[error("Config validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("sluice.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("sluice.toml"));

        let env_err = ConfigError::Env {
            key: "SLUICE_MINIFY".into(),
            value: "maybe".into(),
        };
        assert_eq!(
            env_err.to_string(),
            "invalid value `maybe` for environment variable SLUICE_MINIFY"
        );
    }
}
