use crate::{
    db::{cache::CacheStrategy, sql::DialectKind},
    error::{ErrorClass, ErrorOrigin, InternalError},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid depot config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("max_in_keys must be at least 1")]
    ZeroInKeys,
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Config, err.to_string())
    }
}

///
/// DepotConfig
///
/// Runtime settings for one `Depot`. Every field has a default, so an empty
/// document is a valid config.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepotConfig {
    pub dialect: DialectKind,

    /// Retry an operation once after a transient failure.
    pub retry_transient: bool,

    /// Cap on keys per batched fetch; the dialect's limit applies when unset.
    pub max_in_keys: Option<usize>,

    /// Strategy for collection queries that do not name one.
    pub default_strategy: CacheStrategy,

    /// Log compiled SQL and phase transitions at debug level.
    pub debug: bool,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            retry_transient: true,
            max_in_keys: None,
            default_strategy: CacheStrategy::Best,
            debug: false,
        }
    }
}

impl DepotConfig {
    /// Parse a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&source)
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.max_in_keys, Some(0)) {
            return Err(ConfigError::ZeroInKeys);
        }

        Ok(())
    }

    #[must_use]
    pub const fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    #[must_use]
    pub const fn with_default_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_retry_transient(mut self, retry: bool) -> Self {
        self.retry_transient = retry;
        self
    }

    #[must_use]
    pub const fn with_max_in_keys(mut self, max: usize) -> Self {
        self.max_in_keys = Some(max);
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default() {
        assert_eq!(DepotConfig::from_toml("").unwrap(), DepotConfig::default());
    }

    #[test]
    fn fields_parse_with_snake_case_names() {
        let config = DepotConfig::from_toml(
            r#"
            dialect = "mysql"
            retry_transient = false
            max_in_keys = 250
            default_strategy = "long_keys"
            "#,
        )
        .unwrap();

        assert_eq!(config.dialect, DialectKind::MySql);
        assert!(!config.retry_transient);
        assert_eq!(config.max_in_keys, Some(250));
        assert_eq!(config.default_strategy, CacheStrategy::LongKeys);
        assert!(!config.debug);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = DepotConfig::from_toml("retry = true").unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_in_keys_is_rejected() {
        let err = DepotConfig::from_toml("max_in_keys = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInKeys));

        let internal = InternalError::from(err);
        assert_eq!(internal.origin, ErrorOrigin::Config);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = DepotConfig::load("/nonexistent/depot.toml").unwrap_err();

        assert!(err.to_string().contains("/nonexistent/depot.toml"));
    }
}
