use crate::bloom::{FilterConfig, FilterConfigBuilder, FilterError};
use crate::lookup::LookupConfig;
use crate::pool::{InitOptions, PoolConfig};
use derive_builder::Builder;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse environment variable {var_name}: value '{value}' - {error}")]
    EnvParse {
        var_name: String,
        value: String,
        error: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<FilterError> for ConfigError {
    fn from(err: FilterError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

/// Settings for a whole service instance: filter sizing, persistence, pool
/// and lookup behaviour.
#[derive(Clone, Builder)]
#[builder(pattern = "owned")]
pub struct ServiceConfig {
    #[builder(default = "1_000_000")]
    pub expected_elements: usize,
    #[builder(default = "0.01")]
    pub false_positive_rate: f64,
    #[builder(default = "None", setter(into, strip_option))]
    pub state_path: Option<String>,
    #[builder(default = "None", setter(into, strip_option))]
    pub password: Option<String>,
    #[builder(default = "4")]
    pub max_units: usize,
    #[builder(default = "10_000")]
    pub operations_per_unit: u64,
    #[builder(default = "Duration::from_secs(60)")]
    pub checkpoint_interval: Duration,
    #[builder(default = "None", setter(into, strip_option))]
    pub checkpoint_path: Option<String>,
    #[builder(default = "Duration::from_millis(5000)")]
    pub operation_timeout: Duration,
    #[builder(default = "3600")]
    pub cache_ttl_secs: u64,
    #[builder(default = "\"entity\".to_string()", setter(into))]
    pub namespace: String,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("expected_elements", &self.expected_elements)
            .field("false_positive_rate", &self.false_positive_rate)
            .field("state_path", &self.state_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_units", &self.max_units)
            .field("operations_per_unit", &self.operations_per_unit)
            .field("checkpoint_interval", &self.checkpoint_interval)
            .field("checkpoint_path", &self.checkpoint_path)
            .field("operation_timeout", &self.operation_timeout)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("namespace", &self.namespace)
            .finish()
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::EnvParse {
            var_name: name.to_string(),
            value: raw.clone(),
            error: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl ServiceConfig {
    /// Reads `TBLOOM_*` variables, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            expected_elements: parse_var(&lookup, "TBLOOM_EXPECTED_ELEMENTS", 1_000_000)?,
            false_positive_rate: parse_var(&lookup, "TBLOOM_FALSE_POSITIVE_RATE", 0.01)?,
            state_path: non_empty("TBLOOM_STATE_PATH"),
            password: non_empty("TBLOOM_PASSWORD"),
            max_units: parse_var(&lookup, "TBLOOM_MAX_UNITS", 4)?,
            operations_per_unit: parse_var(&lookup, "TBLOOM_OPERATIONS_PER_UNIT", 10_000)?,
            checkpoint_interval: Duration::from_secs(parse_var(
                &lookup,
                "TBLOOM_CHECKPOINT_INTERVAL_SECS",
                60,
            )?),
            checkpoint_path: non_empty("TBLOOM_CHECKPOINT_PATH"),
            operation_timeout: Duration::from_millis(parse_var(
                &lookup,
                "TBLOOM_OPERATION_TIMEOUT_MS",
                5000,
            )?),
            cache_ttl_secs: parse_var(&lookup, "TBLOOM_CACHE_TTL_SECS", 3600)?,
            namespace: non_empty("TBLOOM_NAMESPACE").unwrap_or_else(|| "entity".to_string()),
        })
    }

    pub fn filter_config(&self) -> Result<FilterConfig, ConfigError> {
        let config = FilterConfigBuilder::default()
            .expected_elements(self.expected_elements)
            .false_positive_rate(self.false_positive_rate)
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Pool settings. Checkpoints need both a path and the password.
    pub fn pool_config(&self) -> PoolConfig {
        let (checkpoint_location, password) = match (&self.checkpoint_path, &self.password) {
            (Some(path), Some(password)) => (Some(path.clone()), Some(password.clone())),
            _ => (None, None),
        };
        PoolConfig {
            max_units: self.max_units,
            operations_per_unit: self.operations_per_unit,
            operation_timeout: self.operation_timeout,
            checkpoint_interval: self.checkpoint_interval,
            checkpoint_location,
            password,
            ..PoolConfig::default()
        }
    }

    pub fn lookup_config(&self) -> LookupConfig {
        LookupConfig {
            namespace: self.namespace.clone(),
            cache_ttl_secs: self.cache_ttl_secs,
            ..LookupConfig::default()
        }
    }

    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            expected_elements: self.expected_elements,
            false_positive_rate: self.false_positive_rate,
            load_existing: true,
            password: self.password.clone(),
            state_path: self.state_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = ServiceConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.expected_elements, 1_000_000);
        assert_eq!(config.false_positive_rate, 0.01);
        assert_eq!(config.max_units, 4);
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.namespace, "entity");
        assert!(config.password.is_none());
        assert!(config.pool_config().checkpoint_location.is_none());
    }

    #[test]
    fn test_reads_variables() {
        let config = ServiceConfig::from_vars(vars(&[
            ("TBLOOM_EXPECTED_ELEMENTS", "5000"),
            ("TBLOOM_FALSE_POSITIVE_RATE", "0.001"),
            ("TBLOOM_STATE_PATH", "/var/lib/tbloom/filter.state"),
            ("TBLOOM_PASSWORD", "pw"),
            ("TBLOOM_CHECKPOINT_PATH", "/var/lib/tbloom/pool.state"),
            ("TBLOOM_OPERATION_TIMEOUT_MS", "250"),
            ("TBLOOM_NAMESPACE", "email"),
        ]))
        .unwrap();

        assert_eq!(config.expected_elements, 5000);
        let pool = config.pool_config();
        assert_eq!(pool.operation_timeout, Duration::from_millis(250));
        assert_eq!(pool.checkpoint_location.as_deref(), Some("/var/lib/tbloom/pool.state"));
        assert!(pool.validate().is_ok());

        let init = config.init_options();
        assert_eq!(init.state_path.as_deref(), Some("/var/lib/tbloom/filter.state"));
        assert_eq!(config.lookup_config().cache_key("x"), "email:x");
    }

    #[test]
    fn test_bad_value_names_the_variable() {
        let err = ServiceConfig::from_vars(vars(&[("TBLOOM_MAX_UNITS", "many")])).unwrap_err();
        match err {
            ConfigError::EnvParse {
                var_name, value, ..
            } => {
                assert_eq!(var_name, "TBLOOM_MAX_UNITS");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_filter_config_is_validated() {
        let config =
            ServiceConfig::from_vars(vars(&[("TBLOOM_FALSE_POSITIVE_RATE", "1.5")])).unwrap();
        assert!(matches!(config.filter_config(), Err(ConfigError::Invalid(_))));
    }
}
