use super::error::{PoolError, PoolResult};
use derive_builder::Builder;
use std::time::Duration;

#[derive(Clone, Builder)]
#[builder(pattern = "owned")]
pub struct PoolConfig {
    /// Upper bound on live units
    #[builder(default = "4")]
    pub max_units: usize,

    /// Operations a unit may receive before it is recycled
    #[builder(default = "10_000")]
    pub operations_per_unit: u64,

    #[builder(default = "Duration::from_secs(5)")]
    pub operation_timeout: Duration,

    /// How long a stopping unit gets to flush before it is detached
    #[builder(default = "Duration::from_secs(2)")]
    pub shutdown_grace: Duration,

    /// Zero disables periodic checkpoints
    #[builder(default = "Duration::from_secs(60)")]
    pub checkpoint_interval: Duration,

    #[builder(default = "None", setter(into, strip_option))]
    pub checkpoint_location: Option<String>,

    #[builder(default = "None", setter(into, strip_option))]
    pub password: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_units: 4,
            operations_per_unit: 10_000,
            operation_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
            checkpoint_interval: Duration::from_secs(60),
            checkpoint_location: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_units", &self.max_units)
            .field("operations_per_unit", &self.operations_per_unit)
            .field("operation_timeout", &self.operation_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("checkpoint_interval", &self.checkpoint_interval)
            .field("checkpoint_location", &self.checkpoint_location)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PoolConfig {
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_units == 0 {
            return Err(PoolError::InvalidConfig("max_units must be > 0".into()));
        }
        if self.operations_per_unit == 0 {
            return Err(PoolError::InvalidConfig(
                "operations_per_unit must be > 0".into(),
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "operation_timeout must be > 0".into(),
            ));
        }
        if self.checkpoint_location.is_some() != self.password.is_some() {
            return Err(PoolError::InvalidConfig(
                "checkpoint_location and password must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Location and password, when checkpointing is configured.
    pub(crate) fn checkpoint_target(&self) -> Option<(&str, &str)> {
        match (&self.checkpoint_location, &self.password) {
            (Some(location), Some(password)) => Some((location.as_str(), password.as_str())),
            _ => None,
        }
    }
}
