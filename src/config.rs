use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Tunables of a [`FlowEngine`](crate::flow::FlowEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum length in bytes of an SCPI command or query text.
    pub command_buffer_capacity: usize,
    /// Used when an SCPI component has no timeout expression; negative means host default.
    pub default_timeout_ms: i32,
    /// Used when an SCPI component has no delay expression; negative means host default.
    pub default_delay_ms: i32,
    /// Upper bound on component executions within a single tick.
    pub max_executions_per_tick: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_buffer_capacity: 256,
            default_timeout_ms: -1,
            default_delay_ms: -1,
            max_executions_per_tick: 1000,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "command_buffer_capacity",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_executions_per_tick == 0 {
            return Err(ConfigError::Invalid {
                field: "max_executions_per_tick",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
