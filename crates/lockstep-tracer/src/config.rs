//! Validator configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Knobs of the validating tracer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Instructions allowed before execution is treated as an endless loop
    pub max_instructions: u64,
    /// Instructions kept for failure reports
    pub history_len: usize,
    /// Extra gas the engine may be ahead of the reference, on top of the
    /// first block's pre-charge
    pub gas_slack_above: i64,
    /// Gas the engine may lag behind the reference
    pub gas_slack_below: i64,
    /// Keep every step, not just the recent history
    pub record_full_log: bool,
    /// Downgrade a stack size mismatch after a CALL-family opcode to a
    /// warning when the reference runs without a host
    pub exempt_calls_without_host: bool,
    /// Panic on a fatal divergence instead of recording it
    pub abort_on_divergence: bool,
    /// Stack entries printed per side in reports
    pub report_stack_depth: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_instructions: 300_000_000,
            history_len: 10,
            gas_slack_above: 50,
            gas_slack_below: 20,
            record_full_log: false,
            exempt_calls_without_host: true,
            abort_on_divergence: true,
            report_stack_depth: 10,
        }
    }
}

impl ValidatorConfig {
    /// Parse from JSON; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the tracer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_len == 0 {
            return Err(ConfigError::Invalid("history_len must be at least 1".into()));
        }
        if self.gas_slack_above < 0 || self.gas_slack_below < 0 {
            return Err(ConfigError::Invalid("gas slack must not be negative".into()));
        }
        Ok(())
    }

    /// Record divergences instead of panicking
    pub fn recording() -> Self {
        Self { abort_on_divergence: false, ..Self::default() }
    }
}
