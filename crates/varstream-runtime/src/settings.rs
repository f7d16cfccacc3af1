//! Bridge parameters.

use serde::{Deserialize, Serialize};
use varstream_types::{BridgeError, Result};

/// Parameters of one bridge instance.
///
/// Missing fields take their defaults when deserialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Variables to export. Empty means every variable of the space.
    pub vars: Vec<String>,
    /// Stable source identifier; lets consumers recover streams across
    /// rebuilds. Empty disables recovery.
    pub source_id: String,
    /// Refuse to run on a real-time scheduled thread.
    pub rt_strict: bool,
    /// Send samples. When off every cycle is a pass-through.
    pub activate: bool,
    /// Cycles to skip after each send.
    pub skip: u32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            vars: Vec::new(),
            source_id: String::new(),
            rt_strict: true,
            activate: true,
            skip: 0,
        }
    }
}

impl BridgeSettings {
    /// Check the variable list.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidConfig`] when a name is empty or contains
    /// whitespace; such a name can never appear in a variable listing.
    pub fn validate(&self) -> Result<()> {
        validate_vars(&self.vars)
    }
}

pub(crate) fn validate_vars(vars: &[String]) -> Result<()> {
    for name in vars {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(BridgeError::InvalidConfig(format!(
                "invalid variable name {name:?} in \"vars\""
            )));
        }
    }
    Ok(())
}

/// Signal dimensions announced by the host on prepare.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineShape {
    /// Audio sampling rate in Hz.
    pub sample_rate: f64,
    /// Samples per processing cycle.
    pub fragment_size: u32,
}

impl PipelineShape {
    pub fn new(sample_rate: f64, fragment_size: u32) -> Self {
        Self {
            sample_rate,
            fragment_size,
        }
    }

    /// Processing cycles per second.
    pub fn cycle_rate(&self) -> f64 {
        self.sample_rate / f64::from(self.fragment_size)
    }

    /// Nominal rate of a stream that sends once every `skip + 1` cycles.
    pub fn stream_rate(&self, skip: u32) -> f64 {
        self.cycle_rate() / (f64::from(skip) + 1.0)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(BridgeError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.fragment_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "fragment size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
