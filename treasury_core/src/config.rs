//! Engine configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a coordinator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between ticks in milliseconds (default: 5000)
    pub tick_interval_ms: u64,

    /// Number of decisions retained by the ledger (default: 100)
    pub ledger_capacity: usize,

    /// Confidence at or above which a decision counts as a success (default: 0.7)
    pub success_threshold: f64,

    /// Lower bound of drawn confidence values (default: 0.55)
    pub min_confidence: f64,

    /// Upper bound of drawn confidence values (default: 0.98)
    pub max_confidence: f64,

    /// Largest treasury move per decision, as a fraction of portfolio value (default: 0.02)
    pub max_treasury_move: f64,

    /// Largest absolute risk/compliance score delta per decision (default: 5.0)
    pub max_score_delta: f64,

    /// Buffer size of the broadcast channel for async observers (default: 256)
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5_000,
            ledger_capacity: 100,
            success_threshold: 0.7,
            min_confidence: 0.55,
            max_confidence: 0.98,
            max_treasury_move: 0.02,
            max_score_delta: 5.0,
            event_channel_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the tick interval as a Duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Sets the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the ledger retention count.
    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity;
        self
    }

    /// Sets the success threshold.
    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Checks every bound the synthesizer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.ledger_capacity == 0 {
            return Err(ConfigError::ZeroLedgerCapacity);
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        for (name, value) in [
            ("success_threshold", self.success_threshold),
            ("min_confidence", self.min_confidence),
            ("max_confidence", self.max_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }
        if self.min_confidence > self.max_confidence {
            return Err(ConfigError::InvertedConfidence {
                min: self.min_confidence,
                max: self.max_confidence,
            });
        }
        for (name, value) in [
            ("max_treasury_move", self.max_treasury_move),
            ("max_score_delta", self.max_score_delta),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeBound { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(5));
        assert_eq!(config.ledger_capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let config = EngineConfig::default().with_ledger_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroLedgerCapacity));

        let config = EngineConfig {
            min_confidence: 0.9,
            max_confidence: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedConfidence { .. })
        ));

        let config = EngineConfig::default().with_success_threshold(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfUnitRange { name: "success_threshold", .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"tick_interval_ms": 250, "ledger_capacity": 10}"#).unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.ledger_capacity, 10);
        assert_eq!(config.success_threshold, 0.7);
    }
}
