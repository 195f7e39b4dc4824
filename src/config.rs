use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_ROUNDS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rounds: u32,
    /// Deadline for a whole round, in milliseconds. `None` waits forever.
    pub round_timeout_ms: Option<u64>,
    /// Attach the finished routers' results to a barrier timeout.
    pub partial_results: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            round_timeout_ms: None,
            partial_results: false,
        }
    }
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SimulationConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rounds == 0 {
            return Err(ConfigError::ZeroRounds(self.rounds));
        }
        if self.round_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_four_rounds_without_deadline() {
        let config = SimulationConfig::default();
        assert_eq!(config.rounds, 4);
        assert_eq!(config.round_timeout(), None);
        assert!(!config.partial_results);
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        fs::write(&path, r#"{ "round_timeout_ms": 250 }"#).unwrap();

        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.rounds, DEFAULT_ROUNDS);
        assert_eq!(config.round_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        let config = SimulationConfig {
            rounds: 9,
            round_timeout_ms: Some(1000),
            partial_results: true,
        };
        config.save(&path).unwrap();
        assert_eq!(SimulationConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn zero_rounds_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        fs::write(&path, r#"{ "rounds": 0 }"#).unwrap();
        assert!(SimulationConfig::load(&path).is_err());
    }

    #[test]
    fn validate_names_the_bad_field() {
        let zero_rounds = SimulationConfig {
            rounds: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(zero_rounds.validate(), Err(ConfigError::ZeroRounds(0)));

        let zero_timeout = SimulationConfig {
            round_timeout_ms: Some(0),
            ..SimulationConfig::default()
        };
        assert_eq!(zero_timeout.validate(), Err(ConfigError::ZeroTimeout));
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }
}
