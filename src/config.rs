use std::env;
use std::str::FromStr;

use crate::engine::{CombinationEngine, EXHAUSTIVE_MAX_MATCHES, EngineConfig, SAMPLE_BUDGET};
use crate::error::{PickerError, Result};
use crate::selector::{DEFAULT_MAX_ATTEMPTS, SessionSelector};

/// Payout cap for standard-limit deployments.
pub const DEFAULT_PAYOUT_CAP: f64 = 250_000.0;
/// Payout cap for high-limit deployments.
pub const HIGH_LIMIT_PAYOUT_CAP: f64 = 650_000.0;
pub const DEFAULT_STAKE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PickerConfig {
    pub stake_amount: f64,
    pub payout_cap: f64,
    pub max_attempts: usize,
    pub target_favorites: Option<usize>,
    pub target_underdogs: Option<usize>,
    pub exhaustive_threshold: usize,
    pub sample_budget: usize,
    pub seed: Option<u64>,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            stake_amount: DEFAULT_STAKE,
            payout_cap: DEFAULT_PAYOUT_CAP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            target_favorites: None,
            target_underdogs: None,
            exhaustive_threshold: EXHAUSTIVE_MAX_MATCHES,
            sample_budget: SAMPLE_BUDGET,
            seed: None,
        }
    }
}

impl PickerConfig {
    /// Reads `PICKER_*` variables; anything unset or unparseable keeps its default.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            stake_amount: env_parse("PICKER_STAKE").unwrap_or(d.stake_amount),
            payout_cap: env_payout_cap().unwrap_or(d.payout_cap),
            max_attempts: env_parse("PICKER_MAX_ATTEMPTS").unwrap_or(d.max_attempts),
            target_favorites: env_parse("PICKER_TARGET_FAVORITES"),
            target_underdogs: env_parse("PICKER_TARGET_UNDERDOGS"),
            exhaustive_threshold: env_parse::<usize>("PICKER_EXHAUSTIVE_MAX")
                .unwrap_or(d.exhaustive_threshold)
                .clamp(1, 63),
            sample_budget: env_parse::<usize>("PICKER_SAMPLE_BUDGET")
                .unwrap_or(d.sample_budget)
                .max(1),
            seed: env_parse("PICKER_SEED"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stake_amount.is_finite() && self.stake_amount > 0.0) {
            return Err(PickerError::InvalidConfig(format!(
                "stake amount must be positive, got {}",
                self.stake_amount
            )));
        }
        if !(self.payout_cap.is_finite() && self.payout_cap > 0.0) {
            return Err(PickerError::InvalidConfig(format!(
                "payout cap must be positive, got {}",
                self.payout_cap
            )));
        }
        if self.max_attempts == 0 {
            return Err(PickerError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if self.sample_budget == 0 {
            return Err(PickerError::InvalidConfig(
                "sample budget must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            payout_cap: self.payout_cap,
            exhaustive_threshold: self.exhaustive_threshold,
            sample_budget: self.sample_budget,
        }
    }

    pub fn build_engine(&self) -> Result<CombinationEngine> {
        self.validate()?;
        Ok(match self.seed {
            Some(seed) => CombinationEngine::with_seed(self.engine_config(), seed),
            None => CombinationEngine::new(self.engine_config()),
        })
    }

    pub fn build_selector(&self) -> Result<SessionSelector> {
        Ok(SessionSelector::new(self.build_engine()?, self.max_attempts))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

// Accepts a number or one of the named deployment tiers.
fn env_payout_cap() -> Option<f64> {
    let raw = env::var("PICKER_PAYOUT_CAP").ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "standard" => Some(DEFAULT_PAYOUT_CAP),
        "high" => Some(HIGH_LIMIT_PAYOUT_CAP),
        other => other.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PickerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.engine_config(), EngineConfig::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_stake = PickerConfig {
            stake_amount: 0.0,
            ..PickerConfig::default()
        };
        assert!(matches!(bad_stake.validate(), Err(PickerError::InvalidConfig(_))));

        let bad_cap = PickerConfig {
            payout_cap: f64::NAN,
            ..PickerConfig::default()
        };
        assert!(bad_cap.validate().is_err());

        let no_attempts = PickerConfig {
            max_attempts: 0,
            ..PickerConfig::default()
        };
        assert!(no_attempts.build_selector().is_err());
    }
}
