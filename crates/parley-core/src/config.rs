//! Debate configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 80.0;
const MAX_ITERATIONS_CAP: u32 = 5;

/// Configuration for one debate: which model backs each role plus the
/// termination policy knobs.
///
/// Required when switching a conversation to debate mode; the mode manager
/// rejects the switch without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    pub moderator_model: String,
    pub expert_model: String,
    pub critic_model: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_score_threshold() -> f64 {
    DEFAULT_SCORE_THRESHOLD
}

impl DebateConfig {
    pub fn new(
        moderator_model: impl Into<String>,
        expert_model: impl Into<String>,
        critic_model: impl Into<String>,
    ) -> Self {
        Self {
            moderator_model: moderator_model.into(),
            expert_model: expert_model.into(),
            critic_model: critic_model.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    /// Validate the termination policy knobs.
    pub fn validate(&self) -> Result<(), String> {
        if self.moderator_model.is_empty()
            || self.expert_model.is_empty()
            || self.critic_model.is_empty()
        {
            return Err("all three role models must be set".to_string());
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATIONS_CAP {
            return Err(format!(
                "max_iterations must be between 1 and {}",
                MAX_ITERATIONS_CAP
            ));
        }
        if !(0.0..=100.0).contains(&self.score_threshold) {
            return Err("score_threshold must be between 0 and 100".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DebateConfig {
        DebateConfig::new("mod-model", "expert-model", "critic-model")
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let mut cfg = config();
        cfg.max_iterations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut cfg = config();
        cfg.score_threshold = 120.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_model() {
        let mut cfg = config();
        cfg.expert_model = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let cfg: DebateConfig = serde_json::from_str(
            r#"{"moderator_model":"a","expert_model":"b","critic_model":"c"}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(cfg.score_threshold, DEFAULT_SCORE_THRESHOLD);
    }
}
