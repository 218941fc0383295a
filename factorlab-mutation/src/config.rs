//! Serializable mutation configuration.
//!
//! Loaded from TOML; every section and field has a default, so an empty file
//! is a valid configuration:
//!
//! ```toml
//! max_retries = 3
//! seed = 42
//! selection = "weighted"
//!
//! [tiers]
//! parametric = 0.5
//! structural = 0.3
//! logic = 0.2
//!
//! [parametric]
//! scale_min = 0.8
//! scale_max = 1.2
//!
//! [structural]
//! removal_policy = "reject"
//! add_weight = 0.4
//! remove_weight = 0.3
//! replace_weight = 0.3
//! max_factors = 12
//!
//! [logic]
//! combinators = ["and", "or", "mean"]
//! substitute_weight = 0.7
//! combine_weight = 0.3
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use factorlab_core::factor::composite::CombineMode;
use factorlab_core::RemovalPolicy;

/// Tolerance on the tier weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid mutation config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid mutation config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ─── Sections ────────────────────────────────────────────────────────

/// How the tier for each attempt is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Random draw proportional to the tier weights.
    #[default]
    Weighted,
    /// Deterministic band of the strategy's risk score.
    RiskScore,
}

/// Selection weight per tier. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierWeights {
    pub parametric: f64,
    pub structural: f64,
    pub logic: f64,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            parametric: 0.5,
            structural: 0.3,
            logic: 0.2,
        }
    }
}

impl TierWeights {
    pub fn sum(&self) -> f64 {
        self.parametric + self.structural + self.logic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametricConfig {
    /// Lower bound of the multiplicative perturbation.
    pub scale_min: f64,
    /// Upper bound of the multiplicative perturbation.
    pub scale_max: f64,
}

impl Default for ParametricConfig {
    fn default() -> Self {
        Self {
            scale_min: 0.8,
            scale_max: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralConfig {
    pub removal_policy: RemovalPolicy,
    pub add_weight: f64,
    pub remove_weight: f64,
    pub replace_weight: f64,
    /// Additions stop once a strategy holds this many factors.
    pub max_factors: usize,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            removal_policy: RemovalPolicy::Reject,
            add_weight: 0.4,
            remove_weight: 0.3,
            replace_weight: 0.3,
            max_factors: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicConfig {
    /// Modes tried when two entry signals are combined.
    pub combinators: Vec<CombineMode>,
    pub substitute_weight: f64,
    pub combine_weight: f64,
}

impl Default for LogicConfig {
    fn default() -> Self {
        Self {
            combinators: CombineMode::ALL.to_vec(),
            substitute_weight: 0.7,
            combine_weight: 0.3,
        }
    }
}

// ─── Top level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Attempts per `mutate` call before giving up.
    pub max_retries: usize,
    /// Master seed for the RNG hierarchy.
    pub seed: u64,
    pub selection: SelectionMode,
    pub tiers: TierWeights,
    pub parametric: ParametricConfig,
    pub structural: StructuralConfig,
    pub logic: LogicConfig,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            seed: 42,
            selection: SelectionMode::Weighted,
            tiers: TierWeights::default(),
            parametric: ParametricConfig::default(),
            structural: StructuralConfig::default(),
            logic: LogicConfig::default(),
        }
    }
}

impl MutationConfig {
    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tiers;
        for (field, w) in [
            ("tiers.parametric", t.parametric),
            ("tiers.structural", t.structural),
            ("tiers.logic", t.logic),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(invalid(field, format!("must be a non-negative weight, got {w}")));
            }
        }
        if (t.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(invalid(
                "tiers",
                format!("weights must sum to 1.0 (±{WEIGHT_SUM_TOLERANCE}), got {}", t.sum()),
            ));
        }

        let p = &self.parametric;
        if !p.scale_min.is_finite() || p.scale_min <= 0.0 {
            return Err(invalid(
                "parametric.scale_min",
                format!("must be positive, got {}", p.scale_min),
            ));
        }
        if p.scale_min > 1.0 || p.scale_max < 1.0 || !p.scale_max.is_finite() {
            return Err(invalid(
                "parametric",
                format!(
                    "scale interval [{}, {}] must contain 1.0",
                    p.scale_min, p.scale_max
                ),
            ));
        }

        let s = &self.structural;
        check_op_weights(
            "structural",
            &[s.add_weight, s.remove_weight, s.replace_weight],
        )?;
        if s.max_factors == 0 {
            return Err(invalid("structural.max_factors", "must be at least 1"));
        }

        let l = &self.logic;
        check_op_weights("logic", &[l.substitute_weight, l.combine_weight])?;

        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        Ok(())
    }
}

fn check_op_weights(field: &'static str, weights: &[f64]) -> Result<(), ConfigError> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(invalid(
            field,
            format!("operation weights must be non-negative, got {weights:?}"),
        ));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(invalid(field, "at least one operation weight must be positive"));
    }
    Ok(())
}
