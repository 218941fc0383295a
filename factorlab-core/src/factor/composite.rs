//! Composite factors — combine other factors' outputs.
//!
//! `Position` turns an entry signal plus optional exit/filter/risk matrices
//! into the final position-signal matrix handed to the backtest engine.
//! `SignalCombiner` merges two directional signals with a configurable mode.

use serde::{Deserialize, Serialize};

use crate::matrix::Matrix;

use super::{single, FactorFault, FactorInputs, FactorOutputs, Transform};

/// Final position matrix: `entry × mask × scale`, flattened where an exit fires.
///
/// Undefined (NaN) entry, mask or scale cells produce a flat position, so the
/// output is always a finite value in [-1, 1].
#[derive(Debug, Clone)]
pub struct Position {
    pub allow_short: bool,
}

impl Transform for Position {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let entry = inputs.get("entry")?;
        let exit = inputs.optional("exit");
        let mask = inputs.optional("filter");
        let scale = inputs.optional("scale");

        let out = Matrix::from_fn(inputs.shape(), |r, c| {
            let mut e = entry.get(r, c);
            if e.is_nan() || (!self.allow_short && e < 0.0) {
                return 0.0;
            }
            if exit.is_some_and(|m| m.get(r, c) == 1.0) {
                return 0.0;
            }
            if mask.is_some_and(|m| m.get(r, c) != 1.0) {
                return 0.0;
            }
            if let Some(s) = scale {
                let s = s.get(r, c);
                e = if s.is_nan() { 0.0 } else { e * s.clamp(0.0, 1.0) };
            }
            e.clamp(-1.0, 1.0)
        });
        Ok(single("position", out))
    }
}

/// How two directional signals are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// Direction only where both signals agree.
    And,
    /// Direction where either fires, flat where they conflict.
    Or,
    /// Arithmetic mean.
    Mean,
}

impl CombineMode {
    pub const ALL: [CombineMode; 3] = [Self::And, Self::Or, Self::Mean];

    /// Encoded parameter value (`mode` is a choice parameter).
    pub fn code(self) -> f64 {
        match self {
            Self::And => 0.0,
            Self::Or => 1.0,
            Self::Mean => 2.0,
        }
    }

    pub fn from_code(code: f64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    fn combine(self, l: f64, r: f64) -> f64 {
        if l.is_nan() || r.is_nan() {
            return f64::NAN;
        }
        match self {
            Self::And => {
                if l != 0.0 && l.signum() == r.signum() && r != 0.0 {
                    l.signum()
                } else {
                    0.0
                }
            }
            Self::Or => {
                if l != 0.0 && r != 0.0 && l.signum() != r.signum() {
                    0.0
                } else if l != 0.0 {
                    l.signum()
                } else if r != 0.0 {
                    r.signum()
                } else {
                    0.0
                }
            }
            Self::Mean => (l + r) / 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalCombiner {
    pub mode: CombineMode,
}

impl Transform for SignalCombiner {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let left = inputs.get("left")?;
        let right = inputs.get("right")?;
        let out = left
            .zip_with(right, |l, r| self.mode.combine(l, r))
            .ok_or_else(|| FactorFault::Numeric("left/right shape mismatch".into()))?;
        Ok(single("signal", out))
    }
}
