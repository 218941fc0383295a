//! Risk factors — position size multipliers in [0, 1], written to a `scale` slot.

use crate::matrix::Matrix;

use super::rolling::{per_column, returns, rolling_std};
use super::{single, FactorFault, FactorInputs, FactorOutputs, Transform};

/// Scale exposure so realized volatility approaches `target_vol`, capped at 1.
#[derive(Debug, Clone)]
pub struct VolatilityTarget {
    pub lookback: usize,
    pub target_vol: f64,
}

impl Transform for VolatilityTarget {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            rolling_std(&returns(s), self.lookback)
                .into_iter()
                .map(|vol| {
                    if vol.is_nan() {
                        f64::NAN
                    } else if vol == 0.0 {
                        1.0
                    } else {
                        (self.target_vol / vol).min(1.0)
                    }
                })
                .collect()
        });
        Ok(single("scale", out))
    }
}

/// Constant fraction of full size.
#[derive(Debug, Clone)]
pub struct FixedFraction {
    pub fraction: f64,
}

impl Transform for FixedFraction {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        Ok(single("scale", Matrix::filled(inputs.shape(), self.fraction)))
    }
}
