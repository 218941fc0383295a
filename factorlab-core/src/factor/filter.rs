//! Filter factors — entry gates. Each writes a `mask` slot of 1.0/0.0 (NaN in warmup).

use super::rolling::{per_column, returns, rolling_mean, rolling_std};
use super::{flag, single, FactorFault, FactorInputs, FactorOutputs, Transform};

/// Allow entries only while close is above its `period` SMA.
#[derive(Debug, Clone)]
pub struct TrendFilter {
    pub period: usize,
}

impl Transform for TrendFilter {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            let ma = rolling_mean(s, self.period);
            s.iter()
                .zip(&ma)
                .map(|(px, m)| flag(!px.is_nan() && !m.is_nan(), px > m))
                .collect()
        });
        Ok(single("mask", out))
    }
}

/// Allow entries only when volume is at least `min_ratio` × its rolling mean.
#[derive(Debug, Clone)]
pub struct VolumeFilter {
    pub lookback: usize,
    pub min_ratio: f64,
}

impl Transform for VolumeFilter {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let volume = inputs.get("volume")?;
        let out = per_column(volume, |s| {
            let avg = rolling_mean(s, self.lookback);
            s.iter()
                .zip(&avg)
                .map(|(v, a)| flag(!v.is_nan() && !a.is_nan(), *v >= self.min_ratio * a))
                .collect()
        });
        Ok(single("mask", out))
    }
}

/// Allow entries only while realized return volatility is at most `max_vol`.
#[derive(Debug, Clone)]
pub struct VolatilityFilter {
    pub lookback: usize,
    pub max_vol: f64,
}

impl Transform for VolatilityFilter {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            rolling_std(&returns(s), self.lookback)
                .into_iter()
                .map(|vol| flag(!vol.is_nan(), vol <= self.max_vol))
                .collect()
        });
        Ok(single("mask", out))
    }
}
