//! Exit factors — stateless approximations of position-dependent exits.
//!
//! A true trailing stop tracks the highest price *since entry*, and a true
//! profit target measures gain *from the entry price*. Both depend on
//! simulation state that does not exist when the graph executes. These
//! factors approximate that state with bounded rolling windows over price:
//!
//! | exit          | simulation-time reference | approximation                 |
//! |---------------|---------------------------|-------------------------------|
//! | trailing stop | highest close since entry | rolling max over `lookback`   |
//! | profit target | entry price               | rolling min over `lookback`   |
//! | stop loss     | entry price               | close `lookback` bars ago     |
//!
//! Each writes an `exit` slot: 1.0 where the exit condition holds, 0.0
//! otherwise, NaN during warmup.

use super::rolling::{lag, per_column, rolling_max, rolling_min};
use super::{flag, single, FactorFault, FactorInputs, FactorOutputs, Transform};

/// Exit when close falls `trail_pct` below the rolling `lookback` high.
#[derive(Debug, Clone)]
pub struct TrailingStop {
    pub trail_pct: f64,
    pub lookback: usize,
}

impl Transform for TrailingStop {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            let peak = rolling_max(s, self.lookback);
            s.iter()
                .zip(&peak)
                .map(|(px, hi)| {
                    let defined = !px.is_nan() && !hi.is_nan();
                    flag(defined, *px <= hi * (1.0 - self.trail_pct))
                })
                .collect()
        });
        Ok(single("exit", out))
    }
}

/// Exit when close rises `target_pct` above the rolling `lookback` low.
#[derive(Debug, Clone)]
pub struct ProfitTarget {
    pub target_pct: f64,
    pub lookback: usize,
}

impl Transform for ProfitTarget {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            let trough = rolling_min(s, self.lookback);
            s.iter()
                .zip(&trough)
                .map(|(px, lo)| {
                    let defined = !px.is_nan() && !lo.is_nan();
                    flag(defined, *px >= lo * (1.0 + self.target_pct))
                })
                .collect()
        });
        Ok(single("exit", out))
    }
}

/// Exit when close is `stop_pct` below the close `lookback` bars ago.
#[derive(Debug, Clone)]
pub struct StopLoss {
    pub stop_pct: f64,
    pub lookback: usize,
}

impl Transform for StopLoss {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            let reference = lag(s, self.lookback);
            s.iter()
                .zip(&reference)
                .map(|(px, entry)| {
                    let defined = !px.is_nan() && !entry.is_nan();
                    flag(defined, *px <= entry * (1.0 - self.stop_pct))
                })
                .collect()
        });
        Ok(single("exit", out))
    }
}
