//! Entry factors — directional intent matrices.
//!
//! Every entry factor writes a `signal` slot with +1.0 (long), -1.0 (short),
//! 0.0 (flat) or NaN during warmup.

use crate::matrix::Matrix;

use super::rolling::{lag, per_column, rolling_max, rolling_mean, rolling_min};
use super::{single, FactorFault, FactorInputs, FactorOutputs, Transform};

fn sign(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Time-series momentum: sign of `close[t] - close[t - lookback]`.
#[derive(Debug, Clone)]
pub struct Momentum {
    pub lookback: usize,
}

impl Transform for Momentum {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            let past = lag(s, self.lookback);
            s.iter().zip(&past).map(|(now, then)| sign(now - then)).collect()
        });
        Ok(single("signal", out))
    }
}

/// Moving-average crossover: long while the fast SMA is above the slow SMA.
#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub fast: usize,
    pub slow: usize,
}

impl Transform for MaCrossover {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            let fast = rolling_mean(s, self.fast);
            let slow = rolling_mean(s, self.slow);
            fast.iter().zip(&slow).map(|(f, s)| sign(f - s)).collect()
        });
        Ok(single("signal", out))
    }
}

/// Donchian channel breakout against the *previous* `lookback` bars.
///
/// Long when close exceeds the prior highest high, short when it falls
/// below the prior lowest low.
#[derive(Debug, Clone)]
pub struct DonchianBreakout {
    pub lookback: usize,
}

impl Transform for DonchianBreakout {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let high = inputs.get("high")?;
        let low = inputs.get("low")?;
        let shape = inputs.shape();

        let mut out = Matrix::nan(shape);
        for c in 0..shape.cols {
            let close = price.column(c);
            let upper = lag(&rolling_max(&high.column(c), self.lookback), 1);
            let lower = lag(&rolling_min(&low.column(c), self.lookback), 1);
            for r in 0..shape.rows {
                let (px, up, lo) = (close[r], upper[r], lower[r]);
                if px.is_nan() || up.is_nan() || lo.is_nan() {
                    continue;
                }
                let v = if px > up {
                    1.0
                } else if px < lo {
                    -1.0
                } else {
                    0.0
                };
                out.set(r, c, v);
            }
        }
        Ok(single("signal", out))
    }
}

/// Rate-of-change threshold: long above `+threshold_pct`, short below `-threshold_pct`.
#[derive(Debug, Clone)]
pub struct RocThreshold {
    pub period: usize,
    pub threshold_pct: f64,
}

impl Transform for RocThreshold {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let price = inputs.get("price")?;
        let out = per_column(price, |s| {
            let past = lag(s, self.period);
            s.iter()
                .zip(&past)
                .map(|(now, then)| {
                    if now.is_nan() || then.is_nan() || *then == 0.0 {
                        return f64::NAN;
                    }
                    let roc = (now / then - 1.0) * 100.0;
                    if roc > self.threshold_pct {
                        1.0
                    } else if roc < -self.threshold_pct {
                        -1.0
                    } else {
                        0.0
                    }
                })
                .collect()
        });
        Ok(single("signal", out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Shape;

    fn column_matrix(values: &[f64]) -> Matrix {
        Matrix::from_fn(Shape::new(values.len(), 1), |r, _| values[r])
    }

    fn run(t: &dyn Transform, slots: &[(&'static str, &Matrix)]) -> Matrix {
        let mut inputs = FactorInputs::new(slots[0].1.shape());
        for (slot, m) in slots {
            inputs.insert(slot, m);
        }
        t.compute(&inputs).unwrap().remove("signal").unwrap()
    }

    #[test]
    fn momentum_follows_direction() {
        let up: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let m = column_matrix(&up);
        let out = run(&Momentum { lookback: 3 }, &[("price", &m)]);
        assert!(out.get(2, 0).is_nan());
        assert_eq!(out.get(3, 0), 1.0);
        assert_eq!(out.get(9, 0), 1.0);
    }

    #[test]
    fn ma_crossover_detects_downtrend() {
        let down: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let m = column_matrix(&down);
        let out = run(&MaCrossover { fast: 3, slow: 10 }, &[("price", &m)]);
        assert!(out.get(8, 0).is_nan());
        assert_eq!(out.get(29, 0), -1.0);
    }

    #[test]
    fn donchian_breakout_uses_prior_window() {
        let mut close = vec![100.0; 12];
        close[11] = 120.0;
        let c = column_matrix(&close);
        let high = c.map(|v| v + 1.0);
        let low = c.map(|v| v - 1.0);
        let out = run(
            &DonchianBreakout { lookback: 5 },
            &[("price", &c), ("high", &high), ("low", &low)],
        );
        assert_eq!(out.get(10, 0), 0.0);
        assert_eq!(out.get(11, 0), 1.0);
    }

    #[test]
    fn roc_threshold_has_dead_zone() {
        let close = [100.0, 100.5, 103.0, 101.0];
        let m = column_matrix(&close);
        let out = run(
            &RocThreshold {
                period: 1,
                threshold_pct: 1.0,
            },
            &[("price", &m)],
        );
        assert_eq!(out.get(1, 0), 0.0);
        assert_eq!(out.get(2, 0), 1.0);
        assert_eq!(out.get(3, 0), -1.0);
    }
}
