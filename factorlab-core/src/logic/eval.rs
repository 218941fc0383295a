//! Cell-wise evaluation over named matrices.

use crate::factor::rolling::{lag, per_column, rolling_max, rolling_mean, rolling_min, rolling_std};
use crate::factor::{FactorFault, FactorInputs};
use crate::matrix::Matrix;

use super::{ArithOp, Connective, Expr, Func};

fn truth(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v != 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Evaluate `expr` against the bound input slots. Identifiers name slots.
///
/// Boolean results are 1.0/0.0; any NaN operand yields NaN. A division whose
/// denominator is exactly zero with a defined numerator is a fault.
pub fn evaluate(expr: &Expr, inputs: &FactorInputs<'_>) -> Result<Matrix, FactorFault> {
    let shape = inputs.shape();
    match expr {
        Expr::Number(v) => Ok(Matrix::filled(shape, *v)),
        Expr::Ident(name) => Ok(inputs.get(name)?.clone()),
        Expr::Neg(e) => Ok(evaluate(e, inputs)?.map(|v| -v)),
        Expr::Not(e) => Ok(evaluate(e, inputs)?.map(|v| {
            let t = truth(v);
            if t.is_nan() {
                t
            } else {
                1.0 - t
            }
        })),
        Expr::Arith { op, lhs, rhs } => {
            let l = evaluate(lhs, inputs)?;
            let r = evaluate(rhs, inputs)?;
            if *op == ArithOp::Div {
                if let Some(idx) = l
                    .as_slice()
                    .iter()
                    .zip(r.as_slice())
                    .position(|(a, b)| !a.is_nan() && *b == 0.0)
                {
                    return Err(FactorFault::DivisionByZero {
                        row: idx / shape.cols,
                        col: idx % shape.cols,
                    });
                }
            }
            zip(&l, &r, |a, b| match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            })
        }
        Expr::Compare { op, lhs, rhs } => {
            let l = evaluate(lhs, inputs)?;
            let r = evaluate(rhs, inputs)?;
            zip(&l, &r, |a, b| {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else if op.apply(a, b) {
                    1.0
                } else {
                    0.0
                }
            })
        }
        Expr::Logical { op, lhs, rhs } => {
            let l = evaluate(lhs, inputs)?;
            let r = evaluate(rhs, inputs)?;
            zip(&l, &r, |a, b| {
                let (a, b) = (truth(a), truth(b));
                if a.is_nan() || b.is_nan() {
                    return f64::NAN;
                }
                let hit = match op {
                    Connective::And => a == 1.0 && b == 1.0,
                    Connective::Or => a == 1.0 || b == 1.0,
                };
                if hit {
                    1.0
                } else {
                    0.0
                }
            })
        }
        Expr::Call { func, arg, window } => {
            let series = evaluate(arg, inputs)?;
            let n = window.unwrap_or(1);
            Ok(match func {
                Func::Sma => per_column(&series, |s| rolling_mean(s, n)),
                Func::Max => per_column(&series, |s| rolling_max(s, n)),
                Func::Min => per_column(&series, |s| rolling_min(s, n)),
                Func::Std => per_column(&series, |s| rolling_std(s, n)),
                Func::Lag => per_column(&series, |s| lag(s, n)),
                Func::Abs => series.map(f64::abs),
            })
        }
    }
}

fn zip(l: &Matrix, r: &Matrix, f: impl Fn(f64, f64) -> f64) -> Result<Matrix, FactorFault> {
    l.zip_with(r, f)
        .ok_or_else(|| {
            FactorFault::Numeric(format!(
                "operand shapes differ: {} vs {}",
                l.shape(),
                r.shape()
            ))
        })
}
