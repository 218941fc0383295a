//! Rolling-window kernels over a single time series.
//!
//! Every kernel returns a series of the same length as its input. The first
//! `window - 1` values (the warmup) are `f64::NAN`, and any window containing
//! a NaN yields NaN. No value at index t depends on data after t.

use crate::matrix::Matrix;

fn windowed(series: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let n = series.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let slice = &series[(i + 1 - window)..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = f(slice);
    }
    out
}

pub fn rolling_mean(series: &[f64], window: usize) -> Vec<f64> {
    windowed(series, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

pub fn rolling_max(series: &[f64], window: usize) -> Vec<f64> {
    windowed(series, window, |w| w.iter().copied().fold(f64::MIN, f64::max))
}

pub fn rolling_min(series: &[f64], window: usize) -> Vec<f64> {
    windowed(series, window, |w| w.iter().copied().fold(f64::MAX, f64::min))
}

/// Sample standard deviation (n - 1 denominator). A window of 1 yields 0.0.
pub fn rolling_std(series: &[f64], window: usize) -> Vec<f64> {
    windowed(series, window, |w| {
        if w.len() < 2 {
            return 0.0;
        }
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (w.len() - 1) as f64;
        var.sqrt()
    })
}

/// Value `periods` bars ago.
pub fn lag(series: &[f64], periods: usize) -> Vec<f64> {
    let n = series.len();
    let mut out = vec![f64::NAN; n];
    for i in periods..n {
        out[i] = series[i - periods];
    }
    out
}

/// Simple returns: `x[t] / x[t-1] - 1`.
pub fn returns(series: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; series.len()];
    for i in 1..series.len() {
        let prev = series[i - 1];
        if prev != 0.0 {
            out[i] = series[i] / prev - 1.0;
        }
    }
    out
}

/// Apply a series kernel to every column of a matrix.
pub fn per_column(matrix: &Matrix, f: impl Fn(&[f64]) -> Vec<f64>) -> Matrix {
    let shape = matrix.shape();
    let mut out = Matrix::nan(shape);
    for c in 0..shape.cols {
        let column = matrix.column(c);
        for (r, v) in f(&column).into_iter().enumerate() {
            out.set(r, c, v);
        }
    }
    out
}
