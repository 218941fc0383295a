//! Dense time × entity matrix.
//!
//! Rows are the time index, columns are the entity index. Storage is
//! row-major `Vec<f64>`. Warmup and undefined cells are `f64::NAN`; boolean
//! matrices use `1.0` / `0.0`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a matrix: `(rows, cols)` = `(time, entities)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    shape: Shape,
    data: Vec<f64>,
}

impl Matrix {
    /// Matrix with every cell set to `value`.
    pub fn filled(shape: Shape, value: f64) -> Self {
        Self {
            shape,
            data: vec![value; shape.len()],
        }
    }

    pub fn nan(shape: Shape) -> Self {
        Self::filled(shape, f64::NAN)
    }

    pub fn zeros(shape: Shape) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Build from row-major data. Returns `None` if the length does not match.
    pub fn from_vec(shape: Shape, data: Vec<f64>) -> Option<Self> {
        (data.len() == shape.len()).then_some(Self { shape, data })
    }

    /// Build from a list of rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Some(Self {
            shape: Shape::new(rows.len(), cols),
            data,
        })
    }

    /// Build a matrix by evaluating `f(row, col)` for every cell.
    pub fn from_fn(shape: Shape, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(shape.len());
        for r in 0..shape.rows {
            for c in 0..shape.cols {
                data.push(f(r, c));
            }
        }
        Self { shape, data }
    }

    /// Build a matrix column by column: `f(col)` returns the full time series.
    ///
    /// Returns `None` if any column has the wrong length.
    pub fn from_columns(shape: Shape, mut f: impl FnMut(usize) -> Vec<f64>) -> Option<Self> {
        let mut m = Self::nan(shape);
        for c in 0..shape.cols {
            let series = f(c);
            if series.len() != shape.rows {
                return None;
            }
            for (r, v) in series.into_iter().enumerate() {
                m.set(r, c, v);
            }
        }
        Some(m)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape.rows
    }

    pub fn cols(&self) -> usize {
        self.shape.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.shape.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let cols = self.shape.cols;
        self.data[row * cols + col] = value;
    }

    /// Copy one entity's time series out of the matrix.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.shape.rows).map(|r| self.get(r, col)).collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Apply `f` to every cell.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two same-shape matrices cell by cell.
    ///
    /// Returns `None` on shape mismatch.
    pub fn zip_with(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Option<Self> {
        if self.shape != other.shape {
            return None;
        }
        Some(Self {
            shape: self.shape,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    pub fn nan_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    /// True if any cell is `+inf` or `-inf`.
    pub fn has_infinite(&self) -> bool {
        self.data.iter().any(|v| v.is_infinite())
    }

    /// `(min, max)` over non-NaN cells, or `None` if every cell is NaN.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_rejects_ragged_input() {
        assert!(Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_none());
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.shape(), Shape::new(2, 2));
        assert_eq!(m.get(1, 0), 3.0);
    }

    #[test]
    fn column_extracts_time_series() {
        let m = Matrix::from_fn(Shape::new(3, 2), |r, c| (r * 10 + c) as f64);
        assert_eq!(m.column(1), vec![1.0, 11.0, 21.0]);
    }

    #[test]
    fn zip_with_requires_same_shape() {
        let a = Matrix::zeros(Shape::new(2, 2));
        let b = Matrix::zeros(Shape::new(2, 3));
        assert!(a.zip_with(&b, |x, y| x + y).is_none());
        let c = a.zip_with(&a.map(|_| 1.0), |x, y| x + y).unwrap();
        assert_eq!(c.as_slice(), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn finite_range_skips_nan() {
        let m = Matrix::from_rows(&[vec![f64::NAN, 2.0], vec![-1.0, f64::NAN]]).unwrap();
        assert_eq!(m.finite_range(), Some((-1.0, 2.0)));
        assert_eq!(m.nan_count(), 2);
        assert_eq!(Matrix::nan(Shape::new(1, 1)).finite_range(), None);
    }

    #[test]
    fn from_columns_checks_length() {
        let shape = Shape::new(3, 2);
        assert!(Matrix::from_columns(shape, |_| vec![1.0; 2]).is_none());
        let m = Matrix::from_columns(shape, |c| vec![c as f64; 3]).unwrap();
        assert_eq!(m.get(2, 1), 1.0);
    }
}
