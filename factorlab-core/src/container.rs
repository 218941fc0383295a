//! Matrix container — the shared, named store for one pipeline execution.
//!
//! All matrices in a container share the container's time/entity axes. Raw
//! market matrices are inserted before any factor runs; factors then append
//! their outputs. Writing under an existing name is an overwrite (recorded
//! in provenance), never a merge. There is no broadcasting or shape
//! coercion: a matrix of the wrong shape is rejected at the boundary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::factor::FactorId;
use crate::matrix::{Matrix, Shape};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContainerError {
    #[error("matrix '{name}' is not in the container (available: {available:?})")]
    MissingMatrix {
        name: String,
        available: Vec<String>,
    },
    #[error("matrix '{name}' has shape {actual}, container axes are {expected}")]
    ShapeMismatch {
        name: String,
        expected: Shape,
        actual: Shape,
    },
}

/// Time and entity axes shared by every matrix in a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub dates: Vec<NaiveDate>,
    pub entities: Vec<String>,
}

impl Axes {
    pub fn new(dates: Vec<NaiveDate>, entities: Vec<String>) -> Self {
        Self { dates, entities }
    }

    /// Consecutive calendar days starting at `start`, with entities named `e0..eN`.
    pub fn daily(start: NaiveDate, rows: usize, entities: usize) -> Self {
        Self {
            dates: (0..rows)
                .map(|i| start + chrono::Duration::days(i as i64))
                .collect(),
            entities: (0..entities).map(|i| format!("e{i}")).collect(),
        }
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.dates.len(), self.entities.len())
    }
}

/// Who wrote a matrix into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Pre-populated market input.
    Raw,
    /// Output of a factor during pipeline execution.
    Factor(FactorId),
}

#[derive(Debug, Clone)]
struct Entry {
    matrix: Matrix,
    provenance: Provenance,
    /// Number of times this name was overwritten.
    overwrites: usize,
}

#[derive(Debug, Clone)]
pub struct MatrixContainer {
    axes: Axes,
    entries: BTreeMap<String, Entry>,
    /// Insertion order of first writes, for deterministic listings.
    order: Vec<String>,
}

impl MatrixContainer {
    pub fn new(axes: Axes) -> Self {
        Self {
            axes,
            entries: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn shape(&self) -> Shape {
        self.axes.shape()
    }

    /// Insert a raw market matrix.
    pub fn add_raw(
        &mut self,
        name: impl Into<String>,
        matrix: Matrix,
    ) -> Result<(), ContainerError> {
        self.add(name, matrix, Provenance::Raw)
    }

    /// Insert (or overwrite) a named matrix, recording who produced it.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        matrix: Matrix,
        provenance: Provenance,
    ) -> Result<(), ContainerError> {
        let name = name.into();
        let expected = self.shape();
        if matrix.shape() != expected {
            return Err(ContainerError::ShapeMismatch {
                name,
                expected,
                actual: matrix.shape(),
            });
        }

        match self.entries.get_mut(&name) {
            Some(entry) => {
                tracing::warn!(
                    matrix = %name,
                    previous = ?entry.provenance,
                    now = ?provenance,
                    "overwriting matrix"
                );
                entry.matrix = matrix;
                entry.provenance = provenance;
                entry.overwrites += 1;
            }
            None => {
                self.order.push(name.clone());
                self.entries.insert(
                    name,
                    Entry {
                        matrix,
                        provenance,
                        overwrites: 0,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Matrix, ContainerError> {
        self.entries
            .get(name)
            .map(|e| &e.matrix)
            .ok_or_else(|| ContainerError::MissingMatrix {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Matrix names in first-write order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn provenance(&self, name: &str) -> Option<&Provenance> {
        self.entries.get(name).map(|e| &e.provenance)
    }

    pub fn overwrite_count(&self, name: &str) -> usize {
        self.entries.get(name).map_or(0, |e| e.overwrites)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(rows: usize, cols: usize) -> MatrixContainer {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        MatrixContainer::new(Axes::daily(start, rows, cols))
    }

    #[test]
    fn get_missing_lists_available() {
        let mut c = container(3, 2);
        c.add_raw("close", Matrix::zeros(Shape::new(3, 2))).unwrap();
        match c.get("volume") {
            Err(ContainerError::MissingMatrix { name, available }) => {
                assert_eq!(name, "volume");
                assert_eq!(available, vec!["close".to_string()]);
            }
            other => panic!("expected MissingMatrix, got {other:?}"),
        }
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut c = container(3, 2);
        let err = c.add_raw("close", Matrix::zeros(Shape::new(2, 2))).unwrap_err();
        assert!(matches!(err, ContainerError::ShapeMismatch { .. }));
        assert!(c.is_empty());
    }

    #[test]
    fn overwrite_replaces_and_records_provenance() {
        let mut c = container(1, 1);
        c.add_raw("x", Matrix::filled(Shape::new(1, 1), 1.0)).unwrap();
        c.add(
            "x",
            Matrix::filled(Shape::new(1, 1), 2.0),
            Provenance::Factor(FactorId::new("f")),
        )
        .unwrap();
        assert_eq!(c.get("x").unwrap().get(0, 0), 2.0);
        assert_eq!(c.provenance("x"), Some(&Provenance::Factor(FactorId::new("f"))));
        assert_eq!(c.overwrite_count("x"), 1);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn names_keep_first_write_order() {
        let mut c = container(1, 1);
        for name in ["volume", "close", "open"] {
            c.add_raw(name, Matrix::zeros(Shape::new(1, 1))).unwrap();
        }
        assert_eq!(c.names(), vec!["volume", "close", "open"]);
    }
}
