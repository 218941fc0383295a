//! Factors — named, parameterized, stateless units of matrix computation.
//!
//! A factor reads named input matrices from a [`MatrixContainer`] and writes
//! named output matrices back. Inputs and outputs are declared through
//! *slots* bound to matrix names, so the same kind of factor can be wired to
//! different data.
//!
//! # Architecture invariant
//! Factors run at graph-compile time, before any backtest simulation. Their
//! inputs must be derivable from raw market data or other factors' outputs.
//! Simulation-time state (current position, entry price) is never a legal
//! input; exit logic that would want it is expressed as a rolling-window
//! approximation instead (see [`exit`]).

pub mod composite;
pub mod entry;
pub mod exit;
pub mod filter;
pub mod risk;
pub mod rolling;
pub mod rule;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::container::{ContainerError, MatrixContainer, Provenance};
use crate::matrix::{Matrix, Shape};

/// Parameter values by name. `BTreeMap` keeps hashing and ids deterministic.
pub type Params = BTreeMap<String, f64>;

/// Matrix names that only exist during backtest simulation.
///
/// They can never be produced before the simulation runs, so a factor that
/// requires one of them can never compile.
pub const SIMULATION_STATE_INPUTS: &[&str] = &[
    "positions",
    "current_position",
    "entry_price",
    "entry_bar",
    "bars_since_entry",
    "unrealized_pnl",
    "highest_since_entry",
    "lowest_since_entry",
];

pub fn is_simulation_state(name: &str) -> bool {
    SIMULATION_STATE_INPUTS.contains(&name)
}

// ─── Identity & category ─────────────────────────────────────────────

/// Stable factor identity within a strategy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorId(pub String);

impl FactorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from kind and instantiation parameters: `kind(a=1,b=0.5)`.
    pub fn derive(kind: &str, params: &Params) -> Self {
        if params.is_empty() {
            return Self(kind.to_string());
        }
        let rendered: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Self(format!("{kind}({})", rendered.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorCategory {
    /// Directional entry intent: +1 long, -1 short, 0 flat.
    Entry,
    /// Exit flags: 1 where an open position should be flattened.
    Exit,
    /// Entry gate: 1 where entries are allowed.
    Filter,
    /// Size multiplier in [0, 1].
    Risk,
    /// Combines other factors' outputs.
    Composite,
    /// Transform given by an expression source.
    Logic,
}

impl FactorCategory {
    pub const ALL: [FactorCategory; 6] = [
        Self::Entry,
        Self::Exit,
        Self::Filter,
        Self::Risk,
        Self::Composite,
        Self::Logic,
    ];
}

impl fmt::Display for FactorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Filter => "filter",
            Self::Risk => "risk",
            Self::Composite => "composite",
            Self::Logic => "logic",
        };
        f.write_str(s)
    }
}

// ─── Slots & parameter ranges ────────────────────────────────────────

/// A declared input or output port of a factor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub name: &'static str,
    /// Matrix name bound when the caller does not override it.
    pub default: Option<&'static str>,
    /// Optional inputs are only required when bound.
    pub optional: bool,
}

impl Slot {
    pub const fn required(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            default: Some(default),
            optional: false,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            default: None,
            optional: true,
        }
    }
}

/// Valid values for a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRange {
    Continuous { min: f64, max: f64 },
    /// Integral values in `[min, max]`.
    Integer { min: f64, max: f64 },
    /// One of an enumerated set of values.
    Choice(Vec<f64>),
}

impl ParamRange {
    /// Boundaries are inclusive.
    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Self::Continuous { min, max } => value >= *min && value <= *max,
            Self::Integer { min, max } => value >= *min && value <= *max && value.fract() == 0.0,
            Self::Choice(values) => values.iter().any(|v| *v == value),
        }
    }

    /// Nearest valid value.
    pub fn clamp(&self, value: f64) -> f64 {
        match self {
            Self::Continuous { min, max } => value.clamp(*min, *max),
            Self::Integer { min, max } => value.round().clamp(*min, *max),
            Self::Choice(values) => values
                .iter()
                .copied()
                .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
                .unwrap_or(value),
        }
    }
}

impl fmt::Display for ParamRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous { min, max } => write!(f, "[{min}, {max}]"),
            Self::Integer { min, max } => write!(f, "integer [{min}, {max}]"),
            Self::Choice(values) => write!(f, "one of {values:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
    pub range: ParamRange,
}

impl ParamSpec {
    pub fn continuous(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            default,
            range: ParamRange::Continuous { min, max },
        }
    }

    pub fn integer(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            default,
            range: ParamRange::Integer { min, max },
        }
    }

    pub fn choice(name: &'static str, default: f64, values: &[f64]) -> Self {
        Self {
            name,
            default,
            range: ParamRange::Choice(values.to_vec()),
        }
    }
}

// ─── Transform trait ─────────────────────────────────────────────────

/// Why a factor's transform failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactorFault {
    #[error("input slot '{0}' is not bound")]
    UnboundSlot(String),
    #[error("division by zero at row {row}, column {col}")]
    DivisionByZero { row: usize, col: usize },
    #[error("transform did not produce output slot '{0}'")]
    MissingOutput(String),
    #[error("numeric error: {0}")]
    Numeric(String),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Input matrices for one transform invocation, keyed by slot name.
pub struct FactorInputs<'a> {
    shape: Shape,
    slots: BTreeMap<&'a str, &'a Matrix>,
}

impl<'a> FactorInputs<'a> {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            slots: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, slot: &'a str, matrix: &'a Matrix) {
        self.slots.insert(slot, matrix);
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn get(&self, slot: &str) -> Result<&'a Matrix, FactorFault> {
        self.slots
            .get(slot)
            .copied()
            .ok_or_else(|| FactorFault::UnboundSlot(slot.to_string()))
    }

    /// Bound matrix for an optional slot, if any.
    pub fn optional(&self, slot: &str) -> Option<&'a Matrix> {
        self.slots.get(slot).copied()
    }
}

/// Output matrices keyed by slot name.
pub type FactorOutputs = BTreeMap<String, Matrix>;

/// Pure computation behind a factor.
///
/// Implementations must be deterministic: the same inputs always produce the
/// same outputs. The trait deliberately has no access to simulation state.
pub trait Transform: Send + Sync + fmt::Debug {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault>;
}

// ─── Execution error ─────────────────────────────────────────────────

/// Summary of one input matrix at the moment a factor failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub name: String,
    pub shape: Shape,
    pub nan_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl InputSnapshot {
    pub fn of(name: &str, matrix: &Matrix) -> Self {
        let range = matrix.finite_range();
        Self {
            name: name.to_string(),
            shape: matrix.shape(),
            nan_count: matrix.nan_count(),
            min: range.map(|r| r.0),
            max: range.map(|r| r.1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("factor '{factor_id}' failed: {cause}")]
pub struct ExecutionError {
    pub factor_id: FactorId,
    pub cause: FactorFault,
    pub inputs: Vec<InputSnapshot>,
}

// ─── Factor ──────────────────────────────────────────────────────────

/// An immutable, instantiated factor.
///
/// Only the [`FactorRegistry`](crate::registry::FactorRegistry) constructs
/// factors, so every factor's parameters are known to be in range.
#[derive(Debug, Clone)]
pub struct Factor {
    id: FactorId,
    kind: String,
    category: FactorCategory,
    params: Params,
    /// Slot → matrix name, in declaration order.
    inputs: Vec<(String, String)>,
    outputs: Vec<(String, String)>,
    logic: Option<String>,
    transform: Arc<dyn Transform>,
}

impl Factor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: FactorId,
        kind: String,
        category: FactorCategory,
        params: Params,
        inputs: Vec<(String, String)>,
        outputs: Vec<(String, String)>,
        logic: Option<String>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            id,
            kind,
            category,
            params,
            inputs,
            outputs,
            logic,
            transform,
        }
    }

    pub fn id(&self) -> &FactorId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn category(&self) -> FactorCategory {
        self.category
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }

    /// Expression source for logic factors.
    pub fn logic(&self) -> Option<&str> {
        self.logic.as_deref()
    }

    /// Bound input slots as `(slot, matrix)` pairs.
    pub fn input_bindings(&self) -> &[(String, String)] {
        &self.inputs
    }

    pub fn output_bindings(&self) -> &[(String, String)] {
        &self.outputs
    }

    /// Matrix bound to an input slot.
    pub fn input(&self, slot: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(s, _)| s == slot)
            .map(|(_, m)| m.as_str())
    }

    /// Matrix bound to an output slot.
    pub fn output(&self, slot: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(s, _)| s == slot)
            .map(|(_, m)| m.as_str())
    }

    /// Matrix names this factor reads, in declaration order, deduplicated.
    pub fn required_inputs(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.inputs.len());
        for (_, m) in &self.inputs {
            if !names.contains(m) {
                names.push(m.clone());
            }
        }
        names
    }

    /// Matrix names this factor writes, in declaration order.
    pub fn produced_outputs(&self) -> Vec<String> {
        self.outputs.iter().map(|(_, m)| m.clone()).collect()
    }

    /// Run the transform against the container and write its outputs.
    pub fn execute(&self, container: &mut MatrixContainer) -> Result<(), ExecutionError> {
        let mut produced = {
            let mut inputs = FactorInputs::new(container.shape());
            for (slot, name) in &self.inputs {
                let matrix = container
                    .get(name)
                    .map_err(|e| self.fail(FactorFault::Container(e), container))?;
                inputs.insert(slot.as_str(), matrix);
            }
            self.transform
                .compute(&inputs)
                .map_err(|fault| self.fail(fault, container))?
        };

        for (slot, name) in &self.outputs {
            let matrix = produced
                .remove(slot)
                .ok_or_else(|| self.fail(FactorFault::MissingOutput(slot.clone()), container))?;
            container
                .add(name.clone(), matrix, Provenance::Factor(self.id.clone()))
                .map_err(|e| self.fail(FactorFault::Container(e), container))?;
        }
        Ok(())
    }

    fn fail(&self, cause: FactorFault, container: &MatrixContainer) -> ExecutionError {
        let inputs = self
            .inputs
            .iter()
            .filter_map(|(_, name)| {
                container
                    .get(name)
                    .ok()
                    .map(|m| InputSnapshot::of(name, m))
            })
            .collect();
        ExecutionError {
            factor_id: self.id.clone(),
            cause,
            inputs,
        }
    }
}

// ─── Shared helpers for concrete factors ─────────────────────────────

/// Convert a boolean condition into a 1.0/0.0 cell, NaN-propagating.
pub(crate) fn flag(defined: bool, condition: bool) -> f64 {
    if !defined {
        f64::NAN
    } else if condition {
        1.0
    } else {
        0.0
    }
}

/// Single-output helper.
pub(crate) fn single(slot: &str, matrix: Matrix) -> FactorOutputs {
    let mut out = FactorOutputs::new();
    out.insert(slot.to_string(), matrix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_id_derivation_is_deterministic() {
        let mut p = Params::new();
        p.insert("lookback".into(), 20.0);
        p.insert("trail_pct".into(), 0.1);
        assert_eq!(
            FactorId::derive("trailing_stop", &p).as_str(),
            "trailing_stop(lookback=20,trail_pct=0.1)"
        );
        assert_eq!(FactorId::derive("position", &Params::new()).as_str(), "position");
    }

    #[test]
    fn param_range_boundaries_are_inclusive() {
        let r = ParamRange::Continuous { min: 0.01, max: 0.5 };
        assert!(r.contains(0.01));
        assert!(r.contains(0.5));
        assert!(!r.contains(0.5000001));
        assert!(!r.contains(f64::NAN));

        let i = ParamRange::Integer { min: 2.0, max: 10.0 };
        assert!(i.contains(2.0) && i.contains(10.0));
        assert!(!i.contains(2.5));

        let c = ParamRange::Choice(vec![0.0, 1.0, 2.0]);
        assert!(c.contains(1.0));
        assert!(!c.contains(1.5));
    }

    #[test]
    fn param_range_clamp() {
        assert_eq!(ParamRange::Integer { min: 2.0, max: 10.0 }.clamp(11.6), 10.0);
        assert_eq!(ParamRange::Integer { min: 2.0, max: 10.0 }.clamp(4.4), 4.0);
        assert_eq!(ParamRange::Choice(vec![0.0, 1.0, 2.0]).clamp(1.6), 2.0);
        assert_eq!(ParamRange::Continuous { min: 0.0, max: 1.0 }.clamp(-3.0), 0.0);
    }

    #[test]
    fn simulation_state_names() {
        assert!(is_simulation_state("entry_price"));
        assert!(is_simulation_state("positions"));
        assert!(!is_simulation_state("close"));
        assert!(!is_simulation_state("position"));
    }
}
