//! Structured diagnostics — stable reason codes for every failure.
//!
//! Errors stay rich Rust enums inside the crate. At the component boundary
//! each one is flattened into a [`Diagnostic`]: a stable `snake_case`
//! [`ReasonCode`], an [`ErrorClass`], human-readable detail and structured
//! context (missing vs. available matrix names, cycle paths, cell positions),
//! so upstream reporting can aggregate failures without parsing strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::container::ContainerError;
use crate::factor::{ExecutionError, FactorFault, FactorId};
use crate::fingerprint::SpecError;
use crate::logic::LogicError;
use crate::pipeline::PipelineError;
use crate::registry::RegistryError;
use crate::strategy::{CompileError, GraphError};

// ─── Codes & classes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The caller's input is wrong (unknown factor, out-of-range parameter).
    Configuration,
    /// The graph is wrong (cycle, missing input, orphaned dependent).
    Structural,
    /// A factor's transform failed on data.
    Execution,
    /// The mutation loop ran out of attempts or options.
    Exhausted,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Structural => "structural",
            Self::Execution => "execution",
            Self::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    // configuration
    UnknownFactor,
    UnknownParameter,
    ParameterOutOfRange,
    ConstraintViolation,
    UnknownSlot,
    MissingBinding,
    InvalidLogic,
    SyntaxError,
    DuplicateKind,
    RegistryCorrupt,
    InvalidSpec,
    ParameterPinned,
    // structural
    DuplicateFactor,
    UnknownDependency,
    FactorNotFound,
    OrphanedDependents,
    Cycle,
    MissingInputs,
    OutputNotProduced,
    DeclarationDrift,
    InvalidState,
    // execution
    MissingMatrix,
    ShapeMismatch,
    ExecutionFailed,
    DivisionByZero,
    NonFiniteOutput,
    // exhausted
    NoApplicableMutation,
    RetriesExhausted,
}

impl ReasonCode {
    pub fn class(self) -> ErrorClass {
        use ReasonCode::*;
        match self {
            UnknownFactor | UnknownParameter | ParameterOutOfRange | ConstraintViolation
            | UnknownSlot | MissingBinding | InvalidLogic | SyntaxError | DuplicateKind
            | RegistryCorrupt | InvalidSpec | ParameterPinned => ErrorClass::Configuration,
            DuplicateFactor | UnknownDependency | FactorNotFound | OrphanedDependents | Cycle
            | MissingInputs | OutputNotProduced | DeclarationDrift | InvalidState => {
                ErrorClass::Structural
            }
            MissingMatrix | ShapeMismatch | ExecutionFailed | DivisionByZero | NonFiniteOutput => {
                ErrorClass::Execution
            }
            NoApplicableMutation | RetriesExhausted => ErrorClass::Exhausted,
        }
    }

    /// The serialized form, e.g. `missing_inputs`.
    pub fn as_str(self) -> &'static str {
        use ReasonCode::*;
        match self {
            UnknownFactor => "unknown_factor",
            UnknownParameter => "unknown_parameter",
            ParameterOutOfRange => "parameter_out_of_range",
            ConstraintViolation => "constraint_violation",
            UnknownSlot => "unknown_slot",
            MissingBinding => "missing_binding",
            InvalidLogic => "invalid_logic",
            SyntaxError => "syntax_error",
            DuplicateKind => "duplicate_kind",
            RegistryCorrupt => "registry_corrupt",
            InvalidSpec => "invalid_spec",
            ParameterPinned => "parameter_pinned",
            DuplicateFactor => "duplicate_factor",
            UnknownDependency => "unknown_dependency",
            FactorNotFound => "factor_not_found",
            OrphanedDependents => "orphaned_dependents",
            Cycle => "cycle",
            MissingInputs => "missing_inputs",
            OutputNotProduced => "output_not_produced",
            DeclarationDrift => "declaration_drift",
            InvalidState => "invalid_state",
            MissingMatrix => "missing_matrix",
            ShapeMismatch => "shape_mismatch",
            ExecutionFailed => "execution_failed",
            DivisionByZero => "division_by_zero",
            NonFiniteOutput => "non_finite_output",
            NoApplicableMutation => "no_applicable_mutation",
            RetriesExhausted => "retries_exhausted",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Diagnostic ──────────────────────────────────────────────────────

/// Plain, serializable failure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: ReasonCode,
    pub class: ErrorClass,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor_id: Option<FactorId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

impl Diagnostic {
    pub fn new(code: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            class: code.class(),
            detail: detail.into(),
            factor_id: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_factor(mut self, id: FactorId) -> Self {
        self.factor_id = Some(id);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.factor_id {
            Some(id) => write!(f, "[{}] {}: {}", self.code, id, self.detail),
            None => write!(f, "[{}] {}", self.code, self.detail),
        }
    }
}

/// Maps an error onto its stable reason code and structured context.
pub trait Diagnose: std::error::Error {
    fn reason(&self) -> ReasonCode;

    fn factor_id(&self) -> Option<FactorId> {
        None
    }

    fn context(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    fn diagnostic(&self) -> Diagnostic {
        Diagnostic {
            code: self.reason(),
            class: self.reason().class(),
            detail: self.to_string(),
            factor_id: self.factor_id(),
            context: self.context(),
        }
    }
}

fn ctx<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

// ─── Mappings ────────────────────────────────────────────────────────

impl Diagnose for ContainerError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::MissingMatrix { .. } => ReasonCode::MissingMatrix,
            Self::ShapeMismatch { .. } => ReasonCode::ShapeMismatch,
        }
    }

    fn context(&self) -> BTreeMap<String, Value> {
        match self {
            Self::MissingMatrix { name, available } => {
                ctx([("missing", json!([name])), ("available", json!(available))])
            }
            Self::ShapeMismatch {
                name,
                expected,
                actual,
            } => ctx([
                ("matrix", json!(name)),
                ("expected", json!(expected.to_string())),
                ("actual", json!(actual.to_string())),
            ]),
        }
    }
}

impl Diagnose for LogicError {
    fn reason(&self) -> ReasonCode {
        ReasonCode::SyntaxError
    }
}

impl Diagnose for RegistryError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::UnknownFactor(_) => ReasonCode::UnknownFactor,
            Self::UnknownParameter { .. } => ReasonCode::UnknownParameter,
            Self::ParameterOutOfRange { .. } => ReasonCode::ParameterOutOfRange,
            Self::ConstraintViolation { .. } => ReasonCode::ConstraintViolation,
            Self::UnknownSlot { .. } => ReasonCode::UnknownSlot,
            Self::MissingBinding { .. } => ReasonCode::MissingBinding,
            Self::MissingLogic(_) | Self::UnexpectedLogic(_) => ReasonCode::InvalidLogic,
            Self::InvalidLogic { .. } => ReasonCode::SyntaxError,
            Self::DuplicateKind(_) => ReasonCode::DuplicateKind,
            Self::Corrupt { .. } => ReasonCode::RegistryCorrupt,
        }
    }

    fn context(&self) -> BTreeMap<String, Value> {
        match self {
            Self::UnknownFactor(kind) => ctx([("kind", json!(kind))]),
            Self::UnknownParameter { kind, param } => {
                ctx([("kind", json!(kind)), ("param", json!(param))])
            }
            Self::ParameterOutOfRange {
                kind,
                param,
                value,
                range,
            } => ctx([
                ("kind", json!(kind)),
                ("param", json!(param)),
                ("value", json!(value)),
                ("range", json!(range)),
            ]),
            Self::UnknownSlot { kind, slot } | Self::MissingBinding { kind, slot } => {
                ctx([("kind", json!(kind)), ("slot", json!(slot))])
            }
            _ => BTreeMap::new(),
        }
    }
}

impl Diagnose for GraphError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::DuplicateFactor(_) => ReasonCode::DuplicateFactor,
            Self::UnknownDependency { .. } => ReasonCode::UnknownDependency,
            Self::FactorNotFound(_) => ReasonCode::FactorNotFound,
            Self::OrphanedDependents { .. } => ReasonCode::OrphanedDependents,
        }
    }

    fn factor_id(&self) -> Option<FactorId> {
        match self {
            Self::DuplicateFactor(id) | Self::FactorNotFound(id) => Some(id.clone()),
            Self::UnknownDependency { factor, .. } | Self::OrphanedDependents { factor, .. } => {
                Some(factor.clone())
            }
        }
    }

    fn context(&self) -> BTreeMap<String, Value> {
        match self {
            Self::UnknownDependency { dependency, .. } => ctx([("dependency", json!(dependency))]),
            Self::OrphanedDependents { dependents, .. } => ctx([("dependents", json!(dependents))]),
            _ => BTreeMap::new(),
        }
    }
}

impl Diagnose for CompileError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::Cycle { .. } => ReasonCode::Cycle,
            Self::MissingInputs { .. } => ReasonCode::MissingInputs,
            Self::OutputNotProduced { .. } => ReasonCode::OutputNotProduced,
        }
    }

    fn factor_id(&self) -> Option<FactorId> {
        match self {
            Self::MissingInputs { factor, .. } => Some(factor.clone()),
            Self::Cycle { path } => path.first().cloned(),
            Self::OutputNotProduced { .. } => None,
        }
    }

    fn context(&self) -> BTreeMap<String, Value> {
        match self {
            Self::Cycle { path } => ctx([("cycle_path", json!(path))]),
            Self::MissingInputs {
                missing,
                available,
                simulation_state,
                ..
            } => ctx([
                ("missing", json!(missing)),
                ("available", json!(available)),
                ("simulation_state", json!(simulation_state)),
            ]),
            Self::OutputNotProduced { output, available } => {
                ctx([("output", json!(output)), ("available", json!(available))])
            }
        }
    }
}

impl Diagnose for ExecutionError {
    fn reason(&self) -> ReasonCode {
        match &self.cause {
            FactorFault::DivisionByZero { .. } => ReasonCode::DivisionByZero,
            FactorFault::Container(e) => e.reason(),
            FactorFault::UnboundSlot(_)
            | FactorFault::MissingOutput(_)
            | FactorFault::Numeric(_) => ReasonCode::ExecutionFailed,
        }
    }

    fn factor_id(&self) -> Option<FactorId> {
        Some(self.factor_id.clone())
    }

    fn context(&self) -> BTreeMap<String, Value> {
        let mut out = ctx([("inputs", json!(self.inputs))]);
        if let FactorFault::DivisionByZero { row, col } = self.cause {
            out.insert("cell".into(), json!([row, col]));
        }
        out
    }
}

impl Diagnose for PipelineError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::Compile(e) => e.reason(),
            Self::MissingRawInputs { .. } => ReasonCode::MissingMatrix,
            Self::Execution(e) => e.reason(),
            Self::Container(e) => e.reason(),
        }
    }

    fn factor_id(&self) -> Option<FactorId> {
        match self {
            Self::Compile(e) => e.factor_id(),
            Self::Execution(e) => e.factor_id(),
            _ => None,
        }
    }

    fn context(&self) -> BTreeMap<String, Value> {
        match self {
            Self::Compile(e) => e.context(),
            Self::MissingRawInputs { missing } => ctx([("missing", json!(missing))]),
            Self::Execution(e) => e.context(),
            Self::Container(e) => e.context(),
        }
    }
}

impl Diagnose for SpecError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::Factor { source, .. } => source.reason(),
            Self::Graph(e) => e.reason(),
            Self::Io { .. } | Self::Toml(_) | Self::TomlSerialize(_) | Self::Json(_) => {
                ReasonCode::InvalidSpec
            }
        }
    }

    fn context(&self) -> BTreeMap<String, Value> {
        match self {
            Self::Factor { index, source, .. } => {
                let mut out = source.context();
                out.insert("index".into(), json!(index));
                out
            }
            Self::Graph(e) => e.context(),
            _ => BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReasonCode::MissingInputs).unwrap(),
            "\"missing_inputs\""
        );
        assert_eq!(ReasonCode::NoApplicableMutation.as_str(), "no_applicable_mutation");
        let parsed: ReasonCode = serde_json::from_str("\"division_by_zero\"").unwrap();
        assert_eq!(parsed, ReasonCode::DivisionByZero);
    }

    #[test]
    fn as_str_matches_serde() {
        let all = [
            ReasonCode::UnknownFactor,
            ReasonCode::ParameterOutOfRange,
            ReasonCode::ParameterPinned,
            ReasonCode::Cycle,
            ReasonCode::OutputNotProduced,
            ReasonCode::NonFiniteOutput,
            ReasonCode::RetriesExhausted,
        ];
        for code in all {
            assert_eq!(
                serde_json::to_string(&code).unwrap(),
                format!("\"{}\"", code.as_str())
            );
        }
    }

    #[test]
    fn classes() {
        assert_eq!(ReasonCode::UnknownFactor.class(), ErrorClass::Configuration);
        assert_eq!(ReasonCode::ParameterPinned.class(), ErrorClass::Configuration);
        assert_eq!(ReasonCode::Cycle.class(), ErrorClass::Structural);
        assert_eq!(ReasonCode::DivisionByZero.class(), ErrorClass::Execution);
        assert_eq!(ReasonCode::RetriesExhausted.class(), ErrorClass::Exhausted);
    }

    #[test]
    fn missing_inputs_context_is_structured() {
        let err = CompileError::MissingInputs {
            factor: FactorId::new("exit_rule"),
            missing: vec!["positions".into(), "entry_price".into()],
            available: vec!["close".into(), "momentum_signal".into()],
            simulation_state: vec!["positions".into(), "entry_price".into()],
        };
        let d = err.diagnostic();
        assert_eq!(d.code, ReasonCode::MissingInputs);
        assert_eq!(d.class, ErrorClass::Structural);
        assert_eq!(d.factor_id, Some(FactorId::new("exit_rule")));
        assert_eq!(d.context["missing"], json!(["positions", "entry_price"]));
        assert_eq!(d.context["available"], json!(["close", "momentum_signal"]));

        let text = serde_json::to_string(&d).unwrap();
        let back: Diagnostic = serde_json::from_str(&text).unwrap();
        assert_eq!(back, d);
    }
}
