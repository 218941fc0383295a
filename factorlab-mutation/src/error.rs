//! Mutation error types.
//!
//! [`MutationError`] is a per-attempt failure: the mutant is discarded and the
//! loop retries. [`FatalMutationError`] is the only error that escapes
//! `mutate`, and only for broken invariants of the engine itself.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use factorlab_core::logic::LogicError;
use factorlab_core::{Diagnose, Diagnostic, FactorId, GraphError, ReasonCode, RegistryError};

use crate::config::ConfigError;

/// Validation stage that rejected a mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Expression sources parse and match their declared slots.
    Syntax,
    /// The graph compiles and executes on smoke data.
    Semantics,
    /// Parameters are in range and the output is finite.
    Ranges,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Syntax => "syntax",
            Self::Semantics => "semantics",
            Self::Ranges => "ranges",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Logic(#[from] LogicError),
    #[error("parameter '{param}' of '{factor}' cannot move from {value}")]
    Stuck {
        factor: FactorId,
        param: String,
        value: f64,
    },
    #[error("'{factor}' declares inputs {declared:?} but its expression reads {derived:?}")]
    DeclarationDrift {
        factor: FactorId,
        declared: Vec<String>,
        derived: Vec<String>,
    },
    #[error("{stage} validation failed: {diagnostic}")]
    Rejected { stage: Stage, diagnostic: Diagnostic },
}

impl MutationError {
    pub(crate) fn rejected(stage: Stage, diagnostic: Diagnostic) -> Self {
        Self::Rejected { stage, diagnostic }
    }
}

impl Diagnose for MutationError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::Registry(e) => e.reason(),
            Self::Graph(e) => e.reason(),
            Self::Logic(e) => e.reason(),
            Self::Stuck { .. } => ReasonCode::ParameterPinned,
            Self::DeclarationDrift { .. } => ReasonCode::DeclarationDrift,
            Self::Rejected { diagnostic, .. } => diagnostic.code,
        }
    }

    fn factor_id(&self) -> Option<FactorId> {
        match self {
            Self::Registry(e) => e.factor_id(),
            Self::Graph(e) => e.factor_id(),
            Self::Logic(_) => None,
            Self::Stuck { factor, .. } | Self::DeclarationDrift { factor, .. } => {
                Some(factor.clone())
            }
            Self::Rejected { diagnostic, .. } => diagnostic.factor_id.clone(),
        }
    }

    fn context(&self) -> BTreeMap<String, Value> {
        match self {
            Self::Registry(e) => e.context(),
            Self::Graph(e) => e.context(),
            Self::Logic(e) => e.context(),
            Self::Stuck { param, value, .. } => [
                ("param".to_string(), json!(param)),
                ("value".to_string(), json!(value)),
            ]
            .into_iter()
            .collect(),
            Self::DeclarationDrift {
                declared, derived, ..
            } => [
                ("declared".to_string(), json!(declared)),
                ("derived".to_string(), json!(derived)),
            ]
            .into_iter()
            .collect(),
            Self::Rejected { stage, diagnostic } => {
                let mut context = diagnostic.context.clone();
                context.insert("stage".into(), json!(stage));
                context
            }
        }
    }

    fn diagnostic(&self) -> Diagnostic {
        match self {
            // Keep the inner detail rather than the wrapped message.
            Self::Rejected { diagnostic, .. } => Diagnostic {
                context: self.context(),
                ..diagnostic.clone()
            },
            _ => Diagnostic {
                code: self.reason(),
                class: self.reason().class(),
                detail: self.to_string(),
                factor_id: self.factor_id(),
                context: self.context(),
            },
        }
    }
}

/// Errors that abort a `mutate` call instead of becoming a failed result.
#[derive(Debug, Error)]
pub enum FatalMutationError {
    #[error("factor registry is corrupt: {0}")]
    RegistryCorrupt(RegistryError),
    #[error("mutation invariant violated: {0}")]
    InvariantViolated(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Diagnose for FatalMutationError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::RegistryCorrupt(_) => ReasonCode::RegistryCorrupt,
            Self::InvariantViolated(_) => ReasonCode::InvalidState,
            Self::Config(_) => ReasonCode::InvalidSpec,
        }
    }
}
