//! Outcome of one `mutate` call.

use serde::{Deserialize, Serialize};

use factorlab_core::{Diagnostic, FullHash, ReasonCode, Strategy};

use crate::operation::OpKey;
use crate::tier::Tier;

/// What happened to one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected { diagnostic: Diagnostic },
}

impl AttemptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Accepted => None,
            Self::Rejected { diagnostic } => Some(diagnostic.code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: usize,
    pub tier: Tier,
    pub op: OpKey,
    pub outcome: AttemptOutcome,
}

/// Result of a mutation request. Exhaustion is reported here, not raised.
#[derive(Debug, Clone)]
pub struct MutationResult {
    pub success: bool,
    /// The accepted mutant, present iff `success`.
    pub mutated: Option<Strategy>,
    /// Tier of the accepted mutant, or of the last attempt.
    pub tier_used: Option<Tier>,
    pub attempts: usize,
    /// Rejection diagnostics in attempt order, plus the terminal reason on failure.
    pub diagnostics: Vec<Diagnostic>,
    pub log: Vec<AttemptRecord>,
    pub parent_hash: FullHash,
    pub child_hash: Option<FullHash>,
}

impl MutationResult {
    pub(crate) fn failed(parent_hash: FullHash, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            success: false,
            mutated: None,
            tier_used: None,
            attempts: 0,
            diagnostics,
            log: Vec::new(),
            parent_hash,
            child_hash: None,
        }
    }

    /// Reason code of the terminal diagnostic, if the request failed.
    pub fn failure_reason(&self) -> Option<ReasonCode> {
        if self.success {
            return None;
        }
        self.diagnostics.last().map(|d| d.code)
    }

    /// Serializable summary without the mutant itself.
    pub fn summary(&self) -> MutationSummary {
        MutationSummary {
            success: self.success,
            tier_used: self.tier_used,
            attempts: self.attempts,
            diagnostics: self.diagnostics.clone(),
            log: self.log.clone(),
            parent_hash: self.parent_hash.clone(),
            child_hash: self.child_hash.clone(),
        }
    }
}

/// Plain-data view of a [`MutationResult`] for experiment logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationSummary {
    pub success: bool,
    pub tier_used: Option<Tier>,
    pub attempts: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub log: Vec<AttemptRecord>,
    pub parent_hash: FullHash,
    pub child_hash: Option<FullHash>,
}
