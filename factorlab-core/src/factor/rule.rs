//! Logic factors — transform given by an expression over named matrices.
//!
//! Each identifier in the expression is an input slot of the same name, so
//! a rule's inputs are exactly the matrices its source mentions.

use crate::logic::{self, Expr, LogicError};

use super::{single, FactorFault, FactorInputs, FactorOutputs, Transform};

#[derive(Debug, Clone)]
pub struct Rule {
    expr: Expr,
}

impl Rule {
    pub fn parse(source: &str) -> Result<Self, LogicError> {
        Ok(Self {
            expr: logic::parse(source)?,
        })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Input slot names, in first-appearance order.
    pub fn slots(&self) -> Vec<String> {
        self.expr.identifiers()
    }
}

impl Transform for Rule {
    fn compute(&self, inputs: &FactorInputs<'_>) -> Result<FactorOutputs, FactorFault> {
        let out = logic::evaluate(&self.expr, inputs)?;
        Ok(single("signal", out))
    }
}
