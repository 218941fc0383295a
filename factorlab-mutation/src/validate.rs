//! Three-stage mutant validation.
//!
//! 1. **Syntax**: every expression source parses, and the factor's input
//!    slots are exactly the identifiers the expression reads.
//! 2. **Semantics**: the graph compiles and executes on a small smoke panel.
//! 3. **Ranges**: every parameter lies in its registered range, and the
//!    output is finite and shaped like the panel.
//!
//! The first failing stage rejects the mutant with its diagnostic.

use factorlab_core::logic;
use factorlab_core::{
    Diagnose, Diagnostic, FactorRegistry, Matrix, MatrixContainer, ReasonCode, Strategy,
};
use serde_json::json;

use crate::error::{MutationError, Stage};

/// Validates mutants against a fixed smoke container.
#[derive(Debug, Clone)]
pub struct Validator {
    smoke: MatrixContainer,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(factorlab_core::smoke::default_container())
    }
}

impl Validator {
    pub fn new(smoke: MatrixContainer) -> Self {
        Self { smoke }
    }

    pub fn smoke(&self) -> &MatrixContainer {
        &self.smoke
    }

    /// Run all three stages, returning the smoke output on success.
    pub fn validate(
        &self,
        strategy: &Strategy,
        registry: &FactorRegistry,
    ) -> Result<Matrix, MutationError> {
        self.check_syntax(strategy)?;
        let output = self.check_semantics(strategy)?;
        self.check_ranges(strategy, registry, &output)?;
        Ok(output)
    }

    pub fn check_syntax(&self, strategy: &Strategy) -> Result<(), MutationError> {
        for factor in strategy.factors() {
            let Some(source) = factor.logic() else {
                continue;
            };
            let expr = logic::parse(source).map_err(|e| {
                let diagnostic = e.diagnostic().with_factor(factor.id().clone());
                MutationError::rejected(Stage::Syntax, diagnostic)
            })?;

            let mut derived = expr.identifiers();
            let mut declared: Vec<String> = factor
                .input_bindings()
                .iter()
                .map(|(slot, _)| slot.clone())
                .collect();
            derived.sort();
            declared.sort();
            if derived != declared {
                let drift = MutationError::DeclarationDrift {
                    factor: factor.id().clone(),
                    declared,
                    derived,
                };
                return Err(MutationError::rejected(Stage::Syntax, drift.diagnostic()));
            }
        }
        Ok(())
    }

    pub fn check_semantics(&self, strategy: &Strategy) -> Result<Matrix, MutationError> {
        let pipeline = strategy
            .to_pipeline()
            .map_err(|e| MutationError::rejected(Stage::Semantics, e.diagnostic()))?;
        let mut container = self.smoke.clone();
        pipeline
            .execute(&mut container)
            .map_err(|e| MutationError::rejected(Stage::Semantics, e.diagnostic()))
    }

    pub fn check_ranges(
        &self,
        strategy: &Strategy,
        registry: &FactorRegistry,
        output: &Matrix,
    ) -> Result<(), MutationError> {
        for factor in strategy.factors() {
            let descriptor = registry
                .descriptor(factor.kind())
                .map_err(|e| MutationError::rejected(Stage::Ranges, e.diagnostic()))?;
            for spec in &descriptor.params {
                let value = factor.param(spec.name).unwrap_or(f64::NAN);
                if !spec.range.contains(value) {
                    let diagnostic = Diagnostic::new(
                        ReasonCode::ParameterOutOfRange,
                        format!("'{}' = {value} is outside {:?}", spec.name, spec.range),
                    )
                    .with_factor(factor.id().clone())
                    .with_context("param", json!(spec.name))
                    .with_context("value", json!(value));
                    return Err(MutationError::rejected(Stage::Ranges, diagnostic));
                }
            }
        }

        if output.has_infinite() {
            return Err(MutationError::rejected(
                Stage::Ranges,
                Diagnostic::new(
                    ReasonCode::NonFiniteOutput,
                    format!("output '{}' contains infinite values", strategy.output()),
                ),
            ));
        }
        let expected = self.smoke.shape();
        if output.shape() != expected {
            return Err(MutationError::rejected(
                Stage::Ranges,
                Diagnostic::new(
                    ReasonCode::ShapeMismatch,
                    format!("output '{}' has the wrong shape", strategy.output()),
                )
                .with_context("expected", json!([expected.rows, expected.cols]))
                .with_context("actual", json!([output.rows(), output.cols()])),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{momentum_trail, rule_position};
    use factorlab_core::{FactorId, FactorSpec, RemovalPolicy};

    fn stage_of(err: MutationError) -> (Stage, ReasonCode) {
        match err {
            MutationError::Rejected { stage, diagnostic } => (stage, diagnostic.code),
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[test]
    fn valid_strategy_passes_all_stages() {
        let registry = FactorRegistry::standard();
        let validator = Validator::default();
        for strategy in [momentum_trail(&registry), rule_position(&registry)] {
            let out = validator.validate(&strategy, &registry).unwrap();
            assert_eq!(out.shape(), validator.smoke().shape());
        }
    }

    #[test]
    fn missing_input_fails_semantics() {
        let registry = FactorRegistry::standard();
        let mut strategy = momentum_trail(&registry);
        strategy
            .remove_factor(
                &FactorId::new("momentum(lookback=20)"),
                RemovalPolicy::Cascade,
            )
            .unwrap();
        let err = Validator::default().validate(&strategy, &registry).unwrap_err();
        assert_eq!(stage_of(err), (Stage::Semantics, ReasonCode::OutputNotProduced));
    }

    #[test]
    fn raw_input_absent_from_smoke_fails_semantics() {
        let registry = FactorRegistry::standard();
        let mut strategy = Strategy::new("odd")
            .with_raw_inputs(["close", "open_interest"])
            .with_output("rule_signal");
        let rule = registry
            .build(&FactorSpec {
                logic: Some("open_interest > 0".into()),
                ..FactorSpec::new("rule")
            })
            .unwrap();
        strategy.add_factor(rule, &[]).unwrap();
        let err = Validator::default().validate(&strategy, &registry).unwrap_err();
        assert_eq!(stage_of(err).0, Stage::Semantics);
    }

    #[test]
    fn unregistered_kind_fails_ranges() {
        let registry = FactorRegistry::standard();
        let strategy = momentum_trail(&registry);
        let validator = Validator::default();
        let output = validator.check_semantics(&strategy).unwrap();
        let empty = FactorRegistry::new();
        let err = validator.check_ranges(&strategy, &empty, &output).unwrap_err();
        assert_eq!(stage_of(err), (Stage::Ranges, ReasonCode::UnknownFactor));
    }

    #[test]
    fn infinite_output_fails_ranges() {
        let registry = FactorRegistry::standard();
        let strategy = momentum_trail(&registry);
        let validator = Validator::default();
        let shape = validator.smoke().shape();
        let output = Matrix::filled(shape, f64::INFINITY);
        let err = validator.check_ranges(&strategy, &registry, &output).unwrap_err();
        assert_eq!(stage_of(err), (Stage::Ranges, ReasonCode::NonFiniteOutput));

        let short = Matrix::zeros(factorlab_core::Shape::new(shape.rows - 1, shape.cols));
        let err = validator.check_ranges(&strategy, &registry, &short).unwrap_err();
        assert_eq!(stage_of(err), (Stage::Ranges, ReasonCode::ShapeMismatch));
    }
}
