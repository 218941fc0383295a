//! Compiled pipeline — an immutable, topologically ordered snapshot of a
//! strategy, ready to run against a container.

use thiserror::Error;
use tracing::{debug, trace};

use crate::container::{ContainerError, MatrixContainer};
use crate::factor::{ExecutionError, Factor, FactorId};
use crate::matrix::Matrix;
use crate::strategy::CompileError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("container lacks raw inputs {missing:?}")]
    MissingRawInputs { missing: Vec<String> },
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

#[derive(Debug, Clone)]
pub struct CompiledPipeline {
    factors: Vec<Factor>,
    raw_inputs: Vec<String>,
    output: String,
}

impl CompiledPipeline {
    pub(crate) fn new(factors: Vec<Factor>, raw_inputs: Vec<String>, output: String) -> Self {
        Self {
            factors,
            raw_inputs,
            output,
        }
    }

    /// Factor ids in execution order.
    pub fn order(&self) -> Vec<FactorId> {
        self.factors.iter().map(|f| f.id().clone()).collect()
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn raw_inputs(&self) -> &[String] {
        &self.raw_inputs
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Run every factor in order and return the designated output matrix.
    ///
    /// Raw inputs are checked up front, so a compiled pipeline never fails
    /// with a missing matrix halfway through.
    pub fn execute(&self, container: &mut MatrixContainer) -> Result<Matrix, PipelineError> {
        let missing: Vec<String> = self
            .raw_inputs
            .iter()
            .filter(|name| !container.contains(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingRawInputs { missing });
        }

        for factor in &self.factors {
            trace!(factor = %factor.id(), "executing");
            factor.execute(container)?;
        }
        debug!(factors = self.factors.len(), output = %self.output, "pipeline executed");
        Ok(container.get(&self.output)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Axes;
    use crate::fingerprint::FactorSpec;
    use crate::registry::FactorRegistry;
    use crate::smoke;
    use crate::strategy::Strategy;
    use chrono::NaiveDate;

    #[test]
    fn execute_requires_raw_inputs() {
        let registry = FactorRegistry::standard();
        let mut strategy = Strategy::new("t").with_output("momentum_signal");
        strategy
            .add_factor(
                registry.create_factor("momentum", &Default::default()).unwrap(),
                &[],
            )
            .unwrap();
        let pipeline = strategy.compile().unwrap();

        let axes = Axes::daily(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 10, 2);
        let mut empty = MatrixContainer::new(axes);
        match pipeline.execute(&mut empty) {
            Err(PipelineError::MissingRawInputs { missing }) => {
                assert_eq!(missing, vec!["open", "high", "low", "close", "volume"]);
            }
            other => panic!("expected missing raw inputs, got {other:?}"),
        }
    }

    #[test]
    fn execute_returns_designated_output() {
        let registry = FactorRegistry::standard();
        let mut strategy = Strategy::new("t");
        let momentum = registry.create_factor("momentum", &Default::default()).unwrap();
        let mut position = FactorSpec::new("position");
        position
            .inputs
            .insert("entry".into(), "momentum_signal".into());
        strategy.add_factor(momentum.clone(), &[]).unwrap();
        strategy
            .add_factor(registry.build(&position).unwrap(), &[momentum.id().clone()])
            .unwrap();

        let mut container = smoke::container(60, 3, 7);
        let out = strategy.execute(&mut container).unwrap();
        assert_eq!(out.shape(), container.shape());
        assert!(out.as_slice().iter().all(|v| v.is_finite() && v.abs() <= 1.0));
        assert!(container.contains("momentum_signal"));
    }

    #[test]
    fn execution_fault_names_factor() {
        let registry = FactorRegistry::standard();
        let mut strategy = Strategy::new("t").with_output("ratio");
        let mut spec = FactorSpec::new("rule");
        spec.id = Some(FactorId::new("ratio_rule"));
        spec.logic = Some("close / (close - close) > 1".into());
        spec.outputs.insert("signal".into(), "ratio".into());
        strategy.add_factor(registry.build(&spec).unwrap(), &[]).unwrap();

        let mut container = smoke::container(20, 2, 1);
        match strategy.execute(&mut container) {
            Err(PipelineError::Execution(e)) => {
                assert_eq!(e.factor_id.as_str(), "ratio_rule");
                assert_eq!(e.inputs.len(), 1);
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }
}
