//! Strategy graph — an arena of factors plus id-based dependency edges.
//!
//! Factors live in one owned `Vec` in insertion order; edges name factor
//! ids, never references. A strategy moves through
//! `Building → Compiled → Executed`, and any structural edit drops it back
//! to `Building`.
//!
//! `compile` performs, in order:
//! 1. cycle detection by DFS over `depends_on` edges (fails with the cycle path)
//! 2. a stable topological sort (ties broken by insertion order)
//! 3. input availability: each factor's required inputs must be raw inputs
//!    or outputs of a factor earlier in the order
//! 4. the designated output must be produced by some factor

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::container::MatrixContainer;
use crate::factor::{is_simulation_state, Factor, FactorCategory, FactorId};
use crate::matrix::Matrix;
use crate::pipeline::{CompiledPipeline, PipelineError};

/// Raw market matrices a strategy expects unless told otherwise.
pub const DEFAULT_RAW_INPUTS: &[&str] = &["open", "high", "low", "close", "volume"];

/// Matrix handed to the backtest engine unless told otherwise.
pub const DEFAULT_OUTPUT: &str = "position";

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised while editing the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("factor '{0}' is already in the strategy")]
    DuplicateFactor(FactorId),
    #[error("factor '{factor}' depends on unknown factor '{dependency}'")]
    UnknownDependency {
        factor: FactorId,
        dependency: FactorId,
    },
    #[error("factor '{0}' is not in the strategy")]
    FactorNotFound(FactorId),
    #[error("removing '{factor}' would orphan {dependents:?}")]
    OrphanedDependents {
        factor: FactorId,
        dependents: Vec<FactorId>,
    },
}

/// Errors raised by `compile`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("dependency cycle: {}", render_cycle(.path))]
    Cycle { path: Vec<FactorId> },
    #[error(
        "factor '{factor}' is missing inputs {missing:?}; available at this point: {available:?}{}",
        simulation_note(.simulation_state)
    )]
    MissingInputs {
        factor: FactorId,
        missing: Vec<String>,
        available: Vec<String>,
        /// Missing names that only exist during backtest simulation.
        simulation_state: Vec<String>,
    },
    #[error("designated output '{output}' is never produced; available: {available:?}")]
    OutputNotProduced {
        output: String,
        available: Vec<String>,
    },
}

fn render_cycle(path: &[FactorId]) -> String {
    let mut parts: Vec<&str> = path.iter().map(FactorId::as_str).collect();
    if let Some(first) = path.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

fn simulation_note(names: &[String]) -> String {
    if names.is_empty() {
        String::new()
    } else {
        format!(" ({names:?} are simulation-time state and never exist at compile time)")
    }
}

// ─── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyState {
    Building,
    Compiled,
    Executed,
}

/// What to do with dependents when removing a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Fail if any factor depends on the removed one.
    #[default]
    Reject,
    /// Remove every transitive dependent as well.
    Cascade,
}

#[derive(Debug, Clone)]
struct Node {
    factor: Factor,
    depends_on: Vec<FactorId>,
}

// ─── Strategy ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Strategy {
    name: String,
    raw_inputs: Vec<String>,
    output: String,
    nodes: Vec<Node>,
    state: StrategyState,
}

impl Strategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_inputs: DEFAULT_RAW_INPUTS.iter().map(|s| s.to_string()).collect(),
            output: DEFAULT_OUTPUT.to_string(),
            nodes: Vec::new(),
            state: StrategyState::Building,
        }
    }

    pub fn with_raw_inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_inputs = names.into_iter().map(Into::into).collect();
        self.state = StrategyState::Building;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self.state = StrategyState::Building;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_inputs(&self) -> &[String] {
        &self.raw_inputs
    }

    /// Designated output matrix name.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Factors in insertion order.
    pub fn factors(&self) -> impl Iterator<Item = &Factor> {
        self.nodes.iter().map(|n| &n.factor)
    }

    pub fn factor_ids(&self) -> Vec<FactorId> {
        self.nodes.iter().map(|n| n.factor.id().clone()).collect()
    }

    pub fn factor(&self, id: &FactorId) -> Option<&Factor> {
        self.position(id).map(|i| &self.nodes[i].factor)
    }

    pub fn contains(&self, id: &FactorId) -> bool {
        self.position(id).is_some()
    }

    pub fn factors_in(&self, category: FactorCategory) -> Vec<&Factor> {
        self.factors().filter(|f| f.category() == category).collect()
    }

    pub fn depends_on(&self, id: &FactorId) -> Option<&[FactorId]> {
        self.position(id).map(|i| self.nodes[i].depends_on.as_slice())
    }

    /// Factors that list `id` as a direct dependency, in insertion order.
    pub fn dependents(&self, id: &FactorId) -> Vec<FactorId> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.contains(id))
            .map(|n| n.factor.id().clone())
            .collect()
    }

    /// All `(factor, dependency)` edges, in insertion order.
    pub fn edges(&self) -> Vec<(FactorId, FactorId)> {
        self.nodes
            .iter()
            .flat_map(|n| {
                n.depends_on
                    .iter()
                    .map(move |d| (n.factor.id().clone(), d.clone()))
            })
            .collect()
    }

    /// The factor whose outputs include `matrix`, last writer wins.
    pub fn producer_of(&self, matrix: &str) -> Option<&Factor> {
        self.factors()
            .filter(|f| f.output_bindings().iter().any(|(_, m)| m == matrix))
            .last()
    }

    fn position(&self, id: &FactorId) -> Option<usize> {
        self.nodes.iter().position(|n| n.factor.id() == id)
    }

    fn touch(&mut self) {
        self.state = StrategyState::Building;
    }

    // ─── Editing ─────────────────────────────────────────────────────

    /// Append `factor`, depending on the already-present `depends_on`.
    pub fn add_factor(
        &mut self,
        factor: Factor,
        depends_on: &[FactorId],
    ) -> Result<(), GraphError> {
        if self.contains(factor.id()) {
            return Err(GraphError::DuplicateFactor(factor.id().clone()));
        }
        for dep in depends_on {
            if !self.contains(dep) {
                return Err(GraphError::UnknownDependency {
                    factor: factor.id().clone(),
                    dependency: dep.clone(),
                });
            }
        }
        let mut deps: Vec<FactorId> = Vec::with_capacity(depends_on.len());
        for dep in depends_on {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        self.nodes.push(Node {
            factor,
            depends_on: deps,
        });
        self.touch();
        Ok(())
    }

    /// Insert `factor` so that `before` depends on it.
    ///
    /// The new factor is placed ahead of `before` in the arena. The edit can
    /// introduce a cycle when `depends_on` reaches `before`; `compile`
    /// reports it.
    pub fn insert_before(
        &mut self,
        factor: Factor,
        depends_on: &[FactorId],
        before: &FactorId,
    ) -> Result<(), GraphError> {
        let at = self
            .position(before)
            .ok_or_else(|| GraphError::FactorNotFound(before.clone()))?;
        let id = factor.id().clone();
        self.add_factor(factor, depends_on)?;
        if let Some(node) = self.nodes.pop() {
            self.nodes.insert(at, node);
        }
        self.nodes[at + 1].depends_on.push(id);
        Ok(())
    }

    /// Add an edge `factor → dependency` between two present factors.
    pub fn add_dependency(
        &mut self,
        factor: &FactorId,
        dependency: &FactorId,
    ) -> Result<(), GraphError> {
        if !self.contains(dependency) {
            return Err(GraphError::UnknownDependency {
                factor: factor.clone(),
                dependency: dependency.clone(),
            });
        }
        let i = self
            .position(factor)
            .ok_or_else(|| GraphError::FactorNotFound(factor.clone()))?;
        if !self.nodes[i].depends_on.contains(dependency) {
            self.nodes[i].depends_on.push(dependency.clone());
            self.touch();
        }
        Ok(())
    }

    /// Drop the edge `factor → dependency`. Returns whether it existed.
    pub fn remove_dependency(
        &mut self,
        factor: &FactorId,
        dependency: &FactorId,
    ) -> Result<bool, GraphError> {
        let i = self
            .position(factor)
            .ok_or_else(|| GraphError::FactorNotFound(factor.clone()))?;
        let before = self.nodes[i].depends_on.len();
        self.nodes[i].depends_on.retain(|d| d != dependency);
        let removed = self.nodes[i].depends_on.len() != before;
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    /// Remove a factor. Returns the removed ids in removal order.
    pub fn remove_factor(
        &mut self,
        id: &FactorId,
        policy: RemovalPolicy,
    ) -> Result<Vec<FactorId>, GraphError> {
        if !self.contains(id) {
            return Err(GraphError::FactorNotFound(id.clone()));
        }
        let direct = self.dependents(id);
        let doomed = match policy {
            RemovalPolicy::Reject if !direct.is_empty() => {
                return Err(GraphError::OrphanedDependents {
                    factor: id.clone(),
                    dependents: direct,
                })
            }
            RemovalPolicy::Reject => vec![id.clone()],
            RemovalPolicy::Cascade => self.transitive_dependents(id),
        };

        let doomed_set: HashSet<&FactorId> = doomed.iter().collect();
        self.nodes.retain(|n| !doomed_set.contains(n.factor.id()));
        for node in &mut self.nodes {
            node.depends_on.retain(|d| !doomed_set.contains(d));
        }
        self.touch();
        debug!(factor = %id, removed = doomed.len(), ?policy, "removed factor");
        Ok(doomed)
    }

    /// `id` followed by everything that transitively depends on it, BFS order.
    fn transitive_dependents(&self, id: &FactorId) -> Vec<FactorId> {
        let mut out = vec![id.clone()];
        let mut cursor = 0;
        while cursor < out.len() {
            for dep in self.dependents(&out[cursor]) {
                if !out.contains(&dep) {
                    out.push(dep);
                }
            }
            cursor += 1;
        }
        out
    }

    /// Swap `old` for `replacement` in place, remapping every edge that
    /// named `old` to the replacement's id.
    pub fn replace_factor(
        &mut self,
        old: &FactorId,
        replacement: Factor,
    ) -> Result<(), GraphError> {
        let i = self
            .position(old)
            .ok_or_else(|| GraphError::FactorNotFound(old.clone()))?;
        let new_id = replacement.id().clone();
        if &new_id != old && self.contains(&new_id) {
            return Err(GraphError::DuplicateFactor(new_id));
        }
        self.nodes[i].factor = replacement;
        for node in &mut self.nodes {
            for dep in &mut node.depends_on {
                if dep == old {
                    *dep = new_id.clone();
                }
            }
        }
        self.touch();
        Ok(())
    }

    // ─── Compilation ─────────────────────────────────────────────────

    /// Validate the graph and produce an executable pipeline without
    /// changing state.
    pub fn to_pipeline(&self) -> Result<CompiledPipeline, CompileError> {
        if let Some(path) = self.find_cycle() {
            return Err(CompileError::Cycle { path });
        }
        let order = self.topological_order();

        let mut available: Vec<String> = Vec::new();
        for name in &self.raw_inputs {
            if !available.contains(name) {
                available.push(name.clone());
            }
        }
        for &i in &order {
            let factor = &self.nodes[i].factor;
            let missing: Vec<String> = factor
                .required_inputs()
                .into_iter()
                .filter(|name| !available.contains(name))
                .collect();
            if !missing.is_empty() {
                let simulation_state = missing
                    .iter()
                    .filter(|m| is_simulation_state(m))
                    .cloned()
                    .collect();
                return Err(CompileError::MissingInputs {
                    factor: factor.id().clone(),
                    missing,
                    available,
                    simulation_state,
                });
            }
            for name in factor.produced_outputs() {
                if !available.contains(&name) {
                    available.push(name);
                }
            }
        }

        if !available.contains(&self.output) {
            return Err(CompileError::OutputNotProduced {
                output: self.output.clone(),
                available,
            });
        }

        let factors: Vec<Factor> = order.iter().map(|&i| self.nodes[i].factor.clone()).collect();
        debug!(
            strategy = %self.name,
            order = ?factors.iter().map(|f| f.id().as_str()).collect::<Vec<_>>(),
            "compiled"
        );
        Ok(CompiledPipeline::new(
            factors,
            self.raw_inputs.clone(),
            self.output.clone(),
        ))
    }

    /// Compile and move to `Compiled`.
    pub fn compile(&mut self) -> Result<CompiledPipeline, CompileError> {
        let pipeline = self.to_pipeline()?;
        self.state = StrategyState::Compiled;
        Ok(pipeline)
    }

    /// Compile (if needed), run against `container`, and move to `Executed`.
    pub fn execute(&mut self, container: &mut MatrixContainer) -> Result<Matrix, PipelineError> {
        let pipeline = self.compile()?;
        let out = pipeline.execute(container)?;
        self.state = StrategyState::Executed;
        Ok(out)
    }

    /// DFS over `depends_on`; returns the ids along the first cycle found.
    fn find_cycle(&self) -> Option<Vec<FactorId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let index: HashMap<&FactorId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.factor.id(), i))
            .collect();
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack: Vec<usize> = Vec::new();

        fn visit(
            i: usize,
            nodes: &[Node],
            index: &HashMap<&FactorId, usize>,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[i] = Mark::OnStack;
            stack.push(i);
            for dep in &nodes[i].depends_on {
                let Some(&j) = index.get(dep) else { continue };
                match marks[j] {
                    Mark::OnStack => {
                        let start = stack.iter().position(|&k| k == j).unwrap_or(0);
                        return Some(stack[start..].to_vec());
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(j, nodes, index, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }
            stack.pop();
            marks[i] = Mark::Done;
            None
        }

        for i in 0..self.nodes.len() {
            if marks[i] == Mark::Unvisited {
                if let Some(cycle) = visit(i, &self.nodes, &index, &mut marks, &mut stack) {
                    return Some(
                        cycle
                            .into_iter()
                            .map(|k| self.nodes[k].factor.id().clone())
                            .collect(),
                    );
                }
            }
        }
        None
    }

    /// Kahn's algorithm; among ready factors the earliest inserted runs first.
    /// Assumes the graph is acyclic.
    fn topological_order(&self) -> Vec<usize> {
        let index: HashMap<&FactorId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.factor.id(), i))
            .collect();

        let mut pending = vec![0usize; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                if let Some(&j) = index.get(dep) {
                    pending[i] += 1;
                    dependents[j].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> =
            (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &k in &dependents[i] {
                pending[k] -= 1;
                if pending[k] == 0 {
                    ready.insert(k);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::Params;
    use crate::fingerprint::FactorSpec;
    use crate::registry::FactorRegistry;

    fn momentum(registry: &FactorRegistry) -> Factor {
        let mut p = Params::new();
        p.insert("lookback".into(), 20.0);
        registry.create_factor("momentum", &p).unwrap()
    }

    fn position_on(registry: &FactorRegistry, entry: &str) -> Factor {
        let mut spec = FactorSpec::new("position");
        spec.inputs.insert("entry".into(), entry.into());
        registry.build(&spec).unwrap()
    }

    fn rule(registry: &FactorRegistry, id: &str, source: &str) -> Factor {
        let mut spec = FactorSpec::new("rule");
        spec.id = Some(FactorId::new(id));
        spec.logic = Some(source.into());
        spec.outputs.insert("signal".into(), format!("{id}_out"));
        registry.build(&spec).unwrap()
    }

    #[test]
    fn remove_dependency_drops_only_that_edge() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t").with_output("b_out");
        let a = rule(&registry, "a", "close > 0");
        let b = rule(&registry, "b", "close > 1");
        s.add_factor(a, &[]).unwrap();
        s.add_factor(b, &[FactorId::new("a")]).unwrap();
        s.compile().unwrap();

        assert!(s.remove_dependency(&FactorId::new("b"), &FactorId::new("a")).unwrap());
        assert_eq!(s.state(), StrategyState::Building);
        assert!(s.edges().is_empty());
        assert!(!s.remove_dependency(&FactorId::new("b"), &FactorId::new("a")).unwrap());
        assert!(matches!(
            s.remove_dependency(&FactorId::new("ghost"), &FactorId::new("a")),
            Err(GraphError::FactorNotFound(_))
        ));
    }

    #[test]
    fn add_rejects_duplicates_and_unknown_dependencies() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        let m = momentum(&registry);
        s.add_factor(m.clone(), &[]).unwrap();
        assert_eq!(
            s.add_factor(m.clone(), &[]),
            Err(GraphError::DuplicateFactor(m.id().clone()))
        );
        let p = position_on(&registry, "momentum_signal");
        assert!(matches!(
            s.add_factor(p, &[FactorId::new("ghost")]),
            Err(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn compile_orders_dependencies_first() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        let m = momentum(&registry);
        let p = position_on(&registry, "momentum_signal");
        let p_id = p.id().clone();
        s.add_factor(p, &[]).unwrap();
        s.add_factor(m.clone(), &[]).unwrap();
        s.add_dependency(&p_id, m.id()).unwrap();

        let pipeline = s.compile().unwrap();
        assert_eq!(pipeline.order(), vec![m.id().clone(), p_id]);
        assert_eq!(s.state(), StrategyState::Compiled);
    }

    #[test]
    fn edits_reset_state_to_building() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        let m = momentum(&registry);
        s.add_factor(m.clone(), &[]).unwrap();
        s.add_factor(position_on(&registry, "momentum_signal"), &[m.id().clone()])
            .unwrap();
        s.compile().unwrap();
        s.add_factor(rule(&registry, "r", "close > 0"), &[]).unwrap();
        assert_eq!(s.state(), StrategyState::Building);
    }

    #[test]
    fn cycle_is_reported_in_dependency_order() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t").with_output("a_out");
        let a = rule(&registry, "a", "close > 0");
        let b = rule(&registry, "b", "close > 1");
        let c = rule(&registry, "c", "close > 2");
        s.add_factor(a.clone(), &[]).unwrap();
        s.add_factor(b.clone(), &[a.id().clone()]).unwrap();
        s.add_factor(c.clone(), &[b.id().clone()]).unwrap();
        s.add_dependency(a.id(), c.id()).unwrap();

        match s.compile() {
            Err(CompileError::Cycle { path }) => {
                assert_eq!(path, vec![a.id().clone(), c.id().clone(), b.id().clone()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn missing_inputs_name_simulation_state() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t")
            .with_raw_inputs(["close"])
            .with_output("exit_rule_out");
        let m = momentum(&registry);
        s.add_factor(m.clone(), &[]).unwrap();
        s.add_factor(
            rule(&registry, "exit_rule", "close < entry_price * 0.9 and positions > 0"),
            &[m.id().clone()],
        )
        .unwrap();

        match s.compile() {
            Err(CompileError::MissingInputs {
                missing,
                available,
                simulation_state,
                ..
            }) => {
                assert_eq!(missing, vec!["entry_price", "positions"]);
                assert_eq!(available, vec!["close", "momentum_signal"]);
                assert_eq!(simulation_state, missing);
            }
            other => panic!("expected missing inputs, got {other:?}"),
        }
    }

    #[test]
    fn output_must_be_produced() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        s.add_factor(momentum(&registry), &[]).unwrap();
        assert!(matches!(
            s.compile(),
            Err(CompileError::OutputNotProduced { .. })
        ));
    }

    #[test]
    fn remove_reject_and_cascade() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        let m = momentum(&registry);
        let p = position_on(&registry, "momentum_signal");
        s.add_factor(m.clone(), &[]).unwrap();
        s.add_factor(p.clone(), &[m.id().clone()]).unwrap();

        assert_eq!(
            s.remove_factor(m.id(), RemovalPolicy::Reject),
            Err(GraphError::OrphanedDependents {
                factor: m.id().clone(),
                dependents: vec![p.id().clone()],
            })
        );
        assert_eq!(s.len(), 2);

        let removed = s.remove_factor(m.id(), RemovalPolicy::Cascade).unwrap();
        assert_eq!(removed, vec![m.id().clone(), p.id().clone()]);
        assert!(s.is_empty());
    }

    #[test]
    fn replace_remaps_edges() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        let m = momentum(&registry);
        let p = position_on(&registry, "momentum_signal");
        s.add_factor(m.clone(), &[]).unwrap();
        s.add_factor(p.clone(), &[m.id().clone()]).unwrap();

        let mut spec = FactorSpec::new("roc_threshold");
        spec.outputs.insert("signal".into(), "momentum_signal".into());
        let roc = registry.build(&spec).unwrap();
        s.replace_factor(m.id(), roc.clone()).unwrap();

        assert_eq!(s.depends_on(p.id()), Some(&[roc.id().clone()][..]));
        assert!(!s.contains(m.id()));
        s.compile().unwrap();
    }

    #[test]
    fn insert_before_adds_edge_from_target() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        let m = momentum(&registry);
        s.add_factor(m.clone(), &[]).unwrap();
        let p = position_on(&registry, "momentum_signal");
        s.add_factor(p.clone(), &[m.id().clone()]).unwrap();

        let stop = registry.create_factor("stop_loss", &Params::new()).unwrap();
        s.insert_before(stop.clone(), &[], p.id()).unwrap();

        assert_eq!(s.factor_ids(), vec![m.id().clone(), stop.id().clone(), p.id().clone()]);
        assert_eq!(
            s.depends_on(p.id()),
            Some(&[m.id().clone(), stop.id().clone()][..])
        );
    }

    #[test]
    fn compile_is_idempotent() {
        let registry = FactorRegistry::standard();
        let mut s = Strategy::new("t");
        let m = momentum(&registry);
        s.add_factor(m.clone(), &[]).unwrap();
        s.add_factor(
            registry.create_factor("trailing_stop", &Params::new()).unwrap(),
            &[],
        )
        .unwrap();
        s.add_factor(position_on(&registry, "momentum_signal"), &[m.id().clone()])
            .unwrap();
        let first = s.compile().unwrap().order();
        let second = s.compile().unwrap().order();
        assert_eq!(first, second);
    }
}
