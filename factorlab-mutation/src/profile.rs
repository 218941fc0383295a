//! Strategy characteristics detected before each mutation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use factorlab_core::factor::ParamRange;
use factorlab_core::{FactorCategory, FactorId, FactorRegistry, Strategy};

/// Composite kind whose optional slots structural additions fill.
pub const POSITION_KIND: &str = "position";

/// Category that may be wired into each optional `position` slot.
pub const POSITION_SLOTS: [(&str, FactorCategory); 3] = [
    ("exit", FactorCategory::Exit),
    ("filter", FactorCategory::Filter),
    ("scale", FactorCategory::Risk),
];

/// Which exit families a strategy carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitProfile {
    /// Exit kinds present in the graph, sorted.
    pub present: Vec<String>,
    /// Registered exit kinds not present, sorted.
    pub missing: Vec<String>,
    /// Whether any exit feeds the output factor.
    pub wired: bool,
}

impl ExitProfile {
    pub fn is_missing(&self, kind: &str) -> bool {
        self.missing.iter().any(|k| k == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub factor_count: usize,
    pub by_category: BTreeMap<FactorCategory, usize>,
    /// Factors carrying an expression source.
    pub logic_factors: Vec<FactorId>,
    /// Parameters that admit more than one value.
    pub tunable_params: usize,
    /// The `position` factor producing the designated output, if any.
    pub output_factor: Option<FactorId>,
    /// Optional slots of the output factor with nothing bound.
    pub open_slots: Vec<String>,
    pub exits: ExitProfile,
}

impl StrategyProfile {
    pub fn detect(strategy: &Strategy, registry: &FactorRegistry) -> Self {
        let mut by_category = BTreeMap::new();
        let mut logic_factors = Vec::new();
        let mut tunable_params = 0;
        for factor in strategy.factors() {
            *by_category.entry(factor.category()).or_insert(0) += 1;
            if factor.logic().is_some() {
                logic_factors.push(factor.id().clone());
            }
            if let Ok(descriptor) = registry.descriptor(factor.kind()) {
                tunable_params += descriptor
                    .params
                    .iter()
                    .filter(|p| is_tunable(&p.range))
                    .count();
            }
        }

        let output = strategy
            .producer_of(strategy.output())
            .filter(|f| f.kind() == POSITION_KIND);
        let open_slots = output
            .map(|f| {
                POSITION_SLOTS
                    .iter()
                    .filter(|(slot, _)| f.input(slot).is_none())
                    .map(|(slot, _)| slot.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mut present: Vec<String> = strategy
            .factors_in(FactorCategory::Exit)
            .iter()
            .map(|f| f.kind().to_string())
            .collect();
        present.sort();
        present.dedup();
        let missing = registry
            .list_by_category(FactorCategory::Exit)
            .into_iter()
            .filter(|k| !present.iter().any(|p| p == k))
            .map(str::to_string)
            .collect();
        let wired = output.is_some_and(|f| f.input("exit").is_some());

        Self {
            factor_count: strategy.len(),
            by_category,
            logic_factors,
            tunable_params,
            output_factor: output.map(|f| f.id().clone()),
            open_slots,
            exits: ExitProfile {
                present,
                missing,
                wired,
            },
        }
    }

    pub fn count(&self, category: FactorCategory) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

pub(crate) fn is_tunable(range: &ParamRange) -> bool {
    match range {
        ParamRange::Continuous { min, max } | ParamRange::Integer { min, max } => max > min,
        ParamRange::Choice(values) => values.len() > 1,
    }
}
