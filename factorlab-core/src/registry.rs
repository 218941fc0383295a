//! Factor registry — the only way to instantiate a [`Factor`].
//!
//! Maps a kind name to a [`FactorDescriptor`]: category, parameter specs with
//! defaults and valid ranges, input/output slots with default bindings, and a
//! builder. Every parameter is range-checked at construction, so an invalid
//! value is never discovered later during execution.
//!
//! The registry is a static catalog assembled at startup and shared read-only
//! afterwards. Kinds are stored in a `BTreeMap`, so registration order never
//! affects listings or behavior.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::factor::composite::{CombineMode, Position, SignalCombiner};
use crate::factor::entry::{DonchianBreakout, MaCrossover, Momentum, RocThreshold};
use crate::factor::exit::{ProfitTarget, StopLoss, TrailingStop};
use crate::factor::filter::{TrendFilter, VolatilityFilter, VolumeFilter};
use crate::factor::risk::{FixedFraction, VolatilityTarget};
use crate::factor::rule::Rule;
use crate::factor::{
    Factor, FactorCategory, FactorId, ParamRange, ParamSpec, Params, Slot, Transform,
};
use crate::fingerprint::FactorSpec;
use crate::logic::LogicError;

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown factor kind: {0}")]
    UnknownFactor(String),
    #[error("factor '{kind}' has no parameter '{param}'")]
    UnknownParameter { kind: String, param: String },
    #[error("parameter '{param}' of '{kind}' = {value} is outside {range}")]
    ParameterOutOfRange {
        kind: String,
        param: String,
        value: f64,
        range: ParamRange,
    },
    #[error("'{kind}' parameters violate a constraint: {detail}")]
    ConstraintViolation { kind: String, detail: String },
    #[error("factor '{kind}' has no slot '{slot}'")]
    UnknownSlot { kind: String, slot: String },
    #[error("required slot '{slot}' of '{kind}' has no binding")]
    MissingBinding { kind: String, slot: String },
    #[error("'{0}' is a logic factor and needs an expression source")]
    MissingLogic(String),
    #[error("'{0}' does not take an expression source")]
    UnexpectedLogic(String),
    #[error("invalid expression for '{kind}': {cause}")]
    InvalidLogic { kind: String, cause: LogicError },
    #[error("factor kind '{0}' is already registered")]
    DuplicateKind(String),
    #[error("registry self-check failed for '{kind}': {detail}")]
    Corrupt { kind: String, detail: String },
}

// ─── Descriptors ─────────────────────────────────────────────────────

type BuildFn = fn(&Params) -> Arc<dyn Transform>;
type ConstraintFn = fn(&Params) -> Result<(), String>;

/// How a kind's transform is constructed.
#[derive(Clone, Copy)]
pub enum Builder {
    /// From resolved parameters.
    Params(BuildFn),
    /// From an expression source; inputs are the expression's identifiers.
    Logic,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Params(_) => f.write_str("Builder::Params"),
            Self::Logic => f.write_str("Builder::Logic"),
        }
    }
}

/// Catalog entry for one factor kind.
#[derive(Debug, Clone)]
pub struct FactorDescriptor {
    pub kind: &'static str,
    pub category: FactorCategory,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub inputs: Vec<Slot>,
    pub outputs: Vec<Slot>,
    pub constraint: Option<ConstraintFn>,
    pub builder: Builder,
}

impl FactorDescriptor {
    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn input_slot(&self, name: &str) -> Option<&Slot> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn requires_logic(&self) -> bool {
        matches!(self.builder, Builder::Logic)
    }

    pub fn default_params(&self) -> Params {
        self.params
            .iter()
            .map(|p| (p.name.to_string(), p.default))
            .collect()
    }
}

// ─── Registry ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FactorRegistry {
    descriptors: BTreeMap<&'static str, FactorDescriptor>,
}

impl FactorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard factor catalog.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for descriptor in standard_catalog() {
            if let Err(err) = registry.register(descriptor) {
                tracing::error!(%err, "standard catalog entry rejected");
                debug_assert!(false, "standard catalog entry rejected: {err}");
            }
        }
        registry
    }

    pub fn register(&mut self, descriptor: FactorDescriptor) -> Result<(), RegistryError> {
        if self.descriptors.contains_key(descriptor.kind) {
            return Err(RegistryError::DuplicateKind(descriptor.kind.to_string()));
        }
        self.descriptors.insert(descriptor.kind, descriptor);
        Ok(())
    }

    pub fn descriptor(&self, kind: &str) -> Result<&FactorDescriptor, RegistryError> {
        self.descriptors
            .get(kind)
            .ok_or_else(|| RegistryError::UnknownFactor(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.descriptors.contains_key(kind)
    }

    /// All registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.descriptors.keys().copied().collect()
    }

    /// Kinds in `category`, sorted.
    pub fn list_by_category(&self, category: FactorCategory) -> Vec<&'static str> {
        self.descriptors
            .values()
            .filter(|d| d.category == category)
            .map(|d| d.kind)
            .collect()
    }

    /// Instantiate `kind` with `params`, default bindings and a derived id.
    pub fn create_factor(&self, kind: &str, params: &Params) -> Result<Factor, RegistryError> {
        self.build(&FactorSpec {
            kind: kind.to_string(),
            params: params.clone(),
            ..FactorSpec::default()
        })
    }

    /// Instantiate a factor from a full specification.
    pub fn build(&self, spec: &FactorSpec) -> Result<Factor, RegistryError> {
        let descriptor = self.descriptor(&spec.kind)?;
        let params = resolve_params(descriptor, &spec.params)?;

        let (transform, inputs, logic): (Arc<dyn Transform>, _, _) = match descriptor.builder {
            Builder::Params(build) => {
                if spec.logic.is_some() {
                    return Err(RegistryError::UnexpectedLogic(spec.kind.clone()));
                }
                let inputs = bind_inputs(descriptor, &spec.inputs)?;
                (build(&params), inputs, None)
            }
            Builder::Logic => {
                let source = spec
                    .logic
                    .as_deref()
                    .ok_or_else(|| RegistryError::MissingLogic(spec.kind.clone()))?;
                let rule = Rule::parse(source).map_err(|cause| RegistryError::InvalidLogic {
                    kind: spec.kind.clone(),
                    cause,
                })?;
                let inputs = bind_rule_inputs(descriptor, &rule.slots(), &spec.inputs)?;
                let canonical = rule.expr().to_string();
                (Arc::new(rule), inputs, Some(canonical))
            }
        };
        let outputs = bind_outputs(descriptor, &spec.outputs)?;

        let id = match (&spec.id, &logic) {
            (Some(id), _) => id.clone(),
            (None, Some(source)) => {
                let digest = blake3::hash(source.as_bytes()).to_hex();
                FactorId::new(format!("{}[{}]", descriptor.kind, &digest.as_str()[..8]))
            }
            (None, None) => FactorId::derive(descriptor.kind, &params),
        };

        Ok(Factor::new(
            id,
            descriptor.kind.to_string(),
            descriptor.category,
            params,
            inputs,
            outputs,
            logic,
            transform,
        ))
    }

    /// Rebuild `factor` with new parameter values, keeping its id and bindings.
    pub fn reparameterize(
        &self,
        factor: &Factor,
        params: &Params,
    ) -> Result<Factor, RegistryError> {
        let mut spec = FactorSpec::from_factor(factor, Vec::new());
        spec.params = params.clone();
        self.build(&spec)
    }

    /// Rebuild a logic factor with a new expression source, keeping its id
    /// and output bindings. Inputs are re-derived from the new source.
    pub fn with_logic(&self, factor: &Factor, source: &str) -> Result<Factor, RegistryError> {
        let mut spec = FactorSpec::from_factor(factor, Vec::new());
        spec.inputs.clear();
        spec.logic = Some(source.to_string());
        self.build(&spec)
    }

    /// Self-check: every default is in range and satisfies the kind's
    /// constraint, and every kind declares at least one output.
    pub fn verify(&self) -> Result<(), RegistryError> {
        for descriptor in self.descriptors.values() {
            let corrupt = |detail: String| RegistryError::Corrupt {
                kind: descriptor.kind.to_string(),
                detail,
            };
            if descriptor.outputs.is_empty() {
                return Err(corrupt("no output slots".into()));
            }
            for spec in &descriptor.params {
                if !spec.range.contains(spec.default) {
                    return Err(corrupt(format!(
                        "default {} = {} outside {}",
                        spec.name, spec.default, spec.range
                    )));
                }
            }
            if let Some(check) = descriptor.constraint {
                check(&descriptor.default_params()).map_err(corrupt)?;
            }
            for slot in descriptor.outputs.iter().chain(&descriptor.inputs) {
                if !slot.optional && slot.default.is_none() {
                    return Err(corrupt(format!("slot '{}' has no default binding", slot.name)));
                }
            }
        }
        Ok(())
    }
}

// ─── Resolution helpers ──────────────────────────────────────────────

fn resolve_params(descriptor: &FactorDescriptor, given: &Params) -> Result<Params, RegistryError> {
    for name in given.keys() {
        if descriptor.param_spec(name).is_none() {
            return Err(RegistryError::UnknownParameter {
                kind: descriptor.kind.to_string(),
                param: name.clone(),
            });
        }
    }

    let mut resolved = Params::new();
    for spec in &descriptor.params {
        let value = given.get(spec.name).copied().unwrap_or(spec.default);
        if !spec.range.contains(value) {
            return Err(RegistryError::ParameterOutOfRange {
                kind: descriptor.kind.to_string(),
                param: spec.name.to_string(),
                value,
                range: spec.range.clone(),
            });
        }
        resolved.insert(spec.name.to_string(), value);
    }

    if let Some(check) = descriptor.constraint {
        check(&resolved).map_err(|detail| RegistryError::ConstraintViolation {
            kind: descriptor.kind.to_string(),
            detail,
        })?;
    }
    Ok(resolved)
}

fn bind_inputs(
    descriptor: &FactorDescriptor,
    overrides: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, RegistryError> {
    for slot in overrides.keys() {
        if descriptor.input_slot(slot).is_none() {
            return Err(RegistryError::UnknownSlot {
                kind: descriptor.kind.to_string(),
                slot: slot.clone(),
            });
        }
    }
    bind(descriptor.kind, &descriptor.inputs, overrides)
}

fn bind_outputs(
    descriptor: &FactorDescriptor,
    overrides: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, RegistryError> {
    for slot in overrides.keys() {
        if !descriptor.outputs.iter().any(|s| s.name == slot) {
            return Err(RegistryError::UnknownSlot {
                kind: descriptor.kind.to_string(),
                slot: slot.clone(),
            });
        }
    }
    bind(descriptor.kind, &descriptor.outputs, overrides)
}

fn bind(
    kind: &str,
    slots: &[Slot],
    overrides: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, RegistryError> {
    let mut bound = Vec::with_capacity(slots.len());
    for slot in slots {
        let target = overrides
            .get(slot.name)
            .cloned()
            .or_else(|| slot.default.map(str::to_string));
        match target {
            Some(name) => bound.push((slot.name.to_string(), name)),
            None if slot.optional => {}
            None => {
                return Err(RegistryError::MissingBinding {
                    kind: kind.to_string(),
                    slot: slot.name.to_string(),
                })
            }
        }
    }
    Ok(bound)
}

/// Rule slots are the expression's identifiers, each bound to the matrix of
/// the same name unless overridden.
fn bind_rule_inputs(
    descriptor: &FactorDescriptor,
    identifiers: &[String],
    overrides: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, RegistryError> {
    for slot in overrides.keys() {
        if !identifiers.contains(slot) {
            return Err(RegistryError::UnknownSlot {
                kind: descriptor.kind.to_string(),
                slot: slot.clone(),
            });
        }
    }
    Ok(identifiers
        .iter()
        .map(|ident| {
            let target = overrides.get(ident).cloned().unwrap_or_else(|| ident.clone());
            (ident.clone(), target)
        })
        .collect())
}

// ─── Standard catalog ────────────────────────────────────────────────

fn int(params: &Params, name: &str) -> usize {
    params.get(name).copied().unwrap_or(0.0) as usize
}

fn num(params: &Params, name: &str) -> f64 {
    params.get(name).copied().unwrap_or(0.0)
}

const PRICE: Slot = Slot::required("price", "close");

fn standard_catalog() -> Vec<FactorDescriptor> {
    vec![
        // ── Entry ──
        FactorDescriptor {
            kind: "momentum",
            category: FactorCategory::Entry,
            description: "Sign of close minus close `lookback` bars ago",
            params: vec![ParamSpec::integer("lookback", 20.0, 2.0, 250.0)],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("signal", "momentum_signal")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(Momentum {
                    lookback: int(p, "lookback"),
                })
            }),
        },
        FactorDescriptor {
            kind: "ma_crossover",
            category: FactorCategory::Entry,
            description: "Long while the fast SMA is above the slow SMA",
            params: vec![
                ParamSpec::integer("fast", 10.0, 2.0, 100.0),
                ParamSpec::integer("slow", 50.0, 5.0, 400.0),
            ],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("signal", "ma_crossover_signal")],
            constraint: Some(|p| {
                if num(p, "fast") < num(p, "slow") {
                    Ok(())
                } else {
                    Err(format!(
                        "fast ({}) must be shorter than slow ({})",
                        num(p, "fast"),
                        num(p, "slow")
                    ))
                }
            }),
            builder: Builder::Params(|p| {
                Arc::new(MaCrossover {
                    fast: int(p, "fast"),
                    slow: int(p, "slow"),
                })
            }),
        },
        FactorDescriptor {
            kind: "donchian_breakout",
            category: FactorCategory::Entry,
            description: "Breakout of the prior `lookback`-bar high/low channel",
            params: vec![ParamSpec::integer("lookback", 20.0, 5.0, 250.0)],
            inputs: vec![
                PRICE,
                Slot::required("high", "high"),
                Slot::required("low", "low"),
            ],
            outputs: vec![Slot::required("signal", "donchian_breakout_signal")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(DonchianBreakout {
                    lookback: int(p, "lookback"),
                })
            }),
        },
        FactorDescriptor {
            kind: "roc_threshold",
            category: FactorCategory::Entry,
            description: "Rate of change beyond ±threshold_pct percent",
            params: vec![
                ParamSpec::integer("period", 12.0, 2.0, 120.0),
                ParamSpec::continuous("threshold_pct", 1.0, 0.0, 20.0),
            ],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("signal", "roc_threshold_signal")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(RocThreshold {
                    period: int(p, "period"),
                    threshold_pct: num(p, "threshold_pct"),
                })
            }),
        },
        // ── Exit ──
        FactorDescriptor {
            kind: "trailing_stop",
            category: FactorCategory::Exit,
            description: "Close below the rolling high by trail_pct (rolling-window approximation)",
            params: vec![
                ParamSpec::continuous("trail_pct", 0.1, 0.01, 0.5),
                ParamSpec::integer("lookback", 20.0, 2.0, 250.0),
            ],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("exit", "exit_signal")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(TrailingStop {
                    trail_pct: num(p, "trail_pct"),
                    lookback: int(p, "lookback"),
                })
            }),
        },
        FactorDescriptor {
            kind: "profit_target",
            category: FactorCategory::Exit,
            description: "Close above the rolling low by target_pct (rolling-window approximation)",
            params: vec![
                ParamSpec::continuous("target_pct", 0.2, 0.01, 1.0),
                ParamSpec::integer("lookback", 20.0, 2.0, 250.0),
            ],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("exit", "exit_signal")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(ProfitTarget {
                    target_pct: num(p, "target_pct"),
                    lookback: int(p, "lookback"),
                })
            }),
        },
        FactorDescriptor {
            kind: "stop_loss",
            category: FactorCategory::Exit,
            description: "Close below the lagged close by stop_pct (rolling-window approximation)",
            params: vec![
                ParamSpec::continuous("stop_pct", 0.05, 0.01, 0.5),
                ParamSpec::integer("lookback", 10.0, 1.0, 250.0),
            ],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("exit", "exit_signal")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(StopLoss {
                    stop_pct: num(p, "stop_pct"),
                    lookback: int(p, "lookback"),
                })
            }),
        },
        // ── Filter ──
        FactorDescriptor {
            kind: "trend_filter",
            category: FactorCategory::Filter,
            description: "Entries only above the `period` SMA",
            params: vec![ParamSpec::integer("period", 200.0, 5.0, 400.0)],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("mask", "trend_filter_mask")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(TrendFilter {
                    period: int(p, "period"),
                })
            }),
        },
        FactorDescriptor {
            kind: "volume_filter",
            category: FactorCategory::Filter,
            description: "Entries only on relative volume of at least min_ratio",
            params: vec![
                ParamSpec::integer("lookback", 20.0, 2.0, 250.0),
                ParamSpec::continuous("min_ratio", 1.0, 0.1, 5.0),
            ],
            inputs: vec![Slot::required("volume", "volume")],
            outputs: vec![Slot::required("mask", "volume_filter_mask")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(VolumeFilter {
                    lookback: int(p, "lookback"),
                    min_ratio: num(p, "min_ratio"),
                })
            }),
        },
        FactorDescriptor {
            kind: "volatility_filter",
            category: FactorCategory::Filter,
            description: "Entries only while realized volatility is at most max_vol",
            params: vec![
                ParamSpec::integer("lookback", 20.0, 2.0, 250.0),
                ParamSpec::continuous("max_vol", 0.03, 0.001, 0.2),
            ],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("mask", "volatility_filter_mask")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(VolatilityFilter {
                    lookback: int(p, "lookback"),
                    max_vol: num(p, "max_vol"),
                })
            }),
        },
        // ── Risk ──
        FactorDescriptor {
            kind: "volatility_target",
            category: FactorCategory::Risk,
            description: "Scale toward a target realized volatility, capped at 1",
            params: vec![
                ParamSpec::integer("lookback", 20.0, 2.0, 250.0),
                ParamSpec::continuous("target_vol", 0.01, 0.001, 0.1),
            ],
            inputs: vec![PRICE],
            outputs: vec![Slot::required("scale", "volatility_target_scale")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(VolatilityTarget {
                    lookback: int(p, "lookback"),
                    target_vol: num(p, "target_vol"),
                })
            }),
        },
        FactorDescriptor {
            kind: "fixed_fraction",
            category: FactorCategory::Risk,
            description: "Constant fraction of full size",
            params: vec![ParamSpec::continuous("fraction", 0.5, 0.01, 1.0)],
            inputs: vec![],
            outputs: vec![Slot::required("scale", "fixed_fraction_scale")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(FixedFraction {
                    fraction: num(p, "fraction"),
                })
            }),
        },
        // ── Composite ──
        FactorDescriptor {
            kind: "position",
            category: FactorCategory::Composite,
            description: "Final position: entry × mask × scale, flat where an exit fires",
            params: vec![ParamSpec::choice("allow_short", 1.0, &[0.0, 1.0])],
            inputs: vec![
                Slot::required("entry", "entry_signal"),
                Slot::optional("exit"),
                Slot::optional("filter"),
                Slot::optional("scale"),
            ],
            outputs: vec![Slot::required("position", "position")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(Position {
                    allow_short: num(p, "allow_short") != 0.0,
                })
            }),
        },
        FactorDescriptor {
            kind: "signal_combiner",
            category: FactorCategory::Composite,
            description: "Merge two directional signals (0 = and, 1 = or, 2 = mean)",
            params: vec![ParamSpec::choice("mode", 0.0, &[0.0, 1.0, 2.0])],
            inputs: vec![
                Slot::required("left", "left_signal"),
                Slot::required("right", "right_signal"),
            ],
            outputs: vec![Slot::required("signal", "combined_signal")],
            constraint: None,
            builder: Builder::Params(|p| {
                Arc::new(SignalCombiner {
                    mode: CombineMode::from_code(num(p, "mode")).unwrap_or(CombineMode::And),
                })
            }),
        },
        // ── Logic ──
        FactorDescriptor {
            kind: "rule",
            category: FactorCategory::Logic,
            description: "Transform given by an expression over named matrices",
            params: vec![],
            inputs: vec![],
            outputs: vec![Slot::required("signal", "rule_signal")],
            constraint: None,
            builder: Builder::Logic,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, f64)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn standard_registry_passes_self_check() {
        let registry = FactorRegistry::standard();
        registry.verify().unwrap();
        assert_eq!(registry.kinds().len(), 15);
    }

    #[test]
    fn list_by_category_is_sorted() {
        let registry = FactorRegistry::standard();
        assert_eq!(
            registry.list_by_category(FactorCategory::Exit),
            vec!["profit_target", "stop_loss", "trailing_stop"]
        );
        assert_eq!(registry.list_by_category(FactorCategory::Logic), vec!["rule"]);
    }

    #[test]
    fn create_factor_fills_defaults_and_derives_id() {
        let registry = FactorRegistry::standard();
        let f = registry
            .create_factor("trailing_stop", &params(&[("trail_pct", 0.1)]))
            .unwrap();
        assert_eq!(f.id().as_str(), "trailing_stop(lookback=20,trail_pct=0.1)");
        assert_eq!(f.param("lookback"), Some(20.0));
        assert_eq!(f.required_inputs(), vec!["close"]);
        assert_eq!(f.produced_outputs(), vec!["exit_signal"]);
    }

    #[test]
    fn unknown_kind_and_parameter_are_rejected() {
        let registry = FactorRegistry::standard();
        assert_eq!(
            registry.create_factor("rsi", &Params::new()).unwrap_err(),
            RegistryError::UnknownFactor("rsi".into())
        );
        assert!(matches!(
            registry.create_factor("momentum", &params(&[("window", 5.0)])),
            Err(RegistryError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn boundaries_accepted_outside_rejected() {
        let registry = FactorRegistry::standard();
        assert!(registry
            .create_factor("stop_loss", &params(&[("stop_pct", 0.01)]))
            .is_ok());
        assert!(registry
            .create_factor("stop_loss", &params(&[("stop_pct", 0.5)]))
            .is_ok());
        assert!(matches!(
            registry.create_factor("stop_loss", &params(&[("stop_pct", 0.51)])),
            Err(RegistryError::ParameterOutOfRange { .. })
        ));
        assert!(matches!(
            registry.create_factor("momentum", &params(&[("lookback", 20.5)])),
            Err(RegistryError::ParameterOutOfRange { .. })
        ));
    }

    #[test]
    fn cross_parameter_constraint() {
        let registry = FactorRegistry::standard();
        assert!(matches!(
            registry.create_factor("ma_crossover", &params(&[("fast", 60.0), ("slow", 50.0)])),
            Err(RegistryError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn position_optional_slots_only_bound_when_given() {
        let registry = FactorRegistry::standard();
        let mut spec = FactorSpec::new("position");
        spec.inputs.insert("entry".into(), "momentum_signal".into());
        spec.inputs.insert("exit".into(), "exit_signal".into());
        let f = registry.build(&spec).unwrap();
        assert_eq!(f.required_inputs(), vec!["momentum_signal", "exit_signal"]);
        assert_eq!(f.input("filter"), None);

        spec.inputs.insert("bogus".into(), "x".into());
        assert!(matches!(
            registry.build(&spec),
            Err(RegistryError::UnknownSlot { .. })
        ));
    }

    #[test]
    fn rule_inputs_come_from_expression() {
        let registry = FactorRegistry::standard();
        let mut spec = FactorSpec::new("rule");
        spec.logic = Some("close > sma(close, 5) and volume > 0".into());
        let f = registry.build(&spec).unwrap();
        assert_eq!(f.required_inputs(), vec!["close", "volume"]);
        assert_eq!(f.produced_outputs(), vec!["rule_signal"]);
        assert!(f.id().as_str().starts_with("rule["));

        spec.logic = None;
        assert!(matches!(registry.build(&spec), Err(RegistryError::MissingLogic(_))));

        spec.logic = Some("close >".into());
        assert!(matches!(registry.build(&spec), Err(RegistryError::InvalidLogic { .. })));

        spec.logic = Some(format!("close > 1{}", "0".repeat(400)));
        assert!(matches!(registry.build(&spec), Err(RegistryError::InvalidLogic { .. })));
    }

    #[test]
    fn reparameterize_keeps_identity_and_bindings() {
        let registry = FactorRegistry::standard();
        let mut spec = FactorSpec::new("momentum");
        spec.outputs.insert("signal".into(), "fast_momentum".into());
        let f = registry.build(&spec).unwrap();

        let g = registry
            .reparameterize(&f, &params(&[("lookback", 40.0)]))
            .unwrap();
        assert_eq!(g.id(), f.id());
        assert_eq!(g.param("lookback"), Some(40.0));
        assert_eq!(g.output("signal"), Some("fast_momentum"));

        assert!(registry
            .reparameterize(&f, &params(&[("lookback", 1000.0)]))
            .is_err());
    }

    #[test]
    fn with_logic_rederives_inputs() {
        let registry = FactorRegistry::standard();
        let mut spec = FactorSpec::new("rule");
        spec.logic = Some("close > open".into());
        let f = registry.build(&spec).unwrap();

        let g = registry.with_logic(&f, "close >= high").unwrap();
        assert_eq!(g.id(), f.id());
        assert_eq!(g.required_inputs(), vec!["close", "high"]);
        assert_eq!(g.logic(), Some("close >= high"));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = FactorRegistry::standard();
        let dup = standard_catalog().remove(0);
        assert_eq!(
            registry.register(dup),
            Err(RegistryError::DuplicateKind("momentum".into()))
        );
    }

    #[test]
    fn standard_catalog_kinds_are_unique() {
        let catalog = standard_catalog();
        let registry = FactorRegistry::standard();
        assert_eq!(registry.kinds().len(), catalog.len());
        assert!(registry.verify().is_ok());
    }

    #[test]
    fn verify_detects_bad_default() {
        let mut registry = FactorRegistry::new();
        let mut d = standard_catalog().remove(0);
        d.params[0].default = 1.0;
        registry.register(d).unwrap();
        assert!(matches!(registry.verify(), Err(RegistryError::Corrupt { .. })));
    }
}
