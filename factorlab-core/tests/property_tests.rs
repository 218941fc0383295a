//! Property tests for graph and registry invariants.
//!
//! Uses proptest to verify:
//! 1. Acyclicity — compile either yields an order respecting every edge or
//!    names a real cycle, for any sequence of graph edits
//! 2. Idempotent compile — an unmodified strategy compiles to the same order
//! 3. Range enforcement — construction fails iff a value is outside its range
//! 4. Canonical logic rendering — parse(render(ast)) == ast
//! 5. No look-ahead — truncating future rows never changes past outputs

use proptest::prelude::*;
use std::collections::HashMap;

use factorlab_core::factor::{FactorId, ParamRange, Params};
use factorlab_core::fingerprint::FactorSpec;
use factorlab_core::logic::{self, ArithOp, CmpOp, Connective, Expr, Func};
use factorlab_core::registry::{FactorRegistry, RegistryError};
use factorlab_core::smoke;
use factorlab_core::strategy::{CompileError, RemovalPolicy, Strategy as Graph};

// ── Graph edit sequences ─────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Edit {
    Add { deps: Vec<usize> },
    Edge { from: usize, to: usize },
    Remove { target: usize, cascade: bool },
    Replace { target: usize },
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => prop::collection::vec(0usize..16, 0..3).prop_map(|deps| Edit::Add { deps }),
        2 => (0usize..16, 0usize..16).prop_map(|(from, to)| Edit::Edge { from, to }),
        1 => (0usize..16, any::<bool>())
            .prop_map(|(target, cascade)| Edit::Remove { target, cascade }),
        1 => (0usize..16).prop_map(|target| Edit::Replace { target }),
    ]
}

fn rule(registry: &FactorRegistry, id: &str) -> factorlab_core::Factor {
    let mut spec = FactorSpec::new("rule");
    spec.id = Some(FactorId::new(id));
    spec.logic = Some("close > open".into());
    spec.outputs.insert("signal".into(), format!("{id}_out"));
    registry.build(&spec).unwrap()
}

/// Apply edits, ignoring ones the graph rejects.
fn build_graph(edits: &[Edit]) -> Graph {
    let registry = FactorRegistry::standard();
    let mut strategy = Graph::new("prop").with_output("close");
    let mut next = 0usize;
    for edit in edits {
        let ids = strategy.factor_ids();
        let pick = |i: usize| ids.get(i % ids.len().max(1)).cloned();
        match edit {
            Edit::Add { deps } => {
                let deps: Vec<FactorId> = deps.iter().filter_map(|&d| pick(d)).collect();
                let _ = strategy.add_factor(rule(&registry, &format!("f{next}")), &deps);
                next += 1;
            }
            Edit::Edge { from, to } => {
                if let (Some(a), Some(b)) = (pick(*from), pick(*to)) {
                    let _ = strategy.add_dependency(&a, &b);
                }
            }
            Edit::Remove { target, cascade } => {
                if let Some(id) = pick(*target) {
                    let policy = if *cascade {
                        RemovalPolicy::Cascade
                    } else {
                        RemovalPolicy::Reject
                    };
                    let _ = strategy.remove_factor(&id, policy);
                }
            }
            Edit::Replace { target } => {
                if let Some(id) = pick(*target) {
                    let _ = strategy.replace_factor(&id, rule(&registry, &format!("f{next}")));
                    next += 1;
                }
            }
        }
    }
    strategy
}

proptest! {
    #[test]
    fn compile_respects_edges_or_names_real_cycle(
        edits in prop::collection::vec(arb_edit(), 1..40),
    ) {
        let strategy = build_graph(&edits);
        let edges = strategy.edges();
        match strategy.to_pipeline() {
            Ok(pipeline) => {
                let order = pipeline.order();
                prop_assert_eq!(order.len(), strategy.len());
                let rank: HashMap<FactorId, usize> =
                    order.into_iter().enumerate().map(|(i, id)| (id, i)).collect();
                for (factor, dep) in &edges {
                    prop_assert!(rank[dep] < rank[factor], "{} must run before {}", dep, factor);
                }
            }
            Err(CompileError::Cycle { path }) => {
                prop_assert!(!path.is_empty());
                for (i, id) in path.iter().enumerate() {
                    let next = &path[(i + 1) % path.len()];
                    prop_assert!(
                        edges.contains(&(id.clone(), next.clone())),
                        "{} -> {} is not an edge", id, next
                    );
                }
            }
            Err(other) => prop_assert!(false, "unexpected compile error {}", other),
        }
    }

    #[test]
    fn compile_is_idempotent(edits in prop::collection::vec(arb_edit(), 1..30)) {
        let mut strategy = build_graph(&edits);
        let first = strategy.compile().map(|p| p.order());
        let second = strategy.compile().map(|p| p.order());
        prop_assert_eq!(first, second);
    }
}

// ── Parameter ranges ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn construction_fails_iff_out_of_range(
        kind_index in 0usize..15,
        param_index in 0usize..4,
        value in -10.0..500.0_f64,
    ) {
        let registry = FactorRegistry::standard();
        let kind = registry.kinds()[kind_index];
        let descriptor = registry.descriptor(kind).unwrap();
        prop_assume!(!descriptor.params.is_empty());
        let spec = &descriptor.params[param_index % descriptor.params.len()];

        // Snap some draws onto the exact boundary.
        let value = match (&spec.range, (value * 7.0) as i64 % 3) {
            (ParamRange::Continuous { min, .. } | ParamRange::Integer { min, .. }, 0) => *min,
            (ParamRange::Continuous { max, .. } | ParamRange::Integer { max, .. }, 1) => *max,
            (ParamRange::Integer { .. }, _) => value.round(),
            _ => value,
        };

        let mut params = Params::new();
        params.insert(spec.name.to_string(), value);
        let mut factor_spec = FactorSpec::new(kind);
        factor_spec.params = params;
        if descriptor.requires_logic() {
            factor_spec.logic = Some("close > 0".into());
        }
        let result = registry.build(&factor_spec);

        if spec.range.contains(value) {
            // Only a cross-parameter constraint may still reject it.
            if let Err(e) = &result {
                prop_assert!(
                    matches!(e, RegistryError::ConstraintViolation { .. }),
                    "{}={} in range but rejected: {}", spec.name, value, e
                );
            }
        } else {
            let is_range_error = matches!(result, Err(RegistryError::ParameterOutOfRange { .. }));
            prop_assert!(is_range_error, "{}={} accepted", spec.name, value);
        }
    }
}

// ── Logic rendering ──────────────────────────────────────────────────

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0u32..100_000).prop_map(|n| Expr::Number(n as f64 / 100.0)),
        prop::sample::select(vec!["close", "high", "volume", "x1"])
            .prop_map(|s| Expr::Ident(s.to_string())),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        let arith =
            prop::sample::select(vec![ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div]);
        let cmp = prop::sample::select(vec![
            CmpOp::Lt, CmpOp::Le, CmpOp::Gt, CmpOp::Ge, CmpOp::Eq, CmpOp::Ne,
        ]);
        let conn = prop::sample::select(vec![Connective::And, Connective::Or]);
        let func = prop::sample::select(vec![
            Func::Sma, Func::Max, Func::Min, Func::Lag, Func::Std, Func::Abs,
        ]);
        prop_oneof![
            inner.clone().prop_map(|e| Expr::Neg(Box::new(e))),
            inner.clone().prop_map(|e| Expr::Not(Box::new(e))),
            (arith, inner.clone(), inner.clone()).prop_map(|(op, l, r)| Expr::Arith {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r)
            }),
            (cmp, inner.clone(), inner.clone()).prop_map(|(op, l, r)| Expr::Compare {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r)
            }),
            (conn, inner.clone(), inner.clone()).prop_map(|(op, l, r)| Expr::Logical {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r)
            }),
            (func, inner, 1usize..50).prop_map(|(func, arg, n)| Expr::Call {
                func,
                arg: Box::new(arg),
                window: func.is_windowed().then_some(n),
            }),
        ]
    })
}

proptest! {
    #[test]
    fn rendering_is_canonical(expr in arb_expr()) {
        let source = expr.to_string();
        let parsed = logic::parse(&source);
        prop_assert_eq!(parsed.as_ref(), Ok(&expr), "source: {}", source);
        prop_assert_eq!(parsed.map(|e| e.to_string()), Ok(source));
    }
}

// ── Look-ahead ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn outputs_never_depend_on_future_rows(
        kind_index in 0usize..15,
        cut in 40usize..119,
    ) {
        let registry = FactorRegistry::standard();
        let kind = registry.kinds()[kind_index];
        let descriptor = registry.descriptor(kind).unwrap();
        let mut spec = FactorSpec::new(kind);
        if descriptor.requires_logic() {
            spec.logic = Some("close > sma(close, 5) and volume > lag(volume, 2)".into());
        }
        if kind == "position" {
            spec.inputs.insert("entry".into(), "close".into());
        }
        if kind == "signal_combiner" {
            spec.inputs.insert("left".into(), "close".into());
            spec.inputs.insert("right".into(), "open".into());
        }
        for p in &descriptor.params {
            // Short windows so warmup ends inside the truncated panel.
            if p.name == "fast" {
                spec.params.insert(p.name.to_string(), 2.0);
            }
            if p.name == "period" || p.name == "lookback" || p.name == "slow" {
                let v = match p.range {
                    ParamRange::Integer { min, .. } => min.max(5.0),
                    _ => p.default,
                };
                spec.params.insert(p.name.to_string(), v);
            }
        }
        let factor = registry.build(&spec).unwrap();
        let output = factor.produced_outputs()[0].clone();

        let mut full = smoke::container(120, 2, 11);
        factor.execute(&mut full).unwrap();
        let mut short = smoke::container(cut, 2, 11);
        factor.execute(&mut short).unwrap();

        let a = full.get(&output).unwrap();
        let b = short.get(&output).unwrap();
        for r in 0..cut {
            for c in 0..2 {
                let (x, y) = (a.get(r, c), b.get(r, c));
                prop_assert!(
                    (x.is_nan() && y.is_nan()) || x == y,
                    "{} row {} differs: {} vs {}", kind, r, x, y
                );
            }
        }
    }
}
