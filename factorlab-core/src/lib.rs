//! FactorLab Core — factor graphs over shared market matrices.
//!
//! This crate contains the composition engine:
//! - Matrix container shared by every factor in one pipeline run
//! - Stateless factors (entry, exit, filter, risk, composite, logic rules)
//! - Factor registry: the only way to instantiate a factor, with range checks
//! - Strategy graph with id-based edges, compiled by stable topological sort
//! - Logic expression language used by rule factors and logic-level mutation
//! - Strategy specifications, fingerprints, seeded RNG hierarchy, smoke data
//! - Structured diagnostics with stable reason codes

pub mod container;
pub mod diagnostics;
pub mod factor;
pub mod fingerprint;
pub mod logic;
pub mod matrix;
pub mod pipeline;
pub mod registry;
pub mod rng;
pub mod smoke;
pub mod strategy;

pub use container::{Axes, ContainerError, MatrixContainer, Provenance};
pub use diagnostics::{Diagnose, Diagnostic, ErrorClass, ReasonCode};
pub use factor::{Factor, FactorCategory, FactorId, Params};
pub use fingerprint::{FactorSpec, FullHash, SpecError, StrategySpec, StructureHash};
pub use matrix::{Matrix, Shape};
pub use pipeline::{CompiledPipeline, PipelineError};
pub use registry::{FactorRegistry, RegistryError};
pub use strategy::{CompileError, GraphError, RemovalPolicy, Strategy, StrategyState};
