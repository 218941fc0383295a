//! Strategy specifications and fingerprints.
//!
//! - `FactorSpec`: one factor as plain data (kind, params, bindings, logic, edges).
//! - `StrategySpec`: a whole graph as plain data, loadable from TOML or JSON.
//! - `StructureHash`: graph identity (ids, kinds, bindings, edges; no parameter values).
//! - `FullHash`: exact identity (structure + parameter values + logic source).
//!
//! Specs are the textual strategy intent handed over by the validation
//! gateway. Loading one always goes back through the registry, so ranges,
//! bindings and graph invariants are re-checked here.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::factor::{Factor, FactorId, Params};
use crate::registry::{FactorRegistry, RegistryError};
use crate::strategy::{GraphError, Strategy, DEFAULT_OUTPUT, DEFAULT_RAW_INPUTS};

// ─── Hashes ──────────────────────────────────────────────────────────

/// Structural hash: factor ids, kinds, bindings and edges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StructureHash(pub String);

/// Full hash: structure plus parameter values and logic source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FullHash(pub String);

impl StructureHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }
}

impl FullHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex digits, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for StructureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FullHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("read strategy spec {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse strategy TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("serialize strategy TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("parse strategy JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("factor #{index} ({kind}): {source}")]
    Factor {
        index: usize,
        kind: String,
        #[source]
        source: RegistryError,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ─── Factor spec ─────────────────────────────────────────────────────

/// One factor as plain data. Unset fields take registry defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FactorId>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<FactorId>,
    #[serde(default)]
    pub params: Params,
    /// Input slot → matrix name overrides.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Output slot → matrix name overrides.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl FactorSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Capture a built factor with every binding explicit.
    pub fn from_factor(factor: &Factor, depends_on: Vec<FactorId>) -> Self {
        Self {
            id: Some(factor.id().clone()),
            kind: factor.kind().to_string(),
            logic: factor.logic().map(str::to_string),
            depends_on,
            params: factor.params().clone(),
            inputs: factor.input_bindings().iter().cloned().collect(),
            outputs: factor.output_bindings().iter().cloned().collect(),
        }
    }
}

// ─── Strategy spec ───────────────────────────────────────────────────

fn default_raw_inputs() -> Vec<String> {
    DEFAULT_RAW_INPUTS.iter().map(|s| s.to_string()).collect()
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

/// A strategy graph as plain data.
///
/// ```toml
/// name = "momentum_trail"
/// output = "position"
///
/// [[factor]]
/// kind = "momentum"
/// params = { lookback = 20 }
///
/// [[factor]]
/// kind = "position"
/// depends_on = ["momentum(lookback=20)"]
/// inputs = { entry = "momentum_signal" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    #[serde(default = "default_raw_inputs")]
    pub raw_inputs: Vec<String>,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default, rename = "factor")]
    pub factors: Vec<FactorSpec>,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_inputs: default_raw_inputs(),
            output: default_output(),
            factors: Vec::new(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, SpecError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, SpecError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SpecError> {
        let content = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    pub fn to_toml(&self) -> Result<String, SpecError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> Result<String, SpecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural hash: ignores parameter values and logic source.
    ///
    /// Two momentum strategies with different lookbacks share a structure
    /// hash as long as their factor ids are the same.
    pub fn structure_hash(&self) -> StructureHash {
        let mut canonical = format!("raw={};out={}", self.raw_inputs.join(","), self.output);
        for f in &self.factors {
            let id = f.id.as_ref().map(FactorId::as_str).unwrap_or("");
            let deps: Vec<&str> = f.depends_on.iter().map(FactorId::as_str).collect();
            let bind = |m: &BTreeMap<String, String>| {
                m.iter()
                    .map(|(k, v)| format!("{k}:{v}"))
                    .collect::<Vec<_>>()
                    .join(",")
            };
            canonical.push_str(&format!(
                "|{id}={}[{}]->[{}]<-[{}]",
                f.kind,
                bind(&f.inputs),
                bind(&f.outputs),
                deps.join(",")
            ));
        }
        StructureHash::from_bytes(canonical.as_bytes())
    }

    /// Full hash over the canonical JSON form.
    pub fn full_hash(&self) -> FullHash {
        // BTreeMap fields serialize with sorted keys
        let json = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        FullHash::from_bytes(json.as_bytes())
    }
}

// ─── Strategy <-> spec ───────────────────────────────────────────────

impl Strategy {
    /// Build and validate a strategy from its specification.
    ///
    /// Factors are added in listed order, then edges; an edge may point at a
    /// factor listed later, so cycles are representable and surface at
    /// compile time.
    pub fn from_spec(spec: &StrategySpec, registry: &FactorRegistry) -> Result<Self, SpecError> {
        let mut strategy = Strategy::new(spec.name.clone())
            .with_raw_inputs(spec.raw_inputs.iter().cloned())
            .with_output(spec.output.clone());

        let mut ids = Vec::with_capacity(spec.factors.len());
        for (index, fs) in spec.factors.iter().enumerate() {
            let factor = registry.build(fs).map_err(|source| SpecError::Factor {
                index,
                kind: fs.kind.clone(),
                source,
            })?;
            ids.push(factor.id().clone());
            strategy.add_factor(factor, &[])?;
        }
        for (id, fs) in ids.iter().zip(&spec.factors) {
            for dep in &fs.depends_on {
                strategy.add_dependency(id, dep)?;
            }
        }
        Ok(strategy)
    }

    /// Capture the graph as plain data, every id and binding explicit.
    pub fn to_spec(&self) -> StrategySpec {
        StrategySpec {
            name: self.name().to_string(),
            raw_inputs: self.raw_inputs().to_vec(),
            output: self.output().to_string(),
            factors: self
                .factors()
                .map(|f| {
                    let deps = self.depends_on(f.id()).map(<[_]>::to_vec).unwrap_or_default();
                    FactorSpec::from_factor(f, deps)
                })
                .collect(),
        }
    }

    pub fn structure_hash(&self) -> StructureHash {
        self.to_spec().structure_hash()
    }

    pub fn full_hash(&self) -> FullHash {
        self.to_spec().full_hash()
    }
}
