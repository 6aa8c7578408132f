//! Result and statistics types for one solve.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use sifaka_ir::reduce::Definition;
use sifaka_ir::terms::Term;

use crate::state::CexModel;

/// A synthesized hole implementation, rendered `name args = body`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HoleSolution {
    pub name: String,
    pub args: Vec<String>,
    pub body: String,
}

impl HoleSolution {
    pub fn of_definition(def: &Definition) -> Self {
        Self {
            name: def.var.name.clone(),
            args: def.args.iter().map(|a| a.name.clone()).collect(),
            body: def.body.to_string(),
        }
    }
}

impl fmt::Display for HoleSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{} = {}", self.name, self.body)
        } else {
            write!(f, "{} {} = {}", self.name, self.args.join(" "), self.body)
        }
    }
}

/// A witness that no hole filling can satisfy the counterexample set.
#[derive(Debug, Clone, Serialize)]
pub struct UnrealizabilityWitness {
    /// Printed representative term.
    pub term: String,
    /// Conflicting positive and negative valuations (variable name ->
    /// printed constant).
    pub positives: Vec<Vec<(String, String)>>,
    pub negatives: Vec<Vec<(String, String)>>,
}

impl UnrealizabilityWitness {
    pub fn new(
        term: &Term,
        names: &[(u32, String)],
        positives: &[CexModel],
        negatives: &[CexModel],
    ) -> Self {
        let render = |m: &CexModel| {
            m.iter()
                .map(|(id, c)| {
                    let name = names
                        .iter()
                        .find(|(i, _)| i == id)
                        .map(|(_, n)| n.clone())
                        .unwrap_or_else(|| format!("v{id}"));
                    (name, c.to_string())
                })
                .collect::<Vec<_>>()
        };
        Self {
            term: term.to_string(),
            positives: positives.iter().map(render).collect(),
            negatives: negatives.iter().map(render).collect(),
        }
    }
}

/// Final answer of the refinement loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SynthResult {
    Realizable { solutions: Vec<HoleSolution> },
    Unrealizable { witnesses: Vec<UnrealizabilityWitness> },
    Unknown { reason: String },
    Failed { reason: String },
}

impl SynthResult {
    /// Exit-code class: a decided answer is success.
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            SynthResult::Realizable { .. } | SynthResult::Unrealizable { .. }
        )
    }
}

/// JSON statistics record persisted next to each solution.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SolveStats {
    pub elapsed_ms: u128,
    pub verification_ms: u128,
    pub refinement_steps: usize,
    pub sygus_calls: usize,
    pub smt_calls: usize,
    /// Deduction hits that avoided a solver round trip.
    pub cache_hits: usize,
    pub equations_dropped: usize,
    pub lemmas_accepted: usize,
    /// Fingerprint over source + options for reproducibility.
    pub fingerprint: String,
}

impl SolveStats {
    pub fn fingerprint_of(source: &str, options_desc: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(options_desc.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
