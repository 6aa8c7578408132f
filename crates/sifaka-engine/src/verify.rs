//! Bounded verification of candidate solutions.
//!
//! Starting from the frontier, terms are expanded one constructor step
//! at a time; each expansion is checked first structurally (reduce both
//! sides under the candidate), then through the counterexample oracle
//! (an SMT check of the negated equality under the term's
//! precondition). SAT models become generalized counterexamples that
//! enrich T; the expansion provenance guarantees every added term is a
//! single step from an existing one.

use thiserror::Error;
use tracing::{debug, info};

use sifaka_ir::context::Context;
use sifaka_ir::expand::expand_once;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::reduce::{is_mr, mentions_nonterminal, Definition, Reducer};
use sifaka_ir::terms::{replace, simplify, Constant, Term, Variable};
use sifaka_ir::types::RType;
use sifaka_smt::backends::cvc5_backend::{Cvc5Solver, SolverConfig};
use sifaka_smt::backends::process::BackendError;
use sifaka_smt::backends::z3_backend::Z3Solver;
use sifaka_smt::solver::{Model, ModelValue, SatResult, SmtSolver};
use sifaka_smt::sorts::DatatypeDecl;

use crate::config::{EngineOptions, SolverChoice};
use crate::encode::{encode_term, sort_of_type};
use crate::state::{CexModel, TermStateMap};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    /// Rewrite-limit or impurity during checking: a soft failure the
    /// loop downgrades to Unknown.
    #[error("verification resource bound: {0}")]
    Resource(String),
    #[error("oracle failure: {0}")]
    Oracle(String),
}

/// Verdict of one verifier call.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Correct,
    /// Counterexample terms (to join T) and the new non-MR frontier.
    Ctexs { new_t: Vec<Term>, new_u: Vec<Term> },
    /// The partial-correctness assumptions over-constrained the system.
    IncorrectAssumptions,
}

/// Decides `¬(lhs = rhs)` under a precondition, producing a model on
/// SAT. The engine owns reduction; the oracle only sees first-order
/// scalar obligations.
pub trait CounterexampleOracle {
    fn refute(
        &mut self,
        vars: &[Variable],
        precond: Option<&Term>,
        lhs: &Term,
        rhs: &Term,
    ) -> Result<Option<CexModel>, VerifyError>;
}

/// Oracle backed by a fresh SMT subprocess per query.
pub struct SmtOracle {
    pub choice: SolverChoice,
    pub timeout_ms: u64,
    pub datatypes: Vec<DatatypeDecl>,
}

impl SmtOracle {
    fn spawn(&self) -> Result<Box<dyn SmtSolver<Error = BackendError>>, VerifyError> {
        let mk = |cfg: SolverConfig| cfg.with_timeout_ms(self.timeout_ms);
        match self.choice {
            SolverChoice::Z3 => Z3Solver::with_config(&mk(SolverConfig::z3("ALL")))
                .map(|s| Box::new(s) as Box<dyn SmtSolver<Error = BackendError>>)
                .map_err(|e| VerifyError::Oracle(e.to_string())),
            SolverChoice::Cvc5 => Cvc5Solver::with_config(&mk(SolverConfig::cvc5("ALL")))
                .map(|s| Box::new(s) as Box<dyn SmtSolver<Error = BackendError>>)
                .map_err(|e| VerifyError::Oracle(e.to_string())),
        }
    }
}

impl CounterexampleOracle for SmtOracle {
    fn refute(
        &mut self,
        vars: &[Variable],
        precond: Option<&Term>,
        lhs: &Term,
        rhs: &Term,
    ) -> Result<Option<CexModel>, VerifyError> {
        let mut solver = self.spawn()?;
        let oracle_err = |e: BackendError| VerifyError::Oracle(e.to_string());
        if !self.datatypes.is_empty() {
            solver.declare_datatypes(&self.datatypes).map_err(oracle_err)?;
        }
        let mut sorted_vars = Vec::new();
        for v in vars {
            let sort = sort_of_type(&v.ty).map_err(|e| VerifyError::Oracle(e.to_string()))?;
            solver.declare_var(&v.name, &sort).map_err(oracle_err)?;
            sorted_vars.push((v.clone(), sort));
        }
        if let Some(pre) = precond {
            let encoded =
                encode_term(pre).map_err(|e| VerifyError::Oracle(e.to_string()))?;
            solver.assert(&encoded).map_err(oracle_err)?;
        }
        let el = encode_term(lhs).map_err(|e| VerifyError::Oracle(e.to_string()))?;
        let er = encode_term(rhs).map_err(|e| VerifyError::Oracle(e.to_string()))?;
        solver.assert(&el.eq(er).not()).map_err(oracle_err)?;

        let query: Vec<(&str, &sifaka_smt::sorts::SmtSort)> = sorted_vars
            .iter()
            .map(|(v, s)| (v.name.as_str(), s))
            .collect();
        let (sat, model) = solver.check_sat_with_model(&query).map_err(oracle_err)?;
        match sat {
            SatResult::Unsat => Ok(None),
            SatResult::Sat => Ok(Some(model_to_cex(model.unwrap_or_default(), vars))),
            SatResult::Unknown(reason) => Err(VerifyError::Oracle(reason)),
        }
    }
}

fn model_to_cex(model: Model, vars: &[Variable]) -> CexModel {
    let mut out = CexModel::new();
    for v in vars {
        match model.values.get(&v.name) {
            Some(ModelValue::Int(n)) => {
                out.insert(v.id, Constant::Int(*n));
            }
            Some(ModelValue::Bool(b)) => {
                out.insert(v.id, Constant::Bool(*b));
            }
            // Absent assignments default per sort so stored
            // counterexamples are total over the scalars.
            None => {
                let c = match v.ty {
                    RType::Bool => Constant::Bool(false),
                    _ => Constant::Int(0),
                };
                out.insert(v.id, c);
            }
        }
    }
    out
}

/// Check one representative: `None` when the equation holds, `Some`
/// with the refuting model otherwise.
fn eval_term(
    ctx: &mut Context,
    problem: &ProblemDefn,
    state: &mut TermStateMap,
    candidate: &[Definition],
    t: &Term,
    opts: &EngineOptions,
    oracle: &mut dyn CounterexampleOracle,
) -> Result<Option<CexModel>, VerifyError> {
    let (recurs_elim, precond) = {
        let detail = state.ensure(ctx, problem, t);
        (detail.recurs_elim.clone(), detail.precond.clone())
    };
    let lhs_red = Reducer::new(vec![&problem.reference, &problem.repr])
        .with_limit(opts.reduction_limit)
        .reduce(&problem.spec_of(t.clone()));
    let rhs_red = Reducer::new(vec![&problem.target])
        .with_defs(candidate)
        .with_limit(opts.reduction_limit)
        .reduce(&problem.skeleton_of(t.clone()));
    if !lhs_red.complete || !rhs_red.complete {
        return Err(VerifyError::Resource(format!(
            "reduction limit while checking {t}"
        )));
    }
    let mut lhs = lhs_red.term;
    let mut rhs = rhs_red.term;
    for (ti, vi) in &recurs_elim {
        let scalar = Term::var(vi.clone());
        lhs = replace(&lhs, &problem.spec_of(ti.clone()), &scalar);
        if !problem.repr_is_identity {
            lhs = replace(&lhs, &problem.reference.apply_main(ti.clone()), &scalar);
        }
        rhs = replace(&rhs, &problem.skeleton_of(ti.clone()), &scalar);
    }
    for p in [&problem.reference, &problem.repr, &problem.target] {
        if mentions_nonterminal(&lhs, p) || mentions_nonterminal(&rhs, p) {
            return Err(VerifyError::Resource(format!(
                "impure verification obligation for {t}"
            )));
        }
    }
    let lhs = simplify(&lhs);
    let rhs = simplify(&rhs);
    if lhs == rhs {
        return Ok(None);
    }

    let mut vars = lhs.free_variables();
    for v in rhs.free_variables() {
        if !vars.iter().any(|w| w.id == v.id) {
            vars.push(v);
        }
    }
    if vars.iter().any(|v| matches!(v.ty, RType::Named(_, _))) {
        return Err(VerifyError::Resource(format!(
            "non-scalar obligation for {t}"
        )));
    }
    match oracle.refute(&vars, precond.as_ref(), &lhs, &rhs)? {
        Some(model) => {
            let detail = state.ensure(ctx, problem, t);
            detail.negatives.push(model.clone());
            Ok(Some(model))
        }
        None => Ok(None),
    }
}

/// Verify `candidate` by expansion from T and U up to the configured
/// budget.
#[allow(clippy::too_many_arguments)]
pub fn check(
    ctx: &mut Context,
    problem: &ProblemDefn,
    state: &mut TermStateMap,
    candidate: &[Definition],
    t_set: &[Term],
    u_set: &[Term],
    assumptions_active: bool,
    opts: &EngineOptions,
    oracle: &mut dyn CounterexampleOracle,
) -> Result<VerifyOutcome, VerifyError> {
    // The candidate must at least satisfy the driving set.
    for t in t_set {
        if eval_term(ctx, problem, state, candidate, t, opts, oracle)?.is_some() {
            if assumptions_active {
                info!(term = %t, "driving term refuted under assumptions");
                return Ok(VerifyOutcome::IncorrectAssumptions);
            }
            let step = expand_once(ctx, t);
            let (mr, rest): (Vec<Term>, Vec<Term>) = step
                .into_iter()
                .partition(|c| is_mr(&problem.target, c, opts.reduction_limit));
            return Ok(VerifyOutcome::Ctexs {
                new_t: if mr.is_empty() { vec![t.clone()] } else { mr },
                new_u: rest,
            });
        }
    }

    let mut frontier: Vec<Term> = if u_set.is_empty() {
        t_set.to_vec()
    } else {
        u_set.to_vec()
    };
    let mut new_t = Vec::new();
    let mut new_u = Vec::new();
    let mut checked = 0usize;
    while !frontier.is_empty() && checked < opts.num_expansions_check {
        let mut next = Vec::new();
        for u in frontier.drain(..) {
            let children = expand_once(ctx, &u);
            // Ground terms have no expansions; expand_once echoes them.
            if children.len() == 1 && children[0] == u {
                continue;
            }
            for child in children {
                if checked >= opts.num_expansions_check {
                    next.push(child);
                    continue;
                }
                checked += 1;
                let refuted =
                    eval_term(ctx, problem, state, candidate, &child, opts, oracle)?;
                if refuted.is_some() {
                    debug!(term = %child, "generalized counterexample");
                    new_t.push(child.clone());
                }
                // Keep expanding while the child still has ADT leaves.
                if child
                    .free_variables()
                    .iter()
                    .any(|v| matches!(v.ty, RType::Named(_, _)))
                {
                    next.push(child);
                }
            }
        }
        frontier = next;
    }
    new_u.extend(frontier);

    if new_t.is_empty() {
        info!(checked, "verification passed within the expansion bound");
        Ok(VerifyOutcome::Correct)
    } else {
        info!(count = new_t.len(), "verification found counterexamples");
        Ok(VerifyOutcome::Ctexs { new_t, new_u })
    }
}
