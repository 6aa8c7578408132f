//! Per-term lemma synthesis.
//!
//! When synthesis reports infeasibility, each term holding
//! counterexamples gets a boolean synth-fun over its
//! recursion-elimination scalars: positives constrain the lemma to
//! hold, negatives to fail. A candidate is then verified two ways at
//! once — a bounded check over ground instantiations and an unbounded
//! SMT-induction check — through a select-first race; the losing
//! check's result is discarded. A countermodel feeds the next round as
//! a positive example; an accepted lemma conjoins into the term's
//! precondition.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use sifaka_ir::context::Context;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::reduce::Reducer;
use sifaka_ir::terms::{simplify, Constant, Term, VarSubst, Variable};
use sifaka_ir::types::RType;
use sifaka_smt::backends::cvc5_backend::{Cvc5Solver, SolverConfig};
use sifaka_smt::backends::process::BackendError;
use sifaka_smt::backends::sygus_backend::{SygusConfig, SygusRunner};
use sifaka_smt::backends::z3_backend::Z3Solver;
use sifaka_smt::solver::{ModelValue, SatResult, SmtSolver};
use sifaka_smt::sorts::{DatatypeDecl, SmtSort};
use sifaka_smt::sygus::{SygusCommand, SynthFun, SynthResponse};
use sifaka_smt::terms::SmtTerm;

use crate::config::{EngineOptions, SolverChoice};
use crate::encode::{
    datatype_decls, decode_term, encode_funcdef, encode_term, sort_of_type, EncodeError,
};
use crate::grammar::{generate, GrammarConfig};
use crate::result::UnrealizabilityWitness;
use crate::state::{CexModel, TermDetail, TermStateMap};

#[derive(Debug, Error)]
pub enum LemmaError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Outcome of one lemma-synthesis round over all terms.
#[derive(Debug)]
pub enum LemmaOutcome {
    /// At least one lemma was accepted; rebuild the equations.
    Progress,
    /// The counterexample sets certify unrealizability.
    Unrealizable(Vec<UnrealizabilityWitness>),
    /// Budget exhausted without progress.
    Exhausted,
}

/// Verdict of one lemma check.
#[derive(Debug, Clone)]
pub enum CheckVerdict {
    Valid,
    /// A reachable valuation refuting the candidate: a new positive.
    CounterModel(CexModel),
    Inconclusive(String),
}

/// Abstraction over the SyGuS and SMT ports used by lemma refinement,
/// so the inner loop is testable without solver binaries.
pub trait LemmaSolver: Sync {
    /// Synthesize a predicate over `scalars` accepting every positive
    /// valuation and rejecting every negative one. `Ok(None)` means the
    /// synthesizer gave up; an infeasibility is reported by the caller
    /// beforehand through the overlap check.
    fn synthesize(
        &self,
        scalars: &[Variable],
        positives: &[CexModel],
        negatives: &[CexModel],
    ) -> Result<Option<Term>, LemmaError>;

    /// Unbounded validity check by SMT induction. Runs on a worker
    /// thread; implementations spawn their own solver.
    fn prove(&self, query: &UnboundedQuery) -> CheckVerdict;
}

/// Prepared unbounded obligation: everything the induction check needs,
/// encoded ahead of the race so the worker thread owns plain data.
#[derive(Debug, Clone)]
pub struct UnboundedQuery {
    pub datatypes: Vec<DatatypeDecl>,
    /// Recursive function definitions (name, args, ret, body).
    pub functions: Vec<(String, Vec<(String, SmtSort)>, SmtSort, SmtTerm)>,
    /// Free constants to declare (recursive subterms and scalars).
    pub consts: Vec<(String, SmtSort)>,
    /// Background assertions: recursion-elimination bindings, the
    /// invariant, the current precondition.
    pub assertions: Vec<SmtTerm>,
    /// The negated candidate.
    pub neg_lemma: SmtTerm,
    /// Scalars to read back from a SAT model.
    pub scalars: Vec<(Variable, SmtSort)>,
    pub tlimit_ms: u64,
    pub choice: SolverChoice,
}

/// The production solver: cvc5 SyGuS for synthesis, the configured SMT
/// backend with `quant-ind` for the unbounded check.
pub struct PortLemmaSolver {
    pub sygus_timeout_ms: u64,
}

impl LemmaSolver for PortLemmaSolver {
    fn synthesize(
        &self,
        scalars: &[Variable],
        positives: &[CexModel],
        negatives: &[CexModel],
    ) -> Result<Option<Term>, LemmaError> {
        let args: Vec<(String, SmtSort)> = scalars
            .iter()
            .map(|v| Ok((v.name.clone(), sort_of_type(&v.ty)?)))
            .collect::<Result<Vec<_>, EncodeError>>()?;
        let cfg = GrammarConfig {
            boolean_required: true,
            ..GrammarConfig::default()
        };
        let grammar = generate(&SmtSort::Bool, &args, &cfg, None);
        let mut cmds = vec![
            SygusCommand::SetLogic("LIA".into()),
            SygusCommand::SynthFun(SynthFun {
                name: "lemma".into(),
                args: args.clone(),
                ret: SmtSort::Bool,
                grammar: Some(grammar),
            }),
        ];
        let call = |model: &CexModel| {
            let actuals: Vec<SmtTerm> = scalars
                .iter()
                .map(|v| match model.get(&v.id) {
                    Some(Constant::Int(n)) => SmtTerm::int(*n),
                    Some(Constant::Bool(b)) => SmtTerm::bool(*b),
                    _ => SmtTerm::int(0),
                })
                .collect();
            SmtTerm::app("lemma", actuals)
        };
        for p in positives {
            cmds.push(SygusCommand::Constraint(call(p)));
        }
        for n in negatives {
            cmds.push(SygusCommand::Constraint(call(n).not()));
        }
        cmds.push(SygusCommand::CheckSynth);

        let runner =
            SygusRunner::new(SygusConfig::default().with_timeout_ms(self.sygus_timeout_ms));
        match runner.run(&cmds)? {
            SynthResponse::Success(defs) => {
                let Some(def) = defs.into_iter().find(|d| d.name == "lemma") else {
                    return Ok(None);
                };
                let env: std::collections::HashMap<String, Variable> = scalars
                    .iter()
                    .map(|v| (v.name.clone(), v.clone()))
                    .collect();
                let mut scratch = Context::new();
                let term = decode_term(&mut scratch, &def.body, &RType::Bool, &env)?;
                Ok(Some(term))
            }
            SynthResponse::Infeasible | SynthResponse::Fail => Ok(None),
            SynthResponse::Unknown(reason) => {
                warn!(%reason, "lemma synthesis returned unknown");
                Ok(None)
            }
        }
    }

    fn prove(&self, query: &UnboundedQuery) -> CheckVerdict {
        run_unbounded(query)
    }
}

fn run_unbounded(query: &UnboundedQuery) -> CheckVerdict {
    let solver: Result<Box<dyn SmtSolver<Error = BackendError>>, BackendError> =
        match query.choice {
            SolverChoice::Z3 => {
                Z3Solver::with_config(&SolverConfig::z3("ALL").with_timeout_ms(query.tlimit_ms))
                    .map(|s| Box::new(s) as _)
            }
            SolverChoice::Cvc5 => Cvc5Solver::with_config(
                &SolverConfig::cvc5("ALL").with_timeout_ms(query.tlimit_ms),
            )
            .map(|s| Box::new(s) as _),
        };
    let mut solver = match solver {
        Ok(s) => s,
        Err(e) => return CheckVerdict::Inconclusive(e.to_string()),
    };
    let step = (|| -> Result<CheckVerdict, BackendError> {
        if !query.datatypes.is_empty() {
            solver.declare_datatypes(&query.datatypes)?;
        }
        for (name, args, ret, body) in &query.functions {
            solver.define_fun_rec(name, args, ret, body)?;
        }
        for (name, sort) in &query.consts {
            solver.declare_var(name, sort)?;
        }
        for a in &query.assertions {
            solver.assert(a)?;
        }
        solver.assert(&query.neg_lemma)?;
        let vars: Vec<(&str, &SmtSort)> = query
            .scalars
            .iter()
            .map(|(v, s)| (v.name.as_str(), s))
            .collect();
        let (sat, model) = solver.check_sat_with_model(&vars)?;
        Ok(match sat {
            SatResult::Unsat => CheckVerdict::Valid,
            SatResult::Sat => {
                let mut cex = CexModel::new();
                if let Some(m) = model {
                    for (v, _) in &query.scalars {
                        match m.values.get(&v.name) {
                            Some(ModelValue::Int(n)) => {
                                cex.insert(v.id, Constant::Int(*n));
                            }
                            Some(ModelValue::Bool(b)) => {
                                cex.insert(v.id, Constant::Bool(*b));
                            }
                            None => {}
                        }
                    }
                }
                CheckVerdict::CounterModel(cex)
            }
            SatResult::Unknown(reason) => CheckVerdict::Inconclusive(reason),
        })
    })();
    match step {
        Ok(v) => v,
        Err(e) => CheckVerdict::Inconclusive(e.to_string()),
    }
}

/// Select-first combinator: whichever check resolves first with a
/// definite verdict wins; the loser's result is discarded. Both checks
/// carry their own deadlines, so the enclosing scope is bounded.
fn race_checks<'env, F, G>(bounded: F, unbounded: G, timeout: Duration) -> CheckVerdict
where
    F: FnOnce() -> CheckVerdict + Send + 'env,
    G: FnOnce() -> CheckVerdict + Send + 'env,
{
    std::thread::scope(|s| {
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        s.spawn(move || {
            let _ = tx.send(bounded());
        });
        s.spawn(move || {
            let _ = tx2.send(unbounded());
        });
        let deadline = Instant::now() + timeout;
        let mut fallback: Option<CheckVerdict> = None;
        for _ in 0..2 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(CheckVerdict::Inconclusive(reason)) => {
                    fallback = Some(CheckVerdict::Inconclusive(reason));
                }
                Ok(verdict) => return verdict,
                Err(_) => break,
            }
        }
        fallback.unwrap_or_else(|| CheckVerdict::Inconclusive("lemma race timed out".into()))
    })
}

/// Ground sample values used by the bounded instantiation.
const INT_SAMPLES: [i64; 3] = [0, 1, -1];
/// ADT instantiation depth for the bounded check.
const SAMPLE_DEPTH: usize = 3;
/// Cap on harvested sample valuations per term.
const MAX_SAMPLES: usize = 12;

/// Ground terms of an ADT type, smallest first, int leaves drawn from
/// the sample pool.
fn ground_terms(ctx: &mut Context, ty: &RType, budget: usize) -> Vec<Term> {
    let mut out = Vec::new();
    let mut frontier = vec![Term::var(ctx.fresh_var("w", ty.clone()))];
    for _ in 0..SAMPLE_DEPTH {
        let mut next = Vec::new();
        for t in frontier.drain(..) {
            for child in sifaka_ir::expand::expand_once(ctx, &t) {
                if child == t {
                    continue;
                }
                if child
                    .free_variables()
                    .iter()
                    .all(|v| !matches!(v.ty, RType::Named(_, _)))
                {
                    if out.len() < budget {
                        out.push(child.clone());
                    }
                } else {
                    next.push(child);
                }
            }
        }
        frontier = next;
        if out.len() >= budget {
            break;
        }
    }
    // Close over remaining int variables with the first sample value.
    out.into_iter()
        .map(|t| {
            let mut subst = VarSubst::new();
            for v in t.free_variables() {
                subst.bind(&v, sample_const(&v.ty, 0));
            }
            subst.apply(&t)
        })
        .collect()
}

fn sample_const(ty: &RType, which: usize) -> Term {
    match ty {
        RType::Bool => Term::bool_(which % 2 == 0),
        _ => Term::int(INT_SAMPLES[which % INT_SAMPLES.len()]),
    }
}

/// Harvest positive examples: reachable scalar valuations from ground
/// instantiations of the term's recursive subterms, filtered by TInv.
fn harvest_positives(
    ctx: &mut Context,
    problem: &ProblemDefn,
    detail: &TermDetail,
    opts: &EngineOptions,
) -> Vec<CexModel> {
    let mut out = Vec::new();
    if detail.recurs_elim.is_empty() {
        return out;
    }
    // One ground pool per recursion variable, keyed by its type.
    let pools: Vec<Vec<Term>> = detail
        .recurs_elim
        .iter()
        .map(|(ti, _)| ground_terms(ctx, &ti.ty, MAX_SAMPLES))
        .collect();
    if pools.iter().any(|p| p.is_empty()) {
        return out;
    }
    for k in 0..MAX_SAMPLES {
        // Rotate through the pools so combinations vary.
        let choice: Vec<&Term> = pools
            .iter()
            .enumerate()
            .map(|(i, p)| &p[(k + i) % p.len()])
            .collect();

        // Instantiate the whole representative for the TInv filter.
        let mut subst = VarSubst::new();
        for ((ti, _), g) in detail.recurs_elim.iter().zip(&choice) {
            if let Some(v) = ti.as_var() {
                subst.bind(v, (*g).clone());
            }
        }
        let partially = subst.apply(&detail.term);
        let mut close = VarSubst::new();
        for v in partially.free_variables() {
            close.bind(&v, sample_const(&v.ty, k));
        }
        let instance = close.apply(&partially);
        if let Some(inv) = &problem.tinv {
            let holds = Reducer::new(vec![inv])
                .with_limit(opts.reduction_limit)
                .reduce(&inv.apply_main(instance.clone()));
            if simplify(&holds.term).as_const_bool() != Some(true) {
                continue;
            }
        }

        let mut model = CexModel::new();
        let mut ok = true;
        for ((_, vi), g) in detail.recurs_elim.iter().zip(&choice) {
            let value = Reducer::new(vec![&problem.reference, &problem.repr])
                .with_limit(opts.reduction_limit)
                .reduce(&problem.spec_of((*g).clone()));
            let folded = simplify(&value.term);
            match (&vi.ty, folded.as_const_int(), folded.as_const_bool()) {
                (RType::Bool, _, Some(b)) => {
                    model.insert(vi.id, Constant::Bool(b));
                }
                (_, Some(n), _) => {
                    model.insert(vi.id, Constant::Int(n));
                }
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        if ok && !model.is_empty() && !out.contains(&model) {
            out.push(model);
        }
    }
    out
}

/// Evaluate the candidate over harvested samples: any reachable
/// valuation where it fails is a countermodel.
fn bounded_check(lemma: &Term, scalars: &[Variable], samples: &[CexModel]) -> CheckVerdict {
    if samples.is_empty() {
        return CheckVerdict::Inconclusive("no ground samples".into());
    }
    for sample in samples {
        let mut subst = VarSubst::new();
        for v in scalars {
            let value = match sample.get(&v.id) {
                Some(Constant::Int(n)) => Term::int(*n),
                Some(Constant::Bool(b)) => Term::bool_(*b),
                _ => continue,
            };
            subst.bind(v, value);
        }
        match simplify(&subst.apply(lemma)).as_const_bool() {
            Some(true) => {}
            Some(false) => return CheckVerdict::CounterModel(sample.clone()),
            None => return CheckVerdict::Inconclusive("open lemma instance".into()),
        }
    }
    CheckVerdict::Valid
}

/// Build the unbounded obligation for one term's candidate.
fn unbounded_query(
    ctx: &mut Context,
    problem: &ProblemDefn,
    detail: &TermDetail,
    lemma: &Term,
    opts: &EngineOptions,
) -> Result<UnboundedQuery, LemmaError> {
    let datatypes = datatype_decls(ctx.registry())?;
    let mut functions = Vec::new();
    let mut fresh = |ty: &RType| ctx.fresh_var("scrut", ty.clone());
    for scheme in [&problem.reference, &problem.repr]
        .into_iter()
        .chain(problem.tinv.as_ref())
    {
        for f in scheme.func_of_pmrs(&mut fresh) {
            functions.push(encode_funcdef(&f)?);
        }
    }

    let mut consts = Vec::new();
    for v in detail.term.free_variables() {
        consts.push((v.name.clone(), sort_of_type(&v.ty)?));
    }
    let mut scalars = Vec::new();
    for v in &detail.scalars {
        let sort = sort_of_type(&v.ty)?;
        consts.push((v.name.clone(), sort.clone()));
        scalars.push((v.clone(), sort));
    }

    let mut assertions = Vec::new();
    for (ti, vi) in &detail.recurs_elim {
        let call = encode_term(&problem.spec_of(ti.clone()))?;
        assertions.push(SmtTerm::var(vi.name.clone()).eq(call));
    }
    if let Some(inv) = &problem.tinv {
        let applied = inv.apply_main(detail.term.clone());
        assertions.push(encode_term(&applied)?);
    }
    if let Some(pre) = &detail.precond {
        assertions.push(encode_term(pre)?);
    }

    Ok(UnboundedQuery {
        datatypes,
        functions,
        consts,
        assertions,
        neg_lemma: encode_term(lemma)?.not(),
        scalars,
        tlimit_ms: opts.induction_proof_tlimit_ms,
        choice: opts.solver,
    })
}

/// Conflicting positive and negative valuations certify
/// unrealizability.
fn overlap(positives: &[CexModel], negatives: &[CexModel]) -> bool {
    positives.iter().any(|p| negatives.contains(p))
}

/// One full lemma-refinement pass over the terms holding
/// counterexamples.
pub fn refine_lemmas(
    ctx: &mut Context,
    problem: &ProblemDefn,
    state: &mut TermStateMap,
    opts: &EngineOptions,
    solver: &dyn LemmaSolver,
) -> Result<LemmaOutcome, LemmaError> {
    let keys: Vec<Term> = state
        .iter()
        .filter(|d| !d.positives.is_empty() || !d.negatives.is_empty())
        .map(|d| d.term.clone())
        .collect();
    if keys.is_empty() {
        return Ok(LemmaOutcome::Exhausted);
    }

    let mut accepted_any = false;
    for term in &keys {
        // Seed reachable positives once per term.
        let harvested = {
            let detail = state.get(term).expect("listed above").clone();
            if detail.positives.is_empty() {
                harvest_positives(ctx, problem, &detail, opts)
            } else {
                Vec::new()
            }
        };
        if !harvested.is_empty() {
            let detail = state.get_mut(term).expect("listed above");
            detail.positives.extend(harvested);
        }

        for attempt in 0..opts.max_lemma_attempts {
            let detail = state.get(term).expect("listed above").clone();
            if overlap(&detail.positives, &detail.negatives) {
                let names: Vec<(u32, String)> = detail
                    .scalars
                    .iter()
                    .map(|v| (v.id, v.name.clone()))
                    .collect();
                info!(term = %term, "counterexample sets overlap: unrealizability certificate");
                return Ok(LemmaOutcome::Unrealizable(vec![
                    UnrealizabilityWitness::new(
                        term,
                        &names,
                        &detail.positives,
                        &detail.negatives,
                    ),
                ]));
            }
            if detail.scalars.is_empty() {
                break;
            }

            let candidate =
                solver.synthesize(&detail.scalars, &detail.positives, &detail.negatives)?;
            let Some(candidate) = candidate else {
                debug!(term = %term, attempt, "lemma synthesis gave up");
                break;
            };
            state.get_mut(term).expect("listed above").lemma_candidate =
                Some(candidate.clone());

            let samples: Vec<CexModel> = {
                let detail = state.get(term).expect("listed above").clone();
                let mut s = harvest_positives(ctx, problem, &detail, opts);
                s.extend(detail.positives.iter().cloned());
                s
            };
            let query = {
                let detail = state.get(term).expect("listed above").clone();
                unbounded_query(ctx, problem, &detail, &candidate, opts)?
            };
            let scalars = {
                let detail = state.get(term).expect("listed above");
                detail.scalars.clone()
            };

            let lemma_for_race = candidate.clone();
            let verdict = race_checks(
                move || bounded_check(&lemma_for_race, &scalars, &samples),
                || solver.prove(&query),
                Duration::from_millis(opts.wait_parallel_tlimit_ms),
            );
            match verdict {
                CheckVerdict::Valid => {
                    info!(term = %term, lemma = %candidate, "lemma accepted");
                    state.get_mut(term).expect("listed above").accept_lemma(candidate);
                    accepted_any = true;
                    break;
                }
                CheckVerdict::CounterModel(model) => {
                    debug!(term = %term, "countermodel feeds a new positive example");
                    state
                        .get_mut(term)
                        .expect("listed above")
                        .positives
                        .push(model);
                }
                CheckVerdict::Inconclusive(reason) => {
                    debug!(term = %term, %reason, attempt, "lemma check inconclusive");
                }
            }
        }
    }

    if accepted_any {
        Ok(LemmaOutcome::Progress)
    } else {
        Ok(LemmaOutcome::Exhausted)
    }
}
