//! The refinement loop.
//!
//! States: Init, BuildEqs, Solve, Verify, LemmaSynth, Lift, Done. The
//! loop derives equations for the current representative set, tries the
//! solver-free deduction first, falls back to SyGuS, verifies candidates
//! by bounded expansion, absorbs counterexamples, and routes
//! infeasibility through lemma synthesis and lifting. Resource-bound
//! breaches downgrade the answer to Unknown; the one-shot retry after
//! `Incorrect_assumptions` restarts with the optimizations cleared.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{info, warn};

use sifaka_ir::context::Context;
use sifaka_ir::expand::expand_loop;
use sifaka_ir::mgt::most_general_terms;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::reduce::Definition;
use sifaka_ir::terms::{replace, Term, Variable};

use crate::config::EngineOptions;
use crate::deduction::{self, Deduced};
use crate::encode::{datatype_decls, EncodeError};
use crate::equations::{self, Equation, EquationSystem};
use crate::grammar::GrammarConfig;
use crate::lemmas::{refine_lemmas, LemmaOutcome, LemmaSolver, PortLemmaSolver};
use crate::lift::LiftState;
use crate::result::{HoleSolution, SolveStats, SynthResult, UnrealizabilityWitness};
use crate::state::TermStateMap;
use crate::synthesis::{self, SynthesisError, SynthesisOutcome};
use crate::verify::{self, CounterexampleOracle, SmtOracle, VerifyError, VerifyOutcome};

/// Abstraction over the SyGuS invocation so the loop can be driven
/// without solver binaries.
pub trait SynthesisPort {
    fn solve(
        &mut self,
        ctx: &mut Context,
        problem: &ProblemDefn,
        system: &EquationSystem,
        guesses: &HashMap<u32, Term>,
        grammar_cfg: &GrammarConfig,
        opts: &EngineOptions,
    ) -> Result<SynthesisOutcome, SynthesisError>;
}

/// The production port: translate and run cvc5 in SyGuS mode.
pub struct SygusSynthesisPort;

impl SynthesisPort for SygusSynthesisPort {
    fn solve(
        &mut self,
        ctx: &mut Context,
        problem: &ProblemDefn,
        system: &EquationSystem,
        guesses: &HashMap<u32, Term>,
        grammar_cfg: &GrammarConfig,
        opts: &EngineOptions,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        synthesis::solve_system(ctx, problem, system, guesses, grammar_cfg, opts)
    }
}

/// The loop's external collaborators.
pub struct Ports {
    pub synthesis: Box<dyn SynthesisPort>,
    pub oracle: Box<dyn CounterexampleOracle>,
    pub lemmas: Box<dyn LemmaSolver>,
}

impl Ports {
    /// Solver-backed ports for one solve.
    pub fn production(
        ctx: &Context,
        opts: &EngineOptions,
    ) -> Result<Self, EncodeError> {
        Ok(Self {
            synthesis: Box::new(SygusSynthesisPort),
            oracle: Box::new(SmtOracle {
                choice: opts.solver,
                timeout_ms: opts.induction_proof_tlimit_ms,
                datatypes: datatype_decls(ctx.registry())?,
            }),
            lemmas: Box::new(PortLemmaSolver {
                sygus_timeout_ms: opts.sygus_timeout_ms,
            }),
        })
    }
}

/// Result plus statistics of one solve.
#[derive(Debug)]
pub struct SolveOutcome {
    pub result: SynthResult,
    pub stats: SolveStats,
}

/// Solve one problem to completion.
pub fn solve(
    ctx: &mut Context,
    problem: &ProblemDefn,
    options: &EngineOptions,
    ports: &mut Ports,
) -> SolveOutcome {
    let started = Instant::now();
    let mut stats = SolveStats::default();
    let mut opts = options.clone();
    let mut retried = false;

    let result = 'restart: loop {
        let mut state = TermStateMap::new();
        let mut lift = LiftState::new();
        let mut guesses: HashMap<u32, Term> = HashMap::new();
        let mut assumptions: Vec<Equation> = Vec::new();

        // Init: T, U from the most general terms (or a bare variable).
        let seeds = if opts.simple_init {
            vec![Term::var(ctx.fresh_var("u", problem.theta().clone()))]
        } else {
            most_general_terms(
                ctx,
                &problem.target,
                opts.expand_depth.max(2),
                opts.reduction_limit,
            )
        };
        let init = expand_loop(
            ctx,
            &problem.target,
            &seeds,
            opts.expand_depth,
            opts.expand_cut,
            opts.reduction_limit,
        );
        let mut t_set = init.mr;
        let mut u_set = init.frontier;
        info!(t = t_set.len(), u = u_set.len(), "initialized representative sets");

        loop {
            // BuildEqs.
            stats.refinement_steps += 1;
            if stats.refinement_steps > opts.max_refinement_steps {
                break 'restart SynthResult::Unknown {
                    reason: "refinement step budget exhausted".into(),
                };
            }
            let mut system = equations::make(ctx, problem, &mut state, &t_set, &opts);
            stats.equations_dropped += system.dropped;
            if opts.assume_partial_correctness {
                system.equations.extend(assumptions.iter().cloned());
            }
            info!(
                step = stats.refinement_steps,
                equations = system.len(),
                dropped = system.dropped,
                "equations built"
            );

            // Solve: deduction first, then the SyGuS port.
            let mut candidate: Option<Vec<Definition>> = None;
            let mut via_deduction = false;
            let oracle = ports.oracle.as_mut();
            let deduced = deduction::attempt(ctx, problem, &system, |a, b, vars| {
                matches!(oracle.refute(vars, None, a, b), Ok(None))
            });
            match deduced {
                Deduced::Solutions(defs) => {
                    stats.cache_hits += 1;
                    via_deduction = true;
                    candidate = Some(defs);
                }
                Deduced::Skeletons(shapes) => {
                    guesses.extend(shapes);
                }
                Deduced::Nothing => {}
            }

            let mut infeasible_path = false;
            if candidate.is_none() {
                stats.sygus_calls += 1;
                match ports
                    .synthesis
                    .solve(ctx, problem, &system, &guesses, lift.grammar(), &opts)
                {
                    Ok(SynthesisOutcome::Solutions(defs)) => candidate = Some(defs),
                    Ok(SynthesisOutcome::Infeasible) => {
                        if opts.assume_partial_correctness && !assumptions.is_empty() && !retried
                        {
                            // The infeasibility may be an artifact of the
                            // carried assumptions, not of the problem.
                            warn!("infeasible under assumptions: retrying weakened");
                            retried = true;
                            opts = opts.weakened();
                            continue 'restart;
                        }
                        info!("synthesizer reported infeasibility");
                        infeasible_path = true;
                    }
                    Ok(SynthesisOutcome::Failure(reason)) => {
                        warn!(%reason, "synthesis attempt failed");
                    }
                    Err(e) => {
                        break 'restart SynthResult::Unknown {
                            reason: format!("synthesis port error: {e}"),
                        };
                    }
                }
            }

            if let Some(defs) = candidate {
                // Verify.
                stats.smt_calls += 1;
                let vstart = Instant::now();
                let assumptions_active =
                    opts.assume_partial_correctness && !assumptions.is_empty();
                let verdict = verify::check(
                    ctx,
                    problem,
                    &mut state,
                    &defs,
                    &t_set,
                    &u_set,
                    assumptions_active,
                    &opts,
                    ports.oracle.as_mut(),
                );
                stats.verification_ms += vstart.elapsed().as_millis();
                match verdict {
                    Ok(VerifyOutcome::Correct) => {
                        break 'restart SynthResult::Realizable {
                            solutions: defs.iter().map(HoleSolution::of_definition).collect(),
                        };
                    }
                    Ok(VerifyOutcome::Ctexs { new_t, new_u }) => {
                        absorb(&mut t_set, new_t);
                        absorb(&mut u_set, new_u);
                        if via_deduction && opts.assume_partial_correctness {
                            assumptions = definitional_equations(&defs);
                        }
                        if via_deduction && opts.use_syntactic_definitions {
                            for def in &defs {
                                guesses.insert(def.var.id, as_guess(def));
                            }
                        }
                        continue;
                    }
                    Ok(VerifyOutcome::IncorrectAssumptions) => {
                        if retried {
                            break 'restart SynthResult::Failed {
                                reason: "assumptions remained inconsistent after the retry"
                                    .into(),
                            };
                        }
                        warn!("over-constrained assumptions: retrying with optimizations off");
                        retried = true;
                        opts = opts.weakened();
                        continue 'restart;
                    }
                    Err(VerifyError::Resource(reason)) | Err(VerifyError::Oracle(reason)) => {
                        break 'restart SynthResult::Unknown { reason };
                    }
                }
            }

            // LemmaSynth.
            match refine_lemmas(ctx, problem, &mut state, &opts, ports.lemmas.as_ref()) {
                Ok(LemmaOutcome::Progress) => {
                    stats.lemmas_accepted += 1;
                    continue;
                }
                Ok(LemmaOutcome::Unrealizable(witnesses)) => {
                    if lift.can_lift(&opts) {
                        lift.widen();
                        info!(attempt = lift.attempts, "lifting the synthesis domain");
                        continue;
                    }
                    break 'restart SynthResult::Unrealizable { witnesses };
                }
                Ok(LemmaOutcome::Exhausted) => {
                    if infeasible_path {
                        // The infeasibility stands: report it with the
                        // current counterexample sets as witnesses.
                        break 'restart SynthResult::Unrealizable {
                            witnesses: system_witnesses(&system, &state),
                        };
                    }
                    break 'restart SynthResult::Unknown {
                        reason: "lemma synthesis made no progress".into(),
                    };
                }
                Err(e) => {
                    break 'restart SynthResult::Unknown {
                        reason: format!("lemma port error: {e}"),
                    };
                }
            }
        }
    };

    stats.elapsed_ms = started.elapsed().as_millis();
    SolveOutcome { result, stats }
}

/// Merge while preserving insertion order and uniqueness, so re-runs
/// emit identical synthesis queries.
fn absorb(into: &mut Vec<Term>, new: Vec<Term>) {
    for t in new {
        if !into.iter().any(|u| u == &t) {
            into.push(t);
        }
    }
}

/// Definitional equations `body = ξ(x…)` carried as assumptions.
fn definitional_equations(defs: &[Definition]) -> Vec<Equation> {
    defs.iter()
        .map(|def| {
            let formals: Vec<Term> = def.args.iter().cloned().map(Term::var).collect();
            let rhs = if formals.is_empty() {
                Term::var(def.var.clone())
            } else {
                Term::app(Term::var(def.var.clone()), formals, def.body.ty.clone())
            };
            Equation {
                term: Term::var(def.var.clone()),
                precond: None,
                lhs: def.body.clone(),
                rhs,
            }
        })
        .collect()
}

/// Turn a previous candidate body into a grammar guess: formals become
/// positional boxes.
fn as_guess(def: &Definition) -> Term {
    let mut out = def.body.clone();
    for (i, arg) in def.args.iter().enumerate() {
        out = replace(
            &out,
            &Term::var(arg.clone()),
            &Term::boxed(sifaka_ir::terms::BoxKind::Pos(i), arg.ty.clone()),
        );
    }
    out
}

/// Witnesses for a standing infeasibility: every representative with its
/// accumulated example sets.
fn system_witnesses(system: &EquationSystem, state: &TermStateMap) -> Vec<UnrealizabilityWitness> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for eq in &system.equations {
        let key = eq.term.to_string();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        let (names, pos, neg): (Vec<(u32, String)>, _, _) = match state.get(&eq.term) {
            Some(d) => (
                d.scalars.iter().map(|v: &Variable| (v.id, v.name.clone())).collect(),
                d.positives.clone(),
                d.negatives.clone(),
            ),
            None => (Vec::new(), Vec::new(), Vec::new()),
        };
        out.push(UnrealizabilityWitness::new(&eq.term, &names, &pos, &neg));
    }
    out
}
