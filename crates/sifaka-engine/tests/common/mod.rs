//! Shared fixtures for the engine integration tests: solver-free ports
//! and problem builders.

// Not every integration binary uses every fixture.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use sifaka_engine::config::EngineOptions;
use sifaka_engine::equations::EquationSystem;
use sifaka_engine::grammar::GrammarConfig;
use sifaka_engine::lemmas::{CheckVerdict, LemmaError, LemmaSolver, UnboundedQuery};
use sifaka_engine::pipeline::{Ports, SynthesisPort};
use sifaka_engine::state::CexModel;
use sifaka_engine::synthesis::{SynthesisError, SynthesisOutcome};
use sifaka_engine::verify::{CounterexampleOracle, VerifyError};
use sifaka_ir::context::Context;
use sifaka_ir::lowering::lower_program;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::terms::{simplify, Binop, Constant, Term, VarSubst, Variable};
use sifaka_ir::types::RType;

/// Decide equalities by evaluating both sides on a sample grid; a
/// differing point is a genuine counterexample, agreement everywhere is
/// treated as equality (sound for the linear fixtures here).
pub struct EvalOracle;

impl EvalOracle {
    fn eval(term: &Term, vars: &[Variable], point: &[i64]) -> Option<Term> {
        let mut subst = VarSubst::new();
        for (v, value) in vars.iter().zip(point) {
            let t = match v.ty {
                RType::Bool => Term::bool_(*value != 0),
                _ => Term::int(*value),
            };
            subst.bind(v, t);
        }
        let folded = simplify(&subst.apply(term));
        folded.free_variables().is_empty().then_some(folded)
    }
}

impl CounterexampleOracle for EvalOracle {
    fn refute(
        &mut self,
        vars: &[Variable],
        precond: Option<&Term>,
        lhs: &Term,
        rhs: &Term,
    ) -> Result<Option<CexModel>, VerifyError> {
        const SAMPLES: [i64; 4] = [0, 1, -1, 2];
        let arity = vars.len();
        let combos = SAMPLES.len().pow(arity.min(3) as u32).min(64);
        for k in 0..combos.max(1) {
            let mut point = Vec::with_capacity(arity);
            let mut idx = k;
            for _ in 0..arity {
                point.push(SAMPLES[idx % SAMPLES.len()]);
                idx /= SAMPLES.len();
            }
            if let Some(pre) = precond {
                match Self::eval(pre, vars, &point).and_then(|t| t.as_const_bool()) {
                    Some(true) => {}
                    _ => continue,
                }
            }
            match (Self::eval(lhs, vars, &point), Self::eval(rhs, vars, &point)) {
                (Some(a), Some(b)) if a == b => {}
                (Some(_), Some(_)) => {
                    let mut m = CexModel::new();
                    for (v, value) in vars.iter().zip(&point) {
                        let c = match v.ty {
                            RType::Bool => Constant::Bool(*value != 0),
                            _ => Constant::Int(*value),
                        };
                        m.insert(v.id, c);
                    }
                    return Ok(Some(m));
                }
                _ => {
                    return Err(VerifyError::Oracle(
                        "unevaluable obligation in test oracle".into(),
                    ))
                }
            }
        }
        Ok(None)
    }
}

/// Synthesis port replaying a fixed script of outcomes.
pub struct ScriptedSynthesis {
    script: Mutex<VecDeque<SynthesisOutcome>>,
}

impl ScriptedSynthesis {
    pub fn new(outcomes: Vec<SynthesisOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
        }
    }
}

impl SynthesisPort for ScriptedSynthesis {
    fn solve(
        &mut self,
        _ctx: &mut Context,
        _problem: &ProblemDefn,
        _system: &EquationSystem,
        _guesses: &HashMap<u32, Term>,
        _grammar_cfg: &GrammarConfig,
        _opts: &EngineOptions,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        Ok(self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(SynthesisOutcome::Failure("script exhausted".into())))
    }
}

/// Lemma solver that proposes a lower bound over the first scalar (a
/// shape every harvested sample satisfies) or nothing at all.
pub struct BoundedLemma {
    pub propose: bool,
}

impl LemmaSolver for BoundedLemma {
    fn synthesize(
        &self,
        scalars: &[Variable],
        _positives: &[CexModel],
        _negatives: &[CexModel],
    ) -> Result<Option<Term>, LemmaError> {
        if !self.propose {
            return Ok(None);
        }
        let Some(v) = scalars.first() else {
            return Ok(None);
        };
        Ok(Some(Term::bin(
            Binop::Ge,
            Term::var(v.clone()),
            Term::int(-1_000_000),
        )))
    }

    fn prove(&self, _query: &UnboundedQuery) -> CheckVerdict {
        CheckVerdict::Inconclusive("stubbed induction".into())
    }
}

pub fn ports(script: Vec<SynthesisOutcome>, propose_lemmas: bool) -> Ports {
    Ports {
        synthesis: Box::new(ScriptedSynthesis::new(script)),
        oracle: Box::new(EvalOracle),
        lemmas: Box::new(BoundedLemma {
            propose: propose_lemmas,
        }),
    }
}

/// Parse and assemble a problem using the default role names.
pub fn problem_from(source: &str) -> (Context, ProblemDefn) {
    let prog = sifaka_dsl::parse(source, "fixture.pmrs").expect("fixture parses");
    let mut ctx = Context::new();
    let lowered = lower_program(&mut ctx, &prog).expect("fixture lowers");
    let problem = ProblemDefn::new(
        ctx.registry(),
        lowered.scheme("spec").expect("spec").clone(),
        lowered.scheme("target").expect("target").clone(),
        lowered.scheme("repr").expect("repr").clone(),
        lowered.scheme("tinv").cloned(),
    )
    .expect("fixture assembles");
    (ctx, problem)
}
