//! Equation derivation.
//!
//! For each representative term t the builder reduces `reference (repr t)`
//! and `target t`, then rewrites recursive calls on the same sub-variable
//! into the shared scalar introduced by recursion elimination. Equations
//! that still apply any scheme symbol after elimination are impure (the
//! rewrite limit was hit or the representation does not distribute) and
//! are dropped with a diagnostic.

use tracing::{debug, warn};

use sifaka_ir::context::Context;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::reduce::{mentions_nonterminal, Reducer};
use sifaka_ir::terms::{replace, simplify, Term, TermKind};
use sifaka_ir::types::RType;

use crate::config::EngineOptions;
use crate::state::TermStateMap;

/// One pure first-order equation between reductions.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    /// The representative term that generated this equation.
    pub term: Term,
    /// Per-term precondition (the proven lemma conjunction), if any.
    pub precond: Option<Term>,
    pub lhs: Term,
    pub rhs: Term,
}

/// The equation system for the current T set.
#[derive(Debug, Clone, Default)]
pub struct EquationSystem {
    pub equations: Vec<Equation>,
    /// Equations dropped by the purity or completeness checks.
    pub dropped: usize,
}

impl EquationSystem {
    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }
}

/// Derive the equation system for `t_set`, in insertion order.
pub fn make(
    ctx: &mut Context,
    problem: &ProblemDefn,
    state: &mut TermStateMap,
    t_set: &[Term],
    opts: &EngineOptions,
) -> EquationSystem {
    let mut system = EquationSystem::default();
    for t in t_set {
        let (recurs_elim, precond) = {
            let detail = state.ensure(ctx, problem, t);
            (detail.recurs_elim.clone(), detail.precond.clone())
        };

        let lhs_red = Reducer::new(vec![&problem.reference, &problem.repr])
            .with_limit(opts.reduction_limit)
            .reduce(&problem.spec_of(t.clone()));
        let rhs_red = Reducer::new(vec![&problem.target])
            .with_limit(opts.reduction_limit)
            .reduce(&problem.skeleton_of(t.clone()));
        if !lhs_red.complete || !rhs_red.complete {
            warn!(term = %t, "reduction limit hit, equation dropped");
            system.dropped += 1;
            continue;
        }

        let mut lhs = lhs_red.term;
        let mut rhs = rhs_red.term;
        for (ti, vi) in &recurs_elim {
            let scalar = Term::var(vi.clone());
            lhs = replace(&lhs, &problem.spec_of(ti.clone()), &scalar);
            if !problem.repr_is_identity {
                // Also catch a call already past the representation.
                lhs = replace(&lhs, &problem.reference.apply_main(ti.clone()), &scalar);
            }
            rhs = replace(&rhs, &problem.skeleton_of(ti.clone()), &scalar);
        }

        let impure = mentions_nonterminal(&lhs, &problem.reference)
            || mentions_nonterminal(&lhs, &problem.repr)
            || mentions_nonterminal(&lhs, &problem.target)
            || mentions_nonterminal(&rhs, &problem.reference)
            || mentions_nonterminal(&rhs, &problem.repr)
            || mentions_nonterminal(&rhs, &problem.target);
        if impure {
            warn!(term = %t, "impure equation dropped after recursion elimination");
            system.dropped += 1;
            continue;
        }

        if opts.simplify_eqns {
            lhs = simplify(&lhs);
            rhs = simplify(&rhs);
        }

        for (lhs, rhs) in split_tuple_equation(lhs, rhs) {
            debug!(term = %t, %lhs, %rhs, "equation");
            system.equations.push(Equation {
                term: t.clone(),
                precond: precond.clone(),
                lhs,
                rhs,
            });
        }
    }
    system
}

/// Split an equation between two literal tuples into its components.
pub(crate) fn split_tuple_equation(lhs: Term, rhs: Term) -> Vec<(Term, Term)> {
    match (&lhs.kind, &rhs.kind) {
        (TermKind::Tuple(ls), TermKind::Tuple(rs)) if ls.len() == rs.len() => ls
            .iter()
            .cloned()
            .zip(rs.iter().cloned())
            .flat_map(|(l, r)| split_tuple_equation(l, r))
            .collect(),
        _ => vec![(lhs, rhs)],
    }
}

/// Free variables of the whole system, deduplicated in first-occurrence
/// order, split into (scalars and pattern variables, hole parameters).
pub fn system_variables(
    system: &EquationSystem,
    problem: &ProblemDefn,
) -> (Vec<sifaka_ir::terms::Variable>, Vec<sifaka_ir::terms::Variable>) {
    let mut plain = Vec::new();
    let mut holes = Vec::new();
    for eq in &system.equations {
        for side in [&eq.lhs, &eq.rhs] {
            for v in side.free_variables() {
                if problem.target.is_param(v.id) {
                    if !holes.iter().any(|w: &sifaka_ir::terms::Variable| w.id == v.id) {
                        holes.push(v);
                    }
                } else if !plain.iter().any(|w: &sifaka_ir::terms::Variable| w.id == v.id) {
                    plain.push(v);
                }
            }
        }
        if let Some(pre) = &eq.precond {
            for v in pre.free_variables() {
                if !problem.target.is_param(v.id)
                    && !plain.iter().any(|w: &sifaka_ir::terms::Variable| w.id == v.id)
                {
                    plain.push(v);
                }
            }
        }
    }
    (plain, holes)
}

/// Equation purity: neither side applies any scheme symbol.
pub fn is_pure(eq: &Equation, problem: &ProblemDefn) -> bool {
    let schemes = [&problem.reference, &problem.target, &problem.repr];
    schemes
        .iter()
        .all(|p| !mentions_nonterminal(&eq.lhs, p) && !mentions_nonterminal(&eq.rhs, p))
}

/// True when every free variable of the system has a scalar type (holes
/// aside): the system is first-order and ready for SyGuS translation.
pub fn is_first_order(system: &EquationSystem, problem: &ProblemDefn) -> bool {
    let (plain, _) = system_variables(system, problem);
    plain
        .iter()
        .all(|v| matches!(v.ty, RType::Int | RType::Bool | RType::Str | RType::Char))
}
