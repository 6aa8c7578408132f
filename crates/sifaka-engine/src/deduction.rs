//! Functional-equation solving by boxing.
//!
//! For an equation `E = ξ(a₁,…,aₙ)` the deduction loop tries to rewrite
//! E into a composition of the arguments aᵢ: each matched argument
//! occurrence is replaced by its positional box, leaving either a closed
//! body (a candidate solution, no solver needed), a partial shape with
//! free boxes (a grammar guess), or nothing. Candidates from multiple
//! equations are cross-validated: a candidate assignment must satisfy
//! every equation under reduction, or survive the equivalence check
//! through the SMT port.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use sifaka_ir::context::Context;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::reduce::{Definition, Reducer};
use sifaka_ir::terms::{replace, simplify, BoxKind, Term, TermKind, Variable};

use crate::equations::EquationSystem;

/// Step bound of the deduction loop.
const MAX_STEPS: usize = 20;
/// Occam bound: reject bodies larger than this.
const MAX_BODY_SIZE: usize = 15;
/// Bound on candidate combinations tried during cross-validation.
const MAX_COMBINATIONS: usize = 16;

/// Result of the solver-free attempt.
#[derive(Debug, Clone)]
pub enum Deduced {
    /// Every hole has a closed-form implementation satisfying the
    /// whole system.
    Solutions(Vec<Definition>),
    /// Partial shapes usable as grammar guesses, by hole id.
    Skeletons(HashMap<u32, Term>),
    /// Nothing usable; fall through to the synthesizer.
    Nothing,
}

enum BodyAttempt {
    Closed(Term),
    Partial(Term),
    Failed,
}

/// Try to deduce all holes of `problem` from `system` without invoking
/// the synthesizer.
///
/// `equiv` is consulted when two candidate bodies differ structurally
/// but the combination check cannot separate them; it should answer
/// whether the two bodies agree on all argument values (a small UNSAT
/// check through the SMT port, or `false` to be conservative).
pub fn attempt(
    ctx: &mut Context,
    problem: &ProblemDefn,
    system: &EquationSystem,
    mut equiv: impl FnMut(&Term, &Term, &[Variable]) -> bool,
) -> Deduced {
    let holes = problem.target.params.clone();
    if holes.is_empty() || system.is_empty() {
        return Deduced::Nothing;
    }

    let mut per_hole: Vec<(Variable, Vec<Variable>, Vec<Term>)> = Vec::new();
    let mut skeletons: HashMap<u32, Term> = HashMap::new();
    for hole in &holes {
        let (arg_tys, _ret) = hole.ty.uncurry();
        let formals: Vec<Variable> = arg_tys
            .iter()
            .enumerate()
            .map(|(i, ty)| ctx.named_var(&format!("x{i}"), (*ty).clone()))
            .collect();

        let mut candidates: Vec<Term> = Vec::new();
        let mut partial: Option<Term> = None;
        for eq in &system.equations {
            let Some(args) = hole_application(&eq.rhs, hole) else {
                continue;
            };
            match deduce_body(&eq.lhs, &args) {
                BodyAttempt::Closed(body) => {
                    let body = replace_boxes(&body, &formals);
                    if !candidates.contains(&body) {
                        candidates.push(body);
                    }
                }
                BodyAttempt::Partial(shape) => {
                    partial.get_or_insert(shape);
                }
                BodyAttempt::Failed => {}
            }
        }
        if candidates.is_empty() {
            if let Some(shape) = partial {
                skeletons.insert(hole.id, shape);
            }
            // A hole with no closed candidate sinks the solution path.
            per_hole.clear();
            break;
        }
        per_hole.push((hole.clone(), formals, candidates));
    }

    if per_hole.len() == holes.len() {
        if let Some(defs) = search_combinations(system, &per_hole, &mut equiv) {
            return Deduced::Solutions(defs);
        }
        // Closed candidates existed but none satisfied the system:
        // donate their shapes as guesses.
        for (hole, _, candidates) in &per_hole {
            if let Some(first) = candidates.first() {
                skeletons
                    .entry(hole.id)
                    .or_insert_with(|| boxify_free(first, &mut 0));
            }
        }
    }

    if !skeletons.is_empty() {
        Deduced::Skeletons(skeletons)
    } else {
        Deduced::Nothing
    }
}

/// Try candidate assignments in lexicographic order until one satisfies
/// every equation of the system under reduction.
fn search_combinations(
    system: &EquationSystem,
    per_hole: &[(Variable, Vec<Variable>, Vec<Term>)],
    equiv: &mut impl FnMut(&Term, &Term, &[Variable]) -> bool,
) -> Option<Vec<Definition>> {
    let total: usize = per_hole
        .iter()
        .map(|(_, _, c)| c.len())
        .try_fold(1usize, |acc, n| acc.checked_mul(n))?;
    if total > MAX_COMBINATIONS {
        return None;
    }
    let mut indices = vec![0usize; per_hole.len()];
    for _ in 0..total {
        let defs: Vec<Definition> = per_hole
            .iter()
            .zip(&indices)
            .map(|((hole, formals, candidates), &i)| Definition {
                var: hole.clone(),
                args: formals.clone(),
                body: candidates[i].clone(),
            })
            .collect();
        if satisfies_system(system, &defs) {
            debug!(holes = defs.len(), "deduction found a satisfying assignment");
            return Some(defs);
        }
        // Next combination.
        for (slot, (_, _, candidates)) in indices.iter_mut().zip(per_hole) {
            *slot += 1;
            if *slot < candidates.len() {
                break;
            }
            *slot = 0;
        }
    }
    // Structural search failed; as a last resort accept a hole whose
    // candidates are pairwise equivalent according to the SMT port.
    let mut defs = Vec::new();
    for (hole, formals, candidates) in per_hole {
        let first = &candidates[0];
        for other in &candidates[1..] {
            if !equiv(first, other, formals) {
                return None;
            }
        }
        defs.push(Definition {
            var: hole.clone(),
            args: formals.clone(),
            body: first.clone(),
        });
    }
    satisfies_system(system, &defs).then_some(defs)
}

/// Every equation holds structurally once the candidate definitions are
/// substituted and both sides reduced.
fn satisfies_system(system: &EquationSystem, defs: &[Definition]) -> bool {
    let reducer = Reducer::new(vec![]).with_defs(defs);
    system.equations.iter().all(|eq| {
        let lhs = reducer.reduce(&eq.lhs);
        let rhs = reducer.reduce(&eq.rhs);
        lhs.complete && rhs.complete && simplify(&lhs.term) == simplify(&rhs.term)
    })
}

/// `rhs` is exactly an application of `hole` (or the bare hole for a
/// constant unknown): return the argument list.
fn hole_application(rhs: &Term, hole: &Variable) -> Option<Vec<Term>> {
    match &rhs.kind {
        TermKind::Var(v) if v.id == hole.id => Some(Vec::new()),
        TermKind::App(h, args) => match h.as_var() {
            Some(v) if v.id == hole.id => Some(args.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// The boxing loop: replace argument occurrences in E by positional
/// boxes, requeue arguments that did not match on first pass, and stop
/// at the step limit.
fn deduce_body(lhs: &Term, args: &[Term]) -> BodyAttempt {
    let mut expr = simplify(lhs);
    let mut queue: VecDeque<(usize, bool)> = (0..args.len()).map(|i| (i, false)).collect();
    let mut steps = 0;
    while let Some((i, requeued)) = queue.pop_front() {
        if steps >= MAX_STEPS {
            return BodyAttempt::Failed;
        }
        steps += 1;
        let arg = &args[i];
        if expr.contains(arg) {
            let boxed = Term::boxed(BoxKind::Pos(i), arg.ty.clone());
            expr = replace(&expr, arg, &boxed);
        } else if !requeued {
            queue.push_back((i, true));
        }
        // A twice-unmatched argument is simply unused by this equation.
    }

    if expr.free_variables().is_empty() {
        if expr.size() > MAX_BODY_SIZE {
            return BodyAttempt::Failed;
        }
        BodyAttempt::Closed(expr)
    } else {
        BodyAttempt::Partial(boxify_free(&expr, &mut 0))
    }
}

/// Replace free variable occurrences by indexed free boxes, giving a
/// partial shape usable as a grammar guess.
fn boxify_free(t: &Term, next: &mut u32) -> Term {
    match &t.kind {
        TermKind::Var(_) => {
            let b = Term::boxed(BoxKind::Free(*next), t.ty.clone());
            *next += 1;
            b
        }
        TermKind::Const(_) | TermKind::Boxed(_) => t.clone(),
        TermKind::Tuple(elems) => {
            Term::tuple(elems.iter().map(|e| boxify_free(e, next)).collect())
        }
        TermKind::Bin(op, a, b) => Term::bin(*op, boxify_free(a, next), boxify_free(b, next)),
        TermKind::Un(op, a) => Term::un(*op, boxify_free(a, next)),
        TermKind::Ite(c, th, el) => Term::ite(
            boxify_free(c, next),
            boxify_free(th, next),
            boxify_free(el, next),
        ),
        _ => {
            // Applications and data with embedded recursion are not
            // useful shapes; collapse to one free box.
            let b = Term::boxed(BoxKind::Free(*next), t.ty.clone());
            *next += 1;
            b
        }
    }
}

/// Swap positional boxes for the formal argument variables.
fn replace_boxes(t: &Term, formals: &[Variable]) -> Term {
    match &t.kind {
        TermKind::Boxed(BoxKind::Pos(i)) => match formals.get(*i) {
            Some(v) => Term::var(v.clone()),
            None => t.clone(),
        },
        TermKind::Const(_) | TermKind::Var(_) | TermKind::Boxed(_) => t.clone(),
        TermKind::Tuple(elems) => {
            Term::tuple(elems.iter().map(|e| replace_boxes(e, formals)).collect())
        }
        TermKind::Data(ctor, args) => Term::new(
            TermKind::Data(
                ctor.clone(),
                args.iter().map(|a| replace_boxes(a, formals)).collect(),
            ),
            t.ty.clone(),
        ),
        TermKind::Proj(s, i) => Term::new(
            TermKind::Proj(Box::new(replace_boxes(s, formals)), *i),
            t.ty.clone(),
        ),
        TermKind::Un(op, a) => Term::un(*op, replace_boxes(a, formals)),
        TermKind::Bin(op, a, b) => {
            Term::bin(*op, replace_boxes(a, formals), replace_boxes(b, formals))
        }
        TermKind::Ite(c, th, el) => Term::ite(
            replace_boxes(c, formals),
            replace_boxes(th, formals),
            replace_boxes(el, formals),
        ),
        TermKind::App(h, args) => Term::new(
            TermKind::App(
                Box::new(replace_boxes(h, formals)),
                args.iter().map(|a| replace_boxes(a, formals)).collect(),
            ),
            t.ty.clone(),
        ),
        TermKind::Match(_, _) => t.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::equations;
    use crate::state::tests::list_sum_problem;
    use crate::state::TermStateMap;
    use sifaka_ir::expand::expand_loop;
    use sifaka_ir::terms::Binop;
    use sifaka_ir::types::RType;

    fn never_equiv(_: &Term, _: &Term, _: &[Variable]) -> bool {
        false
    }

    #[test]
    fn deduces_list_sum_holes_without_a_solver() {
        let (mut ctx, problem) = list_sum_problem();
        let seed = Term::var(ctx.fresh_var("u", RType::named("list")));
        let exp = expand_loop(&mut ctx, &problem.target, &[seed], 3, 100, 100);
        let mut state = TermStateMap::new();
        let opts = EngineOptions::default();
        let mut system = equations::make(&mut ctx, &problem, &mut state, &exp.mr, &opts);
        // Open-tail representative so the join equation shares a scalar.
        let list = RType::named("list");
        let tail = ctx.fresh_var("l", list.clone());
        let e = ctx.fresh_var("e", RType::Int);
        let open = Term::data("Cons", vec![Term::var(e), Term::var(tail)], list);
        let mut more = equations::make(&mut ctx, &problem, &mut state, &[open], &opts);
        system.equations.append(&mut more.equations);

        match attempt(&mut ctx, &problem, &system, never_equiv) {
            Deduced::Solutions(defs) => {
                assert_eq!(defs.len(), 2);
                let f0 = defs.iter().find(|d| d.var.name == "f0").unwrap();
                assert_eq!(f0.body, Term::int(0));
                let join = defs.iter().find(|d| d.var.name == "join").unwrap();
                assert_eq!(join.args.len(), 2);
                assert_eq!(
                    join.body,
                    Term::bin(
                        Binop::Plus,
                        Term::var(join.args[0].clone()),
                        Term::var(join.args[1].clone())
                    )
                );
            }
            other => panic!("expected closed-form deduction, got {other:?}"),
        }
    }

    #[test]
    fn contradictory_candidates_fail() {
        let (mut ctx, problem) = list_sum_problem();
        let f0 = problem.target.params[0].clone();
        let join = problem.target.params[1].clone();
        let a = ctx.fresh_var("a", RType::Int);
        let b = ctx.fresh_var("b", RType::Int);
        let mk_f0 = |n: i64| crate::equations::Equation {
            term: Term::int(0),
            precond: None,
            lhs: Term::int(n),
            rhs: Term::var(f0.clone()),
        };
        let join_eq = crate::equations::Equation {
            term: Term::int(0),
            precond: None,
            lhs: Term::bin(Binop::Plus, Term::var(a.clone()), Term::var(b.clone())),
            rhs: Term::app(
                Term::var(join),
                vec![Term::var(a), Term::var(b)],
                RType::Int,
            ),
        };
        let system = EquationSystem {
            equations: vec![mk_f0(0), mk_f0(1), join_eq],
            dropped: 0,
        };
        match attempt(&mut ctx, &problem, &system, never_equiv) {
            Deduced::Solutions(defs) => panic!("0 = f0 and 1 = f0 both satisfied: {defs:?}"),
            Deduced::Skeletons(_) | Deduced::Nothing => {}
        }
    }

    #[test]
    fn oversized_bodies_are_rejected_by_occam() {
        let (mut ctx, problem) = list_sum_problem();
        let f0 = problem.target.params[0].clone();
        let mut big = Term::int(1);
        for _ in 0..10 {
            big = Term::bin(Binop::Plus, big, Term::var(ctx.fresh_var("k", RType::Int)));
        }
        // Constant-fold-proof oversized body: distinct variables cannot
        // collapse, and none of them are arguments.
        let system = EquationSystem {
            equations: vec![crate::equations::Equation {
                term: Term::int(0),
                precond: None,
                lhs: big,
                rhs: Term::var(f0),
            }],
            dropped: 0,
        };
        match attempt(&mut ctx, &problem, &system, never_equiv) {
            Deduced::Solutions(_) => panic!("oversized body must not become a solution"),
            Deduced::Skeletons(_) | Deduced::Nothing => {}
        }
    }

    #[test]
    fn unmatched_scalars_produce_a_skeleton_guess() {
        let (mut ctx, problem) = list_sum_problem();
        let join = problem.target.params[1].clone();
        let a = ctx.fresh_var("a", RType::Int);
        let b = ctx.fresh_var("b", RType::Int);
        let stray = ctx.fresh_var("s", RType::Int);
        let lhs = Term::bin(
            Binop::Plus,
            Term::var(a.clone()),
            Term::bin(Binop::Times, Term::int(2), Term::var(stray)),
        );
        let rhs = Term::app(
            Term::var(join),
            vec![Term::var(a), Term::var(b)],
            RType::Int,
        );
        let system = EquationSystem {
            equations: vec![crate::equations::Equation {
                term: Term::int(0),
                precond: None,
                lhs,
                rhs,
            }],
            dropped: 0,
        };
        match attempt(&mut ctx, &problem, &system, never_equiv) {
            Deduced::Skeletons(guesses) => {
                let shape = guesses.values().next().unwrap();
                assert!(shape
                    .subterms()
                    .iter()
                    .any(|s| matches!(s.kind, TermKind::Boxed(BoxKind::Free(_)))));
                assert!(shape
                    .subterms()
                    .iter()
                    .any(|s| matches!(s.kind, TermKind::Boxed(BoxKind::Pos(0)))));
            }
            other => panic!("expected a skeleton guess, got {other:?}"),
        }
    }

    #[test]
    fn under_general_candidate_is_rejected_by_the_system_check() {
        // e = join e f0 alone admits join = x0; the open-tail equation
        // separates it from join = x0 + x1.
        let (mut ctx, problem) = list_sum_problem();
        let f0 = problem.target.params[0].clone();
        let join = problem.target.params[1].clone();
        let e = ctx.fresh_var("e", RType::Int);
        let v = ctx.fresh_var("v", RType::Int);
        let degenerate = crate::equations::Equation {
            term: Term::int(0),
            precond: None,
            lhs: Term::var(e.clone()),
            rhs: Term::app(
                Term::var(join.clone()),
                vec![Term::var(e.clone()), Term::var(f0.clone())],
                RType::Int,
            ),
        };
        let separating = crate::equations::Equation {
            term: Term::int(0),
            precond: None,
            lhs: Term::bin(Binop::Plus, Term::var(e.clone()), Term::var(v.clone())),
            rhs: Term::app(
                Term::var(join),
                vec![Term::var(e), Term::var(v)],
                RType::Int,
            ),
        };
        let zero = crate::equations::Equation {
            term: Term::int(0),
            precond: None,
            lhs: Term::int(0),
            rhs: Term::var(f0),
        };
        let system = EquationSystem {
            equations: vec![zero, degenerate, separating],
            dropped: 0,
        };
        match attempt(&mut ctx, &problem, &system, never_equiv) {
            Deduced::Solutions(defs) => {
                let join = defs.iter().find(|d| d.var.name == "join").unwrap();
                assert_eq!(
                    join.body,
                    Term::bin(
                        Binop::Plus,
                        Term::var(join.args[0].clone()),
                        Term::var(join.args[1].clone())
                    )
                );
            }
            other => panic!("expected the general candidate to win, got {other:?}"),
        }
    }
}
