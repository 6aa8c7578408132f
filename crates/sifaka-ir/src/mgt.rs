//! Most-general-term computation.
//!
//! For each hole ξ of a skeleton, the most general terms are the smallest
//! input instantiations of the main symbol whose reduction exercises a
//! rule mentioning ξ. Together they cover every potentially-exercised
//! control path of the skeleton, and they seed the refinement loop.

use std::collections::HashSet;

use crate::context::Context;
use crate::expand::expand_once;
use crate::pmrs::{Pmrs, RuleId};
use crate::reduce::{mentions_nonterminal, Reducer};
use crate::terms::{Term, TermKind};

/// Rules whose rhs applies any hole parameter.
fn hole_rules(p: &Pmrs) -> HashSet<RuleId> {
    p.rules
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.rhs.subterms().iter().any(|s| match &s.kind {
                TermKind::Var(v) => p.is_param(v.id),
                _ => false,
            })
        })
        .map(|(i, _)| i)
        .collect()
}

/// Compute the most general terms of `p`.
///
/// Breadth-first from a fresh variable of the input type: a term joins the
/// result exactly when its reduction fires a hole-mentioning rule not
/// fired by any earlier term. The search stops when all hole rules are
/// covered or the depth bound runs out.
pub fn most_general_terms(ctx: &mut Context, p: &Pmrs, max_depth: usize, limit: usize) -> Vec<Term> {
    let wanted = hole_rules(p);
    let seed = Term::var(ctx.fresh_var("u", p.input_type.clone()));
    if wanted.is_empty() {
        return vec![seed];
    }
    let mut covered: HashSet<RuleId> = HashSet::new();
    let mut result = Vec::new();
    let mut frontier = vec![seed];
    for _ in 0..=max_depth {
        if covered.len() == wanted.len() || frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for t in frontier.drain(..) {
            let red = Reducer::new(vec![p]).with_limit(limit).reduce(&p.apply_main(t.clone()));
            let fresh: Vec<RuleId> = red
                .fired
                .iter()
                .filter(|(_, r)| wanted.contains(r) && !covered.contains(r))
                .map(|(_, r)| *r)
                .collect();
            if !fresh.is_empty() {
                covered.extend(fresh);
                result.push(t.clone());
            }
            if mentions_nonterminal(&red.term, p) {
                next.extend(expand_once(ctx, &t));
            }
        }
        frontier = next;
    }
    if result.is_empty() {
        vec![Term::var(ctx.fresh_var("u", p.input_type.clone()))]
    } else {
        result
    }
}
