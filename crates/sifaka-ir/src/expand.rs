//! Bounded pointwise expansion of terms.
//!
//! Expanding a term replaces its shallowest ADT-typed variable by every
//! constructor of that type applied to fresh variables. The expansion loop
//! partitions generated terms into the maximally-reducible set T (which
//! drives equations) and the frontier U (which carries recursion and is
//! expanded next).

use crate::context::Context;
use crate::pmrs::Pmrs;
use crate::reduce::is_mr;
use crate::terms::{Term, TermKind, VarSubst, Variable};
use crate::types::RType;

/// Result of an expansion round: MR terms and the non-MR frontier.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub mr: Vec<Term>,
    pub frontier: Vec<Term>,
}

/// The variable picked for expansion: minimum depth first, then smallest
/// id, so runs are reproducible.
fn expansion_target(ctx: &Context, t: &Term) -> Option<Variable> {
    let mut best: Option<(usize, Variable)> = None;
    collect_targets(ctx, t, 0, &mut best);
    best.map(|(_, v)| v)
}

fn collect_targets(ctx: &Context, t: &Term, depth: usize, best: &mut Option<(usize, Variable)>) {
    if let TermKind::Var(v) = &t.kind {
        if let RType::Named(name, _) = &v.ty {
            if ctx.registry().type_def(name).is_some() {
                let better = match best {
                    None => true,
                    Some((d, w)) => depth < *d || (depth == *d && v.id < w.id),
                };
                if better {
                    *best = Some((depth, v.clone()));
                }
            }
        }
        return;
    }
    match &t.kind {
        TermKind::Tuple(elems) | TermKind::Data(_, elems) => {
            for e in elems {
                collect_targets(ctx, e, depth + 1, best);
            }
        }
        TermKind::Proj(s, _) | TermKind::Un(_, s) => collect_targets(ctx, s, depth + 1, best),
        TermKind::Bin(_, a, b) => {
            collect_targets(ctx, a, depth + 1, best);
            collect_targets(ctx, b, depth + 1, best);
        }
        TermKind::Ite(c, th, el) => {
            collect_targets(ctx, c, depth + 1, best);
            collect_targets(ctx, th, depth + 1, best);
            collect_targets(ctx, el, depth + 1, best);
        }
        TermKind::App(h, args) => {
            collect_targets(ctx, h, depth + 1, best);
            for a in args {
                collect_targets(ctx, a, depth + 1, best);
            }
        }
        TermKind::Match(s, cases) => {
            collect_targets(ctx, s, depth + 1, best);
            for c in cases {
                collect_targets(ctx, &c.body, depth + 1, best);
            }
        }
        _ => {}
    }
}

/// One-step expansion: every constructor instantiation of the shallowest
/// ADT variable, in constructor declaration order. Returns the singleton
/// `[t]` untouched when no variable is expandable.
pub fn expand_once(ctx: &mut Context, t: &Term) -> Vec<Term> {
    let Some(target) = expansion_target(ctx, t) else {
        return vec![t.clone()];
    };
    let RType::Named(ty_name, _) = &target.ty else {
        return vec![t.clone()];
    };
    let Some(def) = ctx.registry().type_def(ty_name) else {
        return vec![t.clone()];
    };
    let variants: Vec<(String, usize)> = def
        .variants
        .iter()
        .map(|v| (v.name.clone(), v.args.len()))
        .collect();
    let mut out = Vec::with_capacity(variants.len());
    for (ctor, _) in variants {
        let payload = ctx
            .registry()
            .variant_payload(&ctor, &target.ty)
            .expect("registered variant has a payload");
        let args: Vec<Term> = payload
            .into_iter()
            .map(|ty| Term::var(ctx.fresh_var("e", ty)))
            .collect();
        let data = Term::data(ctor, args, target.ty.clone());
        let mut s = VarSubst::new();
        s.bind(&target, data);
        out.push(s.apply(t));
    }
    out
}

/// Partition the one-step expansions of `t` by maximal reducibility
/// under `p`.
pub fn to_maximally_reducible(
    ctx: &mut Context,
    p: &Pmrs,
    t: &Term,
    reduction_limit: usize,
) -> Expansion {
    let mut out = Expansion::default();
    for e in expand_once(ctx, t) {
        if is_mr(p, &e, reduction_limit) {
            out.mr.push(e);
        } else {
            out.frontier.push(e);
        }
    }
    out
}

/// True when every term of `set` is maximally reducible under `p`.
pub fn is_mr_all(p: &Pmrs, set: &[Term], reduction_limit: usize) -> bool {
    set.iter().all(|t| is_mr(p, t, reduction_limit))
}

/// Iterated expansion with a depth cutoff and a cumulative term-count
/// cutoff. Seeds that are already MR land in T unexpanded.
pub fn expand_loop(
    ctx: &mut Context,
    p: &Pmrs,
    seeds: &[Term],
    expand_depth: usize,
    expand_cut: usize,
    reduction_limit: usize,
) -> Expansion {
    let mut acc = Expansion::default();
    let mut frontier: Vec<Term> = Vec::new();
    for s in seeds {
        if is_mr(p, s, reduction_limit) {
            acc.mr.push(s.clone());
        } else {
            frontier.push(s.clone());
        }
    }
    let mut generated = acc.mr.len() + frontier.len();
    for _ in 0..expand_depth {
        if frontier.is_empty() || generated >= expand_cut {
            break;
        }
        let mut next = Vec::new();
        for t in frontier.drain(..) {
            if generated >= expand_cut {
                next.push(t);
                continue;
            }
            let step = to_maximally_reducible(ctx, p, &t, reduction_limit);
            generated += step.mr.len() + step.frontier.len();
            acc.mr.extend(step.mr);
            next.extend(step.frontier);
        }
        frontier = next;
    }
    acc.frontier = frontier;
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmrs::tests::{list_registry, list_sum};

    fn list_var(ctx: &mut Context) -> Term {
        Term::var(ctx.fresh_var("l", RType::named("list")))
    }

    #[test]
    fn expand_once_enumerates_constructors_in_declaration_order() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let t = list_var(&mut ctx);
        let out = expand_once(&mut ctx, &t);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0].kind, TermKind::Data(c, args) if c == "Nil" && args.is_empty()));
        assert!(matches!(&out[1].kind, TermKind::Data(c, args) if c == "Cons" && args.len() == 2));
    }

    #[test]
    fn expand_once_without_adt_variables_is_identity() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let t = Term::int(3);
        assert_eq!(expand_once(&mut ctx, &t), vec![t]);
    }

    #[test]
    fn expansion_picks_shallowest_variable_first() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let list = RType::named("list");
        let deep = ctx.fresh_var("d", list.clone());
        let shallow = ctx.fresh_var("s", list.clone());
        // (Cons 1 d, s): d sits at depth 2, s at depth 1.
        let t = Term::tuple(vec![
            Term::data(
                "Cons",
                vec![Term::int(1), Term::var(deep.clone())],
                list.clone(),
            ),
            Term::var(shallow.clone()),
        ]);
        let target = expansion_target(&ctx, &t).unwrap();
        assert_eq!(target.id, shallow.id);
    }

    #[test]
    fn to_maximally_reducible_classifies_one_step_expansions() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let p = list_sum(&mut ctx);
        let t = list_var(&mut ctx);
        let exp = to_maximally_reducible(&mut ctx, &p, &t, 50);
        // Both Nil and Cons(e, l') are MR for a one-level scheme: the
        // residual call of the latter is variable-stuck.
        assert_eq!(exp.mr.len(), 2);
        assert!(exp.frontier.is_empty());
        assert!(matches!(&exp.mr[0].kind, TermKind::Data(c, _) if c == "Nil"));
        assert!(is_mr_all(&p, &exp.mr, 50));
    }

    #[test]
    fn expand_loop_stops_once_the_frontier_drains() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let p = list_sum(&mut ctx);
        let seed = list_var(&mut ctx);
        let exp = expand_loop(&mut ctx, &p, &[seed], 4, 1000, 50);
        assert_eq!(exp.mr.len(), 2);
        assert!(exp.frontier.is_empty());
    }

    #[test]
    fn deep_pattern_schemes_keep_a_frontier() {
        use crate::pmrs::{Pattern, Rule};
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        // only_nil covers Nil but not Cons, so every Cons expansion is
        // constructor-stuck and stays on the frontier.
        let list = RType::named("list");
        let main = ctx.named_var("only_nil", RType::fun(list.clone(), RType::Int));
        let p = crate::pmrs::Pmrs {
            name: "only_nil".into(),
            params: vec![],
            nonterminals: vec![main],
            main: 0,
            rules: vec![Rule {
                nt: 0,
                args: vec![],
                pattern: Some(Pattern {
                    ctor: "Nil".into(),
                    binders: vec![],
                }),
                rhs: Term::int(0),
            }],
            input_type: list,
            output_type: RType::Int,
        };
        let seed = list_var(&mut ctx);
        let exp = expand_loop(&mut ctx, &p, &[seed], 2, 1000, 50);
        assert_eq!(exp.mr, vec![Term::data("Nil", vec![], RType::named("list"))]);
        assert!(!exp.frontier.is_empty());
    }

    #[test]
    fn expand_loop_respects_count_cutoff() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let p = list_sum(&mut ctx);
        let seed = list_var(&mut ctx);
        let exp = expand_loop(&mut ctx, &p, &[seed], 10, 1, 50);
        let total = exp.mr.len() + exp.frontier.len();
        assert!(total <= 1, "cut must bound growth, got {total}");
    }
}
