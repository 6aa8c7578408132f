//! Bounded reduction under one or more recursion schemes.
//!
//! Rewriting is outermost-leftmost. Each step rewrites exactly one redex:
//! a non-terminal application whose rule matches, a match form with a
//! constructor scrutinee, or an application of a supplied definition
//! (a synthesized hole body). The step limit turns nontermination into an
//! incomplete reduction that callers report upward.

use std::collections::HashMap;

use crate::pmrs::{Pmrs, RuleId};
use crate::terms::{simplify, Term, TermKind, VarSubst, Variable};

/// Outcome of a bounded reduction.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub term: Term,
    /// False when the step limit was exhausted before a normal form.
    pub complete: bool,
    pub steps: usize,
    /// Rules fired, in firing order, as (scheme index, rule id).
    pub fired: Vec<(usize, RuleId)>,
}

/// A non-PMRS definition usable during reduction: `name args = body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub var: Variable,
    pub args: Vec<Variable>,
    pub body: Term,
}

pub struct Reducer<'a> {
    schemes: Vec<&'a Pmrs>,
    defs: HashMap<u32, Definition>,
    limit: usize,
}

pub const DEFAULT_REDUCTION_LIMIT: usize = 100;

impl<'a> Reducer<'a> {
    pub fn new(schemes: Vec<&'a Pmrs>) -> Self {
        Self {
            schemes,
            defs: HashMap::new(),
            limit: DEFAULT_REDUCTION_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Add plain definitions (candidate hole implementations).
    pub fn with_defs(mut self, defs: &[Definition]) -> Self {
        for d in defs {
            self.defs.insert(d.var.id, d.clone());
        }
        self
    }

    pub fn reduce(&self, t: &Term) -> Reduction {
        let mut cur = t.clone();
        let mut fired = Vec::new();
        let mut steps = 0;
        while steps < self.limit {
            match self.rewrite_one(&cur, &mut fired) {
                Some(next) => {
                    cur = next;
                    steps += 1;
                }
                None => {
                    return Reduction {
                        term: simplify(&cur),
                        complete: true,
                        steps,
                        fired,
                    }
                }
            }
        }
        Reduction {
            term: simplify(&cur),
            complete: false,
            steps,
            fired,
        }
    }

    /// Rewrite the outermost-leftmost redex, if any.
    fn rewrite_one(&self, t: &Term, fired: &mut Vec<(usize, RuleId)>) -> Option<Term> {
        if let Some(out) = self.contract(t, fired) {
            return Some(out);
        }
        match &t.kind {
            TermKind::Const(_) | TermKind::Var(_) | TermKind::Boxed(_) => None,
            TermKind::Tuple(elems) => self
                .rewrite_first(elems, fired)
                .map(|elems| Term::new(TermKind::Tuple(elems), t.ty.clone())),
            TermKind::Data(ctor, args) => self
                .rewrite_first(args, fired)
                .map(|args| Term::new(TermKind::Data(ctor.clone(), args), t.ty.clone())),
            TermKind::Proj(s, i) => self
                .rewrite_one(s, fired)
                .map(|s| Term::new(TermKind::Proj(Box::new(s), *i), t.ty.clone())),
            TermKind::Un(op, s) => self
                .rewrite_one(s, fired)
                .map(|s| Term::new(TermKind::Un(*op, Box::new(s)), t.ty.clone())),
            TermKind::Bin(op, a, b) => {
                if let Some(a2) = self.rewrite_one(a, fired) {
                    return Some(Term::new(
                        TermKind::Bin(*op, Box::new(a2), b.clone()),
                        t.ty.clone(),
                    ));
                }
                self.rewrite_one(b, fired).map(|b2| {
                    Term::new(TermKind::Bin(*op, a.clone(), Box::new(b2)), t.ty.clone())
                })
            }
            TermKind::Ite(c, th, el) => {
                if let Some(c2) = self.rewrite_one(c, fired) {
                    return Some(Term::new(
                        TermKind::Ite(Box::new(c2), th.clone(), el.clone()),
                        t.ty.clone(),
                    ));
                }
                if let Some(t2) = self.rewrite_one(th, fired) {
                    return Some(Term::new(
                        TermKind::Ite(c.clone(), Box::new(t2), el.clone()),
                        t.ty.clone(),
                    ));
                }
                self.rewrite_one(el, fired).map(|e2| {
                    Term::new(
                        TermKind::Ite(c.clone(), th.clone(), Box::new(e2)),
                        t.ty.clone(),
                    )
                })
            }
            TermKind::App(h, args) => {
                if let Some(h2) = self.rewrite_one(h, fired) {
                    return Some(Term::new(
                        TermKind::App(Box::new(h2), args.clone()),
                        t.ty.clone(),
                    ));
                }
                self.rewrite_first(args, fired)
                    .map(|args| Term::new(TermKind::App(h.clone(), args), t.ty.clone()))
            }
            TermKind::Match(s, cases) => {
                if let Some(s2) = self.rewrite_one(s, fired) {
                    return Some(Term::new(
                        TermKind::Match(Box::new(s2), cases.clone()),
                        t.ty.clone(),
                    ));
                }
                for (i, c) in cases.iter().enumerate() {
                    if let Some(b2) = self.rewrite_one(&c.body, fired) {
                        let mut cases = cases.clone();
                        cases[i].body = b2;
                        return Some(Term::new(
                            TermKind::Match(s.clone(), cases),
                            t.ty.clone(),
                        ));
                    }
                }
                None
            }
        }
    }

    fn rewrite_first(
        &self,
        elems: &[Term],
        fired: &mut Vec<(usize, RuleId)>,
    ) -> Option<Vec<Term>> {
        for (i, e) in elems.iter().enumerate() {
            if let Some(e2) = self.rewrite_one(e, fired) {
                let mut out = elems.to_vec();
                out[i] = e2;
                return Some(out);
            }
        }
        None
    }

    /// Contract `t` itself if it is a redex.
    fn contract(&self, t: &Term, fired: &mut Vec<(usize, RuleId)>) -> Option<Term> {
        match &t.kind {
            // Nullary definitions rewrite as bare variables.
            TermKind::Var(v) => match self.defs.get(&v.id) {
                Some(def) if def.args.is_empty() => Some(def.body.clone()),
                _ => None,
            },
            TermKind::App(h, args) => {
                // Flatten curried spines before matching rule arities.
                if let TermKind::App(h2, args2) = &h.kind {
                    let mut all = args2.clone();
                    all.extend(args.iter().cloned());
                    return Some(Term::new(
                        TermKind::App(h2.clone(), all),
                        t.ty.clone(),
                    ));
                }
                let head = h.as_var()?;
                if let Some(def) = self.defs.get(&head.id) {
                    if def.args.len() == args.len() {
                        let mut s = VarSubst::new();
                        for (p, a) in def.args.iter().zip(args) {
                            s.bind(p, a.clone());
                        }
                        return Some(s.apply(&def.body));
                    }
                }
                for (si, p) in self.schemes.iter().enumerate() {
                    if let Some(nt) = p.nt_of_var(head.id) {
                        for (rid, rule) in p.rules_of(nt) {
                            if rule.arity() != args.len() {
                                continue;
                            }
                            if let Some(out) = apply_rule(rule, args) {
                                fired.push((si, rid));
                                return Some(out);
                            }
                        }
                    }
                }
                None
            }
            TermKind::Match(s, cases) => {
                if let TermKind::Data(ctor, dargs) = &s.kind {
                    for c in cases {
                        if &c.ctor == ctor && c.binders.len() == dargs.len() {
                            let mut subst = VarSubst::new();
                            for (b, a) in c.binders.iter().zip(dargs) {
                                subst.bind(b, a.clone());
                            }
                            return Some(subst.apply(&c.body));
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }
}

fn apply_rule(rule: &crate::pmrs::Rule, args: &[Term]) -> Option<Term> {
    let mut subst = VarSubst::new();
    let (lead, last) = if rule.pattern.is_some() {
        (&args[..args.len() - 1], Some(&args[args.len() - 1]))
    } else {
        (args, None)
    };
    for (p, a) in rule.args.iter().zip(lead) {
        subst.bind(p, a.clone());
    }
    if let (Some(pat), Some(scrut)) = (&rule.pattern, last) {
        match &scrut.kind {
            TermKind::Data(ctor, dargs)
                if *ctor == pat.ctor && dargs.len() == pat.binders.len() =>
            {
                for (b, a) in pat.binders.iter().zip(dargs) {
                    subst.bind(b, a.clone());
                }
            }
            _ => return None,
        }
    }
    Some(subst.apply(&rule.rhs))
}

/// Reduce `main t` under `p` with the given limit.
pub fn reduce_term(p: &Pmrs, t: &Term, limit: usize) -> Reduction {
    Reducer::new(vec![p]).with_limit(limit).reduce(t)
}

/// A term is maximally reducible under `p` iff `main t` reduces within
/// the limit to a normal form whose residual recursive calls are all
/// stuck on plain variables. Those calls are what recursion elimination
/// replaces by scalars. A constructor-stuck call (a rule needs a deeper
/// pattern) or a term that made no reduction progress at all belongs to
/// the expansion frontier instead.
pub fn is_mr(p: &Pmrs, t: &Term, limit: usize) -> bool {
    let red = reduce_term(p, &p.apply_main(t.clone()), limit);
    if !red.complete || has_constructor_stuck_call(&red.term, p) {
        return false;
    }
    !red.fired.is_empty() || !mentions_nonterminal(&red.term, p)
}

/// A residual application of a non-terminal whose argument is itself a
/// constructor term: reduction is waiting on a deeper pattern.
pub fn has_constructor_stuck_call(t: &Term, p: &Pmrs) -> bool {
    t.subterms().iter().any(|s| match &s.kind {
        TermKind::App(h, args) => match h.as_var() {
            Some(v) if p.is_nonterminal(v.id) => args
                .iter()
                .any(|a| matches!(a.kind, TermKind::Data(_, _))),
            _ => false,
        },
        _ => false,
    })
}

/// True when `t` still applies any non-terminal of `p`.
pub fn mentions_nonterminal(t: &Term, p: &Pmrs) -> bool {
    t.subterms().iter().any(|s| match &s.kind {
        TermKind::Var(v) => p.is_nonterminal(v.id),
        _ => false,
    })
}
