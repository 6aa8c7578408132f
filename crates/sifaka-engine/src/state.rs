//! Per-representative-term state.
//!
//! Each representative term carries its recursion-elimination pairs, the
//! scalar variables they introduced, accumulated positive and negative
//! counterexamples, and the lemma conjunction proven for it so far. The
//! map only grows within one refinement loop.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use sifaka_ir::context::Context;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::terms::{Binop, Constant, Term, Variable};
use sifaka_ir::types::RType;

/// A counterexample valuation: variable id -> scalar constant, ordered
/// so re-runs produce identical synthesis queries.
pub type CexModel = BTreeMap<u32, Constant>;

/// Everything the engine tracks about one representative term.
#[derive(Debug, Clone)]
pub struct TermDetail {
    pub term: Term,
    /// Recursion-elimination pairs (tᵢ, vᵢ): recursive subterm tᵢ is
    /// replaced by scalar variable vᵢ on both sides of the equation.
    pub recurs_elim: Vec<(Term, Variable)>,
    /// The scalar variables introduced, in elimination order.
    pub scalars: Vec<Variable>,
    pub positives: Vec<CexModel>,
    pub negatives: Vec<CexModel>,
    /// Current precondition: the conjunction of proven lemmas.
    pub precond: Option<Term>,
    pub lemmas: Vec<Term>,
    pub lemma_candidate: Option<Term>,
}

impl TermDetail {
    /// Build the detail record for `term`, eliminating recursion: every
    /// ADT-typed free variable of the term becomes one scalar of the
    /// output type α.
    pub fn new(ctx: &mut Context, problem: &ProblemDefn, term: &Term) -> Self {
        let alpha = problem.alpha().clone();
        let mut recurs_elim = Vec::new();
        let mut scalars = Vec::new();
        for v in term.free_variables() {
            if matches!(v.ty, RType::Named(_, _)) {
                let scalar = ctx.fresh_var("v", alpha.clone());
                recurs_elim.push((Term::var(v), scalar.clone()));
                scalars.push(scalar);
            }
        }
        Self {
            term: term.clone(),
            recurs_elim,
            scalars,
            positives: Vec::new(),
            negatives: Vec::new(),
            precond: None,
            lemmas: Vec::new(),
            lemma_candidate: None,
        }
    }

    /// Record an accepted lemma and refresh the precondition conjunction.
    pub fn accept_lemma(&mut self, lemma: Term) {
        self.lemmas.push(lemma);
        let mut iter = self.lemmas.iter().cloned();
        let first = iter.next().expect("just pushed");
        self.precond = Some(iter.fold(first, |acc, l| Term::bin(Binop::And, acc, l)));
        self.lemma_candidate = None;
    }
}

/// Representative-term map, keyed by the term's printed form. Insertion
/// order is the equation emission order.
#[derive(Debug, Clone, Default)]
pub struct TermStateMap {
    map: IndexMap<String, TermDetail>,
}

impl TermStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(term: &Term) -> String {
        term.to_string()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, term: &Term) -> Option<&TermDetail> {
        self.map.get(&Self::key(term))
    }

    pub fn get_mut(&mut self, term: &Term) -> Option<&mut TermDetail> {
        self.map.get_mut(&Self::key(term))
    }

    /// Fetch or create the detail record for `term`.
    pub fn ensure(
        &mut self,
        ctx: &mut Context,
        problem: &ProblemDefn,
        term: &Term,
    ) -> &mut TermDetail {
        let key = Self::key(term);
        if !self.map.contains_key(&key) {
            let detail = TermDetail::new(ctx, problem, term);
            self.map.insert(key.clone(), detail);
        }
        self.map.get_mut(&key).expect("inserted above")
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermDetail> {
        self.map.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TermDetail> {
        self.map.values_mut()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sifaka_ir::lowering::lower_program;

    pub(crate) const LIST_SUM: &str = r#"
problem list_sum {
    type list = Nil | Cons of int * list;

    pmrs spec : list -> int {
        spec Nil -> 0;
        spec (Cons hd tl) -> hd + spec tl;
    }

    pmrs target : list -> int with f0, join {
        target Nil -> f0;
        target (Cons hd tl) -> join hd (target tl);
    }

    pmrs repr : list -> list {
        repr x -> x;
    }
}
"#;

    pub(crate) fn list_sum_problem() -> (Context, ProblemDefn) {
        let prog = sifaka_dsl::parse(LIST_SUM, "list_sum.pmrs").unwrap();
        let mut ctx = Context::new();
        let lowered = lower_program(&mut ctx, &prog).unwrap();
        let problem = ProblemDefn::new(
            ctx.registry(),
            lowered.scheme("spec").unwrap().clone(),
            lowered.scheme("target").unwrap().clone(),
            lowered.scheme("repr").unwrap().clone(),
            None,
        )
        .unwrap();
        (ctx, problem)
    }

    #[test]
    fn recursion_elimination_introduces_one_scalar_per_adt_variable() {
        let (mut ctx, problem) = list_sum_problem();
        let list = RType::named("list");
        let tail = ctx.fresh_var("l", list.clone());
        let t = Term::data(
            "Cons",
            vec![Term::var(ctx.fresh_var("e", RType::Int)), Term::var(tail)],
            list,
        );
        let detail = TermDetail::new(&mut ctx, &problem, &t);
        assert_eq!(detail.recurs_elim.len(), 1);
        assert_eq!(detail.scalars.len(), 1);
        assert_eq!(detail.scalars[0].ty, RType::Int);
    }

    #[test]
    fn ground_terms_need_no_elimination() {
        let (mut ctx, problem) = list_sum_problem();
        let t = Term::data("Nil", vec![], RType::named("list"));
        let detail = TermDetail::new(&mut ctx, &problem, &t);
        assert!(detail.recurs_elim.is_empty());
        assert!(detail.scalars.is_empty());
    }

    #[test]
    fn ensure_is_idempotent_and_preserves_order() {
        let (mut ctx, problem) = list_sum_problem();
        let nil = Term::data("Nil", vec![], RType::named("list"));
        let mut state = TermStateMap::new();
        state.ensure(&mut ctx, &problem, &nil);
        state.ensure(&mut ctx, &problem, &nil);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn accept_lemma_builds_conjunction() {
        let (mut ctx, problem) = list_sum_problem();
        let nil = Term::data("Nil", vec![], RType::named("list"));
        let mut detail = TermDetail::new(&mut ctx, &problem, &nil);
        let x = ctx.fresh_var("x", RType::Int);
        let l1 = Term::bin(Binop::Gt, Term::var(x.clone()), Term::int(0));
        let l2 = Term::bin(Binop::Lt, Term::var(x), Term::int(10));
        detail.accept_lemma(l1.clone());
        assert_eq!(detail.precond, Some(l1.clone()));
        detail.accept_lemma(l2.clone());
        assert_eq!(detail.precond, Some(Term::bin(Binop::And, l1, l2)));
    }
}
