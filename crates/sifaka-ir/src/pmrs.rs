//! Pattern-matching recursion schemes.
//!
//! A PMRS is a set of rewrite rules `nt a1..ak (C b1..bm)? -> rhs` over a
//! designated main symbol. Non-terminals and rules live in integer-indexed
//! arenas; rule bodies reference non-terminals through ordinary variables,
//! so the rule graph carries no ownership cycles.

use thiserror::Error;

use crate::terms::{MatchCase, Term, TermKind, VarSubst, Variable};
use crate::types::{RType, TypeRegistry, TypeSubst};

pub type NtId = usize;
pub type RuleId = usize;

/// Constructor pattern on the recursion argument of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub ctor: String,
    pub binders: Vec<Variable>,
}

/// One rewrite rule. `args` bind the leading arguments; when `pattern` is
/// present the final argument must be a matching constructor term.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub nt: NtId,
    pub args: Vec<Variable>,
    pub pattern: Option<Pattern>,
    pub rhs: Term,
}

impl Rule {
    /// Number of term arguments this rule consumes.
    pub fn arity(&self) -> usize {
        self.args.len() + usize::from(self.pattern.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PmrsError {
    #[error("pmrs {pmrs}: main symbol has no rules")]
    MainWithoutRules { pmrs: String },
    #[error("pmrs {pmrs}: main must take exactly one recursion argument")]
    MainArity { pmrs: String },
    #[error("pmrs {pmrs}: parameter {name} shadows a non-terminal")]
    ParamShadowsNonTerminal { pmrs: String, name: String },
    #[error("pmrs {pmrs}: rules of {nt} mix pattern arities")]
    MixedArity { pmrs: String, nt: String },
    #[error("pmrs {pmrs}: {nt} does not cover variant {variant} of {ty}")]
    MissingVariant {
        pmrs: String,
        nt: String,
        variant: String,
        ty: String,
    },
    #[error("pmrs {pmrs}: unknown constructor {ctor} in pattern")]
    UnknownConstructor { pmrs: String, ctor: String },
}

/// A pattern-matching recursion scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct Pmrs {
    pub name: String,
    /// Parameters ξ: the unknown scalar functions to synthesize.
    pub params: Vec<Variable>,
    /// Non-terminal symbols, indexed by [`NtId`].
    pub nonterminals: Vec<Variable>,
    pub main: NtId,
    pub rules: Vec<Rule>,
    pub input_type: RType,
    pub output_type: RType,
}

impl Pmrs {
    pub fn main_symbol(&self) -> &Variable {
        &self.nonterminals[self.main]
    }

    pub fn nt_of_var(&self, id: u32) -> Option<NtId> {
        self.nonterminals.iter().position(|nt| nt.id == id)
    }

    pub fn is_nonterminal(&self, id: u32) -> bool {
        self.nt_of_var(id).is_some()
    }

    pub fn is_param(&self, id: u32) -> bool {
        self.params.iter().any(|p| p.id == id)
    }

    pub fn rules_of(&self, nt: NtId) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.nt == nt)
    }

    /// `main t`, typed at the output sort.
    pub fn apply_main(&self, t: Term) -> Term {
        Term::app(
            Term::var(self.main_symbol().clone()),
            vec![t],
            self.output_type.clone(),
        )
    }

    /// True when every main rule is the identity `main x -> x`.
    pub fn is_identity(&self) -> bool {
        let mut saw_rule = false;
        for (_, r) in self.rules_of(self.main) {
            saw_rule = true;
            let ok = r.pattern.is_none()
                && r.args.len() == 1
                && matches!(&r.rhs.kind, TermKind::Var(v) if v.id == r.args[0].id);
            if !ok {
                return false;
            }
        }
        saw_rule
    }

    /// Check structural invariants against the registry.
    pub fn validate(&self, registry: &TypeRegistry) -> Result<(), PmrsError> {
        let main_rules: Vec<&Rule> = self.rules_of(self.main).map(|(_, r)| r).collect();
        if main_rules.is_empty() {
            return Err(PmrsError::MainWithoutRules {
                pmrs: self.name.clone(),
            });
        }
        for r in &main_rules {
            if r.arity() != 1 {
                return Err(PmrsError::MainArity {
                    pmrs: self.name.clone(),
                });
            }
        }
        for p in &self.params {
            if self.is_nonterminal(p.id) {
                return Err(PmrsError::ParamShadowsNonTerminal {
                    pmrs: self.name.clone(),
                    name: p.name.clone(),
                });
            }
        }
        for (nt_id, nt) in self.nonterminals.iter().enumerate() {
            let rules: Vec<&Rule> = self.rules_of(nt_id).map(|(_, r)| r).collect();
            if rules.is_empty() {
                continue;
            }
            let arity = rules[0].arity();
            let patterned = rules[0].pattern.is_some();
            if rules
                .iter()
                .any(|r| r.arity() != arity || r.pattern.is_some() != patterned)
            {
                return Err(PmrsError::MixedArity {
                    pmrs: self.name.clone(),
                    nt: nt.name.clone(),
                });
            }
            if patterned {
                self.check_coverage(nt, &rules, registry)?;
            }
        }
        Ok(())
    }

    fn check_coverage(
        &self,
        nt: &Variable,
        rules: &[&Rule],
        registry: &TypeRegistry,
    ) -> Result<(), PmrsError> {
        let first = rules[0].pattern.as_ref().map(|p| p.ctor.as_str());
        let Some(ctor) = first else { return Ok(()) };
        let Some(owner) = registry.owner_of_variant(ctor) else {
            return Err(PmrsError::UnknownConstructor {
                pmrs: self.name.clone(),
                ctor: ctor.to_string(),
            });
        };
        let owner = owner.to_string();
        let def = registry
            .type_def(&owner)
            .expect("owner_of_variant implies a definition");
        for variant in &def.variants {
            let covered = rules.iter().any(|r| {
                r.pattern
                    .as_ref()
                    .is_some_and(|p| p.ctor == variant.name)
            });
            if !covered {
                return Err(PmrsError::MissingVariant {
                    pmrs: self.name.clone(),
                    nt: nt.name.clone(),
                    variant: variant.name.clone(),
                    ty: owner.clone(),
                });
            }
        }
        for r in rules {
            let p = r.pattern.as_ref().expect("patterned rule group");
            if registry.owner_of_variant(&p.ctor) != Some(owner.as_str()) {
                return Err(PmrsError::UnknownConstructor {
                    pmrs: self.name.clone(),
                    ctor: p.ctor.clone(),
                });
            }
        }
        Ok(())
    }

    /// Rebuild every rule rhs under a substitution (used when committing
    /// synthesized hole bodies or unification results).
    pub fn subst_rule_rhs(&mut self, subst: &VarSubst) {
        for rule in &mut self.rules {
            rule.rhs = subst.apply(&rule.rhs);
        }
    }

    /// Apply a type substitution to every type annotation in the scheme.
    pub fn apply_type_subst(&mut self, subst: &TypeSubst) {
        self.input_type = subst.apply(&self.input_type);
        self.output_type = subst.apply(&self.output_type);
        for v in self.params.iter_mut().chain(self.nonterminals.iter_mut()) {
            v.ty = subst.apply(&v.ty);
        }
        for rule in &mut self.rules {
            for a in &mut rule.args {
                a.ty = subst.apply(&a.ty);
            }
            if let Some(p) = &mut rule.pattern {
                for b in &mut p.binders {
                    b.ty = subst.apply(&b.ty);
                }
            }
            rule.rhs = retype_term(&rule.rhs, subst);
        }
    }

    /// Project each non-terminal to an ordinary function definition:
    /// argument list plus a match over the recursion argument. Used by the
    /// SMT encoding of reference functions.
    pub fn func_of_pmrs(&self, ctx_recursion_arg: &mut impl FnMut(&RType) -> Variable) -> Vec<FuncDef> {
        let mut out = Vec::new();
        for (nt_id, nt) in self.nonterminals.iter().enumerate() {
            let rules: Vec<&Rule> = self.rules_of(nt_id).map(|(_, r)| r).collect();
            if rules.is_empty() {
                continue;
            }
            if rules[0].pattern.is_none() {
                // Unpatterned: a single rule is a plain definition.
                let r = rules[0];
                out.push(FuncDef {
                    name: nt.name.clone(),
                    args: r.args.clone(),
                    body: r.rhs.clone(),
                });
                continue;
            }
            let args = rules[0].args.clone();
            // The pattern argument is the last argument of the
            // non-terminal's (inferred) arrow type.
            let (arg_tys, _) = nt.ty.uncurry();
            let scrut_ty = arg_tys
                .last()
                .map(|t| (*t).clone())
                .unwrap_or_else(|| RType::Var(u32::MAX));
            let scrut = ctx_recursion_arg(&scrut_ty);
            let cases: Vec<MatchCase> = rules
                .iter()
                .map(|r| {
                    let p = r.pattern.as_ref().expect("patterned rule group");
                    MatchCase {
                        ctor: p.ctor.clone(),
                        binders: p.binders.clone(),
                        body: r.rhs.clone(),
                    }
                })
                .collect();
            let ret = rules[0].rhs.ty.clone();
            let mut full_args = args;
            full_args.push(scrut.clone());
            out.push(FuncDef {
                name: nt.name.clone(),
                args: full_args,
                body: Term::new(
                    TermKind::Match(Box::new(Term::var(scrut)), cases),
                    ret,
                ),
            });
        }
        out
    }
}

/// Ordinary functional form of one non-terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub args: Vec<Variable>,
    pub body: Term,
}

/// Re-annotate every type in a term under a substitution.
pub fn retype_term(t: &Term, subst: &TypeSubst) -> Term {
    let ty = subst.apply(&t.ty);
    let kind = match &t.kind {
        TermKind::Const(c) => TermKind::Const(c.clone()),
        TermKind::Var(v) => TermKind::Var(Variable {
            id: v.id,
            name: v.name.clone(),
            ty: subst.apply(&v.ty),
        }),
        TermKind::Boxed(b) => TermKind::Boxed(*b),
        TermKind::Tuple(elems) => {
            TermKind::Tuple(elems.iter().map(|e| retype_term(e, subst)).collect())
        }
        TermKind::Data(ctor, args) => TermKind::Data(
            ctor.clone(),
            args.iter().map(|a| retype_term(a, subst)).collect(),
        ),
        TermKind::Proj(s, i) => TermKind::Proj(Box::new(retype_term(s, subst)), *i),
        TermKind::Un(op, s) => TermKind::Un(*op, Box::new(retype_term(s, subst))),
        TermKind::Bin(op, a, b) => TermKind::Bin(
            *op,
            Box::new(retype_term(a, subst)),
            Box::new(retype_term(b, subst)),
        ),
        TermKind::Ite(c, th, el) => TermKind::Ite(
            Box::new(retype_term(c, subst)),
            Box::new(retype_term(th, subst)),
            Box::new(retype_term(el, subst)),
        ),
        TermKind::App(h, args) => TermKind::App(
            Box::new(retype_term(h, subst)),
            args.iter().map(|a| retype_term(a, subst)).collect(),
        ),
        TermKind::Match(s, cases) => TermKind::Match(
            Box::new(retype_term(s, subst)),
            cases
                .iter()
                .map(|c| MatchCase {
                    ctor: c.ctor.clone(),
                    binders: c
                        .binders
                        .iter()
                        .map(|b| Variable {
                            id: b.id,
                            name: b.name.clone(),
                            ty: subst.apply(&b.ty),
                        })
                        .collect(),
                    body: retype_term(&c.body, subst),
                })
                .collect(),
        ),
    };
    Term::new(kind, ty)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::Context;
    use crate::types::{TypeDef, VariantDef};

    pub(crate) fn list_registry(ctx: &mut Context) {
        ctx.registry_mut()
            .declare(
                "list",
                TypeDef {
                    params: vec![],
                    variants: vec![
                        VariantDef {
                            name: "Nil".into(),
                            args: vec![],
                        },
                        VariantDef {
                            name: "Cons".into(),
                            args: vec![RType::Int, RType::named("list")],
                        },
                    ],
                },
            )
            .unwrap();
    }

    /// `list_sum`: main Nil -> 0 ; main (Cons hd tl) -> hd + main tl
    pub(crate) fn list_sum(ctx: &mut Context) -> Pmrs {
        let list = RType::named("list");
        let main = ctx.named_var("list_sum", RType::fun(list.clone(), RType::Int));
        let hd = ctx.named_var("hd", RType::Int);
        let tl = ctx.named_var("tl", list.clone());
        let rec = Term::app(
            Term::var(main.clone()),
            vec![Term::var(tl.clone())],
            RType::Int,
        );
        Pmrs {
            name: "list_sum".into(),
            params: vec![],
            nonterminals: vec![main],
            main: 0,
            rules: vec![
                Rule {
                    nt: 0,
                    args: vec![],
                    pattern: Some(Pattern {
                        ctor: "Nil".into(),
                        binders: vec![],
                    }),
                    rhs: Term::int(0),
                },
                Rule {
                    nt: 0,
                    args: vec![],
                    pattern: Some(Pattern {
                        ctor: "Cons".into(),
                        binders: vec![hd.clone(), tl],
                    }),
                    rhs: Term::bin(crate::terms::Binop::Plus, Term::var(hd), rec),
                },
            ],
            input_type: list,
            output_type: RType::Int,
        }
    }

    #[test]
    fn validate_accepts_list_sum() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let p = list_sum(&mut ctx);
        p.validate(ctx.registry()).unwrap();
    }

    #[test]
    fn validate_rejects_missing_variant() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let mut p = list_sum(&mut ctx);
        p.rules.pop();
        let err = p.validate(ctx.registry()).unwrap_err();
        assert!(matches!(err, PmrsError::MissingVariant { variant, .. } if variant == "Cons"));
    }

    #[test]
    fn validate_rejects_multi_argument_main() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let mut p = list_sum(&mut ctx);
        let extra = ctx.named_var("acc", RType::Int);
        p.rules[0].args.push(extra);
        let err = p.validate(ctx.registry()).unwrap_err();
        // The rules of main now disagree in arity as well; either error is
        // a correct rejection, but arity-of-main fires first.
        assert!(matches!(err, PmrsError::MainArity { .. }));
    }

    #[test]
    fn identity_detection() {
        let mut ctx = Context::new();
        let list = RType::named("list");
        let main = ctx.named_var("repr", RType::fun(list.clone(), list.clone()));
        let x = ctx.named_var("x", list.clone());
        let p = Pmrs {
            name: "repr".into(),
            params: vec![],
            nonterminals: vec![main],
            main: 0,
            rules: vec![Rule {
                nt: 0,
                args: vec![x.clone()],
                pattern: None,
                rhs: Term::var(x),
            }],
            input_type: list.clone(),
            output_type: list,
        };
        assert!(p.is_identity());
    }

    #[test]
    fn func_of_pmrs_builds_match_form() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let p = list_sum(&mut ctx);
        let mut fresh = |ty: &RType| ctx.named_var("scrut", ty.clone());
        let funcs = p.func_of_pmrs(&mut fresh);
        assert_eq!(funcs.len(), 1);
        let f = &funcs[0];
        assert_eq!(f.name, "list_sum");
        assert_eq!(f.args.len(), 1);
        match &f.body.kind {
            TermKind::Match(_, cases) => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].ctor, "Nil");
                assert_eq!(cases[1].ctor, "Cons");
            }
            other => panic!("expected match body, got {other:?}"),
        }
    }

    #[test]
    fn subst_rule_rhs_rewrites_bodies() {
        let mut ctx = Context::new();
        list_registry(&mut ctx);
        let mut p = list_sum(&mut ctx);
        let hd = p.rules[1]
            .pattern
            .as_ref()
            .unwrap()
            .binders[0]
            .clone();
        let mut s = VarSubst::new();
        s.bind(&hd, Term::int(7));
        p.subst_rule_rhs(&s);
        assert!(p.rules[1].rhs.contains(&Term::int(7)));
    }
}
