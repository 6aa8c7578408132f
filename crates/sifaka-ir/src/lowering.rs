//! Lowering from the DSL AST to PMRS values.
//!
//! Lowering declares the program's sum types into the registry, then
//! turns each `pmrs` block into a [`Pmrs`]. Types are assigned by a
//! unification pass: non-terminals, holes, and rule arguments start at
//! fresh type variables, rule right-hand sides contribute constraints,
//! and the solved substitution is committed to the whole scheme.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use sifaka_dsl::ast;

use crate::context::Context;
use crate::pmrs::{Pattern, Pmrs, Rule};
use crate::terms::{Binop, Term, Unop, Variable};
use crate::types::{unify, RType, RegistryError, TypeDef, UnifyError, VariantDef};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoweringError {
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("unknown constructor {0}")]
    UnknownConstructor(String),
    #[error("constructor {ctor} expects {expected} arguments, got {got}")]
    ConstructorArity {
        ctor: String,
        expected: usize,
        got: usize,
    },
    #[error("scheme {scheme}: unknown name {name}")]
    UnknownName { scheme: String, name: String },
    #[error("scheme {scheme}: signature must be an arrow type")]
    BadSignature { scheme: String },
    #[error("scheme {scheme}: no rule for the main symbol")]
    NoMainRule { scheme: String },
    #[error("scheme {scheme}: type error: {source}")]
    Type {
        scheme: String,
        #[source]
        source: UnifyError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl LoweringError {
    fn type_error(scheme: &str, source: UnifyError) -> Self {
        LoweringError::Type {
            scheme: scheme.to_string(),
            source,
        }
    }
}

/// All schemes of a lowered program, keyed by name in declaration order.
#[derive(Debug, Clone, Default)]
pub struct LoweredProgram {
    pub schemes: IndexMap<String, Pmrs>,
}

impl LoweredProgram {
    pub fn scheme(&self, name: &str) -> Option<&Pmrs> {
        self.schemes.get(name)
    }
}

/// Declare the program's types and lower every scheme.
pub fn lower_program(
    ctx: &mut Context,
    prog: &ast::Program,
) -> Result<LoweredProgram, LoweringError> {
    declare_types(ctx, prog)?;
    let mut out = LoweredProgram::default();
    for scheme in &prog.schemes {
        let pmrs = lower_scheme(ctx, &scheme.node)?;
        debug!(
            scheme = %pmrs.name,
            rules = pmrs.rules.len(),
            holes = pmrs.params.len(),
            "lowered scheme"
        );
        out.schemes.insert(pmrs.name.clone(), pmrs);
    }
    Ok(out)
}

fn declare_types(ctx: &mut Context, prog: &ast::Program) -> Result<(), LoweringError> {
    for decl in &prog.types {
        let variants = decl
            .node
            .variants
            .iter()
            .map(|v| {
                Ok(VariantDef {
                    name: v.name.clone(),
                    args: v
                        .payload
                        .iter()
                        .map(ty_of_ast)
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, LoweringError>>()?;
        ctx.registry_mut().declare(
            &decl.node.name,
            TypeDef {
                params: vec![],
                variants,
            },
        )?;
    }
    // Payloads may forward-reference types; verify them once all are in.
    let known: Vec<String> = ctx.registry().type_names().map(String::from).collect();
    for decl in &prog.types {
        for v in &decl.node.variants {
            for ty in &v.payload {
                check_named_types(ty, &known)?;
            }
        }
    }
    Ok(())
}

fn check_named_types(ty: &ast::TyExpr, known: &[String]) -> Result<(), LoweringError> {
    match ty {
        ast::TyExpr::Named(n) => {
            if known.iter().any(|k| k == n) {
                Ok(())
            } else {
                Err(LoweringError::UnknownType(n.clone()))
            }
        }
        ast::TyExpr::Tuple(elems) => elems.iter().try_for_each(|e| check_named_types(e, known)),
        ast::TyExpr::Fun(d, c) => {
            check_named_types(d, known)?;
            check_named_types(c, known)
        }
        _ => Ok(()),
    }
}

fn ty_of_ast(ty: &ast::TyExpr) -> Result<RType, LoweringError> {
    Ok(match ty {
        ast::TyExpr::Int => RType::Int,
        ast::TyExpr::Bool => RType::Bool,
        ast::TyExpr::Str => RType::Str,
        ast::TyExpr::Char => RType::Char,
        ast::TyExpr::Named(n) => RType::named(n.clone()),
        ast::TyExpr::Tuple(elems) => RType::Tuple(
            elems
                .iter()
                .map(ty_of_ast)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        ast::TyExpr::Fun(d, c) => RType::fun(ty_of_ast(d)?, ty_of_ast(c)?),
    })
}

struct Infer<'a> {
    ctx: &'a mut Context,
    scheme: String,
    constraints: Vec<(RType, RType)>,
}

impl<'a> Infer<'a> {
    fn constrain(&mut self, a: RType, b: RType) {
        self.constraints.push((a, b));
    }

    fn infer_expr(
        &mut self,
        env: &HashMap<String, Variable>,
        e: &ast::Expr,
    ) -> Result<Term, LoweringError> {
        match e {
            ast::Expr::Int(n) => Ok(Term::int(*n)),
            ast::Expr::Bool(b) => Ok(Term::bool_(*b)),
            ast::Expr::Var(name) => match env.get(name) {
                Some(v) => Ok(Term::var(v.clone())),
                None => Err(LoweringError::UnknownName {
                    scheme: self.scheme.clone(),
                    name: name.clone(),
                }),
            },
            ast::Expr::Ctor(name, args) => {
                let (owner, vdef) = self
                    .ctx
                    .registry()
                    .variant(name)
                    .map(|(o, v)| (o.to_string(), v.clone()))
                    .ok_or_else(|| LoweringError::UnknownConstructor(name.clone()))?;
                if vdef.args.len() != args.len() {
                    return Err(LoweringError::ConstructorArity {
                        ctor: name.clone(),
                        expected: vdef.args.len(),
                        got: args.len(),
                    });
                }
                let mut lowered = Vec::with_capacity(args.len());
                for (a, expected) in args.iter().zip(&vdef.args) {
                    let t = self.infer_expr(env, a)?;
                    self.constrain(t.ty.clone(), expected.clone());
                    lowered.push(t);
                }
                Ok(Term::data(name.clone(), lowered, RType::named(owner)))
            }
            ast::Expr::App(head, args) => {
                let h = self.infer_expr(env, head)?;
                let lowered: Vec<Term> = args
                    .iter()
                    .map(|a| self.infer_expr(env, a))
                    .collect::<Result<_, _>>()?;
                let ret = self.ctx.fresh_tvar();
                let mut arrow = ret.clone();
                for a in lowered.iter().rev() {
                    arrow = RType::fun(a.ty.clone(), arrow);
                }
                self.constrain(h.ty.clone(), arrow);
                Ok(Term::app(h, lowered, ret))
            }
            ast::Expr::Bin(op, a, b) => {
                let (op, operand_ty) = match op {
                    ast::BinOp::Add => (Binop::Plus, Some(RType::Int)),
                    ast::BinOp::Sub => (Binop::Minus, Some(RType::Int)),
                    ast::BinOp::Mul => (Binop::Times, Some(RType::Int)),
                    ast::BinOp::Div => (Binop::Div, Some(RType::Int)),
                    ast::BinOp::Min => (Binop::Min, Some(RType::Int)),
                    ast::BinOp::Max => (Binop::Max, Some(RType::Int)),
                    ast::BinOp::Gt => (Binop::Gt, Some(RType::Int)),
                    ast::BinOp::Ge => (Binop::Ge, Some(RType::Int)),
                    ast::BinOp::Lt => (Binop::Lt, Some(RType::Int)),
                    ast::BinOp::Le => (Binop::Le, Some(RType::Int)),
                    ast::BinOp::Eq => (Binop::Eq, None),
                    ast::BinOp::And => (Binop::And, Some(RType::Bool)),
                    ast::BinOp::Or => (Binop::Or, Some(RType::Bool)),
                };
                let ta = self.infer_expr(env, a)?;
                let tb = self.infer_expr(env, b)?;
                match operand_ty {
                    Some(ty) => {
                        self.constrain(ta.ty.clone(), ty.clone());
                        self.constrain(tb.ty.clone(), ty);
                    }
                    None => self.constrain(ta.ty.clone(), tb.ty.clone()),
                }
                Ok(Term::bin(op, ta, tb))
            }
            ast::Expr::Neg(a) => {
                let t = self.infer_expr(env, a)?;
                self.constrain(t.ty.clone(), RType::Int);
                Ok(Term::un(Unop::Neg, t))
            }
            ast::Expr::Not(a) => {
                let t = self.infer_expr(env, a)?;
                self.constrain(t.ty.clone(), RType::Bool);
                Ok(Term::un(Unop::Not, t))
            }
            ast::Expr::Ite(c, t, e2) => {
                let tc = self.infer_expr(env, c)?;
                let tt = self.infer_expr(env, t)?;
                let te = self.infer_expr(env, e2)?;
                self.constrain(tc.ty.clone(), RType::Bool);
                self.constrain(tt.ty.clone(), te.ty.clone());
                Ok(Term::ite(tc, tt, te))
            }
            ast::Expr::Tuple(elems) => {
                let lowered: Vec<Term> = elems
                    .iter()
                    .map(|e| self.infer_expr(env, e))
                    .collect::<Result<_, _>>()?;
                Ok(Term::tuple(lowered))
            }
        }
    }
}

fn lower_scheme(ctx: &mut Context, decl: &ast::PmrsDecl) -> Result<Pmrs, LoweringError> {
    let signature = ty_of_ast(&decl.signature)?;
    let RType::Fun(input, output) = &signature else {
        return Err(LoweringError::BadSignature {
            scheme: decl.name.clone(),
        });
    };
    let input_type = input.as_ref().clone();
    let output_type = output.as_ref().clone();

    // Non-terminals in order of first appearance, main first.
    let mut nt_names: Vec<String> = vec![decl.name.clone()];
    for r in &decl.rules {
        if !nt_names.contains(&r.node.nt) && !decl.holes.contains(&r.node.nt) {
            nt_names.push(r.node.nt.clone());
        }
    }
    if !decl.rules.iter().any(|r| r.node.nt == decl.name) {
        return Err(LoweringError::NoMainRule {
            scheme: decl.name.clone(),
        });
    }

    let mut nonterminals = Vec::new();
    for name in &nt_names {
        let ty = if name == &decl.name {
            signature.clone()
        } else {
            ctx.fresh_tvar()
        };
        nonterminals.push(ctx.named_var(name, ty));
    }
    let params: Vec<Variable> = decl
        .holes
        .iter()
        .map(|h| {
            let ty = ctx.fresh_tvar();
            ctx.named_var(h, ty)
        })
        .collect();

    let mut global_env: HashMap<String, Variable> = HashMap::new();
    for v in nonterminals.iter().chain(params.iter()) {
        global_env.insert(v.name.clone(), v.clone());
    }

    let mut infer = Infer {
        ctx,
        scheme: decl.name.clone(),
        constraints: Vec::new(),
    };
    let mut rules = Vec::new();
    for spanned in &decl.rules {
        let r = &spanned.node;
        let nt_idx = nt_names
            .iter()
            .position(|n| n == &r.nt)
            .ok_or_else(|| LoweringError::UnknownName {
                scheme: decl.name.clone(),
                name: r.nt.clone(),
            })?;
        let mut env = global_env.clone();
        let mut arg_vars = Vec::new();
        for a in &r.args {
            let ty = infer.ctx.fresh_tvar();
            let v = infer.ctx.named_var(a, ty);
            env.insert(a.clone(), v.clone());
            arg_vars.push(v);
        }
        let pattern = match &r.pattern {
            None => None,
            Some(p) => {
                let (owner, vdef) = infer
                    .ctx
                    .registry()
                    .variant(&p.ctor)
                    .map(|(o, v)| (o.to_string(), v.clone()))
                    .ok_or_else(|| LoweringError::UnknownConstructor(p.ctor.clone()))?;
                if vdef.args.len() != p.binders.len() {
                    return Err(LoweringError::ConstructorArity {
                        ctor: p.ctor.clone(),
                        expected: vdef.args.len(),
                        got: p.binders.len(),
                    });
                }
                let mut binders = Vec::new();
                for (b, ty) in p.binders.iter().zip(&vdef.args) {
                    let v = infer.ctx.named_var(b, ty.clone());
                    env.insert(b.clone(), v.clone());
                    binders.push(v);
                }
                Some((
                    Pattern {
                        ctor: p.ctor.clone(),
                        binders,
                    },
                    RType::named(owner),
                ))
            }
        };
        let rhs = infer.infer_expr(&env, &r.rhs)?;

        // The non-terminal's type must match this rule's shape.
        let mut arrow = rhs.ty.clone();
        if let Some((_, pat_ty)) = &pattern {
            arrow = RType::fun(pat_ty.clone(), arrow);
        }
        for a in arg_vars.iter().rev() {
            arrow = RType::fun(a.ty.clone(), arrow);
        }
        let nt_ty = nonterminals[nt_idx].ty.clone();
        infer.constrain(nt_ty, arrow);

        rules.push(Rule {
            nt: nt_idx,
            args: arg_vars,
            pattern: pattern.map(|(p, _)| p),
            rhs,
        });
    }

    let subst = unify(&infer.constraints)
        .map_err(|e| LoweringError::type_error(&decl.name, e))?;
    let mut pmrs = Pmrs {
        name: decl.name.clone(),
        params,
        nonterminals,
        main: 0,
        rules,
        input_type,
        output_type,
    };
    pmrs.apply_type_subst(&subst);
    Ok(pmrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::reduce_term;
    use sifaka_dsl::parse;

    const LIST_SUM: &str = r#"
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

    fn lower(src: &str) -> (Context, LoweredProgram) {
        let prog = parse(src, "test.pmrs").unwrap();
        let mut ctx = Context::new();
        let lowered = lower_program(&mut ctx, &prog).unwrap();
        (ctx, lowered)
    }

    #[test]
    fn lowers_and_reduces_list_sum() {
        let (_ctx, lowered) = lower(LIST_SUM);
        let spec = lowered.scheme("spec").unwrap();
        let list = RType::named("list");
        let t = Term::data(
            "Cons",
            vec![
                Term::int(1),
                Term::data(
                    "Cons",
                    vec![Term::int(2), Term::data("Nil", vec![], list.clone())],
                    list.clone(),
                ),
            ],
            list,
        );
        let red = reduce_term(spec, &spec.apply_main(t), 50);
        assert!(red.complete);
        assert_eq!(red.term, Term::int(3));
    }

    #[test]
    fn hole_types_are_inferred_from_uses() {
        let (_ctx, lowered) = lower(LIST_SUM);
        let target = lowered.scheme("target").unwrap();
        let f0 = &target.params[0];
        let join = &target.params[1];
        assert_eq!(f0.ty, RType::Int);
        assert_eq!(join.ty, RType::fun(RType::Int, RType::fun(RType::Int, RType::Int)));
    }

    #[test]
    fn auxiliary_nonterminal_types_are_inferred() {
        let src = r#"
problem rev_sum {
    type list = Nil | Cons of int * list;

    pmrs spec : list -> int {
        spec Nil -> 0;
        spec (Cons hd tl) -> aux hd tl;
        aux acc Nil -> acc;
        aux acc (Cons hd tl) -> aux (acc + hd) tl;
    }
}
"#;
        let (_ctx, lowered) = lower(src);
        let spec = lowered.scheme("spec").unwrap();
        let aux = &spec.nonterminals[1];
        assert_eq!(
            aux.ty,
            RType::fun(RType::Int, RType::fun(RType::named("list"), RType::Int))
        );
    }

    #[test]
    fn type_errors_surface_as_lowering_errors() {
        let src = r#"
problem bad {
    type list = Nil | Cons of int * list;
    pmrs spec : list -> int {
        spec Nil -> true;
        spec (Cons hd tl) -> hd;
    }
}
"#;
        let prog = parse(src, "t.pmrs").unwrap();
        let mut ctx = Context::new();
        let err = lower_program(&mut ctx, &prog).unwrap_err();
        assert!(matches!(err, LoweringError::Type { .. }));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let src = r#"
problem bad {
    pmrs spec : int -> int {
        spec x -> y;
    }
}
"#;
        let prog = parse(src, "t.pmrs").unwrap();
        let mut ctx = Context::new();
        let err = lower_program(&mut ctx, &prog).unwrap_err();
        assert!(matches!(err, LoweringError::UnknownName { name, .. } if name == "y"));
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let src = r#"
problem bad {
    type tree = Leaf of elt;
    pmrs spec : tree -> int {
        spec (Leaf a) -> 0;
    }
}
"#;
        let prog = parse(src, "t.pmrs").unwrap();
        let mut ctx = Context::new();
        let err = lower_program(&mut ctx, &prog).unwrap_err();
        assert!(matches!(err, LoweringError::UnknownType(n) if n == "elt"));
    }

    #[test]
    fn identity_repr_is_detected_after_lowering() {
        let (_ctx, lowered) = lower(LIST_SUM);
        assert!(lowered.scheme("repr").unwrap().is_identity());
    }

    #[test]
    fn pattern_binder_arity_mismatch_is_rejected() {
        let src = r#"
problem bad {
    type list = Nil | Cons of int * list;
    pmrs spec : list -> int {
        spec Nil -> 0;
        spec (Cons hd) -> hd;
    }
}
"#;
        let prog = parse(src, "t.pmrs").unwrap();
        let mut ctx = Context::new();
        let err = lower_program(&mut ctx, &prog).unwrap_err();
        assert!(matches!(err, LoweringError::ConstructorArity { .. }));
    }
}
