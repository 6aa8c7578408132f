//! Lowering between the IR term language and the SMT term model.
//!
//! Reduction happens before encoding, so match forms only reach the
//! encoder through `define-fun-rec` bodies, where they become tester and
//! selector chains. min/max lower to ite. Selector names follow the
//! `{ctor}_{index}` scheme used by the datatype declarations.

use std::collections::HashMap;

use thiserror::Error;

use sifaka_ir::context::Context;
use sifaka_ir::pmrs::FuncDef;
use sifaka_ir::terms::{Binop, BoxKind, Constant, Term, TermKind, Unop, Variable};
use sifaka_ir::types::{RType, TypeRegistry};
use sifaka_smt::sorts::{DatatypeCtor, DatatypeDecl, SmtSort};
use sifaka_smt::terms::SmtTerm;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("cannot encode sort {0}")]
    Sort(String),
    #[error("cannot encode term: {0}")]
    Unsupported(String),
    #[error("unknown symbol in solver output: {0}")]
    UnknownSymbol(String),
    #[error("arity mismatch decoding {0}")]
    Arity(String),
}

/// Map an IR type to an SMT sort.
pub fn sort_of_type(ty: &RType) -> Result<SmtSort, EncodeError> {
    Ok(match ty {
        RType::Int => SmtSort::Int,
        RType::Bool => SmtSort::Bool,
        RType::Str => SmtSort::Str,
        // Characters ride on integers; the theory never inspects them.
        RType::Char => SmtSort::Int,
        RType::Named(name, _) => SmtSort::datatype(name.clone()),
        RType::Tuple(elems) => SmtSort::Tuple(
            elems
                .iter()
                .map(sort_of_type)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        RType::Fun(_, _) | RType::Var(_) => return Err(EncodeError::Sort(ty.to_string())),
    })
}

/// Map an SMT sort back to an IR type.
pub fn type_of_sort(sort: &SmtSort) -> RType {
    match sort {
        SmtSort::Int => RType::Int,
        SmtSort::Bool => RType::Bool,
        SmtSort::Str => RType::Str,
        SmtSort::Datatype(name) => RType::named(name.clone()),
        SmtSort::Tuple(elems) => RType::Tuple(elems.iter().map(type_of_sort).collect()),
    }
}

fn selector_name(ctor: &str, index: usize) -> String {
    format!("{ctor}_{index}")
}

/// Datatype declarations for every registered sum type, in declaration
/// order (one mutually-recursive group).
pub fn datatype_decls(registry: &TypeRegistry) -> Result<Vec<DatatypeDecl>, EncodeError> {
    let mut out = Vec::new();
    for name in registry.type_names() {
        let def = registry
            .type_def(name)
            .expect("type_names yields registered types");
        let ctors = def
            .variants
            .iter()
            .map(|v| {
                Ok(DatatypeCtor {
                    name: v.name.clone(),
                    selectors: v
                        .args
                        .iter()
                        .enumerate()
                        .map(|(i, ty)| Ok((selector_name(&v.name, i), sort_of_type(ty)?)))
                        .collect::<Result<Vec<_>, EncodeError>>()?,
                })
            })
            .collect::<Result<Vec<_>, EncodeError>>()?;
        out.push(DatatypeDecl {
            name: name.to_string(),
            ctors,
        });
    }
    Ok(out)
}

/// Encode a reduced IR term as an SMT term.
pub fn encode_term(t: &Term) -> Result<SmtTerm, EncodeError> {
    match &t.kind {
        TermKind::Const(Constant::Int(n)) => Ok(SmtTerm::int(*n)),
        TermKind::Const(Constant::Bool(b)) => Ok(SmtTerm::bool(*b)),
        TermKind::Const(c) => Err(EncodeError::Unsupported(format!("constant {c}"))),
        TermKind::Var(v) => Ok(SmtTerm::var(v.name.clone())),
        TermKind::Tuple(elems) => Ok(SmtTerm::app(
            "mkTuple",
            elems
                .iter()
                .map(encode_term)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        TermKind::Proj(s, i) => Ok(SmtTerm::app(
            format!("(_ tuple.select {i})"),
            vec![encode_term(s)?],
        )),
        TermKind::Un(Unop::Neg, s) => Ok(encode_term(s)?.neg()),
        TermKind::Un(Unop::Not, s) => Ok(encode_term(s)?.not()),
        TermKind::Bin(op, a, b) => {
            let ea = encode_term(a)?;
            let eb = encode_term(b)?;
            Ok(match op {
                Binop::Plus => ea.add(eb),
                Binop::Minus => ea.sub(eb),
                Binop::Times => ea.mul(eb),
                Binop::Div => ea.div(eb),
                Binop::Min => SmtTerm::ite(ea.clone().le(eb.clone()), ea, eb),
                Binop::Max => SmtTerm::ite(ea.clone().ge(eb.clone()), ea, eb),
                Binop::Gt => ea.gt(eb),
                Binop::Ge => ea.ge(eb),
                Binop::Lt => ea.lt(eb),
                Binop::Le => ea.le(eb),
                Binop::Eq => ea.eq(eb),
                Binop::And => SmtTerm::and(vec![ea, eb]),
                Binop::Or => SmtTerm::or(vec![ea, eb]),
            })
        }
        TermKind::Ite(c, th, el) => Ok(SmtTerm::ite(
            encode_term(c)?,
            encode_term(th)?,
            encode_term(el)?,
        )),
        TermKind::App(h, args) => {
            let head = h
                .as_var()
                .ok_or_else(|| EncodeError::Unsupported(format!("application head {h}")))?;
            Ok(SmtTerm::app(
                head.name.clone(),
                args.iter()
                    .map(encode_term)
                    .collect::<Result<Vec<_>, _>>()?,
            ))
        }
        TermKind::Data(ctor, args) => Ok(SmtTerm::app(
            ctor.clone(),
            args.iter()
                .map(encode_term)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        TermKind::Match(s, cases) => {
            let scrut = encode_term(s)?;
            encode_match(&scrut, t, cases)
        }
        TermKind::Boxed(BoxKind::Pos(_)) | TermKind::Boxed(BoxKind::Free(_)) => {
            Err(EncodeError::Unsupported("unresolved box".into()))
        }
    }
}

fn encode_match(
    scrut: &SmtTerm,
    whole: &Term,
    cases: &[sifaka_ir::terms::MatchCase],
) -> Result<SmtTerm, EncodeError> {
    if cases.is_empty() {
        return Err(EncodeError::Unsupported(format!("empty match {whole}")));
    }
    // Each case body sees its binders as selector applications.
    let mut encoded: Vec<SmtTerm> = Vec::with_capacity(cases.len());
    for case in cases {
        let mut body = case.body.clone();
        for (i, binder) in case.binders.iter().enumerate() {
            let mut subst = sifaka_ir::terms::VarSubst::new();
            subst.bind(
                binder,
                Term::var(Variable {
                    id: binder.id,
                    name: format!("__sel_{}_{}", case.ctor, i),
                    ty: binder.ty.clone(),
                }),
            );
            body = subst.apply(&body);
        }
        let mut smt_body = encode_term(&body)?;
        for (i, _) in case.binders.iter().enumerate() {
            smt_body = substitute_var(
                &smt_body,
                &format!("__sel_{}_{}", case.ctor, i),
                &SmtTerm::app(selector_name(&case.ctor, i), vec![scrut.clone()]),
            );
        }
        encoded.push(smt_body);
    }
    // Last case is the fallthrough.
    let mut out = encoded.pop().expect("nonempty cases");
    for (case, body) in cases.iter().zip(encoded).rev() {
        let tester = SmtTerm::app(format!("(_ is {})", case.ctor), vec![scrut.clone()]);
        out = SmtTerm::ite(tester, body, out);
    }
    Ok(out)
}

fn substitute_var(t: &SmtTerm, name: &str, replacement: &SmtTerm) -> SmtTerm {
    match t {
        SmtTerm::Var(n) if n == name => replacement.clone(),
        SmtTerm::Var(_) | SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => t.clone(),
        SmtTerm::Add(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Sub(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Mul(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Div(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Eq(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Lt(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Le(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Gt(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Ge(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Implies(a, b) => sub2(t, a, b, name, replacement),
        SmtTerm::Neg(a) => rebuild1(t, substitute_var(a, name, replacement)),
        SmtTerm::Not(a) => rebuild1(t, substitute_var(a, name, replacement)),
        SmtTerm::And(ts) => SmtTerm::And(
            ts.iter()
                .map(|x| substitute_var(x, name, replacement))
                .collect(),
        ),
        SmtTerm::Or(ts) => SmtTerm::Or(
            ts.iter()
                .map(|x| substitute_var(x, name, replacement))
                .collect(),
        ),
        SmtTerm::Ite(c, a, b) => SmtTerm::ite(
            substitute_var(c, name, replacement),
            substitute_var(a, name, replacement),
            substitute_var(b, name, replacement),
        ),
        SmtTerm::ForAll(bs, body) => SmtTerm::ForAll(
            bs.clone(),
            Box::new(substitute_var(body, name, replacement)),
        ),
        SmtTerm::Exists(bs, body) => SmtTerm::Exists(
            bs.clone(),
            Box::new(substitute_var(body, name, replacement)),
        ),
        SmtTerm::App(f, args) => SmtTerm::App(
            f.clone(),
            args.iter()
                .map(|x| substitute_var(x, name, replacement))
                .collect(),
        ),
    }
}

fn sub2(orig: &SmtTerm, a: &SmtTerm, b: &SmtTerm, name: &str, rep: &SmtTerm) -> SmtTerm {
    let na = substitute_var(a, name, rep);
    let nb = substitute_var(b, name, rep);
    match orig {
        SmtTerm::Add(_, _) => na.add(nb),
        SmtTerm::Sub(_, _) => na.sub(nb),
        SmtTerm::Mul(_, _) => na.mul(nb),
        SmtTerm::Div(_, _) => na.div(nb),
        SmtTerm::Eq(_, _) => na.eq(nb),
        SmtTerm::Lt(_, _) => na.lt(nb),
        SmtTerm::Le(_, _) => na.le(nb),
        SmtTerm::Gt(_, _) => na.gt(nb),
        SmtTerm::Ge(_, _) => na.ge(nb),
        SmtTerm::Implies(_, _) => na.implies(nb),
        _ => unreachable!("sub2 called on non-binary term"),
    }
}

fn rebuild1(orig: &SmtTerm, inner: SmtTerm) -> SmtTerm {
    match orig {
        SmtTerm::Neg(_) => inner.neg(),
        SmtTerm::Not(_) => inner.not(),
        _ => unreachable!("rebuild1 called on non-unary term"),
    }
}

/// Encode a projected PMRS function for `define-fun-rec`.
pub fn encode_funcdef(
    f: &FuncDef,
) -> Result<(String, Vec<(String, SmtSort)>, SmtSort, SmtTerm), EncodeError> {
    let args = f
        .args
        .iter()
        .map(|a| Ok((a.name.clone(), sort_of_type(&a.ty)?)))
        .collect::<Result<Vec<_>, EncodeError>>()?;
    let ret = sort_of_type(&f.body.ty)?;
    let body = encode_term(&f.body)?;
    Ok((f.name.clone(), args, ret, body))
}

/// Decode a solver term into a typed IR term.
///
/// Solution bodies mention only the hole's formal arguments, literals,
/// the LIA operators, tuples, and registered constructors; anything else
/// is an [`EncodeError::UnknownSymbol`].
pub fn decode_term(
    ctx: &mut Context,
    smt: &SmtTerm,
    expected: &RType,
    env: &HashMap<String, Variable>,
) -> Result<Term, EncodeError> {
    match smt {
        SmtTerm::IntLit(n) => Ok(Term::int(*n)),
        SmtTerm::BoolLit(b) => Ok(Term::bool_(*b)),
        SmtTerm::Var(name) => env
            .get(name)
            .map(|v| Term::var(v.clone()))
            .ok_or_else(|| EncodeError::UnknownSymbol(name.clone())),
        SmtTerm::Neg(a) => Ok(Term::un(
            Unop::Neg,
            decode_term(ctx, a, &RType::Int, env)?,
        )),
        SmtTerm::Not(a) => Ok(Term::un(
            Unop::Not,
            decode_term(ctx, a, &RType::Bool, env)?,
        )),
        SmtTerm::Add(a, b) => decode_bin(ctx, Binop::Plus, a, b, &RType::Int, env),
        SmtTerm::Sub(a, b) => decode_bin(ctx, Binop::Minus, a, b, &RType::Int, env),
        SmtTerm::Mul(a, b) => decode_bin(ctx, Binop::Times, a, b, &RType::Int, env),
        SmtTerm::Div(a, b) => decode_bin(ctx, Binop::Div, a, b, &RType::Int, env),
        SmtTerm::Eq(a, b) => decode_bin(ctx, Binop::Eq, a, b, &RType::Int, env),
        SmtTerm::Lt(a, b) => decode_bin(ctx, Binop::Lt, a, b, &RType::Int, env),
        SmtTerm::Le(a, b) => decode_bin(ctx, Binop::Le, a, b, &RType::Int, env),
        SmtTerm::Gt(a, b) => decode_bin(ctx, Binop::Gt, a, b, &RType::Int, env),
        SmtTerm::Ge(a, b) => decode_bin(ctx, Binop::Ge, a, b, &RType::Int, env),
        SmtTerm::And(ts) => decode_nary(ctx, Binop::And, ts, env, true),
        SmtTerm::Or(ts) => decode_nary(ctx, Binop::Or, ts, env, false),
        SmtTerm::Implies(a, b) => {
            // a => b  ===  !a || b in the term language.
            let da = decode_term(ctx, a, &RType::Bool, env)?;
            let db = decode_term(ctx, b, &RType::Bool, env)?;
            Ok(Term::bin(Binop::Or, Term::un(Unop::Not, da), db))
        }
        SmtTerm::Ite(c, t, e) => {
            let dc = decode_term(ctx, c, &RType::Bool, env)?;
            let dt = decode_term(ctx, t, expected, env)?;
            let de = decode_term(ctx, e, expected, env)?;
            Ok(Term::ite(dc, dt, de))
        }
        SmtTerm::App(name, args) => {
            if name == "mkTuple" || name == "tuple" {
                let RType::Tuple(elems) = expected else {
                    return Err(EncodeError::Arity(format!(
                        "tuple result decoded at non-tuple type {expected}"
                    )));
                };
                if elems.len() != args.len() {
                    return Err(EncodeError::Arity("mkTuple".into()));
                }
                let decoded = args
                    .iter()
                    .zip(elems)
                    .map(|(a, ty)| decode_term(ctx, a, ty, env))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Term::tuple(decoded));
            }
            if let Some(rest) = name.strip_prefix("(_ tuple.select ") {
                let idx: usize = rest
                    .trim_end_matches(')')
                    .trim()
                    .parse()
                    .map_err(|_| EncodeError::UnknownSymbol(name.clone()))?;
                let inner = args
                    .first()
                    .ok_or_else(|| EncodeError::Arity(name.clone()))?;
                // The argument's tuple type comes from the environment.
                let decoded = decode_term(ctx, inner, &RType::Var(u32::MAX), env)?;
                return Ok(decoded.proj(idx));
            }
            let owner = ctx.registry().owner_of_variant(name).map(String::from);
            if let Some(owner) = owner {
                let applied = RType::named(owner);
                let payload = ctx
                    .registry()
                    .variant_payload(name, &applied)
                    .map_err(|e| EncodeError::UnknownSymbol(e.to_string()))?;
                if payload.len() != args.len() {
                    return Err(EncodeError::Arity(name.clone()));
                }
                let decoded = args
                    .iter()
                    .zip(&payload)
                    .map(|(a, ty)| decode_term(ctx, a, ty, env))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Term::data(name.clone(), decoded, applied));
            }
            if args.is_empty() {
                return env
                    .get(name)
                    .map(|v| Term::var(v.clone()))
                    .ok_or_else(|| EncodeError::UnknownSymbol(name.clone()));
            }
            Err(EncodeError::UnknownSymbol(name.clone()))
        }
        SmtTerm::ForAll(_, _) | SmtTerm::Exists(_, _) => {
            Err(EncodeError::Unsupported("quantifier in solution".into()))
        }
    }
}

fn decode_bin(
    ctx: &mut Context,
    op: Binop,
    a: &SmtTerm,
    b: &SmtTerm,
    operand_ty: &RType,
    env: &HashMap<String, Variable>,
) -> Result<Term, EncodeError> {
    let da = decode_term(ctx, a, operand_ty, env)?;
    let db = decode_term(ctx, b, operand_ty, env)?;
    Ok(Term::bin(op, da, db))
}

fn decode_nary(
    ctx: &mut Context,
    op: Binop,
    ts: &[SmtTerm],
    env: &HashMap<String, Variable>,
    empty: bool,
) -> Result<Term, EncodeError> {
    let mut iter = ts.iter();
    let Some(first) = iter.next() else {
        return Ok(Term::bool_(empty));
    };
    let mut acc = decode_term(ctx, first, &RType::Bool, env)?;
    for t in iter {
        let d = decode_term(ctx, t, &RType::Bool, env)?;
        acc = Term::bin(op, acc, d);
    }
    Ok(acc)
}
