//! The term language.
//!
//! Terms are value objects: equality is structural (variables compare by
//! id), and every node carries its type. Boxes are the placeholders used
//! by the deduction engine when it rewrites an expression into a
//! composition of hole arguments.

use std::collections::HashMap;
use std::fmt;

use crate::types::RType;

/// Scalar constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Str(String),
    Char(char),
}

impl Constant {
    pub fn ty(&self) -> RType {
        match self {
            Constant::Int(_) => RType::Int,
            Constant::Bool(_) => RType::Bool,
            Constant::Str(_) => RType::Str,
            Constant::Char(_) => RType::Char,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Str(s) => write!(f, "{s:?}"),
            Constant::Char(c) => write!(f, "{c:?}"),
        }
    }
}

/// A typed variable. Identity is the numeric id; the name exists for
/// printing and solver output only.
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: u32,
    pub name: String,
    pub ty: RType,
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binop {
    Plus,
    Minus,
    Times,
    Div,
    Min,
    Max,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    And,
    Or,
}

impl Binop {
    pub fn is_comparison(&self) -> bool {
        matches!(self, Binop::Gt | Binop::Ge | Binop::Lt | Binop::Le | Binop::Eq)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Binop::And | Binop::Or)
    }

    pub fn result_type(&self) -> RType {
        if self.is_comparison() || self.is_boolean() {
            RType::Bool
        } else {
            RType::Int
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Binop::Plus => "+",
            Binop::Minus => "-",
            Binop::Times => "*",
            Binop::Div => "/",
            Binop::Min => "min",
            Binop::Max => "max",
            Binop::Gt => ">",
            Binop::Ge => ">=",
            Binop::Lt => "<",
            Binop::Le => "<=",
            Binop::Eq => "=",
            Binop::And => "&&",
            Binop::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unop {
    Neg,
    Not,
}

/// Placeholder inserted by the deduction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKind {
    /// Positional box: stands for the i-th bound argument of the hole.
    Pos(usize),
    /// Free box: stands for a yet-unassigned subexpression.
    Free(u32),
}

/// One arm of a match form.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub ctor: String,
    pub binders: Vec<Variable>,
    pub body: Term,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    Const(Constant),
    Var(Variable),
    Tuple(Vec<Term>),
    /// Tuple projection (0-based).
    Proj(Box<Term>, usize),
    Un(Unop, Box<Term>),
    Bin(Binop, Box<Term>, Box<Term>),
    Ite(Box<Term>, Box<Term>, Box<Term>),
    /// Application of a head term to arguments.
    App(Box<Term>, Vec<Term>),
    /// Data constructor application.
    Data(String, Vec<Term>),
    Match(Box<Term>, Vec<MatchCase>),
    Boxed(BoxKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub kind: TermKind,
    pub ty: RType,
}

impl Term {
    pub fn new(kind: TermKind, ty: RType) -> Self {
        Self { kind, ty }
    }

    pub fn int(n: i64) -> Self {
        Term::new(TermKind::Const(Constant::Int(n)), RType::Int)
    }

    pub fn bool_(b: bool) -> Self {
        Term::new(TermKind::Const(Constant::Bool(b)), RType::Bool)
    }

    pub fn var(v: Variable) -> Self {
        let ty = v.ty.clone();
        Term::new(TermKind::Var(v), ty)
    }

    pub fn tuple(elems: Vec<Term>) -> Self {
        let ty = RType::Tuple(elems.iter().map(|e| e.ty.clone()).collect());
        Term::new(TermKind::Tuple(elems), ty)
    }

    pub fn proj(self, idx: usize) -> Self {
        let ty = match &self.ty {
            RType::Tuple(elems) if idx < elems.len() => elems[idx].clone(),
            other => other.clone(),
        };
        Term::new(TermKind::Proj(Box::new(self), idx), ty)
    }

    pub fn bin(op: Binop, lhs: Term, rhs: Term) -> Self {
        let ty = op.result_type();
        Term::new(TermKind::Bin(op, Box::new(lhs), Box::new(rhs)), ty)
    }

    pub fn un(op: Unop, arg: Term) -> Self {
        let ty = match op {
            Unop::Neg => RType::Int,
            Unop::Not => RType::Bool,
        };
        Term::new(TermKind::Un(op, Box::new(arg)), ty)
    }

    pub fn ite(cond: Term, then: Term, els: Term) -> Self {
        let ty = then.ty.clone();
        Term::new(
            TermKind::Ite(Box::new(cond), Box::new(then), Box::new(els)),
            ty,
        )
    }

    pub fn app(head: Term, args: Vec<Term>, ty: RType) -> Self {
        Term::new(TermKind::App(Box::new(head), args), ty)
    }

    pub fn data(ctor: impl Into<String>, args: Vec<Term>, ty: RType) -> Self {
        Term::new(TermKind::Data(ctor.into(), args), ty)
    }

    pub fn boxed(kind: BoxKind, ty: RType) -> Self {
        Term::new(TermKind::Boxed(kind), ty)
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match &self.kind {
            TermKind::Const(Constant::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_const_bool(&self) -> Option<bool> {
        match &self.kind {
            TermKind::Const(Constant::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Variable> {
        match &self.kind {
            TermKind::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Structural size (node count).
    pub fn size(&self) -> usize {
        1 + match &self.kind {
            TermKind::Const(_) | TermKind::Var(_) | TermKind::Boxed(_) => 0,
            TermKind::Tuple(elems) | TermKind::Data(_, elems) => {
                elems.iter().map(Term::size).sum()
            }
            TermKind::Proj(t, _) | TermKind::Un(_, t) => t.size(),
            TermKind::Bin(_, a, b) => a.size() + b.size(),
            TermKind::Ite(c, t, e) => c.size() + t.size() + e.size(),
            TermKind::App(h, args) => h.size() + args.iter().map(Term::size).sum::<usize>(),
            TermKind::Match(s, cases) => {
                s.size() + cases.iter().map(|c| c.body.size()).sum::<usize>()
            }
        }
    }

    /// Free variables, deduplicated, in first-occurrence order.
    pub fn free_variables(&self) -> Vec<Variable> {
        let mut out: Vec<Variable> = Vec::new();
        let mut bound: Vec<u32> = Vec::new();
        self.collect_free(&mut bound, &mut out);
        out
    }

    fn collect_free(&self, bound: &mut Vec<u32>, out: &mut Vec<Variable>) {
        match &self.kind {
            TermKind::Var(v) => {
                if !bound.contains(&v.id) && !out.iter().any(|w| w.id == v.id) {
                    out.push(v.clone());
                }
            }
            TermKind::Const(_) | TermKind::Boxed(_) => {}
            TermKind::Tuple(elems) | TermKind::Data(_, elems) => {
                for e in elems {
                    e.collect_free(bound, out);
                }
            }
            TermKind::Proj(t, _) | TermKind::Un(_, t) => t.collect_free(bound, out),
            TermKind::Bin(_, a, b) => {
                a.collect_free(bound, out);
                b.collect_free(bound, out);
            }
            TermKind::Ite(c, t, e) => {
                c.collect_free(bound, out);
                t.collect_free(bound, out);
                e.collect_free(bound, out);
            }
            TermKind::App(h, args) => {
                h.collect_free(bound, out);
                for a in args {
                    a.collect_free(bound, out);
                }
            }
            TermKind::Match(s, cases) => {
                s.collect_free(bound, out);
                for c in cases {
                    let n = bound.len();
                    bound.extend(c.binders.iter().map(|b| b.id));
                    c.body.collect_free(bound, out);
                    bound.truncate(n);
                }
            }
        }
    }

    /// Collect every subterm, preorder.
    pub fn subterms(&self) -> Vec<&Term> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(t) = stack.pop() {
            out.push(t);
            match &t.kind {
                TermKind::Const(_) | TermKind::Var(_) | TermKind::Boxed(_) => {}
                TermKind::Tuple(elems) | TermKind::Data(_, elems) => {
                    stack.extend(elems.iter().rev())
                }
                TermKind::Proj(s, _) | TermKind::Un(_, s) => stack.push(s),
                TermKind::Bin(_, a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
                TermKind::Ite(c, t2, e) => {
                    stack.push(e);
                    stack.push(t2);
                    stack.push(c);
                }
                TermKind::App(h, args) => {
                    stack.extend(args.iter().rev());
                    stack.push(h);
                }
                TermKind::Match(s, cases) => {
                    for c in cases.iter().rev() {
                        stack.push(&c.body);
                    }
                    stack.push(s);
                }
            }
        }
        out
    }

    pub fn contains(&self, sub: &Term) -> bool {
        self.subterms().iter().any(|t| *t == sub)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TermKind::Const(c) => write!(f, "{c}"),
            TermKind::Var(v) => write!(f, "{v}"),
            TermKind::Tuple(elems) => {
                let inner: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", inner.join(", "))
            }
            TermKind::Proj(t, i) => write!(f, "{t}.{i}"),
            TermKind::Un(Unop::Neg, t) => write!(f, "(- {t})"),
            TermKind::Un(Unop::Not, t) => write!(f, "(not {t})"),
            TermKind::Bin(op @ (Binop::Min | Binop::Max), a, b) => {
                write!(f, "{}({a}, {b})", op.symbol())
            }
            TermKind::Bin(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
            TermKind::Ite(c, t, e) => write!(f, "(if {c} then {t} else {e})"),
            TermKind::App(h, args) => {
                write!(f, "{h}")?;
                for a in args {
                    write!(f, " {}", parenthesized(a))?;
                }
                Ok(())
            }
            TermKind::Data(ctor, args) => {
                if args.is_empty() {
                    write!(f, "{ctor}")
                } else {
                    let inner: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "{ctor}({})", inner.join(", "))
                }
            }
            TermKind::Match(s, cases) => {
                write!(f, "(match {s} with")?;
                for c in cases {
                    let binders: Vec<String> = c.binders.iter().map(|b| b.to_string()).collect();
                    write!(f, " | {}({}) -> {}", c.ctor, binders.join(", "), c.body)?;
                }
                write!(f, ")")
            }
            TermKind::Boxed(BoxKind::Pos(i)) => write!(f, "[{i}]"),
            TermKind::Boxed(BoxKind::Free(i)) => write!(f, "[?{i}]"),
        }
    }
}

fn parenthesized(t: &Term) -> String {
    match &t.kind {
        TermKind::Const(_) | TermKind::Var(_) | TermKind::Tuple(_) | TermKind::Boxed(_) => {
            t.to_string()
        }
        TermKind::Data(_, args) if args.is_empty() => t.to_string(),
        _ => format!("({t})"),
    }
}

/// Substitution from variable ids to terms.
#[derive(Debug, Clone, Default)]
pub struct VarSubst {
    map: HashMap<u32, Term>,
}

impl VarSubst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, var: &Variable, term: Term) {
        self.map.insert(var.id, term);
    }

    pub fn get(&self, id: u32) -> Option<&Term> {
        self.map.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn apply(&self, t: &Term) -> Term {
        match &t.kind {
            TermKind::Var(v) => self.map.get(&v.id).cloned().unwrap_or_else(|| t.clone()),
            TermKind::Const(_) | TermKind::Boxed(_) => t.clone(),
            TermKind::Tuple(elems) => Term::new(
                TermKind::Tuple(elems.iter().map(|e| self.apply(e)).collect()),
                t.ty.clone(),
            ),
            TermKind::Data(ctor, args) => Term::new(
                TermKind::Data(ctor.clone(), args.iter().map(|a| self.apply(a)).collect()),
                t.ty.clone(),
            ),
            TermKind::Proj(s, i) => Term::new(
                TermKind::Proj(Box::new(self.apply(s)), *i),
                t.ty.clone(),
            ),
            TermKind::Un(op, s) => Term::new(
                TermKind::Un(*op, Box::new(self.apply(s))),
                t.ty.clone(),
            ),
            TermKind::Bin(op, a, b) => Term::new(
                TermKind::Bin(*op, Box::new(self.apply(a)), Box::new(self.apply(b))),
                t.ty.clone(),
            ),
            TermKind::Ite(c, th, el) => Term::new(
                TermKind::Ite(
                    Box::new(self.apply(c)),
                    Box::new(self.apply(th)),
                    Box::new(self.apply(el)),
                ),
                t.ty.clone(),
            ),
            TermKind::App(h, args) => Term::new(
                TermKind::App(
                    Box::new(self.apply(h)),
                    args.iter().map(|a| self.apply(a)).collect(),
                ),
                t.ty.clone(),
            ),
            TermKind::Match(s, cases) => {
                // Match binders shadow; a binder id never collides with a
                // substituted id because all ids come from one allocator.
                let cases = cases
                    .iter()
                    .map(|c| MatchCase {
                        ctor: c.ctor.clone(),
                        binders: c.binders.clone(),
                        body: self.apply(&c.body),
                    })
                    .collect();
                Term::new(TermKind::Match(Box::new(self.apply(s)), cases), t.ty.clone())
            }
        }
    }
}

/// Replace every structural occurrence of `from` in `t` by `to`.
pub fn replace(t: &Term, from: &Term, to: &Term) -> Term {
    if t == from {
        return to.clone();
    }
    let kind = match &t.kind {
        TermKind::Const(_) | TermKind::Var(_) | TermKind::Boxed(_) => return t.clone(),
        TermKind::Tuple(elems) => {
            TermKind::Tuple(elems.iter().map(|e| replace(e, from, to)).collect())
        }
        TermKind::Data(ctor, args) => TermKind::Data(
            ctor.clone(),
            args.iter().map(|a| replace(a, from, to)).collect(),
        ),
        TermKind::Proj(s, i) => TermKind::Proj(Box::new(replace(s, from, to)), *i),
        TermKind::Un(op, s) => TermKind::Un(*op, Box::new(replace(s, from, to))),
        TermKind::Bin(op, a, b) => TermKind::Bin(
            *op,
            Box::new(replace(a, from, to)),
            Box::new(replace(b, from, to)),
        ),
        TermKind::Ite(c, th, el) => TermKind::Ite(
            Box::new(replace(c, from, to)),
            Box::new(replace(th, from, to)),
            Box::new(replace(el, from, to)),
        ),
        TermKind::App(h, args) => TermKind::App(
            Box::new(replace(h, from, to)),
            args.iter().map(|a| replace(a, from, to)).collect(),
        ),
        TermKind::Match(s, cases) => TermKind::Match(
            Box::new(replace(s, from, to)),
            cases
                .iter()
                .map(|c| MatchCase {
                    ctor: c.ctor.clone(),
                    binders: c.binders.clone(),
                    body: replace(&c.body, from, to),
                })
                .collect(),
        ),
    };
    Term::new(kind, t.ty.clone())
}

/// Match `t` against `pattern`, whose variables act as wildcards.
///
/// Returns the witnessing substitution when `t` is an instance of the
/// pattern; repeated pattern variables must match equal subterms.
pub fn matches_subpattern(t: &Term, pattern: &Term) -> Option<VarSubst> {
    let mut subst = VarSubst::new();
    if match_into(t, pattern, &mut subst) {
        Some(subst)
    } else {
        None
    }
}

fn match_into(t: &Term, pattern: &Term, subst: &mut VarSubst) -> bool {
    match (&t.kind, &pattern.kind) {
        (_, TermKind::Var(v)) => match subst.get(v.id) {
            Some(prev) => prev == t,
            None => {
                subst.bind(v, t.clone());
                true
            }
        },
        (TermKind::Const(a), TermKind::Const(b)) => a == b,
        (TermKind::Tuple(a), TermKind::Tuple(b)) if a.len() == b.len() => {
            a.iter().zip(b).all(|(x, y)| match_into(x, y, subst))
        }
        (TermKind::Data(c1, a), TermKind::Data(c2, b)) if c1 == c2 && a.len() == b.len() => {
            a.iter().zip(b).all(|(x, y)| match_into(x, y, subst))
        }
        (TermKind::Proj(a, i), TermKind::Proj(b, j)) if i == j => match_into(a, b, subst),
        (TermKind::Un(o1, a), TermKind::Un(o2, b)) if o1 == o2 => match_into(a, b, subst),
        (TermKind::Bin(o1, a1, b1), TermKind::Bin(o2, a2, b2)) if o1 == o2 => {
            match_into(a1, a2, subst) && match_into(b1, b2, subst)
        }
        (TermKind::Ite(c1, t1, e1), TermKind::Ite(c2, t2, e2)) => {
            match_into(c1, c2, subst) && match_into(t1, t2, subst) && match_into(e1, e2, subst)
        }
        (TermKind::App(h1, a), TermKind::App(h2, b)) if a.len() == b.len() => {
            match_into(h1, h2, subst) && a.iter().zip(b).all(|(x, y)| match_into(x, y, subst))
        }
        (TermKind::Boxed(a), TermKind::Boxed(b)) => a == b,
        _ => false,
    }
}

/// Constant folding and trivial identities. Preserves logical equivalence.
pub fn simplify(t: &Term) -> Term {
    let t = map_children(t, simplify);
    match &t.kind {
        TermKind::Un(Unop::Neg, a) => match a.as_const_int() {
            Some(n) => Term::int(-n),
            None => t,
        },
        TermKind::Un(Unop::Not, a) => match a.as_const_bool() {
            Some(b) => Term::bool_(!b),
            None => t,
        },
        TermKind::Bin(op, a, b) => fold_bin(*op, a, b).unwrap_or(t),
        TermKind::Ite(c, th, el) => match c.as_const_bool() {
            Some(true) => th.as_ref().clone(),
            Some(false) => el.as_ref().clone(),
            None => {
                if th == el {
                    th.as_ref().clone()
                } else {
                    t
                }
            }
        },
        TermKind::Proj(s, i) => match &s.kind {
            TermKind::Tuple(elems) if *i < elems.len() => elems[*i].clone(),
            _ => t,
        },
        _ => t,
    }
}

fn fold_bin(op: Binop, a: &Term, b: &Term) -> Option<Term> {
    if let (Some(x), Some(y)) = (a.as_const_int(), b.as_const_int()) {
        return Some(match op {
            Binop::Plus => Term::int(x + y),
            Binop::Minus => Term::int(x - y),
            Binop::Times => Term::int(x * y),
            Binop::Div if y != 0 => Term::int(x / y),
            Binop::Div => return None,
            Binop::Min => Term::int(x.min(y)),
            Binop::Max => Term::int(x.max(y)),
            Binop::Gt => Term::bool_(x > y),
            Binop::Ge => Term::bool_(x >= y),
            Binop::Lt => Term::bool_(x < y),
            Binop::Le => Term::bool_(x <= y),
            Binop::Eq => Term::bool_(x == y),
            Binop::And | Binop::Or => return None,
        });
    }
    if let (Some(x), Some(y)) = (a.as_const_bool(), b.as_const_bool()) {
        return Some(match op {
            Binop::And => Term::bool_(x && y),
            Binop::Or => Term::bool_(x || y),
            Binop::Eq => Term::bool_(x == y),
            _ => return None,
        });
    }
    // Unit and absorbing elements.
    match op {
        Binop::Plus => {
            if a.as_const_int() == Some(0) {
                return Some(b.clone());
            }
            if b.as_const_int() == Some(0) {
                return Some(a.clone());
            }
        }
        Binop::Times => {
            if a.as_const_int() == Some(1) {
                return Some(b.clone());
            }
            if b.as_const_int() == Some(1) {
                return Some(a.clone());
            }
            if a.as_const_int() == Some(0) || b.as_const_int() == Some(0) {
                return Some(Term::int(0));
            }
        }
        Binop::Minus => {
            if b.as_const_int() == Some(0) {
                return Some(a.clone());
            }
        }
        Binop::And => {
            if a.as_const_bool() == Some(true) {
                return Some(b.clone());
            }
            if b.as_const_bool() == Some(true) {
                return Some(a.clone());
            }
            if a.as_const_bool() == Some(false) || b.as_const_bool() == Some(false) {
                return Some(Term::bool_(false));
            }
        }
        Binop::Or => {
            if a.as_const_bool() == Some(false) {
                return Some(b.clone());
            }
            if b.as_const_bool() == Some(false) {
                return Some(a.clone());
            }
            if a.as_const_bool() == Some(true) || b.as_const_bool() == Some(true) {
                return Some(Term::bool_(true));
            }
        }
        Binop::Eq => {
            if a == b {
                return Some(Term::bool_(true));
            }
        }
        _ => {}
    }
    None
}

fn map_children(t: &Term, f: impl Fn(&Term) -> Term + Copy) -> Term {
    let kind = match &t.kind {
        TermKind::Const(_) | TermKind::Var(_) | TermKind::Boxed(_) => return t.clone(),
        TermKind::Tuple(elems) => TermKind::Tuple(elems.iter().map(f).collect()),
        TermKind::Data(ctor, args) => TermKind::Data(ctor.clone(), args.iter().map(f).collect()),
        TermKind::Proj(s, i) => TermKind::Proj(Box::new(f(s)), *i),
        TermKind::Un(op, s) => TermKind::Un(*op, Box::new(f(s))),
        TermKind::Bin(op, a, b) => TermKind::Bin(*op, Box::new(f(a)), Box::new(f(b))),
        TermKind::Ite(c, th, el) => {
            TermKind::Ite(Box::new(f(c)), Box::new(f(th)), Box::new(f(el)))
        }
        TermKind::App(h, args) => TermKind::App(Box::new(f(h)), args.iter().map(f).collect()),
        TermKind::Match(s, cases) => TermKind::Match(
            Box::new(f(s)),
            cases
                .iter()
                .map(|c| MatchCase {
                    ctor: c.ctor.clone(),
                    binders: c.binders.clone(),
                    body: f(&c.body),
                })
                .collect(),
        ),
    };
    Term::new(kind, t.ty.clone())
}
