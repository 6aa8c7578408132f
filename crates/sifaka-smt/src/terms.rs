use crate::sorts::SmtSort;

/// Abstract SMT term representation, solver-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtTerm {
    /// Variable or constant symbol reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Mul(Box<SmtTerm>, Box<SmtTerm>),
    Div(Box<SmtTerm>, Box<SmtTerm>),
    Neg(Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    // Quantifiers
    ForAll(Vec<(String, SmtSort)>, Box<SmtTerm>),
    Exists(Vec<(String, SmtSort)>, Box<SmtTerm>),

    // If-then-else
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),

    /// Application of a named function symbol: datatype constructor,
    /// selector, tester, or a defined/declared function.
    App(String, Vec<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn app(name: impl Into<String>, args: Vec<SmtTerm>) -> Self {
        SmtTerm::App(name.into(), args)
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: SmtTerm) -> Self {
        SmtTerm::Mul(Box::new(self), Box::new(other))
    }

    pub fn div(self, other: SmtTerm) -> Self {
        SmtTerm::Div(Box::new(self), Box::new(other))
    }

    pub fn neg(self) -> Self {
        SmtTerm::Neg(Box::new(self))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        SmtTerm::Implies(Box::new(self), Box::new(other))
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, els: SmtTerm) -> Self {
        SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(els))
    }

    /// Conjoin under an optional guard: `guard => self`.
    pub fn guarded(self, guard: Option<SmtTerm>) -> Self {
        match guard {
            Some(g) => g.implies(self),
            None => self,
        }
    }

    /// Function symbols applied anywhere in the term, deduplicated.
    pub fn applied_symbols(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let mut stack = vec![self];
        while let Some(t) = stack.pop() {
            match t {
                SmtTerm::App(name, args) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                    stack.extend(args.iter());
                }
                SmtTerm::Add(a, b)
                | SmtTerm::Sub(a, b)
                | SmtTerm::Mul(a, b)
                | SmtTerm::Div(a, b)
                | SmtTerm::Eq(a, b)
                | SmtTerm::Lt(a, b)
                | SmtTerm::Le(a, b)
                | SmtTerm::Gt(a, b)
                | SmtTerm::Ge(a, b)
                | SmtTerm::Implies(a, b) => {
                    stack.push(a);
                    stack.push(b);
                }
                SmtTerm::And(ts) | SmtTerm::Or(ts) => stack.extend(ts.iter()),
                SmtTerm::Not(a) | SmtTerm::Neg(a) => stack.push(a),
                SmtTerm::ForAll(_, b) | SmtTerm::Exists(_, b) => stack.push(b),
                SmtTerm::Ite(c, t2, e) => {
                    stack.push(c);
                    stack.push(t2);
                    stack.push(e);
                }
                _ => {}
            }
        }
        out
    }
}
