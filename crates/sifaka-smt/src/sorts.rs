/// SMT sorts used by the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Int,
    Bool,
    Str,
    /// A declared algebraic datatype, by name.
    Datatype(String),
    /// cvc5-style tuple sort.
    Tuple(Vec<SmtSort>),
}

impl SmtSort {
    pub fn datatype(name: impl Into<String>) -> Self {
        SmtSort::Datatype(name.into())
    }

    pub fn is_datatype(&self) -> bool {
        matches!(self, SmtSort::Datatype(_))
    }
}

/// One constructor of a declared datatype: name plus named selectors.
#[derive(Debug, Clone, PartialEq)]
pub struct DatatypeCtor {
    pub name: String,
    pub selectors: Vec<(String, SmtSort)>,
}

/// A `declare-datatypes` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DatatypeDecl {
    pub name: String,
    pub ctors: Vec<DatatypeCtor>,
}
