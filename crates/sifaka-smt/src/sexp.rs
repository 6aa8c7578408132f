//! A small S-expression reader for solver replies.
//!
//! Handles plain atoms, `|`-quoted symbols, string literals, and `;`
//! line comments, which covers the get-model and check-synth output of
//! both supported solvers.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn atom(s: impl Into<String>) -> Self {
        Sexp::Atom(s.into())
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(a) => Some(a),
            Sexp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            Sexp::Atom(_) => None,
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(a) => write!(f, "{a}"),
            Sexp::List(items) => {
                let inner: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "({})", inner.join(" "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SexpError {
    #[error("unbalanced parentheses at byte {0}")]
    Unbalanced(usize),
    #[error("unterminated quoted symbol")]
    UnterminatedQuote,
    #[error("unterminated string literal")]
    UnterminatedString,
}

/// Parse every toplevel S-expression in `input`.
pub fn parse_sexps(input: &str) -> Result<Vec<Sexp>, SexpError> {
    let mut chars = input.char_indices().peekable();
    let mut stack: Vec<Vec<Sexp>> = Vec::new();
    let mut top: Vec<Sexp> = Vec::new();
    while let Some((pos, c)) = chars.next() {
        match c {
            ';' => {
                for (_, c2) in chars.by_ref() {
                    if c2 == '\n' {
                        break;
                    }
                }
            }
            '(' => stack.push(std::mem::take(&mut top)),
            ')' => {
                let done = Sexp::List(std::mem::take(&mut top));
                match stack.pop() {
                    Some(parent) => {
                        top = parent;
                        top.push(done);
                    }
                    None => return Err(SexpError::Unbalanced(pos)),
                }
            }
            '|' => {
                let mut buf = String::new();
                let mut closed = false;
                for (_, c2) in chars.by_ref() {
                    if c2 == '|' {
                        closed = true;
                        break;
                    }
                    buf.push(c2);
                }
                if !closed {
                    return Err(SexpError::UnterminatedQuote);
                }
                top.push(Sexp::Atom(buf));
            }
            '"' => {
                let mut buf = String::from('"');
                let mut closed = false;
                for (_, c2) in chars.by_ref() {
                    buf.push(c2);
                    if c2 == '"' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(SexpError::UnterminatedString);
                }
                top.push(Sexp::Atom(buf));
            }
            c if c.is_whitespace() => {}
            _ => {
                let mut buf = String::from(c);
                while let Some((_, c2)) = chars.peek() {
                    if c2.is_whitespace() || *c2 == '(' || *c2 == ')' || *c2 == ';' {
                        break;
                    }
                    buf.push(*c2);
                    chars.next();
                }
                top.push(Sexp::Atom(buf));
            }
        }
    }
    if !stack.is_empty() {
        return Err(SexpError::Unbalanced(input.len()));
    }
    Ok(top)
}
