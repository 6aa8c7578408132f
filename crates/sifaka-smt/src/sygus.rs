//! SyGuS v2 command model: problem emission and response parsing.
//!
//! The engine builds a command list (`set-logic`, `synth-fun` with an
//! optional grammar, `declare-var`, `constraint`, `check-synth`), the
//! backend runs it in batch mode, and the response comes back as either
//! synthesized definitions or one of `infeasible` / `fail` / `unknown`.

use thiserror::Error;

use crate::backends::smtlib_printer::{sort_to_smtlib, to_smtlib};
use crate::sexp::{parse_sexps, Sexp, SexpError};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// One production of a grammar non-terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarProd {
    /// A term over variables, literals, operators, and non-terminal names.
    Term(SmtTerm),
    /// The `(Constant S)` production.
    ConstantOf(SmtSort),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrammarNonterminal {
    pub name: String,
    pub sort: SmtSort,
    pub productions: Vec<GrammarProd>,
}

/// A SyGuS grammar: ordered non-terminals, the first being the start
/// symbol.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grammar {
    pub nonterminals: Vec<GrammarNonterminal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthFun {
    pub name: String,
    pub args: Vec<(String, SmtSort)>,
    pub ret: SmtSort,
    pub grammar: Option<Grammar>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SygusCommand {
    SetLogic(String),
    DeclareVar(String, SmtSort),
    DefineFun {
        name: String,
        args: Vec<(String, SmtSort)>,
        ret: SmtSort,
        body: SmtTerm,
    },
    SynthFun(SynthFun),
    Constraint(SmtTerm),
    CheckSynth,
}

/// Print one command in SyGuS v2 concrete syntax.
pub fn print_command(cmd: &SygusCommand) -> String {
    match cmd {
        SygusCommand::SetLogic(logic) => format!("(set-logic {logic})"),
        SygusCommand::DeclareVar(name, sort) => {
            format!("(declare-var {name} {})", sort_to_smtlib(sort))
        }
        SygusCommand::DefineFun {
            name,
            args,
            ret,
            body,
        } => {
            let arg_s: Vec<String> = args
                .iter()
                .map(|(n, s)| format!("({n} {})", sort_to_smtlib(s)))
                .collect();
            format!(
                "(define-fun {name} ({}) {} {})",
                arg_s.join(" "),
                sort_to_smtlib(ret),
                to_smtlib(body)
            )
        }
        SygusCommand::SynthFun(sf) => print_synth_fun(sf),
        SygusCommand::Constraint(term) => format!("(constraint {})", to_smtlib(term)),
        SygusCommand::CheckSynth => "(check-synth)".to_string(),
    }
}

fn print_synth_fun(sf: &SynthFun) -> String {
    let arg_s: Vec<String> = sf
        .args
        .iter()
        .map(|(n, s)| format!("({n} {})", sort_to_smtlib(s)))
        .collect();
    let header = format!(
        "(synth-fun {} ({}) {}",
        sf.name,
        arg_s.join(" "),
        sort_to_smtlib(&sf.ret)
    );
    match &sf.grammar {
        None => format!("{header})"),
        Some(g) => {
            let decls: Vec<String> = g
                .nonterminals
                .iter()
                .map(|nt| format!("({} {})", nt.name, sort_to_smtlib(&nt.sort)))
                .collect();
            let groups: Vec<String> = g
                .nonterminals
                .iter()
                .map(|nt| {
                    let prods: Vec<String> = nt
                        .productions
                        .iter()
                        .map(|p| match p {
                            GrammarProd::Term(t) => to_smtlib(t),
                            GrammarProd::ConstantOf(s) => {
                                format!("(Constant {})", sort_to_smtlib(s))
                            }
                        })
                        .collect();
                    format!(
                        "({} {} ({}))",
                        nt.name,
                        sort_to_smtlib(&nt.sort),
                        prods.join(" ")
                    )
                })
                .collect();
            format!(
                "{header}\n  ({})\n  ({}))",
                decls.join(" "),
                groups.join("\n   ")
            )
        }
    }
}

/// Print a whole problem, one command per line.
pub fn print_problem(cmds: &[SygusCommand]) -> String {
    let mut out = String::new();
    for c in cmds {
        out.push_str(&print_command(c));
        out.push('\n');
    }
    out
}

/// One synthesized definition from a successful check-synth.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthFunDef {
    pub name: String,
    pub args: Vec<(String, SmtSort)>,
    pub ret: SmtSort,
    pub body: SmtTerm,
}

/// Solver answer to `check-synth`.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthResponse {
    Success(Vec<SynthFunDef>),
    Infeasible,
    Fail,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SygusParseError {
    #[error("bad S-expression in solver output: {0}")]
    Sexp(#[from] SexpError),
    #[error("unexpected solver output: {0}")]
    Unexpected(String),
    #[error("malformed define-fun: {0}")]
    MalformedDefineFun(String),
    #[error("unknown sort: {0}")]
    UnknownSort(String),
}

/// Parse the complete output of a batch SyGuS run.
pub fn parse_response(text: &str) -> Result<SynthResponse, SygusParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(SynthResponse::Unknown("empty solver output".into()));
    }
    match trimmed {
        "infeasible" => return Ok(SynthResponse::Infeasible),
        "fail" => return Ok(SynthResponse::Fail),
        "unknown" => return Ok(SynthResponse::Unknown("solver returned unknown".into())),
        _ => {}
    }
    let forms = parse_sexps(trimmed)?;
    let mut defs = Vec::new();
    for form in flatten_response_forms(&forms) {
        match form {
            Sexp::Atom(a) => match a.as_str() {
                "infeasible" => return Ok(SynthResponse::Infeasible),
                "fail" => return Ok(SynthResponse::Fail),
                "unknown" => {
                    return Ok(SynthResponse::Unknown("solver returned unknown".into()))
                }
                other => return Err(SygusParseError::Unexpected(other.to_string())),
            },
            Sexp::List(items) => defs.push(parse_define_fun(items)?),
        }
    }
    Ok(SynthResponse::Success(defs))
}

/// cvc5 wraps the definitions in one outer list; unwrap it if present.
fn flatten_response_forms(forms: &[Sexp]) -> Vec<&Sexp> {
    if forms.len() == 1 {
        if let Sexp::List(items) = &forms[0] {
            let all_defs = items.iter().all(|i| {
                matches!(i, Sexp::List(inner)
                    if inner.first().and_then(Sexp::as_atom) == Some("define-fun"))
            });
            if all_defs && !items.is_empty() {
                return items.iter().collect();
            }
        }
    }
    forms.iter().collect()
}

fn parse_define_fun(items: &[Sexp]) -> Result<SynthFunDef, SygusParseError> {
    let text = || Sexp::List(items.to_vec()).to_string();
    if items.first().and_then(Sexp::as_atom) != Some("define-fun") || items.len() != 5 {
        return Err(SygusParseError::MalformedDefineFun(text()));
    }
    let name = items[1]
        .as_atom()
        .ok_or_else(|| SygusParseError::MalformedDefineFun(text()))?
        .to_string();
    let args = items[2]
        .as_list()
        .ok_or_else(|| SygusParseError::MalformedDefineFun(text()))?
        .iter()
        .map(|a| {
            let pair = a
                .as_list()
                .ok_or_else(|| SygusParseError::MalformedDefineFun(text()))?;
            let n = pair
                .first()
                .and_then(Sexp::as_atom)
                .ok_or_else(|| SygusParseError::MalformedDefineFun(text()))?;
            let s = pair
                .get(1)
                .ok_or_else(|| SygusParseError::MalformedDefineFun(text()))?;
            Ok((n.to_string(), sort_of_sexp(s)?))
        })
        .collect::<Result<Vec<_>, SygusParseError>>()?;
    let ret = sort_of_sexp(&items[3])?;
    let body = term_of_sexp(&items[4]);
    Ok(SynthFunDef {
        name,
        args,
        ret,
        body,
    })
}

pub fn sort_of_sexp(s: &Sexp) -> Result<SmtSort, SygusParseError> {
    match s {
        Sexp::Atom(a) => Ok(match a.as_str() {
            "Int" => SmtSort::Int,
            "Bool" => SmtSort::Bool,
            "String" => SmtSort::Str,
            name => SmtSort::datatype(name),
        }),
        Sexp::List(items) => {
            if items.first().and_then(Sexp::as_atom) == Some("Tuple") {
                let elems = items[1..]
                    .iter()
                    .map(sort_of_sexp)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SmtSort::Tuple(elems))
            } else {
                Err(SygusParseError::UnknownSort(
                    Sexp::List(items.clone()).to_string(),
                ))
            }
        }
    }
}

/// Convert a solver term S-expression into an [`SmtTerm`].
pub fn term_of_sexp(s: &Sexp) -> SmtTerm {
    match s {
        Sexp::Atom(a) => {
            if let Ok(n) = a.parse::<i64>() {
                SmtTerm::IntLit(n)
            } else if a == "true" {
                SmtTerm::BoolLit(true)
            } else if a == "false" {
                SmtTerm::BoolLit(false)
            } else {
                SmtTerm::Var(a.clone())
            }
        }
        Sexp::List(items) => {
            let Some(head) = items.first().and_then(Sexp::as_atom) else {
                // Indexed identifiers like ((_ tuple.select 0) x) keep
                // their printed head as the application symbol.
                if let Some(Sexp::List(h)) = items.first() {
                    if h.first().and_then(Sexp::as_atom) == Some("_") {
                        let name = Sexp::List(h.clone()).to_string();
                        let args = items[1..].iter().map(term_of_sexp).collect();
                        return SmtTerm::App(name, args);
                    }
                }
                return SmtTerm::Var(Sexp::List(items.clone()).to_string());
            };
            let mut args: Vec<SmtTerm> = items[1..].iter().map(term_of_sexp).collect();
            let pop2 = |args: &mut Vec<SmtTerm>| {
                let b = args.pop().expect("arity checked");
                let a = args.pop().expect("arity checked");
                (a, b)
            };
            match (head, args.len()) {
                ("+", 2) => { let (a, b) = pop2(&mut args); a.add(b) }
                ("-", 1) => args.pop().expect("arity checked").neg(),
                ("-", 2) => { let (a, b) = pop2(&mut args); a.sub(b) }
                ("*", 2) => { let (a, b) = pop2(&mut args); a.mul(b) }
                ("div", 2) => { let (a, b) = pop2(&mut args); a.div(b) }
                ("=", 2) => { let (a, b) = pop2(&mut args); a.eq(b) }
                ("<", 2) => { let (a, b) = pop2(&mut args); a.lt(b) }
                ("<=", 2) => { let (a, b) = pop2(&mut args); a.le(b) }
                (">", 2) => { let (a, b) = pop2(&mut args); a.gt(b) }
                (">=", 2) => { let (a, b) = pop2(&mut args); a.ge(b) }
                ("=>", 2) => { let (a, b) = pop2(&mut args); a.implies(b) }
                ("not", 1) => args.pop().expect("arity checked").not(),
                ("and", _) => SmtTerm::And(args),
                ("or", _) => SmtTerm::Or(args),
                ("ite", 3) => {
                    let e = args.pop().expect("arity checked");
                    let (c, t) = pop2(&mut args);
                    SmtTerm::ite(c, t, e)
                }
                _ => SmtTerm::App(head.to_string(), args),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_grammar() -> Grammar {
        Grammar {
            nonterminals: vec![
                GrammarNonterminal {
                    name: "Ix".into(),
                    sort: SmtSort::Int,
                    productions: vec![
                        GrammarProd::Term(SmtTerm::var("a")),
                        GrammarProd::Term(SmtTerm::var("Ic")),
                        GrammarProd::Term(SmtTerm::var("Ix").add(SmtTerm::var("Ix"))),
                    ],
                },
                GrammarNonterminal {
                    name: "Ic".into(),
                    sort: SmtSort::Int,
                    productions: vec![GrammarProd::ConstantOf(SmtSort::Int)],
                },
            ],
        }
    }

    #[test]
    fn print_synth_fun_with_grammar() {
        let sf = SynthFun {
            name: "join".into(),
            args: vec![("a".into(), SmtSort::Int)],
            ret: SmtSort::Int,
            grammar: Some(int_grammar()),
        };
        let out = print_command(&SygusCommand::SynthFun(sf));
        assert!(out.starts_with("(synth-fun join ((a Int)) Int"));
        assert!(out.contains("((Ix Int) (Ic Int))"));
        assert!(out.contains("(Ix Int (a Ic (+ Ix Ix)))"));
        assert!(out.contains("(Ic Int ((Constant Int)))"));
    }

    #[test]
    fn print_synth_fun_without_grammar_is_flat() {
        let sf = SynthFun {
            name: "f".into(),
            args: vec![],
            ret: SmtSort::Bool,
            grammar: None,
        };
        assert_eq!(
            print_command(&SygusCommand::SynthFun(sf)),
            "(synth-fun f () Bool)"
        );
    }

    #[test]
    fn print_constraint_and_declare_var() {
        let c = SygusCommand::Constraint(SmtTerm::var("x").eq(SmtTerm::int(3)));
        assert_eq!(print_command(&c), "(constraint (= x 3))");
        let d = SygusCommand::DeclareVar("x".into(), SmtSort::Int);
        assert_eq!(print_command(&d), "(declare-var x Int)");
    }

    #[test]
    fn parse_success_with_wrapped_definitions() {
        let out = r#"(
(define-fun f0 () Int 0)
(define-fun join ((a Int) (b Int)) Int (+ a b))
)"#;
        match parse_response(out).unwrap() {
            SynthResponse::Success(defs) => {
                assert_eq!(defs.len(), 2);
                assert_eq!(defs[0].name, "f0");
                assert_eq!(defs[0].body, SmtTerm::int(0));
                assert_eq!(defs[1].args.len(), 2);
                assert_eq!(
                    defs[1].body,
                    SmtTerm::var("a").add(SmtTerm::var("b"))
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn parse_unwrapped_definition_stream() {
        let out = "(define-fun f0 () Int (- 1))";
        match parse_response(out).unwrap() {
            SynthResponse::Success(defs) => {
                assert_eq!(defs[0].body, SmtTerm::int(1).neg());
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn parse_status_answers() {
        assert_eq!(parse_response("infeasible").unwrap(), SynthResponse::Infeasible);
        assert_eq!(parse_response("fail").unwrap(), SynthResponse::Fail);
        assert!(matches!(
            parse_response("unknown").unwrap(),
            SynthResponse::Unknown(_)
        ));
        assert!(matches!(
            parse_response("").unwrap(),
            SynthResponse::Unknown(_)
        ));
    }

    #[test]
    fn parse_ite_and_comparison_bodies() {
        let out = "(define-fun m ((a Int) (b Int)) Int (ite (>= a b) a b))";
        match parse_response(out).unwrap() {
            SynthResponse::Success(defs) => match &defs[0].body {
                SmtTerm::Ite(c, t, e) => {
                    assert!(matches!(**c, SmtTerm::Ge(_, _)));
                    assert_eq!(**t, SmtTerm::var("a"));
                    assert_eq!(**e, SmtTerm::var("b"));
                }
                other => panic!("expected ite, got {other:?}"),
            },
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn parse_constructor_application_body() {
        let out = "(define-fun w ((x Int)) (Tuple Int Bool) (mkTuple x true))";
        match parse_response(out).unwrap() {
            SynthResponse::Success(defs) => {
                assert_eq!(defs[0].ret, SmtSort::Tuple(vec![SmtSort::Int, SmtSort::Bool]));
                match &defs[0].body {
                    SmtTerm::App(name, args) => {
                        assert_eq!(name, "mkTuple");
                        assert_eq!(args.len(), 2);
                    }
                    other => panic!("expected application, got {other:?}"),
                }
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_response("flagrant nonsense").is_err());
    }
}
