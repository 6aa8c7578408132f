use crate::sorts::{DatatypeDecl, SmtSort};
use crate::terms::SmtTerm;

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => name.clone(),
        SmtTerm::IntLit(n) => {
            if *n < 0 {
                format!("(- {})", -n)
            } else {
                n.to_string()
            }
        }
        SmtTerm::BoolLit(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        SmtTerm::Add(lhs, rhs) => format!("(+ {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Sub(lhs, rhs) => format!("(- {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Mul(lhs, rhs) => format!("(* {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Div(lhs, rhs) => format!("(div {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Neg(inner) => format!("(- {})", to_smtlib(inner)),
        SmtTerm::Eq(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Lt(lhs, rhs) => format!("(< {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Le(lhs, rhs) => format!("(<= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Gt(lhs, rhs) => format!("(> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Ge(lhs, rhs) => format!("(>= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::And(terms) => {
            if terms.is_empty() {
                "true".to_string()
            } else if terms.len() == 1 {
                to_smtlib(&terms[0])
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(and {})", inner.join(" "))
            }
        }
        SmtTerm::Or(terms) => {
            if terms.is_empty() {
                "false".to_string()
            } else if terms.len() == 1 {
                to_smtlib(&terms[0])
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(or {})", inner.join(" "))
            }
        }
        SmtTerm::Not(inner) => format!("(not {})", to_smtlib(inner)),
        SmtTerm::Implies(lhs, rhs) => {
            format!("(=> {} {})", to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::ForAll(bindings, body) => {
            let vars: Vec<String> = bindings
                .iter()
                .map(|(n, s)| format!("({n} {})", sort_to_smtlib(s)))
                .collect();
            format!("(forall ({}) {})", vars.join(" "), to_smtlib(body))
        }
        SmtTerm::Exists(bindings, body) => {
            let vars: Vec<String> = bindings
                .iter()
                .map(|(n, s)| format!("({n} {})", sort_to_smtlib(s)))
                .collect();
            format!("(exists ({}) {})", vars.join(" "), to_smtlib(body))
        }
        SmtTerm::Ite(cond, then, els) => {
            format!(
                "(ite {} {} {})",
                to_smtlib(cond),
                to_smtlib(then),
                to_smtlib(els)
            )
        }
        SmtTerm::App(name, args) => {
            if args.is_empty() {
                name.clone()
            } else {
                let inner: Vec<String> = args.iter().map(to_smtlib).collect();
                format!("({name} {})", inner.join(" "))
            }
        }
    }
}

/// Print a sort as SMT-LIB2 format.
pub fn sort_to_smtlib(sort: &SmtSort) -> String {
    match sort {
        SmtSort::Bool => "Bool".to_string(),
        SmtSort::Int => "Int".to_string(),
        SmtSort::Str => "String".to_string(),
        SmtSort::Datatype(name) => name.clone(),
        SmtSort::Tuple(elems) => {
            let inner: Vec<String> = elems.iter().map(sort_to_smtlib).collect();
            format!("(Tuple {})", inner.join(" "))
        }
    }
}

/// Print a `declare-datatypes` command for one group of declarations.
pub fn datatypes_to_smtlib(decls: &[DatatypeDecl]) -> String {
    let names: Vec<String> = decls.iter().map(|d| format!("({} 0)", d.name)).collect();
    let bodies: Vec<String> = decls
        .iter()
        .map(|d| {
            let ctors: Vec<String> = d
                .ctors
                .iter()
                .map(|c| {
                    if c.selectors.is_empty() {
                        format!("({})", c.name)
                    } else {
                        let sels: Vec<String> = c
                            .selectors
                            .iter()
                            .map(|(n, s)| format!("({n} {})", sort_to_smtlib(s)))
                            .collect();
                        format!("({} {})", c.name, sels.join(" "))
                    }
                })
                .collect();
            format!("({})", ctors.join(" "))
        })
        .collect();
    format!(
        "(declare-datatypes ({}) ({}))",
        names.join(" "),
        bodies.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorts::DatatypeCtor;

    #[test]
    fn print_simple_term() {
        let term = SmtTerm::var("x").add(SmtTerm::int(1)).ge(SmtTerm::int(0));
        assert_eq!(to_smtlib(&term), "(>= (+ x 1) 0)");
    }

    #[test]
    fn print_negative_integer() {
        assert_eq!(to_smtlib(&SmtTerm::int(-5)), "(- 5)");
    }

    #[test]
    fn print_and_or_empty_and_single() {
        assert_eq!(to_smtlib(&SmtTerm::and(vec![])), "true");
        assert_eq!(to_smtlib(&SmtTerm::or(vec![])), "false");
        assert_eq!(to_smtlib(&SmtTerm::and(vec![SmtTerm::var("x")])), "x");
    }

    #[test]
    fn print_application_and_nullary_symbol() {
        let t = SmtTerm::app("Cons", vec![SmtTerm::int(1), SmtTerm::app("Nil", vec![])]);
        assert_eq!(to_smtlib(&t), "(Cons 1 Nil)");
    }

    #[test]
    fn print_div_uses_integer_division() {
        let t = SmtTerm::var("x").div(SmtTerm::int(2));
        assert_eq!(to_smtlib(&t), "(div x 2)");
    }

    #[test]
    fn print_quantifier_with_datatype_sort() {
        let t = SmtTerm::ForAll(
            vec![
                ("l".to_string(), SmtSort::datatype("list")),
                ("n".to_string(), SmtSort::Int),
            ],
            Box::new(SmtTerm::var("n").ge(SmtTerm::int(0))),
        );
        assert_eq!(to_smtlib(&t), "(forall ((l list) (n Int)) (>= n 0))");
    }

    #[test]
    fn print_tuple_sort() {
        let s = SmtSort::Tuple(vec![SmtSort::Int, SmtSort::Bool]);
        assert_eq!(sort_to_smtlib(&s), "(Tuple Int Bool)");
    }

    #[test]
    fn print_datatype_declaration() {
        let decl = DatatypeDecl {
            name: "list".into(),
            ctors: vec![
                DatatypeCtor {
                    name: "Nil".into(),
                    selectors: vec![],
                },
                DatatypeCtor {
                    name: "Cons".into(),
                    selectors: vec![
                        ("Cons_0".into(), SmtSort::Int),
                        ("Cons_1".into(), SmtSort::datatype("list")),
                    ],
                },
            ],
        };
        assert_eq!(
            datatypes_to_smtlib(&[decl]),
            "(declare-datatypes ((list 0)) (((Nil) (Cons (Cons_0 Int) (Cons_1 list)))))"
        );
    }

    #[test]
    fn print_ite_nested() {
        let t = SmtTerm::ite(
            SmtTerm::var("c"),
            SmtTerm::ite(SmtTerm::var("d"), SmtTerm::int(1), SmtTerm::int(2)),
            SmtTerm::int(3),
        );
        assert_eq!(to_smtlib(&t), "(ite c (ite d 1 2) 3)");
    }
}
