//! SyGuS grammar generation.
//!
//! The default schema has three non-terminals: `Ix` for integers, `Ic`
//! for constants, and `Ipred` for booleans. Tuple return sorts get an
//! `mkTuple` head rule; tuple arguments unfold into component selector
//! expressions; a guess skeleton from the deduction engine adds an
//! `IStart` non-terminal that biases the synthesizer toward its shape.

use sifaka_ir::terms::{BoxKind, Term, TermKind};
use sifaka_ir::types::RType;
use sifaka_smt::sorts::SmtSort;
use sifaka_smt::sygus::{Grammar, GrammarNonterminal, GrammarProd};
use sifaka_smt::terms::SmtTerm;

use crate::encode::encode_term;

/// Operator-set parameters for grammar generation.
#[derive(Debug, Clone, Copy)]
pub struct GrammarConfig {
    pub allow_mul_by_const: bool,
    pub allow_nonlinear: bool,
    /// Force the boolean non-terminal even when no boolean shows up in
    /// the signature.
    pub boolean_required: bool,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            allow_mul_by_const: false,
            allow_nonlinear: false,
            boolean_required: true,
        }
    }
}

const IX: &str = "Ix";
const IC: &str = "Ic";
const IPRED: &str = "Ipred";
const ISTART: &str = "IStart";

fn nt(name: &str) -> SmtTerm {
    SmtTerm::var(name)
}

/// Generate the grammar for one synth-fun.
pub fn generate(
    ret: &SmtSort,
    args: &[(String, SmtSort)],
    cfg: &GrammarConfig,
    guess: Option<&Term>,
) -> Grammar {
    let mut int_atoms: Vec<SmtTerm> = Vec::new();
    let mut bool_atoms: Vec<SmtTerm> = Vec::new();
    for (name, sort) in args {
        match sort {
            SmtSort::Int => int_atoms.push(SmtTerm::var(name.clone())),
            SmtSort::Bool => bool_atoms.push(SmtTerm::var(name.clone())),
            SmtSort::Tuple(elems) => {
                // Unfold tuple arguments into their component selectors.
                for (i, elem) in elems.iter().enumerate() {
                    let sel = SmtTerm::app(
                        format!("(_ tuple.select {i})"),
                        vec![SmtTerm::var(name.clone())],
                    );
                    match elem {
                        SmtSort::Int => int_atoms.push(sel),
                        SmtSort::Bool => bool_atoms.push(sel),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    let needs_bool = cfg.boolean_required || !bool_atoms.is_empty() || bool_in_sort(ret);

    let mut ix_prods: Vec<GrammarProd> = int_atoms
        .iter()
        .cloned()
        .map(GrammarProd::Term)
        .collect();
    ix_prods.push(GrammarProd::Term(nt(IC)));
    ix_prods.push(GrammarProd::Term(nt(IX).add(nt(IX))));
    ix_prods.push(GrammarProd::Term(nt(IX).sub(nt(IX))));
    if cfg.allow_mul_by_const {
        ix_prods.push(GrammarProd::Term(nt(IC).mul(nt(IX))));
    }
    if cfg.allow_nonlinear {
        ix_prods.push(GrammarProd::Term(nt(IX).mul(nt(IX))));
        ix_prods.push(GrammarProd::Term(nt(IX).div(nt(IX))));
    }
    if needs_bool {
        ix_prods.push(GrammarProd::Term(SmtTerm::ite(nt(IPRED), nt(IX), nt(IX))));
    }

    let ix = GrammarNonterminal {
        name: IX.into(),
        sort: SmtSort::Int,
        productions: ix_prods,
    };
    let ic = GrammarNonterminal {
        name: IC.into(),
        sort: SmtSort::Int,
        productions: vec![GrammarProd::ConstantOf(SmtSort::Int)],
    };
    let ipred = needs_bool.then(|| {
        let mut prods: Vec<GrammarProd> = bool_atoms
            .iter()
            .cloned()
            .map(GrammarProd::Term)
            .collect();
        prods.push(GrammarProd::Term(SmtTerm::bool(true)));
        prods.push(GrammarProd::Term(SmtTerm::bool(false)));
        prods.push(GrammarProd::Term(nt(IX).eq(nt(IX))));
        prods.push(GrammarProd::Term(nt(IX).gt(nt(IX))));
        prods.push(GrammarProd::Term(nt(IX).ge(nt(IX))));
        prods.push(GrammarProd::Term(nt(IPRED).not()));
        prods.push(GrammarProd::Term(SmtTerm::and(vec![nt(IPRED), nt(IPRED)])));
        prods.push(GrammarProd::Term(SmtTerm::or(vec![nt(IPRED), nt(IPRED)])));
        GrammarNonterminal {
            name: IPRED.into(),
            sort: SmtSort::Bool,
            productions: prods,
        }
    });

    // The start symbol is the first non-terminal.
    let mut nts: Vec<GrammarNonterminal> = Vec::new();
    let default_start = match ret {
        SmtSort::Bool => IPRED,
        SmtSort::Tuple(_) => ISTART,
        _ => IX,
    };
    if let SmtSort::Tuple(elems) = ret {
        let comps: Vec<SmtTerm> = elems
            .iter()
            .map(|e| match e {
                SmtSort::Bool => nt(IPRED),
                _ => nt(IX),
            })
            .collect();
        nts.push(GrammarNonterminal {
            name: ISTART.into(),
            sort: ret.clone(),
            productions: vec![GrammarProd::Term(SmtTerm::app("mkTuple", comps))],
        });
    }
    if let Some(guess) = guess {
        let prod = guess_production(guess, args);
        let fallback = nt(default_start);
        let start_sort = ret.clone();
        // Biasing non-terminal goes first so it becomes the start.
        nts.insert(
            0,
            GrammarNonterminal {
                name: "IGuess".into(),
                sort: start_sort,
                productions: vec![GrammarProd::Term(prod), GrammarProd::Term(fallback)],
            },
        );
    }
    match default_start {
        IPRED => {
            if let Some(p) = ipred {
                nts.push(p);
            }
            nts.push(ix);
            nts.push(ic);
        }
        _ => {
            nts.push(ix);
            nts.push(ic);
            if let Some(p) = ipred {
                nts.push(p);
            }
        }
    }
    Grammar { nonterminals: nts }
}

/// Materialize a guess skeleton as a production: positional boxes become
/// the corresponding argument, free boxes become the non-terminal of
/// their type.
fn guess_production(guess: &Term, args: &[(String, SmtSort)]) -> SmtTerm {
    match &guess.kind {
        TermKind::Boxed(BoxKind::Pos(i)) => match args.get(*i) {
            Some((name, _)) => SmtTerm::var(name.clone()),
            None => nt(IX),
        },
        TermKind::Boxed(BoxKind::Free(_)) => match guess.ty {
            RType::Bool => nt(IPRED),
            _ => nt(IX),
        },
        _ => {
            let rebuilt = rebuild_with_boxes(guess, args);
            encode_term(&rebuilt).unwrap_or_else(|_| nt(IX))
        }
    }
}

/// Swap every box in `guess` for a plain variable named after its
/// production so the ordinary encoder can print the shape.
fn rebuild_with_boxes(guess: &Term, args: &[(String, SmtSort)]) -> Term {
    use sifaka_ir::terms::Variable;
    let mut counter = 0u32;
    fn walk(t: &Term, args: &[(String, SmtSort)], counter: &mut u32) -> Term {
        match &t.kind {
            TermKind::Boxed(BoxKind::Pos(i)) => {
                let name = args
                    .get(*i)
                    .map(|(n, _)| n.clone())
                    .unwrap_or_else(|| IX.to_string());
                Term::var(Variable {
                    id: u32::MAX - *i as u32,
                    name,
                    ty: t.ty.clone(),
                })
            }
            TermKind::Boxed(BoxKind::Free(_)) => {
                *counter += 1;
                let name = match t.ty {
                    RType::Bool => IPRED,
                    _ => IX,
                };
                Term::var(Variable {
                    id: u32::MAX / 2 - *counter,
                    name: name.to_string(),
                    ty: t.ty.clone(),
                })
            }
            TermKind::Bin(op, a, b) => Term::bin(
                *op,
                walk(a, args, counter),
                walk(b, args, counter),
            ),
            TermKind::Un(op, a) => Term::un(*op, walk(a, args, counter)),
            TermKind::Ite(c, th, el) => Term::ite(
                walk(c, args, counter),
                walk(th, args, counter),
                walk(el, args, counter),
            ),
            TermKind::Tuple(elems) => {
                Term::tuple(elems.iter().map(|e| walk(e, args, counter)).collect())
            }
            _ => t.clone(),
        }
    }
    walk(guess, args, &mut counter)
}

fn bool_in_sort(s: &SmtSort) -> bool {
    match s {
        SmtSort::Bool => true,
        SmtSort::Tuple(elems) => elems.iter().any(bool_in_sort),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifaka_smt::sygus::{print_command, SygusCommand, SynthFun};

    fn int_args(names: &[&str]) -> Vec<(String, SmtSort)> {
        names.iter().map(|n| (n.to_string(), SmtSort::Int)).collect()
    }

    fn render(g: Grammar, ret: SmtSort, args: Vec<(String, SmtSort)>) -> String {
        print_command(&SygusCommand::SynthFun(SynthFun {
            name: "h".into(),
            args,
            ret,
            grammar: Some(g),
        }))
    }

    #[test]
    fn int_grammar_has_three_nonterminals() {
        let args = int_args(&["a", "b"]);
        let g = generate(&SmtSort::Int, &args, &GrammarConfig::default(), None);
        let names: Vec<&str> = g.nonterminals.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Ix", "Ic", "Ipred"]);
    }

    #[test]
    fn argument_variables_appear_as_productions() {
        let args = int_args(&["a", "b"]);
        let g = generate(&SmtSort::Int, &args, &GrammarConfig::default(), None);
        let text = render(g, SmtSort::Int, args);
        assert!(text.contains("(Ix Int (a b Ic"));
        assert!(text.contains("(Constant Int)"));
    }

    #[test]
    fn bool_return_starts_at_the_predicate_nonterminal() {
        let args = int_args(&["x"]);
        let g = generate(&SmtSort::Bool, &args, &GrammarConfig::default(), None);
        assert_eq!(g.nonterminals[0].name, "Ipred");
    }

    #[test]
    fn tuple_return_gets_mktuple_head_rule() {
        let args = int_args(&["x"]);
        let ret = SmtSort::Tuple(vec![SmtSort::Int, SmtSort::Bool]);
        let g = generate(&ret, &args, &GrammarConfig::default(), None);
        assert_eq!(g.nonterminals[0].name, "IStart");
        let text = render(g, ret, args);
        assert!(text.contains("(mkTuple Ix Ipred)"));
    }

    #[test]
    fn tuple_arguments_unfold_into_selectors() {
        let args = vec![(
            "p".to_string(),
            SmtSort::Tuple(vec![SmtSort::Int, SmtSort::Bool]),
        )];
        let g = generate(&SmtSort::Int, &args, &GrammarConfig::default(), None);
        let text = render(g, SmtSort::Int, args);
        assert!(text.contains("((_ tuple.select 0) p)"));
        assert!(text.contains("((_ tuple.select 1) p)"));
    }

    #[test]
    fn multiplication_productions_follow_the_config() {
        let args = int_args(&["a"]);
        let plain = generate(&SmtSort::Int, &args, &GrammarConfig::default(), None);
        let text = render(plain, SmtSort::Int, args.clone());
        assert!(!text.contains("(* "));

        let cfg = GrammarConfig {
            allow_mul_by_const: true,
            ..GrammarConfig::default()
        };
        let boosted = generate(&SmtSort::Int, &args, &cfg, None);
        let text = render(boosted, SmtSort::Int, args);
        assert!(text.contains("(* Ic Ix)"));
    }

    #[test]
    fn boolean_not_required_and_unused_drops_ipred() {
        let args = int_args(&["a"]);
        let cfg = GrammarConfig {
            boolean_required: false,
            ..GrammarConfig::default()
        };
        let g = generate(&SmtSort::Int, &args, &cfg, None);
        assert!(g.nonterminals.iter().all(|n| n.name != "Ipred"));
    }

    #[test]
    fn guess_skeleton_biases_the_start_symbol() {
        let args = int_args(&["a", "b"]);
        let guess = Term::bin(
            sifaka_ir::terms::Binop::Plus,
            Term::boxed(BoxKind::Pos(0), RType::Int),
            Term::boxed(BoxKind::Free(0), RType::Int),
        );
        let g = generate(&SmtSort::Int, &args, &GrammarConfig::default(), Some(&guess));
        assert_eq!(g.nonterminals[0].name, "IGuess");
        let text = render(g, SmtSort::Int, args);
        assert!(text.contains("(+ a Ix)"));
    }
}
