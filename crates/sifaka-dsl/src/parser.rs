use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct SifakaParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

/// Helper to extract the next child from a pest iterator, returning a
/// descriptive error instead of panicking when the grammar-guaranteed
/// structure is missing.
fn next_child<'a>(
    iter: &mut pest::iterators::Pairs<'a, Rule>,
    context: &str,
    span: Span,
    source: &str,
    filename: &str,
) -> Result<Pair<'a>, ParseError> {
    iter.next().ok_or_else(|| {
        ParseError::malformed(context, "missing expected child", span, source, filename)
    })
}

/// Parse a `.pmrs` source file into an AST [`Program`].
pub fn parse(source: &str, filename: &str) -> Result<Program, ParseError> {
    let pairs = SifakaParser::parse(Rule::program, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p + 1),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        ParseError::syntax(format!("{e}"), Span::new(start, end), source, filename)
    })?;

    let program_pair = pairs.into_iter().next().ok_or_else(|| {
        ParseError::syntax("empty input", Span::new(0, 1), source, filename)
    })?;
    let problem_pair = program_pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::problem_decl)
        .ok_or_else(|| {
            ParseError::syntax("expected a problem block", Span::new(0, 1), source, filename)
        })?;
    build_problem(problem_pair, source, filename)
}

fn build_problem(pair: Pair<'_>, source: &str, filename: &str) -> Result<Program, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "problem", span, source, filename)?
        .as_str()
        .to_string();
    let mut types = Vec::new();
    let mut schemes: Vec<Spanned<PmrsDecl>> = Vec::new();
    for item in inner {
        match item.as_rule() {
            Rule::type_decl => {
                let sp = span_from(&item);
                let decl = build_type_decl(item, source, filename)?;
                if types.iter().any(|t: &Spanned<TypeDecl>| t.node.name == decl.name) {
                    return Err(ParseError::duplicate(decl.name, sp, source, filename));
                }
                types.push(Spanned::new(decl, sp));
            }
            Rule::pmrs_decl => {
                let sp = span_from(&item);
                let decl = build_pmrs_decl(item, source, filename)?;
                if schemes.iter().any(|s| s.node.name == decl.name) {
                    return Err(ParseError::duplicate(decl.name, sp, source, filename));
                }
                schemes.push(Spanned::new(decl, sp));
            }
            _ => {}
        }
    }
    Ok(Program {
        name,
        types,
        schemes,
    })
}

fn build_type_decl(
    pair: Pair<'_>,
    source: &str,
    filename: &str,
) -> Result<TypeDecl, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "type declaration", span, source, filename)?
        .as_str()
        .to_string();
    let mut variants = Vec::new();
    for v in inner {
        if v.as_rule() == Rule::variant {
            variants.push(build_variant(v, source, filename)?);
        }
    }
    Ok(TypeDecl { name, variants })
}

fn build_variant(
    pair: Pair<'_>,
    source: &str,
    filename: &str,
) -> Result<VariantDecl, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "variant", span, source, filename)?
        .as_str()
        .to_string();
    let payload = match inner.next() {
        Some(prod) => build_ty_product_parts(prod, source, filename)?,
        None => Vec::new(),
    };
    Ok(VariantDecl { name, payload })
}

/// A `of a * b * c` payload is a list of component types, not one tuple.
fn build_ty_product_parts(
    pair: Pair<'_>,
    source: &str,
    filename: &str,
) -> Result<Vec<TyExpr>, ParseError> {
    pair.into_inner()
        .map(|atom| build_ty_atom(atom, source, filename))
        .collect()
}

fn build_ty_expr(pair: Pair<'_>, source: &str, filename: &str) -> Result<TyExpr, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let product = next_child(&mut inner, "type", span, source, filename)?;
    let dom = build_ty_product(product, source, filename)?;
    match inner.next() {
        Some(cod) => Ok(TyExpr::Fun(
            Box::new(dom),
            Box::new(build_ty_expr(cod, source, filename)?),
        )),
        None => Ok(dom),
    }
}

fn build_ty_product(
    pair: Pair<'_>,
    source: &str,
    filename: &str,
) -> Result<TyExpr, ParseError> {
    let parts = build_ty_product_parts(pair, source, filename)?;
    let mut parts = parts;
    match parts.len() {
        1 => Ok(parts.remove(0)),
        _ => Ok(TyExpr::Tuple(parts)),
    }
}

fn build_ty_atom(pair: Pair<'_>, source: &str, filename: &str) -> Result<TyExpr, ParseError> {
    let span = span_from(&pair);
    let pair_str = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    match inner.next() {
        None => {
            // Bare identifier matched the atom directly.
            Ok(TyExpr::Named(pair_str.trim().to_string()))
        }
        Some(child) => match child.as_rule() {
            Rule::ty_base => Ok(match child.as_str() {
                "int" => TyExpr::Int,
                "bool" => TyExpr::Bool,
                "string" => TyExpr::Str,
                "char" => TyExpr::Char,
                other => {
                    return Err(ParseError::malformed(
                        "type",
                        format!("unknown base type {other}"),
                        span,
                        source,
                        filename,
                    ))
                }
            }),
            Rule::ident => Ok(TyExpr::Named(child.as_str().to_string())),
            Rule::ty_expr => build_ty_expr(child, source, filename),
            other => Err(ParseError::malformed(
                "type",
                format!("unexpected {other:?}"),
                span,
                source,
                filename,
            )),
        },
    }
}

fn build_pmrs_decl(
    pair: Pair<'_>,
    source: &str,
    filename: &str,
) -> Result<PmrsDecl, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "pmrs block", span, source, filename)?
        .as_str()
        .to_string();
    let sig_pair = next_child(&mut inner, "pmrs block", span, source, filename)?;
    let signature = build_ty_expr(sig_pair, source, filename)?;
    let mut holes = Vec::new();
    let mut rules = Vec::new();
    for item in inner {
        match item.as_rule() {
            Rule::hole_list => {
                holes.extend(item.into_inner().map(|h| h.as_str().to_string()));
            }
            Rule::rule_decl => {
                let sp = span_from(&item);
                rules.push(Spanned::new(build_rule(item, source, filename)?, sp));
            }
            _ => {}
        }
    }
    Ok(PmrsDecl {
        name,
        signature,
        holes,
        rules,
    })
}

fn build_rule(pair: Pair<'_>, source: &str, filename: &str) -> Result<RuleDecl, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let nt = next_child(&mut inner, "rule", span, source, filename)?
        .as_str()
        .to_string();
    let mut args = Vec::new();
    let mut pattern = None;
    for item in inner {
        match item.as_rule() {
            Rule::rule_arg => args.push(item.as_str().to_string()),
            Rule::pattern => {
                let mut parts = item.into_inner();
                let ctor = next_child(&mut parts, "pattern", span, source, filename)?
                    .as_str()
                    .to_string();
                let binders = parts.map(|b| b.as_str().to_string()).collect();
                pattern = Some(PatternDecl { ctor, binders });
            }
            Rule::expr => {
                let rhs = build_expr(item, source, filename)?;
                return Ok(RuleDecl {
                    nt,
                    args,
                    pattern,
                    rhs,
                });
            }
            _ => {}
        }
    }
    Err(ParseError::malformed(
        "rule",
        "missing right-hand side",
        span,
        source,
        filename,
    ))
}

fn build_expr(pair: Pair<'_>, source: &str, filename: &str) -> Result<Expr, ParseError> {
    let span = span_from(&pair);
    match pair.as_rule() {
        Rule::expr | Rule::or_expr | Rule::and_expr | Rule::add_expr | Rule::mul_expr => {
            build_binop_chain(pair, source, filename)
        }
        Rule::cmp_expr => {
            let mut inner = pair.into_inner();
            let lhs_pair = next_child(&mut inner, "expression", span, source, filename)?;
            let lhs = build_expr(lhs_pair, source, filename)?;
            match inner.next() {
                None => Ok(lhs),
                Some(op_pair) => {
                    let op = binop_of(op_pair.as_str());
                    let rhs_pair =
                        next_child(&mut inner, "expression", span, source, filename)?;
                    let rhs = build_expr(rhs_pair, source, filename)?;
                    Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
                }
            }
        }
        Rule::app_expr => {
            let mut inner = pair.into_inner();
            let head_pair = next_child(&mut inner, "application", span, source, filename)?;
            let head = build_expr(head_pair, source, filename)?;
            let rest: Vec<Expr> = inner
                .map(|a| build_expr(a, source, filename))
                .collect::<Result<_, _>>()?;
            if rest.is_empty() {
                return Ok(head);
            }
            // `Cons hd tl` is constructor application by juxtaposition.
            match head {
                Expr::Ctor(name, existing) if existing.is_empty() => Ok(Expr::Ctor(name, rest)),
                other => Ok(Expr::App(Box::new(other), rest)),
            }
        }
        Rule::atom => {
            let mut inner = pair.into_inner();
            let child = next_child(&mut inner, "expression", span, source, filename)?;
            build_expr(child, source, filename)
        }
        Rule::int_lit => pair.as_str().parse::<i64>().map(Expr::Int).map_err(|e| {
            ParseError::malformed("integer literal", e.to_string(), span, source, filename)
        }),
        Rule::bool_lit => Ok(Expr::Bool(pair.as_str() == "true")),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        Rule::minmax_expr => {
            let mut inner = pair.into_inner();
            let op_pair = next_child(&mut inner, "min/max", span, source, filename)?;
            let op = if op_pair.as_str() == "min" {
                BinOp::Min
            } else {
                BinOp::Max
            };
            let a = build_expr(
                next_child(&mut inner, "min/max", span, source, filename)?,
                source,
                filename,
            )?;
            let b = build_expr(
                next_child(&mut inner, "min/max", span, source, filename)?,
                source,
                filename,
            )?;
            Ok(Expr::Bin(op, Box::new(a), Box::new(b)))
        }
        Rule::ite_expr => {
            let mut inner = pair.into_inner();
            let c = build_expr(
                next_child(&mut inner, "if", span, source, filename)?,
                source,
                filename,
            )?;
            let t = build_expr(
                next_child(&mut inner, "if", span, source, filename)?,
                source,
                filename,
            )?;
            let e = build_expr(
                next_child(&mut inner, "if", span, source, filename)?,
                source,
                filename,
            )?;
            Ok(Expr::Ite(Box::new(c), Box::new(t), Box::new(e)))
        }
        Rule::not_expr => {
            let mut inner = pair.into_inner();
            let a = build_expr(
                next_child(&mut inner, "not", span, source, filename)?,
                source,
                filename,
            )?;
            Ok(Expr::Not(Box::new(a)))
        }
        Rule::neg_expr => {
            let mut inner = pair.into_inner();
            let a = build_expr(
                next_child(&mut inner, "negation", span, source, filename)?,
                source,
                filename,
            )?;
            Ok(Expr::Neg(Box::new(a)))
        }
        Rule::ctor_expr => {
            let mut inner = pair.into_inner();
            let name = next_child(&mut inner, "constructor", span, source, filename)?
                .as_str()
                .to_string();
            let args = match inner.next() {
                Some(arglist) => arglist
                    .into_inner()
                    .map(|a| build_expr(a, source, filename))
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Expr::Ctor(name, args))
        }
        Rule::tuple_or_paren => {
            let elems: Vec<Expr> = pair
                .into_inner()
                .map(|e| build_expr(e, source, filename))
                .collect::<Result<_, _>>()?;
            let mut elems = elems;
            match elems.len() {
                1 => Ok(elems.remove(0)),
                _ => Ok(Expr::Tuple(elems)),
            }
        }
        other => Err(ParseError::malformed(
            "expression",
            format!("unexpected {other:?}"),
            span,
            source,
            filename,
        )),
    }
}

fn build_binop_chain(
    pair: Pair<'_>,
    source: &str,
    filename: &str,
) -> Result<Expr, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let first = next_child(&mut inner, "expression", span, source, filename)?;
    let mut acc = build_expr(first, source, filename)?;
    while let Some(op_pair) = inner.next() {
        let op = binop_of(op_pair.as_str());
        let rhs_pair = next_child(&mut inner, "expression", span, source, filename)?;
        let rhs = build_expr(rhs_pair, source, filename)?;
        acc = Expr::Bin(op, Box::new(acc), Box::new(rhs));
    }
    Ok(acc)
}

fn binop_of(symbol: &str) -> BinOp {
    match symbol {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        "=" => BinOp::Eq,
        "&&" => BinOp::And,
        "||" => BinOp::Or,
        _ => BinOp::Eq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn parses_list_sum_problem() {
        let prog = parse(LIST_SUM, "list_sum.pmrs").unwrap();
        assert_eq!(prog.name, "list_sum");
        assert_eq!(prog.types.len(), 1);
        assert_eq!(prog.schemes.len(), 3);
        let target = &prog.scheme("target").unwrap().node;
        assert_eq!(target.holes, vec!["f0".to_string(), "join".to_string()]);
        assert_eq!(target.rules.len(), 2);
    }

    #[test]
    fn type_decl_variants_and_payloads() {
        let prog = parse(LIST_SUM, "t.pmrs").unwrap();
        let list = &prog.types[0].node;
        assert_eq!(list.name, "list");
        assert_eq!(list.variants.len(), 2);
        assert_eq!(list.variants[0].name, "Nil");
        assert!(list.variants[0].payload.is_empty());
        assert_eq!(
            list.variants[1].payload,
            vec![TyExpr::Int, TyExpr::Named("list".into())]
        );
    }

    #[test]
    fn rule_pattern_binders_are_captured() {
        let prog = parse(LIST_SUM, "t.pmrs").unwrap();
        let spec = &prog.scheme("spec").unwrap().node;
        let cons_rule = &spec.rules[1].node;
        let pat = cons_rule.pattern.as_ref().unwrap();
        assert_eq!(pat.ctor, "Cons");
        assert_eq!(pat.binders, vec!["hd".to_string(), "tl".to_string()]);
    }

    #[test]
    fn application_by_juxtaposition() {
        let prog = parse(LIST_SUM, "t.pmrs").unwrap();
        let target = &prog.scheme("target").unwrap().node;
        match &target.rules[1].node.rhs {
            Expr::App(head, args) => {
                assert_eq!(**head, Expr::Var("join".into()));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected application, got {other:?}"),
        }
    }

    #[test]
    fn operator_precedence_mul_binds_tighter_than_add() {
        let src = r#"
problem p {
    pmrs spec : int -> int {
        spec x -> x + x * 2;
    }
}
"#;
        let prog = parse(src, "t.pmrs").unwrap();
        let rhs = &prog.schemes[0].node.rules[0].node.rhs;
        match rhs {
            Expr::Bin(BinOp::Add, _, r) => {
                assert!(matches!(**r, Expr::Bin(BinOp::Mul, _, _)));
            }
            other => panic!("expected (x + (x * 2)), got {other:?}"),
        }
    }

    #[test]
    fn min_max_ite_and_tuples_parse() {
        let src = r#"
problem p {
    pmrs spec : int -> int {
        spec x -> if x >= 0 then min(x, 3) else (x, max(x, 0));
    }
}
"#;
        let prog = parse(src, "t.pmrs").unwrap();
        let rhs = &prog.schemes[0].node.rules[0].node.rhs;
        match rhs {
            Expr::Ite(c, t, e) => {
                assert!(matches!(**c, Expr::Bin(BinOp::Ge, _, _)));
                assert!(matches!(**t, Expr::Bin(BinOp::Min, _, _)));
                assert!(matches!(**e, Expr::Tuple(_)));
            }
            other => panic!("expected if-then-else, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_scheme_is_rejected() {
        let src = r#"
problem p {
    pmrs spec : int -> int { spec x -> x; }
    pmrs spec : int -> int { spec x -> x; }
}
"#;
        let err = parse(src, "t.pmrs").unwrap_err();
        assert_eq!(err.to_string(), "Duplicate definition: spec");
    }

    #[test]
    fn syntax_error_reports_position() {
        let err = parse("problem {", "t.pmrs").unwrap_err();
        assert!(err.to_string().starts_with("Syntax error"));
    }

    #[test]
    fn constructor_with_parenthesized_arguments() {
        let src = r#"
problem p {
    type list = Nil | Cons of int * list;
    pmrs spec : list -> list {
        spec x -> Cons(1, Nil);
    }
}
"#;
        let prog = parse(src, "t.pmrs").unwrap();
        match &prog.schemes[0].node.rules[0].node.rhs {
            Expr::Ctor(name, args) => {
                assert_eq!(name, "Cons");
                assert_eq!(args.len(), 2);
                assert_eq!(args[1], Expr::Ctor("Nil".into(), vec![]));
            }
            other => panic!("expected constructor, got {other:?}"),
        }
    }

    #[test]
    fn comments_are_skipped() {
        let src = r#"
problem p {
    // line comment
    (* block comment *)
    pmrs spec : int -> int { spec x -> x; }
}
"#;
        assert!(parse(src, "t.pmrs").is_ok());
    }
}
