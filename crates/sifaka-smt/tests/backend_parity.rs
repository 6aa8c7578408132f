//! Backend parity tests: Z3 and cvc5 must agree on small formulas,
//! including the datatype encodings the engine emits.
//!
//! All tests are `#[ignore]`-gated so CI without the solver binaries can
//! skip them. Run with `cargo test -- --ignored` to include them.

use sifaka_smt::backends::cvc5_backend::{Cvc5Solver, SolverConfig};
use sifaka_smt::backends::z3_backend::Z3Solver;
use sifaka_smt::solver::{SatResult, SmtSolver};
use sifaka_smt::sorts::{DatatypeCtor, DatatypeDecl, SmtSort};
use sifaka_smt::terms::SmtTerm;

fn list_decl() -> DatatypeDecl {
    DatatypeDecl {
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
    }
}

fn simple_interval<S: SmtSolver>(solver: &mut S, empty: bool) -> SatResult {
    solver.declare_var("x", &SmtSort::Int).unwrap();
    let upper = if empty { 0 } else { 10 };
    solver
        .assert(&SmtTerm::and(vec![
            SmtTerm::var("x").gt(SmtTerm::int(0)),
            SmtTerm::var("x").lt(SmtTerm::int(upper)),
        ]))
        .unwrap();
    solver.check_sat().unwrap()
}

#[test]
#[ignore = "requires z3 on PATH"]
fn z3_interval_sat_and_unsat() {
    let mut s = Z3Solver::with_config(&SolverConfig::z3("QF_LIA")).unwrap();
    assert_eq!(simple_interval(&mut s, false), SatResult::Sat);
    s.reset().unwrap();
    assert_eq!(simple_interval(&mut s, true), SatResult::Unsat);
}

#[test]
#[ignore = "requires cvc5 on PATH"]
fn cvc5_interval_sat_and_unsat() {
    let mut s = Cvc5Solver::with_config(&SolverConfig::cvc5("QF_LIA")).unwrap();
    assert_eq!(simple_interval(&mut s, false), SatResult::Sat);
    s.reset().unwrap();
    assert_eq!(simple_interval(&mut s, true), SatResult::Unsat);
}

#[test]
#[ignore = "requires z3 on PATH"]
fn z3_model_extraction_round_trips() {
    let mut s = Z3Solver::with_config(&SolverConfig::z3("QF_LIA")).unwrap();
    s.declare_var("x", &SmtSort::Int).unwrap();
    s.declare_var("b", &SmtSort::Bool).unwrap();
    s.assert(&SmtTerm::var("x").eq(SmtTerm::int(-7))).unwrap();
    s.assert(&SmtTerm::var("b")).unwrap();
    let (sat, model) = s
        .check_sat_with_model(&[("x", &SmtSort::Int), ("b", &SmtSort::Bool)])
        .unwrap();
    assert_eq!(sat, SatResult::Sat);
    let model = model.unwrap();
    assert_eq!(model.get_int("x"), Some(-7));
    assert_eq!(model.get_bool("b"), Some(true));
}

#[test]
#[ignore = "requires z3 on PATH"]
fn z3_datatype_tester_and_selector() {
    let mut s = Z3Solver::with_config(&SolverConfig::z3("ALL")).unwrap();
    s.declare_datatypes(&[list_decl()]).unwrap();
    s.declare_var("l", &SmtSort::datatype("list")).unwrap();
    s.assert(&SmtTerm::app("(_ is Cons)", vec![SmtTerm::var("l")]))
        .unwrap();
    s.assert(
        &SmtTerm::app("Cons_0", vec![SmtTerm::var("l")]).eq(SmtTerm::int(3)),
    )
    .unwrap();
    assert_eq!(s.check_sat().unwrap(), SatResult::Sat);

    s.assert(&SmtTerm::app("(_ is Nil)", vec![SmtTerm::var("l")]))
        .unwrap();
    assert_eq!(s.check_sat().unwrap(), SatResult::Unsat);
}

#[test]
#[ignore = "requires cvc5 on PATH"]
fn cvc5_datatype_tester_and_selector() {
    let mut s = Cvc5Solver::with_config(&SolverConfig::cvc5("ALL")).unwrap();
    s.declare_datatypes(&[list_decl()]).unwrap();
    s.declare_var("l", &SmtSort::datatype("list")).unwrap();
    s.assert(&SmtTerm::app("(_ is Cons)", vec![SmtTerm::var("l")]))
        .unwrap();
    s.assert(
        &SmtTerm::app("Cons_0", vec![SmtTerm::var("l")]).eq(SmtTerm::int(3)),
    )
    .unwrap();
    assert_eq!(s.check_sat().unwrap(), SatResult::Sat);
}

#[test]
#[ignore = "requires z3 and cvc5 on PATH"]
fn backends_agree_on_recursive_function_unfolding() {
    let body = SmtTerm::ite(
        SmtTerm::app("(_ is Nil)", vec![SmtTerm::var("l")]),
        SmtTerm::int(0),
        SmtTerm::app("Cons_0", vec![SmtTerm::var("l")]).add(SmtTerm::app(
            "len",
            vec![SmtTerm::app("Cons_1", vec![SmtTerm::var("l")])],
        )),
    );
    let mut verdicts = Vec::new();
    {
        let mut s = Z3Solver::with_config(&SolverConfig::z3("ALL").with_timeout_ms(5000)).unwrap();
        s.declare_datatypes(&[list_decl()]).unwrap();
        s.define_fun_rec(
            "len",
            &[("l".into(), SmtSort::datatype("list"))],
            &SmtSort::Int,
            &body,
        )
        .unwrap();
        s.assert(
            &SmtTerm::app("len", vec![SmtTerm::app("Nil", vec![])]).eq(SmtTerm::int(1)),
        )
        .unwrap();
        verdicts.push(s.check_sat().unwrap());
    }
    {
        let mut s =
            Cvc5Solver::with_config(&SolverConfig::cvc5("ALL").with_timeout_ms(5000)).unwrap();
        s.declare_datatypes(&[list_decl()]).unwrap();
        s.define_fun_rec(
            "len",
            &[("l".into(), SmtSort::datatype("list"))],
            &SmtSort::Int,
            &body,
        )
        .unwrap();
        s.assert(
            &SmtTerm::app("len", vec![SmtTerm::app("Nil", vec![])]).eq(SmtTerm::int(1)),
        )
        .unwrap();
        verdicts.push(s.check_sat().unwrap());
    }
    assert_eq!(verdicts[0], SatResult::Unsat);
    assert_eq!(verdicts[0], verdicts[1]);
}
