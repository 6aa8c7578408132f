//! Translation of equation systems into SyGuS queries and back.
//!
//! Each hole becomes one synth-fun with a generated grammar; every
//! equation becomes one constraint (guarded by its precondition);
//! synthesized bodies are decoded into typed IR definitions. A hole with
//! a tuple return type is split into one hole per component before
//! emission and recombined after.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use sifaka_ir::context::Context;
use sifaka_ir::problem::ProblemDefn;
use sifaka_ir::reduce::Definition;
use sifaka_ir::terms::{simplify, Term, TermKind, Variable};
use sifaka_ir::types::RType;
use sifaka_smt::backends::process::BackendError;
use sifaka_smt::backends::sygus_backend::{SygusConfig, SygusRunner};
use sifaka_smt::sygus::{SygusCommand, SynthFun, SynthFunDef, SynthResponse};

use crate::config::EngineOptions;
use crate::encode::{decode_term, encode_term, sort_of_type, EncodeError};
use crate::equations::{split_tuple_equation, system_variables, Equation, EquationSystem};
use crate::grammar::{generate, GrammarConfig};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("solver answered with definitions for unknown hole {0}")]
    UnknownHole(String),
    #[error("solver response is missing a definition for hole {0}")]
    MissingHole(String),
}

/// Outcome of one SyGuS attempt.
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    Solutions(Vec<Definition>),
    /// The equation system is jointly unsatisfiable for every hole
    /// filling in the grammar.
    Infeasible,
    /// Solver failure or unknown: a failed step, not a verdict.
    Failure(String),
}

/// A hole after optional detupling: either itself, or its components.
#[derive(Debug, Clone)]
struct HolePlan {
    original: Variable,
    arg_types: Vec<RType>,
    ret: RType,
    /// Component holes (name, component type); empty when not split.
    components: Vec<(Variable, RType)>,
}

fn hole_plan(ctx: &mut Context, hole: &Variable, detupling: bool) -> HolePlan {
    let (args, ret) = hole.ty.uncurry();
    let arg_types: Vec<RType> = args.into_iter().cloned().collect();
    let ret = ret.clone();
    let components = match (&ret, detupling) {
        (RType::Tuple(elems), true) => elems
            .iter()
            .enumerate()
            .map(|(i, elem)| {
                let mut ty = elem.clone();
                for a in arg_types.iter().rev() {
                    ty = RType::fun(a.clone(), ty);
                }
                (ctx.named_var(&format!("{}_{i}", hole.name), ty), elem.clone())
            })
            .collect(),
        _ => Vec::new(),
    };
    HolePlan {
        original: hole.clone(),
        arg_types,
        ret,
        components,
    }
}

/// Rewrite applications of a split hole into a tuple of component
/// applications.
fn rewrite_split_hole(t: &Term, plan: &HolePlan) -> Term {
    match &t.kind {
        TermKind::Var(v) if v.id == plan.original.id && !plan.components.is_empty() => {
            Term::tuple(
                plan.components
                    .iter()
                    .map(|(c, elem)| Term::new(TermKind::Var(c.clone()), elem.clone()))
                    .collect(),
            )
        }
        TermKind::App(h, args) => {
            let rewritten_args: Vec<Term> =
                args.iter().map(|a| rewrite_split_hole(a, plan)).collect();
            if let Some(v) = h.as_var() {
                if v.id == plan.original.id && !plan.components.is_empty() {
                    return Term::tuple(
                        plan.components
                            .iter()
                            .map(|(c, elem)| {
                                Term::app(
                                    Term::var(c.clone()),
                                    rewritten_args.clone(),
                                    elem.clone(),
                                )
                            })
                            .collect(),
                    );
                }
            }
            Term::new(
                TermKind::App(Box::new(rewrite_split_hole(h, plan)), rewritten_args),
                t.ty.clone(),
            )
        }
        TermKind::Tuple(elems) => Term::new(
            TermKind::Tuple(elems.iter().map(|e| rewrite_split_hole(e, plan)).collect()),
            t.ty.clone(),
        ),
        TermKind::Data(ctor, args) => Term::new(
            TermKind::Data(
                ctor.clone(),
                args.iter().map(|a| rewrite_split_hole(a, plan)).collect(),
            ),
            t.ty.clone(),
        ),
        TermKind::Proj(s, i) => Term::new(
            TermKind::Proj(Box::new(rewrite_split_hole(s, plan)), *i),
            t.ty.clone(),
        ),
        TermKind::Un(op, s) => Term::new(
            TermKind::Un(*op, Box::new(rewrite_split_hole(s, plan))),
            t.ty.clone(),
        ),
        TermKind::Bin(op, a, b) => Term::new(
            TermKind::Bin(
                *op,
                Box::new(rewrite_split_hole(a, plan)),
                Box::new(rewrite_split_hole(b, plan)),
            ),
            t.ty.clone(),
        ),
        TermKind::Ite(c, th, el) => Term::new(
            TermKind::Ite(
                Box::new(rewrite_split_hole(c, plan)),
                Box::new(rewrite_split_hole(th, plan)),
                Box::new(rewrite_split_hole(el, plan)),
            ),
            t.ty.clone(),
        ),
        _ => t.clone(),
    }
}

/// Recompute the logic from the operators and sorts present.
fn logic_of(system: &EquationSystem, nonlinear: bool) -> String {
    let mut has_dt = false;
    for eq in &system.equations {
        for side in [&eq.lhs, &eq.rhs] {
            if side
                .subterms()
                .iter()
                .any(|s| matches!(s.kind, TermKind::Data(_, _)))
            {
                has_dt = true;
            }
        }
    }
    match (has_dt, nonlinear) {
        (true, false) => "DTLIA".into(),
        (true, true) => "DTNIA".into(),
        (false, false) => "LIA".into(),
        (false, true) => "NIA".into(),
    }
}

/// Translate the system and invoke the SyGuS port.
pub fn solve_system(
    ctx: &mut Context,
    problem: &ProblemDefn,
    system: &EquationSystem,
    guesses: &HashMap<u32, Term>,
    grammar_cfg: &GrammarConfig,
    opts: &EngineOptions,
) -> Result<SynthesisOutcome, SynthesisError> {
    let plans: Vec<HolePlan> = {
        let holes = problem.target.params.clone();
        holes
            .iter()
            .map(|h| hole_plan(ctx, h, opts.detupling))
            .collect()
    };

    // Apply hole splitting to a working copy of the system.
    let mut working = system.clone();
    for plan in &plans {
        if plan.components.is_empty() {
            continue;
        }
        let mut rewritten = Vec::new();
        for eq in &working.equations {
            let lhs = simplify(&rewrite_split_hole(&eq.lhs, plan));
            let rhs = simplify(&rewrite_split_hole(&eq.rhs, plan));
            for (lhs, rhs) in split_tuple_equation(lhs, rhs) {
                rewritten.push(Equation {
                    term: eq.term.clone(),
                    precond: eq.precond.clone(),
                    lhs,
                    rhs,
                });
            }
        }
        working.equations = rewritten;
    }

    let mut cmds = Vec::new();
    cmds.push(SygusCommand::SetLogic(logic_of(
        &working,
        grammar_cfg.allow_nonlinear,
    )));

    // One synth-fun per (possibly component) hole.
    let mut expected: Vec<(String, Vec<(String, RType)>, RType)> = Vec::new();
    for plan in &plans {
        let units: Vec<(String, RType)> = if plan.components.is_empty() {
            vec![(plan.original.name.clone(), plan.ret.clone())]
        } else {
            plan.components
                .iter()
                .map(|(c, elem)| (c.name.clone(), elem.clone()))
                .collect()
        };
        for (name, ret) in units {
            let args: Vec<(String, RType)> = plan
                .arg_types
                .iter()
                .enumerate()
                .map(|(i, ty)| (format!("x{i}"), ty.clone()))
                .collect();
            let smt_args = args
                .iter()
                .map(|(n, ty)| Ok((n.clone(), sort_of_type(ty)?)))
                .collect::<Result<Vec<_>, EncodeError>>()?;
            let ret_sort = sort_of_type(&ret)?;
            let guess = guesses.get(&plan.original.id).filter(|_| plan.components.is_empty());
            let grammar = generate(&ret_sort, &smt_args, grammar_cfg, guess);
            cmds.push(SygusCommand::SynthFun(SynthFun {
                name: name.clone(),
                args: smt_args,
                ret: ret_sort,
                grammar: Some(grammar),
            }));
            expected.push((name, args, ret));
        }
    }

    let (plain_vars, _) = system_variables(&working, problem);
    for v in &plain_vars {
        cmds.push(SygusCommand::DeclareVar(
            v.name.clone(),
            sort_of_type(&v.ty)?,
        ));
    }

    for eq in &working.equations {
        let lhs = encode_term(&eq.lhs)?;
        let rhs = encode_term(&eq.rhs)?;
        let body = lhs.eq(rhs);
        let guard = eq.precond.as_ref().map(encode_term).transpose()?;
        cmds.push(SygusCommand::Constraint(body.guarded(guard)));
    }
    cmds.push(SygusCommand::CheckSynth);

    info!(
        holes = expected.len(),
        constraints = working.equations.len(),
        "invoking SyGuS solver"
    );
    let runner = SygusRunner::new(
        SygusConfig::default().with_timeout_ms(opts.sygus_timeout_ms),
    );
    match runner.run(&cmds)? {
        SynthResponse::Infeasible => Ok(SynthesisOutcome::Infeasible),
        SynthResponse::Fail => Ok(SynthesisOutcome::Failure("solver answered fail".into())),
        SynthResponse::Unknown(reason) => Ok(SynthesisOutcome::Failure(reason)),
        SynthResponse::Success(defs) => {
            let decoded = decode_solutions(ctx, &plans, &expected, &defs)?;
            Ok(SynthesisOutcome::Solutions(decoded))
        }
    }
}

fn decode_solutions(
    ctx: &mut Context,
    plans: &[HolePlan],
    expected: &[(String, Vec<(String, RType)>, RType)],
    defs: &[SynthFunDef],
) -> Result<Vec<Definition>, SynthesisError> {
    let by_name: HashMap<&str, &SynthFunDef> =
        defs.iter().map(|d| (d.name.as_str(), d)).collect();
    for d in defs {
        if !expected.iter().any(|(n, _, _)| n == &d.name) {
            return Err(SynthesisError::UnknownHole(d.name.clone()));
        }
    }

    let mut out = Vec::new();
    for plan in plans {
        // Shared formal arguments for this hole.
        let arg_vars: Vec<Variable> = plan
            .arg_types
            .iter()
            .enumerate()
            .map(|(i, ty)| ctx.named_var(&format!("x{i}"), ty.clone()))
            .collect();
        let env: HashMap<String, Variable> = arg_vars
            .iter()
            .map(|v| (v.name.clone(), v.clone()))
            .collect();

        let body = if plan.components.is_empty() {
            let def = by_name
                .get(plan.original.name.as_str())
                .ok_or_else(|| SynthesisError::MissingHole(plan.original.name.clone()))?;
            decode_with_solver_names(ctx, def, &arg_vars, &plan.ret, &env)?
        } else {
            let mut parts = Vec::new();
            for (comp, elem) in &plan.components {
                let def = by_name
                    .get(comp.name.as_str())
                    .ok_or_else(|| SynthesisError::MissingHole(comp.name.clone()))?;
                parts.push(decode_with_solver_names(ctx, def, &arg_vars, elem, &env)?);
            }
            Term::tuple(parts)
        };
        debug!(hole = %plan.original.name, body = %body, "decoded solution");
        out.push(Definition {
            var: plan.original.clone(),
            args: arg_vars,
            body,
        });
    }
    Ok(out)
}

/// Decode one definition body, tolerating solver-side renamings of the
/// formal arguments (matched positionally).
fn decode_with_solver_names(
    ctx: &mut Context,
    def: &SynthFunDef,
    arg_vars: &[Variable],
    ret: &RType,
    env: &HashMap<String, Variable>,
) -> Result<Term, SynthesisError> {
    let mut full_env = env.clone();
    // Positional identity: the solver may echo different argument names.
    for ((solver_name, _sort), var) in def.args.iter().zip(arg_vars) {
        full_env.insert(solver_name.clone(), var.clone());
    }
    Ok(decode_term(ctx, &def.body, ret, &full_env)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::list_sum_problem;
    use crate::state::TermStateMap;
    use sifaka_ir::expand::expand_loop;
    use sifaka_smt::sygus::print_problem;

    fn list_sum_commands() -> Vec<SygusCommand> {
        let (mut ctx, problem) = list_sum_problem();
        let seed = Term::var(ctx.fresh_var("u", RType::named("list")));
        let exp = expand_loop(&mut ctx, &problem.target, &[seed], 2, 100, 100);
        let mut state = TermStateMap::new();
        let opts = EngineOptions::default();
        let system =
            crate::equations::make(&mut ctx, &problem, &mut state, &exp.mr, &opts);

        // Build the command list without invoking a solver.
        let plans: Vec<HolePlan> = problem
            .target
            .params
            .clone()
            .iter()
            .map(|h| hole_plan(&mut ctx, h, opts.detupling))
            .collect();
        let mut cmds = vec![SygusCommand::SetLogic(logic_of(&system, false))];
        for plan in &plans {
            let args: Vec<(String, sifaka_smt::sorts::SmtSort)> = plan
                .arg_types
                .iter()
                .enumerate()
                .map(|(i, ty)| (format!("x{i}"), sort_of_type(ty).unwrap()))
                .collect();
            cmds.push(SygusCommand::SynthFun(SynthFun {
                name: plan.original.name.clone(),
                args: args.clone(),
                ret: sort_of_type(&plan.ret).unwrap(),
                grammar: Some(generate(
                    &sort_of_type(&plan.ret).unwrap(),
                    &args,
                    &GrammarConfig::default(),
                    None,
                )),
            }));
        }
        let (plain, _) = system_variables(&system, &problem);
        for v in &plain {
            cmds.push(SygusCommand::DeclareVar(
                v.name.clone(),
                sort_of_type(&v.ty).unwrap(),
            ));
        }
        for eq in &system.equations {
            cmds.push(SygusCommand::Constraint(
                encode_term(&eq.lhs)
                    .unwrap()
                    .eq(encode_term(&eq.rhs).unwrap()),
            ));
        }
        cmds.push(SygusCommand::CheckSynth);
        cmds
    }

    #[test]
    fn emitted_problem_has_expected_shape() {
        let cmds = list_sum_commands();
        let text = print_problem(&cmds);
        assert!(text.starts_with("(set-logic LIA)"));
        assert!(text.contains("(synth-fun f0 () Int"));
        assert!(text.contains("(synth-fun join ((x0 Int) (x1 Int)) Int"));
        assert!(text.contains("(constraint (= 0 f0))"));
        assert!(text.ends_with("(check-synth)\n"));
    }

    #[test]
    fn logic_detects_datatypes() {
        let (_ctx, _problem) = list_sum_problem();
        let mut system = EquationSystem::default();
        system.equations.push(Equation {
            term: Term::int(0),
            precond: None,
            lhs: Term::data("Nil", vec![], RType::named("list")),
            rhs: Term::data("Nil", vec![], RType::named("list")),
        });
        assert_eq!(logic_of(&system, false), "DTLIA");
        assert_eq!(logic_of(&system, true), "DTNIA");
        let empty = EquationSystem::default();
        assert_eq!(logic_of(&empty, false), "LIA");
    }

    #[test]
    fn tuple_holes_split_into_component_synth_funs() {
        let (mut ctx, _problem) = list_sum_problem();
        let pair = RType::Tuple(vec![RType::Int, RType::Bool]);
        let hole = ctx.named_var("h", RType::fun(RType::Int, pair));
        let plan = hole_plan(&mut ctx, &hole, true);
        assert_eq!(plan.components.len(), 2);
        assert_eq!(plan.components[0].0.name, "h_0");
        assert_eq!(plan.components[1].1, RType::Bool);

        // Applications rewrite into tuples of component applications.
        let x = ctx.named_var("x", RType::Int);
        let app = Term::app(
            Term::var(hole.clone()),
            vec![Term::var(x)],
            RType::Tuple(vec![RType::Int, RType::Bool]),
        );
        let rewritten = rewrite_split_hole(&app, &plan);
        match &rewritten.kind {
            TermKind::Tuple(elems) => {
                assert_eq!(elems.len(), 2);
                assert!(matches!(&elems[0].kind, TermKind::App(h, _)
                    if h.as_var().unwrap().name == "h_0"));
            }
            other => panic!("expected tuple of component applications, got {other:?}"),
        }
    }

    #[test]
    fn decode_solutions_recombines_components() {
        let (mut ctx, _problem) = list_sum_problem();
        let pair = RType::Tuple(vec![RType::Int, RType::Int]);
        let hole = ctx.named_var("h", RType::fun(RType::Int, pair));
        let plan = hole_plan(&mut ctx, &hole, true);
        let expected = vec![
            (
                "h_0".to_string(),
                vec![("x0".to_string(), RType::Int)],
                RType::Int,
            ),
            (
                "h_1".to_string(),
                vec![("x0".to_string(), RType::Int)],
                RType::Int,
            ),
        ];
        let defs = vec![
            SynthFunDef {
                name: "h_0".into(),
                args: vec![("x0".into(), sifaka_smt::sorts::SmtSort::Int)],
                ret: sifaka_smt::sorts::SmtSort::Int,
                body: sifaka_smt::terms::SmtTerm::var("x0"),
            },
            SynthFunDef {
                name: "h_1".into(),
                args: vec![("x0".into(), sifaka_smt::sorts::SmtSort::Int)],
                ret: sifaka_smt::sorts::SmtSort::Int,
                body: sifaka_smt::terms::SmtTerm::int(0),
            },
        ];
        let out = decode_solutions(&mut ctx, &[plan], &expected, &defs).unwrap();
        assert_eq!(out.len(), 1);
        match &out[0].body.kind {
            TermKind::Tuple(elems) => {
                assert_eq!(elems[1], Term::int(0));
            }
            other => panic!("expected tuple body, got {other:?}"),
        }
    }

    #[test]
    fn unknown_definition_name_is_rejected() {
        let (mut ctx, _problem) = list_sum_problem();
        let hole = ctx.named_var("f0", RType::Int);
        let plan = hole_plan(&mut ctx, &hole, true);
        let expected = vec![("f0".to_string(), vec![], RType::Int)];
        let defs = vec![SynthFunDef {
            name: "ghost".into(),
            args: vec![],
            ret: sifaka_smt::sorts::SmtSort::Int,
            body: sifaka_smt::terms::SmtTerm::int(0),
        }];
        let err = decode_solutions(&mut ctx, &[plan], &expected, &defs).unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownHole(n) if n == "ghost"));
    }
}
