use std::collections::HashMap;

use crate::backends::process::{BackendError, SolverProcess};
use crate::backends::smtlib_printer::{datatypes_to_smtlib, sort_to_smtlib, to_smtlib};
use crate::sexp::{parse_sexps, Sexp};
use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::{DatatypeDecl, SmtSort};
use crate::terms::SmtTerm;

/// Backend configuration shared by the stdio solvers.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub command: String,
    pub logic: String,
    /// Per-query time limit in milliseconds; `None` means unbounded.
    pub timeout_ms: Option<u64>,
}

impl SolverConfig {
    pub fn cvc5(logic: &str) -> Self {
        Self {
            command: "cvc5".into(),
            logic: logic.into(),
            timeout_ms: None,
        }
    }

    pub fn z3(logic: &str) -> Self {
        Self {
            command: "z3".into(),
            logic: logic.into(),
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = (ms > 0).then_some(ms);
        self
    }
}

pub struct Cvc5Solver {
    proc: SolverProcess,
    vars: HashMap<String, SmtSort>,
    logic: String,
}

impl Cvc5Solver {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_config(&SolverConfig::cvc5("ALL"))
    }

    pub fn with_config(cfg: &SolverConfig) -> Result<Self, BackendError> {
        let mut args = vec![
            "--lang".to_string(),
            "smt2".to_string(),
            "--incremental".to_string(),
            "--produce-models".to_string(),
            // Needed by the unbounded lemma checks.
            "--quant-ind".to_string(),
        ];
        if let Some(ms) = cfg.timeout_ms {
            args.push(format!("--tlimit-per={ms}"));
        }
        let mut proc = SolverProcess::spawn(&cfg.command, &args)?;
        proc.send(&format!("(set-logic {})", cfg.logic))?;
        Ok(Self {
            proc,
            vars: HashMap::new(),
            logic: cfg.logic.clone(),
        })
    }

    fn parse_sat_line(response: &str) -> Result<SatResult, BackendError> {
        match response {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => Ok(SatResult::Unknown("cvc5 returned unknown".into())),
            other => Err(BackendError::SolverError(other.to_string())),
        }
    }
}

impl Drop for Cvc5Solver {
    fn drop(&mut self) {
        self.proc.exit();
    }
}

impl SmtSolver for Cvc5Solver {
    type Error = BackendError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), BackendError> {
        self.proc.send(&format!(
            "(declare-const {name} {})",
            sort_to_smtlib(sort)
        ))?;
        self.vars.insert(name.to_string(), sort.clone());
        Ok(())
    }

    fn declare_fun(
        &mut self,
        name: &str,
        args: &[SmtSort],
        ret: &SmtSort,
    ) -> Result<(), BackendError> {
        let arg_s: Vec<String> = args.iter().map(sort_to_smtlib).collect();
        self.proc.send(&format!(
            "(declare-fun {name} ({}) {})",
            arg_s.join(" "),
            sort_to_smtlib(ret)
        ))
    }

    fn define_fun(
        &mut self,
        name: &str,
        args: &[(String, SmtSort)],
        ret: &SmtSort,
        body: &SmtTerm,
    ) -> Result<(), BackendError> {
        let arg_s: Vec<String> = args
            .iter()
            .map(|(n, s)| format!("({n} {})", sort_to_smtlib(s)))
            .collect();
        self.proc.send(&format!(
            "(define-fun {name} ({}) {} {})",
            arg_s.join(" "),
            sort_to_smtlib(ret),
            to_smtlib(body)
        ))
    }

    fn define_fun_rec(
        &mut self,
        name: &str,
        args: &[(String, SmtSort)],
        ret: &SmtSort,
        body: &SmtTerm,
    ) -> Result<(), BackendError> {
        let arg_s: Vec<String> = args
            .iter()
            .map(|(n, s)| format!("({n} {})", sort_to_smtlib(s)))
            .collect();
        self.proc.send(&format!(
            "(define-fun-rec {name} ({}) {} {})",
            arg_s.join(" "),
            sort_to_smtlib(ret),
            to_smtlib(body)
        ))
    }

    fn declare_datatypes(&mut self, decls: &[DatatypeDecl]) -> Result<(), BackendError> {
        self.proc.send(&datatypes_to_smtlib(decls))
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), BackendError> {
        self.proc.send(&format!("(assert {})", to_smtlib(term)))
    }

    fn push(&mut self) -> Result<(), BackendError> {
        self.proc.send("(push 1)")
    }

    fn pop(&mut self) -> Result<(), BackendError> {
        self.proc.send("(pop 1)")
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        self.proc.send(&format!("(set-option :{key} {value})"))
    }

    fn check_sat(&mut self) -> Result<SatResult, BackendError> {
        let response = self.proc.query_line("(check-sat)")?;
        Self::parse_sat_line(&response)
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), BackendError> {
        let result = self.check_sat()?;
        if result != SatResult::Sat {
            return Ok((result, None));
        }
        let mut values = HashMap::new();
        for &(name, sort) in var_names {
            let response = self.proc.query_sexp(&format!("(get-value ({name}))"))?;
            if let Some(val) = parse_value_response(&response, sort)? {
                values.insert(name.to_string(), val);
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn reset(&mut self) -> Result<(), BackendError> {
        self.proc.send("(reset)")?;
        self.proc.send(&format!("(set-logic {})", self.logic))?;
        self.vars.clear();
        Ok(())
    }
}

/// Parse a `((name value))` get-value reply into a scalar model value.
pub(crate) fn parse_value_response(
    response: &str,
    sort: &SmtSort,
) -> Result<Option<ModelValue>, BackendError> {
    let forms =
        parse_sexps(response).map_err(|e| BackendError::ParseError(e.to_string()))?;
    let outer = forms
        .first()
        .and_then(Sexp::as_list)
        .ok_or_else(|| BackendError::ParseError(format!("bad get-value reply: {response}")))?;
    let pair = outer
        .first()
        .and_then(Sexp::as_list)
        .ok_or_else(|| BackendError::ParseError(format!("bad get-value entry: {response}")))?;
    let value = pair
        .get(1)
        .ok_or_else(|| BackendError::ParseError(format!("missing value: {response}")))?;
    Ok(scalar_of_sexp(value, sort))
}

pub(crate) fn scalar_of_sexp(value: &Sexp, sort: &SmtSort) -> Option<ModelValue> {
    match sort {
        SmtSort::Int => match value {
            Sexp::Atom(a) => a.parse::<i64>().ok().map(ModelValue::Int),
            Sexp::List(items) => {
                // (- N)
                if items.len() == 2 && items[0].as_atom() == Some("-") {
                    items[1]
                        .as_atom()
                        .and_then(|a| a.parse::<i64>().ok())
                        .map(|n| ModelValue::Int(-n))
                } else {
                    None
                }
            }
        },
        SmtSort::Bool => match value.as_atom() {
            Some("true") => Some(ModelValue::Bool(true)),
            Some("false") => Some(ModelValue::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}
