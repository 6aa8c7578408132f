use std::collections::HashMap;

use crate::backends::cvc5_backend::{parse_value_response, SolverConfig};
use crate::backends::process::{BackendError, SolverProcess};
use crate::backends::smtlib_printer::{datatypes_to_smtlib, sort_to_smtlib, to_smtlib};
use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::{DatatypeDecl, SmtSort};
use crate::terms::SmtTerm;

/// Z3 over stdio (`z3 -in -smt2`).
///
/// Z3 shares the SMT-LIB text path with the cvc5 backend so that
/// datatype declarations and quantified assertions print identically;
/// only process arguments and option spellings differ.
pub struct Z3Solver {
    proc: SolverProcess,
    vars: HashMap<String, SmtSort>,
    logic: String,
}

impl Z3Solver {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_config(&SolverConfig::z3("ALL"))
    }

    pub fn with_config(cfg: &SolverConfig) -> Result<Self, BackendError> {
        let mut args = vec!["-in".to_string(), "-smt2".to_string()];
        if let Some(ms) = cfg.timeout_ms {
            args.push(format!("-t:{ms}"));
        }
        let mut proc = SolverProcess::spawn(&cfg.command, &args)?;
        proc.send("(set-option :produce-models true)")?;
        if cfg.logic != "ALL" {
            // Z3 treats an explicit ALL logic as an error; leaving the
            // logic unset selects the full solver.
            proc.send(&format!("(set-logic {})", cfg.logic))?;
        }
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
            "unknown" => Ok(SatResult::Unknown("z3 returned unknown".into())),
            other => Err(BackendError::SolverError(other.to_string())),
        }
    }
}

impl Drop for Z3Solver {
    fn drop(&mut self) {
        self.proc.exit();
    }
}

impl SmtSolver for Z3Solver {
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
        self.proc.send("(set-option :produce-models true)")?;
        if self.logic != "ALL" {
            self.proc.send(&format!("(set-logic {})", self.logic))?;
        }
        self.vars.clear();
        Ok(())
    }
}
