use std::collections::HashMap;

use crate::sorts::{DatatypeDecl, SmtSort};
use crate::terms::SmtTerm;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// A model (variable assignments) extracted from a SAT result.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    Int(i64),
    Bool(bool),
}

impl Model {
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ModelValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

/// Abstract SMT solver interface.
///
/// The engine holds at most one live solver per call site; cancellation
/// is by dropping the backend, which terminates the subprocess.
pub trait SmtSolver {
    type Error: std::error::Error;

    /// Declare a new variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Declare an uninterpreted function.
    fn declare_fun(
        &mut self,
        name: &str,
        args: &[SmtSort],
        ret: &SmtSort,
    ) -> Result<(), Self::Error>;

    /// Define a function with a body.
    fn define_fun(
        &mut self,
        name: &str,
        args: &[(String, SmtSort)],
        ret: &SmtSort,
        body: &SmtTerm,
    ) -> Result<(), Self::Error>;

    /// Define a recursive function (`define-fun-rec`).
    fn define_fun_rec(
        &mut self,
        name: &str,
        args: &[(String, SmtSort)],
        ret: &SmtSort,
        body: &SmtTerm,
    ) -> Result<(), Self::Error>;

    /// Declare algebraic datatypes (one mutually-recursive group).
    fn declare_datatypes(&mut self, decls: &[DatatypeDecl]) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Push a new scope.
    fn push(&mut self) -> Result<(), Self::Error>;

    /// Pop a scope.
    fn pop(&mut self) -> Result<(), Self::Error>;

    /// Set a solver option.
    fn set_option(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check satisfiability and extract a model if SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Reset the solver state.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct MockSolver {
        sat_result: SatResult,
        check_sat_calls: usize,
    }

    impl SmtSolver for MockSolver {
        type Error = io::Error;

        fn declare_var(&mut self, _name: &str, _sort: &SmtSort) -> Result<(), Self::Error> {
            Ok(())
        }

        fn declare_fun(
            &mut self,
            _name: &str,
            _args: &[SmtSort],
            _ret: &SmtSort,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn define_fun(
            &mut self,
            _name: &str,
            _args: &[(String, SmtSort)],
            _ret: &SmtSort,
            _body: &SmtTerm,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn define_fun_rec(
            &mut self,
            _name: &str,
            _args: &[(String, SmtSort)],
            _ret: &SmtSort,
            _body: &SmtTerm,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn declare_datatypes(&mut self, _decls: &[DatatypeDecl]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn assert(&mut self, _term: &SmtTerm) -> Result<(), Self::Error> {
            Ok(())
        }

        fn push(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn pop(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn set_option(&mut self, _key: &str, _value: &str) -> Result<(), Self::Error> {
            Ok(())
        }

        fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
            self.check_sat_calls += 1;
            Ok(self.sat_result.clone())
        }

        fn check_sat_with_model(
            &mut self,
            _var_names: &[(&str, &SmtSort)],
        ) -> Result<(SatResult, Option<Model>), Self::Error> {
            Ok((self.sat_result.clone(), None))
        }

        fn reset(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn model_getters_return_typed_values_only() {
        let mut values = HashMap::new();
        values.insert("x".to_string(), ModelValue::Int(42));
        values.insert("flag".to_string(), ModelValue::Bool(true));
        let model = Model { values };

        assert_eq!(model.get_int("x"), Some(42));
        assert_eq!(model.get_bool("flag"), Some(true));
        assert_eq!(model.get_int("flag"), None);
        assert_eq!(model.get_bool("x"), None);
        assert_eq!(model.get_int("missing"), None);
    }

    #[test]
    fn trait_object_style_usage_compiles() {
        let mut solver = MockSolver {
            sat_result: SatResult::Unsat,
            check_sat_calls: 0,
        };
        solver.declare_var("x", &SmtSort::Int).unwrap();
        solver
            .assert(&SmtTerm::var("x").ge(SmtTerm::int(0)))
            .unwrap();
        assert_eq!(solver.check_sat().unwrap(), SatResult::Unsat);
        assert_eq!(solver.check_sat_calls, 1);
    }
}
