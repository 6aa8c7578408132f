#![doc = include_str!("../README.md")]

//! SMT and SyGuS ports.
//!
//! The engine never depends on one solver's quirks: it speaks through
//! the [`solver::SmtSolver`] trait and the [`sygus`] command model, and
//! the subprocess backends translate to the concrete binaries.

pub mod backends;
pub mod sexp;
pub mod solver;
pub mod sorts;
pub mod sygus;
pub mod terms;
