#![doc = include_str!("../README.md")]

//! Sifaka intermediate representation.
//!
//! This crate defines the typed term language, the unification engine,
//! the PMRS (pattern-matching recursion scheme) arena representation,
//! bounded reduction, the expansion of terms into maximally-reducible
//! and frontier sets, and the lowering pass from the DSL AST.

pub mod context;
pub mod expand;
pub mod lowering;
pub mod mgt;
pub mod pmrs;
pub mod problem;
pub mod reduce;
pub mod terms;
pub mod types;
