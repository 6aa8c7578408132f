#![doc = include_str!("../README.md")]

//! Sifaka synthesis engine.
//!
//! The pipeline derives equations between bounded reductions of the
//! reference composed with the representation and the target skeleton,
//! fills the skeleton's holes through deduction or SyGuS, verifies
//! candidates by expansion plus SMT, and refines with counterexamples
//! and per-term lemmas until it can answer realizable, unrealizable, or
//! unknown.

pub mod config;
pub mod deduction;
pub mod encode;
pub mod equations;
pub mod grammar;
pub mod lemmas;
pub mod lift;
pub mod pipeline;
pub mod result;
pub mod state;
pub mod synthesis;
pub mod verify;
