//! Engine configuration knobs.

/// Which solver backend to use for SMT checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverChoice {
    #[default]
    Z3,
    Cvc5,
}

/// Options for one refinement-loop run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub solver: SolverChoice,
    /// Step bound for every single reduction.
    pub reduction_limit: usize,
    /// Depth cutoff for the expansion loop.
    pub expand_depth: usize,
    /// Cumulative term-count cutoff for the expansion loop.
    pub expand_cut: usize,
    /// Term budget for each verifier call.
    pub num_expansions_check: usize,
    /// Rounds of the inner lemma-refinement loop.
    pub max_lemma_attempts: usize,
    /// Lifting widenings before declaring unrealizability final.
    pub max_lifting_attempts: usize,
    /// Upper bound on refinement steps before answering Unknown.
    pub max_refinement_steps: usize,
    /// Time limit for the unbounded (inductive) lemma check.
    pub induction_proof_tlimit_ms: u64,
    /// Outer wait bound when racing the bounded and unbounded checkers.
    pub wait_parallel_tlimit_ms: u64,
    /// Whole-run time limit for each SyGuS invocation.
    pub sygus_timeout_ms: u64,
    /// Seed the loop from a single variable instead of the MGT family.
    pub simple_init: bool,
    /// Split tuple-typed holes into per-component holes.
    pub detupling: bool,
    /// Canonicalize equations before emission.
    pub simplify_eqns: bool,
    /// Commit deduced hole bodies as definitions for later rounds.
    pub use_syntactic_definitions: bool,
    /// Carry previously-satisfied equations as assumptions.
    pub assume_partial_correctness: bool,
    /// Allow the Lift transition after an unrealizability certificate.
    pub lifting_enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            solver: SolverChoice::Z3,
            reduction_limit: 100,
            expand_depth: 2,
            expand_cut: 124,
            num_expansions_check: 16,
            max_lemma_attempts: 10,
            max_lifting_attempts: 2,
            max_refinement_steps: 64,
            induction_proof_tlimit_ms: 2_000,
            wait_parallel_tlimit_ms: 30_000,
            sygus_timeout_ms: 30_000,
            simple_init: false,
            detupling: true,
            simplify_eqns: true,
            use_syntactic_definitions: true,
            assume_partial_correctness: true,
            lifting_enabled: true,
        }
    }
}

impl EngineOptions {
    /// The one-shot retry after `Incorrect_assumptions` clears the
    /// syntactic-definition and partial-correctness optimizations.
    pub fn weakened(&self) -> Self {
        let mut out = self.clone();
        out.use_syntactic_definitions = false;
        out.assume_partial_correctness = false;
        out
    }
}
