//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sifaka")]
#[command(about = "Synthesis of recursive function skeletons against reference specifications")]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Solve a synthesis problem file
    Solve {
        /// Path to the .pmrs problem file
        file: PathBuf,

        /// SMT backend for verification and lemma proofs
        #[arg(long, default_value = "z3")]
        solver: String,

        /// Name of the reference scheme
        #[arg(long, default_value = "spec")]
        reference: String,

        /// Name of the target skeleton
        #[arg(long, default_value = "target")]
        target: String,

        /// Name of the representation function
        #[arg(long, default_value = "repr")]
        repr: String,

        /// Name of the optional input invariant
        #[arg(long, default_value = "tinv")]
        tinv: String,

        /// Step bound for each reduction
        #[arg(long, default_value_t = 100)]
        reduction_limit: usize,

        /// Expansion depth cutoff
        #[arg(long, default_value_t = 2)]
        expand_depth: usize,

        /// Expansion term-count cutoff
        #[arg(long, default_value_t = 124)]
        expand_cut: usize,

        /// Verifier expansion budget per call
        #[arg(long, default_value_t = 16)]
        check_expansions: usize,

        /// Inner lemma-refinement attempts
        #[arg(long, default_value_t = 10)]
        lemma_attempts: usize,

        /// Refinement step budget
        #[arg(long, default_value_t = 64)]
        max_steps: usize,

        /// Time limit (ms) for unbounded lemma checks
        #[arg(long, default_value_t = 2000)]
        induction_tlimit: u64,

        /// Whole-run time limit (ms) for each SyGuS call
        #[arg(long, default_value_t = 30000)]
        sygus_timeout: u64,

        /// Seed from a bare variable instead of the most general terms
        #[arg(long, default_value_t = false)]
        simple_init: bool,

        /// Disable tuple-hole splitting
        #[arg(long, default_value_t = false)]
        no_detupling: bool,

        /// Disable equation canonicalization
        #[arg(long, default_value_t = false)]
        no_simplify: bool,

        /// Disable lifting after an unrealizability certificate
        #[arg(long, default_value_t = false)]
        no_lifting: bool,

        /// Write the solution and statistics files into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the result as JSON on stdout
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Parse and type-check a problem file without solving it
    Lint {
        /// Path to the .pmrs problem file
        file: PathBuf,
    },
}
