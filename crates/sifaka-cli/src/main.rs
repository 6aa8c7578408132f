use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::solve::{RoleNames, SolveArgs};
use sifaka_engine::config::EngineOptions;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Solve {
            file,
            solver,
            reference,
            target,
            repr,
            tinv,
            reduction_limit,
            expand_depth,
            expand_cut,
            check_expansions,
            lemma_attempts,
            max_steps,
            induction_tlimit,
            sygus_timeout,
            simple_init,
            no_detupling,
            no_simplify,
            no_lifting,
            output,
            json,
        } => {
            let options = EngineOptions {
                reduction_limit,
                expand_depth,
                expand_cut,
                num_expansions_check: check_expansions,
                max_lemma_attempts: lemma_attempts,
                max_refinement_steps: max_steps,
                induction_proof_tlimit_ms: induction_tlimit,
                sygus_timeout_ms: sygus_timeout,
                simple_init,
                detupling: !no_detupling,
                simplify_eqns: !no_simplify,
                lifting_enabled: !no_lifting,
                ..EngineOptions::default()
            };
            commands::solve::run(SolveArgs {
                file,
                solver,
                roles: RoleNames {
                    reference,
                    target,
                    repr,
                    tinv,
                },
                options,
                output,
                json,
            })
        }
        Commands::Lint { file } => commands::lint::run(&file),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(report) => {
            eprintln!("{report:?}");
            std::process::exit(1);
        }
    }
}
