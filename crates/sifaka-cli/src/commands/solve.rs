//! The `solve` subcommand: parse, lower, assemble, run the loop,
//! persist the solution and its statistics record.

use std::fs;
use std::path::{Path, PathBuf};

use miette::IntoDiagnostic;
use tracing::info;

use sifaka_engine::config::{EngineOptions, SolverChoice};
use sifaka_engine::pipeline::{solve as run_loop, Ports};
use sifaka_engine::result::{SolveStats, SynthResult};
use sifaka_ir::context::Context;
use sifaka_ir::lowering::lower_program;
use sifaka_ir::problem::ProblemDefn;

/// Which schemes of the program play which role.
pub(crate) struct RoleNames {
    pub reference: String,
    pub target: String,
    pub repr: String,
    pub tinv: String,
}

pub(crate) struct SolveArgs {
    pub file: PathBuf,
    pub solver: String,
    pub roles: RoleNames,
    pub options: EngineOptions,
    pub output: Option<PathBuf>,
    pub json: bool,
}

pub(crate) fn run(args: SolveArgs) -> miette::Result<i32> {
    let source = fs::read_to_string(&args.file).into_diagnostic()?;
    let filename = args.file.display().to_string();
    let program = sifaka_dsl::parse(&source, &filename)?;

    let mut ctx = Context::new();
    let lowered = lower_program(&mut ctx, &program).into_diagnostic()?;

    let scheme = |name: &str| {
        lowered.scheme(name).cloned().ok_or_else(|| {
            miette::miette!("problem {} has no scheme named {name}", program.name)
        })
    };
    let reference = scheme(&args.roles.reference)?;
    let target = scheme(&args.roles.target)?;
    let repr = scheme(&args.roles.repr)?;
    let tinv = lowered.scheme(&args.roles.tinv).cloned();

    let mut options = args.options;
    options.solver = match args.solver.as_str() {
        "cvc5" => SolverChoice::Cvc5,
        _ => SolverChoice::Z3,
    };

    let problem =
        ProblemDefn::new(ctx.registry(), reference, target, repr, tinv).into_diagnostic()?;
    let mut ports = Ports::production(&ctx, &options).into_diagnostic()?;

    info!(problem = %program.name, "starting solve");
    let mut outcome = run_loop(&mut ctx, &problem, &options, &mut ports);
    outcome.stats.fingerprint =
        SolveStats::fingerprint_of(&source, &format!("{options:?}"));

    if args.json {
        let record = serde_json::json!({
            "problem": program.name,
            "result": outcome.result,
            "stats": outcome.stats,
        });
        println!("{}", serde_json::to_string_pretty(&record).into_diagnostic()?);
    } else {
        render_text(&program.name, &outcome.result);
    }

    if let Some(dir) = &args.output {
        persist(dir, &args.file, &outcome.result, &outcome.stats)?;
    }

    Ok(match outcome.result {
        SynthResult::Realizable { .. } | SynthResult::Unrealizable { .. } => 0,
        SynthResult::Unknown { .. } | SynthResult::Failed { .. } => 2,
    })
}

fn render_text(name: &str, result: &SynthResult) {
    match result {
        SynthResult::Realizable { solutions } => {
            println!("{name}: realizable");
            for s in solutions {
                println!("  {s}");
            }
        }
        SynthResult::Unrealizable { witnesses } => {
            println!("{name}: unrealizable ({} witnesses)", witnesses.len());
            for w in witnesses {
                println!("  term {}", w.term);
            }
        }
        SynthResult::Unknown { reason } => println!("{name}: unknown ({reason})"),
        SynthResult::Failed { reason } => println!("{name}: failed ({reason})"),
    }
}

/// Write `FILE.sol` and `FILE.stats.json` next to each solved input.
fn persist(
    dir: &Path,
    input: &Path,
    result: &SynthResult,
    stats: &SolveStats,
) -> miette::Result<()> {
    fs::create_dir_all(dir).into_diagnostic()?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "problem".into());

    let mut solution_text = String::new();
    if let SynthResult::Realizable { solutions } = result {
        for s in solutions {
            solution_text.push_str(&s.to_string());
            solution_text.push('\n');
        }
    }
    fs::write(dir.join(format!("{stem}.sol")), solution_text).into_diagnostic()?;

    let record = serde_json::json!({ "result": result, "stats": stats });
    fs::write(
        dir.join(format!("{stem}.stats.json")),
        serde_json::to_string_pretty(&record).into_diagnostic()?,
    )
    .into_diagnostic()?;
    Ok(())
}
