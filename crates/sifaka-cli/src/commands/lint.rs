//! The `lint` subcommand: parse and lower without solving.

use std::fs;
use std::path::Path;

use miette::IntoDiagnostic;

use sifaka_ir::context::Context;
use sifaka_ir::lowering::lower_program;

pub(crate) fn run(file: &Path) -> miette::Result<i32> {
    let source = fs::read_to_string(file).into_diagnostic()?;
    let filename = file.display().to_string();
    let program = sifaka_dsl::parse(&source, &filename)?;
    let mut ctx = Context::new();
    let lowered = lower_program(&mut ctx, &program).into_diagnostic()?;
    for (name, pmrs) in &lowered.schemes {
        pmrs.validate(ctx.registry()).into_diagnostic()?;
        println!(
            "{name}: {} -> {} ({} rules, {} holes)",
            pmrs.input_type,
            pmrs.output_type,
            pmrs.rules.len(),
            pmrs.params.len()
        );
    }
    Ok(0)
}
