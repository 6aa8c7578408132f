#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(program) = sifaka_dsl::parse(s, "fuzz.pmrs") {
            let mut ctx = sifaka_ir::context::Context::new();
            // Lowering and validation must never panic on any parse.
            if let Ok(lowered) = sifaka_ir::lowering::lower_program(&mut ctx, &program) {
                for (_, pmrs) in &lowered.schemes {
                    let _ = pmrs.validate(ctx.registry());
                }
            }
        }
    }
});
