//! Batch SyGuS runner over a cvc5 subprocess.

use tracing::{debug, warn};

use crate::backends::process::{BackendError, SolverProcess};
use crate::sygus::{parse_response, print_problem, SygusCommand, SynthResponse};

#[derive(Debug, Clone)]
pub struct SygusConfig {
    pub command: String,
    /// Whole-run time limit in milliseconds; `None` means unbounded.
    pub timeout_ms: Option<u64>,
}

impl Default for SygusConfig {
    fn default() -> Self {
        Self {
            command: "cvc5".into(),
            timeout_ms: None,
        }
    }
}

impl SygusConfig {
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = (ms > 0).then_some(ms);
        self
    }
}

/// One-shot SyGuS invocation: the whole problem goes in, the process
/// runs to completion, and the answer is classified. Dropping the
/// runner mid-flight kills the subprocess, which is the cancellation
/// story for racing drivers.
pub struct SygusRunner {
    config: SygusConfig,
}

impl SygusRunner {
    pub fn new(config: SygusConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, cmds: &[SygusCommand]) -> Result<SynthResponse, BackendError> {
        let problem = print_problem(cmds);
        debug!(bytes = problem.len(), "dispatching SyGuS problem");
        let mut args = vec!["--lang".to_string(), "sygus2".to_string()];
        if let Some(ms) = self.config.timeout_ms {
            args.push(format!("--tlimit={ms}"));
        }
        let mut proc = SolverProcess::spawn(&self.config.command, &args)?;
        for line in problem.lines() {
            proc.send(line)?;
        }
        let output = proc.finish()?;
        match parse_response(&output) {
            Ok(resp) => Ok(resp),
            Err(e) => {
                // Unparsable output downgrades the attempt rather than
                // aborting the refinement loop.
                warn!(error = %e, "unparsable SyGuS output");
                Ok(SynthResponse::Unknown(format!(
                    "unparsable solver output: {e}"
                )))
            }
        }
    }
}
