//! Shared subprocess plumbing for stdio SMT backends.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("solver not found: {0}")]
    NotFound(String),
    #[error("solver error: {0}")]
    SolverError(String),
    #[error("failed to parse solver output: {0}")]
    ParseError(String),
}

/// A running solver subprocess speaking SMT-LIB over stdio.
pub struct SolverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
}

impl SolverProcess {
    pub fn spawn(cmd: &str, args: &[String]) -> Result<Self, BackendError> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::NotFound(format!("{cmd}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::SolverError("failed to capture solver stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::SolverError("failed to capture solver stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::SolverError("failed to capture solver stderr".into()))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
        })
    }

    /// Send a command that produces no output.
    pub fn send(&mut self, cmd: &str) -> Result<(), BackendError> {
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Send a command and read one line of response.
    pub fn query_line(&mut self, cmd: &str) -> Result<String, BackendError> {
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        let mut response = String::new();
        self.stdout.read_line(&mut response)?;
        if response.is_empty() {
            let mut stderr = String::new();
            let _ = self.stderr.read_line(&mut stderr);
            return Err(BackendError::SolverError(format!(
                "no response for command `{cmd}`. stderr: {}",
                stderr.trim()
            )));
        }
        Ok(response.trim_end().to_string())
    }

    /// Send a command and read until the parentheses balance: used for
    /// multi-line replies such as `get-value` and `get-model`.
    pub fn query_sexp(&mut self, cmd: &str) -> Result<String, BackendError> {
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        let mut out = String::new();
        let mut depth: i64 = 0;
        loop {
            let mut line = String::new();
            let n = self.stdout.read_line(&mut line)?;
            if n == 0 {
                return Err(BackendError::SolverError(format!(
                    "solver closed its output while answering `{cmd}`"
                )));
            }
            depth += line.chars().filter(|c| *c == '(').count() as i64;
            depth -= line.chars().filter(|c| *c == ')').count() as i64;
            out.push_str(&line);
            if depth <= 0 && !out.trim().is_empty() {
                return Ok(out.trim().to_string());
            }
        }
    }

    /// Close stdin and collect all remaining output (batch mode).
    pub fn finish(mut self) -> Result<String, BackendError> {
        drop(self.stdin);
        let mut out = String::new();
        self.stdout.read_to_string(&mut out)?;
        let status = self.child.wait()?;
        if out.trim().is_empty() && !status.success() {
            let mut err = String::new();
            let _ = self.stderr.read_to_string(&mut err);
            return Err(BackendError::SolverError(format!(
                "solver exited with {status}: {}",
                err.trim()
            )));
        }
        Ok(out)
    }

    /// Shut the process down gracefully, then reap it.
    pub fn exit(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}
