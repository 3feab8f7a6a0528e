//! Adapter driving an external compiler executable.
//!
//! Each call spawns a fresh process, writes the source text to its stdin and
//! decodes stdout/stderr/exit status according to the stage:
//!
//! | stage       | success                              | non-zero exit          |
//! |-------------|--------------------------------------|------------------------|
//! | lexical     | one `KIND` / `KIND(lit)` per line     | diagnostic (stderr)    |
//! | syntactic   | trimmed stdout                        | diagnostic (stderr)    |
//! | semantic    | no diagnostic                         | diagnostic (stderr)    |
//! | codegen     | stdout as JSON `CodeDescription`      | diagnostic (stderr)    |
//! | integration | exit code is the return value         | exit code is the value |
//!
//! Termination by a signal is a compiler crash, or an abnormal execution
//! outcome for the integration stage.
//!
//! stdin is written and stdout/stderr are drained on their own threads, so a
//! compiler that streams output while still reading never fills a pipe. When
//! called with a deadline the process is killed and reaped once it passes.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{AdapterFault, CodeDescription, ExecutionOutcome, StageAdapter, StageResult};
use crate::fixture::TokenDescriptor;
use crate::stage::Stage;

/// Runs `program args...` once per fixture input.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
    stage: Stage,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandAdapter {
    pub fn new(stage: Stage, program: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn spawn(&self, input: &str, deadline: Option<Instant>) -> Result<Output, AdapterFault> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AdapterFault::Unavailable(format!("failed to start '{}': {}", self.program.display(), e))
            })?;

        let pipes = match self.start_pipes(&mut child, input) {
            Ok(pipes) => pipes,
            Err(fault) => {
                reap(&mut child);
                return Err(fault);
            }
        };
        let status = self.wait(&mut child, deadline)?;
        let (stdout, stderr) = pipes;
        Ok(Output {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    /// Feeds stdin and drains stdout/stderr concurrently with the child.
    fn start_pipes(&self, child: &mut Child, input: &str) -> Result<(Pipe, Pipe), AdapterFault> {
        let stdin = child.stdin.take();
        let input = input.as_bytes().to_vec();
        let program = self.program.display().to_string();
        thread::Builder::new()
            .name("kcc-stdin".into())
            .spawn(move || {
                if let Some(mut stdin) = stdin {
                    // A compiler that exits before reading all of stdin closes
                    // the pipe; its exit status still tells us what happened.
                    if let Err(e) = stdin.write_all(&input) {
                        debug!(program = %program, error = %e, "stdin closed early");
                    }
                }
            })
            .map_err(pipe_fault)?;
        let stdout = drain(child.stdout.take())?;
        let stderr = drain(child.stderr.take())?;
        Ok((stdout, stderr))
    }

    /// Waits for the child, killing it once `deadline` has passed.
    fn wait(&self, child: &mut Child, deadline: Option<Instant>) -> Result<ExitStatus, AdapterFault> {
        let waited = |e: std::io::Error| {
            AdapterFault::Unavailable(format!("failed to wait for '{}': {}", self.program.display(), e))
        };
        let deadline = match deadline {
            Some(deadline) => deadline,
            None => return child.wait().map_err(waited),
        };
        loop {
            if let Some(status) = child.try_wait().map_err(waited)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                reap(child);
                debug!(program = %self.program.display(), pid = child.id(), "killed after deadline");
                return Err(AdapterFault::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn decode(&self, output: Output) -> Result<StageResult, AdapterFault> {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Some(signal) = termination_signal(&output.status) {
            let reason = format!("terminated by signal {}", signal);
            return Ok(match self.stage {
                Stage::Integration => StageResult::Execution(ExecutionOutcome::abnormal(reason)),
                _ => StageResult::Crashed(reason),
            });
        }

        // For integration the exit status is the program's return value.
        if self.stage != Stage::Integration && !output.status.success() {
            let message = stderr.trim();
            return Ok(StageResult::diagnostic(if message.is_empty() {
                format!("exited with {}", output.status)
            } else {
                message.to_string()
            }));
        }

        match self.stage {
            Stage::Lexical => decode_tokens(&stdout).map(StageResult::Tokens),
            Stage::Syntactic => Ok(StageResult::Ast(stdout.trim().to_string())),
            Stage::Semantic => Ok(StageResult::Diagnostic(None)),
            Stage::CodeGen => serde_json::from_str::<CodeDescription>(&stdout)
                .map(StageResult::Code)
                .map_err(|e| AdapterFault::MalformedOutput(format!("code description: {}", e))),
            Stage::Integration => Ok(StageResult::Execution(match output.status.code() {
                Some(code) => ExecutionOutcome::returned(i64::from(code)),
                None => ExecutionOutcome::abnormal("terminated without an exit code"),
            })),
        }
    }
}

impl StageAdapter for CommandAdapter {
    fn run(&self, input: &str) -> Result<StageResult, AdapterFault> {
        let output = self.spawn(input, None)?;
        self.decode(output)
    }

    fn run_within(&self, input: &str, timeout: Duration) -> Result<StageResult, AdapterFault> {
        let output = self.spawn(input, Some(Instant::now() + timeout))?;
        self.decode(output)
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

type Pipe = JoinHandle<Vec<u8>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Result<Pipe, AdapterFault> {
    thread::Builder::new()
        .name("kcc-pipe".into())
        .spawn(move || {
            let mut buffer = Vec::new();
            if let Some(mut pipe) = pipe {
                if let Err(e) = pipe.read_to_end(&mut buffer) {
                    debug!(error = %e, "output pipe closed with an error");
                }
            }
            buffer
        })
        .map_err(pipe_fault)
}

fn pipe_fault(e: std::io::Error) -> AdapterFault {
    AdapterFault::Unavailable(format!("failed to start pipe thread: {}", e))
}

/// Kills and reaps `child`. Killing fails only when it already exited.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn decode_tokens(stdout: &str) -> Result<Vec<TokenDescriptor>, AdapterFault> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse()
                .map_err(|_| AdapterFault::MalformedOutput(format!("bad token line '{}'", line)))
        })
        .collect()
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
