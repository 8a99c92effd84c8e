//! Subprocess runner for external tools

use crate::core::Exports;
use crate::external::OperationError;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A command line to run, with its working directory and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Exports,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Exports::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, env: &Exports) -> Self {
        for (key, value) in env {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Human-readable command line used in logs and errors
    pub fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Lines of output kept for the error of a failed command
const OUTPUT_TAIL_LINES: usize = 40;

/// Runs external commands with a timeout
///
/// Output is streamed line by line into the log as it arrives, so long
/// builds and test runs stay visible. The last lines are kept for the error
/// of a failed command.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout_secs: u64,
}

impl CommandRunner {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Run a command to completion and return its stdout
    ///
    /// # Errors
    /// Returns `OperationError` if the program cannot be spawned, exits with a
    /// non-zero status, or runs longer than the configured timeout.
    pub async fn run(&self, command: &ExternalCommand) -> Result<String, OperationError> {
        let description = command.describe();
        debug!("Running: {}", description);

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            process.current_dir(dir);
        }

        let mut child = process.spawn().map_err(|e| OperationError::Spawn {
            command: description.clone(),
            reason: e.to_string(),
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // The child moves into the future so a timeout drops and kills it
        let completion = async move {
            let (stdout, stderr) = tokio::join!(forward_lines(stdout, false), forward_lines(stderr, true));
            let status = child.wait().await;
            (status, stdout, stderr)
        };

        let (status, stdout, stderr) = timeout(Duration::from_secs(self.timeout_secs), completion)
            .await
            .map_err(|_| OperationError::Timeout {
                command: description.clone(),
                secs: self.timeout_secs,
            })?;

        let status = status.map_err(|e| OperationError::io(format!("failed to wait for {}", description), e))?;

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            let output = output_tail(&stdout, &stderr, OUTPUT_TAIL_LINES);
            warn!("{} exited with code {}", description, code);
            return Err(OperationError::Exit {
                command: description,
                code,
                output,
            });
        }

        debug!("{} wrote {} line(s) of output", description, stdout.len());
        Ok(stdout.join("\n"))
    }
}

/// Log every line of a child's stream and return them
async fn forward_lines<R>(stream: Option<R>, is_stderr: bool) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let Some(stream) = stream else {
        return collected;
    };

    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    warn!("{}", line);
                } else {
                    info!("{}", line);
                }
                collected.push(line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading command output: {}", e);
                break;
            }
        }
    }
    collected
}

/// The last `limit` lines of stdout, then of stderr
fn output_tail(stdout: &[String], stderr: &[String], limit: usize) -> String {
    let tail = |lines: &[String]| lines[lines.len().saturating_sub(limit)..].join("\n");
    [tail(stdout), tail(stderr)]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
