use std::{
    io::Read,
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::trace;
use thiserror::Error;

use crate::cancel::Cancellation;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Diagnostics git prints when a commit object is not present locally.
const MISSING_OBJECT_MARKERS: [&str; 5] = [
    "bad object",
    "bad revision",
    "unknown revision",
    "not a valid object name",
    "invalid object name",
];

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Could not run {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },
    #[error("`{command}` failed with exit code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Exit status and captured output of one VCS invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        RawOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        RawOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Executes the VCS binary. Implementations only spawn and capture; exit
/// codes are interpreted by [`Git`].
pub trait GitRunner: Send + Sync {
    fn execute(&self, args: &[String]) -> Result<RawOutput, GitError>;
}

/// Non-zero exits a caller is prepared to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// `diff --quiet` reporting a difference (exit 1).
    Dirty,
    /// The commit object is absent from the local object store (exit 128).
    MissingObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOutcome {
    Success(String),
    Dirty,
    MissingObject(String),
}

pub struct ProcessGitRunner {
    binary: PathBuf,
    cancellation: Cancellation,
}

impl ProcessGitRunner {
    pub fn new(binary: impl Into<PathBuf>, cancellation: Cancellation) -> Self {
        ProcessGitRunner {
            binary: binary.into(),
            cancellation,
        }
    }
}

impl GitRunner for ProcessGitRunner {
    fn execute(&self, args: &[String]) -> Result<RawOutput, GitError> {
        let command = render(&self.binary.to_string_lossy(), args);
        if self.cancellation.is_cancelled() {
            return Err(GitError::Cancelled { command });
        }
        trace!("Running {}", command);

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GitError::Spawn {
                binary: self.binary.to_string_lossy().to_string(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.cancellation.is_cancelled() {
                trace!("Killing {}", command);
                child.kill()?;
                child.wait()?;
                return Err(GitError::Cancelled { command });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(RawOutput {
            code: status.code(),
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<String, GitError> {
    let bytes = handle
        .join()
        .map_err(|_| std::io::Error::other("pipe reader panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn render(binary: &str, args: &[String]) -> String {
    std::iter::once(binary)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Typed front of a [`GitRunner`]: callers never see raw exit codes.
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn GitRunner>,
}

impl Git {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Git { runner }
    }

    /// Runs `args`, mapping the anticipated `expected` signals to outcomes
    /// and every other failure to [`GitError::Failed`].
    pub fn run(&self, args: &[&str], expected: &[Signal]) -> Result<GitOutcome, GitError> {
        let args = full_args(args);
        let output = self.runner.execute(&args)?;
        classify(output, expected, &args)
    }

    /// Runs `args` and returns stdout, treating any non-zero exit as an error.
    pub fn output(&self, args: &[&str]) -> Result<String, GitError> {
        match self.run(args, &[])? {
            GitOutcome::Success(stdout) => Ok(stdout),
            // Unreachable without expected signals.
            GitOutcome::Dirty | GitOutcome::MissingObject(_) => Err(GitError::Failed {
                command: render("git", &full_args(args)),
                code: None,
                stderr: String::new(),
            }),
        }
    }
}

fn full_args(args: &[&str]) -> Vec<String> {
    let mut full = Vec::with_capacity(args.len() + 2);
    // init has no work tree yet, the config override is pointless there
    if args.first() != Some(&"init") {
        full.push("-c".to_string());
        full.push("advice.detachedHead=false".to_string());
    }
    full.extend(args.iter().map(|arg| arg.to_string()));
    full
}

fn classify(
    output: RawOutput,
    expected: &[Signal],
    args: &[String],
) -> Result<GitOutcome, GitError> {
    match output.code {
        Some(0) => Ok(GitOutcome::Success(output.stdout)),
        Some(1) if expected.contains(&Signal::Dirty) => Ok(GitOutcome::Dirty),
        Some(128)
            if expected.contains(&Signal::MissingObject) && is_missing_object(&output.stderr) =>
        {
            Ok(GitOutcome::MissingObject(output.stderr.trim().to_string()))
        }
        code => Err(GitError::Failed {
            command: render("git", args),
            code,
            stderr: output.stderr.trim().to_string(),
        }),
    }
}

fn is_missing_object(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    MISSING_OBJECT_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}
