//! Command boundary - launches external processes for steps

use crate::core::ExecutionError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What to run
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Command line, interpreted by the runner's shell
    pub command: String,

    pub working_directory: PathBuf,

    /// Complete environment additions for this command
    pub env: BTreeMap<String, String>,

    pub timeout: Option<Duration>,
}

/// How the command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own (code None if killed by a signal)
    Exited(Option<i32>),
    /// Killed after exceeding its timeout
    TimedOut,
    /// Killed because the run was cancelled
    Cancelled,
}

/// Captured result of a command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => code,
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(Some(0))
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, or until it times out or `cancel` fires.
    ///
    /// A command that ran and exited non-zero is `Ok`; `Err` is reserved for
    /// commands that could not be launched or awaited.
    async fn run(&self, request: CommandRequest, cancel: CancellationToken) -> Result<CommandOutput, ExecutionError>;
}

/// Runs commands through a shell on the host
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Program and leading arguments; the command is appended last
    shell: Vec<String>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(vec!["sh".to_string(), "-c".to_string()])
    }
}

impl ShellRunner {
    pub fn new(shell: Vec<String>) -> Self {
        Self { shell }
    }

    pub fn shell(&self) -> &[String] {
        &self.shell
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, request: CommandRequest, cancel: CancellationToken) -> Result<CommandOutput, ExecutionError> {
        let (program, args) = self.shell.split_first().ok_or(ExecutionError::EmptyShell)?;
        let start = Instant::now();

        debug!(command = %request.command, cwd = %request.working_directory.display(), "Spawning command");

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(&request.command)
            .current_dir(&request.working_directory)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a kill reaches everything the step started.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        let stdout = tokio::spawn(read_all(child.stdout.take()));
        let stderr = tokio::spawn(read_all(child.stderr.take()));

        let deadline = async {
            match request.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let termination = tokio::select! {
            status = child.wait() => Termination::Exited(status.map_err(ExecutionError::Wait)?.code()),
            _ = deadline => {
                warn!(command = %request.command, "Command timed out, killing process group");
                kill_process_group(&mut child, pid);
                child.wait().await.map_err(ExecutionError::Wait)?;
                Termination::TimedOut
            }
            _ = cancel.cancelled() => {
                warn!(command = %request.command, "Run cancelled, killing process group");
                kill_process_group(&mut child, pid);
                child.wait().await.map_err(ExecutionError::Wait)?;
                Termination::Cancelled
            }
        };

        // Grandchildren of a killed shell may still hold the pipes open.
        let grace = match termination {
            Termination::Exited(_) => None,
            _ => Some(KILL_GRACE),
        };
        let (stdout, stderr) = tokio::join!(collect(stdout, grace), collect(stderr, grace));
        let duration = start.elapsed();

        debug!(?termination, duration_ms = duration.as_millis() as u64, "Command completed");

        Ok(CommandOutput {
            termination,
            stdout,
            stderr,
            duration,
        })
    }
}

const KILL_GRACE: Duration = Duration::from_millis(500);

async fn collect(mut handle: JoinHandle<String>, grace: Option<Duration>) -> String {
    match grace {
        None => handle.await.unwrap_or_default(),
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(output) => output.unwrap_or_default(),
            Err(_) => {
                handle.abort();
                String::new()
            }
        },
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            warn!(error = %e, "Failed to read command output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// SIGKILL the child's whole process group, falling back to the child alone
#[cfg(unix)]
fn kill_process_group(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) {
        // SAFETY: killpg has no memory-safety preconditions; the group was
        // created for this child by process_group(0).
        if unsafe { libc::killpg(pid, libc::SIGKILL) } == 0 {
            return;
        }
        warn!(pid, error = %std::io::Error::last_os_error(), "Failed to kill process group");
    }
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill process");
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child, _pid: Option<u32>) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill process");
    }
}
