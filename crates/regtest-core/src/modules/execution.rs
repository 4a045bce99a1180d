//! Launching a case's run script and collecting what it printed.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1200);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long the output readers may take once the process is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ExecutionRequest {
    /// Command line as shown in the report, e.g. `['./Gauss.local', '--info', '0']`.
    pub fn display_command(&self) -> String {
        let parts: Vec<String> = std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .map(|part| format!("'{}'", part))
            .collect();
        format!("[{}]", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, the layout of `<case>-RT.o`.
    pub fn combined(&self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        combined.extend_from_slice(&self.stdout);
        combined.extend_from_slice(&self.stderr);
        combined
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{command} timed out!!!")]
    Timeout {
        command: String,
        timeout: Duration,
        output: ExecutionOutput,
    },
    #[error("cannot start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("cannot wait for {command}: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
}

impl ExecutionError {
    /// Whatever the process printed before it was stopped.
    pub fn partial_output(&self) -> Option<&ExecutionOutput> {
        match self {
            Self::Timeout { output, .. } => Some(output),
            Self::Spawn { .. } | Self::Wait { .. } => None,
        }
    }
}

/// Runs one case script. The suite only ever runs one at a time.
pub trait ExecutionBackend {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, ExecutionError>;
}

#[derive(Debug, Clone, Copy)]
pub struct LocalProcessBackend {
    poll_interval: Duration,
}

impl Default for LocalProcessBackend {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl LocalProcessBackend {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl ExecutionBackend for LocalProcessBackend {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, ExecutionError> {
        let command = request.display_command();
        debug!(%command, dir = %request.working_dir.display(), "spawning case process");

        let mut process = Command::new(&request.program);
        process
            .args(&request.args)
            .current_dir(&request.working_dir)
            .envs(request.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // The script and everything it launches share one process group.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut process, 0);
        let mut child = process.spawn().map_err(|source| ExecutionError::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let waited = wait_with_timeout(&mut child, request.timeout, self.poll_interval);
        let label = command.clone();
        let output = |status: Option<ExitStatus>| {
            let deadline = Instant::now() + DRAIN_GRACE;
            ExecutionOutput {
                stdout: collect_drain(stdout, deadline, &label),
                stderr: collect_drain(stderr, deadline, &label),
                exit_code: status.and_then(|status| status.code()),
            }
        };

        match waited {
            Ok(WaitOutcome::Exited(status)) => Ok(output(Some(status))),
            Ok(WaitOutcome::TimedOut) => Err(ExecutionError::Timeout {
                command,
                timeout: request.timeout,
                output: output(None),
            }),
            Err(source) => Err(ExecutionError::Wait { command, source }),
        }
    }
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    poll_interval: Duration,
) -> std::io::Result<WaitOutcome> {
    let started_at = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(WaitOutcome::Exited(status));
        }
        if started_at.elapsed() >= timeout {
            kill_process_tree(child);
            child.wait()?;
            return Ok(WaitOutcome::TimedOut);
        }
        thread::sleep(poll_interval);
    }
}

/// Kills the process group led by `child`, reaching grandchildren such as an
/// `mpirun` launched from the run script.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    match libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; the group id is the child's pid
        // because it was spawned with `process_group(0)`.
        Ok(group) if unsafe { libc::killpg(group, libc::SIGKILL) } == 0 => {}
        _ => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

fn drain<R>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            let _ = sender.send(buffer);
        });
        receiver
    })
}

/// Output of one reader thread, or nothing if the pipe is still held open
/// past `deadline` by a process outside the group.
fn collect_drain(receiver: Option<Receiver<Vec<u8>>>, deadline: Instant, command: &str) -> Vec<u8> {
    let Some(receiver) = receiver else {
        return Vec::new();
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match receiver.recv_timeout(remaining) {
        Ok(buffer) => buffer,
        Err(_) => {
            warn!(%command, "output pipe still open after the process ended");
            Vec::new()
        }
    }
}
