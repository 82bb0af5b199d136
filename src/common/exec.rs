use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;
use wait_timeout::ChildExt;

use super::errors::{ErrorCode, Result, SweepError};

/// Per-command time budgets.
pub mod timeouts {
    use std::time::Duration;

    pub const PROBE: Duration = Duration::from_secs(5);
    pub const GO_ENV: Duration = Duration::from_secs(10);
    pub const GO_CLEAN: Duration = Duration::from_secs(60);
    pub const LINT_CLEAN: Duration = Duration::from_secs(30);
    pub const DOCKER: Duration = Duration::from_secs(120);
    pub const CARGO: Duration = Duration::from_secs(300);
    pub const TRASH: Duration = Duration::from_secs(30);
    pub const DEFAULT: Duration = Duration::from_secs(300);
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cancellation handle with an optional deadline.
///
/// Clones and derived contexts share the cancel flag, so cancelling any of
/// them stops every operation that was handed one.
#[derive(Debug, Clone)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Derive a context whose deadline is the earlier of ours and `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` or `Timeout` if the context is done.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SweepError::cancelled("operation"));
        }
        if self.is_expired() {
            return Err(SweepError::new(ErrorCode::Timeout, "operation deadline exceeded"));
        }
        Ok(())
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// stdout followed by stderr, for error messages.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// Seam between cleaners and the processes they spawn.
pub trait CommandRunner: Send + Sync {
    /// Run `program args..` to completion within `timeout` and the context.
    fn run(
        &self,
        ctx: &Context,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput>;

    /// Locate `program` on `$PATH`.
    fn lookup(&self, program: &str) -> Option<PathBuf>;

    fn is_installed(&self, program: &str) -> bool {
        self.lookup(program).is_some()
    }
}

/// Runs real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        ctx: &Context,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        run_command(ctx, program, args, timeout)
    }

    fn lookup(&self, program: &str) -> Option<PathBuf> {
        which(program)
    }
}

pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

pub fn command_label(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Spawn a process, wait for it under a time budget, and capture its output.
///
/// On cancellation or timeout the child is killed and reaped before returning.
pub fn run_command(
    ctx: &Context,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput> {
    ctx.check()?;
    let label = command_label(program, args);
    let ctx = ctx.with_timeout(timeout);
    debug!(command = %label, ?timeout, "spawning");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SweepError::tool_unavailable(program).with_cause(e)
            } else {
                SweepError::new(ErrorCode::ProcessFailed, format!("failed to start `{}`", label))
                    .with_cause(e)
            }
        })?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = loop {
        match child.wait_timeout(POLL_INTERVAL) {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if ctx.is_cancelled() {
                    terminate(&mut child);
                    return Err(SweepError::cancelled(&format!("`{}`", label))
                        .with_details("command", label.as_str()));
                }
                if ctx.is_expired() {
                    terminate(&mut child);
                    return Err(SweepError::timeout(&label, timeout));
                }
            }
            Err(e) => {
                terminate(&mut child);
                return Err(SweepError::new(
                    ErrorCode::ProcessFailed,
                    format!("failed waiting for `{}`", label),
                )
                .with_cause(e));
            }
        }
    };

    let output = CommandOutput {
        code: status.code(),
        stdout: collect(stdout),
        stderr: collect(stderr),
    };

    if status.success() {
        debug!(command = %label, "finished");
        Ok(output)
    } else {
        let shown = status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        Err(SweepError::new(
            ErrorCode::ProcessFailed,
            format!("`{}` exited with status {}: {}", label, shown, output.combined()),
        )
        .with_details("command", label.as_str())
        .with_details("output", output.combined()))
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

// ─── Recording runner ─────────────────────────────────────────────────────────

/// A `CommandRunner` that never spawns anything.
///
/// It answers from canned responses and records every invocation, which makes
/// dry-run guarantees checkable without touching the host.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    installed: HashSet<String>,
    responses: Vec<(String, std::result::Result<CommandOutput, String>)>,
    effects: Vec<(String, PathBuf)>,
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark programs as present on `$PATH`.
    pub fn with_installed(mut self, programs: &[&str]) -> Self {
        self.installed.extend(programs.iter().map(|p| p.to_string()));
        self
    }

    /// Reply with `stdout` to any command line starting with `prefix`.
    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses
            .push((prefix.to_string(), Ok(CommandOutput::success(stdout))));
        self
    }

    /// Fail any command line starting with `prefix`.
    pub fn fail(mut self, prefix: &str, message: &str) -> Self {
        self.responses
            .push((prefix.to_string(), Err(message.to_string())));
        self
    }

    /// Delete `path` whenever a command line starting with `prefix` runs,
    /// the way the real tool would empty its cache.
    pub fn removes(mut self, prefix: &str, path: impl Into<PathBuf>) -> Self {
        self.effects.push((prefix.to_string(), path.into()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any recorded command line starts with `prefix`.
    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

impl CommandRunner for RecordingRunner {
    fn run(
        &self,
        ctx: &Context,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<CommandOutput> {
        ctx.check()?;
        let line = command_label(program, args);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());

        if !self.installed.contains(program) {
            return Err(SweepError::tool_unavailable(program));
        }
        for (_, path) in self
            .effects
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            let _ = std::fs::remove_dir_all(path);
        }
        match self
            .responses
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            Some((_, Ok(out))) => Ok(out.clone()),
            Some((_, Err(msg))) => Err(SweepError::new(
                ErrorCode::ProcessFailed,
                format!("`{}` failed: {}", line, msg),
            )),
            None => Ok(CommandOutput::success("")),
        }
    }

    fn lookup(&self, program: &str) -> Option<PathBuf> {
        self.installed
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}
