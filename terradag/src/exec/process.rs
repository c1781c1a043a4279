// src/exec/process.rs

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::exec::interrupt::Interruptor;

/// Configuration for a single subprocess run.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Path to the program to run.
    pub command: PathBuf,
    /// Arguments to provide to the process.
    pub args: Vec<String>,
    /// Working directory of the process.
    pub working_dir: PathBuf,
    /// Extra environment variables, on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Optional file receiving both stdout and stderr, preceded by a header
    /// line describing the invocation.
    pub combined_log_path: Option<PathBuf>,
    /// Exit codes treated as success. Empty means `{0}`.
    pub success_exit_codes: Vec<i32>,
}

impl ProcessConfig {
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: PathBuf::from("."),
            env: Vec::new(),
            combined_log_path: None,
            success_exit_codes: vec![0],
        }
    }
}

/// A subprocess that has either run or is going to be run.
///
/// `run` blocks until the child exits. It returns an error if and only if
/// the exit code is not one of the configured success codes, or the child
/// died to a signal, or the process-wide interruptor fired before spawn.
/// Output written to stderr alone is never an error.
///
/// While waiting, the runner watches the interruptor: on interruption the
/// received signal is forwarded to the child exactly once and the runner
/// keeps waiting — children trap signals and are expected to clean up and
/// exit on their own. Escalation is not this type's job.
pub struct ProcessRunner {
    config: ProcessConfig,
    interrupt: Interruptor,

    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
    exit_code: Option<i32>,
    runtime: Duration,
}

impl ProcessRunner {
    pub fn new(config: ProcessConfig, interrupt: Interruptor) -> Self {
        Self {
            config,
            interrupt,
            stdout: Arc::new(Mutex::new(Vec::new())),
            stderr: Arc::new(Mutex::new(Vec::new())),
            exit_code: None,
            runtime: Duration::ZERO,
        }
    }

    /// Run the process to completion.
    pub async fn run(&mut self) -> Result<()> {
        if self.interrupt.is_interrupted() {
            return Err(anyhow!(
                "not spawning {:?}: operation was cancelled by signal",
                self.config.command
            ));
        }

        debug!(command = ?self.config.command, args = ?self.config.args, "running command");

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .current_dir(&self.config.working_dir)
            .envs(self.config.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let log = self.open_combined_log()?;

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process {:?}", self.config.command))?;

        let out_task = spawn_reader(child.stdout.take(), Arc::clone(&self.stdout), log.clone());
        let err_task = spawn_reader(child.stderr.take(), Arc::clone(&self.stderr), log);

        let status = self.wait_with_signals(&mut child).await;
        self.runtime = started.elapsed();

        if let Some(task) = out_task {
            let _ = task.await;
        }
        if let Some(task) = err_task {
            let _ = task.await;
        }

        let status = status.with_context(|| {
            format!("waiting for process {:?} to exit", self.config.command)
        })?;
        self.exit_code = status.code();

        debug!(
            command = ?self.config.command,
            exit_code = ?self.exit_code,
            runtime_ms = self.runtime.as_millis() as u64,
            "process exited"
        );

        if self.success() {
            Ok(())
        } else {
            // The child's stderr leads the message so the cause is visible
            // wherever the error ends up. It must appear exactly once.
            let reason = match self.exit_code {
                Some(code) => format!("command exited with code {code}"),
                None => "command was terminated by a signal".to_string(),
            };
            Err(anyhow!("{}{}", self.stderr(), reason))
        }
    }

    /// Wait for the child, forwarding the received signal once if the
    /// process-wide interruptor fires while we wait.
    async fn wait_with_signals(&self, child: &mut Child) -> std::io::Result<std::process::ExitStatus> {
        let mut forwarded = false;

        loop {
            tokio::select! {
                status = child.wait() => return status,
                _ = self.interrupt.cancelled(), if !forwarded => {
                    forwarded = true;
                    forward_signal(child, &self.interrupt);
                }
            }
        }
    }

    fn open_combined_log(&self) -> Result<Option<Arc<Mutex<std::fs::File>>>> {
        let Some(path) = self.config.combined_log_path.as_ref() else {
            return Ok(None);
        };

        let mut file = std::fs::File::create(path)
            .with_context(|| format!("creating combined log file {:?}", path))?;
        writeln!(
            file,
            "+ {} {}",
            self.config.command.display(),
            self.config.args.join(" ")
        )
        .with_context(|| format!("writing header to {:?}", path))?;

        Ok(Some(Arc::new(Mutex::new(file))))
    }

    /// The process's stdout so far (complete after `run` returns).
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout.lock()).into_owned()
    }

    /// The process's stderr so far (complete after `run` returns).
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr.lock()).into_owned()
    }

    /// Exit code of the process; -1 when it has not exited cleanly (not yet
    /// run, or terminated by a signal).
    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    /// How long the process ran for.
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    /// Whether the process exited with one of the configured success codes.
    pub fn success(&self) -> bool {
        match self.exit_code {
            Some(code) if self.config.success_exit_codes.is_empty() => code == 0,
            Some(code) => self.config.success_exit_codes.contains(&code),
            None => false,
        }
    }
}

#[cfg(unix)]
fn forward_signal(child: &Child, interrupt: &Interruptor) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let signal = interrupt.signal();
    debug!(pid, signal = signal.name(), "forwarding signal to child");
    if let Err(err) = kill(Pid::from_raw(pid as i32), signal.as_nix()) {
        warn!(pid, error = %err, "failed to forward signal to child");
    }
}

#[cfg(not(unix))]
fn forward_signal(child: &Child, _interrupt: &Interruptor) {
    if let Some(pid) = child.id() {
        warn!(pid, "signal forwarding is not supported on this platform");
    }
}

/// Tee a child stream into an in-memory buffer and, when configured, the
/// shared combined log file.
fn spawn_reader<R>(
    source: Option<R>,
    buffer: Arc<Mutex<Vec<u8>>>,
    log: Option<Arc<Mutex<std::fs::File>>>,
) -> Option<JoinHandle<()>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut source = source?;

    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match source.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    buffer.lock().extend_from_slice(&chunk[..n]);
                    if let Some(log) = log.as_ref() {
                        let _ = log.lock().write_all(&chunk[..n]);
                    }
                }
            }
        }
    }))
}
