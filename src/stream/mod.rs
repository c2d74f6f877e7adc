// Supervision of the outbound encode-and-publish process.
//
// `ProcessSupervisor` owns at most one child process at a time. Liveness is
// evaluated lazily: the orchestrator polls `Publisher::is_streaming` once
// per tick, and that poll is also when the dead man's switch gets a chance to
// fire. `ProcessSupervisor::query_liveness` answers the same question
// without touching any state.

pub mod command;
pub mod watchdog;

use crate::error::StreamError;
use crate::models::ContentItem;
use async_trait::async_trait;
use command::CommandTemplate;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use watchdog::{DEFAULT_GRACE_PERIOD, DeadMansSwitch};

// An encoder that dies inside this window failed to launch
const DEFAULT_LAUNCH_WINDOW: Duration = Duration::from_secs(2);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_TAIL_LINES: usize = 40;

// What the orchestrator needs from the publish side.
#[async_trait]
pub trait Publisher: Send {
    async fn start(&mut self, content: &ContentItem) -> Result<(), StreamError>;
    fn set_expected_duration(&mut self, duration: Duration);
    async fn is_streaming(&mut self) -> bool;
    async fn stop(&mut self);
    // Why the last stream went away, once `is_streaming` has reported it gone
    fn last_termination(&self) -> Option<Termination>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    // Nothing is being supervised.
    Idle,
    Running,
    // The process ended on its own (`None` if its status could not be read).
    Exited { status: Option<ExitStatus> },
    // Runtime overran `expected + grace`; the process may still be alive.
    Frozen { runtime: Duration },
}

// How the last supervised process went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Finished,
    Crashed(Option<ExitStatus>),
    WatchdogKilled,
    Stopped,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Finished => write!(f, "finished"),
            Termination::Crashed(Some(status)) => write!(f, "crashed ({})", status),
            Termination::Crashed(None) => write!(f, "crashed (status unknown)"),
            Termination::WatchdogKilled => write!(f, "killed by dead man's switch"),
            Termination::Stopped => write!(f, "stopped"),
        }
    }
}

type StderrTail = Arc<Mutex<VecDeque<String>>>;

struct RunningStream {
    child: Child,
    content: ContentItem,
    switch: DeadMansSwitch,
    drain: Option<JoinHandle<()>>,
}

impl RunningStream {
    fn release(mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

pub struct ProcessSupervisor {
    template: CommandTemplate,
    launch_window: Duration,
    stop_timeout: Duration,
    grace_period: Duration,
    current: Option<RunningStream>,
    stderr_tail: StderrTail,
    last_termination: Option<Termination>,
}

impl ProcessSupervisor {
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            template,
            launch_window: DEFAULT_LAUNCH_WINDOW,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            current: None,
            stderr_tail: Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES))),
            last_termination: None,
        }
    }

    #[cfg(test)]
    pub fn with_launch_window(mut self, window: Duration) -> Self {
        self.launch_window = window;
        self
    }

    #[cfg(test)]
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    #[cfg(test)]
    pub fn current_content(&self) -> Option<&ContentItem> {
        self.current.as_ref().map(|running| &running.content)
    }

    #[cfg(test)]
    pub fn runtime(&self) -> Duration {
        self.current
            .as_ref()
            .map(|running| running.switch.runtime(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect())
            .unwrap_or_default()
    }

    // Reports the state of the supervised process without clearing anything.
    pub fn query_liveness(&mut self) -> Liveness {
        let Some(running) = self.current.as_mut() else {
            return Liveness::Idle;
        };

        let now = Instant::now();
        if running.switch.is_tripped(now) {
            return Liveness::Frozen {
                runtime: running.switch.runtime(now),
            };
        }

        match running.child.try_wait() {
            Ok(None) => Liveness::Running,
            Ok(Some(status)) => Liveness::Exited { status: Some(status) },
            Err(e) => {
                warn!("Could not poll encoder process: {}", e);
                Liveness::Exited { status: None }
            }
        }
    }

    // Kills the process if the dead man's switch has tripped. Returns whether it did.
    pub async fn reap_if_frozen(&mut self) -> bool {
        let Liveness::Frozen { runtime } = self.query_liveness() else {
            return false;
        };
        let Some(mut running) = self.current.take() else {
            return false;
        };

        error!(
            "Dead man's switch triggered for {}: runtime {:.0}s exceeds max allowed {:.0}s, force killing",
            running.content,
            runtime.as_secs_f64(),
            running.switch.max_allowed().unwrap_or_default().as_secs_f64()
        );
        if let Err(e) = running.child.kill().await {
            warn!("Failed to kill frozen encoder: {}", e);
        }
        running.release();
        self.last_termination = Some(Termination::WatchdogKilled);
        true
    }

    fn clear_exited(&mut self, status: Option<ExitStatus>) {
        let Some(running) = self.current.take() else {
            return;
        };
        let termination = match status {
            Some(status) if status.success() => Termination::Finished,
            other => Termination::Crashed(other),
        };
        match termination {
            Termination::Finished => info!("Stream ended: {}", running.content),
            _ => {
                warn!(
                    "Encoder for {} exited unexpectedly ({:?}) after {:.0}s",
                    running.content,
                    status,
                    running.switch.runtime(Instant::now()).as_secs_f64()
                );
                let tail = self.stderr_tail();
                if !tail.is_empty() {
                    warn!("Last encoder output:\n{}", tail.join("\n"));
                }
            }
        }
        running.release();
        self.last_termination = Some(termination);
    }

    fn take_stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|mut tail| tail.drain(..).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for ProcessSupervisor {
    async fn start(&mut self, content: &ContentItem) -> Result<(), StreamError> {
        if self.current.is_some() {
            warn!("Stream already running, stopping first");
            self.stop().await;
        }

        info!("Starting stream: {}", content);
        debug!("Encoder command: {}", self.template.redacted(content.path()));

        let mut cmd = self.template.to_command(content.path());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| StreamError::Spawn {
            program: self.template.program.clone(),
            source,
        })?;
        let started_at = Instant::now();

        if let Ok(mut tail) = self.stderr_tail.lock() {
            tail.clear();
        }
        let mut drain = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, Arc::clone(&self.stderr_tail))));

        // Give the encoder a moment; exiting this early means a bad config or input
        match timeout(self.launch_window, child.wait()).await {
            Ok(Ok(status)) => {
                if let Some(handle) = drain.take() {
                    let _ = timeout(Duration::from_millis(500), handle).await;
                }
                let stderr = self.take_stderr_tail();
                error!("Encoder exited immediately ({}): {}", status, stderr);
                return Err(StreamError::ExitedEarly { status, stderr });
            }
            Ok(Err(source)) => {
                let _ = child.kill().await;
                if let Some(handle) = drain.take() {
                    handle.abort();
                }
                return Err(StreamError::Spawn {
                    program: self.template.program.clone(),
                    source,
                });
            }
            Err(_) => {}
        }

        self.current = Some(RunningStream {
            child,
            content: content.clone(),
            switch: DeadMansSwitch::new(started_at, self.grace_period),
            drain,
        });
        self.last_termination = None;
        Ok(())
    }

    fn set_expected_duration(&mut self, duration: Duration) {
        match self.current.as_mut() {
            Some(running) => {
                running.switch.arm(duration);
                debug!("Expected duration set to {:.0}s", duration.as_secs_f64());
            }
            None => debug!("No stream running, expected duration ignored"),
        }
    }

    async fn is_streaming(&mut self) -> bool {
        match self.query_liveness() {
            Liveness::Running => true,
            Liveness::Idle => false,
            Liveness::Frozen { .. } => {
                self.reap_if_frozen().await;
                false
            }
            Liveness::Exited { status } => {
                self.clear_exited(status);
                false
            }
        }
    }

    async fn stop(&mut self) {
        let Some(mut running) = self.current.take() else {
            return;
        };

        info!("Stopping stream: {}", running.content);
        terminate(&mut running.child);
        match timeout(self.stop_timeout, running.child.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Error waiting for encoder to exit: {}", e),
            Err(_) => {
                warn!("Encoder didn't terminate, killing");
                if let Err(e) = running.child.kill().await {
                    warn!("Failed to kill encoder: {}", e);
                }
            }
        }
        running.release();
        self.last_termination = Some(Termination::Stopped);
    }

    fn last_termination(&self) -> Option<Termination> {
        self.last_termination
    }
}

// SIGTERM so the encoder can flush and close its outputs
#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("SIGTERM to encoder pid {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to terminate encoder: {}", e);
    }
}

// Keeps the pipe empty so a chatty encoder never blocks on stderr
async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                debug!("[encoder] {}", line);
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        }
    }
}
