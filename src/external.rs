use crate::command::{
    EXIT_CONTEXT_CANCEL, EXIT_KILL_FAILURE, EXIT_OK, EXIT_UNKNOWN, ExitCode, ExitOutcome,
};
use crate::io_adapters::{Input, Output};
use crate::options::ExecOptions;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a killed child gets to be reaped before the runner stops waiting.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// One fully configured external program call.
///
/// An invocation is consumed by [`Runner::run`]; build a new one per call.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    options: ExecOptions,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            options: ExecOptions::default(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Adjust the options in place, e.g. `inv.configure(|o| o.with_dry_run(true))`.
    pub fn configure(mut self, f: impl FnOnce(ExecOptions) -> ExecOptions) -> Self {
        self.options = f(self.options);
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Run with the default [`ProcessRunner`].
    pub fn run(self) -> ExitOutcome {
        ProcessRunner::new().run(self)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Executes invocations and maps every ending to the fixed exit-code taxonomy.
pub trait Runner: Send + Sync {
    fn run(&self, invocation: Invocation) -> ExitOutcome;
}

/// Function used to force-kill a child by pid.
pub(crate) type KillFn = fn(u32) -> io::Result<()>;

/// Runner that spawns real child processes.
///
/// Log events are emitted in whatever span the caller has entered, so a
/// pipeline's span names the stage each command belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    kill_grace: Duration,
    kill: KillFn,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            kill_grace: KILL_GRACE,
            kill: kill_process,
        }
    }

    /// How long a killed child, and anything still holding its output pipes,
    /// gets before the runner stops waiting.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_kill(mut self, kill: KillFn) -> Self {
        self.kill = kill;
        self
    }

    /// Kill the child after cancellation and wait a bounded time for it to be reaped.
    fn terminate(
        &self,
        pid: u32,
        done_rx: &Receiver<Exited>,
        waiter: JoinHandle<()>,
    ) -> Ending {
        if let Ok(exited) = done_rx.try_recv() {
            let _ = waiter.join();
            return settle(Ok(exited));
        }
        if let Err(err) = (self.kill)(pid) {
            return Ending::KillFailed(ExitOutcome::new(EXIT_KILL_FAILURE).with_error(err));
        }
        match done_rx.recv_timeout(self.kill_grace) {
            Ok(_) => {
                let _ = waiter.join();
            }
            Err(_) => warn!(pid, "killed process was not reaped within grace period"),
        }
        Ending::Cancelled(ExitOutcome::new(EXIT_CONTEXT_CANCEL))
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for ProcessRunner {
    fn run(&self, invocation: Invocation) -> ExitOutcome {
        let command_line = invocation.to_string();
        let Invocation {
            program,
            args,
            options,
        } = invocation;

        info!(dry_run = options.dry_run(), command = %command_line, "shell exec");
        if options.dry_run() {
            return ExitOutcome::success();
        }

        let mut child = match std::process::Command::new(&program)
            .args(&args)
            .stdin(Input::stdio(options.stdin()))
            .stdout(Output::stdio(options.stdout()))
            .stderr(Output::stdio(options.stderr()))
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %command_line, error = %err, "failed to start command");
                return ExitOutcome::new(EXIT_UNKNOWN).with_error(err);
            }
        };

        let relays = Relays::attach(&mut child, &options);
        let cancel = options.cancel_token().cloned().unwrap_or_default();
        let pid = child.id();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let watched = cancel.clone();
        let waiter = match thread::Builder::new()
            .name(format!("wait-{pid}"))
            .spawn(move || {
                let mut child = child;
                let status = child.wait();
                let cancelled = watched.is_cancelled();
                let _ = done_tx.send(Exited { status, cancelled });
            }) {
            Ok(handle) => handle,
            Err(err) => {
                // The child went down with the closure; do not leave it running.
                warn!(command = %command_line, error = %err, "failed to start wait thread");
                let _ = (self.kill)(pid);
                return ExitOutcome::new(EXIT_UNKNOWN).with_error(err);
            }
        };

        let fired = cancel.fired().clone();
        let deadline = cancel.deadline_reached();
        let ending = crossbeam_channel::select! {
            recv(done_rx) -> exited => {
                let _ = waiter.join();
                settle(exited)
            }
            recv(fired) -> _ => self.terminate(pid, &done_rx, waiter),
            recv(deadline) -> _ => self.terminate(pid, &done_rx, waiter),
        };

        let (outcome, relayed) = match ending {
            Ending::KillFailed(outcome) => {
                // The child may still hold its pipes open; do not block on the relays.
                warn!(command = %command_line, "cancelled command could not be killed");
                return outcome;
            }
            Ending::Cancelled(outcome) => {
                debug!(command = %command_line, "command cancelled");
                let relayed = relays.join(Some(Instant::now() + self.kill_grace));
                (outcome, relayed)
            }
            Ending::Exited(outcome) => {
                debug!(command = %command_line, exit_code = outcome.code(), "command finished");
                (outcome, relays.join(None))
            }
        };
        match relayed {
            Ok(()) => outcome,
            Err(err) => outcome.with_error(err),
        }
    }
}

/// Reported by the wait thread: the child's status, and whether cancellation
/// had already fired at the moment `wait` returned.
#[derive(Debug)]
struct Exited {
    status: io::Result<ExitStatus>,
    cancelled: bool,
}

#[derive(Debug)]
enum Ending {
    Exited(ExitOutcome),
    Cancelled(ExitOutcome),
    KillFailed(ExitOutcome),
}

/// A child that exited before cancellation keeps its own code, however soon
/// after the token fires.
fn settle(exited: Result<Exited, RecvError>) -> Ending {
    match exited {
        Ok(Exited {
            cancelled: true, ..
        }) => Ending::Cancelled(ExitOutcome::new(EXIT_CONTEXT_CANCEL)),
        Ok(Exited { status, .. }) => Ending::Exited(classify(status)),
        Err(_) => Ending::Exited(
            ExitOutcome::new(EXIT_UNKNOWN)
                .with_error(io::Error::other("wait thread ended without a status")),
        ),
    }
}

/// Forcibly terminate a process. A process that is already gone counts as killed.
#[cfg(unix)]
fn kill_process(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|_| io::Error::other(format!("invalid pid {pid}")))?;
    match kill(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn kill_process(pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot kill process {pid} on this platform"),
    ))
}

fn classify(status: io::Result<ExitStatus>) -> ExitOutcome {
    match status {
        Ok(status) if status.success() => ExitOutcome::new(EXIT_OK),
        Ok(status) => match status.code() {
            Some(code) => ExitOutcome::new(code),
            None => ExitOutcome::new(terminated_by_signal(status)),
        },
        Err(err) => ExitOutcome::new(EXIT_UNKNOWN).with_error(err),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    match exit_status.signal() {
        Some(signal) => 128 + signal,
        None => EXIT_UNKNOWN,
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> ExitCode {
    EXIT_UNKNOWN
}

type RelayResult = (&'static str, io::Result<()>);

/// Threads copying between the child's pipes and the configured streams.
/// Output relays report through `results`, so collecting them can be bounded.
struct Relays {
    stdin: Option<JoinHandle<io::Result<()>>>,
    results: Receiver<RelayResult>,
    pending: usize,
}

impl Relays {
    fn attach(child: &mut Child, options: &ExecOptions) -> Self {
        let stdin = match (child.stdin.take(), options.stdin()) {
            (Some(pipe), Some(input)) => {
                let input = input.clone();
                Some(thread::spawn(move || input.relay_into(pipe)))
            }
            _ => None,
        };

        let (tx, results) = crossbeam_channel::unbounded();
        let mut pending = 0;
        if let (Some(pipe), Some(out)) = (child.stdout.take(), options.stdout()) {
            let (out, tx) = (out.clone(), tx.clone());
            thread::spawn(move || tx.send(("stdout", out.relay_from(pipe))));
            pending += 1;
        }
        if let (Some(pipe), Some(out)) = (child.stderr.take(), options.stderr()) {
            let (out, tx) = (out.clone(), tx.clone());
            thread::spawn(move || tx.send(("stderr", out.relay_from(pipe))));
            pending += 1;
        }
        Self {
            stdin,
            results,
            pending,
        }
    }

    /// Wait for output relays to drain, until `deadline` if one is given.
    /// Relays still open then (a grandchild holding the pipe) are detached.
    ///
    /// The stdin relay is only collected if it already finished: its reader may
    /// block forever once the child is gone.
    fn join(self, deadline: Option<Instant>) -> anyhow::Result<()> {
        let mut first: Option<anyhow::Error> = None;
        match self.stdin {
            Some(handle) if handle.is_finished() => {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("relay thread panicked")));
                keep_first(&mut first, "stdin", result);
            }
            Some(_) => debug!("stdin relay still blocked on its reader, detaching it"),
            None => {}
        }

        let mut remaining = self.pending;
        while remaining > 0 {
            let received = match deadline {
                Some(deadline) => self.results.recv_deadline(deadline),
                None => self
                    .results
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((stream, result)) => keep_first(&mut first, stream, result),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(remaining, "output still open after kill, detaching relays");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let panicked = Err(io::Error::other("relay thread panicked"));
                    keep_first(&mut first, "output", panicked);
                    break;
                }
            }
            remaining -= 1;
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn keep_first(first: &mut Option<anyhow::Error>, stream: &str, result: io::Result<()>) {
    if let Err(err) = result {
        if first.is_none() {
            *first = Some(anyhow::Error::new(err).context(format!("relaying {stream}")));
        }
    }
}
