mod container;
mod grype;
mod syft;

pub use container::{ContainerEngine, Engine};
pub use grype::Grype;
pub use syft::Syft;

use crate::cancel::CancelToken;
use crate::command::ExitOutcome;
use crate::external::{Invocation, ProcessRunner, Runner};
use crate::io_adapters::{Input, Output};
use crate::options::ExecOptions;
use std::ffi::OsStr;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// State shared by every tool: default streams and the runner commands go to.
#[derive(Clone)]
pub struct ToolBase {
    stdout: Output,
    stderr: Output,
    runner: Arc<dyn Runner>,
}

impl ToolBase {
    pub fn new(stdout: Output, stderr: Output) -> Self {
        Self {
            stdout,
            stderr,
            runner: Arc::new(ProcessRunner::new()),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = runner;
        self
    }

    fn command<I, S>(&self, program: &str, args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let options = ExecOptions::new()
            .with_stdout(self.stdout.clone())
            .with_stderr(self.stderr.clone());
        ToolCommand {
            invocation: Invocation::new(program).args(args).with_options(options),
            runner: Arc::clone(&self.runner),
        }
    }
}

/// An external program known to the pipelines.
pub trait Tool {
    /// Name of the executable, looked up on PATH.
    fn program(&self) -> &'static str;

    fn base(&self) -> &ToolBase;

    /// Command for this tool with the given arguments and the tool's default streams.
    fn command<I, S>(&self, args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.base().command(self.program(), args)
    }

    /// `<program> version`
    fn version(&self) -> ToolCommand {
        self.command(["version"])
    }
}

/// A ready-to-run tool invocation together with the runner it will be handed to.
///
/// Run it as a mandatory step with [`ToolCommand::run`] or as a best-effort
/// one with [`ToolCommand::run_log_error_as_warning`].
pub struct ToolCommand {
    invocation: Invocation,
    runner: Arc<dyn Runner>,
}

impl ToolCommand {
    pub fn with_dry_run(self, enabled: bool) -> Self {
        self.configure(|o| o.with_dry_run(enabled))
    }

    pub fn with_stdin(self, stdin: Input) -> Self {
        self.configure(|o| o.with_stdin(stdin))
    }

    pub fn with_stdout(self, stdout: Output) -> Self {
        self.configure(|o| o.with_stdout(stdout))
    }

    pub fn with_stderr(self, stderr: Output) -> Self {
        self.configure(|o| o.with_stderr(stderr))
    }

    pub fn with_cancel(self, token: CancelToken) -> Self {
        self.configure(|o| o.with_cancel(token))
    }

    fn configure(mut self, f: impl FnOnce(ExecOptions) -> ExecOptions) -> Self {
        self.invocation = self.invocation.configure(f);
        self
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Run and return the raw exit outcome.
    pub fn execute(self) -> ExitOutcome {
        self.runner.run(self.invocation)
    }

    /// Run, turning any non-success outcome into an error naming the command.
    pub fn run(self) -> anyhow::Result<()> {
        let command = self.invocation.to_string();
        self.execute().into_result(command)
    }

    /// Run, logging a failure as a warning instead of returning it.
    pub fn run_log_error_as_warning(self) {
        if let Err(err) = self.run() {
            warn!(error = %format!("{err:#}"), "optional command failed");
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.invocation, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{EXIT_UNKNOWN, ExitCode};
    use crate::io_adapters::MemWriter;
    use crate::testing::RecordingRunner;

    fn grype_with(runner: &Arc<RecordingRunner>, out: &Output) -> Grype {
        Grype::new(out.clone(), Output::Null).with_runner(runner.clone())
    }

    #[test]
    fn default_streams_come_from_constructor() {
        let runner = Arc::new(RecordingRunner::new());
        let out = MemWriter::new().output();
        let cmd = grype_with(&runner, &out).version();
        assert_eq!(cmd.invocation().options().stdout(), Some(&out));
        assert_eq!(cmd.invocation().options().stderr(), Some(&Output::Null));
    }

    #[test]
    fn overrides_replace_defaults() {
        let runner = Arc::new(RecordingRunner::new());
        let out = MemWriter::new().output();
        let other = MemWriter::new().output();
        let cmd = grype_with(&runner, &out)
            .version()
            .with_stdout(other.clone())
            .with_stdin(Input::Null);
        assert_eq!(cmd.invocation().options().stdout(), Some(&other));
        assert_eq!(cmd.invocation().options().stdin(), Some(&Input::Null));
    }

    #[test]
    fn dry_run_threads_through_to_options() {
        let runner = Arc::new(RecordingRunner::new());
        let out = MemWriter::new().output();
        grype_with(&runner, &out).version().with_dry_run(true).run().unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].dry_run);
        assert_eq!(calls[0].command, "grype version");
    }

    #[test]
    fn run_reports_failure_with_command_line() {
        let runner = Arc::new(RecordingRunner::with_codes([2]));
        let out = MemWriter::new().output();
        let err = grype_with(&runner, &out).version().run().unwrap_err();
        assert_eq!(err.to_string(), "grype version: exit code 2");
    }

    #[test]
    fn log_as_warning_absorbs_every_code() {
        let codes: [ExitCode; 4] = [1, 230, 231, EXIT_UNKNOWN];
        let runner = Arc::new(RecordingRunner::with_codes(codes));
        let out = MemWriter::new().output();
        let grype = grype_with(&runner, &out);
        for _ in codes {
            grype.version().run_log_error_as_warning();
        }
        assert_eq!(runner.calls().len(), codes.len());
    }

    #[test]
    fn real_failure_is_absorbed_as_warning() {
        Grype::new(Output::Null, Output::Null)
            .with_runner(Arc::new(ProcessRunner::new()))
            .command(["--definitely-not-a-flag"])
            .with_stdin(Input::Null)
            .run_log_error_as_warning();
    }
}
