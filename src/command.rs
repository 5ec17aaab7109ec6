use std::fmt;
use thiserror::Error;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success. The values 230, 231 and 232 are reserved
/// sentinels (see the constants below); any other value is the child process's
/// own exit code passed through verbatim.
pub type ExitCode = i32;

/// The command ran to completion and exited cleanly, or it was a dry run.
pub const EXIT_OK: ExitCode = 0;

/// Cancellation fired but the child process could not be killed.
pub const EXIT_KILL_FAILURE: ExitCode = 230;

/// Cancellation fired and the child process was killed.
pub const EXIT_CONTEXT_CANCEL: ExitCode = 231;

/// The process could not be started, or its termination could not be classified.
pub const EXIT_UNKNOWN: ExitCode = 232;

/// Human readable meaning of an exit code, used in error messages.
pub fn describe_exit_code(code: ExitCode) -> String {
    match code {
        EXIT_OK => "success".to_string(),
        EXIT_KILL_FAILURE => format!("failed to kill cancelled process (exit code {code})"),
        EXIT_CONTEXT_CANCEL => format!("cancelled (exit code {code})"),
        EXIT_UNKNOWN => format!("unknown failure (exit code {code})"),
        other => format!("exit code {other}"),
    }
}

/// Error produced when a non-successful [`ExitOutcome`] is turned into a `Result`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{command}: {}", describe_exit_code(*.code))]
    Failed { command: String, code: ExitCode },
}

/// Result of running one invocation: an exit code from the fixed taxonomy plus,
/// optionally, the error that was captured along the way (spawn error, wait
/// error, stream relay error).
#[derive(Debug)]
pub struct ExitOutcome {
    code: ExitCode,
    error: Option<anyhow::Error>,
}

impl ExitOutcome {
    pub fn new(code: ExitCode) -> Self {
        Self { code, error: None }
    }

    pub fn success() -> Self {
        Self::new(EXIT_OK)
    }

    /// Attach a captured error. The exit code is left untouched.
    pub fn with_error(mut self, error: impl Into<anyhow::Error>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn code(&self) -> ExitCode {
        self.code
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.code == EXIT_OK && self.error.is_none()
    }

    /// Convert into a `Result`, naming `command` in the error.
    ///
    /// A non-zero code becomes [`CommandError::Failed`], with the captured error
    /// (if any) kept as its cause. A zero code with a captured error (a relay
    /// failure) returns that error with the command line as context.
    pub fn into_result(self, command: impl fmt::Display) -> anyhow::Result<()> {
        let command = command.to_string();
        match (self.code, self.error) {
            (EXIT_OK, None) => Ok(()),
            (EXIT_OK, Some(err)) => Err(err.context(command)),
            (code, None) => Err(CommandError::Failed { command, code }.into()),
            (code, Some(err)) => Err(err.context(CommandError::Failed { command, code })),
        }
    }
}

impl Default for ExitOutcome {
    fn default() -> Self {
        Self::success()
    }
}
