use crate::command::{EXIT_OK, ExitCode, ExitOutcome};
use crate::external::{Invocation, Runner};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub command: String,
    pub dry_run: bool,
}

/// [`Runner`] test double. Records every invocation. Codes are handed out in call order, either from a
/// queue or by matching a substring of the command line; unmatched calls
/// succeed. Invocations with a stdout writer get `stdout` written to them.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<Call>>,
    queued: Mutex<VecDeque<ExitCode>>,
    by_command: Vec<(String, ExitCode)>,
    stdout: Option<Vec<u8>>,
    delay: Option<Duration>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codes(codes: impl IntoIterator<Item = ExitCode>) -> Self {
        Self {
            queued: Mutex::new(codes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Fail every command whose command line contains `needle`.
    pub fn failing(mut self, needle: &str, code: ExitCode) -> Self {
        self.by_command.push((needle.to_string(), code));
        self
    }

    pub fn printing(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, invocation: Invocation) -> ExitOutcome {
        let command = invocation.to_string();
        self.calls.lock().unwrap().push(Call {
            command: command.clone(),
            dry_run: invocation.options().dry_run(),
        });
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let (Some(bytes), Some(out)) = (&self.stdout, invocation.options().stdout()) {
            out.write_chunk(bytes).unwrap();
        }
        let code = self
            .by_command
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, code)| *code)
            .or_else(|| self.queued.lock().unwrap().pop_front())
            .unwrap_or(EXIT_OK);
        ExitOutcome::new(code)
    }
}
