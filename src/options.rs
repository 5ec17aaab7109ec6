use crate::cancel::CancelToken;
use crate::io_adapters::{Input, Output};

/// How a single invocation is run.
///
/// Each `with_*` setter touches exactly one concern and the last call wins.
/// Nothing is validated here: a dry run with a cancellation token is accepted,
/// the token is simply never consulted. Clone a configured value to give
/// several sibling invocations the same defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    dry_run: bool,
    stdin: Option<Input>,
    stdout: Option<Output>,
    stderr: Option<Output>,
    cancel: Option<CancelToken>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the command that would run and report success without spawning it.
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Set stdin, stdout and stderr together.
    pub fn with_io(self, stdin: Input, stdout: Output, stderr: Output) -> Self {
        self.with_stdin(stdin).with_stdout(stdout).with_stderr(stderr)
    }

    pub fn with_stdin(mut self, stdin: Input) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn with_stdout(mut self, stdout: Output) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn with_stderr(mut self, stderr: Output) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// Kill the child if `token` fires before it exits.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn stdin(&self) -> Option<&Input> {
        self.stdin.as_ref()
    }

    pub fn stdout(&self) -> Option<&Output> {
        self.stdout.as_ref()
    }

    pub fn stderr(&self) -> Option<&Output> {
        self.stderr.as_ref()
    }

    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSource;
    use crate::io_adapters::MemWriter;

    #[test]
    fn defaults_are_unset() {
        let o = ExecOptions::new();
        assert!(!o.dry_run());
        assert!(o.stdin().is_none());
        assert!(o.stdout().is_none());
        assert!(o.stderr().is_none());
        assert!(o.cancel_token().is_none());
    }

    #[test]
    fn last_write_wins_per_concern() {
        let first = MemWriter::new().output();
        let second = MemWriter::new().output();
        let o = ExecOptions::new()
            .with_dry_run(true)
            .with_stdout(first)
            .with_dry_run(false)
            .with_stdout(second.clone());
        assert!(!o.dry_run());
        assert_eq!(o.stdout(), Some(&second));
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let out = MemWriter::new().output();
        let once = ExecOptions::new().with_stderr(out.clone()).with_dry_run(true);
        let twice = ExecOptions::new()
            .with_stderr(out.clone())
            .with_stderr(out.clone())
            .with_dry_run(true)
            .with_dry_run(true);
        assert_eq!(once.stderr(), twice.stderr());
        assert_eq!(once.dry_run(), twice.dry_run());
    }

    #[test]
    fn concerns_are_independent() {
        let out = MemWriter::new().output();
        let err = MemWriter::new().output();
        let o = ExecOptions::new()
            .with_stdout(out.clone())
            .with_stderr(err.clone())
            .with_stdin(Input::Null);
        assert_eq!(o.stdout(), Some(&out));
        assert_eq!(o.stderr(), Some(&err));
        assert_eq!(o.stdin(), Some(&Input::Null));
        assert!(!o.dry_run());
        assert!(o.cancel_token().is_none());
    }

    #[test]
    fn with_io_overrides_single_stream_setters() {
        let early = MemWriter::new().output();
        let late = MemWriter::new().output();
        let o = ExecOptions::new()
            .with_stdout(early)
            .with_io(Input::Null, late.clone(), Output::Null);
        assert_eq!(o.stdout(), Some(&late));
        assert_eq!(o.stderr(), Some(&Output::Null));

        let o = o.with_stderr(late.clone());
        assert_eq!(o.stderr(), Some(&late));
        assert_eq!(o.stdout(), Some(&late));
    }

    #[test]
    fn dry_run_with_cancel_is_accepted() {
        let source = CancelSource::new();
        let o = ExecOptions::new()
            .with_cancel(source.token())
            .with_dry_run(true);
        assert!(o.dry_run());
        assert!(o.cancel_token().is_some());
    }

    #[test]
    fn clones_share_defaults() {
        let out = MemWriter::new().output();
        let base = ExecOptions::new().with_stdout(out.clone());
        let a = base.clone().with_dry_run(true);
        let b = base.clone();
        assert_eq!(a.stdout(), Some(&out));
        assert_eq!(b.stdout(), Some(&out));
        assert!(a.dry_run());
        assert!(!b.dry_run());
    }
}
