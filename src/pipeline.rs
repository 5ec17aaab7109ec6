use crate::tools::ToolCommand;
use std::fmt;
use std::thread;
use tracing::{Span, info, info_span, warn};

/// Errors of every failed mandatory step, in the order the steps were given.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<anyhow::Error>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: anyhow::Error) {
        self.errors.push(error);
    }

    /// Keep the error of a failed result; a success adds nothing.
    pub fn record(&mut self, result: anyhow::Result<()>) {
        if let Err(err) = result {
            self.push(err);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &anyhow::Error> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing failed, the list itself otherwise.
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ErrorList {
    /// One error per line, each with its cause chain.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err:#}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl FromIterator<anyhow::Result<()>> for ErrorList {
    fn from_iter<T: IntoIterator<Item = anyhow::Result<()>>>(iter: T) -> Self {
        let mut list = ErrorList::new();
        for result in iter {
            list.record(result);
        }
        list
    }
}

/// A unit of concurrent work.
pub type Task<'a, T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'a>;

/// Run every task on its own thread and wait for all of them.
///
/// Results come back in the order the tasks were given, not the order they
/// finished. One task failing never stops its siblings. Each thread enters
/// `span` so log events keep their pipeline context.
pub fn join_all<'a, T: Send>(span: &Span, tasks: Vec<Task<'a, T>>) -> Vec<anyhow::Result<T>> {
    thread::scope(|scope| {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let span = span.clone();
                scope.spawn(move || span.in_scope(task))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("pipeline task panicked")),
            })
            .collect()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running,
    CompletedSuccess,
    CompletedWithErrors,
}

/// Whether a step's failure fails the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Mandatory,
    Optional,
}

/// One run of a named pipeline.
///
/// Mandatory failures are collected and returned together by
/// [`Pipeline::finish`]; optional failures are logged as warnings and dropped.
/// Failed steps are never retried.
pub struct Pipeline {
    span: Span,
    state: PipelineState,
    errors: ErrorList,
}

impl Pipeline {
    pub fn new(name: &'static str, dry_run: bool) -> Self {
        Self {
            span: info_span!("pipeline", pipeline = name, dry_run),
            state: PipelineState::NotStarted,
            errors: ErrorList::new(),
        }
    }

    /// The logging context every step of this pipeline runs in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// True once any mandatory step has failed.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn ensure_running(&mut self) {
        if self.state == PipelineState::NotStarted {
            self.span.in_scope(|| info!("start"));
            self.state = PipelineState::Running;
        }
    }

    /// Run one step now and apply `policy` to its outcome.
    pub fn step(
        &mut self,
        stage: &str,
        policy: Policy,
        f: impl FnOnce() -> anyhow::Result<()>,
    ) -> &mut Self {
        self.ensure_running();
        let result = self.span.in_scope(f);
        self.apply(stage, policy, result);
        self
    }

    /// Run a command as a mandatory step.
    pub fn mandatory(&mut self, cmd: ToolCommand) -> &mut Self {
        let stage = cmd.to_string();
        self.step(&stage, Policy::Mandatory, || cmd.run())
    }

    /// Run a command as an optional step.
    pub fn optional(&mut self, cmd: ToolCommand) -> &mut Self {
        self.ensure_running();
        self.span.in_scope(|| cmd.run_log_error_as_warning());
        self
    }

    /// Run commands concurrently as one mandatory stage and wait for all of them.
    pub fn mandatory_batch(&mut self, cmds: Vec<ToolCommand>) -> &mut Self {
        self.ensure_running();
        let stages: Vec<String> = cmds.iter().map(ToString::to_string).collect();
        let tasks: Vec<Task<'_, ()>> = cmds
            .into_iter()
            .map(|cmd| Box::new(move || cmd.run()) as Task<'_, ()>)
            .collect();
        let results = join_all(&self.span, tasks);
        for (stage, result) in stages.iter().zip(results) {
            self.apply(stage, Policy::Mandatory, result);
        }
        self
    }

    fn apply(&mut self, stage: &str, policy: Policy, result: anyhow::Result<()>) {
        let _enter = self.span.enter();
        match (policy, result) {
            (_, Ok(())) => info!(stage, "step succeeded"),
            (Policy::Mandatory, Err(err)) => {
                warn!(stage, error = %format!("{err:#}"), "mandatory step failed");
                self.errors.push(err);
            }
            (Policy::Optional, Err(err)) => {
                warn!(stage, error = %format!("{err:#}"), "optional step failed");
            }
        }
    }

    /// Move to the completed state matching the errors collected so far.
    /// Has no effect once the pipeline has completed.
    fn complete(&mut self) {
        if matches!(
            self.state,
            PipelineState::CompletedSuccess | PipelineState::CompletedWithErrors
        ) {
            return;
        }
        self.ensure_running();
        let _enter = self.span.enter();
        if self.errors.is_empty() {
            self.state = PipelineState::CompletedSuccess;
            info!("complete");
        } else {
            self.state = PipelineState::CompletedWithErrors;
            warn!(failed = self.errors.len(), "complete with errors");
        }
    }

    /// Close the pipeline and return the combined mandatory errors, if any.
    pub fn finish(mut self) -> Result<(), ErrorList> {
        self.complete();
        self.errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use crate::tools::{Grype, Syft, Tool};
    use crate::io_adapters::Output;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn task<'a, T>(f: impl FnOnce() -> anyhow::Result<T> + Send + 'a) -> Task<'a, T> {
        Box::new(f)
    }

    #[test]
    fn join_all_keeps_source_order() {
        let tasks = vec![
            task(|| {
                thread::sleep(Duration::from_millis(80));
                Ok("first")
            }),
            task(|| Ok("second")),
            task(|| {
                thread::sleep(Duration::from_millis(40));
                Ok("third")
            }),
        ];
        let results: Vec<&str> = join_all(&Span::none(), tasks)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, ["first", "second", "third"]);
    }

    #[test]
    fn one_failure_is_the_whole_message() {
        let errors: ErrorList = join_all(
            &Span::none(),
            vec![
                task(|| Ok(())),
                task(|| Err(anyhow::anyhow!("syft version: exit code 1"))),
                task(|| Ok(())),
            ],
        )
        .into_iter()
        .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.to_string(), "syft version: exit code 1");
    }

    #[test]
    fn all_failures_in_source_order() {
        let errors: ErrorList = join_all(
            &Span::none(),
            vec![
                task(|| {
                    thread::sleep(Duration::from_millis(60));
                    Err(anyhow::anyhow!("first"))
                }),
                task(|| {
                    thread::sleep(Duration::from_millis(30));
                    Err(anyhow::anyhow!("second"))
                }),
                task(|| Err(anyhow::anyhow!("third"))),
            ],
        )
        .into_iter()
        .collect();
        assert_eq!(errors.to_string(), "first\nsecond\nthird");
    }

    #[test]
    fn all_successes_are_empty() {
        let errors: ErrorList = join_all(
            &Span::none(),
            vec![task(|| Ok(())), task(|| Ok(())), task(|| Ok(()))],
        )
        .into_iter()
        .collect();
        assert!(errors.is_empty());
        assert!(errors.into_result().is_ok());
    }

    #[test]
    fn failure_does_not_stop_siblings() {
        let finished = AtomicUsize::new(0);
        let results = join_all(
            &Span::none(),
            vec![
                task(|| Err(anyhow::anyhow!("fast failure"))),
                task(|| {
                    thread::sleep(Duration::from_millis(50));
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
                task(|| {
                    thread::sleep(Duration::from_millis(50));
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            ],
        );
        assert_eq!(results.len(), 3);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn state_moves_from_not_started_to_completed() {
        let mut pipeline = Pipeline::new("test", false);
        assert_eq!(pipeline.state(), PipelineState::NotStarted);
        pipeline.step("noop", Policy::Mandatory, || Ok(()));
        assert_eq!(pipeline.state(), PipelineState::Running);
        pipeline.complete();
        assert_eq!(pipeline.state(), PipelineState::CompletedSuccess);
        assert!(pipeline.finish().is_ok());
    }

    #[test]
    fn completed_pipeline_keeps_its_errors() {
        let mut pipeline = Pipeline::new("test", false);
        pipeline.step("boom", Policy::Mandatory, || Err(anyhow::anyhow!("boom")));
        pipeline.complete();
        pipeline.complete();
        assert_eq!(pipeline.state(), PipelineState::CompletedWithErrors);
        assert_eq!(pipeline.finish().unwrap_err().to_string(), "boom");
    }

    #[test]
    fn mandatory_batch_collects_errors_in_source_order() {
        let runner = Arc::new(
            RecordingRunner::new()
                .failing("grype", 1)
                .failing("scan", 2)
                .delayed(Duration::from_millis(10)),
        );
        let grype = Grype::new(Output::Null, Output::Null).with_runner(runner.clone());
        let syft = Syft::new(Output::Null, Output::Null).with_runner(runner.clone());

        let mut pipeline = Pipeline::new("test", false);
        pipeline.mandatory_batch(vec![
            grype.version(),
            syft.version(),
            syft.scan_image("image.tar", "sbom.json"),
        ]);
        assert!(pipeline.has_errors());
        let err = pipeline.finish().unwrap_err();
        assert_eq!(
            err.to_string(),
            "grype version: exit code 1\n\
             syft scan docker-archive:image.tar --output json=sbom.json: exit code 2"
        );
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn optional_failures_never_surface() {
        let runner = Arc::new(RecordingRunner::with_codes([232, 1]));
        let grype = Grype::new(Output::Null, Output::Null).with_runner(runner.clone());

        let mut pipeline = Pipeline::new("test", false);
        pipeline
            .optional(grype.version())
            .optional(grype.version())
            .step("custom", Policy::Optional, || Err(anyhow::anyhow!("ignored")));
        assert!(!pipeline.has_errors());
        assert!(pipeline.finish().is_ok());
    }

    #[test]
    fn sequential_mandatory_steps_all_run() {
        let runner = Arc::new(RecordingRunner::with_codes([3, 0]));
        let grype = Grype::new(Output::Null, Output::Null).with_runner(runner.clone());

        let mut pipeline = Pipeline::new("test", false);
        pipeline.mandatory(grype.version()).mandatory(grype.scan_sbom("sbom.json"));
        let err = pipeline.finish().unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(
            runner.commands(),
            ["grype version", "grype sbom:sbom.json --output json"]
        );
    }
}
