mod debug;
mod image_scan;
mod smoke;

pub use debug::Debug;
pub use image_scan::ImageScan;
pub use smoke::{ContainerSmokeEnvironment, SmokeEnvironment, SmokeTest, smoke_report};

use crate::cancel::CancelToken;
use crate::external::{ProcessRunner, Runner};
use crate::io_adapters::Output;
use crate::tools::{ContainerEngine, Engine, Grype, Syft, ToolCommand};
use std::sync::Arc;

/// Settings every command of a pipeline shares: default streams, dry run,
/// cancellation and the runner commands are handed to.
#[derive(Clone)]
pub struct PipelineContext {
    stdout: Output,
    stderr: Output,
    dry_run: bool,
    cancel: Option<CancelToken>,
    runner: Arc<dyn Runner>,
}

impl PipelineContext {
    pub fn new(stdout: Output, stderr: Output) -> Self {
        Self {
            stdout,
            stderr,
            dry_run: false,
            cancel: None,
            runner: Arc::new(ProcessRunner::new()),
        }
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn stdout(&self) -> &Output {
        &self.stdout
    }

    pub fn grype(&self) -> Grype {
        Grype::new(self.stdout.clone(), self.stderr.clone()).with_runner(self.runner.clone())
    }

    pub fn syft(&self) -> Syft {
        Syft::new(self.stdout.clone(), self.stderr.clone()).with_runner(self.runner.clone())
    }

    pub fn engine(&self, engine: Engine) -> ContainerEngine {
        ContainerEngine::new(engine, self.stdout.clone(), self.stderr.clone())
            .with_runner(self.runner.clone())
    }

    /// Apply the pipeline-wide dry run flag and cancellation token to `cmd`.
    pub fn prepare(&self, cmd: ToolCommand) -> ToolCommand {
        let cmd = cmd.with_dry_run(self.dry_run);
        match &self.cancel {
            Some(token) => cmd.with_cancel(token.clone()),
            None => cmd,
        }
    }
}
