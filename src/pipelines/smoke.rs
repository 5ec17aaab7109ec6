use super::PipelineContext;
use crate::io_adapters::{MemWriter, Output};
use crate::pipeline::{Pipeline, Policy, Task, join_all};
use crate::tools::Engine;
use anyhow::Context;

/// An isolated environment the smoke test runs in.
pub trait SmokeEnvironment: Sync {
    /// Run a sample operation and return its output.
    fn run_sample(&self) -> anyhow::Result<String>;

    /// Collect diagnostic information about the environment.
    fn system_info(&self) -> anyhow::Result<String>;
}

/// The report written by the smoke test.
pub fn smoke_report(debug_output: &str, system_info: &str) -> String {
    format!("debug output:\n{debug_output}\nsystem information:\n{system_info}\n")
}

/// Runs the sample operation and the system information query concurrently
/// and writes one report combining both.
pub struct SmokeTest<E> {
    env: E,
    output: Output,
}

impl<E: SmokeEnvironment> SmokeTest<E> {
    pub fn new(env: E, output: Output) -> Self {
        Self { env, output }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let mut pipeline = Pipeline::new("smoke_test", false);
        let tasks: Vec<Task<'_, String>> = vec![
            Box::new(|| self.env.run_sample()),
            Box::new(|| self.env.system_info()),
        ];
        let mut results = join_all(pipeline.span(), tasks).into_iter();
        let sample = results.next().context("sample result missing")?;
        let info = results.next().context("system information result missing")?;

        let (sample, info) = match (sample, info) {
            (Ok(sample), Ok(info)) => (sample, info),
            (sample, info) => {
                pipeline.step("run sample", Policy::Mandatory, || sample.map(drop));
                pipeline.step("system information", Policy::Mandatory, || info.map(drop));
                return pipeline.finish().map_err(Into::into);
            }
        };

        let report = smoke_report(&sample, &info);
        pipeline.step("write report", Policy::Mandatory, || {
            self.output
                .write_chunk(report.as_bytes())
                .and_then(|()| self.output.flush())
                .context("writing smoke test report")
        });
        pipeline.finish()?;
        Ok(())
    }
}

/// Smoke environment backed by a container image that ships this binary.
pub struct ContainerSmokeEnvironment {
    ctx: PipelineContext,
    engine: Engine,
    image: String,
}

impl ContainerSmokeEnvironment {
    pub fn new(ctx: PipelineContext, engine: Engine, image: impl Into<String>) -> Self {
        Self {
            ctx,
            engine,
            image: image.into(),
        }
    }
}

impl SmokeEnvironment for ContainerSmokeEnvironment {
    /// Run the debug pipeline in dry-run mode inside the image.
    fn run_sample(&self) -> anyhow::Result<String> {
        let out = MemWriter::new();
        let engine = self.ctx.engine(self.engine);
        let cmd = engine.run_image(&self.image, ["workflow-engine", "--dry-run", "debug"]);
        self.ctx.prepare(cmd).with_stdout(out.output()).run()?;
        Ok(out.to_string_lossy())
    }

    fn system_info(&self) -> anyhow::Result<String> {
        let out = MemWriter::new();
        let engine = self.ctx.engine(self.engine);
        self.ctx
            .prepare(engine.info())
            .with_stdout(out.output())
            .run()?;
        Ok(out.to_string_lossy())
    }
}
