use super::PipelineContext;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::tools::{Engine, Tool};
use anyhow::Context;
use std::fs;
use tracing::info;

/// Checks that every tool the other pipelines need is installed and working.
///
/// Grype and Syft are mandatory: their version commands and an SBOM scan of
/// the test image run concurrently and all failures are reported together.
/// The container engines are optional, only one of them is usually present.
pub struct Debug {
    ctx: PipelineContext,
    config: Config,
}

impl Debug {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let mut pipeline = Pipeline::new("debug", self.ctx.dry_run());
        pipeline.span().in_scope(|| self.prepare_directories())?;

        let grype = self.ctx.grype();
        let syft = self.ctx.syft();
        let syft_config = &self.config.syft;

        pipeline.mandatory_batch(vec![
            self.ctx.prepare(grype.version()),
            self.ctx.prepare(syft.version()),
            self.ctx.prepare(syft.scan_image(&syft_config.image_tarball, &syft_config.image_sbom)),
        ]);

        pipeline
            .optional(self.ctx.prepare(self.ctx.engine(Engine::Podman).version()))
            .optional(self.ctx.prepare(self.ctx.engine(Engine::Docker).version()));

        pipeline.finish()?;
        Ok(())
    }

    fn prepare_directories(&self) -> anyhow::Result<()> {
        let pwd = std::env::current_dir().context("reading current directory")?;
        info!(pwd = %pwd.display(), "current directory");
        for dir in self.config.debug_directories() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating artifact directory {}", dir.display()))?;
        }
        Ok(())
    }
}
