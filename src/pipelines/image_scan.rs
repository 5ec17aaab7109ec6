use super::PipelineContext;
use crate::config::ArtifactConfig;
use crate::io_adapters::MemWriter;
use crate::pipeline::{Pipeline, Policy};
use anyhow::Context;
use std::fs;
use tracing::info;

/// Scans the SBOM in the artifact directory with Grype and saves the report
/// next to it. A failed scan stops the pipeline; nothing is saved.
pub struct ImageScan {
    ctx: PipelineContext,
    artifacts: ArtifactConfig,
}

impl ImageScan {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            artifacts: ArtifactConfig::default(),
        }
    }

    pub fn with_artifact_config(mut self, artifacts: ArtifactConfig) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let mut pipeline = Pipeline::new("image_scan", self.ctx.dry_run());
        let sbom = self.artifacts.sbom_path();
        let report_path = self.artifacts.grype_path();
        pipeline.span().in_scope(|| {
            info!(
                directory = %self.artifacts.directory.display(),
                sbom = %sbom.display(),
                report = %report_path.display(),
                "artifact config"
            )
        });

        let report = MemWriter::new();
        let scan = self
            .ctx
            .prepare(self.ctx.grype().scan_sbom(&sbom))
            .with_stdout(report.output());
        pipeline.mandatory(scan);
        if pipeline.has_errors() {
            // No report to save.
            return pipeline.finish().map_err(Into::into);
        }

        let dry_run = self.ctx.dry_run();
        pipeline.step("save grype report", Policy::Mandatory, || {
            if dry_run {
                info!(dest = %report_path.display(), "dry run, report not saved");
                return Ok(());
            }
            fs::write(&report_path, report.contents())
                .with_context(|| format!("saving grype report to {}", report_path.display()))?;
            info!(dest = %report_path.display(), "saved grype report");
            Ok(())
        });

        pipeline.finish()?;
        Ok(())
    }
}
