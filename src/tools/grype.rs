use super::{Tool, ToolBase, ToolCommand};
use crate::external::Runner;
use crate::io_adapters::Output;
use std::path::Path;
use std::sync::Arc;

/// Vulnerability scanner.
#[derive(Clone)]
pub struct Grype {
    base: ToolBase,
}

impl Grype {
    pub fn new(stdout: Output, stderr: Output) -> Self {
        Self {
            base: ToolBase::new(stdout, stderr),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.base = self.base.with_runner(runner);
        self
    }

    /// Evaluate an SBOM and write a JSON report to stdout.
    pub fn scan_sbom(&self, sbom: impl AsRef<Path>) -> ToolCommand {
        let target = format!("sbom:{}", sbom.as_ref().display());
        self.command([target.as_str(), "--output", "json"])
    }
}

impl Tool for Grype {
    fn program(&self) -> &'static str {
        "grype"
    }

    fn base(&self) -> &ToolBase {
        &self.base
    }
}
