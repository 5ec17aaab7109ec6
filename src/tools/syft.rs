use super::{Tool, ToolBase, ToolCommand};
use crate::external::Runner;
use crate::io_adapters::Output;
use std::path::Path;
use std::sync::Arc;

/// SBOM generator.
#[derive(Clone)]
pub struct Syft {
    base: ToolBase,
}

impl Syft {
    pub fn new(stdout: Output, stderr: Output) -> Self {
        Self {
            base: ToolBase::new(stdout, stderr),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.base = self.base.with_runner(runner);
        self
    }

    /// Catalog a saved image tarball and write the SBOM as JSON to `sbom`.
    pub fn scan_image(&self, tarball: impl AsRef<Path>, sbom: impl AsRef<Path>) -> ToolCommand {
        let source = format!("docker-archive:{}", tarball.as_ref().display());
        let output = format!("json={}", sbom.as_ref().display());
        self.command(["scan", source.as_str(), "--output", output.as_str()])
    }
}

impl Tool for Syft {
    fn program(&self) -> &'static str {
        "syft"
    }

    fn base(&self) -> &ToolBase {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_image_arguments() {
        let cmd = Syft::new(Output::Null, Output::Null)
            .scan_image("./build/image.tar", "./sbom/sbom.json");
        assert_eq!(
            cmd.to_string(),
            "syft scan docker-archive:./build/image.tar --output json=./sbom/sbom.json"
        );
    }

    #[test]
    fn arguments_are_deterministic() {
        let syft = Syft::new(Output::Null, Output::Null);
        let a = syft.scan_image("a.tar", "a.json");
        let b = syft.scan_image("a.tar", "a.json");
        assert_eq!(a.invocation().get_args(), b.invocation().get_args());
    }
}
