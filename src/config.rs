use std::path::{Path, PathBuf};

/// Paths used by the Syft steps of the debug pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyftConfig {
    /// Image saved with `docker save`, input to the SBOM scan.
    pub image_tarball: PathBuf,
    /// Where the SBOM is written.
    pub image_sbom: PathBuf,
}

impl Default for SyftConfig {
    fn default() -> Self {
        Self {
            image_tarball: PathBuf::from("./test/.artifacts/build-image/test-local.tar"),
            image_sbom: PathBuf::from("./test/.artifacts/sbom/sbom.json"),
        }
    }
}

/// Where a pipeline reads and writes its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactConfig {
    pub directory: PathBuf,
    pub sbom_filename: String,
    pub grype_filename: String,
}

impl ArtifactConfig {
    pub fn sbom_path(&self) -> PathBuf {
        self.directory.join(&self.sbom_filename)
    }

    pub fn grype_path(&self) -> PathBuf {
        self.directory.join(&self.grype_filename)
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir(),
            sbom_filename: "sbom.json".to_string(),
            grype_filename: "grype-report.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub syft: SyftConfig,
    pub artifacts: ArtifactConfig,
}

impl Config {
    /// Directories that must exist before the debug pipeline starts.
    pub fn debug_directories(&self) -> Vec<&Path> {
        [&self.syft.image_tarball, &self.syft.image_sbom]
            .into_iter()
            .filter_map(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .collect()
    }
}
