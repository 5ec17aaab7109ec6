use argh::FromArgs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;
use workflow_engine::config::{ArtifactConfig, Config};
use workflow_engine::pipelines::{
    ContainerSmokeEnvironment, Debug, ImageScan, PipelineContext, SmokeTest,
};
use workflow_engine::tools::Engine;
use workflow_engine::{CancelToken, Output};

#[derive(FromArgs)]
/// Run CI pipelines that drive grype, syft and the container engines.
struct Cli {
    #[argh(switch)]
    /// print the commands that would run instead of running them
    dry_run: bool,

    #[argh(switch, short = 'v')]
    /// log at debug level (overridden by WORKFLOW_ENGINE_LOG)
    verbose: bool,

    #[argh(option)]
    /// kill any command still running this many seconds after start
    timeout: Option<u64>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Debug(DebugArgs),
    ImageScan(ImageScanArgs),
    SmokeTest(SmokeTestArgs),
}

#[derive(FromArgs)]
/// Check that every required tool is installed and working.
#[argh(subcommand, name = "debug")]
struct DebugArgs {
    #[argh(option)]
    /// image tarball the test SBOM is generated from
    image_tarball: Option<PathBuf>,

    #[argh(option)]
    /// where the test SBOM is written
    image_sbom: Option<PathBuf>,
}

#[derive(FromArgs)]
/// Scan the SBOM in the artifact directory and save the grype report.
#[argh(subcommand, name = "image-scan")]
struct ImageScanArgs {
    #[argh(option)]
    /// directory holding the SBOM and receiving the report; defaults to the temp dir
    artifact_dir: Option<PathBuf>,

    #[argh(option)]
    /// SBOM file name inside the artifact directory
    sbom_filename: Option<String>,

    #[argh(option)]
    /// report file name inside the artifact directory
    grype_filename: Option<String>,
}

#[derive(FromArgs)]
/// Run this tool inside a container image and report on the environment.
#[argh(subcommand, name = "smoke-test")]
struct SmokeTestArgs {
    #[argh(option, default = "String::from(\"workflow-engine:latest\")")]
    /// image that ships the workflow-engine binary
    image: String,

    #[argh(option, default = "Engine::Docker")]
    /// container engine to use: docker or podman
    engine: Engine,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("WORKFLOW_ENGINE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut ctx =
        PipelineContext::new(Output::stdout(), Output::stderr()).with_dry_run(cli.dry_run);
    if let Some(secs) = cli.timeout {
        ctx = ctx.with_cancel(CancelToken::never().with_timeout(Duration::from_secs(secs)));
    }

    match cli.command {
        Command::Debug(args) => {
            let mut config = Config::default();
            if let Some(tarball) = args.image_tarball {
                config.syft.image_tarball = tarball;
            }
            if let Some(sbom) = args.image_sbom {
                config.syft.image_sbom = sbom;
            }
            Debug::new(ctx).with_config(config).run()
        }
        Command::ImageScan(args) => {
            let mut artifacts = ArtifactConfig::default();
            if let Some(dir) = args.artifact_dir {
                artifacts.directory = dir;
            }
            if let Some(name) = args.sbom_filename {
                artifacts.sbom_filename = name;
            }
            if let Some(name) = args.grype_filename {
                artifacts.grype_filename = name;
            }
            ImageScan::new(ctx).with_artifact_config(artifacts).run()
        }
        Command::SmokeTest(args) => {
            let report = ctx.stdout().clone();
            let env = ContainerSmokeEnvironment::new(ctx, args.engine, args.image);
            SmokeTest::new(env, report).run()
        }
    }
}

fn main() -> ExitCode {
    let cli: Cli = argh::from_env();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "pipeline failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
