use super::{Tool, ToolBase, ToolCommand};
use crate::external::Runner;
use crate::io_adapters::Output;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Container runtimes with a docker-compatible command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Docker,
    Podman,
}

impl Engine {
    pub fn program(self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(Engine::Docker),
            "podman" => Ok(Engine::Podman),
            other => Err(format!("unknown container engine: {other}")),
        }
    }
}

/// Docker or Podman.
#[derive(Clone)]
pub struct ContainerEngine {
    engine: Engine,
    base: ToolBase,
}

impl ContainerEngine {
    pub fn new(engine: Engine, stdout: Output, stderr: Output) -> Self {
        Self {
            engine,
            base: ToolBase::new(stdout, stderr),
        }
    }

    pub fn docker(stdout: Output, stderr: Output) -> Self {
        Self::new(Engine::Docker, stdout, stderr)
    }

    pub fn podman(stdout: Output, stderr: Output) -> Self {
        Self::new(Engine::Podman, stdout, stderr)
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.base = self.base.with_runner(runner);
        self
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// `<engine> info`; succeeds only when the runtime is reachable.
    pub fn info(&self) -> ToolCommand {
        self.command(["info"])
    }

    /// Run `image` in a throwaway container with the given arguments.
    pub fn run_image<I, S>(&self, image: &str, args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut argv = vec!["run".to_string(), "--rm".to_string(), image.to_string()];
        argv.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self.command(argv)
    }
}

impl Tool for ContainerEngine {
    fn program(&self) -> &'static str {
        self.engine.program()
    }

    fn base(&self) -> &ToolBase {
        &self.base
    }
}
