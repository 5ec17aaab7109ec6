//! A pipeline runner for CI security tooling.
//!
//! The crate drives external command-line tools (a vulnerability scanner, an
//! SBOM generator, container engines) and turns their exit statuses into one
//! result per pipeline. It is built from a few small layers:
//!
//! - [`options`]: how one invocation is run (streams, dry run, cancellation).
//! - [`Invocation`] and [`Runner`]: spawning a child process, racing it against
//!   a [`CancelToken`], and mapping every ending to the exit codes in [`command`].
//! - [`tools`]: per-tool builders that produce ready-to-run commands.
//! - [`pipeline`] and [`pipelines`]: mandatory and optional steps, sequential
//!   and concurrent stages, and the combined [`ErrorList`] a pipeline returns.

pub mod cancel;
pub mod command;
pub mod config;
mod external;
pub mod io_adapters;
pub mod options;
pub mod pipeline;
pub mod pipelines;
pub mod tools;

#[cfg(test)]
mod testing;

pub use cancel::{CancelSource, CancelToken};
pub use command::{ExitCode, ExitOutcome};
pub use external::{Invocation, ProcessRunner, Runner};
pub use io_adapters::{Input, MemReader, MemWriter, Output};
pub use options::ExecOptions;
pub use pipeline::{ErrorList, Pipeline};
