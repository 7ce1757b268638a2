//! Build context assembly and parallel Docker builds.
//!
//! A build round flows through these pieces:
//!
//! ```text
//! FunctionSpec ─┬─ BuildSettings merge ─ tag::resolve ──────────────┐
//!               └─ template manifest ─ ContextAssembler::assemble ──┴─ docker build ─ BuildOutcome
//! ```
//!
//! [`BuildCoordinator`] fans a round out over a fixed number of workers. A
//! function that fails is reported in its [`BuildOutcome`] and never stops
//! the others.

pub mod context;
pub mod coordinator;
pub mod docker;
pub mod executor;
pub mod vcs;

pub use context::{ContextAssembler, ContextError, Template};
pub use coordinator::{BuildCoordinator, BuildError, BuildJob, BuildOutcome, summarize_failures};
pub use docker::DockerError;
pub use executor::{DockerExecutor, RealExecutor};
pub use vcs::{GitError, GitInfo};
