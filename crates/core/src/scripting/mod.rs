//! External command execution.
//!
//! The pipeline never spawns processes directly: it describes an
//! [`runner::Invocation`] and hands it to a [`runner::CommandRunner`].
//! [`subprocess::ProcessRunner`] is the production implementation; tests
//! substitute a recording fake.

pub mod runner;
pub mod subprocess;

pub use runner::{CommandRunner, Invocation, InvocationResult, OutputSink, RunError};
pub use subprocess::ProcessRunner;
