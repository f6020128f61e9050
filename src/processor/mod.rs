//! # Processors
//!
//! Entry points that take host inputs all the way to output collections.
//!
//! | Processor | Input | Pipeline |
//! |-----------|-------|----------|
//! | [`ConnectPoints`] | unordered point sets | probe → graph builder → [`CompoundProcessor`] |
//! | [`PathsToClusters`] | ordered paths | path edges (optionally fused) → [`CompoundProcessor`] |
//! | [`CompoundProcessor`] | a populated graph builder | intersections → blending → compile → write |
//!
//! Every input is processed independently: an input that is rejected is
//! logged, recorded as suppressed in the [`OutputContext`](crate::graph::OutputContext)
//! and never affects its siblings.

pub mod compound;
pub mod connect;
pub mod paths;

pub use compound::{CompoundProcessor, CompoundState, Outcome, Transition};
pub use connect::ConnectPoints;
pub use paths::{path_edges, PathsToClusters, COMPOUND_IO_INDEX};

use crate::mt::{TaskGroup, TaskManager};
use crate::{Error, Result};

/// Log why an input produced nothing, at the severity its cause warrants.
pub(crate) fn report(io_index: usize, error: &Error) {
    match error {
        Error::Aborted => tracing::debug!(io_index, "processing aborted"),
        Error::InvalidAttribute { .. } | Error::InvalidConfig(_) | Error::Json(_) | Error::TaskFailed { .. } => {
            tracing::error!(io_index, %error, "input rejected")
        }
        Error::NotEnoughPoints { .. } | Error::NoProbes | Error::CompilationFailed { .. } => {
            tracing::warn!(io_index, %error, "input produced no output")
        }
    }
}

/// Outcome of a finished task group: cancellation first, then failure.
pub(crate) fn check_group(manager: &TaskManager, group: &TaskGroup) -> Result<()> {
    if !manager.is_alive() {
        return Err(Error::Aborted);
    }
    if !group.succeeded() {
        return Err(Error::TaskFailed { task: group.name() });
    }
    Ok(())
}
