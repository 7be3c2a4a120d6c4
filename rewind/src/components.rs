//! Components of Rewind.
//!
//! These are not [`abscissa_core::Component`]s (except for [`tracing`]), because the
//! replay scheduler is generic over the chain client it drives, which Abscissa's component
//! registry cannot express.

use tokio::task::JoinHandle;

use crate::error::Error;

pub mod chain;
pub mod checkpoints;
pub mod replay;
pub(crate) mod tracing;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

/// A handle to a background task spawned by a component.
///
/// The task ends with an error only if the component can no longer make progress.
pub type TaskHandle = JoinHandle<Result<(), Error>>;
