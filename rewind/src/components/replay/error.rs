use std::fmt;

use crate::components::chain::ChainError;

/// The step of a replay that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayStep {
    StopNetwork,
    CloseStore,
    CreateStore,
    BuildChain,
    BuildNetwork,
    StartNetwork,
    ResumeDownload,
}

impl fmt::Display for ReplayStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReplayStep::StopNetwork => "stopping the peer network",
            ReplayStep::CloseStore => "closing the block store",
            ReplayStep::CreateStore => "creating the block store",
            ReplayStep::BuildChain => "rebuilding the chain",
            ReplayStep::BuildNetwork => "rebuilding the peer network",
            ReplayStep::StartNetwork => "starting the peer network",
            ReplayStep::ResumeDownload => "resuming the block download",
        })
    }
}

#[derive(Debug)]
pub enum ReplayError {
    Chain { step: ReplayStep, source: ChainError },
    /// There is no chain to download into; a replay must rebuild it first.
    NoChain,
    /// The scheduler is shutting down, so no chain is started.
    ShutDown,
}

impl ReplayError {
    pub(crate) fn at(step: ReplayStep) -> impl FnOnce(ChainError) -> Self {
        move |source| ReplayError::Chain { step, source }
    }

    pub fn step(&self) -> Option<ReplayStep> {
        match self {
            ReplayError::Chain { step, .. } => Some(*step),
            ReplayError::NoChain | ReplayError::ShutDown => None,
        }
    }
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::Chain { step, source } => write!(f, "Failed {step}: {source}"),
            ReplayError::NoChain => write!(f, "No chain has been built yet"),
            ReplayError::ShutDown => write!(f, "The replay scheduler has shut down"),
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReplayError::Chain { source, .. } => Some(source),
            ReplayError::NoChain | ReplayError::ShutDown => None,
        }
    }
}
