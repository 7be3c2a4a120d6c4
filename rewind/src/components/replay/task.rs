use std::fmt;

use time::OffsetDateTime;
use uuid::Uuid;
use zcash_protocol::consensus::BlockHeight;

use crate::components::checkpoints::{Checkpoint, CheckpointResolver};
use crate::components::wallet::{WalletId, WalletRef};

/// Correlates asynchronous download-complete notifications with the task they finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Where a replay should begin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayTarget {
    /// Replay the whole chain.
    Genesis,
    /// Replay everything since the given instant, e.g. a user-chosen "replay from" date.
    Date(OffsetDateTime),
    /// Replay from (just before) a height, e.g. a wallet's last-seen height.
    Height(BlockHeight),
}

impl ReplayTarget {
    fn resolve(&self, resolver: &CheckpointResolver) -> Checkpoint {
        match self {
            ReplayTarget::Genesis => Checkpoint::genesis(),
            ReplayTarget::Date(date) => resolver.resolve_time(*date),
            ReplayTarget::Height(height) => resolver.resolve_height(*height),
        }
    }
}

impl From<Option<OffsetDateTime>> for ReplayTarget {
    fn from(date: Option<OffsetDateTime>) -> Self {
        date.map_or(ReplayTarget::Genesis, ReplayTarget::Date)
    }
}

/// A caller's request to bring some wallets back in sync.
#[derive(Clone, Debug)]
pub struct ReplayRequest {
    wallets: Vec<WalletRef>,
    target: ReplayTarget,
}

impl ReplayRequest {
    /// Replays `wallets` from `target_date`, or from genesis if there is no date.
    pub fn new(wallets: Vec<WalletRef>, target_date: Option<OffsetDateTime>) -> Self {
        Self::with_target(wallets, target_date.into())
    }

    pub fn with_target(wallets: Vec<WalletRef>, target: ReplayTarget) -> Self {
        Self { wallets, target }
    }

    pub fn wallets(&self) -> &[WalletRef] {
        &self.wallets
    }

    pub fn target(&self) -> ReplayTarget {
        self.target
    }

    /// Returns `true` if the request has no wallets, or names a wallet twice.
    pub(crate) fn is_malformed(&self) -> bool {
        self.wallets.is_empty()
            || self
                .wallets
                .iter()
                .enumerate()
                .any(|(i, w)| self.wallets[..i].iter().any(|o| o.id() == w.id()))
    }

    /// Accepts the request, fixing its start point.
    pub(crate) fn into_task(self, resolver: &CheckpointResolver) -> ReplayTask {
        let start = self.target.resolve(resolver);
        ReplayTask {
            id: TaskId::new(),
            wallets: self.wallets,
            target: self.target,
            start,
        }
    }
}

/// An accepted replay, waiting in or at the head of the task queue.
///
/// The start checkpoint is resolved once, when the task is created, and never changes.
#[derive(Clone, Debug)]
pub struct ReplayTask {
    id: TaskId,
    wallets: Vec<WalletRef>,
    target: ReplayTarget,
    start: Checkpoint,
}

impl ReplayTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn wallets(&self) -> &[WalletRef] {
        &self.wallets
    }

    pub fn target(&self) -> ReplayTarget {
        self.target
    }

    /// The checkpoint new chain storage is seeded from.
    pub fn start(&self) -> &Checkpoint {
        &self.start
    }

    pub fn start_height(&self) -> BlockHeight {
        self.start.height()
    }

    pub fn includes(&self, wallet: &WalletId) -> bool {
        self.wallets.iter().any(|w| w.id() == wallet)
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id,
            wallets: self.wallets.iter().map(|w| w.id().clone()).collect(),
            target: self.target,
            start_height: self.start_height(),
        }
    }
}

/// A read-only description of a [`ReplayTask`], for UI callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskView {
    pub id: TaskId,
    pub wallets: Vec<WalletId>,
    pub target: ReplayTarget,
    pub start_height: BlockHeight,
}
