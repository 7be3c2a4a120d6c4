//! Download listeners attached to the peer network while a replay runs.

use std::sync::Weak;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, info};
use zcash_protocol::consensus::BlockHeight;

use super::{ReplayCore, TaskId};
use crate::components::chain::DownloadListener;
use crate::components::wallet::WalletRef;

/// Percent of the way from `start` to `height + blocks_left`, clamped to `0..=100`.
pub(crate) fn percent_complete(
    start: BlockHeight,
    height: BlockHeight,
    blocks_left: u32,
    target_floor: Option<BlockHeight>,
) -> u8 {
    let start = u64::from(u32::from(start));
    let height = u64::from(u32::from(height)).max(start);
    let target = (height + u64::from(blocks_left))
        .max(target_floor.map_or(0, |h| u64::from(u32::from(h))));

    if target <= start {
        100
    } else {
        // `height <= target`, so this is at most 100.
        ((height - start) * 100 / (target - start)) as u8
    }
}

/// Tracks the download of a replay task, and completes the task once the chain has
/// caught up.
pub(crate) struct ReplayProgress {
    core: Weak<ReplayCore>,
    task: TaskId,
    start: BlockHeight,
    /// The chain's best height before the replay rebuilt it.
    best_before: Option<BlockHeight>,
    last_reported: AtomicU8,
}

impl ReplayProgress {
    pub(crate) fn new(
        core: Weak<ReplayCore>,
        task: TaskId,
        start: BlockHeight,
        best_before: Option<BlockHeight>,
    ) -> Self {
        Self {
            core,
            task,
            start,
            best_before,
            last_reported: AtomicU8::new(0),
        }
    }
}

impl DownloadListener for ReplayProgress {
    fn on_progress(&self, height: BlockHeight, blocks_left: u32) {
        let percent = percent_complete(self.start, height, blocks_left, self.best_before);
        // Log every tenth of the way.
        let previous = self.last_reported.fetch_max(percent / 10 * 10, Ordering::Relaxed);
        if percent / 10 * 10 > previous {
            info!(task = %self.task, height = u32::from(height), percent, "Replay progress");
        }
    }

    fn on_download_complete(&self) {
        match self.core.upgrade() {
            Some(core) => {
                core.notify_task_completed(self.task);
            }
            None => debug!(task = %self.task, "Replay completed after scheduler shut down"),
        }
    }
}

/// Mirrors download progress into a wallet's sync state for display.
pub(crate) struct WalletProgress {
    wallet: WalletRef,
    start: BlockHeight,
    best_before: Option<BlockHeight>,
}

impl WalletProgress {
    pub(crate) fn new(wallet: WalletRef, start: BlockHeight, best_before: Option<BlockHeight>) -> Self {
        Self {
            wallet,
            start,
            best_before,
        }
    }
}

impl DownloadListener for WalletProgress {
    fn on_progress(&self, height: BlockHeight, blocks_left: u32) {
        self.wallet.set_download_percent(Some(percent_complete(
            self.start,
            height,
            blocks_left,
            self.best_before,
        )));
    }

    fn on_download_complete(&self) {
        self.wallet.set_download_percent(None);
    }
}

/// Listener for ordinary, non-replay downloads.
pub(crate) struct RegularDownload;

impl DownloadListener for RegularDownload {
    fn on_progress(&self, height: BlockHeight, blocks_left: u32) {
        debug!(height = u32::from(height), blocks_left, "Downloading blocks");
    }

    fn on_download_complete(&self) {
        info!("Chain download complete");
    }
}
