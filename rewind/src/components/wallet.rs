//! Per-wallet synchronization bookkeeping.
//!
//! The wallet itself (keys, transactions, persistence) is owned elsewhere; this module only
//! tracks the fields the replay scheduler and UI share about it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use tracing::debug;
use zcash_protocol::consensus::BlockHeight;

use super::checkpoints::BlockHash;
use super::replay::TaskId;

/// Stable identifier of a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a wallet is busy, as a pair of opaque UI message keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusyLabel {
    /// Queued behind another replay.
    Waiting,
    /// Its replay is currently downloading blocks.
    Downloading,
}

impl BusyLabel {
    pub fn reason_key(&self) -> &'static str {
        match self {
            BusyLabel::Waiting => "wallet-busy-reason-waiting",
            BusyLabel::Downloading => "wallet-busy-reason-downloading",
        }
    }

    pub fn verb_key(&self) -> &'static str {
        match self {
            BusyLabel::Waiting => "wallet-busy-verb-waiting",
            BusyLabel::Downloading => "wallet-busy-verb-downloading",
        }
    }
}

/// Sync fields of a wallet, shared between the replay scheduler and its UI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletSyncState {
    pub busy: bool,
    pub busy_label: Option<BusyLabel>,
    pub active_replay_task: Option<TaskId>,
    /// The wallet's view of chain progress.
    pub last_seen_height: Option<BlockHeight>,
    pub last_seen_hash: Option<BlockHash>,
    /// Percent of the current download completed, while one is running.
    pub download_percent: Option<u8>,
    /// Set whenever in-memory state diverges from what was last persisted.
    pub dirty: bool,
}

impl WalletSyncState {
    pub fn busy_reason_key(&self) -> Option<&'static str> {
        self.busy_label.as_ref().map(BusyLabel::reason_key)
    }

    pub fn busy_verb_key(&self) -> Option<&'static str> {
        self.busy_label.as_ref().map(BusyLabel::verb_key)
    }
}

/// A wallet known to the scheduler, with its sync state behind its own lock.
pub struct TrackedWallet {
    id: WalletId,
    sync: Mutex<WalletSyncState>,
}

/// Shared handle to a [`TrackedWallet`].
pub type WalletRef = Arc<TrackedWallet>;

impl fmt::Debug for TrackedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedWallet")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl TrackedWallet {
    pub fn new(id: WalletId) -> WalletRef {
        Self::with_state(id, WalletSyncState::default())
    }

    /// Tracks a wallet whose sync state was restored from disk.
    pub fn with_state(id: WalletId, sync: WalletSyncState) -> WalletRef {
        Arc::new(Self {
            id,
            sync: Mutex::new(sync),
        })
    }

    pub fn id(&self) -> &WalletId {
        &self.id
    }

    /// A copy of the current sync state.
    pub fn snapshot(&self) -> WalletSyncState {
        self.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Records that this wallet has seen the chain up to the given block.
    pub fn set_last_seen(&self, height: BlockHeight, hash: Option<BlockHash>) {
        let mut sync = self.lock();
        sync.last_seen_height = Some(height);
        sync.last_seen_hash = hash;
        sync.dirty = true;
    }

    /// Download progress is transient, so this does not mark the wallet dirty.
    pub(crate) fn set_download_percent(&self, percent: Option<u8>) {
        self.lock().download_percent = percent;
    }

    /// Clears the dirty flag once the caller has persisted the wallet.
    pub fn mark_saved(&self) {
        self.lock().dirty = false;
    }

    /// Applies `f` to the sync state under the wallet lock, returning whether the busy
    /// flag changed.
    pub(crate) fn update<F: FnOnce(&mut WalletSyncState)>(&self, f: F) -> bool {
        let mut sync = self.lock();
        let was_busy = sync.busy;
        f(&mut sync);
        sync.dirty = true;
        was_busy != sync.busy
    }

    fn lock(&self) -> MutexGuard<'_, WalletSyncState> {
        // The state is plain data, so a panic while it was held cannot leave it torn.
        self.sync.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PartialEq for TrackedWallet {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Receives the aggregate busy state whenever any wallet's busy flag transitions.
pub trait BusyListener: Send + Sync {
    fn busy_changed(&self, any_busy: bool);
}

impl<F: Fn(bool) + Send + Sync> BusyListener for F {
    fn busy_changed(&self, any_busy: bool) {
        self(any_busy)
    }
}

/// The wallets the scheduler has seen, plus the listeners interested in their busy state.
///
/// Wallets are held weakly: queued tasks keep their own wallets alive, and a wallet its
/// owner has dropped is forgotten.
#[derive(Default)]
pub(crate) struct WalletRegistry {
    wallets: RwLock<Vec<Weak<TrackedWallet>>>,
    listeners: RwLock<Vec<Arc<dyn BusyListener>>>,
}

impl WalletRegistry {
    pub(crate) fn track(&self, wallet: &WalletRef) {
        let mut wallets = self.wallets.write().unwrap_or_else(|p| p.into_inner());
        wallets.retain(|w| w.strong_count() > 0);
        if !wallets
            .iter()
            .filter_map(Weak::upgrade)
            .any(|w| w.id() == wallet.id())
        {
            wallets.push(Arc::downgrade(wallet));
        }
    }

    /// The number of tracked wallets that are still alive.
    pub(crate) fn len(&self) -> usize {
        self.wallets
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn BusyListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }

    pub(crate) fn any_busy(&self) -> bool {
        self.wallets
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter_map(Weak::upgrade)
            .any(|w| w.is_busy())
    }

    pub(crate) fn notify_busy_changed(&self) {
        let any_busy = self.any_busy();
        debug!(any_busy, tracked = self.len(), "Wallet busy state changed");
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for listener in listeners {
            listener.busy_changed(any_busy);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use zcash_protocol::consensus::BlockHeight;

    use super::{BusyLabel, TrackedWallet, WalletId, WalletRegistry};

    #[test]
    fn update_reports_busy_transitions_and_marks_dirty() {
        let wallet = TrackedWallet::new(WalletId::new("w"));
        assert!(wallet.update(|s| s.busy = true));
        assert!(!wallet.update(|s| s.busy_label = Some(BusyLabel::Downloading)));
        assert!(wallet.snapshot().dirty);
        assert_eq!(
            wallet.snapshot().busy_reason_key(),
            Some("wallet-busy-reason-downloading")
        );

        wallet.mark_saved();
        assert!(!wallet.snapshot().dirty);
        assert!(wallet.update(|s| s.busy = false));
    }

    #[test]
    fn set_last_seen_marks_dirty() {
        let wallet = TrackedWallet::new(WalletId::new("w"));
        wallet.set_last_seen(BlockHeight::from_u32(12), None);
        let state = wallet.snapshot();
        assert_eq!(state.last_seen_height, Some(BlockHeight::from_u32(12)));
        assert!(state.dirty);
    }

    #[test]
    fn registry_reports_aggregate_busy_state() {
        let registry = WalletRegistry::default();
        let a = TrackedWallet::new(WalletId::new("a"));
        let b = TrackedWallet::new(WalletId::new("b"));
        registry.track(&a);
        registry.track(&b);
        registry.track(&a);

        let seen = Arc::new(Mutex::new(vec![]));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let seen = seen.clone();
            let calls = calls.clone();
            registry.add_listener(Arc::new(move |busy: bool| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(busy);
            }));
        }

        a.update(|s| s.busy = true);
        b.update(|s| s.busy = true);
        registry.notify_busy_changed();
        a.update(|s| s.busy = false);
        registry.notify_busy_changed();
        b.update(|s| s.busy = false);
        registry.notify_busy_changed();

        assert_eq!(*seen.lock().unwrap(), vec![true, true, false]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn registry_forgets_dropped_wallets() {
        let registry = WalletRegistry::default();
        let kept = TrackedWallet::new(WalletId::new("kept"));
        registry.track(&kept);
        for i in 0..10 {
            let gone = TrackedWallet::new(WalletId::new(format!("gone-{i}")));
            gone.update(|s| s.busy = true);
            registry.track(&gone);
        }
        assert_eq!(registry.len(), 1);
        // A dropped wallet does not keep the aggregate busy.
        assert!(!registry.any_busy());

        registry.track(&TrackedWallet::new(WalletId::new("next")));
        assert_eq!(registry.wallets.read().unwrap().len(), 2);
        assert_eq!(registry.len(), 1);
    }
}
