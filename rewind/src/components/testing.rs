//! An in-memory chain client for testing the replay scheduler.
//!
//! Every call made through [`MockClient`] is recorded as an [`Event`], failures can be
//! injected per replay step, and downloads only finish when a test says so.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use zcash_protocol::consensus::BlockHeight;

use super::chain::{
    BlockChain, BlockStore, ChainClient, ChainError, ChainStack, DownloadListener, PeerNetwork,
};
use super::checkpoints::Checkpoint;
use super::replay::ReplayStep;
use super::wallet::{WalletId, WalletRef};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    CreateStore(u32),
    BuildChain(Vec<WalletId>),
    BuildNetwork,
    Start,
    StopAndWait,
    CloseStore,
    ResumeDownload,
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    /// Remaining injected failures per step.
    failures: Vec<(ReplayStep, u32)>,
    best_height: u32,
    /// Listeners of the most recently built network.
    network_listeners: Vec<Arc<dyn DownloadListener>>,
    /// The listener passed to the most recent `resume_download`.
    download: Option<Arc<dyn DownloadListener>>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Counts overlapping chain client calls for the duration of one call.
struct InFlight<'a>(&'a Shared);

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockClient {
    shared: Arc<Shared>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap()
    }

    /// Records `event`, failing if a failure was injected for `step`.
    async fn call(&self, step: ReplayStep, event: Event) -> Result<(), ChainError> {
        let _guard = InFlight::enter(&self.shared);
        // Give any concurrent caller a chance to interleave.
        tokio::task::yield_now().await;

        let mut state = self.state();
        state.events.push(event);
        if let Some((_, remaining)) = state
            .failures
            .iter_mut()
            .find(|(s, remaining)| *s == step && *remaining > 0)
        {
            *remaining -= 1;
            let e = format!("injected failure while {step}");
            return Err(match step {
                ReplayStep::CloseStore | ReplayStep::CreateStore => ChainError::storage(e),
                ReplayStep::BuildChain => ChainError::chain(e),
                _ => ChainError::network(e),
            });
        }
        Ok(())
    }

    /// Makes the next `times` calls for `step` fail.
    pub(crate) fn fail(&self, step: ReplayStep, times: u32) {
        self.state().failures.push((step, times));
    }

    pub(crate) fn set_best_height(&self, height: u32) {
        self.state().best_height = height;
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub(crate) fn clear_events(&self) {
        self.state().events.clear();
    }

    /// The most chain client calls that were ever in progress at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// Whether a download has been resumed and not yet finished.
    pub(crate) fn downloading(&self) -> bool {
        self.state().download.is_some()
    }

    /// Reports download progress to the network's listeners.
    pub(crate) fn progress(&self, height: u32, blocks_left: u32) {
        let listeners = {
            let mut state = self.state();
            state.best_height = height;
            let mut listeners = state.network_listeners.clone();
            listeners.extend(state.download.clone());
            listeners
        };
        for listener in listeners {
            listener.on_progress(BlockHeight::from_u32(height), blocks_left);
        }
    }

    /// Finishes the current download, returning whether one was running.
    pub(crate) fn finish_download(&self) -> bool {
        let (listeners, download) = {
            let mut state = self.state();
            (state.network_listeners.clone(), state.download.take())
        };
        let Some(download) = download else {
            return false;
        };
        for listener in listeners {
            listener.on_download_complete();
        }
        download.on_download_complete();
        true
    }

    /// A stack as if the client had previously synced to `height`.
    pub(crate) async fn existing_stack(&self, height: u32) -> ChainStack<Self> {
        let stack = ChainStack::build(self, &Checkpoint::genesis(), &[])
            .await
            .unwrap();
        let mut state = self.state();
        state.best_height = height;
        state.events.clear();
        drop(state);
        stack
    }
}

pub(crate) struct MockStore {
    client: MockClient,
}

#[async_trait]
impl BlockStore for MockStore {
    async fn close(&mut self) -> Result<(), ChainError> {
        self.client
            .call(ReplayStep::CloseStore, Event::CloseStore)
            .await
    }
}

pub(crate) struct MockChain {
    client: MockClient,
}

impl BlockChain for MockChain {
    fn best_height(&self) -> BlockHeight {
        BlockHeight::from_u32(self.client.state().best_height)
    }
}

pub(crate) struct MockNetwork {
    client: MockClient,
    running: bool,
}

#[async_trait]
impl PeerNetwork for MockNetwork {
    fn is_running(&self) -> bool {
        self.running
    }

    fn add_listener(&mut self, listener: Arc<dyn DownloadListener>) {
        self.client.state().network_listeners.push(listener);
    }

    async fn start(&mut self) -> Result<(), ChainError> {
        self.client.call(ReplayStep::StartNetwork, Event::Start).await?;
        self.running = true;
        Ok(())
    }

    async fn stop_and_wait(&mut self) -> Result<(), ChainError> {
        self.client
            .call(ReplayStep::StopNetwork, Event::StopAndWait)
            .await?;
        self.running = false;
        self.client.state().download = None;
        Ok(())
    }

    async fn resume_download(
        &mut self,
        listener: Arc<dyn DownloadListener>,
    ) -> Result<(), ChainError> {
        self.client
            .call(ReplayStep::ResumeDownload, Event::ResumeDownload)
            .await?;
        self.client.state().download = Some(listener);
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockClient {
    type Store = MockStore;
    type Chain = MockChain;
    type Network = MockNetwork;

    async fn create_store(&self, checkpoint: &Checkpoint) -> Result<MockStore, ChainError> {
        let height = u32::from(checkpoint.height());
        self.call(ReplayStep::CreateStore, Event::CreateStore(height))
            .await?;
        self.state().best_height = height;
        Ok(MockStore {
            client: self.clone(),
        })
    }

    async fn build_chain(
        &self,
        _: &MockStore,
        wallets: &[WalletRef],
    ) -> Result<MockChain, ChainError> {
        let ids = wallets.iter().map(|w| w.id().clone()).collect();
        self.call(ReplayStep::BuildChain, Event::BuildChain(ids))
            .await?;
        Ok(MockChain {
            client: self.clone(),
        })
    }

    async fn build_network(&self, _: &MockChain) -> Result<MockNetwork, ChainError> {
        self.call(ReplayStep::BuildNetwork, Event::BuildNetwork)
            .await?;
        self.state().network_listeners.clear();
        Ok(MockNetwork {
            client: self.clone(),
            running: false,
        })
    }
}
