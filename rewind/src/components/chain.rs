//! Contracts of the chain client that replays are driven through.
//!
//! Peer networking, block storage and block validation live in the chain client; the
//! replay scheduler only tears them down and rebuilds them around a checkpoint.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use zcash_protocol::consensus::BlockHeight;

use super::checkpoints::Checkpoint;
use super::wallet::WalletRef;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A failure reported by the chain client.
#[derive(Debug)]
pub enum ChainError {
    /// The block store could not be opened, closed or recreated.
    Storage(BoxError),
    /// The peer network could not be stopped, started or asked to download.
    Network(BoxError),
    /// The chain could not be rebuilt on top of the block store.
    Chain(BoxError),
}

impl ChainError {
    pub fn storage(e: impl Into<BoxError>) -> Self {
        Self::Storage(e.into())
    }

    pub fn network(e: impl Into<BoxError>) -> Self {
        Self::Network(e.into())
    }

    pub fn chain(e: impl Into<BoxError>) -> Self {
        Self::Chain(e.into())
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Storage(e) => write!(f, "block store: {e}"),
            ChainError::Network(e) => write!(f, "peer network: {e}"),
            ChainError::Chain(e) => write!(f, "chain: {e}"),
        }
    }
}

impl StdError for ChainError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ChainError::Storage(e) | ChainError::Network(e) | ChainError::Chain(e) => {
                Some(e.as_ref())
            }
        }
    }
}

/// Receives block download progress from the peer network.
pub trait DownloadListener: Send + Sync {
    /// Called as blocks arrive; `blocks_left` is the peer's view of the remaining gap.
    fn on_progress(&self, height: BlockHeight, blocks_left: u32);

    /// Called once the chain has caught up with the network.
    fn on_download_complete(&self);
}

/// On-disk block storage.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn close(&mut self) -> Result<(), ChainError>;
}

/// The validated block chain built on top of a [`BlockStore`].
pub trait BlockChain: Send + Sync {
    fn best_height(&self) -> BlockHeight;
}

/// The peer group that downloads blocks into a [`BlockChain`].
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    fn is_running(&self) -> bool;

    /// Registers a listener for every download this network performs.
    fn add_listener(&mut self, listener: Arc<dyn DownloadListener>);

    async fn start(&mut self) -> Result<(), ChainError>;

    /// Stops the network, returning only once every peer is disconnected.
    async fn stop_and_wait(&mut self) -> Result<(), ChainError>;

    /// Resumes (or begins) downloading the block chain from connected peers.
    async fn resume_download(
        &mut self,
        listener: Arc<dyn DownloadListener>,
    ) -> Result<(), ChainError>;
}

/// Builds the storage, chain and networking layers for the replay scheduler.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    type Store: BlockStore + 'static;
    type Chain: BlockChain + 'static;
    type Network: PeerNetwork + 'static;

    /// Deletes any existing block store and creates a new one that begins at
    /// `checkpoint` instead of at genesis.
    async fn create_store(&self, checkpoint: &Checkpoint) -> Result<Self::Store, ChainError>;

    /// Builds a chain on top of `store` with every wallet in `wallets` attached.
    async fn build_chain(
        &self,
        store: &Self::Store,
        wallets: &[WalletRef],
    ) -> Result<Self::Chain, ChainError>;

    /// Builds a peer network that downloads into `chain`. The network is not started.
    async fn build_network(&self, chain: &Self::Chain) -> Result<Self::Network, ChainError>;
}

/// The live storage, chain and networking layers of a [`ChainClient`].
pub struct ChainStack<C: ChainClient> {
    pub(crate) store: C::Store,
    pub(crate) chain: C::Chain,
    pub(crate) network: C::Network,
}

impl<C: ChainClient> ChainStack<C> {
    pub fn new(store: C::Store, chain: C::Chain, network: C::Network) -> Self {
        Self {
            store,
            chain,
            network,
        }
    }

    /// Builds a fresh stack starting at `checkpoint`.
    pub async fn build(
        client: &C,
        checkpoint: &Checkpoint,
        wallets: &[WalletRef],
    ) -> Result<Self, ChainError> {
        let store = client.create_store(checkpoint).await?;
        let chain = client.build_chain(&store, wallets).await?;
        let network = client.build_network(&chain).await?;
        Ok(Self::new(store, chain, network))
    }

    pub fn best_height(&self) -> BlockHeight {
        self.chain.best_height()
    }
}

impl<C: ChainClient> fmt::Debug for ChainStack<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainStack")
            .field("best_height", &self.chain.best_height())
            .field("network_running", &self.network.is_running())
            .finish_non_exhaustive()
    }
}
