//! The replay scheduler.
//!
//! Callers offer [`ReplayRequest`]s; each is resolved to a start checkpoint and queued.
//! A driver task then executes queued replays strictly one at a time, in offer order: it
//! stops the peer network, recreates block storage at the task's checkpoint, rebuilds the
//! chain and network around the task's wallets, and resumes the download. The download
//! finishing is reported back through [`ReplayScheduler::notify_task_completed`], after
//! which the driver retires the task and moves on to the next.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::TaskHandle;
use super::chain::{BlockStore as _, ChainClient, ChainStack, PeerNetwork as _};
use super::checkpoints::CheckpointResolver;
use super::wallet::{BusyLabel, BusyListener, TrackedWallet, WalletRegistry};
use crate::config::{ReplaySection, RewindConfig};

mod driver;
mod error;
mod progress;
mod queue;
mod task;

pub use error::{ReplayError, ReplayStep};
pub use queue::{RetryPolicy, SchedulerState};
pub use task::{ReplayRequest, ReplayTarget, ReplayTask, TaskId, TaskView};

use progress::{RegularDownload, ReplayProgress, WalletProgress};
use queue::{FailureOutcome, TaskQueue};

/// The state shared between the scheduler, its driver, and download listeners.
pub(crate) struct ReplayCore {
    queue: Mutex<TaskQueue>,
    resolver: CheckpointResolver,
    wallets: WalletRegistry,
    retry: RetryPolicy,
    wake: Notify,
}

impl ReplayCore {
    fn lock_queue(&self) -> MutexGuard<'_, TaskQueue> {
        // Every queue transition is a single assignment, so a poisoned queue is consistent.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn offer(&self, request: ReplayRequest) -> bool {
        if request.is_malformed() {
            warn!(
                wallets = request.wallets().len(),
                "Rejecting replay request without distinct wallets"
            );
            return false;
        }

        let busy_changed = {
            let mut queue = self.lock_queue();

            if let Some(claimed) = request
                .wallets()
                .iter()
                .find(|w| queue.claimant(w.id()).is_some())
            {
                warn!(
                    wallet = %claimed.id(),
                    "Rejecting replay request for a wallet that is already queued for replay"
                );
                return false;
            }

            let task = request.into_task(&self.resolver);
            info!(
                task = %task.id(),
                wallets = task.wallets().len(),
                start_height = u32::from(task.start_height()),
                queued_behind = queue.len(),
                "Replay task accepted"
            );

            let mut busy_changed = false;
            for wallet in task.wallets() {
                self.wallets.track(wallet);
                busy_changed |= wallet.update(|sync| {
                    sync.busy = true;
                    sync.busy_label = Some(BusyLabel::Waiting);
                    sync.active_replay_task = Some(task.id());
                    // Should we restart before the replay completes, the wallet resumes
                    // from the replay's start point.
                    sync.last_seen_height = Some(task.start_height());
                    sync.last_seen_hash = None;
                });
            }
            queue.push(task);
            busy_changed
        };

        if busy_changed {
            self.wallets.notify_busy_changed();
        }
        self.wake.notify_one();
        true
    }

    fn notify_task_completed(&self, id: TaskId) -> bool {
        let Some(task) = self.lock_queue().begin_completion(id) else {
            debug!(task = %id, "Ignoring completion of a task that is not running");
            return false;
        };
        debug!(task = %id, "Replay task completing");

        let mut busy_changed = false;
        for wallet in task.wallets() {
            busy_changed |= wallet.update(|sync| {
                sync.busy = false;
                sync.busy_label = None;
                sync.active_replay_task = None;
                sync.download_percent = None;
            });
        }
        if busy_changed {
            self.wallets.notify_busy_changed();
        }

        self.lock_queue().finish_completion(id);
        info!(task = %id, "Replay task completed");
        self.wake.notify_one();
        true
    }

    fn execute_failed(&self, task: &ReplayTask, e: &ReplayError) {
        let outcome = self
            .lock_queue()
            .fail(task.id(), &self.retry, Instant::now());
        match outcome {
            FailureOutcome::Retry { failures, retry_at } => warn!(
                task = %task.id(),
                failures,
                retry_in_ms = retry_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Replay failed, will retry: {e}"
            ),
            FailureOutcome::Stalled { failures } => error!(
                task = %task.id(),
                failures,
                "Replay failed and will not be retried until restart: {e}"
            ),
            FailureOutcome::Ignored => {
                debug!(task = %task.id(), "Replay failed after it completed: {e}")
            }
        }
    }
}

/// Serializes wallet replays against a [`ChainClient`].
pub struct ReplayScheduler<C: ChainClient> {
    core: Arc<ReplayCore>,
    client: C,
    /// The live chain, if one has been built. Only held across `await`s by `execute`,
    /// `run_regular_download` and `shutdown`.
    stack: tokio::sync::Mutex<Option<ChainStack<C>>>,
    tick_interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl<C: ChainClient> ReplayScheduler<C> {
    pub fn new(
        client: C,
        stack: Option<ChainStack<C>>,
        resolver: CheckpointResolver,
        config: &ReplaySection,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            core: Arc::new(ReplayCore {
                queue: Mutex::new(TaskQueue::default()),
                resolver,
                wallets: WalletRegistry::default(),
                retry: config.retry_policy(),
                wake: Notify::new(),
            }),
            client,
            stack: tokio::sync::Mutex::new(stack),
            tick_interval: config.tick_interval(),
            shutdown,
        })
    }

    /// Creates a scheduler using the configured checkpoint file and replay settings.
    pub async fn init(
        config: &RewindConfig,
        client: C,
        stack: Option<ChainStack<C>>,
    ) -> Arc<Self> {
        let resolver = CheckpointResolver::load_or_genesis(&config.checkpoints_path()).await;
        Self::new(client, stack, resolver, &config.replay)
    }

    /// Starts the driver that executes queued replays.
    pub fn spawn(self: &Arc<Self>) -> TaskHandle {
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(driver::run(self.clone(), shutdown))
    }

    /// Stops the driver after its current tick, then stops the peer network and closes
    /// the block store.
    ///
    /// A replay that has been dispatched but not yet started stays queued.
    pub async fn shutdown(&self) -> Result<(), ReplayError> {
        self.shutdown.send_replace(true);

        if let Some(mut stack) = self.stack.lock().await.take() {
            stack
                .network
                .stop_and_wait()
                .await
                .map_err(ReplayError::at(ReplayStep::StopNetwork))?;
            stack
                .store
                .close()
                .await
                .map_err(ReplayError::at(ReplayStep::CloseStore))?;
        }
        Ok(())
    }

    /// Registers a listener for transitions of any wallet's busy flag.
    pub fn add_busy_listener(&self, listener: Arc<dyn BusyListener>) {
        self.core.wallets.add_listener(listener);
    }

    /// Queues a replay of the requested wallets.
    ///
    /// Returns `false` without changing anything if the request names no wallets, names a
    /// wallet twice, or names a wallet that is already queued for replay.
    pub fn offer(&self, request: ReplayRequest) -> bool {
        self.core.offer(request)
    }

    /// Reports that the download started by task `id` has caught up with the chain.
    ///
    /// Notifications for anything other than the running head-of-queue task are ignored;
    /// returns whether this one was accepted.
    pub fn notify_task_completed(&self, id: TaskId) -> bool {
        self.core.notify_task_completed(id)
    }

    /// The task at the head of the queue, which is running or about to run.
    pub fn current_task(&self) -> Option<TaskView> {
        self.core.lock_queue().head().map(ReplayTask::view)
    }

    /// The queued task that will replay `wallet`, if any.
    pub fn pending_task_for(&self, wallet: &TrackedWallet) -> Option<TaskView> {
        self.core
            .lock_queue()
            .claimant(wallet.id())
            .map(ReplayTask::view)
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn state(&self) -> SchedulerState {
        self.core.lock_queue().state()
    }

    pub fn queued(&self) -> usize {
        self.core.lock_queue().len()
    }

    /// Resumes an ordinary download on the existing chain, without touching storage.
    pub async fn run_regular_download(&self) -> Result<(), ReplayError> {
        let mut stack = self.stack.lock().await;
        if self.is_shut_down() {
            return Err(ReplayError::ShutDown);
        }
        let stack = stack.as_mut().ok_or(ReplayError::NoChain)?;

        if !stack.network.is_running() {
            stack
                .network
                .start()
                .await
                .map_err(ReplayError::at(ReplayStep::StartNetwork))?;
        }
        info!(
            best_height = u32::from(stack.best_height()),
            "Resuming chain download"
        );
        stack
            .network
            .resume_download(Arc::new(RegularDownload))
            .await
            .map_err(ReplayError::at(ReplayStep::ResumeDownload))
    }

    /// Advances the scheduler: retires a completed task, then dispatches the next one.
    pub(crate) async fn tick(&self) {
        if self.is_shut_down() {
            return;
        }

        let task = {
            let mut queue = self.core.lock_queue();
            if let Some(retired) = queue.retire() {
                info!(task = %retired.id(), remaining = queue.len(), "Replay task retired");
            }
            queue.dispatch(Instant::now())
        };

        if let Some(task) = task {
            info!(
                task = %task.id(),
                start_height = u32::from(task.start_height()),
                "Starting replay"
            );
            match self.execute(&task).await {
                Ok(()) => (),
                Err(ReplayError::ShutDown) => {
                    self.core.lock_queue().abandon(task.id());
                    info!(task = %task.id(), "Replay left queued until the next start");
                }
                Err(e) => self.core.execute_failed(&task, &e),
            }
        }
    }

    /// Rebuilds the chain at the task's start checkpoint and resumes downloading.
    ///
    /// Returns once the download has been started; it completes asynchronously.
    async fn execute(&self, task: &ReplayTask) -> Result<(), ReplayError> {
        let mut slot = self.stack.lock().await;
        // `shutdown` may have torn the chain down while this waited for it.
        if self.is_shut_down() {
            return Err(ReplayError::ShutDown);
        }
        let best_before = slot.as_ref().map(ChainStack::best_height);

        for wallet in task.wallets() {
            wallet.update(|sync| sync.busy_label = Some(BusyLabel::Downloading));
        }

        // A previous failed attempt may already have discarded the old stack.
        if let Some(mut old) = slot.take() {
            if let Err(e) = old.network.stop_and_wait().await {
                *slot = Some(old);
                return Err(ReplayError::at(ReplayStep::StopNetwork)(e));
            }
            old.store
                .close()
                .await
                .map_err(ReplayError::at(ReplayStep::CloseStore))?;
        }

        let store = self
            .client
            .create_store(task.start())
            .await
            .map_err(ReplayError::at(ReplayStep::CreateStore))?;
        let chain = self
            .client
            .build_chain(&store, task.wallets())
            .await
            .map_err(ReplayError::at(ReplayStep::BuildChain))?;
        let mut network = self
            .client
            .build_network(&chain)
            .await
            .map_err(ReplayError::at(ReplayStep::BuildNetwork))?;

        for wallet in task.wallets() {
            network.add_listener(Arc::new(WalletProgress::new(
                wallet.clone(),
                task.start_height(),
                best_before,
            )));
        }

        // From here on the stack is kept even if starting it fails, so that the next
        // attempt shuts it down cleanly.
        let stack = slot.insert(ChainStack::new(store, chain, network));
        stack
            .network
            .start()
            .await
            .map_err(ReplayError::at(ReplayStep::StartNetwork))?;

        let progress = ReplayProgress::new(
            Arc::downgrade(&self.core),
            task.id(),
            task.start_height(),
            best_before,
        );
        stack
            .network
            .resume_download(Arc::new(progress))
            .await
            .map_err(ReplayError::at(ReplayStep::ResumeDownload))?;

        debug!(task = %task.id(), "Replay download started");
        Ok(())
    }
}
