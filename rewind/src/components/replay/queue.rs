//! The FIFO of accepted replay tasks, and the state of the task at its head.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::task::{ReplayTask, TaskId};
use crate::components::wallet::WalletId;

/// What the scheduler is doing with the head-of-queue task.
///
/// Transitions:
/// - `Idle -> Running` when the driver dispatches the head task.
/// - `Running -> Backoff | Stalled` when executing the task fails.
/// - `Backoff -> Running` when the driver retries it.
/// - `Running | Backoff | Stalled -> Completing` when its download completes.
/// - `Completing -> Retiring` once its wallets are no longer busy.
/// - `Retiring -> Idle` when the driver pops it off the queue.
/// - `Running -> Idle` when the scheduler shuts down before the task's chain is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running {
        task: TaskId,
        /// Failed attempts so far.
        failures: u32,
    },
    Completing {
        task: TaskId,
    },
    Retiring {
        task: TaskId,
    },
    Backoff {
        task: TaskId,
        failures: u32,
        retry_at: Instant,
    },
    Stalled {
        task: TaskId,
        failures: u32,
    },
}

impl SchedulerState {
    /// The head task this state refers to, if any.
    pub fn task(&self) -> Option<TaskId> {
        match *self {
            SchedulerState::Idle => None,
            SchedulerState::Running { task, .. }
            | SchedulerState::Completing { task }
            | SchedulerState::Retiring { task }
            | SchedulerState::Backoff { task, .. }
            | SchedulerState::Stalled { task, .. } => Some(task),
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Running { .. } => write!(f, "running"),
            SchedulerState::Completing { .. } => write!(f, "completing"),
            SchedulerState::Retiring { .. } => write!(f, "retiring"),
            SchedulerState::Backoff { .. } => write!(f, "backoff"),
            SchedulerState::Stalled { .. } => write!(f, "stalled"),
        }
    }
}

/// How the scheduler reacts when executing a task fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which the task is left stalled. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Delay before a failed task is retried. Zero retries on the next tick.
    pub backoff: Duration,
}

/// What happened to a task whose execution failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    Retry { failures: u32, retry_at: Instant },
    Stalled { failures: u32 },
    /// The task was no longer running, e.g. its download completed regardless.
    Ignored,
}

#[derive(Debug)]
pub(crate) struct TaskQueue {
    tasks: VecDeque<ReplayTask>,
    state: SchedulerState,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self {
            tasks: VecDeque::new(),
            state: SchedulerState::Idle,
        }
    }
}

impl TaskQueue {
    pub(crate) fn state(&self) -> SchedulerState {
        self.state
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn head(&self) -> Option<&ReplayTask> {
        self.tasks.front()
    }

    /// The first queued task that still holds `wallet` busy. A retiring head task has
    /// already released its wallets.
    pub(crate) fn claimant(&self, wallet: &WalletId) -> Option<&ReplayTask> {
        let skip = usize::from(matches!(self.state, SchedulerState::Retiring { .. }));
        self.tasks
            .iter()
            .skip(skip)
            .find(|task| task.includes(wallet))
    }

    pub(crate) fn push(&mut self, task: ReplayTask) {
        self.tasks.push_back(task);
    }

    /// Pops the head task if its completion has been observed.
    pub(crate) fn retire(&mut self) -> Option<ReplayTask> {
        let SchedulerState::Retiring { task } = self.state else {
            return None;
        };
        self.state = SchedulerState::Idle;

        match self.tasks.front() {
            Some(head) if head.id() == task => self.tasks.pop_front(),
            _ => None,
        }
    }

    /// Marks the head task as running and returns it, if it is ready to be executed.
    pub(crate) fn dispatch(&mut self, now: Instant) -> Option<ReplayTask> {
        let head = self.tasks.front()?;
        let failures = match self.state {
            SchedulerState::Idle => 0,
            SchedulerState::Backoff {
                task,
                failures,
                retry_at,
            } if task == head.id() && now >= retry_at => failures,
            _ => return None,
        };

        self.state = SchedulerState::Running {
            task: head.id(),
            failures,
        };
        Some(head.clone())
    }

    /// Records that executing `id` failed.
    pub(crate) fn fail(&mut self, id: TaskId, policy: &RetryPolicy, now: Instant) -> FailureOutcome {
        let SchedulerState::Running { task, failures } = self.state else {
            return FailureOutcome::Ignored;
        };
        if task != id {
            return FailureOutcome::Ignored;
        }

        let failures = failures.saturating_add(1);
        if policy.max_retries.is_some_and(|max| failures > max) {
            self.state = SchedulerState::Stalled { task, failures };
            FailureOutcome::Stalled { failures }
        } else {
            let retry_at = now + policy.backoff;
            self.state = SchedulerState::Backoff {
                task,
                failures,
                retry_at,
            };
            FailureOutcome::Retry { failures, retry_at }
        }
    }

    /// Returns the dispatched task `id` to the head of the queue without counting a
    /// failure, so that it is dispatched afresh next time.
    pub(crate) fn abandon(&mut self, id: TaskId) -> bool {
        match self.state {
            SchedulerState::Running { task, .. } if task == id => {
                self.state = SchedulerState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Starts completing the head task, returning it if `id` identifies it and it has
    /// been dispatched.
    pub(crate) fn begin_completion(&mut self, id: TaskId) -> Option<ReplayTask> {
        let head = self.tasks.front()?;
        if head.id() != id {
            return None;
        }

        match self.state {
            SchedulerState::Running { task, .. }
            | SchedulerState::Backoff { task, .. }
            | SchedulerState::Stalled { task, .. }
                if task == id =>
            {
                self.state = SchedulerState::Completing { task };
                Some(head.clone())
            }
            _ => None,
        }
    }

    /// Finishes completing `id`, handing it to the driver for retirement.
    pub(crate) fn finish_completion(&mut self, id: TaskId) -> bool {
        match self.state {
            SchedulerState::Completing { task } if task == id => {
                self.state = SchedulerState::Retiring { task };
                true
            }
            _ => false,
        }
    }
}
