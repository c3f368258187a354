use crate::error::{CommandError, CommandResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::oneshot;

/// Sequential identifier of an enqueued command, unique per queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Type-erased future of a command, including delivery of its result.
pub(crate) type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub(crate) struct Job {
    pub id: TaskId,
    pub name: &'static str,
    pub future: JobFuture,
}

/// How waiting on a handle ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Succeeded(T),
    Failed(CommandError),
    /// The wait budget ran out. The command may still be running and its side effects
    /// are unknown.
    TimedOut,
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }
}

/// Receiving end of one enqueued command.
pub struct TaskHandle<T> {
    id: TaskId,
    name: &'static str,
    receiver: oneshot::Receiver<CommandResult<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        id: TaskId,
        name: &'static str,
        receiver: oneshot::Receiver<CommandResult<T>>,
    ) -> Self {
        Self { id, name, receiver }
    }

    /// A handle that is already resolved with `error`.
    pub(crate) fn resolved(id: TaskId, name: &'static str, error: CommandError) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Err(error));
        Self { id, name, receiver }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits up to `timeout` for the command's result.
    ///
    /// Timing out does not cancel the command.
    pub async fn wait(self, timeout: Duration) -> TaskOutcome<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(Ok(value))) => TaskOutcome::Succeeded(value),
            Ok(Ok(Err(error))) => TaskOutcome::Failed(error),
            // Sender dropped without a result: the command panicked or was cancelled.
            Ok(Err(_)) => TaskOutcome::Failed(CommandError::Aborted),
            Err(_) => {
                tracing::warn!(
                    "Gave up waiting on {} ({}) after {:?}",
                    self.id,
                    self.name,
                    timeout
                );
                TaskOutcome::TimedOut
            }
        }
    }

    /// Waits without a budget.
    pub async fn join(self) -> CommandResult<T> {
        self.receiver.await.unwrap_or(Err(CommandError::Aborted))
    }
}

/// Counters describing a queue's lifetime so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    pub rejected: u64,
    pub in_flight: usize,
}
