//! Task launcher - runs setup operations concurrently and reports one outcome per slot

use crate::core::{Outcome, SkipReason, TaskSlot};
use crate::execution::aggregate::OutcomeAggregator;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A slot and the outcome it produced
pub type Completion = (TaskSlot, Outcome);

/// Create a launcher and the aggregator that waits for every slot in `slots`
pub fn task_group(slots: &[TaskSlot]) -> (TaskLauncher, OutcomeAggregator) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskLauncher { tx }, OutcomeAggregator::new(slots.to_vec(), rx))
}

/// Starts tasks without blocking and publishes each task's outcome on the
/// shared completion channel
///
/// Drop the launcher before collecting so the aggregator can tell when no
/// more outcomes can arrive.
#[derive(Debug, Clone)]
pub struct TaskLauncher {
    tx: mpsc::UnboundedSender<Completion>,
}

impl TaskLauncher {
    /// Run `task` in the background and report its outcome for `slot`.
    /// A task that panics reports a failure.
    pub fn launch<F>(&self, slot: TaskSlot, task: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        debug!("Launching {}", slot);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = match tokio::spawn(task).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Task {} did not complete: {}", slot, e);
                    Outcome::failed(slot, format!("task panicked: {}", e))
                }
            };
            Self::publish(&tx, slot, outcome);
        });
    }

    /// Report `slot` as skipped without running anything
    pub fn skip(&self, slot: TaskSlot, reason: SkipReason) {
        debug!("Skipping {} ({})", slot, reason);
        Self::publish(&self.tx, slot, Outcome::Skipped { reason });
    }

    fn publish(tx: &mpsc::UnboundedSender<Completion>, slot: TaskSlot, outcome: Outcome) {
        if tx.send((slot, outcome)).is_err() {
            error!("Outcome for {} published after aggregation finished", slot);
        }
    }
}
