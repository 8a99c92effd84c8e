//! Outcome aggregator - waits for every setup slot and classifies the result

use crate::core::{Outcome, TaskFailure, TaskSlot};
use crate::execution::launcher::Completion;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Barrier over a fixed set of task slots
pub struct OutcomeAggregator {
    expected: Vec<TaskSlot>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl OutcomeAggregator {
    pub(crate) fn new(expected: Vec<TaskSlot>, rx: mpsc::UnboundedReceiver<Completion>) -> Self {
        Self { expected, rx }
    }

    /// Wait until every expected slot has reported, calling `on_outcome` as
    /// each one arrives
    ///
    /// Slots whose task went away without reporting are recorded as failures.
    pub async fn collect<F>(mut self, mut on_outcome: F) -> AggregateResult
    where
        F: FnMut(TaskSlot, &Outcome),
    {
        let mut outcomes = BTreeMap::new();

        while outcomes.len() < self.expected.len() {
            let Some((slot, outcome)) = self.rx.recv().await else {
                break;
            };
            if !self.expected.contains(&slot) {
                warn!("Ignoring outcome for undeclared slot {}", slot);
                continue;
            }
            if outcomes.contains_key(&slot) {
                warn!("Ignoring second outcome for {}", slot);
                continue;
            }
            on_outcome(slot, &outcome);
            outcomes.insert(slot, outcome);
        }

        for slot in &self.expected {
            outcomes
                .entry(*slot)
                .or_insert_with(|| Outcome::failed(*slot, "task exited without reporting an outcome"));
        }

        AggregateResult { outcomes }
    }
}

/// Outcomes of all setup slots, keyed and ordered by slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    outcomes: BTreeMap<TaskSlot, Outcome>,
}

impl AggregateResult {
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Completion>,
    {
        Self {
            outcomes: outcomes.into_iter().collect(),
        }
    }

    /// The failure in the lowest slot, regardless of completion order
    pub fn first_failure(&self) -> Option<&TaskFailure> {
        self.outcomes.values().find_map(Outcome::failure)
    }

    pub fn is_success(&self) -> bool {
        self.first_failure().is_none()
    }

    pub fn outcome(&self, slot: TaskSlot) -> Option<&Outcome> {
        self.outcomes.get(&slot)
    }

    /// All outcomes in slot order
    pub fn iter(&self) -> impl Iterator<Item = (&TaskSlot, &Outcome)> {
        self.outcomes.iter()
    }

    pub fn into_outcomes(self) -> BTreeMap<TaskSlot, Outcome> {
        self.outcomes
    }
}
