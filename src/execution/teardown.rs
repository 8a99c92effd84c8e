//! Teardown stack - releases acquired resources in reverse order of acquisition

use crate::external::OperationError;
use std::future::Future;
use std::pin::Pin;
use tracing::{error, info, warn};

pub type CleanupFuture = Pin<Box<dyn Future<Output = Result<(), OperationError>> + Send>>;
type CleanupAction = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// A cleanup action and the resource it releases
pub struct TeardownEntry {
    resource: String,
    action: CleanupAction,
}

impl TeardownEntry {
    pub fn new<F, Fut>(resource: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        Self {
            resource: resource.into(),
            action: Box::new(move || Box::pin(action()) as CleanupFuture),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl std::fmt::Debug for TeardownEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownEntry")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Result of releasing one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub resource: String,
    /// Cleanup failure, if any. Logged, never propagated.
    pub error: Option<String>,
}

/// Everything an unwind released, in the order it happened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub released: Vec<ReleaseRecord>,
}

impl TeardownReport {
    pub fn order(&self) -> Vec<&str> {
        self.released.iter().map(|r| r.resource.as_str()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReleaseRecord> {
        self.released.iter().filter(|r| r.error.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.released.is_empty()
    }
}

/// Ordered record of acquired resources
///
/// Entries are pushed only once their acquisition has succeeded. The stack
/// does no conditional logic of its own.
#[derive(Debug, Default)]
pub struct TeardownStack {
    entries: Vec<TeardownEntry>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TeardownEntry) {
        info!("Registered teardown for {}", entry.resource);
        self.entries.push(entry);
    }

    /// Resources currently held, oldest first
    pub fn resources(&self) -> Vec<&str> {
        self.entries.iter().map(TeardownEntry::resource).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every resource, newest first
    pub async fn unwind_all(&mut self) -> TeardownReport {
        self.unwind_all_with(|_| {}).await
    }

    /// Release every resource, newest first, calling `on_release` after each.
    ///
    /// A failing cleanup is logged and the unwind continues with the next
    /// entry. A second call finds the stack empty and does nothing.
    pub async fn unwind_all_with<F>(&mut self, mut on_release: F) -> TeardownReport
    where
        F: FnMut(&ReleaseRecord),
    {
        let mut report = TeardownReport::default();

        while let Some(entry) = self.entries.pop() {
            info!("Releasing {}", entry.resource);
            let error = match (entry.action)().await {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to release {}: {}", entry.resource, e);
                    Some(e.to_string())
                }
            };

            let record = ReleaseRecord {
                resource: entry.resource,
                error,
            };
            on_release(&record);
            report.released.push(record);
        }

        report
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            error!(
                "Teardown stack dropped with {} unreleased resource(s): {}",
                self.entries.len(),
                self.resources().join(", ")
            );
        }
    }
}
