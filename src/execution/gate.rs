//! Dependency gate - one-shot signal from an upstream task to a dependent task

use tokio::sync::oneshot;
use tracing::debug;

/// Constructors for a gate between an upstream and a downstream task
pub struct DependencyGate;

impl DependencyGate {
    /// A gate whose writer is held by the upstream task
    pub fn channel() -> (GateWriter, GateReader) {
        let (tx, rx) = oneshot::channel();
        (GateWriter { tx }, GateReader { rx })
    }

    /// A gate already satisfied with "proceed", for when no upstream task runs
    pub fn open() -> GateReader {
        let (writer, reader) = Self::channel();
        writer.write(true);
        reader
    }
}

/// Upstream half. Writing consumes it, so it can be written at most once.
#[derive(Debug)]
pub struct GateWriter {
    tx: oneshot::Sender<bool>,
}

impl GateWriter {
    pub fn write(self, proceed: bool) {
        // The reader may already be gone if the downstream task panicked
        if self.tx.send(proceed).is_err() {
            debug!("dependency gate reader dropped before write");
        }
    }
}

/// Downstream half. Reading consumes it, so it is read at most once.
#[derive(Debug)]
pub struct GateReader {
    rx: oneshot::Receiver<bool>,
}

impl GateReader {
    /// Wait for the upstream decision. A writer dropped without writing
    /// counts as "do not proceed".
    pub async fn read(self) -> bool {
        self.rx.await.unwrap_or(false)
    }

    /// The decision if it has already been written
    #[cfg(test)]
    pub fn try_read(&mut self) -> Option<bool> {
        match self.rx.try_recv() {
            Ok(proceed) => Some(proceed),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(false),
        }
    }
}
