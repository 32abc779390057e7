use super::unit::Unit;
use crate::error::{PipeError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Units an edge holds before its producer blocks.
pub const EDGE_BUFFER: usize = 10;

/// Unique edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(u64);

impl EdgeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Edge({})", self.0)
    }
}

/// Endpoints of an edge, shared by both halves.
#[derive(Debug)]
pub struct EdgeInfo {
    pub id: EdgeId,
    pub src: String,
    pub dst: String,
}

/// Creates a bounded single-producer/single-consumer edge from `src` to `dst`.
pub fn edge(src: &str, dst: &str) -> (EdgeSender, EdgeReceiver) {
    let info = Arc::new(EdgeInfo {
        id: EdgeId::next(),
        src: src.to_string(),
        dst: dst.to_string(),
    });
    let (tx, rx) = mpsc::channel(EDGE_BUFFER);
    (
        EdgeSender {
            info: info.clone(),
            tx: Some(tx),
        },
        EdgeReceiver { info, rx },
    )
}

/// Producer half. Owns the right to close the edge.
#[derive(Debug)]
pub struct EdgeSender {
    info: Arc<EdgeInfo>,
    tx: Option<mpsc::Sender<Unit>>,
}

impl EdgeSender {
    pub fn info(&self) -> &EdgeInfo {
        &self.info
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Waits for room and enqueues the unit.
    pub async fn send(&self, unit: Unit) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(unit).await.map_err(|_| PipeError::EdgeClosed),
            None => Err(PipeError::EdgeClosed),
        }
    }

    /// Closes the edge; queued units stay readable. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        self.tx.take().is_some()
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct EdgeReceiver {
    info: Arc<EdgeInfo>,
    rx: mpsc::Receiver<Unit>,
}

impl EdgeReceiver {
    pub fn info(&self) -> &EdgeInfo {
        &self.info
    }

    /// Next unit in FIFO order, `None` once the producer closed and the queue drained.
    pub async fn recv(&mut self) -> Option<Unit> {
        self.rx.recv().await
    }

    /// Units currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
