use super::edge::{edge, EdgeReceiver, EdgeSender};
use super::unit::Unit;
use crate::error::{PipeError, Result};
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Property key naming a cell instance.
pub const CONFIG_ID: &str = "id";

/// Cell properties from a pipeline expression, `key=value` pairs.
pub type CellConfig = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Created,
    Running,
    Stopped,
}

/// Publishing half of a cell's termination signal.
pub type StopSignal = watch::Sender<CellState>;

/// Observing half of a cell's termination signal.
pub type StopWatch = watch::Receiver<CellState>;

/// A fresh termination signal for one cell.
pub fn stop_signal() -> (StopSignal, StopWatch) {
    watch::channel(CellState::Created)
}

fn generate_id(name: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("{}-{}", name, COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Lifecycle and I/O shared by every cell.
///
/// Concrete cells own one of these and only supply their processing loop.
#[derive(Debug)]
pub struct CellRuntime {
    name: &'static str,
    id: String,
    state: CellState,
    signal: StopSignal,
    cancel: CancellationToken,
    input: Option<EdgeReceiver>,
    output: Option<EdgeSender>,
}

impl CellRuntime {
    pub fn new(name: &'static str, signal: StopSignal, config: &CellConfig) -> Self {
        let id = config
            .get(CONFIG_ID)
            .cloned()
            .unwrap_or_else(|| generate_id(name));
        Self {
            name,
            id,
            state: CellState::Created,
            signal,
            cancel: CancellationToken::new(),
            input: None,
            output: None,
        }
    }

    /// Registry name of the cell kind.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn running(&self) -> bool {
        self.state == CellState::Running
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state == CellState::Running {
            return Err(PipeError::CellAlreadyStarted(self.id.clone()));
        }
        self.state = CellState::Running;
        self.signal.send_replace(CellState::Running);
        debug!("[{}] {} started", self.name, self.id);
        Ok(())
    }

    /// Stops the cell, fires its termination signal and closes its output.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != CellState::Running {
            return Err(PipeError::CellAlreadyStopped(self.id.clone()));
        }
        self.state = CellState::Stopped;
        if let Some(output) = self.output.as_mut() {
            output.close();
        }
        self.signal.send_replace(CellState::Stopped);
        debug!("[{}] {} stopped", self.name, self.id);
        Ok(())
    }

    /// Token that asks this cell to stop at its next suspension point.
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Links this cell's output to `next`'s input with a new edge.
    pub fn connect(&mut self, next: &mut CellRuntime) -> Result<()> {
        if self.output.is_some() {
            return Err(PipeError::FailedToConnectCell(format!(
                "{} already has an output",
                self.id
            )));
        }
        if next.input.is_some() {
            return Err(PipeError::FailedToConnectCell(format!(
                "{} already has an input",
                next.id
            )));
        }
        let (tx, rx) = edge(&self.id, &next.id);
        debug!("connect {} -> {} via {}", self.id, next.id, tx.info().id);
        self.output = Some(tx);
        next.input = Some(rx);
        Ok(())
    }

    /// Next input unit; `None` when input is exhausted, absent, or a stop was requested.
    pub async fn get_input(&mut self) -> Option<Unit> {
        let input = self.input.as_mut()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            unit = input.recv() => unit,
        }
    }

    /// Pushes a unit downstream, waiting while the edge is full.
    ///
    /// Without an output edge the unit is discarded.
    pub async fn put_output(&mut self, unit: Unit) -> Result<()> {
        let Some(output) = self.output.as_ref() else {
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipeError::Cancelled),
            sent = output.send(unit) => sent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn runtime(config: &CellConfig) -> (CellRuntime, StopWatch) {
        let (signal, watch) = stop_signal();
        (CellRuntime::new("identity", signal, config), watch)
    }

    #[test]
    fn test_id_from_config_or_generated() {
        let mut config = CellConfig::new();
        config.insert(CONFIG_ID.into(), "first".into());
        let (named, _) = runtime(&config);
        assert_eq!(named.id(), "first");

        let (a, _) = runtime(&CellConfig::new());
        let (b, _) = runtime(&CellConfig::new());
        assert!(a.id().starts_with("identity-"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (mut cell, watch) = runtime(&CellConfig::new());
        assert_eq!(cell.state(), CellState::Created);
        assert!(matches!(cell.stop(), Err(PipeError::CellAlreadyStopped(_))));

        cell.start().unwrap();
        assert_eq!(*watch.borrow(), CellState::Running);
        assert!(matches!(cell.start(), Err(PipeError::CellAlreadyStarted(_))));

        cell.stop().unwrap();
        assert_eq!(*watch.borrow(), CellState::Stopped);
        let err = cell.stop().unwrap_err();
        assert!(err.is_lifecycle_misuse());

        // Stopped cells may be started again
        cell.start().unwrap();
        assert!(cell.running());
    }

    #[test]
    fn test_connect_rejects_second_edge() {
        let (mut a, _) = runtime(&CellConfig::new());
        let (mut b, _) = runtime(&CellConfig::new());
        let (mut c, _) = runtime(&CellConfig::new());
        a.connect(&mut b).unwrap();
        assert!(a.has_output());
        assert!(b.has_input());
        assert!(matches!(
            a.connect(&mut c),
            Err(PipeError::FailedToConnectCell(_))
        ));
        assert!(matches!(
            c.connect(&mut b),
            Err(PipeError::FailedToConnectCell(_))
        ));
        b.connect(&mut c).unwrap();
    }

    #[tokio::test]
    async fn test_stop_closes_output() {
        let (mut a, _) = runtime(&CellConfig::new());
        let (mut b, _) = runtime(&CellConfig::new());
        a.connect(&mut b).unwrap();
        a.start().unwrap();
        a.put_output(Unit::new(vec![1u8])).await.unwrap();
        a.stop().unwrap();

        assert!(b.get_input().await.is_some());
        assert!(b.get_input().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_request_interrupts_waits() {
        let (mut a, _) = runtime(&CellConfig::new());
        let (mut b, _) = runtime(&CellConfig::new());
        a.connect(&mut b).unwrap();

        b.request_stop();
        assert!(b.stop_requested());
        assert!(b.get_input().await.is_none());

        a.request_stop();
        assert!(matches!(
            a.put_output(Unit::new(vec![0u8])).await,
            Err(PipeError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_output_without_edge_is_discarded() {
        let (mut a, _) = runtime(&CellConfig::new());
        a.put_output(Unit::new(vec![0u8])).await.unwrap();
        assert!(a.get_input().await.is_none());
    }
}
