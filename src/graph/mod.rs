//! # Pipeline Graph
//!
//! A graph is built from a pipeline expression such as
//!
//! ```text
//! file_reader name=in.ts ! bytes_converter output_format=ts_packet ! vbv pcr=0x100
//! ```
//!
//! Each `!`-separated segment names a registered cell followed by its
//! `key=value` properties. Adjacent cells are connected by edges and every
//! cell runs as its own task. Stopping the first cell drains the whole
//! pipeline: each cell ends once its input is closed and closes its output in
//! turn.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tspipe::cell::Registry;
//! use tspipe::graph::Graph;
//! use tspipe::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new(Config::default());
//!     let graph = Graph::new(
//!         "file_reader name=in.ts ! bytes_converter output_format=ts_packet ! vbv pcr=0x100",
//!         &registry,
//!     )?;
//!     let summary = graph.run().await;
//!     println!("{} cells stopped", summary.stopped);
//!     Ok(())
//! }
//! ```

use crate::cell::{stop_signal, Cell, CellState, Registry, StopWatch};
use crate::error::{PipeError, Result};
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

/// Pipeline expression parsing
pub mod parser;

pub use parser::{parse_pipeline, CellDescriptor, ParseError};

/// Requests the first cell of a running graph to stop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Outcome of a graph run.
#[derive(Debug, Default)]
pub struct GraphSummary {
    /// Cells whose termination signal was observed
    pub stopped: usize,
    /// Cells that ended with an error, by id
    pub failures: Vec<(String, PipeError)>,
}

impl GraphSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Linear chain of connected cells.
#[derive(Debug)]
pub struct Graph {
    cells: Vec<Cell>,
    watches: Vec<StopWatch>,
}

impl Graph {
    /// Parses, instantiates and connects a pipeline.
    ///
    /// Nothing runs until [`Graph::run`]; any failure here leaves no cell started.
    pub fn new(expr: &str, registry: &Registry) -> Result<Self> {
        let descriptors = parse_pipeline(expr).map_err(|e| {
            if let Some(help) = e.cell.as_deref().and_then(|cell| registry.help(cell)) {
                eprintln!("{}", help);
            }
            PipeError::FailedToBuildGraph(e.to_string())
        })?;
        Self::from_descriptors(&descriptors, registry)
    }

    pub fn from_descriptors(descriptors: &[CellDescriptor], registry: &Registry) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(PipeError::FailedToBuildGraph(String::from(
                "pipeline has no cell",
            )));
        }

        let mut cells = Vec::with_capacity(descriptors.len());
        let mut watches = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let (signal, watch) = stop_signal();
            let cell = registry.create(&descriptor.name, signal, &descriptor.properties)?;
            debug!("created {} ({})", cell.id(), descriptor.name);
            cells.push(cell);
            watches.push(watch);
        }

        for i in 1..cells.len() {
            let (upstream, downstream) = cells.split_at_mut(i);
            upstream[i - 1].connect(&mut downstream[0])?;
        }

        Ok(Self { cells, watches })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell ids in pipeline order.
    pub fn ids(&self) -> Vec<&str> {
        self.cells.iter().map(Cell::id).collect()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self
                .cells
                .first()
                .map(Cell::stop_token)
                .unwrap_or_else(CancellationToken::new),
        }
    }

    /// Runs every cell concurrently and waits until all of them have stopped.
    pub async fn run(self) -> GraphSummary {
        let mut waiters = Vec::with_capacity(self.cells.len());
        let mut tasks = Vec::with_capacity(self.cells.len());

        for (cell, mut watch) in self.cells.into_iter().zip(self.watches) {
            let id = cell.id().to_string();
            let name = cell.name();

            let waiter_id = id.clone();
            waiters.push(tokio::spawn(async move {
                let stopped = watch
                    .wait_for(|state| *state == CellState::Stopped)
                    .await
                    .is_ok();
                if stopped {
                    info!("[{}] {} finished", name, waiter_id);
                } else {
                    warn!("[{}] {} ended without stopping", name, waiter_id);
                }
                stopped
            }));
            tasks.push((id, tokio::spawn(cell.run())));
        }

        let stopped = join_all(waiters)
            .await
            .into_iter()
            .filter(|waiter| matches!(waiter, Ok(true)))
            .count();

        let mut summary = GraphSummary {
            stopped,
            failures: Vec::new(),
        };
        for (id, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_lifecycle_misuse() => warn!("{}: {}", id, e),
                Ok(Err(e)) => summary.failures.push((id, e)),
                Err(e) => {
                    error!("{} task failed: {}", id, e);
                    summary.failures.push((id, PipeError::Join(e.to_string())));
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_and_connect() {
        let registry = Registry::new(Config::default());
        let graph = Graph::new("identity id=a ! identity id=b ! identity id=c", &registry).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.ids(), vec!["a", "b", "c"]);
        assert!(!graph.cells[0].runtime().has_input());
        assert!(graph.cells[0].runtime().has_output());
        assert!(graph.cells[1].runtime().has_input());
        assert!(!graph.cells[2].runtime().has_output());
    }

    #[test]
    fn test_build_failures() {
        let registry = Registry::new(Config::default());
        assert!(matches!(
            Graph::new("identity ! ! identity", &registry),
            Err(PipeError::FailedToBuildGraph(_))
        ));
        assert!(matches!(
            Graph::new("identity ! demuxer", &registry),
            Err(PipeError::CellNotSupported(_))
        ));
        assert!(matches!(
            Graph::new("file_reader size=10", &registry),
            Err(PipeError::InvalidCellConfig(_))
        ));
        assert!(matches!(
            Graph::from_descriptors(&[], &registry),
            Err(PipeError::FailedToBuildGraph(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_without_source_drains() {
        let registry = Registry::new(Config::default());
        let graph = Graph::new("identity ! identity", &registry).unwrap();
        let summary = graph.run().await;
        assert_eq!(summary.stopped, 2);
        assert!(summary.is_success());
    }
}
