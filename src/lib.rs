#![doc(html_root_url = "https://docs.rs/tspipe/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tspipe - MPEG-TS pipelines and VBV analysis
//!
//! `tspipe` runs linear dataflow pipelines over MPEG transport streams and
//! measures, for every PES unit, how far ahead of its decode time stamp it
//! was delivered relative to the program clock (the VBV delay).
//!
//! ## Features
//!
//! ### Pipeline engine
//! - Cells running as independent tasks, connected by bounded edges
//! - Backpressure, cascading shutdown, per-cell termination signals
//! - A registry of cells created by name from a textual expression
//!
//! ### Transport stream
//! - TS packet, adaptation field and PCR decoding
//! - PES header parsing (PTS/DTS)
//! - Per-PID PES reassembly
//!
//! ### Analysis
//! - PCR interpolation per packet
//! - Per-unit DTS vs PCR margins, as text or CSV
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tspipe::cell::Registry;
//! use tspipe::graph::Graph;
//! use tspipe::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new(Config::load()?);
//!     let graph = Graph::new(
//!         "file_reader name=capture.ts ! bytes_converter output_format=ts_packet ! vbv pcr=0x100 pids=0x101",
//!         &registry,
//!     )?;
//!
//!     let stop = graph.stop_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stop.stop();
//!     });
//!
//!     let summary = graph.run().await;
//!     println!("{} cells stopped", summary.stopped);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result`], whose error type [`PipeError`]
//! covers I/O, configuration, graph construction and malformed stream data.

/// VBV timing analysis and reports
pub mod analysis;

/// Pipeline cells, edges and the cell registry
pub mod cell;

/// Configuration module
pub mod config;

/// Error types
pub mod error;

/// Stream formats
pub mod format;

/// Pipeline graphs
pub mod graph;

pub use config::Config;
pub use error::{PipeError, Result};
