//! # Pipeline Cells
//!
//! A cell is one independently running stage of a pipeline. Every cell owns a
//! [`CellRuntime`] carrying the shared lifecycle (start, stop, termination
//! signal) and its input/output [edges](edge), and supplies only its own
//! processing loop through [`CellBehavior`].
//!
//! The set of cells is closed: [`Cell`] enumerates them and the
//! [`Registry`] creates them by name.
//!
//! ## Example
//!
//! ```rust
//! use tspipe::cell::{stop_signal, CellConfig, Registry};
//! use tspipe::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new(Config::default());
//! let (signal, _watch) = stop_signal();
//!
//! let mut props = CellConfig::new();
//! props.insert("output_format".into(), "ts_packet".into());
//! let cell = registry.create("bytes_converter", signal, &props)?;
//! assert_eq!(cell.name(), "bytes_converter");
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::{PipeError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

/// Byte to packet conversion
pub mod converter;

/// Bounded queues between cells
pub mod edge;

/// Pass-through cell
pub mod identity;

/// Reader cells (file, multicast)
pub mod reader;

/// Cell registry
pub mod registry;

/// Shared cell lifecycle
pub mod runtime;

/// Units and formats
pub mod unit;

/// VBV analysis cell
pub mod vbv;

/// Writer cells
pub mod writer;

pub use converter::BytesConverter;
pub use edge::{edge, EdgeReceiver, EdgeSender, EDGE_BUFFER};
pub use identity::Identity;
pub use reader::{FileReader, McastReader};
pub use registry::{CellCategory, Registry};
pub use runtime::{stop_signal, CellConfig, CellRuntime, CellState, StopSignal, StopWatch};
pub use unit::{Format, Payload, Unit};
pub use vbv::VbvCell;
pub use writer::FileWriter;

/// Processing supplied by a concrete cell on top of its [`CellRuntime`].
#[async_trait]
pub trait CellBehavior: Send {
    fn runtime(&self) -> &CellRuntime;

    fn runtime_mut(&mut self) -> &mut CellRuntime;

    /// Main loop; returns when input is exhausted, a stop was requested, or on error.
    async fn process(&mut self) -> Result<()>;

    /// Runs after `process`, whatever its outcome.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Start, process, finish, stop. The stop (and so the termination signal)
/// happens on every path once the start succeeded.
pub async fn drive(cell: &mut dyn CellBehavior) -> Result<()> {
    let name = cell.runtime().name();
    if let Err(e) = cell.runtime_mut().start() {
        warn!("[{}] {}", name, e);
        return Err(e);
    }

    let result = match cell.process().await {
        Err(PipeError::Cancelled) => {
            debug!("[{}] stop requested", name);
            Ok(())
        }
        Err(PipeError::EdgeClosed) => {
            info!("[{}] downstream closed", name);
            Ok(())
        }
        Err(e) => {
            error!("[{}] {}", name, e);
            Err(e)
        }
        ok => ok,
    };

    if let Err(e) = cell.finish().await {
        error!("[{}] finish: {}", name, e);
    }
    if let Err(e) = cell.runtime_mut().stop() {
        warn!("[{}] {}", name, e);
    }
    result
}

/// Every cell kind the registry can build.
#[derive(Debug)]
pub enum Cell {
    FileReader(FileReader),
    McastReader(McastReader),
    BytesConverter(BytesConverter),
    Identity(Identity),
    FileWriter(FileWriter),
    Vbv(VbvCell),
}

impl Cell {
    fn behavior(&self) -> &dyn CellBehavior {
        match self {
            Cell::FileReader(c) => c,
            Cell::McastReader(c) => c,
            Cell::BytesConverter(c) => c,
            Cell::Identity(c) => c,
            Cell::FileWriter(c) => c,
            Cell::Vbv(c) => c,
        }
    }

    fn behavior_mut(&mut self) -> &mut dyn CellBehavior {
        match self {
            Cell::FileReader(c) => c,
            Cell::McastReader(c) => c,
            Cell::BytesConverter(c) => c,
            Cell::Identity(c) => c,
            Cell::FileWriter(c) => c,
            Cell::Vbv(c) => c,
        }
    }

    pub fn runtime(&self) -> &CellRuntime {
        self.behavior().runtime()
    }

    pub fn runtime_mut(&mut self) -> &mut CellRuntime {
        self.behavior_mut().runtime_mut()
    }

    pub fn id(&self) -> &str {
        self.runtime().id()
    }

    pub fn name(&self) -> &'static str {
        self.runtime().name()
    }

    pub fn connect(&mut self, next: &mut Cell) -> Result<()> {
        self.runtime_mut().connect(next.runtime_mut())
    }

    pub fn start(&mut self) -> Result<()> {
        self.runtime_mut().start()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.runtime_mut().stop()
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.runtime().stop_token()
    }

    /// Runs the cell to completion.
    pub async fn run(mut self) -> Result<()> {
        drive(self.behavior_mut()).await
    }
}

/// Value of a required property.
pub(crate) fn required<'a>(config: &'a CellConfig, cell: &str, key: &str) -> Result<&'a str> {
    config
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| PipeError::InvalidCellConfig(format!("[{}] missing {}", cell, key)))
}

pub(crate) fn parse_bool(cell: &str, key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(PipeError::InvalidCellConfig(format!(
            "[{}] invalid {} {}",
            cell, key, other
        ))),
    }
}

/// PID in decimal or `0x` hexadecimal, at most 0x1fff.
pub(crate) fn parse_pid(cell: &str, key: &str, value: &str) -> Result<u16> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    };
    match parsed {
        Ok(pid) if pid <= crate::format::ts::MAX_PID => Ok(pid),
        _ => Err(PipeError::InvalidCellConfig(format!(
            "[{}] invalid {} pid {}",
            cell, key, value
        ))),
    }
}

/// Shared shape of the per-cell help text.
pub(crate) fn help_text(
    short: &str,
    inputs: &[Format],
    outputs: &[Format],
    properties: &[(&str, &str)],
) -> String {
    let mut text = format!(
        "{}\n\tIO:\n\t  ->cell: {}\n\t  cell->: {}\n\tProperties:\n",
        short,
        unit::format_list(inputs),
        unit::format_list(outputs)
    );
    for (key, description) in properties {
        text.push_str(&format!("\t  {}: {}\n", key, description));
    }
    text
}

/// Signature shared by every cell constructor.
pub type CellCtor = fn(StopSignal, &CellConfig, &Config) -> Result<Cell>;
