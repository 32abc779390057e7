use std::num::ParseIntError;
use thiserror::Error;

use crate::cell::Format;

#[derive(Error, Debug)]
pub enum PipeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("config error: {0}")]
    Config(String),

    #[error("cell already started: {0}")]
    CellAlreadyStarted(String),

    #[error("cell already stopped: {0}")]
    CellAlreadyStopped(String),

    #[error("cell not supported: {0}")]
    CellNotSupported(String),

    #[error("invalid cell config: {0}")]
    InvalidCellConfig(String),

    #[error("failed to build graph: {0}")]
    FailedToBuildGraph(String),

    #[error("failed to connect cell: {0}")]
    FailedToConnectCell(String),

    #[error("invalid unit format: expected {expected}, found {found}")]
    InvalidUnitFormat { expected: Format, found: Format },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("edge closed")]
    EdgeClosed,

    #[error("cancelled")]
    Cancelled,

    #[error("cell task failed: {0}")]
    Join(String),
}

impl PipeError {
    /// Lifecycle misuse is reported but never fatal to a graph.
    pub fn is_lifecycle_misuse(&self) -> bool {
        matches!(
            self,
            PipeError::CellAlreadyStarted(_) | PipeError::CellAlreadyStopped(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipeError>;
