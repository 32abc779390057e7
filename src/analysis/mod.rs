//! # Stream Timing Analysis
//!
//! VBV analysis compares, for every PES unit, its decode time stamp with the
//! PCR at which its bytes arrived. A negative margin means the unit arrived
//! after it should have been decoded.

/// Report rendering
pub mod report;

/// DTS versus PCR measurement
pub mod vbv;

pub use report::{write_report, ReportFormat};
pub use vbv::{interpolate_pcr, PcrSample, VbvAnalyzer, VbvConfig, VbvRecord};
