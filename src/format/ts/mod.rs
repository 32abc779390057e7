//! # MPEG Transport Stream (TS) Support
//!
//! The decoding side needed for timing analysis:
//!
//! - TS packet header, adaptation field and PCR decoding
//! - Structural validity checks on packets
//! - PES header parsing (PTS/DTS)
//! - Per-PID PES reassembly
//!
//! A small builder synthesizes packets for tests and tooling.
//!
//! ## Example Usage
//!
//! ```rust
//! use tspipe::format::ts::{packetize, Accumulator, PESHeader, PESPacket};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let unit = PESPacket::new(0xe0, vec![0u8; 300]).with_pts(3600).with_dts(0);
//! let mut packets = packetize(0x101, &unit.to_bytes()?, 0)?;
//! packets.extend(packetize(0x101, &unit.to_bytes()?, 2)?);
//!
//! let mut acc = Accumulator::new();
//! for pkt in &packets {
//!     if let Some(done) = acc.add(pkt)? {
//!         let header = PESHeader::parse(&done.data)?;
//!         assert_eq!(header.decode_time(), Some(0));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Per-PID PES reassembly
pub mod accumulator;

/// Packet synthesis for tests and tooling
pub mod builder;

/// TS packet decoding
pub mod packet;

/// PES header parsing and writing
pub mod pes;

/// Core TS types and constants
pub mod types;

pub use accumulator::{Accumulator, AccumulatorResult};
pub use builder::{packetize, to_capture, TsPacketBuilder};
pub use packet::TsPacket;
pub use pes::{PESHeader, PESPacket};
pub use types::{
    AdaptationField,
    TSHeader,
    MAX_PID,
    PCR_HZ,
    PCR_PER_PTS,
    PID_NULL,
    PTS_HZ,
    SYNC_BYTE,
    TS_PACKET_SIZE,
};
