/// MPEG transport stream decoding and PES reassembly
pub mod ts;

pub use self::ts::{Accumulator, TsPacket};
