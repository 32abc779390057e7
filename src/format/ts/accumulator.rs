use super::packet::TsPacket;
use crate::error::Result;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;

/// Bytes of one completed unit on a PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorResult {
    pub pid: u16,
    pub data: Bytes,
}

/// Decides whether a packet starts a new unit, closing the buffered one.
pub type AccumulatorFinish = fn(&TsPacket) -> Result<bool>;

/// Default finish condition: a valid packet with the payload-unit-start flag.
pub fn default_finish(pkt: &TsPacket) -> Result<bool> {
    pkt.check_errors()?;
    Ok(pkt.payload_unit_start())
}

/// Reassembles PES units per PID from transport stream packets.
///
/// Payload bytes are appended in arrival order. When the finish condition
/// fires and the PID's buffer is non-empty, the buffered bytes are handed
/// back and the packet's own payload opens the next unit.
#[derive(Debug)]
pub struct Accumulator {
    finish: AccumulatorFinish,
    payloads: HashMap<u16, BytesMut>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self::with_finish(default_finish)
    }

    pub fn with_finish(finish: AccumulatorFinish) -> Self {
        Self {
            finish,
            payloads: HashMap::new(),
        }
    }

    /// Adds a packet; returns the previously accumulated unit when this
    /// packet completes it.
    ///
    /// A packet failing the finish check discards the partial data of its PID.
    pub fn add(&mut self, pkt: &TsPacket) -> Result<Option<AccumulatorResult>> {
        let pid = pkt.pid();
        let done = match (self.finish)(pkt) {
            Ok(done) => done,
            Err(e) => {
                self.reset_pid(pid);
                return Err(e);
            }
        };

        let buffer = self.payloads.entry(pid).or_default();
        let mut result = None;
        if done && !buffer.is_empty() {
            result = Some(AccumulatorResult {
                pid,
                data: buffer.split().freeze(),
            });
        }
        if let Some(payload) = pkt.payload() {
            buffer.extend_from_slice(payload);
        }
        Ok(result)
    }

    /// Bytes currently buffered for `pid`.
    pub fn pending(&self, pid: u16) -> usize {
        self.payloads.get(&pid).map_or(0, |b| b.len())
    }

    pub fn reset_pid(&mut self, pid: u16) {
        if let Some(buffer) = self.payloads.get_mut(&pid) {
            buffer.clear();
        }
    }

    pub fn reset(&mut self) {
        for buffer in self.payloads.values_mut() {
            buffer.clear();
        }
    }
}
