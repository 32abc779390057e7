//! Synthesizes transport stream packets.
//!
//! Used to build captures for tests and for tooling that needs a known
//! stream layout (PCR cadence, PES boundaries) without a real encoder.

use super::packet::TsPacket;
use super::types::*;
use crate::error::{PipeError, Result};
use bytes::{BufMut, BytesMut};

const MAX_PAYLOAD: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;

/// Builder for a single [`TsPacket`].
///
/// Any room the payload leaves is filled with adaptation field stuffing.
#[derive(Debug, Clone, Default)]
pub struct TsPacketBuilder {
    header: TSHeader,
    pcr: Option<u64>,
    random_access: bool,
    payload: Vec<u8>,
}

impl TsPacketBuilder {
    pub fn new(pid: u16) -> Self {
        Self {
            header: TSHeader {
                pid: pid & MAX_PID,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn payload_unit_start(mut self, pusi: bool) -> Self {
        self.header.payload_unit_start = pusi;
        self
    }

    pub fn continuity_counter(mut self, cc: u8) -> Self {
        self.header.continuity_counter = cc & 0x0f;
        self
    }

    pub fn transport_error(mut self, error: bool) -> Self {
        self.header.transport_error = error;
        self
    }

    pub fn random_access(mut self, random_access: bool) -> Self {
        self.random_access = random_access;
        self
    }

    /// Sets a PCR in 27 MHz ticks.
    pub fn pcr(mut self, pcr: u64) -> Self {
        self.pcr = Some(pcr);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Largest payload a packet can carry given the adaptation field contents.
    pub fn payload_capacity(&self) -> usize {
        if self.pcr.is_some() {
            MAX_PAYLOAD - 8
        } else if self.random_access {
            MAX_PAYLOAD - 2
        } else {
            MAX_PAYLOAD
        }
    }

    pub fn build(self) -> Result<TsPacket> {
        if self.payload.len() > self.payload_capacity() {
            return Err(PipeError::InvalidData(format!(
                "Payload of {} bytes exceeds packet capacity {}",
                self.payload.len(),
                self.payload_capacity()
            )));
        }

        let af_bytes = MAX_PAYLOAD - self.payload.len();
        let mut header = self.header.clone();
        header.adaptation_field_exists = af_bytes > 0;
        header.contains_payload = !self.payload.is_empty();

        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        header.write_to(&mut buf);

        if af_bytes > 0 {
            buf.put_u8((af_bytes - 1) as u8);
            if af_bytes > 1 {
                let mut flags = 0u8;
                if self.random_access {
                    flags |= 0x40;
                }
                if self.pcr.is_some() {
                    flags |= 0x10;
                }
                buf.put_u8(flags);
                if let Some(pcr) = self.pcr {
                    write_clock_reference(&mut buf, pcr);
                }
                let stuffing = TS_PACKET_SIZE - self.payload.len() - buf.len();
                buf.put_bytes(0xff, stuffing);
            }
        }
        buf.put_slice(&self.payload);

        TsPacket::from_slice(&buf)
    }
}

/// Splits a PES unit into packets on `pid`; the first one carries the
/// payload-unit-start flag. Continuity counters start at `cc`.
pub fn packetize(pid: u16, pes: &[u8], cc: u8) -> Result<Vec<TsPacket>> {
    let mut packets = Vec::with_capacity(pes.len() / MAX_PAYLOAD + 1);
    let mut cc = cc;
    for (i, chunk) in pes.chunks(MAX_PAYLOAD).enumerate() {
        packets.push(
            TsPacketBuilder::new(pid)
                .payload_unit_start(i == 0)
                .continuity_counter(cc)
                .payload(chunk)
                .build()?,
        );
        cc = cc.wrapping_add(1) & 0x0f;
    }
    Ok(packets)
}

/// Concatenates packets into a raw capture.
pub fn to_capture(packets: &[TsPacket]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packets.len() * TS_PACKET_SIZE);
    for pkt in packets {
        out.extend_from_slice(pkt.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_capacity_errors() {
        let too_big = vec![0u8; MAX_PAYLOAD - 7];
        assert!(TsPacketBuilder::new(1).pcr(0).payload(&too_big).build().is_err());
        assert!(TsPacketBuilder::new(1)
            .pcr(0)
            .payload(&too_big[1..])
            .build()
            .is_ok());
    }

    #[test]
    fn test_single_stuffing_byte() {
        let payload = vec![7u8; MAX_PAYLOAD - 1];
        let pkt = TsPacketBuilder::new(0x30).payload(&payload).build().unwrap();
        pkt.check_errors().unwrap();
        assert!(pkt.has_adaptation_field());
        assert_eq!(pkt.adaptation_field().unwrap(), None);
        assert_eq!(pkt.payload().unwrap(), &payload[..]);
    }

    #[test]
    fn test_random_access_flag() {
        let builder = TsPacketBuilder::new(0x31).random_access(true);
        assert_eq!(builder.payload_capacity(), MAX_PAYLOAD - 2);
        let pkt = builder.payload(&[1; 10]).build().unwrap();
        let af = pkt.adaptation_field().unwrap().unwrap();
        assert!(af.random_access);
        assert_eq!(af.pcr, None);
        assert_eq!(pkt.payload().unwrap(), &[1; 10]);
    }

    #[test]
    fn test_packetize() {
        let pes: Vec<u8> = (0..400u32).map(|i| i as u8).collect();
        let packets = packetize(0x101, &pes, 15).unwrap();
        assert_eq!(packets.len(), 3);
        assert!(packets[0].payload_unit_start());
        assert!(!packets[1].payload_unit_start());
        assert_eq!(packets[1].continuity_counter(), 0);

        let joined: Vec<u8> = packets
            .iter()
            .flat_map(|p| p.payload().unwrap().to_vec())
            .collect();
        assert_eq!(joined, pes);
        assert_eq!(to_capture(&packets).len(), 3 * TS_PACKET_SIZE);
    }
}
