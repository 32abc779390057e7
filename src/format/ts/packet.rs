use super::types::*;
use crate::error::{PipeError, Result};
use std::fmt;

/// One 188-byte transport stream packet.
///
/// The packet owns its bytes and decodes fields on demand. Construction only
/// checks the length; call [`TsPacket::check_errors`] before trusting the
/// header and adaptation field.
#[derive(Clone, PartialEq, Eq)]
pub struct TsPacket {
    data: [u8; TS_PACKET_SIZE],
}

impl fmt::Debug for TsPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsPacket")
            .field("pid", &self.pid())
            .field("pusi", &self.payload_unit_start())
            .field("cc", &self.continuity_counter())
            .finish()
    }
}

impl TsPacket {
    pub fn new(data: [u8; TS_PACKET_SIZE]) -> Self {
        Self { data }
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let data: [u8; TS_PACKET_SIZE] = data.try_into().map_err(|_| {
            PipeError::InvalidData(format!(
                "TS packet must be {} bytes, got {}",
                TS_PACKET_SIZE,
                data.len()
            ))
        })?;
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pid(&self) -> u16 {
        (((self.data[1] & 0x1F) as u16) << 8) | self.data[2] as u16
    }

    pub fn payload_unit_start(&self) -> bool {
        (self.data[1] & 0x40) != 0
    }

    pub fn transport_error(&self) -> bool {
        (self.data[1] & 0x80) != 0
    }

    pub fn has_adaptation_field(&self) -> bool {
        (self.data[3] & 0x20) != 0
    }

    pub fn has_payload(&self) -> bool {
        (self.data[3] & 0x10) != 0
    }

    pub fn continuity_counter(&self) -> u8 {
        self.data[3] & 0x0F
    }

    pub fn header(&self) -> Result<TSHeader> {
        TSHeader::parse(&self.data)
    }

    /// Structural validity: sync byte, error indicator, adaptation field control
    /// and adaptation field length.
    pub fn check_errors(&self) -> Result<()> {
        let header = self.header()?;
        if header.transport_error {
            return Err(PipeError::InvalidData(format!(
                "Transport error indicator set on pid {}",
                header.pid
            )));
        }
        if !header.adaptation_field_exists && !header.contains_payload {
            return Err(PipeError::InvalidData(format!(
                "Reserved adaptation field control on pid {}",
                header.pid
            )));
        }
        if self.has_adaptation_field() {
            let length = self.data[TS_HEADER_SIZE] as usize;
            let max = if self.has_payload() {
                TS_PACKET_SIZE - TS_HEADER_SIZE - 2
            } else {
                TS_PACKET_SIZE - TS_HEADER_SIZE - 1
            };
            if length > max {
                return Err(PipeError::InvalidData(format!(
                    "Adaptation field length {} exceeds {} on pid {}",
                    length,
                    max,
                    self.pid()
                )));
            }
        }
        Ok(())
    }

    /// Adaptation field, `None` when absent or a single stuffing byte.
    pub fn adaptation_field(&self) -> Result<Option<AdaptationField>> {
        if !self.has_adaptation_field() {
            return Ok(None);
        }
        AdaptationField::parse(&self.data[TS_HEADER_SIZE..])
    }

    /// PCR carried in the adaptation field, in 27 MHz ticks.
    pub fn pcr(&self) -> Result<Option<u64>> {
        Ok(self.adaptation_field()?.and_then(|af| af.pcr))
    }

    /// Payload bytes after the header and adaptation field.
    ///
    /// Returns `None` when the packet carries no payload. Assumes
    /// [`TsPacket::check_errors`] passed.
    pub fn payload(&self) -> Option<&[u8]> {
        if !self.has_payload() {
            return None;
        }
        let mut offset = TS_HEADER_SIZE;
        if self.has_adaptation_field() {
            offset += self.data[TS_HEADER_SIZE] as usize + 1;
        }
        if offset >= TS_PACKET_SIZE {
            return None;
        }
        Some(&self.data[offset..])
    }
}

impl AsRef<[u8]> for TsPacket {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::builder::TsPacketBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accessors() {
        let pkt = TsPacketBuilder::new(0x101)
            .payload_unit_start(true)
            .continuity_counter(3)
            .payload(&[1, 2, 3])
            .build()
            .unwrap();

        pkt.check_errors().unwrap();
        assert_eq!(pkt.pid(), 0x101);
        assert!(pkt.payload_unit_start());
        assert_eq!(pkt.continuity_counter(), 3);
        let header = pkt.header().unwrap();
        assert_eq!((header.pid, header.continuity_counter), (0x101, 3));
        assert!(pkt.has_adaptation_field()); // stuffing
        assert_eq!(pkt.payload().unwrap(), &[1, 2, 3]);
        assert_eq!(pkt.pcr().unwrap(), None);
    }

    #[test]
    fn test_pcr_packet() {
        let pkt = TsPacketBuilder::new(0x100).pcr(28_000_000).build().unwrap();
        pkt.check_errors().unwrap();
        assert!(pkt.payload().is_none());
        assert_eq!(pkt.pcr().unwrap(), Some(28_000_000));
        let af = pkt.adaptation_field().unwrap().unwrap();
        assert!(!af.discontinuity);
        assert_eq!(af.length, TS_PACKET_SIZE - TS_HEADER_SIZE - 1);
    }

    #[test]
    fn test_full_payload_without_adaptation_field() {
        let payload = [0xabu8; TS_PACKET_SIZE - TS_HEADER_SIZE];
        let pkt = TsPacketBuilder::new(0x20).payload(&payload).build().unwrap();
        assert!(!pkt.has_adaptation_field());
        assert_eq!(pkt.payload().unwrap(), &payload[..]);
    }

    #[test]
    fn test_check_errors() {
        let good = TsPacketBuilder::new(0x101).payload(&[0]).build().unwrap();

        let mut raw = [0u8; TS_PACKET_SIZE];
        raw.copy_from_slice(good.as_bytes());
        raw[0] = 0x00;
        assert!(TsPacket::new(raw).check_errors().is_err());

        raw.copy_from_slice(good.as_bytes());
        raw[1] |= 0x80;
        assert!(TsPacket::new(raw).check_errors().is_err());

        raw.copy_from_slice(good.as_bytes());
        raw[3] &= 0xcf;
        assert!(TsPacket::new(raw).check_errors().is_err());

        raw.copy_from_slice(good.as_bytes());
        raw[4] = 184;
        assert!(TsPacket::new(raw).check_errors().is_err());
    }

    #[test]
    fn test_from_slice_length() {
        assert!(TsPacket::from_slice(&[0x47; 187]).is_err());
        assert!(TsPacket::from_slice(&[0x47; 188]).is_ok());
    }
}
