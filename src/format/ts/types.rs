use crate::error::{PipeError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::time::Duration;

pub const STREAM_ID_VIDEO: u8 = 0xe0;

pub const PID_NULL: u16 = 0x1fff;
pub const MAX_PID: u16 = 0x1fff;

pub const SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;

/// PTS/DTS clock
pub const PTS_HZ: u64 = 90_000;
/// PCR clock
pub const PCR_HZ: u64 = 27_000_000;
/// PCR ticks per PTS/DTS tick
pub const PCR_PER_PTS: u64 = 300;

const CLOCK_REFERENCE_SIZE: usize = 6;

/// The four fixed header bytes of a TS packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub pid: u16,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            transport_error: false,
            payload_unit_start: false,
            pid: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl TSHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TS_HEADER_SIZE {
            return Err(PipeError::InvalidData(format!(
                "TS header needs {} bytes, got {}",
                TS_HEADER_SIZE,
                data.len()
            )));
        }
        let mut buf = data;
        if buf.get_u8() != SYNC_BYTE {
            return Err(PipeError::InvalidData("Invalid sync byte".into()));
        }
        let flags_pid = buf.get_u16();
        let control = buf.get_u8();
        Ok(TSHeader {
            transport_error: flags_pid & 0x8000 != 0,
            payload_unit_start: flags_pid & 0x4000 != 0,
            pid: flags_pid & MAX_PID,
            adaptation_field_exists: control & 0x20 != 0,
            contains_payload: control & 0x10 != 0,
            continuity_counter: control & 0x0f,
        })
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        let mut flags_pid = self.pid & MAX_PID;
        if self.transport_error {
            flags_pid |= 0x8000;
        }
        if self.payload_unit_start {
            flags_pid |= 0x4000;
        }
        let mut control = self.continuity_counter & 0x0f;
        if self.adaptation_field_exists {
            control |= 0x20;
        }
        if self.contains_payload {
            control |= 0x10;
        }
        buf.put_u8(SYNC_BYTE);
        buf.put_u16(flags_pid);
        buf.put_u8(control);
    }
}

/// Decoded adaptation field. Private data and extensions are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationField {
    /// `adaptation_field_length`, the length byte itself excluded
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    /// 27 MHz ticks
    pub pcr: Option<u64>,
    /// 27 MHz ticks
    pub opcr: Option<u64>,
    pub splice_countdown: Option<i8>,
}

impl AdaptationField {
    /// Parses the field starting at its length byte. A zero length (a single
    /// stuffing byte) decodes to `None`.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        let Some((&length, rest)) = data.split_first() else {
            return Err(PipeError::InvalidData("Adaptation field length missing".into()));
        };
        let length = length as usize;
        if length == 0 {
            return Ok(None);
        }
        if rest.len() < length {
            return Err(PipeError::InvalidData(format!(
                "Adaptation field of {} bytes, {} available",
                length,
                rest.len()
            )));
        }

        let mut buf = &rest[..length];
        let flags = buf.get_u8();
        let mut field = AdaptationField {
            length,
            discontinuity: flags & 0x80 != 0,
            random_access: flags & 0x40 != 0,
            ..Default::default()
        };
        if flags & 0x10 != 0 {
            field.pcr = Some(take_clock_reference(&mut buf, "PCR")?);
        }
        if flags & 0x08 != 0 {
            field.opcr = Some(take_clock_reference(&mut buf, "OPCR")?);
        }
        if flags & 0x04 != 0 {
            if !buf.has_remaining() {
                return Err(PipeError::InvalidData("Splice countdown missing".into()));
            }
            field.splice_countdown = Some(buf.get_i8());
        }
        Ok(Some(field))
    }
}

fn take_clock_reference(buf: &mut &[u8], what: &str) -> Result<u64> {
    if buf.remaining() < CLOCK_REFERENCE_SIZE {
        return Err(PipeError::InvalidData(format!(
            "{} truncated to {} bytes",
            what,
            buf.remaining()
        )));
    }
    let clock = read_clock_reference(&buf[..CLOCK_REFERENCE_SIZE]);
    buf.advance(CLOCK_REFERENCE_SIZE);
    Ok(clock)
}

/// 33-bit base and 9-bit extension, as 27 MHz ticks. `data` holds at least 6 bytes.
pub fn read_clock_reference(data: &[u8]) -> u64 {
    let mut buf = data;
    let raw = ((buf.get_u32() as u64) << 16) | buf.get_u16() as u64;
    let base = raw >> 15;
    let ext = raw & 0x1ff;
    base * PCR_PER_PTS + ext
}

/// Inverse of [`read_clock_reference`], reserved bits set.
pub fn write_clock_reference(buf: &mut BytesMut, pcr: u64) {
    let base = (pcr / PCR_PER_PTS) & 0x1_ffff_ffff;
    let ext = pcr % PCR_PER_PTS;
    let raw = (base << 15) | (0x3f << 9) | ext;
    buf.put_u32((raw >> 16) as u32);
    buf.put_u16(raw as u16);
}

pub fn pcr_to_time(pcr: u64) -> Duration {
    Duration::from_nanos(((pcr as u128 * 1_000_000_000) / PCR_HZ as u128) as u64)
}

pub fn pts_to_time(pts: u64) -> Duration {
    Duration::from_nanos(((pts as u128 * 1_000_000_000) / PTS_HZ as u128) as u64)
}

/// 90 kHz timestamp in the 27 MHz PCR clock domain.
pub fn pts_to_pcr(pts: u64) -> u64 {
    pts * PCR_PER_PTS
}
