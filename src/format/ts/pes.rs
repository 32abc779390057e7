use crate::error::{PipeError, Result};
use bytes::{Buf, BufMut, BytesMut};

const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Bytes before the optional header: start code, stream id, packet length.
const FIXED_LEN: usize = 6;
/// Bytes of the optional header up to and including `header_data_length`.
const OPTIONAL_LEN: usize = 3;
const TIMESTAMP_LEN: usize = 5;

const TIMESTAMP_MASK: u64 = 0x1_ffff_ffff;

/// Which timestamps a header carries, from the two `PTS_DTS_flags` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timestamps {
    None,
    Pts,
    PtsDts,
}

impl Timestamps {
    fn from_flags(flags: u8) -> Result<Self> {
        match flags >> 6 {
            0b00 => Ok(Timestamps::None),
            0b10 => Ok(Timestamps::Pts),
            0b11 => Ok(Timestamps::PtsDts),
            _ => Err(PipeError::InvalidData(
                "PES header with forbidden PTS_DTS_flags 01".into(),
            )),
        }
    }

    fn bits(self) -> u8 {
        match self {
            Timestamps::None => 0b00,
            Timestamps::Pts => 0b10,
            Timestamps::PtsDts => 0b11,
        }
    }

    fn encoded_len(self) -> u8 {
        match self {
            Timestamps::None => 0,
            Timestamps::Pts => TIMESTAMP_LEN as u8,
            Timestamps::PtsDts => 2 * TIMESTAMP_LEN as u8,
        }
    }
}

/// Timing part of a PES header, decoded from the start of a reassembled unit.
///
/// Only what the analysis reads is kept: the stream id, the declared packet
/// length, the alignment flag and the 90 kHz timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PESHeader {
    pub stream_id: u8,
    /// 0 means unbounded, common for video
    pub packet_length: u16,
    pub data_alignment: bool,
    /// Bytes following the `header_data_length` field, stuffing included
    pub header_data_length: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

/// Program stream map, padding, private 2 and friends carry no optional header.
fn has_optional_header(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        0xbc | 0xbe | 0xbf | 0xf0 | 0xf1 | 0xf2 | 0xf8 | 0xff
    )
}

impl PESHeader {
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts & TIMESTAMP_MASK);
        self
    }

    /// A DTS is only written alongside a PTS.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts & TIMESTAMP_MASK);
        self
    }

    pub fn has_pts(&self) -> bool {
        self.pts.is_some()
    }

    pub fn has_dts(&self) -> bool {
        self.dts.is_some()
    }

    /// DTS when present, PTS otherwise.
    pub fn decode_time(&self) -> Option<u64> {
        self.dts.or(self.pts)
    }

    fn timestamps(&self) -> Result<Timestamps> {
        match (self.pts, self.dts) {
            (Some(_), Some(_)) => Ok(Timestamps::PtsDts),
            (Some(_), None) => Ok(Timestamps::Pts),
            (None, None) => Ok(Timestamps::None),
            (None, Some(_)) => Err(PipeError::InvalidData("DTS requires a PTS".into())),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_LEN {
            return Err(PipeError::InvalidData(format!(
                "PES header needs {} bytes, got {}",
                FIXED_LEN,
                data.len()
            )));
        }
        if data[..3] != START_CODE {
            return Err(PipeError::InvalidData(format!(
                "Invalid PES start code {:02x}{:02x}{:02x}",
                data[0], data[1], data[2]
            )));
        }

        let mut buf = &data[3..];
        let mut header = PESHeader::new(buf.get_u8());
        header.packet_length = buf.get_u16();
        if !has_optional_header(header.stream_id) {
            return Ok(header);
        }

        if buf.remaining() < OPTIONAL_LEN {
            return Err(PipeError::InvalidData(format!(
                "PES optional header truncated on stream {:#04x}",
                header.stream_id
            )));
        }
        let flags = buf.get_u8();
        if flags & 0xc0 != 0x80 {
            return Err(PipeError::InvalidData(format!(
                "Invalid PES marker bits {:#04x}",
                flags
            )));
        }
        header.data_alignment = flags & 0x04 != 0;
        let timestamps = Timestamps::from_flags(buf.get_u8())?;
        header.header_data_length = buf.get_u8();

        let available = buf.remaining().min(header.header_data_length as usize);
        if available < header.header_data_length as usize
            || header.header_data_length < timestamps.encoded_len()
        {
            return Err(PipeError::InvalidData(format!(
                "PES header data of {} bytes, {} available, {} needed",
                header.header_data_length,
                available,
                timestamps.encoded_len()
            )));
        }

        match timestamps {
            Timestamps::None => {}
            Timestamps::Pts => header.pts = Some(read_timestamp(&mut buf)),
            Timestamps::PtsDts => {
                header.pts = Some(read_timestamp(&mut buf));
                header.dts = Some(read_timestamp(&mut buf));
            }
        }
        Ok(header)
    }

    /// Writes the header; `header_data_length` grows to fit the timestamps
    /// and any extra declared room is stuffed with 0xff.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        let timestamps = self.timestamps()?;
        let header_data_length = self.header_data_length.max(timestamps.encoded_len());

        buf.put_slice(&START_CODE);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);
        buf.put_u8(if self.data_alignment { 0x84 } else { 0x80 });
        buf.put_u8(timestamps.bits() << 6);
        buf.put_u8(header_data_length);

        if let Some(pts) = self.pts {
            write_timestamp(buf, timestamps.bits() << 4, pts);
        }
        if let Some(dts) = self.dts {
            write_timestamp(buf, 0x10, dts);
        }
        buf.put_bytes(0xff, (header_data_length - timestamps.encoded_len()) as usize);
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        let timestamps = self.timestamps().map_or(0, Timestamps::encoded_len);
        FIXED_LEN + OPTIONAL_LEN + self.header_data_length.max(timestamps) as usize
    }
}

/// A PES header followed by its elementary stream bytes.
#[derive(Debug)]
pub struct PESPacket {
    pub header: PESHeader,
    pub payload: Vec<u8>,
}

impl PESPacket {
    pub fn new(stream_id: u8, payload: Vec<u8>) -> Self {
        Self {
            header: PESHeader::new(stream_id),
            payload,
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.header = self.header.with_pts(pts);
        self
    }

    pub fn with_dts(mut self, dts: u64) -> Self {
        self.header = self.header.with_dts(dts);
        self
    }

    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write_to(buf)?;
        buf.put_slice(&self.payload);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.len());
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Encoded size, header included.
    pub fn len(&self) -> usize {
        self.header.encoded_len() + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// 33-bit timestamp spread over 5 bytes with marker bits; the caller has
/// checked that 5 bytes remain.
fn read_timestamp(buf: &mut &[u8]) -> u64 {
    let high = (buf.get_u8() as u64 >> 1) & 0x07;
    let mid = buf.get_u16() as u64 >> 1;
    let low = buf.get_u16() as u64 >> 1;
    (high << 30) | (mid << 15) | low
}

fn write_timestamp(buf: &mut BytesMut, prefix: u8, ts: u64) {
    let ts = ts & TIMESTAMP_MASK;
    buf.put_u8(prefix | (((ts >> 30) as u8 & 0x07) << 1) | 0x01);
    buf.put_u16((((ts >> 15) & 0x7fff) as u16) << 1 | 0x01);
    buf.put_u16(((ts & 0x7fff) as u16) << 1 | 0x01);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::types::STREAM_ID_VIDEO;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lengths() {
        let packet = PESPacket::new(STREAM_ID_VIDEO, vec![0; 10])
            .with_pts(90_000)
            .with_dts(87_000);
        assert!(packet.header.has_pts());
        assert!(packet.header.has_dts());
        assert_eq!(packet.len(), 29);
        assert_eq!(packet.to_bytes().unwrap().len(), 29);

        let bare = PESPacket::new(STREAM_ID_VIDEO, vec![]);
        assert!(bare.is_empty());
        assert_eq!(bare.len(), 9);
    }

    #[test]
    fn test_wire_layout() {
        let buf = PESPacket::new(STREAM_ID_VIDEO, vec![0; 10])
            .with_pts(90_000)
            .to_bytes()
            .unwrap();
        assert_eq!(&buf[0..3], &START_CODE);
        assert_eq!(buf[3], 0xe0);
        assert_eq!(buf[6], 0x80);
        assert_eq!(buf[7], 0x80);
        assert_eq!(buf[8], 5);
        // '0010' prefix, then 90000 = 0x15f90
        assert_eq!(&buf[9..14], &[0x21, 0x00, 0x05, 0xbf, 0x21]);
    }

    #[test]
    fn test_parse_pts_and_dts() {
        let buf = PESPacket::new(STREAM_ID_VIDEO, vec![1, 2, 3])
            .with_pts(0x1_2345_6789)
            .with_dts(5000)
            .to_bytes()
            .unwrap();
        let header = PESHeader::parse(&buf).unwrap();
        assert_eq!(header.pts, Some(0x1_2345_6789));
        assert_eq!(header.dts, Some(5000));
        assert_eq!(header.decode_time(), Some(5000));
        assert_eq!(header.header_data_length, 10);
    }

    #[test]
    fn test_parse_pts_only_falls_back() {
        let buf = PESPacket::new(0xc0, vec![]).with_pts(1234).to_bytes().unwrap();
        let header = PESHeader::parse(&buf).unwrap();
        assert!(!header.has_dts());
        assert_eq!(header.decode_time(), Some(1234));
    }

    #[test]
    fn test_stuffing_is_skipped() {
        let mut header = PESHeader::new(STREAM_ID_VIDEO).with_pts(77);
        header.header_data_length = 8;
        header.data_alignment = true;
        let mut buf = BytesMut::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 17);
        assert_eq!(&buf[14..], &[0xff; 3]);
        assert_eq!(PESHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_parse_without_timestamps() {
        let buf = PESPacket::new(STREAM_ID_VIDEO, vec![9; 4]).to_bytes().unwrap();
        let header = PESHeader::parse(&buf).unwrap();
        assert_eq!(header.decode_time(), None);

        // Padding stream
        let header = PESHeader::parse(&[0, 0, 1, 0xbe, 0, 2, 0xff, 0xff]).unwrap();
        assert_eq!(header.stream_id, 0xbe);
        assert_eq!(header.pts, None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(PESHeader::parse(&[0, 0, 1]).is_err());
        assert!(PESHeader::parse(&[0, 0, 2, 0xe0, 0, 0, 0x80, 0, 0]).is_err());
        assert!(PESHeader::parse(&[0, 0, 1, 0xe0, 0, 0, 0x80]).is_err());
        assert!(PESHeader::parse(&[0, 0, 1, 0xe0, 0, 0, 0x40, 0, 0]).is_err());
        // Header data length points past the end
        assert!(PESHeader::parse(&[0, 0, 1, 0xe0, 0, 0, 0x80, 0x80, 5, 0x21]).is_err());
        // PTS flagged but no room declared for it
        assert!(PESHeader::parse(&[0, 0, 1, 0xe0, 0, 0, 0x80, 0x80, 0]).is_err());
        assert!(PESHeader::parse(&[0, 0, 1, 0xe0, 0, 0, 0x80, 0x40, 0]).is_err());
    }

    #[test]
    fn test_dts_without_pts_rejected() {
        let mut buf = BytesMut::new();
        assert!(PESHeader::new(0xe0).with_dts(1).write_to(&mut buf).is_err());
    }
}
