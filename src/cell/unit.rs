use crate::error::{PipeError, Result};
use crate::format::ts::TsPacket;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Semantic type of a unit's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Raw byte block
    Bytes,
    /// Text
    Text,
    /// One decoded-on-demand TS packet
    TsPacket,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Bytes => "bytes",
            Format::Text => "string",
            Format::TsPacket => "ts_packet",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bytes" => Ok(Format::Bytes),
            "string" => Ok(Format::Text),
            "ts_packet" => Ok(Format::TsPacket),
            other => Err(PipeError::InvalidCellConfig(format!(
                "unknown format {}",
                other
            ))),
        }
    }
}

/// Renders a format list for help text, e.g. `[bytes string]`.
pub fn format_list(formats: &[Format]) -> String {
    let names: Vec<&str> = formats.iter().map(|f| f.name()).collect();
    format!("[{}]", names.join(" "))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Bytes),
    Text(String),
    TsPacket(TsPacket),
}

impl Payload {
    pub fn format(&self) -> Format {
        match self {
            Payload::Bytes(_) => Format::Bytes,
            Payload::Text(_) => Format::Text,
            Payload::TsPacket(_) => Format::TsPacket,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Bytes(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(data))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<TsPacket> for Payload {
    fn from(pkt: TsPacket) -> Self {
        Payload::TsPacket(pkt)
    }
}

/// Envelope moved between cells.
///
/// The format tag is carried separately from the payload so a producer may
/// declare it explicitly; consumers check both when unwrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    format: Format,
    data: Payload,
}

impl Unit {
    /// Creates a unit tagged with the payload's own format.
    pub fn new(data: impl Into<Payload>) -> Self {
        let data = data.into();
        Self {
            format: data.format(),
            data,
        }
    }

    /// Creates a unit with an explicit format tag. Not validated here.
    pub fn tagged(data: impl Into<Payload>, format: Format) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn into_data(self) -> Payload {
        self.data
    }

    fn mismatch(&self, expected: Format) -> PipeError {
        PipeError::InvalidUnitFormat {
            expected,
            found: self.format,
        }
    }

    pub fn into_bytes(self) -> Result<Bytes> {
        match self.data {
            Payload::Bytes(data) if self.format == Format::Bytes => Ok(data),
            _ => Err(self.mismatch(Format::Bytes)),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self.data {
            Payload::Text(text) if self.format == Format::Text => Ok(text),
            _ => Err(self.mismatch(Format::Text)),
        }
    }

    pub fn into_ts_packet(self) -> Result<TsPacket> {
        match self.data {
            Payload::TsPacket(pkt) if self.format == Format::TsPacket => Ok(pkt),
            _ => Err(self.mismatch(Format::TsPacket)),
        }
    }
}
