use super::runtime::{CellConfig, CellRuntime, StopSignal};
use super::unit::{Format, Unit};
use super::{help_text, required, Cell, CellBehavior};
use crate::config::Config;
use crate::error::{PipeError, Result};
use crate::format::ts::{TsPacket, SYNC_BYTE, TS_PACKET_SIZE};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use log::{info, warn};

pub const BYTES_CONVERTER: &str = "bytes_converter";

/// Offset of the first plausible packet start in `buf`.
///
/// A sync byte counts when another one follows a packet later, or when the
/// buffer ends before that position could be checked.
pub fn find_sync(buf: &[u8]) -> Option<usize> {
    (0..buf.len()).find(|&i| {
        buf[i] == SYNC_BYTE
            && buf
                .get(i + TS_PACKET_SIZE)
                .map_or(true, |&next| next == SYNC_BYTE)
    })
}

/// Splits a byte stream into TS packet units.
///
/// Bytes are buffered across units, so packets may straddle input chunks.
#[derive(Debug)]
pub struct BytesConverter {
    rt: CellRuntime,
    remained: BytesMut,
    dropped: u64,
}

impl BytesConverter {
    pub fn create(signal: StopSignal, config: &CellConfig, _settings: &Config) -> Result<Cell> {
        let output: Format = required(config, BYTES_CONVERTER, "output_format")?.parse()?;
        if output != Format::TsPacket {
            return Err(PipeError::InvalidCellConfig(format!(
                "[{}] unsupported output_format {}",
                BYTES_CONVERTER, output
            )));
        }
        Ok(Cell::BytesConverter(Self {
            rt: CellRuntime::new(BYTES_CONVERTER, signal, config),
            remained: BytesMut::new(),
            dropped: 0,
        }))
    }

    pub fn short_help() -> String {
        format!("{} : convert bytes into other formats", BYTES_CONVERTER)
    }

    pub fn help() -> String {
        help_text(
            &Self::short_help(),
            &[Format::Bytes],
            &[Format::TsPacket],
            &[("output_format", "ts_packet")],
        )
    }

    /// Emits every whole packet buffered so far.
    async fn drain(&mut self) -> Result<()> {
        loop {
            match find_sync(&self.remained) {
                Some(0) => {}
                Some(offset) => {
                    warn!("[{}] dropped {} bytes to resync", BYTES_CONVERTER, offset);
                    self.dropped += offset as u64;
                    self.remained.advance(offset);
                }
                None => {
                    if !self.remained.is_empty() {
                        warn!(
                            "[{}] dropped {} bytes without sync",
                            BYTES_CONVERTER,
                            self.remained.len()
                        );
                        self.dropped += self.remained.len() as u64;
                        self.remained.clear();
                    }
                    return Ok(());
                }
            }
            if self.remained.len() < TS_PACKET_SIZE {
                return Ok(());
            }
            let chunk = self.remained.split_to(TS_PACKET_SIZE);
            let pkt = TsPacket::from_slice(&chunk)?;
            self.rt.put_output(Unit::new(pkt)).await?;
        }
    }
}

#[async_trait]
impl CellBehavior for BytesConverter {
    fn runtime(&self) -> &CellRuntime {
        &self.rt
    }

    fn runtime_mut(&mut self) -> &mut CellRuntime {
        &mut self.rt
    }

    async fn process(&mut self) -> Result<()> {
        while let Some(unit) = self.rt.get_input().await {
            let data = unit.into_bytes()?;
            self.remained.extend_from_slice(&data);
            self.drain().await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if !self.remained.is_empty() {
            info!(
                "[{}] {} trailing bytes discarded",
                BYTES_CONVERTER,
                self.remained.len()
            );
        }
        if self.dropped > 0 {
            warn!("[{}] {} bytes dropped in total", BYTES_CONVERTER, self.dropped);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::runtime::stop_signal;
    use crate::format::ts::{to_capture, TsPacketBuilder};
    use pretty_assertions::assert_eq;

    fn packets(n: u8) -> Vec<TsPacket> {
        (0..n)
            .map(|i| {
                TsPacketBuilder::new(0x100 + i as u16)
                    .payload(&[i; 16])
                    .build()
                    .unwrap()
            })
            .collect()
    }

    fn converter() -> (Cell, CellRuntime, CellRuntime) {
        let mut config = CellConfig::new();
        config.insert("output_format".into(), "ts_packet".into());
        let (signal, _) = stop_signal();
        let mut cell = BytesConverter::create(signal, &config, &Config::default()).unwrap();
        let (signal, _) = stop_signal();
        let mut upstream = CellRuntime::new("file_reader", signal, &CellConfig::new());
        let (signal, _) = stop_signal();
        let mut downstream = CellRuntime::new("identity", signal, &CellConfig::new());
        upstream.connect(cell.runtime_mut()).unwrap();
        cell.runtime_mut().connect(&mut downstream).unwrap();
        (cell, upstream, downstream)
    }

    async fn run_with(chunks: Vec<Vec<u8>>) -> Vec<TsPacket> {
        let (cell, mut upstream, mut downstream) = converter();
        let task = tokio::spawn(cell.run());
        let feeder = tokio::spawn(async move {
            upstream.start().unwrap();
            for chunk in chunks {
                upstream.put_output(Unit::new(chunk)).await.unwrap();
            }
            upstream.stop().unwrap();
        });
        let mut out = Vec::new();
        while let Some(unit) = downstream.get_input().await {
            out.push(unit.into_ts_packet().unwrap());
        }
        feeder.await.unwrap();
        task.await.unwrap().unwrap();
        out
    }

    #[test]
    fn test_find_sync() {
        let capture = to_capture(&packets(2));
        assert_eq!(find_sync(&capture), Some(0));

        let mut shifted = vec![0x47, 0x00, 0x12];
        shifted.extend_from_slice(&capture);
        assert_eq!(find_sync(&shifted), Some(3));

        assert_eq!(find_sync(&[0u8; 10]), None);
        assert_eq!(find_sync(&[0u8, 0x47, 0]), Some(1));
    }

    #[tokio::test]
    async fn test_packets_straddling_chunks() {
        let expected = packets(5);
        let capture = to_capture(&expected);
        let chunks: Vec<Vec<u8>> = capture.chunks(100).map(|c| c.to_vec()).collect();
        assert_eq!(run_with(chunks).await, expected);
    }

    #[tokio::test]
    async fn test_resync_after_garbage() {
        let expected = packets(3);
        let mut data = vec![0xffu8, 0x47, 0x01];
        data.extend_from_slice(&to_capture(&expected));
        data.extend_from_slice(&[0x47, 0x00]);
        assert_eq!(run_with(vec![data]).await, expected);
    }

    #[tokio::test]
    async fn test_rejects_non_byte_units() {
        let (cell, mut upstream, _downstream) = converter();
        let task = tokio::spawn(cell.run());
        upstream.start().unwrap();
        upstream
            .put_output(Unit::new(String::from("not bytes")))
            .await
            .unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(PipeError::InvalidUnitFormat { .. })
        ));
    }

    #[test]
    fn test_unsupported_output_format() {
        let mut config = CellConfig::new();
        config.insert("output_format".into(), "bytes".into());
        let (signal, _) = stop_signal();
        assert!(BytesConverter::create(signal, &config, &Config::default()).is_err());
    }
}
