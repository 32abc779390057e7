use super::runtime::{CellConfig, CellRuntime, StopSignal};
use super::unit::{Format, Unit};
use super::{help_text, parse_bool, required, Cell, CellBehavior};
use crate::config::Config;
use crate::error::{PipeError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use std::io::SeekFrom;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::UdpSocket;

pub const FILE_READER: &str = "file_reader";
pub const MCAST_READER: &str = "mcast_reader";

/// Largest datagram accepted by `mcast_reader`.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Reads a file in fixed-size chunks and emits them as byte units.
#[derive(Debug)]
pub struct FileReader {
    rt: CellRuntime,
    filename: String,
    chunk_size: usize,
    /// Total bytes to emit; 0 means the whole file
    size: u64,
    repeat: bool,
}

impl FileReader {
    pub fn create(signal: StopSignal, config: &CellConfig, settings: &Config) -> Result<Cell> {
        let filename = required(config, FILE_READER, "name")?.to_string();
        let size = match config.get("size") {
            Some(size) => size.trim().parse::<u64>().map_err(|_| {
                PipeError::InvalidCellConfig(format!("[{}] invalid size {}", FILE_READER, size))
            })?,
            None => 0,
        };
        let repeat = match config.get("loop") {
            Some(value) => parse_bool(FILE_READER, "loop", value)?,
            None => false,
        };
        Ok(Cell::FileReader(Self {
            rt: CellRuntime::new(FILE_READER, signal, config),
            filename,
            chunk_size: settings.read_chunk_size,
            size,
            repeat,
        }))
    }

    pub fn short_help() -> String {
        format!("{} : read content from file", FILE_READER)
    }

    pub fn help() -> String {
        help_text(
            &Self::short_help(),
            &[],
            &[Format::Bytes],
            &[
                ("name", "filename to read from"),
                ("size", "optional, total bytes to read, whole file if absent"),
                ("loop", "optional, restart from the beginning at end of file"),
            ],
        )
    }
}

#[async_trait]
impl CellBehavior for FileReader {
    fn runtime(&self) -> &CellRuntime {
        &self.rt
    }

    fn runtime_mut(&mut self) -> &mut CellRuntime {
        &mut self.rt
    }

    async fn process(&mut self) -> Result<()> {
        let mut file = File::open(&self.filename).await?;
        let token = self.rt.stop_token();
        let mut total: u64 = 0;
        let mut pass: u64 = 0;

        loop {
            let mut buffer = vec![0u8; self.chunk_size];
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                read = file.read(&mut buffer) => read?,
            };

            if read == 0 {
                // An empty file would spin forever in loop mode
                if self.repeat && pass > 0 {
                    debug!("[{}] rewinding {}", FILE_READER, self.filename);
                    file.seek(SeekFrom::Start(0)).await?;
                    pass = 0;
                    continue;
                }
                break;
            }

            let mut count = read as u64;
            let mut last = false;
            if self.size > 0 && total + count >= self.size {
                count = self.size - total;
                last = true;
            }
            buffer.truncate(count as usize);
            self.rt.put_output(Unit::new(Bytes::from(buffer))).await?;
            total += count;
            pass += count;
            if last {
                break;
            }
        }

        info!("[{}] read {} bytes from {}", FILE_READER, total, self.filename);
        Ok(())
    }
}

/// Receives UDP datagrams from a multicast group and emits them as byte units.
#[derive(Debug)]
pub struct McastReader {
    rt: CellRuntime,
    interface: String,
    group: SocketAddrV4,
}

impl McastReader {
    pub fn create(signal: StopSignal, config: &CellConfig, _settings: &Config) -> Result<Cell> {
        let interface = required(config, MCAST_READER, "intf")?.to_string();
        let addr = required(config, MCAST_READER, "addr")?;
        let group: SocketAddrV4 = addr.parse().map_err(|_| {
            PipeError::InvalidCellConfig(format!("[{}] invalid addr {}", MCAST_READER, addr))
        })?;
        if !group.ip().is_multicast() {
            return Err(PipeError::InvalidCellConfig(format!(
                "[{}] {} is not a multicast address",
                MCAST_READER, addr
            )));
        }
        Ok(Cell::McastReader(Self {
            rt: CellRuntime::new(MCAST_READER, signal, config),
            interface,
            group,
        }))
    }

    pub fn short_help() -> String {
        format!("{} : read datagrams from a multicast group", MCAST_READER)
    }

    pub fn help() -> String {
        help_text(
            &Self::short_help(),
            &[],
            &[Format::Bytes],
            &[
                ("intf", "interface name or local IPv4 address to join on"),
                ("addr", "multicast group, ip:port"),
            ],
        )
    }
}

/// Local IPv4 address of an interface, given by name or as a literal address.
fn resolve_interface(interface: &str) -> Result<Ipv4Addr> {
    if let Ok(addr) = interface.parse::<Ipv4Addr>() {
        return Ok(addr);
    }
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| PipeError::InvalidCellConfig(format!("[{}] {}", MCAST_READER, e)))?;
    interfaces
        .into_iter()
        .find_map(|(name, ip)| match ip {
            IpAddr::V4(ip) if name == interface => Some(ip),
            _ => None,
        })
        .ok_or_else(|| {
            PipeError::InvalidCellConfig(format!(
                "[{}] no IPv4 address on interface {}",
                MCAST_READER, interface
            ))
        })
}

#[async_trait]
impl CellBehavior for McastReader {
    fn runtime(&self) -> &CellRuntime {
        &self.rt
    }

    fn runtime_mut(&mut self) -> &mut CellRuntime {
        &mut self.rt
    }

    async fn process(&mut self) -> Result<()> {
        let interface = resolve_interface(&self.interface)?;
        let socket =
            UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.group.port())).await?;
        socket.join_multicast_v4(*self.group.ip(), interface)?;
        info!(
            "[{}] joined {} on {} ({})",
            MCAST_READER, self.group, self.interface, interface
        );

        let token = self.rt.stop_token();
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let len = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = socket.recv(&mut buffer) => received?,
            };
            self.rt
                .put_output(Unit::new(Bytes::copy_from_slice(&buffer[..len])))
                .await?;
        }

        if let Err(e) = socket.leave_multicast_v4(*self.group.ip(), interface) {
            debug!("[{}] leave {}: {}", MCAST_READER, self.group, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::runtime::stop_signal;
    use crate::cell::CellState;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reader(props: &[(&str, &str)], chunk: usize) -> Cell {
        let config: CellConfig = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let settings = Config {
            read_chunk_size: chunk,
            ..Config::default()
        };
        let (signal, _) = stop_signal();
        FileReader::create(signal, &config, &settings).unwrap()
    }

    fn sink() -> CellRuntime {
        let (signal, _) = stop_signal();
        CellRuntime::new("identity", signal, &CellConfig::new())
    }

    async fn collect(rt: &mut CellRuntime) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(unit) = rt.get_input().await {
            out.extend_from_slice(&unit.into_bytes().unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_reads_whole_file_in_chunks() {
        let mut file = NamedTempFile::new().unwrap();
        let content: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        file.write_all(&content).unwrap();

        let mut cell = reader(&[("name", file.path().to_str().unwrap())], 1024);
        let mut rt = sink();
        cell.runtime_mut().connect(&mut rt).unwrap();

        let task = tokio::spawn(cell.run());
        assert_eq!(collect(&mut rt).await, content);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_size_limit_truncates_last_chunk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 1000]).unwrap();

        let mut cell = reader(
            &[("name", file.path().to_str().unwrap()), ("size", "300")],
            128,
        );
        let mut rt = sink();
        cell.runtime_mut().connect(&mut rt).unwrap();

        let task = tokio::spawn(cell.run());
        assert_eq!(collect(&mut rt).await.len(), 300);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_loop_runs_until_stopped() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1u8; 10]).unwrap();

        let config: CellConfig = [("name", file.path().to_str().unwrap()), ("loop", "true")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let (signal, mut watch) = stop_signal();
        let mut cell = FileReader::create(signal, &config, &Config::default()).unwrap();
        let mut rt = sink();
        cell.runtime_mut().connect(&mut rt).unwrap();
        let token = cell.stop_token();

        let task = tokio::spawn(cell.run());
        let mut received = 0;
        while received < 50 {
            received += rt.get_input().await.unwrap().into_bytes().unwrap().len();
        }
        token.cancel();
        while rt.get_input().await.is_some() {}

        task.await.unwrap().unwrap();
        watch
            .wait_for(|state| *state == CellState::Stopped)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let cell = reader(&[("name", "/nonexistent/input.ts")], 1024);
        assert!(matches!(cell.run().await, Err(PipeError::Io(_))));
    }

    #[test]
    fn test_invalid_properties() {
        let (signal, _) = stop_signal();
        let config = CellConfig::new();
        assert!(FileReader::create(signal, &config, &Config::default()).is_err());

        let (signal, _) = stop_signal();
        let config: CellConfig = [("intf", "lo"), ("addr", "10.0.0.1:1234")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(McastReader::create(signal, &config, &Config::default()).is_err());
    }

    #[test]
    fn test_resolve_literal_interface() {
        assert_eq!(
            resolve_interface("127.0.0.1").unwrap(),
            Ipv4Addr::new(127, 0, 0, 1)
        );
    }
}
