use super::runtime::{CellConfig, CellRuntime, StopSignal};
use super::unit::{Format, Payload};
use super::{help_text, required, Cell, CellBehavior};
use crate::config::Config;
use crate::error::{PipeError, Result};
use async_trait::async_trait;
use log::info;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

pub const FILE_WRITER: &str = "file_writer";

/// Writes every unit's payload to a file, in arrival order.
#[derive(Debug)]
pub struct FileWriter {
    rt: CellRuntime,
    filename: String,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileWriter {
    pub fn create(signal: StopSignal, config: &CellConfig, _settings: &Config) -> Result<Cell> {
        let filename = required(config, FILE_WRITER, "name")?.to_string();
        Ok(Cell::FileWriter(Self {
            rt: CellRuntime::new(FILE_WRITER, signal, config),
            filename,
            writer: None,
            written: 0,
        }))
    }

    pub fn short_help() -> String {
        format!("{} : write content to file", FILE_WRITER)
    }

    pub fn help() -> String {
        help_text(
            &Self::short_help(),
            &[Format::Bytes, Format::Text, Format::TsPacket],
            &[],
            &[("name", "filename to write to, truncated if present")],
        )
    }
}

#[async_trait]
impl CellBehavior for FileWriter {
    fn runtime(&self) -> &CellRuntime {
        &self.rt
    }

    fn runtime_mut(&mut self) -> &mut CellRuntime {
        &mut self.rt
    }

    async fn process(&mut self) -> Result<()> {
        let writer = self
            .writer
            .insert(BufWriter::new(File::create(&self.filename).await?));

        while let Some(unit) = self.rt.get_input().await {
            let found = unit.data().format();
            if unit.format() != found {
                return Err(PipeError::InvalidUnitFormat {
                    expected: unit.format(),
                    found,
                });
            }
            match unit.into_data() {
                Payload::Bytes(data) => writer.write_all(&data).await?,
                Payload::Text(text) => writer.write_all(text.as_bytes()).await?,
                Payload::TsPacket(pkt) => writer.write_all(pkt.as_bytes()).await?,
            }
            self.written += 1;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            info!(
                "[{}] wrote {} units to {}",
                FILE_WRITER, self.written, self.filename
            );
        }
        Ok(())
    }
}
