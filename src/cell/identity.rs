use super::runtime::{CellConfig, CellRuntime, StopSignal};
use super::unit::Format;
use super::{help_text, Cell, CellBehavior};
use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;

pub const IDENTITY: &str = "identity";

/// Forwards every unit unchanged.
#[derive(Debug)]
pub struct Identity {
    rt: CellRuntime,
}

impl Identity {
    pub fn create(signal: StopSignal, config: &CellConfig, _settings: &Config) -> Result<Cell> {
        Ok(Cell::Identity(Self {
            rt: CellRuntime::new(IDENTITY, signal, config),
        }))
    }

    pub fn short_help() -> String {
        format!("{} : pass units through unchanged", IDENTITY)
    }

    pub fn help() -> String {
        let all = [Format::Bytes, Format::Text, Format::TsPacket];
        help_text(&Self::short_help(), &all, &all, &[])
    }
}

#[async_trait]
impl CellBehavior for Identity {
    fn runtime(&self) -> &CellRuntime {
        &self.rt
    }

    fn runtime_mut(&mut self) -> &mut CellRuntime {
        &mut self.rt
    }

    async fn process(&mut self) -> Result<()> {
        while let Some(unit) = self.rt.get_input().await {
            self.rt.put_output(unit).await?;
        }
        Ok(())
    }
}
