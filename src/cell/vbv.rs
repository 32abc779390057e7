use super::runtime::{CellConfig, CellRuntime, StopSignal};
use super::unit::Format;
use super::{help_text, parse_pid, required, Cell, CellBehavior};
use crate::analysis::{write_report, ReportFormat, VbvAnalyzer, VbvConfig};
use crate::config::Config;
use crate::error::Result;
use crate::format::ts::types::pcr_to_time;
use async_trait::async_trait;
use log::{info, warn};
use std::path::PathBuf;

pub const VBV: &str = "vbv";

/// Runs the VBV analysis over a TS packet stream and renders the report at the end.
#[derive(Debug)]
pub struct VbvCell {
    rt: CellRuntime,
    analyzer: VbvAnalyzer,
    dir: Option<PathBuf>,
    format: ReportFormat,
}

impl VbvCell {
    pub fn create(signal: StopSignal, config: &CellConfig, settings: &Config) -> Result<Cell> {
        let pcr_pid = parse_pid(VBV, "pcr", required(config, VBV, "pcr")?)?;
        let pids = match config.get("pids") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|pid| !pid.is_empty())
                .map(|pid| parse_pid(VBV, "pids", pid))
                .collect::<Result<Vec<u16>>>()?,
            None => Vec::new(),
        };
        let dir = config
            .get("dir")
            .map(PathBuf::from)
            .or_else(|| settings.output_dir.clone());
        let format = match config.get("format") {
            Some(format) => format.parse()?,
            None => ReportFormat::default(),
        };

        Ok(Cell::Vbv(Self {
            rt: CellRuntime::new(VBV, signal, config),
            analyzer: VbvAnalyzer::new(VbvConfig::new(pcr_pid).with_pids(pids)),
            dir,
            format,
        }))
    }

    pub fn short_help() -> String {
        format!("{} : analyze DTS against PCR per PES unit", VBV)
    }

    pub fn help() -> String {
        help_text(
            &Self::short_help(),
            &[Format::TsPacket],
            &[],
            &[
                ("pcr", "pid carrying the PCR, decimal or 0x hex"),
                ("pids", "optional, comma separated pids to analyze, all if absent"),
                ("dir", "optional, output directory, console if absent"),
                ("format", "optional, text or csv, text if absent"),
            ],
        )
    }
}

#[async_trait]
impl CellBehavior for VbvCell {
    fn runtime(&self) -> &CellRuntime {
        &self.rt
    }

    fn runtime_mut(&mut self) -> &mut CellRuntime {
        &mut self.rt
    }

    async fn process(&mut self) -> Result<()> {
        while let Some(unit) = self.rt.get_input().await {
            let pkt = unit.into_ts_packet()?;
            self.analyzer.process(pkt)?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.analyzer.pending() > 0 {
            warn!(
                "[{}] {} packets after the last pcr not analyzed",
                VBV,
                self.analyzer.pending()
            );
        }
        let records = self.analyzer.records();
        info!(
            "[{}] {} packets, {} units over {} pids, last pcr at {:?}",
            VBV,
            self.analyzer.packets(),
            records.values().map(Vec::len).sum::<usize>(),
            records.len(),
            self.analyzer.last_pcr().map(|sample| pcr_to_time(sample.pcr))
        );
        let stdout = std::io::stdout();
        write_report(records, self.format, self.dir.as_deref(), &mut stdout.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::runtime::stop_signal;
    use crate::cell::Unit;
    use crate::error::PipeError;
    use crate::format::ts::{packetize, PESPacket, TsPacketBuilder};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn config(props: &[(&str, &str)]) -> CellConfig {
        props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_properties() {
        let (signal, _) = stop_signal();
        let cell = VbvCell::create(
            signal,
            &config(&[("pcr", "0x100"), ("pids", "0x101, 258"), ("format", "csv")]),
            &Config::default(),
        )
        .unwrap();
        match cell {
            Cell::Vbv(vbv) => {
                assert_eq!(vbv.analyzer.config().pcr_pid, 0x100);
                assert_eq!(
                    vbv.analyzer.config().pids.iter().copied().collect::<Vec<_>>(),
                    vec![0x101, 0x102]
                );
                assert_eq!(vbv.format, ReportFormat::Csv);
                assert_eq!(vbv.dir, None);
            }
            other => panic!("unexpected cell {:?}", other),
        }
    }

    #[test]
    fn test_invalid_properties() {
        for props in [
            vec![],
            vec![("pcr", "abc")],
            vec![("pcr", "256"), ("pids", "1,x")],
            vec![("pcr", "256"), ("format", "plot")],
        ] {
            let (signal, _) = stop_signal();
            assert!(matches!(
                VbvCell::create(signal, &config(&props), &Config::default()),
                Err(PipeError::InvalidCellConfig(_))
            ));
        }
    }

    #[test]
    fn test_output_dir_from_settings() {
        let settings = Config {
            output_dir: Some(PathBuf::from("/tmp/vbv")),
            ..Config::default()
        };
        let (signal, _) = stop_signal();
        match VbvCell::create(signal, &config(&[("pcr", "256")]), &settings).unwrap() {
            Cell::Vbv(vbv) => assert_eq!(vbv.dir, Some(PathBuf::from("/tmp/vbv"))),
            other => panic!("unexpected cell {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_renders_partial_results_after_error() {
        let dir = tempdir().unwrap();
        let (signal, _) = stop_signal();
        let mut cell = VbvCell::create(
            signal,
            &config(&[
                ("pcr", "0x100"),
                ("pids", "0x101"),
                ("dir", dir.path().to_str().unwrap()),
            ]),
            &Config::default(),
        )
        .unwrap();
        let (signal, _) = stop_signal();
        let mut upstream = CellRuntime::new("bytes_converter", signal, &CellConfig::new());
        upstream.connect(cell.runtime_mut()).unwrap();

        let unit = PESPacket::new(0xe0, vec![0; 50])
            .with_pts(1000)
            .to_bytes()
            .unwrap();
        let mut stream = vec![TsPacketBuilder::new(0x100).pcr(0).build().unwrap()];
        stream.extend(packetize(0x101, &unit, 0).unwrap());
        stream.extend(packetize(0x101, &unit, 1).unwrap());
        stream.push(TsPacketBuilder::new(0x100).pcr(900).build().unwrap());

        let task = tokio::spawn(cell.run());
        upstream.start().unwrap();
        for pkt in stream {
            upstream.put_output(Unit::new(pkt)).await.unwrap();
        }
        upstream
            .put_output(Unit::new(b"raw".to_vec()))
            .await
            .unwrap();
        upstream.stop().unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(PipeError::InvalidUnitFormat { .. })
        ));
        let report = std::fs::read_to_string(dir.path().join("vbv_257.txt")).unwrap();
        assert_eq!(
            report,
            "pid 257\n  [ start , end ] dts -> pcr vbv\n  [ 1 , 1 ] 300000 -> 300 299700\n"
        );
    }
}
