use super::vbv::VbvRecord;
use crate::error::{PipeError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Header line of the CSV report.
pub const CSV_HEADER: &str =
    "pid,length,dts,start_index,start_pcr,start_vbv,end_index,end_pcr,end_vbv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Text => f.write_str("text"),
            ReportFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" | "txt" => Ok(ReportFormat::Text),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(PipeError::InvalidCellConfig(format!(
                "unknown report format {}",
                other
            ))),
        }
    }
}

fn optional(value: Option<impl fmt::Display>) -> String {
    value.map_or_else(|| String::from("-"), |v| v.to_string())
}

/// One PID's records, values in 27 MHz ticks:
///
/// ```text
/// pid 257
///   [ start , end ] dts -> pcr vbv
///   [ 40 , 60 ] 1500000 -> 16800400 -15300400
/// ```
pub fn render_text<W: Write>(out: &mut W, pid: u16, records: &[VbvRecord]) -> io::Result<()> {
    writeln!(out, "pid {}", pid)?;
    writeln!(out, "  [ start , end ] dts -> pcr vbv")?;
    for record in records {
        writeln!(
            out,
            "  [ {} , {} ] {} -> {} {}",
            record.start_index,
            record.end_index,
            optional(record.dts_27mhz()),
            record.end_pcr,
            optional(record.delta())
        )?;
    }
    Ok(())
}

/// One PID's records as CSV rows, no header.
pub fn render_csv<W: Write>(out: &mut W, records: &[VbvRecord]) -> io::Result<()> {
    for record in records {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            record.pid,
            record.length,
            record.dts_27mhz().map(|v| v.to_string()).unwrap_or_default(),
            record.start_index,
            record.start_pcr,
            record.start_delta().map(|v| v.to_string()).unwrap_or_default(),
            record.end_index,
            record.end_pcr,
            record.delta().map(|v| v.to_string()).unwrap_or_default()
        )?;
    }
    Ok(())
}

fn render<W: Write>(
    out: &mut W,
    format: ReportFormat,
    pid: u16,
    records: &[VbvRecord],
    header: bool,
) -> io::Result<()> {
    match format {
        ReportFormat::Text => render_text(out, pid, records),
        ReportFormat::Csv => {
            if header {
                writeln!(out, "{}", CSV_HEADER)?;
            }
            render_csv(out, records)
        }
    }
}

/// Writes every PID's records, one `vbv_<pid>.<ext>` file each in `dir`,
/// or all of them to `out` when no directory is given.
pub fn write_report<W: Write>(
    records: &BTreeMap<u16, Vec<VbvRecord>>,
    format: ReportFormat,
    dir: Option<&Path>,
    out: &mut W,
) -> Result<()> {
    match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            for (pid, records) in records {
                let path = dir.join(format!("vbv_{}.{}", pid, format.extension()));
                let mut file = BufWriter::new(File::create(&path)?);
                render(&mut file, format, *pid, records, true)?;
                file.flush()?;
            }
        }
        None => {
            for (i, (pid, records)) in records.iter().enumerate() {
                render(out, format, *pid, records, i == 0)?;
            }
            out.flush()?;
        }
    }
    Ok(())
}
