use crate::error::{PipeError, Result};
use crate::format::ts::types::pts_to_pcr;
use crate::format::ts::{Accumulator, PESHeader, TsPacket, PID_NULL};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// What the analyzer tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbvConfig {
    /// PID whose adaptation fields carry the reference PCR
    pub pcr_pid: u16,
    /// PIDs to analyze; empty tracks every PID carrying PES data
    pub pids: BTreeSet<u16>,
}

impl VbvConfig {
    pub fn new(pcr_pid: u16) -> Self {
        Self {
            pcr_pid,
            pids: BTreeSet::new(),
        }
    }

    pub fn with_pids(mut self, pids: impl IntoIterator<Item = u16>) -> Self {
        self.pids.extend(pids);
        self
    }
}

/// A PCR observation: stream position and 27 MHz value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcrSample {
    pub index: u64,
    pub pcr: u64,
}

/// Linear PCR estimate for the packet at `index`, from the samples around it.
///
/// Integer arithmetic truncating toward zero; `next.index` must exceed `prev.index`.
pub fn interpolate_pcr(prev: PcrSample, next: PcrSample, index: u64) -> u64 {
    let span = next.index as i128 - prev.index as i128;
    if span == 0 {
        return prev.pcr;
    }
    let offset = (next.pcr as i128 - prev.pcr as i128) * (index as i128 - prev.index as i128);
    (prev.pcr as i128 + offset / span) as u64
}

/// Arrival and delivery timing of one PES unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbvRecord {
    pub pid: u16,
    /// Bytes of the reassembled unit
    pub length: usize,
    /// Decode time in 90 kHz ticks; PTS when the unit has no DTS
    pub dts: Option<u64>,
    pub start_index: u64,
    pub start_pcr: u64,
    pub end_index: u64,
    pub end_pcr: u64,
}

impl VbvRecord {
    fn open(pid: u16, index: u64, pcr: u64) -> Self {
        Self {
            pid,
            length: 0,
            dts: None,
            start_index: index,
            start_pcr: pcr,
            end_index: index,
            end_pcr: pcr,
        }
    }

    /// Decode time in 27 MHz ticks.
    pub fn dts_27mhz(&self) -> Option<u64> {
        self.dts.map(pts_to_pcr)
    }

    /// Margin between the decode time and the arrival of the unit's last byte.
    pub fn delta(&self) -> Option<i64> {
        self.dts_27mhz()
            .map(|dts| dts as i64 - self.end_pcr as i64)
    }

    /// Margin between the decode time and the arrival of the unit's first byte.
    pub fn start_delta(&self) -> Option<i64> {
        self.dts_27mhz()
            .map(|dts| dts as i64 - self.start_pcr as i64)
    }
}

#[derive(Debug)]
struct Pending {
    index: u64,
    packet: TsPacket,
}

/// Measures, per PES unit, how far ahead of its decode time it was delivered.
///
/// Packets on tracked PIDs wait until the next PCR sample so their arrival
/// time can be interpolated between two samples; packets seen before the
/// first sample never get a time and are dropped.
#[derive(Debug)]
pub struct VbvAnalyzer {
    config: VbvConfig,
    accumulator: Accumulator,
    pending: Vec<Pending>,
    last_pcr: Option<PcrSample>,
    current: HashMap<u16, VbvRecord>,
    records: BTreeMap<u16, Vec<VbvRecord>>,
    ignored: HashSet<u16>,
    index: u64,
    preroll: u64,
}

impl VbvAnalyzer {
    pub fn new(config: VbvConfig) -> Self {
        Self {
            config,
            accumulator: Accumulator::new(),
            pending: Vec::new(),
            last_pcr: None,
            current: HashMap::new(),
            records: BTreeMap::new(),
            ignored: HashSet::new(),
            index: 0,
            preroll: 0,
        }
    }

    pub fn config(&self) -> &VbvConfig {
        &self.config
    }

    /// Packets seen so far, including the rejected one if any.
    pub fn packets(&self) -> u64 {
        self.index
    }

    pub fn last_pcr(&self) -> Option<PcrSample> {
        self.last_pcr
    }

    /// Packets waiting for the next PCR sample.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Tracked packets dropped because no PCR sample was known yet.
    pub fn preroll(&self) -> u64 {
        self.preroll
    }

    pub fn is_tracked(&self, pid: u16) -> bool {
        if self.ignored.contains(&pid) {
            return false;
        }
        if self.config.pids.is_empty() {
            pid != PID_NULL
        } else {
            self.config.pids.contains(&pid)
        }
    }

    /// Finalized records, ordered by PID then completion.
    pub fn records(&self) -> &BTreeMap<u16, Vec<VbvRecord>> {
        &self.records
    }

    pub fn finish(self) -> BTreeMap<u16, Vec<VbvRecord>> {
        self.records
    }

    /// Feeds the next packet of the stream.
    ///
    /// A structurally invalid packet, or a tracked unit that is not PES when
    /// PIDs were listed explicitly, is fatal: the error is returned and
    /// records finalized so far stay available.
    pub fn process(&mut self, pkt: TsPacket) -> Result<()> {
        let index = self.index;
        self.index += 1;
        pkt.check_errors()?;

        let pid = pkt.pid();
        let pcr = if pid == self.config.pcr_pid {
            pkt.pcr()?
        } else {
            None
        };
        if self.is_tracked(pid) {
            if self.last_pcr.is_some() {
                self.pending.push(Pending { index, packet: pkt });
            } else {
                self.preroll += 1;
            }
        }
        if let Some(pcr) = pcr {
            self.on_pcr(PcrSample { index, pcr })?;
        }
        Ok(())
    }

    fn on_pcr(&mut self, sample: PcrSample) -> Result<()> {
        match self.last_pcr {
            Some(prev) => {
                for record in std::mem::take(&mut self.pending) {
                    let pcr = interpolate_pcr(prev, sample, record.index);
                    self.drain(record, pcr)?;
                }
            }
            None if self.preroll > 0 => {
                debug!("dropped {} packets before the first pcr", self.preroll);
            }
            None => {}
        }
        self.last_pcr = Some(sample);
        Ok(())
    }

    fn drain(&mut self, pending: Pending, pcr: u64) -> Result<()> {
        let Pending { index, packet } = pending;
        let pid = packet.pid();
        if self.ignored.contains(&pid) {
            return Ok(());
        }
        if !self.current.contains_key(&pid) {
            if !packet.payload_unit_start() {
                return Ok(());
            }
            self.current.insert(pid, VbvRecord::open(pid, index, pcr));
        }

        if let Some(unit) = self.accumulator.add(&packet)? {
            let header = match PESHeader::parse(&unit.data) {
                Ok(header) => header,
                Err(e) if self.config.pids.is_empty() => {
                    info!("pid {} does not carry PES ({}), no longer tracked", pid, e);
                    self.ignored.insert(pid);
                    self.current.remove(&pid);
                    self.accumulator.reset_pid(pid);
                    return Ok(());
                }
                Err(e) => {
                    return Err(PipeError::InvalidData(format!("pid {}: {}", pid, e)));
                }
            };
            if let Some(mut record) = self.current.remove(&pid) {
                record.dts = header.decode_time();
                record.length = unit.data.len();
                self.records.entry(pid).or_default().push(record);
            }
            self.current.insert(pid, VbvRecord::open(pid, index, pcr));
        }

        if let Some(record) = self.current.get_mut(&pid) {
            record.end_index = index;
            record.end_pcr = pcr;
        }
        Ok(())
    }
}
