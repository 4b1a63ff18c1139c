use crate::config::{ReplayConfig, SrtConfig};
use crate::protocols::camel::{CamelSrtInfo, CamelTracker};
use crate::stats::SrtStats;
use crate::tcaptrack::dialogue_id::AddrParseError;
use crate::tcaptrack::{capture_time, Role, SignalingAddr, TcapMessage};

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use cpu_time::ProcessTime;
use serde::Deserialize;
use thiserror::Error;

/// One row of a replay input file: the decoded facts of a TCAP message.
///
/// Columns are `frame,secs,nsecs,role,src_tid,dst_tid,src,dst,opcode,application_context`.
/// Transaction ids are decimal or `0x`-prefixed hexadecimal, addresses are `pc:<code>`, a bare
/// point code, or an IP address. `dst_tid`, `opcode` and `application_context` may be empty.
#[derive(Debug, Clone, Deserialize)]
pub struct FactRecord {
    pub frame: u32,
    pub secs: i64,
    pub nsecs: u32,
    pub role: Role,
    pub src_tid: String,
    pub dst_tid: String,
    pub src: String,
    pub dst: String,
    pub opcode: Option<u8>,
    pub application_context: Option<String>,
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Frame {frame}: invalid capture time")]
    InvalidTimestamp { frame: u32 },

    #[error("Frame {frame}: invalid transaction id {value:?}")]
    InvalidTid { frame: u32, value: String },

    #[error("Frame {frame}: invalid address")]
    InvalidAddress { frame: u32, source: AddrParseError },
}

/// Parses a decimal or `0x`-prefixed hexadecimal transaction id. An empty field is `0`.
fn parse_tid(frame: u32, value: &str) -> Result<u32, ReplayError> {
    let trimmed = value.trim();
    let parsed = if trimmed.is_empty() {
        Ok(0)
    } else if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else {
        trimmed.parse::<u32>()
    };
    parsed.map_err(|_| ReplayError::InvalidTid {
        frame,
        value: value.to_string(),
    })
}

impl TryFrom<FactRecord> for TcapMessage {
    type Error = ReplayError;

    fn try_from(record: FactRecord) -> Result<Self, Self::Error> {
        let frame = record.frame;
        let timestamp = capture_time(record.secs, record.nsecs)
            .ok_or(ReplayError::InvalidTimestamp { frame })?;
        let addr = |value: &str| {
            value
                .parse::<SignalingAddr>()
                .map_err(|source| ReplayError::InvalidAddress { frame, source })
        };
        let mut msg = TcapMessage::new(
            record.role,
            parse_tid(frame, &record.src_tid)?,
            parse_tid(frame, &record.dst_tid)?,
            addr(&record.src)?,
            addr(&record.dst)?,
            frame,
            timestamp,
        );
        msg.opcode = record.opcode;
        msg.application_context = record.application_context.filter(|oid| !oid.is_empty());
        Ok(msg)
    }
}

/// Reads every message of a replay input file, in file order.
pub fn read_facts<P: AsRef<Path>>(path: P) -> Result<Vec<TcapMessage>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Unable to open replay input {:?}", path))?;
    let mut messages = vec![];
    for record in rdr.deserialize() {
        let record: FactRecord = record?;
        messages.push(TcapMessage::try_from(record)?);
    }
    Ok(messages)
}

/// Totals of a replay run.
#[derive(Debug)]
pub struct ReplaySummary {
    /// Messages processed, across all passes.
    pub nb_msgs: usize,
    /// Passes over the input.
    pub nb_passes: usize,
    /// Dialogues still tracked at the end of the run.
    pub nb_dialogues: usize,
    /// Response time statistics of the first pass.
    pub stats: SrtStats,
    /// Processing time.
    pub cpu_time: Duration,
}

pub(crate) struct OfflineRuntime<'a> {
    pub(crate) options: OfflineOptions,
    pub(crate) callback: Box<dyn FnMut(&CamelSrtInfo) + 'a>,
}

impl<'a> OfflineRuntime<'a> {
    pub(crate) fn new(options: OfflineOptions, callback: Box<dyn FnMut(&CamelSrtInfo) + 'a>) -> Self {
        OfflineRuntime { options, callback }
    }

    pub(crate) fn run(&mut self) -> Result<ReplaySummary> {
        let input = self.options.replay.input.as_str();
        log::info!("Launched offline analysis. Processing: {}", input);

        let messages = read_facts(input)?;
        let mut tracker = CamelTracker::new(&self.options.config);
        let mut stats = SrtStats::new()?;
        let mut nb_msgs = 0;

        let start = ProcessTime::try_now().context("Getting process time failed")?;
        for pass in 0..self.options.replay.passes {
            log::debug!("Pass {} over {} messages", pass + 1, messages.len());
            for msg in messages.iter() {
                let info = tracker.process(msg);
                if pass == 0 {
                    stats.record_all(info.results())?;
                }
                (self.callback)(&info);
                nb_msgs += 1;
            }
        }
        let cpu_time = start.elapsed();
        println!(
            "Processed: {} msgs in {} passes",
            nb_msgs, self.options.replay.passes
        );
        println!("CPU time: {:?}ms", cpu_time.as_millis());

        Ok(ReplaySummary {
            nb_msgs,
            nb_passes: self.options.replay.passes,
            nb_dialogues: tracker.tcap().size(),
            stats,
            cpu_time,
        })
    }
}

/// Read-only runtime options for the offline replay
#[derive(Debug)]
pub(crate) struct OfflineOptions {
    pub(crate) replay: ReplayConfig,
    pub(crate) config: SrtConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(role: Role, src_tid: &str, dst_tid: &str) -> FactRecord {
        FactRecord {
            frame: 4,
            secs: 1_700_000_000,
            nsecs: 250_000_000,
            role,
            src_tid: src_tid.to_string(),
            dst_tid: dst_tid.to_string(),
            src: "pc:100".to_string(),
            dst: "10.1.1.1".to_string(),
            opcode: Some(31),
            application_context: Some(String::new()),
        }
    }

    #[test]
    fn core_fact_record_conversion() {
        let msg = TcapMessage::try_from(record(Role::Continue, "0x1A2B", "77")).unwrap();
        assert_eq!(msg.src_tid, 0x1a2b);
        assert_eq!(msg.dst_tid, 77);
        assert_eq!(msg.opcode, Some(31));
        assert_eq!(msg.application_context, None);
        assert_eq!(msg.timestamp, capture_time(1_700_000_000, 250_000_000).unwrap());
        assert!(matches!(msg.dst, SignalingAddr::Ip(_)));

        let begin = TcapMessage::try_from(record(Role::Begin, "12", "")).unwrap();
        assert_eq!(begin.dst_tid, 0);
    }

    #[test]
    fn core_fact_record_invalid() {
        assert!(matches!(
            TcapMessage::try_from(record(Role::Begin, "0xZZ", "")),
            Err(ReplayError::InvalidTid { frame: 4, .. })
        ));
        let mut bad = record(Role::Begin, "1", "");
        bad.src = "somewhere".to_string();
        assert!(matches!(
            TcapMessage::try_from(bad),
            Err(ReplayError::InvalidAddress { .. })
        ));
        let mut bad = record(Role::Begin, "1", "");
        bad.nsecs = 2_000_000_000;
        assert!(matches!(
            TcapMessage::try_from(bad),
            Err(ReplayError::InvalidTimestamp { .. })
        ));
    }
}
