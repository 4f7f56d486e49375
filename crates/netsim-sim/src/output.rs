//! CSV/JSON writers for one run's persisted telemetry.

use std::path::Path;

use serde::Serialize;

use netsim_core::stats::{PktEvent, PktEventKind};

/// A [`PktEvent`] tagged with which host recorded it — `pkt_log.csv`
/// interleaves sender- and receiver-side events in one file.
#[derive(Debug, Clone, Serialize)]
pub struct PktLogRow {
    pub side: &'static str,
    pub ts_ms: u64,
    pub pkt_id: u64,
    pub kind: String,
    pub event: PktEventKind,
    pub size_bytes: usize,
    pub owd_ms: Option<u64>,
    pub rtt_ms: Option<u64>,
    pub queue_size_bytes: Option<usize>,
}

impl PktLogRow {
    pub fn new(side: &'static str, event: PktEvent) -> Self {
        PktLogRow {
            side,
            ts_ms: event.ts_ms,
            pkt_id: event.pkt_id,
            kind: event.kind,
            event: event.event,
            size_bytes: event.size_bytes,
            owd_ms: event.owd_ms,
            rtt_ms: event.rtt_ms,
            queue_size_bytes: event.queue_size_bytes,
        }
    }
}

/// Manifest written alongside the CSVs, recording what produced them.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub trace_path: Option<String>,
    pub lookup_table_path: Option<String>,
    pub cc: String,
    pub app: String,
    pub seed: u64,
    pub duration_sec: u64,
    pub ae_guided: bool,
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), crate::error::RunError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes every persisted log and the manifest into `save_dir`, creating
/// it if it doesn't already exist.
pub fn write_run_outputs(
    save_dir: &Path,
    outputs: &crate::simulator::RunOutputs,
    manifest: &RunManifest,
) -> Result<(), crate::error::RunError> {
    std::fs::create_dir_all(save_dir)?;

    write_csv(&save_dir.join("pkt_log.csv"), &outputs.pkt_log)?;
    write_csv(&save_dir.join("decoder_log.csv"), &outputs.decoder_log)?;
    write_csv(&save_dir.join("encoder_log.csv"), &outputs.encoder_log)?;
    write_csv(&save_dir.join("aurora_mi_log.csv"), &outputs.aurora_mi_log)?;
    write_csv(&save_dir.join("gcc_log_0.csv"), &outputs.gcc_sender_log)?;
    write_csv(&save_dir.join("gcc_log_1.csv"), &outputs.gcc_delay_log)?;
    write_csv(&save_dir.join("pacer_log.csv"), &outputs.pacer_log)?;

    let manifest_json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(save_dir.join("manifest.json"), manifest_json)?;

    Ok(())
}
