//! `simulate` subcommand argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Deterministic single-flow network simulator.
#[derive(Parser, Debug)]
#[command(name = "netsim-sim", about = "Congestion control / video codec network simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run one simulation and write its telemetry to `--save-dir`.
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Trace JSON path. Falls back to a built-in deterministic scenario
    /// trace when absent.
    #[arg(long)]
    pub trace: Option<PathBuf>,

    /// Lookup-table CSV path. Required for `--app video_streaming`.
    #[arg(long)]
    pub lookup_table: Option<PathBuf>,

    /// Directory to write `pkt_log.csv`, `decoder_log.csv`, and the
    /// per-algorithm telemetry logs into.
    #[arg(long, default_value = "out")]
    pub save_dir: PathBuf,

    /// Congestion control algorithm.
    #[arg(long, default_value = "aurora")]
    pub cc: String,

    /// Application driving the flow.
    #[arg(long, default_value = "file_transfer")]
    pub app: String,

    /// Aurora policy checkpoint (linear weights/bias JSON). Falls back to
    /// a uniform random policy when absent.
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Run Aurora in app-aware (decoder-quality-guided) reward mode
    /// instead of the classical throughput/delay/loss reward.
    #[arg(long, default_value_t = false)]
    pub ae_guided: bool,

    /// RNG seed, for reproducible random loss/policy/scenario draws.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Simulated duration, in seconds.
    #[arg(long, default_value_t = 30)]
    pub duration_sec: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcChoice {
    Aurora,
    Bbr,
    Gcc,
    Oracle,
    OracleNoPredict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppChoice {
    FileTransfer,
    VideoStreaming,
}

impl std::str::FromStr for CcChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aurora" => Ok(CcChoice::Aurora),
            "bbr" => Ok(CcChoice::Bbr),
            "gcc" => Ok(CcChoice::Gcc),
            "oracle" => Ok(CcChoice::Oracle),
            "oracle_no_predict" => Ok(CcChoice::OracleNoPredict),
            other => Err(other.to_string()),
        }
    }
}

impl std::str::FromStr for AppChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_transfer" => Ok(AppChoice::FileTransfer),
            "video_streaming" => Ok(AppChoice::VideoStreaming),
            other => Err(other.to_string()),
        }
    }
}
