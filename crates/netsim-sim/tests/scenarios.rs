//! End-to-end scenario tests driving the CLI's own `Simulator` the way
//! `main` does, over synthetic traces and lookup tables built as temp
//! fixtures. Each test exercises one concrete flow/algorithm pairing and
//! checks the telemetry streams an operator would actually inspect.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use netsim_core::congestion::OveruseState;

use netsim_sim::cli::SimulateArgs;
use netsim_sim::simulator::{RunOutputs, Simulator};

fn temp_path(ext: &str) -> std::path::PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("netsim-scenario-test-{}-{}.{}", std::process::id(), id, ext))
}

fn write_file(contents: &str, ext: &str) -> std::path::PathBuf {
    let path = temp_path(ext);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

/// A lookup table with one model per frame, ssim gracefully decreasing
/// across every loss-quantisation tenth so a decoder that lands on any
/// loss bucket never silently falls back to the zero-default.
fn write_clean_video_lookup() -> std::path::PathBuf {
    let ssim_by_tenth = [0.95, 0.93, 0.90, 0.87, 0.84, 0.80, 0.76, 0.72, 0.68, 0.63, 0.58];
    let mut csv = String::from("frame_id,model_id,loss,size,ssim\n");
    for frame_id in 0..5u64 {
        for tenth in 0..=10u32 {
            let loss = tenth as f64 / 10.0;
            csv.push_str(&format!(
                "{frame_id},128,{loss},1200,{}\n",
                ssim_by_tenth[tenth as usize]
            ));
        }
    }
    write_file(&csv, "csv")
}

fn default_args() -> SimulateArgs {
    SimulateArgs {
        trace: None,
        lookup_table: None,
        save_dir: temp_path("outdir"),
        cc: "aurora".to_string(),
        app: "file_transfer".to_string(),
        model: None,
        ae_guided: false,
        seed: 0,
        duration_sec: 30,
    }
}

fn run(args: &SimulateArgs) -> RunOutputs {
    Simulator::build(args).expect("simulator builds").run().expect("simulation runs")
}

/// Counts rising-edge transitions into `Overuse` across a sequentially
/// drained delay log; a single sustained excursion logs many consecutive
/// `Overuse` rows, so raw counting would overstate how many times the
/// signal actually fired.
fn count_overuse_onsets(log: &[netsim_core::congestion::GccDelayLogRecord]) -> usize {
    let mut onsets = 0;
    let mut prev_overuse = false;
    for rec in log {
        let is_overuse = rec.state == OveruseState::Overuse;
        if is_overuse && !prev_overuse {
            onsets += 1;
        }
        prev_overuse = is_overuse;
    }
    onsets
}

#[test]
fn gcc_video_stream_over_clean_link_stays_high_quality_and_low_delay() {
    let lookup_path = write_clean_video_lookup();
    let trace_path = write_file(
        r#"{
            "duration": 30.0,
            "timestamps_sec": [0.0],
            "bandwidths_mbps": [0.6],
            "min_delay_ms": 25.0,
            "loss_rate": 0.0,
            "queue_size": 30,
            "delay_noise_ms": null
        }"#,
        "json",
    );

    let mut args = default_args();
    args.cc = "gcc".to_string();
    args.app = "video_streaming".to_string();
    args.trace = Some(trace_path.clone());
    args.lookup_table = Some(lookup_path.clone());
    args.seed = 42;

    let outputs = run(&args);

    assert!(!outputs.decoder_log.is_empty(), "video stream must decode at least one frame");
    let avg_ssim: f64 =
        outputs.decoder_log.iter().map(|r| r.ssim).sum::<f64>() / outputs.decoder_log.len() as f64;
    assert!(avg_ssim > 0.85, "avg ssim {avg_ssim} should stay high over a clean, well-headroomed link");

    let avg_delay_ms: f64 = outputs
        .decoder_log
        .iter()
        .map(|r| r.avg_delay_sec() * 1000.0)
        .sum::<f64>()
        / outputs.decoder_log.len() as f64;
    assert!(avg_delay_ms < 500.0, "avg decode delay {avg_delay_ms}ms should stay well under half a second");

    let onsets = count_overuse_onsets(&outputs.gcc_delay_log);
    assert!(onsets <= 3, "overuse signal fired {onsets} times on an uncongested link");

    let _ = std::fs::remove_file(&trace_path);
    let _ = std::fs::remove_file(&lookup_path);
}

#[test]
fn aurora_file_transfer_delivers_a_safe_floor_of_bytes_over_30s() {
    let trace_path = write_file(
        r#"{
            "duration": 30.0,
            "timestamps_sec": [0.0],
            "bandwidths_mbps": [5.0],
            "min_delay_ms": 25.0,
            "loss_rate": 0.0,
            "queue_size": 200,
            "delay_noise_ms": null
        }"#,
        "json",
    );

    let mut args = default_args();
    args.cc = "aurora".to_string();
    args.app = "file_transfer".to_string();
    args.trace = Some(trace_path.clone());
    args.seed = 123;
    args.duration_sec = 30;

    let outputs = run(&args);

    let delivered_bytes: u64 = outputs
        .pkt_log
        .iter()
        .filter(|row| row.side == "receiver" && row.kind == "DATA")
        .filter(|row| matches!(row.event, netsim_core::stats::PktEventKind::Arrived))
        .map(|row| row.size_bytes as u64)
        .sum();

    // Aurora's rate is driven by `UniformRandomPolicy`'s reflected random
    // walk, so the exact bytes delivered is seed-dependent and genuinely
    // stochastic. 2MB over 30s only requires an average throughput a
    // hair above the 62.5KB/s rate floor, which a fair random walk over
    // hundreds of monitor intervals is vanishingly unlikely to undershoot.
    assert!(
        delivered_bytes >= 2_000_000,
        "delivered only {delivered_bytes} bytes over 30s of a 5Mbps, loss-free link"
    );

    let _ = std::fs::remove_file(&trace_path);
}

#[test]
fn gcc_video_stream_reduces_rate_within_one_second_of_sustained_loss() {
    let lookup_path = write_clean_video_lookup();
    let trace_path = write_file(
        r#"{
            "duration": 10.0,
            "timestamps_sec": [0.0],
            "bandwidths_mbps": [2.0],
            "min_delay_ms": 25.0,
            "loss_rate": 0.15,
            "queue_size": 30,
            "delay_noise_ms": null
        }"#,
        "json",
    );

    let mut args = default_args();
    args.cc = "gcc".to_string();
    args.app = "video_streaming".to_string();
    args.trace = Some(trace_path.clone());
    args.lookup_table = Some(lookup_path.clone());
    args.seed = 7;
    args.duration_sec = 10;

    let outputs = run(&args);

    // RTCP reports land roughly every 50ms, so the first twenty records
    // span the run's first second.
    let initial_rate = outputs.gcc_sender_log.first().map(|r| r.effective_rate_bps);
    assert!(initial_rate.is_some(), "gcc must log at least one sender record");

    let early_window = &outputs.gcc_sender_log[..outputs.gcc_sender_log.len().min(20)];
    let reduced = early_window
        .iter()
        .any(|r| r.loss_fraction.is_some_and(|l| l > 0.10) && r.effective_rate_bps < initial_rate.unwrap());
    assert!(reduced, "pacing rate never dropped below its start within the first second of 15% loss");

    let _ = std::fs::remove_file(&trace_path);
    let _ = std::fs::remove_file(&lookup_path);
}

#[test]
fn repeated_runs_with_the_same_seed_produce_byte_identical_pkt_logs() {
    let trace_path = write_file(
        r#"{
            "duration": 5.0,
            "timestamps_sec": [0.0],
            "bandwidths_mbps": [1.0],
            "min_delay_ms": 20.0,
            "loss_rate": 0.05,
            "queue_size": 40,
            "delay_noise_ms": null
        }"#,
        "json",
    );

    let mut args = default_args();
    args.cc = "aurora".to_string();
    args.app = "file_transfer".to_string();
    args.trace = Some(trace_path.clone());
    args.seed = 99;
    args.duration_sec = 5;

    let first = run(&args);
    let second = run(&args);

    assert_eq!(first.pkt_log.len(), second.pkt_log.len());
    for (a, b) in first.pkt_log.iter().zip(second.pkt_log.iter()) {
        assert_eq!(a.ts_ms, b.ts_ms);
        assert_eq!(a.pkt_id, b.pkt_id);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.event, b.event);
        assert_eq!(a.size_bytes, b.size_bytes);
    }

    let _ = std::fs::remove_file(&trace_path);
}

#[test]
fn queue_occupancy_never_exceeds_its_configured_cap() {
    let trace_path = write_file(
        r#"{
            "duration": 10.0,
            "timestamps_sec": [0.0],
            "bandwidths_mbps": [0.2],
            "min_delay_ms": 25.0,
            "loss_rate": 0.0,
            "queue_size": 10,
            "delay_noise_ms": null
        }"#,
        "json",
    );

    let mut args = default_args();
    args.cc = "aurora".to_string();
    args.app = "file_transfer".to_string();
    args.trace = Some(trace_path.clone());
    args.seed = 5;
    args.duration_sec = 10;

    let outputs = run(&args);
    let cap_bytes = 10 * 1500;
    for row in &outputs.pkt_log {
        if let Some(q) = row.queue_size_bytes {
            assert!(q <= cap_bytes, "queue occupancy {q} exceeded its {cap_bytes}-byte cap");
        }
    }

    let _ = std::fs::remove_file(&trace_path);
}

#[test]
fn aurora_app_aware_video_stream_produces_valid_quality_telemetry_across_mis() {
    let lookup_path = write_clean_video_lookup();
    let trace_path = write_file(
        r#"{
            "duration": 20.0,
            "timestamps_sec": [0.0],
            "bandwidths_mbps": [1.2],
            "min_delay_ms": 25.0,
            "loss_rate": 0.0,
            "queue_size": 60,
            "delay_noise_ms": null
        }"#,
        "json",
    );

    let mut args = default_args();
    args.cc = "aurora".to_string();
    args.app = "video_streaming".to_string();
    args.ae_guided = true;
    args.trace = Some(trace_path.clone());
    args.lookup_table = Some(lookup_path.clone());
    args.seed = 77;
    args.duration_sec = 20;

    let outputs = run(&args);

    // `UniformRandomPolicy`'s random-walk rate draw makes it impossible to
    // guarantee a monotonic quality improvement between any two specific
    // monitor intervals without actually running the walk, so this checks
    // what app-aware mode must always produce regardless of the draw: a
    // populated MI log feeding real reward signals, and decoded frames
    // whose quality stays inside a valid ssim range.
    assert!(!outputs.aurora_mi_log.is_empty(), "app-aware aurora should close at least one monitor interval");
    assert!(!outputs.decoder_log.is_empty(), "video stream must decode at least one frame");
    for record in &outputs.decoder_log {
        assert!((0.0..=1.0).contains(&record.ssim), "ssim {} out of valid range", record.ssim);
    }
    for mi in &outputs.aurora_mi_log {
        assert!(mi.end_ms >= mi.start_ms, "monitor interval {} has end before start", mi.mi_index);
        assert!(mi.rate_bps > 0.0, "monitor interval {} logged a non-positive rate", mi.mi_index);
    }

    let _ = std::fs::remove_file(&trace_path);
    let _ = std::fs::remove_file(&lookup_path);
}

#[test]
fn total_loss_link_never_panics_and_delivers_nothing() {
    let trace_path = write_file(
        r#"{
            "duration": 3.0,
            "timestamps_sec": [0.0],
            "bandwidths_mbps": [1.0],
            "min_delay_ms": 25.0,
            "loss_rate": 1.0,
            "queue_size": 10,
            "delay_noise_ms": null
        }"#,
        "json",
    );

    let mut args = default_args();
    args.cc = "aurora".to_string();
    args.app = "file_transfer".to_string();
    args.trace = Some(trace_path.clone());
    args.seed = 1;
    args.duration_sec = 3;

    let outputs = run(&args);
    let delivered: usize = outputs
        .pkt_log
        .iter()
        .filter(|row| row.side == "receiver" && row.kind == "DATA")
        .count();
    assert_eq!(delivered, 0, "every data packet should be lost on a 100% loss link");

    let _ = std::fs::remove_file(&trace_path);
}
