use clap::Parser;
use tracing_subscriber::EnvFilter;

use netsim_sim::cli::{Cli, Command};
use netsim_sim::error::{ExitBucket, RunError};
use netsim_sim::output::{write_run_outputs, RunManifest};
use netsim_sim::simulator::Simulator;

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let Command::Simulate(args) = cli.command;

    match run(&args) {
        Ok(()) => std::process::ExitCode::from(ExitBucket::Success.code() as u8),
        Err(err) => {
            tracing::error!(%err, "simulation run failed");
            std::process::ExitCode::from(err.exit_bucket().code() as u8)
        }
    }
}

fn run(args: &netsim_sim::cli::SimulateArgs) -> Result<(), RunError> {
    let manifest = RunManifest {
        trace_path: args.trace.as_ref().map(|p| p.display().to_string()),
        lookup_table_path: args.lookup_table.as_ref().map(|p| p.display().to_string()),
        cc: args.cc.clone(),
        app: args.app.clone(),
        seed: args.seed,
        duration_sec: args.duration_sec,
        ae_guided: args.ae_guided,
    };

    let sim = Simulator::build(args)?;
    let outputs = sim.run()?;
    write_run_outputs(&args.save_dir, &outputs, &manifest)?;
    Ok(())
}
