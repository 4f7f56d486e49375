//! CLI runner for the congestion-control / video-codec network simulator:
//! wires one [`netsim_core::host::SenderHost`] and one
//! [`netsim_core::host::ReceiverHost`] to a data link and an ACK link,
//! runs the simulation to completion, and persists its telemetry.

pub mod cli;
pub mod error;
pub mod output;
pub mod scenario;
pub mod simulator;
