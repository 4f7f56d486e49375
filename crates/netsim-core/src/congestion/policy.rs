//! The learned-policy callout Aurora's monitor-interval engine drives.
//!
//! The real system trains this externally (a neural net, or a process
//! over a socket); the core only needs the contract. Two trivial
//! implementations exist for tests and for running without a trained
//! model at hand, plus a linear-model loader for running a checkpoint
//! exported from that external training loop.

use std::path::Path;

use rand::Rng;
use rand::rngs::StdRng;
use serde::Deserialize;

/// `observation[H*F] -> action`. Implementations must be deterministic
/// given the same observation and, if randomised, the same RNG state.
pub trait Policy {
    fn predict(&mut self, observation: &[f32]) -> f32;
}

/// Draws `Δ ~ U[-1, 1]`, ignoring the observation. Stand-in for an
/// untrained policy when no model checkpoint is supplied.
pub struct UniformRandomPolicy {
    rng: StdRng,
}

impl UniformRandomPolicy {
    pub fn new(rng: StdRng) -> Self {
        UniformRandomPolicy { rng }
    }
}

impl Policy for UniformRandomPolicy {
    fn predict(&mut self, _observation: &[f32]) -> f32 {
        self.rng.random_range(-1.0..=1.0)
    }
}

/// Always returns the same fixed delta. Useful for deterministic tests
/// that want to pin the rate trajectory.
pub struct FixedDeltaPolicy {
    delta: f32,
}

impl FixedDeltaPolicy {
    pub fn new(delta: f32) -> Self {
        FixedDeltaPolicy { delta }
    }
}

impl Policy for FixedDeltaPolicy {
    fn predict(&mut self, _observation: &[f32]) -> f32 {
        self.delta
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy weights file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse policy weights file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct LinearPolicyFile {
    weights: Vec<f32>,
    bias: f32,
}

/// A trained model exported as flat weights/bias: `action = clamp(w·x +
/// b, -1, 1)`. Lets `--model PATH` name a concrete, loadable checkpoint
/// without the core depending on any particular training framework.
pub struct LinearPolicy {
    weights: Vec<f32>,
    bias: f32,
}

impl LinearPolicy {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let data = std::fs::read_to_string(path)?;
        let file: LinearPolicyFile = serde_json::from_str(&data)?;
        Ok(LinearPolicy {
            weights: file.weights,
            bias: file.bias,
        })
    }
}

impl Policy for LinearPolicy {
    fn predict(&mut self, observation: &[f32]) -> f32 {
        let dot: f32 = self
            .weights
            .iter()
            .zip(observation.iter())
            .map(|(w, x)| w * x)
            .sum();
        (dot + self.bias).clamp(-1.0, 1.0)
    }
}
