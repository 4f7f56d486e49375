//! The precomputed `(frame_id, model_id, quantised_loss) -> (size, ssim)`
//! table the auto-encoder would otherwise compute live. Loaded once at
//! startup and treated as immutable.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct LookupRow {
    frame_id: u64,
    model_id: u32,
    loss: f64,
    size: usize,
    ssim: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct LookupEntry {
    pub size_bytes: usize,
    pub ssim: f64,
}

/// Rounds a raw loss fraction to the nearest tenth, matching the table's
/// quantisation (§4.10, §GLOSSARY "Frame loss rate").
pub fn quantise_loss(loss: f64) -> u8 {
    (loss.clamp(0.0, 1.0) * 10.0).round() as u8
}

pub struct LookupTable {
    /// `(frame_id % n_frames, model_id, quantised_loss_tenths) -> entry`.
    entries: HashMap<(u64, u32, u8), LookupEntry>,
    n_frames: u64,
    models_by_frame: HashMap<u64, Vec<u32>>,
}

impl LookupTable {
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let rows: Vec<LookupRow> = reader
            .deserialize()
            .collect::<Result<_, csv::Error>>()?;
        if rows.is_empty() {
            return Err(AppError::EmptyLookupTable);
        }

        // frame_id may be 0- or 1-indexed in source data; normalise to 0.
        let min_frame_id = rows.iter().map(|r| r.frame_id).min().unwrap();

        let mut entries = HashMap::new();
        let mut models_by_frame: HashMap<u64, Vec<u32>> = HashMap::new();
        let mut max_frame_id = 0u64;

        for row in rows {
            let frame_id = row.frame_id - min_frame_id;
            max_frame_id = max_frame_id.max(frame_id);
            let tenths = quantise_loss(row.loss);
            entries.insert(
                (frame_id, row.model_id, tenths),
                LookupEntry {
                    size_bytes: row.size,
                    ssim: row.ssim,
                },
            );
            models_by_frame.entry(frame_id).or_default().push(row.model_id);
        }

        for models in models_by_frame.values_mut() {
            models.sort_unstable();
            models.dedup();
        }

        Ok(LookupTable {
            entries,
            n_frames: max_frame_id + 1,
            models_by_frame,
        })
    }

    pub fn n_frames(&self) -> u64 {
        self.n_frames
    }

    /// For `frame_id` (wrapped modulo the table's frame count), pick the
    /// largest-size model whose zero-loss size fits `target_bytes`,
    /// falling back to the smallest available model.
    pub fn best_model_for_target(&self, frame_id: u64, target_bytes: usize) -> AppResult<(u32, LookupEntry)> {
        let frame_id = frame_id % self.n_frames;
        let models = self
            .models_by_frame
            .get(&frame_id)
            .ok_or(AppError::NoRowsForFrame(frame_id))?;

        let mut best: Option<(u32, LookupEntry)> = None;
        let mut smallest: Option<(u32, LookupEntry)> = None;
        for &model_id in models {
            if let Some(&entry) = self.entries.get(&(frame_id, model_id, 0)) {
                if smallest.is_none() || entry.size_bytes < smallest.unwrap().1.size_bytes {
                    smallest = Some((model_id, entry));
                }
                if entry.size_bytes <= target_bytes
                    && best.map_or(true, |(_, b)| entry.size_bytes > b.size_bytes)
                {
                    best = Some((model_id, entry));
                }
            }
        }
        best.or(smallest).ok_or(AppError::NoRowsForFrame(frame_id))
    }

    pub fn entry(&self, frame_id: u64, model_id: u32, loss: f64) -> Option<LookupEntry> {
        let frame_id = frame_id % self.n_frames;
        self.entries
            .get(&(frame_id, model_id, quantise_loss(loss)))
            .copied()
    }
}
