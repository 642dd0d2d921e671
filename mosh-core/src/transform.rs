//! # Transforms
//!
//! Pure functions from one record sequence to another. Payload bytes are
//! never touched; every effect comes from which records appear, in what
//! order, and with which flags.
//!
//! Transforms are configured as data so a chain can be loaded from a JSON
//! recipe:
//!
//! ```json
//! [
//!   {"kind": "stutter", "step": 0.1111, "ceiling": 50.0},
//!   {"kind": "resync"}
//! ]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AviError;
use crate::index::{IndexRecord, AVIIF_KEYFRAME};

pub const DEFAULT_STUTTER_STEP: f64 = 0.1111;
pub const DEFAULT_STUTTER_CEILING: f64 = 50.0;
pub const DEFAULT_LOOKAHEAD_WINDOW: usize = 35;

fn default_step() -> f64 {
    DEFAULT_STUTTER_STEP
}

fn default_ceiling() -> f64 {
    DEFAULT_STUTTER_CEILING
}

fn default_window() -> usize {
    DEFAULT_LOOKAHEAD_WINDOW
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    Identity,
    StripKeyframes,
    Resync,
    Stutter {
        #[serde(default = "default_step")]
        step: f64,
        #[serde(default = "default_ceiling")]
        ceiling: f64,
    },
    Lookahead {
        #[serde(default = "default_window")]
        window: usize,
    },
}

impl Transform {
    pub fn stutter() -> Self {
        Transform::Stutter {
            step: DEFAULT_STUTTER_STEP,
            ceiling: DEFAULT_STUTTER_CEILING,
        }
    }

    pub fn lookahead() -> Self {
        Transform::Lookahead {
            window: DEFAULT_LOOKAHEAD_WINDOW,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Identity => "identity",
            Transform::StripKeyframes => "strip_keyframes",
            Transform::Resync => "resync",
            Transform::Stutter { .. } => "stutter",
            Transform::Lookahead { .. } => "lookahead",
        }
    }

    pub fn validate(&self) -> Result<(), AviError> {
        match *self {
            Transform::Stutter { step, ceiling } => {
                if !step.is_finite() || step <= 0.0 {
                    return Err(AviError::InvalidTransform(format!(
                        "stutter step must be a positive number, got {}",
                        step
                    )));
                }
                if !ceiling.is_finite() || ceiling < 1.0 {
                    return Err(AviError::InvalidTransform(format!(
                        "stutter ceiling must be at least 1, got {}",
                        ceiling
                    )));
                }
            }
            Transform::Lookahead { window: 0 } => {
                return Err(AviError::InvalidTransform("lookahead window must be non-zero".into()));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn apply(&self, records: &[IndexRecord]) -> Result<Vec<IndexRecord>, AviError> {
        self.validate()?;
        let out = match *self {
            Transform::Identity => records.to_vec(),
            Transform::StripKeyframes => strip_keyframes(records),
            Transform::Resync => resync(records),
            Transform::Stutter { step, ceiling } => stutter(records, step, ceiling),
            Transform::Lookahead { window } => lookahead(records, window)?,
        };
        debug!("{}: {} -> {} records", self.name(), records.len(), out.len());
        Ok(out)
    }
}

/// Transforms applied left to right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformChain(pub Vec<Transform>);

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, transform: Transform) -> Self {
        self.0.push(transform);
        self
    }

    pub fn push(&mut self, transform: Transform) {
        self.0.push(transform);
    }

    pub fn extend(&mut self, other: TransformChain) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, AviError> {
        let chain: TransformChain = serde_json::from_str(json)?;
        for transform in &chain.0 {
            transform.validate()?;
        }
        Ok(chain)
    }

    pub fn load(path: &Path) -> Result<Self, AviError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn apply(&self, records: &[IndexRecord]) -> Result<Vec<IndexRecord>, AviError> {
        let mut current = records.to_vec();
        for transform in &self.0 {
            current = transform.apply(&current)?;
        }
        Ok(current)
    }
}

/// Clear the keyframe bit on every video keyframe.
pub fn strip_keyframes(records: &[IndexRecord]) -> Vec<IndexRecord> {
    records
        .iter()
        .map(|r| {
            if r.is_keyframe() {
                r.with_flags(r.flags() & !AVIIF_KEYFRAME)
            } else {
                *r
            }
        })
        .collect()
}

/// Replace every video keyframe with a copy of the most recent delta frame.
///
/// The anchor starts as the first keyframe itself, so a keyframe seen
/// before any delta frame passes through unchanged. Video count and
/// audio order are preserved; a sequence without keyframes is returned
/// as is.
pub fn resync(records: &[IndexRecord]) -> Vec<IndexRecord> {
    let Some(mut anchor) = records.iter().find(|r| r.is_keyframe()).copied() else {
        return records.to_vec();
    };

    records
        .iter()
        .map(|r| {
            if r.is_deltaframe() {
                anchor = *r;
                *r
            } else if r.is_keyframe() {
                anchor
            } else {
                *r
            }
        })
        .collect()
}

/// Emit each delta or audio frame `floor(counter)` times, where the
/// counter starts at 1 and grows by `step` per such frame until it passes
/// `ceiling`. Keyframes and other records are emitted once.
pub fn stutter(records: &[IndexRecord], step: f64, ceiling: f64) -> Vec<IndexRecord> {
    let mut out = Vec::with_capacity(records.len());
    let mut counter = 1.0_f64;
    for record in records {
        if record.is_deltaframe() || record.is_audio() {
            if counter <= ceiling {
                counter += step;
            }
            let repeats = counter.floor() as usize;
            out.extend(std::iter::repeat(*record).take(repeats));
        } else {
            out.push(*record);
        }
    }
    out
}

/// For every position `i`, emit records `i..i + window`, stopping at the
/// first window that would run past the end.
pub fn lookahead(records: &[IndexRecord], window: usize) -> Result<Vec<IndexRecord>, AviError> {
    if window == 0 {
        return Err(AviError::InvalidTransform("lookahead window must be non-zero".into()));
    }
    if records.is_empty() {
        return Ok(Vec::new());
    }
    if window > records.len() {
        return Err(AviError::OutOfRange {
            index: window,
            len: records.len(),
        });
    }

    let mut out = Vec::with_capacity((records.len() - window + 1) * window);
    for start in records.windows(window) {
        out.extend_from_slice(start);
    }
    Ok(out)
}
