//! Fingerprint produced by the hashing collaborator.

use serde::{Deserialize, Serialize};

/// Errors from the fingerprint collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    #[error("{hashes} hash frames but {toggles} toggle vectors")]
    Inconsistent { hashes: usize, toggles: usize },
    #[error("Toggle vector {frame} has {actual} entries, expected {expected}")]
    ToggleWidth {
        frame: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid fingerprint input: {0}")]
    InvalidInput(String),
}

/// Per-frame hash codes plus the parallel toggle vectors.
///
/// Invariant: one toggle vector per hash, each exactly `toggle_width` long.
/// Deserialization goes through [`FingerprintResult::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFingerprint")]
pub struct FingerprintResult {
    hashes: Vec<i32>,
    toggles: Vec<Vec<u8>>,
    toggle_width: usize,
}

impl FingerprintResult {
    pub fn new(
        hashes: Vec<i32>,
        toggles: Vec<Vec<u8>>,
        toggle_width: usize,
    ) -> Result<Self, FingerprintError> {
        if hashes.len() != toggles.len() {
            return Err(FingerprintError::Inconsistent {
                hashes: hashes.len(),
                toggles: toggles.len(),
            });
        }
        if let Some((frame, bad)) = toggles
            .iter()
            .enumerate()
            .find(|(_, t)| t.len() != toggle_width)
        {
            return Err(FingerprintError::ToggleWidth {
                frame,
                expected: toggle_width,
                actual: bad.len(),
            });
        }
        Ok(Self {
            hashes,
            toggles,
            toggle_width,
        })
    }

    /// Fingerprint with P = 0: every toggle vector is empty.
    pub fn without_toggles(hashes: Vec<i32>) -> Self {
        let toggles = vec![Vec::new(); hashes.len()];
        Self {
            hashes,
            toggles,
            toggle_width: 0,
        }
    }

    pub fn hashes(&self) -> &[i32] {
        &self.hashes
    }

    pub fn toggles(&self) -> &[Vec<u8>] {
        &self.toggles
    }

    pub fn toggle_width(&self) -> usize {
        self.toggle_width
    }

    pub fn frame_count(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Unchecked serde shape of a fingerprint
#[derive(Deserialize)]
struct RawFingerprint {
    hashes: Vec<i32>,
    #[serde(default)]
    toggles: Vec<Vec<u8>>,
    #[serde(default)]
    toggle_width: usize,
}

impl TryFrom<RawFingerprint> for FingerprintResult {
    type Error = FingerprintError;

    fn try_from(raw: RawFingerprint) -> Result<Self, Self::Error> {
        Self::new(raw.hashes, raw.toggles, raw.toggle_width)
    }
}
