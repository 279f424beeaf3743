//! Perceptual audio hashing
//!
//! [`BarkHasher`] slides a Hamming-windowed frame (0.4 s rounded down to a
//! power of two, advancing 1/32 of a frame) over the signal, integrates the
//! magnitude spectrum into 33 Bark-scale critical bands, and emits one 32-bit
//! code per frame from the signs of the band-difference changes between the
//! neighbouring frames. Bits whose difference was closest to zero are the
//! least reliable; their indices are reported as the frame's toggles.

use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use scoutproto::{FingerprintError, FingerprintResult};
use tracing::{debug, trace};

/// Minimum sample rate the filter bank is defined for
pub const MIN_SAMPLE_RATE: u32 = 6000;

/// Bits per hash, one per adjacent band pair
pub const HASH_BITS: usize = 32;

const FRAME_SECONDS: f64 = 0.4;
const BARK_WIDTH: f64 = 1.06;

/// Centre frequencies of the critical-band filters in Hz
const BARK_FREQS: [f64; HASH_BITS + 1] = [
    50.0, 75.0, 100.0, 125.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0, 510.0, 570.0,
    635.0, 700.0, 770.0, 840.0, 920.0, 1000.0, 1085.0, 1170.0, 1270.0, 1370.0, 1485.0, 1600.0,
    1725.0, 1850.0, 2000.0, 2150.0, 2325.0, 2500.0, 2700.0, 2900.0,
];

/// Fingerprint collaborator used by the batch runner.
///
/// The context lives for a whole batch and is handed to every call, so
/// per-rate setup (windows, filter banks, FFT plans) happens once.
pub trait Fingerprinter {
    type Context: Default;

    fn fingerprint(
        &self,
        samples: &[f32],
        sample_rate: u32,
        toggles: u32,
        context: &mut Self::Context,
    ) -> Result<FingerprintResult, FingerprintError>;
}

/// Cached analysis tables for one sample rate
struct Tables {
    sample_rate: u32,
    frame_len: usize,
    window: Vec<f64>,
    /// `weights[band][bin]` for bins below Nyquist
    weights: Vec<Vec<f64>>,
    fft: Arc<dyn Fft<f64>>,
}

impl Tables {
    fn new(sample_rate: u32) -> Self {
        let frame_len = frame_length(sample_rate);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(frame_len);
        Self {
            sample_rate,
            frame_len,
            window: hamming(frame_len),
            weights: bark_weights(sample_rate, frame_len / 2),
            fft,
        }
    }

    fn advance(&self) -> usize {
        (self.frame_len - 31 * self.frame_len / 32).max(1)
    }

    /// Critical-band energies of one frame.
    fn band_energies(&self, frame: &[f32], buffer: &mut [Complex<f64>]) -> [f64; HASH_BITS + 1] {
        for ((slot, &sample), w) in buffer.iter_mut().zip(frame).zip(&self.window) {
            *slot = Complex::new(w * sample as f64, 0.0);
        }
        self.fft.process(buffer);

        let half = self.frame_len / 2;
        let mut bands = [0.0; HASH_BITS + 1];
        for (band, weights) in bands.iter_mut().zip(&self.weights) {
            *band = weights
                .iter()
                .zip(&buffer[..half])
                .map(|(w, bin)| w * bin.norm())
                .sum();
        }
        bands
    }
}

/// Batch-scoped hashing state. Starts empty; tables are built on first use
/// and rebuilt only if the sample rate changes.
#[derive(Default)]
pub struct HashContext {
    tables: Option<Tables>,
    frames_hashed: u64,
}

impl HashContext {
    pub fn frame_len(&self) -> Option<usize> {
        self.tables.as_ref().map(|t| t.frame_len)
    }

    pub fn frames_hashed(&self) -> u64 {
        self.frames_hashed
    }

    fn tables_for(&mut self, sample_rate: u32) -> &Tables {
        if self
            .tables
            .as_ref()
            .is_some_and(|t| t.sample_rate != sample_rate)
        {
            self.tables = None;
        }
        self.tables.get_or_insert_with(|| {
            debug!("Building hash tables for {} Hz", sample_rate);
            Tables::new(sample_rate)
        })
    }
}

impl fmt::Debug for HashContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashContext")
            .field("sample_rate", &self.tables.as_ref().map(|t| t.sample_rate))
            .field("frame_len", &self.frame_len())
            .field("frames_hashed", &self.frames_hashed)
            .finish()
    }
}

impl Drop for HashContext {
    fn drop(&mut self) {
        debug!(
            "Releasing hash context ({} frames hashed)",
            self.frames_hashed
        );
    }
}

/// Bark-band perceptual hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarkHasher;

impl BarkHasher {
    pub fn new() -> Self {
        Self
    }
}

impl Fingerprinter for BarkHasher {
    type Context = HashContext;

    fn fingerprint(
        &self,
        samples: &[f32],
        sample_rate: u32,
        toggles: u32,
        context: &mut HashContext,
    ) -> Result<FingerprintResult, FingerprintError> {
        if sample_rate < MIN_SAMPLE_RATE {
            return Err(FingerprintError::InvalidInput(format!(
                "sample rate {} Hz is below {} Hz",
                sample_rate, MIN_SAMPLE_RATE
            )));
        }
        let width = toggles as usize;
        if width > HASH_BITS {
            return Err(FingerprintError::InvalidInput(format!(
                "toggle width {} exceeds {} hash bits",
                width, HASH_BITS
            )));
        }

        let tables = context.tables_for(sample_rate);
        let frame_len = tables.frame_len;
        let advance = tables.advance();

        let mut buffer = vec![Complex::new(0.0, 0.0); frame_len];
        let bands: Vec<[f64; HASH_BITS + 1]> = samples
            .windows(frame_len)
            .step_by(advance)
            .map(|frame| tables.band_energies(frame, &mut buffer))
            .collect();

        let mut hashes = Vec::with_capacity(bands.len().saturating_sub(2));
        let mut toggle_frames = Vec::with_capacity(bands.len().saturating_sub(2));
        for i in 1..bands.len().saturating_sub(1) {
            let (hash, frame_toggles) = hash_frame(&bands[i - 1], &bands[i + 1], width);
            hashes.push(hash);
            toggle_frames.push(frame_toggles);
        }

        trace!(
            "{} samples → {} bark frames → {} hashes",
            samples.len(),
            bands.len(),
            hashes.len()
        );
        context.frames_hashed += hashes.len() as u64;

        FingerprintResult::new(hashes, toggle_frames, width)
    }
}

/// One hash from the frames either side of the current one.
///
/// Bit `m` (most significant first) is set when the difference between bands
/// `m` and `m + 1` grew from the previous frame to the next.
fn hash_frame(
    prev: &[f64; HASH_BITS + 1],
    next: &[f64; HASH_BITS + 1],
    width: usize,
) -> (i32, Vec<u8>) {
    let mut hash: u32 = 0;
    let mut diffs = [0.0f64; HASH_BITS];
    for m in 0..HASH_BITS {
        let diff = (next[m] - next[m + 1]) - (prev[m] - prev[m + 1]);
        hash <<= 1;
        if diff > 0.0 {
            hash |= 1;
        }
        diffs[m] = diff.abs();
    }

    let toggles = if width == 0 {
        Vec::new()
    } else {
        let mut order: Vec<u8> = (0..HASH_BITS as u8).collect();
        order.sort_by(|&a, &b| diffs[a as usize].total_cmp(&diffs[b as usize]));
        order.truncate(width);
        order
    };

    (hash as i32, toggles)
}

/// Largest power of two not exceeding 0.4 s of samples.
pub fn frame_length(sample_rate: u32) -> usize {
    let samples = (FRAME_SECONDS * sample_rate as f64) as usize;
    if samples == 0 {
        return 1;
    }
    1 << (usize::BITS - 1 - samples.leading_zeros())
}

fn hamming(len: usize) -> Vec<f64> {
    if len < 2 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f64;
    (0..len)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / denom).cos())
        .collect()
}

fn hz_to_bark(hz: f64) -> f64 {
    6.0 * (hz / 600.0).asinh()
}

/// Triangular-in-Bark filter bank over `half` FFT bins.
fn bark_weights(sample_rate: u32, half: usize) -> Vec<Vec<f64>> {
    let max_freq = (sample_rate / 2) as f64;
    let bin_barks: Vec<f64> = (0..half)
        .map(|i| hz_to_bark(i as f64 * max_freq / half as f64))
        .collect();

    BARK_FREQS
        .iter()
        .map(|&centre| {
            let mid = hz_to_bark(centre);
            bin_barks
                .iter()
                .map(|&bark| {
                    let d = bark - mid;
                    let lo = -2.5 * (d / BARK_WIDTH - 0.5);
                    let hi = d / BARK_WIDTH + 0.5;
                    10f64.powf(lo.min(hi).min(0.0))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chirp(len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * (200.0 + 400.0 * t) * t).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn frame_length_is_power_of_two_below_window() {
        assert_eq!(frame_length(6000), 2048);
        assert_eq!(frame_length(8000), 2048);
        assert_eq!(frame_length(11025), 4096);
        assert_eq!(frame_length(44100), 16384);
    }

    #[test]
    fn frame_count_follows_hop() {
        let hasher = BarkHasher::new();
        let mut ctx = HashContext::default();
        // 2048-sample frames, 64-sample hop: 2048 + 9*64 samples give 10 frames
        let samples = chirp(2048 + 9 * 64, 6000);
        let fp = hasher.fingerprint(&samples, 6000, 0, &mut ctx).unwrap();
        assert_eq!(fp.frame_count(), 8);
        assert_eq!(ctx.frames_hashed(), 8);
        assert_eq!(ctx.frame_len(), Some(2048));
    }

    #[test]
    fn short_input_yields_no_frames() {
        let hasher = BarkHasher::new();
        let mut ctx = HashContext::default();
        let fp = hasher
            .fingerprint(&chirp(1000, 6000), 6000, 4, &mut ctx)
            .unwrap();
        assert!(fp.is_empty());
        assert_eq!(fp.toggle_width(), 4);
    }

    #[test]
    fn toggles_have_requested_width_and_are_distinct() {
        let hasher = BarkHasher::new();
        let mut ctx = HashContext::default();
        let fp = hasher
            .fingerprint(&chirp(6000, 6000), 6000, 5, &mut ctx)
            .unwrap();
        assert!(!fp.is_empty());
        for toggles in fp.toggles() {
            assert_eq!(toggles.len(), 5);
            let mut sorted = toggles.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 5);
            assert!(toggles.iter().all(|&b| (b as usize) < HASH_BITS));
        }
    }

    #[test]
    fn hashing_is_deterministic_across_contexts() {
        let hasher = BarkHasher::new();
        let samples = chirp(8000, 6000);
        let a = hasher
            .fingerprint(&samples, 6000, 2, &mut HashContext::default())
            .unwrap();
        let mut shared = HashContext::default();
        hasher.fingerprint(&chirp(3000, 6000), 6000, 0, &mut shared).unwrap();
        let b = hasher.fingerprint(&samples, 6000, 2, &mut shared).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn silence_hashes_to_zero() {
        let hasher = BarkHasher::new();
        let fp = hasher
            .fingerprint(&vec![0.0; 4096], 6000, 0, &mut HashContext::default())
            .unwrap();
        assert!(fp.hashes().iter().all(|&h| h == 0));
    }

    #[test]
    fn rejects_low_sample_rate_and_wide_toggles() {
        let hasher = BarkHasher::new();
        let mut ctx = HashContext::default();
        assert!(matches!(
            hasher.fingerprint(&[0.0; 10], 5999, 0, &mut ctx),
            Err(FingerprintError::InvalidInput(_))
        ));
        assert!(matches!(
            hasher.fingerprint(&[0.0; 10], 6000, 33, &mut ctx),
            Err(FingerprintError::InvalidInput(_))
        ));
        assert_eq!(ctx.frame_len(), None);
    }

    #[test]
    fn rebuilds_tables_when_rate_changes() {
        let hasher = BarkHasher::new();
        let mut ctx = HashContext::default();
        hasher.fingerprint(&[0.0; 10], 6000, 0, &mut ctx).unwrap();
        assert_eq!(ctx.frame_len(), Some(2048));
        hasher.fingerprint(&[0.0; 10], 11025, 0, &mut ctx).unwrap();
        assert_eq!(ctx.frame_len(), Some(4096));
    }

    #[test]
    fn hash_bits_are_msb_first() {
        let prev = [0.0; HASH_BITS + 1];
        let mut next = [0.0; HASH_BITS + 1];
        // Only band pair 0 grows its difference
        next[0] = 1.0;
        let (hash, _) = hash_frame(&prev, &next, 0);
        assert_eq!(hash as u32, 0x8000_0000);
    }
}
