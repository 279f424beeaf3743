//! Audio decoding for fingerprinting
//!
//! Turns a file on disk into mono f32 samples at the fingerprint sample rate,
//! plus whatever tags the container carries. WAV goes through hound; other
//! formats go through symphonia when the `symphonia-decode` feature is on.
//!
//! Pipeline: read → decode (stopping once enough frames are in) → downmix →
//! truncate → resample.

use std::io::Cursor;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use scoutproto::MetadataRecord;
use tracing::{debug, trace};

/// Decoded, fingerprint-ready audio for one file
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub metadata: MetadataRecord,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("cannot open: {0}")]
    Open(String),
    #[error("unsupported format: {0}")]
    Unsupported(String),
    #[error("corrupt audio: {0}")]
    Corrupt(String),
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error("no audio samples")]
    Empty,
}

/// Decode collaborator used by the batch runner.
pub trait AudioDecoder {
    /// Decode `path` to mono samples at `sample_rate`, keeping at most
    /// `max_seconds` from the start (0 keeps everything).
    fn decode(
        &self,
        path: &Path,
        sample_rate: u32,
        max_seconds: f32,
    ) -> Result<DecodedAudio, DecodeError>;
}

/// Interleaved PCM straight out of a container, before any conversion
#[derive(Debug, Default)]
struct RawPcm {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
    /// Frames in the whole stream, when the container says so
    total_frames: Option<u64>,
    metadata: MetadataRecord,
}

impl RawPcm {
    fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }
}

/// Filesystem decoder: hound for WAV, symphonia for the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl FileDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for FileDecoder {
    fn decode(
        &self,
        path: &Path,
        sample_rate: u32,
        max_seconds: f32,
    ) -> Result<DecodedAudio, DecodeError> {
        let data = std::fs::read(path).map_err(|e| DecodeError::Open(e.to_string()))?;
        let extension = path.extension().and_then(|e| e.to_str());
        decode_bytes(&data, extension, sample_rate, max_seconds)
    }
}

/// Decode an in-memory file. `extension` is a probe hint only.
pub fn decode_bytes(
    data: &[u8],
    extension: Option<&str>,
    sample_rate: u32,
    max_seconds: f32,
) -> Result<DecodedAudio, DecodeError> {
    if sample_rate == 0 {
        return Err(DecodeError::Resample("target sample rate is 0".to_string()));
    }

    let mut raw = if data.len() >= 4 && &data[0..4] == b"RIFF" {
        decode_wav(data, max_seconds)?
    } else {
        decode_other(data, extension, max_seconds)?
    };

    if raw.sample_rate == 0 || raw.channels == 0 {
        return Err(DecodeError::Corrupt("stream has no sample rate or channels".to_string()));
    }

    let total_frames = raw.total_frames.unwrap_or(raw.frames() as u64);
    raw.metadata.duration = i32::try_from(total_frames / raw.sample_rate as u64).unwrap_or(i32::MAX);

    let mut mono = downmix(&raw.samples, raw.channels);
    if let Some(limit) = frame_limit(max_seconds, raw.sample_rate) {
        mono.truncate(limit);
    }
    if mono.is_empty() {
        return Err(DecodeError::Empty);
    }

    trace!(
        "Decoded {} frames at {} Hz ({} channels)",
        mono.len(),
        raw.sample_rate,
        raw.channels
    );

    let samples = resample(mono, raw.sample_rate, sample_rate)?;
    Ok(DecodedAudio {
        samples,
        sample_rate,
        metadata: raw.metadata,
    })
}

/// Frame cap for `max_seconds`; none when the rate is not known yet.
fn frame_limit(max_seconds: f32, sample_rate: u32) -> Option<usize> {
    if max_seconds > 0.0 && sample_rate > 0 {
        Some((max_seconds as f64 * sample_rate as f64) as usize)
    } else {
        None
    }
}

fn decode_wav(data: &[u8], max_seconds: f32) -> Result<RawPcm, DecodeError> {
    let reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| DecodeError::Corrupt(e.to_string()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let total_frames = reader.duration() as u64;
    let take = frame_limit(max_seconds, spec.sample_rate)
        .map(|frames| frames.saturating_mul(channels))
        .unwrap_or(usize::MAX);

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .take(take)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DecodeError::Corrupt(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .take(take)
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DecodeError::Corrupt(e.to_string()))?
        }
    };

    Ok(RawPcm {
        samples,
        sample_rate: spec.sample_rate,
        channels,
        total_frames: Some(total_frames),
        metadata: MetadataRecord::default(),
    })
}

#[cfg(feature = "symphonia-decode")]
fn decode_other(
    data: &[u8],
    extension: Option<&str>,
    max_seconds: f32,
) -> Result<RawPcm, DecodeError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut metadata = MetadataRecord::default();
    if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        tags::apply_all(&mut metadata, revision.tags());
    }

    let mut format = probed.format;
    if let Some(revision) = format.metadata().current() {
        tags::apply_all(&mut metadata, revision.tags());
    }

    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::Unsupported("no audio track found".to_string()))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let total_frames = track.codec_params.n_frames;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        if channels > 0 {
            if let Some(limit) = frame_limit(max_seconds, sample_rate) {
                if samples.len() / channels >= limit {
                    break;
                }
            }
        }

        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    Ok(RawPcm {
        samples,
        sample_rate,
        channels,
        total_frames,
        metadata,
    })
}

#[cfg(not(feature = "symphonia-decode"))]
fn decode_other(
    _data: &[u8],
    extension: Option<&str>,
    _max_seconds: f32,
) -> Result<RawPcm, DecodeError> {
    Err(DecodeError::Unsupported(format!(
        "{} (enable symphonia-decode for non-WAV formats)",
        extension.unwrap_or("unknown")
    )))
}

#[cfg(feature = "symphonia-decode")]
mod tags {
    use scoutproto::MetadataRecord;
    use symphonia::core::meta::{StandardTagKey, Tag};

    pub(super) fn apply_all(record: &mut MetadataRecord, tags: &[Tag]) {
        for tag in tags {
            if let Some(key) = tag.std_key {
                apply(record, key, tag.value.to_string());
            }
        }
    }

    fn apply(record: &mut MetadataRecord, key: StandardTagKey, value: String) {
        let value = value.trim().to_string();
        if value.is_empty() {
            return;
        }

        match key {
            StandardTagKey::Composer => record.composer = Some(value),
            StandardTagKey::ContentGroup => record.title[0] = Some(value),
            StandardTagKey::TrackTitle => record.title[1] = Some(value),
            StandardTagKey::TrackSubtitle => record.title[2] = Some(value),
            StandardTagKey::Artist => record.performer[0] = Some(value),
            StandardTagKey::AlbumArtist => record.performer[1] = Some(value),
            StandardTagKey::Conductor => record.performer[2] = Some(value),
            StandardTagKey::Remixer => record.performer[3] = Some(value),
            StandardTagKey::Album => record.album = Some(value),
            StandardTagKey::Genre => record.genre = Some(value),
            StandardTagKey::Date => {
                if record.year == 0 {
                    record.year = super::leading_number(&value, 4);
                }
                record.date = Some(value);
            }
            StandardTagKey::ReleaseDate | StandardTagKey::OriginalDate => {
                if record.year == 0 {
                    record.year = super::leading_number(&value, 4);
                }
            }
            StandardTagKey::DiscNumber => record.part_of_set = super::leading_number(&value, 9),
            _ => {}
        }
    }
}

/// Parse up to `max_digits` leading ASCII digits ("2004-05-01" → 2004, "1/2" → 1).
fn leading_number(value: &str, max_digits: usize) -> i32 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .take(max_digits)
        .collect();
    digits.parse().unwrap_or(0)
}

/// Average interleaved channels down to one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Band-limited sinc resampling of a mono buffer in one chunk.
pub fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>, DecodeError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let input = vec![samples];
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    Ok(output.pop().unwrap_or_default())
}
