//! auscout - batch fingerprint client for the Audio Scout index
//!
//! Walks a directory of audio files, fingerprints each one, and either
//! queries the index for matches or submits the fingerprint with its tags.
//!
//! - `discovery` - recursive, extension-filtered file enumeration
//! - `decode` - files to mono samples at the fingerprint rate, plus tags
//! - `hash` - Bark-band perceptual hashing with a batch-scoped context
//! - `batch` - the per-file loop and its outcomes
//! - `report` - text and JSON-lines rendering of a finished batch

pub mod batch;
pub mod decode;
pub mod discovery;
pub mod hash;
pub mod report;

pub use batch::{
    BatchConfig, BatchError, BatchReport, BatchRunner, BatchSummary, FailureReason, FileOutcome,
    FileReport,
};
pub use decode::{AudioDecoder, DecodeError, DecodedAudio, FileDecoder};
pub use discovery::{discover_audio_files, DiscoveryError};
pub use hash::{BarkHasher, Fingerprinter, HashContext};
