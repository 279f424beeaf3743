//! Audio Scout wire messages
//!
//! Requests are ZMQ multipart messages. Every integer is little-endian.
//!
//! ```text
//! Query:   [0x01] [frame count u32] [hashes N x i32]
//! Submit:  [0x02] [frame count u32] [hashes N x i32] [inline metadata + NUL]
//! ```
//!
//! An extended query may follow the hash block with `[P u8]` and then one
//! frame of P toggle bytes per hash.
//!
//! Replies carry no command marker, so they are decoded with the command of
//! the request they answer:
//!
//! ```text
//! Query reply:   UTF-8 text (server-defined match description)
//! Submit reply:  uid as 4 bytes LE i32
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintResult;
use crate::metadata::{FormatError, MetadataRecord};

/// Command opcodes (frame 0, one byte)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Look up a fingerprint in the index
    Query = 0x01,
    /// Register a fingerprint and its metadata
    Submit = 0x02,
}

impl Command {
    /// Parse an opcode byte into a Command
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Command::Query),
            0x02 => Ok(Command::Submit),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Query => "query",
            Command::Submit => "submit",
        }
    }
}

/// Errors building or parsing wire messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),
    #[error("Missing frame: {0}")]
    MissingFrame(&'static str),
    #[error("Frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },
    #[error("Frame count says {declared} but hash block holds {actual} bytes")]
    FrameCountMismatch { declared: u32, actual: usize },
    #[error("Too many hash frames for a u32 count: {0}")]
    TooManyFrames(usize),
    #[error("Toggle width {0} does not fit in one byte")]
    ToggleWidth(usize),
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
    #[error("Bad metadata: {0}")]
    Metadata(#[from] FormatError),
}

/// Serialize hash codes as a contiguous LE i32 block.
pub fn encode_hashes(hashes: &[i32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(hashes.len() * 4);
    for &h in hashes {
        buf.put_i32_le(h);
    }
    buf.freeze()
}

/// Inverse of [`encode_hashes`]; the block length must be a multiple of 4.
pub fn decode_hashes(mut block: &[u8]) -> Result<Vec<i32>, ProtocolError> {
    if block.len() % 4 != 0 {
        return Err(ProtocolError::FrameTooShort {
            expected: block.len().next_multiple_of(4),
            actual: block.len(),
        });
    }
    let mut hashes = Vec::with_capacity(block.len() / 4);
    while block.has_remaining() {
        hashes.push(block.get_i32_le());
    }
    Ok(hashes)
}

fn frame_count(fp: &FingerprintResult) -> Result<Bytes, ProtocolError> {
    let count = u32::try_from(fp.frame_count())
        .map_err(|_| ProtocolError::TooManyFrames(fp.frame_count()))?;
    Ok(Bytes::copy_from_slice(&count.to_le_bytes()))
}

/// One outbound request: the command plus its ordered parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    command: Command,
    parts: Vec<Bytes>,
}

impl WireMessage {
    /// Build a request from a raw opcode. Submit requires metadata.
    pub fn build(
        opcode: u8,
        fingerprint: &FingerprintResult,
        metadata: Option<&MetadataRecord>,
    ) -> Result<Self, ProtocolError> {
        match Command::from_u8(opcode)? {
            Command::Query => Self::query(fingerprint),
            Command::Submit => {
                let metadata = metadata.ok_or(ProtocolError::MissingFrame("metadata"))?;
                Self::submit(fingerprint, metadata)
            }
        }
    }

    /// 3-part query: opcode, frame count, hash block.
    pub fn query(fingerprint: &FingerprintResult) -> Result<Self, ProtocolError> {
        Ok(Self {
            command: Command::Query,
            parts: vec![
                Bytes::from_static(&[Command::Query as u8]),
                frame_count(fingerprint)?,
                encode_hashes(fingerprint.hashes()),
            ],
        })
    }

    /// Query followed by the toggle width and one toggle frame per hash.
    ///
    /// With a toggle width of 0 this is the plain 3-part query.
    pub fn query_with_toggles(fingerprint: &FingerprintResult) -> Result<Self, ProtocolError> {
        let mut msg = Self::query(fingerprint)?;
        let width = fingerprint.toggle_width();
        if width == 0 {
            return Ok(msg);
        }
        let width = u8::try_from(width).map_err(|_| ProtocolError::ToggleWidth(width))?;
        msg.parts.push(Bytes::copy_from_slice(&[width]));
        msg.parts
            .extend(fingerprint.toggles().iter().map(|t| Bytes::copy_from_slice(t)));
        Ok(msg)
    }

    /// 4-part submission: opcode, frame count, hash block, inline metadata.
    pub fn submit(
        fingerprint: &FingerprintResult,
        metadata: &MetadataRecord,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            command: Command::Submit,
            parts: vec![
                Bytes::from_static(&[Command::Submit as u8]),
                frame_count(fingerprint)?,
                encode_hashes(fingerprint.hashes()),
                metadata.to_wire_bytes(),
            ],
        })
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<Bytes> {
        self.parts
    }

    /// Total payload size across parts, for logging.
    pub fn byte_len(&self) -> usize {
        self.parts.iter().map(Bytes::len).sum()
    }

    /// Parse a request as the server would see it.
    pub fn parse(parts: &[Bytes]) -> Result<ParsedRequest, ProtocolError> {
        let opcode = parts.first().ok_or(ProtocolError::MissingFrame("opcode"))?;
        if opcode.len() != 1 {
            return Err(ProtocolError::FrameTooShort {
                expected: 1,
                actual: opcode.len(),
            });
        }
        let command = Command::from_u8(opcode[0])?;

        let count_frame = parts.get(1).ok_or(ProtocolError::MissingFrame("frame count"))?;
        if count_frame.len() != 4 {
            return Err(ProtocolError::FrameTooShort {
                expected: 4,
                actual: count_frame.len(),
            });
        }
        let declared = u32::from_le_bytes([count_frame[0], count_frame[1], count_frame[2], count_frame[3]]);

        let block = parts.get(2).ok_or(ProtocolError::MissingFrame("hashes"))?;
        if block.len() != declared as usize * 4 {
            return Err(ProtocolError::FrameCountMismatch {
                declared,
                actual: block.len(),
            });
        }
        let hashes = decode_hashes(block)?;

        let mut request = ParsedRequest {
            command,
            hashes,
            toggles: None,
            metadata: None,
        };

        match command {
            Command::Submit => {
                let mdata = parts.get(3).ok_or(ProtocolError::MissingFrame("metadata"))?;
                request.metadata = Some(MetadataRecord::from_wire_bytes(mdata)?);
            }
            Command::Query => {
                if let Some(width) = parts.get(3) {
                    let width = *width.first().ok_or(ProtocolError::FrameTooShort {
                        expected: 1,
                        actual: 0,
                    })? as usize;
                    let frames = &parts[4..];
                    if frames.len() != request.hashes.len() {
                        return Err(ProtocolError::FrameCountMismatch {
                            declared,
                            actual: frames.len(),
                        });
                    }
                    if let Some(bad) = frames.iter().find(|f| f.len() != width) {
                        return Err(ProtocolError::FrameTooShort {
                            expected: width,
                            actual: bad.len(),
                        });
                    }
                    request.toggles = Some(frames.iter().map(|f| f.to_vec()).collect());
                }
            }
        }

        Ok(request)
    }
}

/// A request decoded back into its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub command: Command,
    pub hashes: Vec<i32>,
    pub toggles: Option<Vec<Vec<u8>>>,
    pub metadata: Option<MetadataRecord>,
}

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// Query result text as the server phrased it
    Matched { text: String },
    /// Identifier assigned to a submitted track
    Registered { uid: i32 },
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Matched { text } => write!(f, "{}", text),
            Reply::Registered { uid } => write!(f, "id = {}", uid),
        }
    }
}

/// Decode reply parts using the command of the request that produced them.
pub fn decode_reply(command: Command, parts: &[Bytes]) -> Result<Reply, ProtocolError> {
    let first = parts
        .first()
        .ok_or_else(|| ProtocolError::MalformedReply("empty reply".to_string()))?;

    match command {
        Command::Query => {
            let text = String::from_utf8_lossy(first);
            Ok(Reply::Matched {
                text: text.trim_end_matches('\0').to_string(),
            })
        }
        Command::Submit => {
            let bytes: [u8; 4] = first.as_ref().try_into().map_err(|_| {
                ProtocolError::MalformedReply(format!(
                    "submit reply must be 4 bytes, got {}",
                    first.len()
                ))
            })?;
            Ok(Reply::Registered {
                uid: i32::from_le_bytes(bytes),
            })
        }
    }
}
