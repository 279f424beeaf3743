//! Track metadata and its inline wire form.
//!
//! The index server stores metadata as one delimited text blob. Nine groups
//! are joined by [`FIELD_SEPARATOR`] and the blob is NUL-terminated on the wire:
//!
//! ```text
//! composer | title1 title2 title3 | perf1 perf2 perf3 perf4 | date | album | genre | year | duration | part
//! ```
//!
//! Title and performer parts are concatenated with no separator between them,
//! so a decoded record carries each concatenation in its first slot.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Separator between inline groups: space, ASCII RS (0x1E), space.
pub const FIELD_SEPARATOR: &str = " \u{1e} ";

/// Number of groups in an inline metadata string.
pub const GROUP_COUNT: usize = 9;

/// Errors decoding an inline metadata string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Expected {GROUP_COUNT} metadata groups, found {found}")]
    GroupCount { found: usize },
    #[error("Metadata field {field} is not a number: {value:?}")]
    NotANumber { field: &'static str, value: String },
    #[error("Metadata is not valid UTF-8")]
    InvalidUtf8,
}

/// Structured metadata for one audio file, copied verbatim from its tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub composer: Option<String>,
    /// TIT1, TIT2, TIT3
    pub title: [Option<String>; 3],
    /// TPE1..TPE4
    pub performer: [Option<String>; 4],
    pub date: Option<String>,
    pub year: i32,
    pub album: Option<String>,
    pub genre: Option<String>,
    /// Seconds
    pub duration: i32,
    pub part_of_set: i32,
}

fn text(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}

fn non_empty(group: &str) -> Option<String> {
    if group.is_empty() {
        None
    } else {
        Some(group.to_string())
    }
}

fn number(group: &str, field: &'static str) -> Result<i32, FormatError> {
    if group.is_empty() {
        return Ok(0);
    }
    group.parse().map_err(|_| FormatError::NotANumber {
        field,
        value: group.to_string(),
    })
}

impl MetadataRecord {
    /// The nine inline groups in wire order.
    pub fn inline_groups(&self) -> [String; GROUP_COUNT] {
        [
            text(&self.composer).to_string(),
            self.title.iter().map(text).collect(),
            self.performer.iter().map(text).collect(),
            text(&self.date).to_string(),
            text(&self.album).to_string(),
            text(&self.genre).to_string(),
            self.year.to_string(),
            self.duration.to_string(),
            self.part_of_set.to_string(),
        ]
    }

    /// Inline text form without the NUL terminator.
    pub fn to_inline(&self) -> String {
        self.inline_groups().join(FIELD_SEPARATOR)
    }

    /// Inline form as sent on the wire: UTF-8 plus one trailing NUL.
    pub fn to_wire_bytes(&self) -> Bytes {
        let mut buf = self.to_inline().into_bytes();
        buf.push(0);
        Bytes::from(buf)
    }

    /// Parse an inline string (a single trailing NUL is tolerated).
    pub fn from_inline(inline: &str) -> Result<Self, FormatError> {
        let inline = inline.strip_suffix('\0').unwrap_or(inline);
        let groups: Vec<&str> = inline.split(FIELD_SEPARATOR).collect();
        if groups.len() != GROUP_COUNT {
            return Err(FormatError::GroupCount {
                found: groups.len(),
            });
        }

        Ok(Self {
            composer: non_empty(groups[0]),
            title: [non_empty(groups[1]), None, None],
            performer: [non_empty(groups[2]), None, None, None],
            date: non_empty(groups[3]),
            album: non_empty(groups[4]),
            genre: non_empty(groups[5]),
            year: number(groups[6], "year")?,
            duration: number(groups[7], "duration")?,
            part_of_set: number(groups[8], "part_of_set")?,
        })
    }

    /// Parse the wire form.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let inline = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8)?;
        Self::from_inline(inline)
    }

    /// The record as the server sees it: title and performer parts folded
    /// into their first slot, empty strings treated as absent.
    pub fn normalized(&self) -> Self {
        let groups = self.inline_groups();
        Self {
            composer: non_empty(&groups[0]),
            title: [non_empty(&groups[1]), None, None],
            performer: [non_empty(&groups[2]), None, None, None],
            date: non_empty(&groups[3]),
            album: non_empty(&groups[4]),
            genre: non_empty(&groups[5]),
            year: self.year,
            duration: self.duration,
            part_of_set: self.part_of_set,
        }
    }
}

impl fmt::Display for MetadataRecord {
    /// One `label: value` line per populated field.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let texts = std::iter::once(("composer", &self.composer))
            .chain(self.title.iter().map(|t| ("title", t)))
            .chain(self.performer.iter().map(|p| ("performer", p)))
            .chain([
                ("date", &self.date),
                ("album", &self.album),
                ("genre", &self.genre),
            ]);
        for (label, value) in texts {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                writeln!(f, "{}: {}", label, value)?;
            }
        }
        for (label, value) in [
            ("year", self.year),
            ("duration", self.duration),
            ("part", self.part_of_set),
        ] {
            if value != 0 {
                writeln!(f, "{}: {}", label, value)?;
            }
        }
        Ok(())
    }
}
