// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cursor metadata persisted between runs.
//!
//! The manifest records the acknowledged read cursor, the write cursor and
//! the depth so a restarted queue resumes exactly where the last save left
//! off.
//!
//! ## Binary Format
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────────┐
//! │ magic: [u8; 4]       │ "DQMF"                          │
//! │ version: u32         │ Format version, currently 1     │
//! │ read_file_num: u64   │ Segment of the last acked frame │
//! │ read_pos: u64        │ Offset after the last acked one │
//! │ write_file_num: u64  │ Segment accepting appends       │
//! │ write_pos: u64       │ Offset of the next append       │
//! │ depth: i64           │ Written but undelivered records │
//! │ checksum: u32        │ CRC32 of every preceding byte   │
//! └──────────────────────┴─────────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use snafu::{Snafu, ensure};

use crate::crc::{calculate_crc, verify_crc};

/// Magic bytes identifying a metadata file: "DQMF"
pub const MANIFEST_MAGIC: [u8; 4] = *b"DQMF";

/// Current metadata format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Size of an encoded manifest in bytes.
pub const MANIFEST_SIZE: usize = 4 + 4 + 8 * 5 + 4;

const CHECKSUM_OFFSET: usize = MANIFEST_SIZE - 4;

/// A point in the logical stream: segment number plus byte offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub file_num: u64,
    pub pos:      u64,
}

impl Position {
    #[must_use]
    pub const fn new(file_num: u64, pos: u64) -> Self { Self { file_num, pos } }

    /// Start of the segment after this one.
    #[must_use]
    pub const fn next_segment(self) -> Self { Self::new(self.file_num + 1, 0) }
}

/// Persisted cursor state of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Acknowledged read cursor.
    pub read:  Position,
    /// Write cursor.
    pub write: Position,
    /// Records written but not yet delivered.
    pub depth: i64,
}

/// Reasons an encoded manifest is rejected.
#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("expected {} bytes, found {}", MANIFEST_SIZE, actual))]
    Length { actual: usize },

    #[snafu(display("bad magic {found:02x?}"))]
    Magic { found: [u8; 4] },

    #[snafu(display("unsupported version {version}"))]
    Version { version: u32 },

    #[snafu(display("checksum mismatch: stored {stored:#010x}"))]
    Checksum { stored: u32 },

    #[snafu(display("negative depth {depth}"))]
    NegativeDepth { depth: i64 },

    #[snafu(display("read cursor {read:?} is ahead of write cursor {write:?}"))]
    ReadAheadOfWrite { read: Position, write: Position },
}

impl Manifest {
    /// Serialize the manifest to its fixed-size binary form.
    #[must_use]
    pub fn serialize(&self) -> [u8; MANIFEST_SIZE] {
        let mut buf = [0u8; MANIFEST_SIZE];
        buf[0..4].copy_from_slice(&MANIFEST_MAGIC);
        buf[4..8].copy_from_slice(&MANIFEST_VERSION.to_be_bytes());
        buf[8..16].copy_from_slice(&self.read.file_num.to_be_bytes());
        buf[16..24].copy_from_slice(&self.read.pos.to_be_bytes());
        buf[24..32].copy_from_slice(&self.write.file_num.to_be_bytes());
        buf[32..40].copy_from_slice(&self.write.pos.to_be_bytes());
        buf[40..48].copy_from_slice(&self.depth.to_be_bytes());
        let crc = calculate_crc(&buf[..CHECKSUM_OFFSET]);
        buf[CHECKSUM_OFFSET..].copy_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Deserialize and validate a manifest.
    pub fn deserialize(data: &[u8]) -> Result<Self, DecodeError> {
        ensure!(
            data.len() == MANIFEST_SIZE,
            LengthSnafu { actual: data.len() }
        );

        let magic: [u8; 4] = word(data, 0);
        ensure!(magic == MANIFEST_MAGIC, MagicSnafu { found: magic });

        let version = u32::from_be_bytes(word(data, 4));
        ensure!(version == MANIFEST_VERSION, VersionSnafu { version });

        let stored = u32::from_be_bytes(word(data, CHECKSUM_OFFSET));
        ensure!(
            verify_crc(&data[..CHECKSUM_OFFSET], stored),
            ChecksumSnafu { stored }
        );

        let manifest = Self {
            read:  Position::new(
                u64::from_be_bytes(word(data, 8)),
                u64::from_be_bytes(word(data, 16)),
            ),
            write: Position::new(
                u64::from_be_bytes(word(data, 24)),
                u64::from_be_bytes(word(data, 32)),
            ),
            depth: i64::from_be_bytes(word(data, 40)),
        };

        ensure!(
            manifest.depth >= 0,
            NegativeDepthSnafu {
                depth: manifest.depth,
            }
        );
        ensure!(
            manifest.read <= manifest.write,
            ReadAheadOfWriteSnafu {
                read:  manifest.read,
                write: manifest.write,
            }
        );

        Ok(manifest)
    }
}

/// Copies `N` bytes starting at `offset`; callers have checked the length.
fn word<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}
