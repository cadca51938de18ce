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

//! Record framing and on-disk format definitions.
//!
//! The queue never looks inside a payload; it stores opaque bytes and hands
//! them back unchanged. Each record is written as one frame:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┐
//! │  Length (4B)    │   Payload (variable) │
//! │  big-endian u32 │   raw bytes          │
//! └─────────────────┴──────────────────────┘
//! ```
//!
//! Frames are packed back to back inside a segment with no padding, so the
//! length prefix is the only thing needed to walk a segment sequentially.

use std::io::{self, Read};

use bytes::Bytes;
use snafu::{ResultExt, Snafu, ensure};

/// Size of the length prefix in bytes (4 bytes = u32).
pub(crate) const FRAME_LENGTH_SIZE: usize = 4;

/// Total on-disk size of a frame carrying `payload_len` bytes.
#[inline]
pub(crate) const fn frame_disk_size(payload_len: usize) -> u64 {
    (FRAME_LENGTH_SIZE + payload_len) as u64
}

/// Encodes a payload into a single contiguous frame buffer so that the write
/// path can issue it as one `write_all`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_LENGTH_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Why a frame could not be decoded.
///
/// Every variant is treated as damage to the rest of the segment.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum FrameError {
    #[snafu(display("segment could not be opened"))]
    Open { source: io::Error },

    #[snafu(display("truncated {part} at offset {offset}"))]
    Truncated { offset: u64, part: &'static str },

    #[snafu(display("invalid frame length {len} at offset {offset}"))]
    InvalidLength { offset: u64, len: u32 },

    #[snafu(display("frame at offset {offset} ends at {end}, past the write cursor {limit}"))]
    BeyondWriteCursor { offset: u64, end: u64, limit: u64 },

    #[snafu(display("read failed at offset {offset}"))]
    Read { offset: u64, source: io::Error },
}

/// Decodes the frame starting at the reader's current position.
///
/// `offset` is only used for error reporting. Returns `Ok(None)` when the
/// reader is exactly at end of file, i.e. no byte of a new frame exists.
pub(crate) fn read_frame<R: Read>(
    reader: &mut R,
    offset: u64,
    min_len: u32,
    max_len: u32,
) -> Result<Option<Bytes>, FrameError> {
    let mut header = [0u8; FRAME_LENGTH_SIZE];
    let mut filled = 0;
    while filled < FRAME_LENGTH_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e).context(ReadSnafu { offset }),
        }
    }

    if filled == 0 {
        return Ok(None);
    }
    ensure!(
        filled == FRAME_LENGTH_SIZE,
        TruncatedSnafu {
            offset,
            part: "length prefix",
        }
    );

    let len = u32::from_be_bytes(header);
    ensure!(
        (min_len..=max_len).contains(&len),
        InvalidLengthSnafu { offset, len }
    );

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated {
                offset,
                part: "payload",
            }
        } else {
            FrameError::Read { offset, source: e }
        }
    })?;

    Ok(Some(Bytes::from(payload)))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use test_case::test_case;

    use super::*;

    #[test]
    fn test_frame_disk_size() {
        assert_eq!(frame_disk_size(0), 4);
        assert_eq!(frame_disk_size(10), 14);
        assert_eq!(frame_disk_size(123), 127);
    }

    #[test]
    fn test_encode_frame_is_big_endian() {
        let frame = encode_frame(b"abc");
        assert_eq!(frame, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_read_consecutive_frames() {
        let mut data = encode_frame(b"first");
        data.extend(encode_frame(b"second"));
        let mut reader = Cursor::new(data);

        let first = read_frame(&mut reader, 0, 1, 1024).unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"first"));
        let second = read_frame(&mut reader, 9, 1, 1024).unwrap().unwrap();
        assert_eq!(second, Bytes::from_static(b"second"));
        assert!(read_frame(&mut reader, 19, 1, 1024).unwrap().is_none());
    }

    #[test_case(2 ; "inside length prefix")]
    #[test_case(6 ; "inside payload")]
    fn test_truncated_frame(cut: usize) {
        let mut data = encode_frame(b"payload");
        data.truncate(cut);

        let err = read_frame(&mut Cursor::new(data), 0, 1, 1024).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { offset: 0, .. }));
    }

    #[test_case(0 ; "zero length")]
    #[test_case(2048 ; "above maximum")]
    fn test_invalid_length(len: u32) {
        let mut data = len.to_be_bytes().to_vec();
        data.extend(std::iter::repeat_n(0u8, 16));

        let err = read_frame(&mut Cursor::new(data), 0, 1, 1024).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { len: l, .. } if l == len));
    }
}
