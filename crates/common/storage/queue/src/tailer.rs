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

//! Read cursor used by the queue worker.
//!
//! The [`Tailer`] walks frames in order, one segment at a time. It only
//! tracks where the *next* read starts; the acknowledged read cursor that
//! gets persisted lives in the queue and is advanced once a record has been
//! handed to a consumer.
//!
//! Two reading modes exist:
//! - a closed segment is read sequentially until end of file
//! - the active segment is bounded by the writer's cursor snapshot, so bytes
//!   past it are never trusted

use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::PathBuf,
    sync::Arc,
};

use bytes::Bytes;
use snafu::{ResultExt, ensure};

use crate::{
    QueueConfig,
    manifest::Position,
    message::{
        BeyondWriteCursorSnafu, FrameError, OpenSnafu, ReadSnafu, TruncatedSnafu,
        frame_disk_size, read_frame,
    },
    path::segment_file_path,
};

/// Result of one read attempt.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// A complete frame; the cursor now points past it.
    Frame(Bytes),
    /// A closed segment has no more frames.
    EndOfSegment,
}

pub(crate) struct Tailer {
    config: Arc<QueueConfig>,
    next:   Position,
    reader: Option<BufReader<File>>,
}

impl Tailer {
    pub fn new(config: Arc<QueueConfig>, start: Position) -> Self {
        Self {
            config,
            next: start,
            reader: None,
        }
    }

    /// Position the next read starts at.
    pub const fn position(&self) -> Position { self.next }

    pub fn segment_path(&self) -> PathBuf {
        segment_file_path(&self.config.data_path, &self.config.name, self.next.file_num)
    }

    /// Read the frame at the cursor.
    ///
    /// `write` is a snapshot of the write cursor taken by the caller, who
    /// must already know that the reader is behind it.
    pub fn read_next(&mut self, write: Position) -> Result<ReadOutcome, FrameError> {
        let active = self.next.file_num == write.file_num;
        let offset = self.next.pos;
        let fresh = self.reader.is_none();

        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => {
                let file = File::open(self.segment_path()).context(OpenSnafu)?;
                self.reader.insert(BufReader::new(file))
            }
        };
        // The active segment may have grown since the last buffered read.
        if active || fresh {
            reader
                .seek(SeekFrom::Start(offset))
                .context(ReadSnafu { offset })?;
        }

        let frame = read_frame(
            reader,
            offset,
            self.config.min_msg_size,
            self.config.max_msg_size,
        );
        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) if active => {
                // The writer says bytes exist here, the file disagrees.
                self.reader = None;
                return TruncatedSnafu {
                    offset,
                    part: "length prefix",
                }
                .fail();
            }
            Ok(None) => return Ok(ReadOutcome::EndOfSegment),
            Err(e) => {
                self.reader = None;
                return Err(e);
            }
        };

        let end = offset + frame_disk_size(payload.len());
        if active {
            let limit = write.pos;
            if end > limit {
                self.reader = None;
            }
            ensure!(end <= limit, BeyondWriteCursorSnafu { offset, end, limit });
        }

        self.next.pos = end;
        Ok(ReadOutcome::Frame(payload))
    }

    /// Move to the start of the next segment, returning the one left behind.
    pub fn advance_segment(&mut self) -> u64 {
        let finished = self.next.file_num;
        self.next = self.next.next_segment();
        self.reader = None;
        finished
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::message::encode_frame;

    fn config(temp_dir: &TempDir) -> Arc<QueueConfig> {
        Arc::new(QueueConfig {
            name: "tail".to_string(),
            data_path: temp_dir.path().to_path_buf(),
            max_msg_size: 64,
            ..Default::default()
        })
    }

    fn write_segment(temp_dir: &TempDir, file_num: u64, bytes: &[u8]) {
        let path = segment_file_path(temp_dir.path(), "tail", file_num);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(bytes).unwrap();
    }

    fn expect_frame(outcome: ReadOutcome) -> Bytes {
        match outcome {
            ReadOutcome::Frame(payload) => payload,
            ReadOutcome::EndOfSegment => panic!("expected a frame"),
        }
    }

    #[test]
    fn test_reads_closed_segment_to_end() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(&temp_dir, 0, &encode_frame(b"first"));
        write_segment(&temp_dir, 0, &encode_frame(b"second"));

        let mut tailer = Tailer::new(config(&temp_dir), Position::default());
        let write = Position::new(1, 0);

        assert_eq!(expect_frame(tailer.read_next(write).unwrap()), "first");
        assert_eq!(expect_frame(tailer.read_next(write).unwrap()), "second");
        assert!(matches!(
            tailer.read_next(write).unwrap(),
            ReadOutcome::EndOfSegment
        ));
        assert_eq!(tailer.position(), Position::new(0, 19));

        assert_eq!(tailer.advance_segment(), 0);
        assert_eq!(tailer.position(), Position::new(1, 0));
    }

    #[test]
    fn test_active_segment_sees_appended_frames() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(&temp_dir, 0, &encode_frame(b"one"));

        let mut tailer = Tailer::new(config(&temp_dir), Position::default());
        assert_eq!(
            expect_frame(tailer.read_next(Position::new(0, 7)).unwrap()),
            "one"
        );

        write_segment(&temp_dir, 0, &encode_frame(b"two"));
        assert_eq!(
            expect_frame(tailer.read_next(Position::new(0, 14)).unwrap()),
            "two"
        );
    }

    #[test]
    fn test_active_segment_shorter_than_write_cursor() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(&temp_dir, 0, &encode_frame(b"one"));

        let mut tailer = Tailer::new(config(&temp_dir), Position::default());
        tailer.read_next(Position::new(0, 20)).unwrap();

        let err = tailer.read_next(Position::new(0, 20)).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { offset: 7, .. }));
    }

    #[test]
    fn test_frame_past_write_cursor_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(&temp_dir, 0, &encode_frame(b"complete"));

        let mut tailer = Tailer::new(config(&temp_dir), Position::default());
        let err = tailer.read_next(Position::new(0, 6)).unwrap_err();

        assert!(matches!(
            err,
            FrameError::BeyondWriteCursor {
                offset: 0,
                end: 12,
                limit: 6
            }
        ));
        assert_eq!(tailer.position(), Position::default());
    }

    #[test]
    fn test_invalid_length_and_missing_segment() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(&temp_dir, 0, &u32::MAX.to_be_bytes());

        let mut tailer = Tailer::new(config(&temp_dir), Position::default());
        let write = Position::new(2, 0);
        assert!(matches!(
            tailer.read_next(write).unwrap_err(),
            FrameError::InvalidLength { len: u32::MAX, .. }
        ));

        tailer.advance_segment();
        assert!(matches!(
            tailer.read_next(write).unwrap_err(),
            FrameError::Open { .. }
        ));
    }
}
