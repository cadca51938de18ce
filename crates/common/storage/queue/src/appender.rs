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

//! Write cursor: appends frames to the active segment.
//!
//! The [`Appender`] lives behind the queue's write lock; concurrent
//! producers serialize on it. The reader worker only takes that lock to
//! snapshot the write cursor or to persist metadata.
//!
//! Rotation is decided after a write completes: the frame that pushes a
//! segment to or past `max_bytes_per_file` stays in that segment, and the
//! next append lazily creates the following one.

use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    QueueConfig, Result,
    error::{ClosedSnafu, InvalidPayloadSnafu, OpenSegmentSnafu, SyncSegmentSnafu, WriteSegmentSnafu},
    manifest::Position,
    message::encode_frame,
    path::segment_file_path,
};

pub(crate) struct Appender {
    config:   Arc<QueueConfig>,
    /// `writeFileNum` and `writePos`.
    position: Position,
    /// Handle on the active segment, opened on first append.
    file:     Option<File>,
    closed:   bool,
}

impl Appender {
    pub fn new(config: Arc<QueueConfig>, position: Position) -> Self {
        Self {
            config,
            position,
            file: None,
            closed: false,
        }
    }

    pub const fn position(&self) -> Position { self.position }

    pub fn segment_path(&self) -> PathBuf {
        segment_file_path(
            &self.config.data_path,
            &self.config.name,
            self.position.file_num,
        )
    }

    /// Append one payload as a frame.
    ///
    /// Returns `true` when this write filled the segment and the cursor
    /// moved on to the next one. On error nothing is advanced and the file
    /// handle is dropped so the next call reopens at the cursor.
    pub fn append(&mut self, data: &[u8]) -> Result<bool> {
        ensure!(!self.closed, ClosedSnafu);
        let (min, max) = (self.config.min_msg_size, self.config.max_msg_size);
        ensure!(
            u32::try_from(data.len()).is_ok_and(|len| (min..=max).contains(&len)),
            InvalidPayloadSnafu {
                len: data.len(),
                min,
                max,
            }
        );

        let path = self.segment_path();
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => self.file.insert(open_segment(&path, self.position.pos)?),
        };

        let frame = encode_frame(data);
        if let Err(e) = file.write_all(&frame) {
            self.file = None;
            return Err(e).context(WriteSegmentSnafu { path });
        }
        self.position.pos += frame.len() as u64;

        if self.position.pos >= self.config.max_bytes_per_file {
            self.roll();
            return Ok(true);
        }
        Ok(false)
    }

    /// Close the active segment and move the cursor to the next one.
    ///
    /// Also used by corruption recovery to abandon a damaged active segment.
    pub fn roll(&mut self) {
        let finished = self.position;
        if let Some(file) = self.file.take()
            && let Err(e) = file.set_len(finished.pos).and_then(|()| file.sync_all())
        {
            warn!(
                error = %e,
                file_num = finished.file_num,
                "Failed to finalize segment before rolling"
            );
        }

        self.position = finished.next_segment();
        info!(
            file_num = finished.file_num,
            size = finished.pos,
            next_file_num = self.position.file_num,
            "Rolled to new segment"
        );
    }

    /// Flush the active segment to stable storage.
    pub fn sync_file(&self) -> Result<()> {
        if let Some(file) = &self.file {
            file.sync_data().context(SyncSegmentSnafu {
                path: self.segment_path(),
            })?;
        }
        Ok(())
    }

    /// Drop the file handle and refuse further appends.
    pub fn close(&mut self) {
        self.file = None;
        self.closed = true;
    }

    /// Forget everything and start over at segment 0.
    pub fn reset(&mut self) {
        self.file = None;
        self.position = Position::default();
    }
}

fn open_segment(path: &Path, pos: u64) -> Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .context(OpenSegmentSnafu { path })?;
    if pos > 0 {
        file.seek(SeekFrom::Start(pos))
            .context(OpenSegmentSnafu { path })?;
    }
    debug!(path = ?path, pos, "Opened segment for writing");
    Ok(file)
}
