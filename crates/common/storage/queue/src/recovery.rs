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

//! Startup recovery and runtime corruption handling.
//!
//! Startup uses the metadata file for O(1) recovery:
//! 1. Read metadata to get both cursors and the depth
//! 2. Scan only the active write segment forward from the saved `writePos`,
//!    adopting frames written after the last save
//! 3. Truncate a trailing partial frame and drop segments the read cursor
//!    has already passed
//!
//! At runtime, any decode failure other than a clean end of segment is
//! handled by [`skip_damaged_segment`]: the rest of the segment is given up
//! and reading resumes at the start of the next one.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, Seek, SeekFrom},
    path::Path,
    sync::atomic::Ordering,
};

use snafu::ResultExt;
use tracing::{debug, error, info, warn};

use crate::{
    QueueConfig, Result,
    error::{OpenSegmentSnafu, WriteSegmentSnafu},
    manifest::{Manifest, Position},
    manifest_writer::ManifestWriter,
    message::{FrameError, frame_disk_size, read_frame},
    path::{quarantine_path, remove_file_if_exists, scan_segment_files, segment_file_path},
    queue::Shared,
    tailer::Tailer,
};

/// State to start a queue from.
#[derive(Debug)]
pub(crate) struct Recovered {
    pub manifest: Manifest,
    /// The on-disk files differed from the metadata; save before use.
    pub dirty:    bool,
}

/// What a forward scan of one segment found.
#[derive(Debug, Default, PartialEq, Eq)]
struct TailScan {
    frames:   u64,
    /// Offset after the last complete frame.
    end:      u64,
    file_len: u64,
}

/// Load metadata and reconcile it with the segment files on disk.
pub(crate) fn recover(config: &QueueConfig, store: &ManifestWriter) -> Result<Recovered> {
    let mut manifest = match store.read_latest()? {
        Some(manifest) => manifest,
        None => {
            info!(path = ?store.path(), "No metadata found, starting fresh");
            Manifest::default()
        }
    };
    let persisted = manifest;

    reconcile_tail(config, &mut manifest)?;
    let removed = remove_consumed_segments(config, manifest.read.file_num)?;

    let dirty = manifest != persisted;
    info!(
        read = ?manifest.read,
        write = ?manifest.write,
        depth = manifest.depth,
        adopted = manifest.depth - persisted.depth,
        removed,
        "Recovered queue state"
    );
    Ok(Recovered { manifest, dirty })
}

/// Adopt complete frames written after the last metadata save.
fn reconcile_tail(config: &QueueConfig, manifest: &mut Manifest) -> Result<()> {
    loop {
        let write = manifest.write;
        let path = segment_file_path(&config.data_path, &config.name, write.file_num);
        let scan = scan_segment_from(config, &path, write.pos)?;
        let file_len = scan.as_ref().map_or(0, |scan| scan.file_len);
        if file_len < write.pos {
            // Appending here would leave a hole the reader cannot decode.
            warn!(
                path = ?path,
                file_len,
                write_pos = write.pos,
                "Active segment is shorter than the saved write position, rolling to a new one"
            );
            manifest.write = write.next_segment();
            return Ok(());
        }
        let Some(scan) = scan else {
            return Ok(());
        };

        if scan.file_len > scan.end {
            warn!(
                path = ?path,
                offset = scan.end,
                discarded = scan.file_len - scan.end,
                "Truncating incomplete tail of active segment"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .context(OpenSegmentSnafu { path: &path })?;
            file.set_len(scan.end)
                .and_then(|()| file.sync_all())
                .context(WriteSegmentSnafu { path: &path })?;
        }

        if scan.frames > 0 {
            debug!(path = ?path, frames = scan.frames, end = scan.end, "Adopted unsaved frames");
        }
        manifest.write.pos = scan.end;
        manifest.depth += i64::try_from(scan.frames).unwrap_or(i64::MAX);

        if manifest.write.pos < config.max_bytes_per_file {
            return Ok(());
        }
        // The last adopted frame filled the segment; appends after it went
        // to the next one.
        manifest.write = manifest.write.next_segment();
    }
}

/// Walk complete frames from `start`. `None` if the segment does not exist.
fn scan_segment_from(config: &QueueConfig, path: &Path, start: u64) -> Result<Option<TailScan>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context(OpenSegmentSnafu { path }),
    };
    let file_len = file.metadata()?.len();
    let mut scan = TailScan {
        frames: 0,
        end: start,
        file_len,
    };
    if file_len <= start {
        return Ok(Some(scan));
    }

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(start))?;
    while scan.end < config.max_bytes_per_file {
        match read_frame(
            &mut reader,
            scan.end,
            config.min_msg_size,
            config.max_msg_size,
        ) {
            Ok(Some(payload)) => {
                scan.end += frame_disk_size(payload.len());
                scan.frames += 1;
            }
            Ok(None) => break,
            Err(e) => {
                debug!(path = ?path, error = %e, "Tail scan stopped");
                break;
            }
        }
    }
    Ok(Some(scan))
}

/// Delete segments numbered below the read cursor's segment.
fn remove_consumed_segments(config: &QueueConfig, read_file_num: u64) -> Result<usize> {
    let mut removed = 0;
    for file_num in scan_segment_files(&config.data_path, &config.name)? {
        if file_num >= read_file_num {
            break;
        }
        let path = segment_file_path(&config.data_path, &config.name, file_num);
        if remove_file_if_exists(&path)? {
            info!(path = ?path, "Removed already consumed segment");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Give up on the rest of the tailer's current segment and move to the next.
///
/// If the damaged segment is still the active write segment, the writer is
/// rolled as well so that new records land in a fresh file. The damaged
/// file is renamed with a `.bad` suffix.
pub(crate) fn skip_damaged_segment(shared: &Shared, tailer: &mut Tailer, err: &FrameError) {
    let path = tailer.segment_path();
    let damaged = tailer.position();
    error!(
        path = ?path,
        file_num = damaged.file_num,
        offset = damaged.pos,
        error = %err,
        "Corrupted segment, skipping to the next one"
    );

    {
        let mut appender = shared.appender.lock();
        if appender.position().file_num == damaged.file_num {
            warn!(file_num = damaged.file_num, "Forcing write rotation away from damaged segment");
            appender.roll();
        }
    }

    tailer.advance_segment();
    shared.commit_segment(tailer.position());

    let quarantined = quarantine_path(&path);
    match fs::rename(&path, &quarantined) {
        Ok(()) => info!(path = ?quarantined, "Quarantined damaged segment"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!(path = ?path, error = %e, "Failed to quarantine damaged segment"),
    }
}

/// Reset a stale depth once the reader has caught up with `write`.
///
/// Records lost to corruption are never delivered, so their share of the
/// depth would otherwise stay forever.
pub(crate) fn heal_depth(shared: &Shared, write: Position) {
    let stale = {
        // Puts bump the depth under the write lock; holding it rules out a
        // record that arrived after the caller's snapshot.
        let appender = shared.appender.lock();
        if appender.position() != write {
            return;
        }
        let _committed = shared.committed.lock();
        let stale = shared.depth.swap(0, Ordering::AcqRel);
        if stale == 0 {
            return;
        }
        stale
    };

    warn!(depth = stale, "Reader caught up with a non-zero depth, resetting it");
    shared.note_op(false);
}
