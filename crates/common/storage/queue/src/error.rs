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

use std::{io, path::PathBuf};

use snafu::Snafu;

use crate::manifest::DecodeError;

/// Queue operation errors.
///
/// Corruption found by the background reader never shows up here: it is
/// handled inside the worker and only logged.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Filesystem I/O failure without a more specific context.
    #[snafu(display("IO error"), context(false))]
    Io { source: io::Error },

    #[snafu(display("Failed to open segment {}", path.display()))]
    OpenSegment { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to write segment {}", path.display()))]
    WriteSegment { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to sync segment {}", path.display()))]
    SyncSegment { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to save metadata {}", path.display()))]
    SaveMetadata { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to load metadata {}", path.display()))]
    LoadMetadata { path: PathBuf, source: io::Error },

    /// The metadata file exists but cannot be trusted. Fatal at open time.
    #[snafu(display("Metadata file {} is corrupted", path.display()))]
    MetadataCorrupted { path: PathBuf, source: DecodeError },

    #[snafu(display("Failed to remove {}", path.display()))]
    RemoveFile { path: PathBuf, source: io::Error },

    #[snafu(display("Invalid payload size {len}, expected between {min} and {max} bytes"))]
    InvalidPayload { len: usize, min: u32, max: u32 },

    #[snafu(display("Invalid queue configuration: {reason}"))]
    InvalidConfig { reason: String },

    /// The queue was closed or deleted and must be reopened.
    #[snafu(display("Queue is closed"))]
    Closed,

    #[snafu(display("Failed to spawn queue worker thread"))]
    SpawnWorker { source: io::Error },

    #[snafu(display("Queue worker thread panicked"))]
    WorkerPanicked,
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
