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

//! Durable, crash-safe, file-backed FIFO queue.
//!
//! Records are opaque byte payloads appended to numbered segment files and
//! delivered in order through a single-slot channel. Read and write cursors
//! are persisted to a small metadata file so a restarted process resumes
//! where the last save left off.

pub mod builder;
pub mod config;
pub mod error;
pub mod manifest;
pub mod path;
pub mod queue;

mod appender;
mod crc;
mod io_worker;
mod manifest_writer;
mod message;
mod recovery;
mod tailer;

pub use builder::QueueBuilder;
pub use config::{QueueConfig, SyncPolicy};
pub use error::{QueueError, Result};
pub use manifest::{Manifest, Position};
pub use queue::{BackendQueue, DiskQueue, read_metadata};
