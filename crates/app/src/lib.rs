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

//! Wiring between configuration, the disk queue and outputs.

pub mod config;
pub mod output;
pub mod record;

pub use config::{QueueSection, SpoolConfig};
pub use output::BufferedOutput;
use queue::DiskQueue;
pub use record::Record;
use snafu::{ResultExt, Whatever};
use tracing::info;

/// Open the queue described by a configuration section.
pub fn open_queue(section: &QueueSection) -> Result<DiskQueue, Whatever> {
    let config = section.to_queue_config();
    info!(
        queue = %config.name,
        path = ?config.data_path,
        max_bytes_per_file = config.max_bytes_per_file,
        "Opening disk queue"
    );
    DiskQueue::open(config)
        .with_whatever_context(|_| format!("Failed to open queue {}", section.name))
}
