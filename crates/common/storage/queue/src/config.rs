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

use std::{path::PathBuf, time::Duration};

use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

/// Default rotation threshold: 100 MiB per segment.
pub const DEFAULT_MAX_BYTES_PER_FILE: u64 = 100 * 1024 * 1024;
/// Default upper bound for a single payload.
pub const DEFAULT_MAX_MSG_SIZE: u32 = 8 * 1024 * 1024;
pub const DEFAULT_SYNC_EVERY: u64 = 2500;
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Logical queue name, used as the prefix of every file the queue owns.
    pub name:               String,
    /// Directory holding segment and metadata files.
    pub data_path:          PathBuf,
    /// A segment is rolled after the write that makes it reach this size.
    pub max_bytes_per_file: u64,
    pub min_msg_size:       u32,
    pub max_msg_size:       u32,
    pub sync_policy:        SyncPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name:               "default".to_string(),
            data_path:          PathBuf::from("./queue_data"),
            max_bytes_per_file: DEFAULT_MAX_BYTES_PER_FILE,
            min_msg_size:       1,
            max_msg_size:       DEFAULT_MAX_MSG_SIZE,
            sync_policy:        SyncPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// Rejects settings the queue cannot operate with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.name.is_empty(),
            InvalidConfigSnafu {
                reason: "queue name must not be empty",
            }
        );
        ensure!(
            !self.name.contains(['/', '\\']),
            InvalidConfigSnafu {
                reason: format!("queue name {:?} must not contain path separators", self.name),
            }
        );
        ensure!(
            self.max_bytes_per_file > 0,
            InvalidConfigSnafu {
                reason: "max_bytes_per_file must be positive",
            }
        );
        ensure!(
            self.min_msg_size >= 1 && self.min_msg_size <= self.max_msg_size,
            InvalidConfigSnafu {
                reason: format!(
                    "message size bounds [{}, {}] are invalid",
                    self.min_msg_size, self.max_msg_size
                ),
            }
        );
        ensure!(
            self.sync_policy.every > 0 && !self.sync_policy.timeout.is_zero(),
            InvalidConfigSnafu {
                reason: "sync_every and sync_timeout must be positive",
            }
        );
        Ok(())
    }
}

/// When cursor metadata (and the active segment) are forced to disk.
///
/// Both triggers apply: a save happens after `every` operations (writes
/// plus deliveries) or once `timeout` has elapsed with at least one
/// unsynced operation, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub every:   u64,
    pub timeout: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            every:   DEFAULT_SYNC_EVERY,
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

impl SyncPolicy {
    pub fn should_sync(&self, pending_ops: u64, since_last_sync: Duration) -> bool {
        pending_ops >= self.every || (pending_ops > 0 && since_last_sync >= self.timeout)
    }
}
