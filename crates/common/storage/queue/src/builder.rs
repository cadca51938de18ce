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

use crate::{DiskQueue, QueueConfig, Result};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, data_path: P) -> Self {
        Self {
            config: QueueConfig {
                name: name.into(),
                data_path: data_path.into(),
                ..Default::default()
            },
        }
    }

    pub fn max_bytes_per_file(mut self, size: u64) -> Self {
        self.config.max_bytes_per_file = size;
        self
    }

    pub fn min_msg_size(mut self, size: u32) -> Self {
        self.config.min_msg_size = size;
        self
    }

    pub fn max_msg_size(mut self, size: u32) -> Self {
        self.config.max_msg_size = size;
        self
    }

    /// Save metadata after this many writes and deliveries.
    pub fn sync_every(mut self, ops: u64) -> Self {
        self.config.sync_policy.every = ops;
        self
    }

    /// Save metadata at least this often while there are unsaved operations.
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.config.sync_policy.timeout = timeout;
        self
    }

    pub fn config(&self) -> &QueueConfig { &self.config }

    pub fn build(self) -> Result<DiskQueue> { DiskQueue::open(self.config) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        QueueError,
        config::{DEFAULT_MAX_BYTES_PER_FILE, DEFAULT_SYNC_EVERY, DEFAULT_SYNC_TIMEOUT},
    };

    #[test]
    fn test_builder_default_config() {
        let builder = QueueBuilder::new("orders", "/tmp/test_queue");
        let config = builder.config();
        assert_eq!(config.name, "orders");
        assert_eq!(config.data_path, PathBuf::from("/tmp/test_queue"));
        assert_eq!(config.max_bytes_per_file, DEFAULT_MAX_BYTES_PER_FILE);
        assert_eq!(config.sync_policy.every, DEFAULT_SYNC_EVERY);
        assert_eq!(config.sync_policy.timeout, DEFAULT_SYNC_TIMEOUT);
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = QueueBuilder::new("orders", "/tmp/test_queue")
            .max_bytes_per_file(1000)
            .min_msg_size(4)
            .max_msg_size(1 << 10)
            .sync_every(10)
            .sync_timeout(Duration::from_millis(50));

        let config = builder.config();
        assert_eq!(config.max_bytes_per_file, 1000);
        assert_eq!(config.min_msg_size, 4);
        assert_eq!(config.max_msg_size, 1024);
        assert_eq!(config.sync_policy.every, 10);
        assert_eq!(config.sync_policy.timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = QueueBuilder::new("orders", temp_dir.path())
            .max_bytes_per_file(0)
            .build();

        assert!(matches!(result, Err(QueueError::InvalidConfig { .. })));
    }
}
