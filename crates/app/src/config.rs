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

//! Configuration file model for the spool.
//!
//! ```json
//! {
//!   "queue": {
//!     "name": "forward",
//!     "data_path": "/var/lib/logspool",
//!     "max_bytes_per_file": 104857600,
//!     "sync_every": 2500,
//!     "sync_timeout_ms": 2000
//!   },
//!   "logging": { "dir": "/var/log/logspool", "level": "info" }
//! }
//! ```

use std::{path::Path, time::Duration};

use bon::Builder;
use logspool_common_telemetry::LoggingOptions;
use queue::{
    QueueConfig, SyncPolicy,
    config::{
        DEFAULT_MAX_BYTES_PER_FILE, DEFAULT_MAX_MSG_SIZE, DEFAULT_SYNC_EVERY,
    },
};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, Whatever};

/// Top level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct SpoolConfig {
    #[builder(default)]
    pub queue:   QueueSection,
    #[builder(default)]
    pub logging: LoggingOptions,
}

impl SpoolConfig {
    /// Load from a JSON file. `None` yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Whatever> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_whatever_context(|_| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_whatever_context(|_| format!("Failed to parse config {}", path.display()))
    }
}

/// The `queue` section: construction parameters of one disk queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct QueueSection {
    #[default = "default"]
    #[builder(into, default = "default".to_string())]
    pub name:               String,
    #[default = "./queue_data"]
    #[builder(into, default = "./queue_data".to_string())]
    pub data_path:          String,
    #[default(DEFAULT_MAX_BYTES_PER_FILE)]
    #[builder(default = DEFAULT_MAX_BYTES_PER_FILE)]
    pub max_bytes_per_file: u64,
    #[default = 1]
    #[builder(default = 1)]
    pub min_msg_size:       u32,
    #[default(DEFAULT_MAX_MSG_SIZE)]
    #[builder(default = DEFAULT_MAX_MSG_SIZE)]
    pub max_msg_size:       u32,
    /// Writes plus deliveries between metadata saves.
    #[default(DEFAULT_SYNC_EVERY)]
    #[builder(default = DEFAULT_SYNC_EVERY)]
    pub sync_every:         u64,
    #[default = 2000]
    #[builder(default = 2000)]
    pub sync_timeout_ms:    u64,
}

impl QueueSection {
    #[must_use]
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            name:               self.name.clone(),
            data_path:          self.data_path.clone().into(),
            max_bytes_per_file: self.max_bytes_per_file,
            min_msg_size:       self.min_msg_size,
            max_msg_size:       self.max_msg_size,
            sync_policy:        SyncPolicy {
                every:   self.sync_every,
                timeout: Duration::from_millis(self.sync_timeout_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use queue::config::DEFAULT_SYNC_TIMEOUT;

    use super::*;

    #[test]
    fn test_default_section_matches_queue_defaults() {
        let config = QueueSection::default().to_queue_config();
        let defaults = QueueConfig::default();

        assert_eq!(config.name, defaults.name);
        assert_eq!(config.data_path, defaults.data_path);
        assert_eq!(config.max_bytes_per_file, defaults.max_bytes_per_file);
        assert_eq!(config.max_msg_size, defaults.max_msg_size);
        assert_eq!(config.sync_policy.timeout, DEFAULT_SYNC_TIMEOUT);
    }

    #[test]
    fn test_builder_matches_default() {
        assert_eq!(SpoolConfig::builder().build(), SpoolConfig::default());
        assert_eq!(QueueSection::builder().build(), QueueSection::default());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("logspool.json");
        std::fs::write(
            &path,
            r#"{"queue": {"name": "forward", "sync_timeout_ms": 50}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let config = SpoolConfig::load(Some(&path)).unwrap();

        assert_eq!(config.queue.name, "forward");
        assert_eq!(config.queue.sync_every, DEFAULT_SYNC_EVERY);
        assert_eq!(
            config.queue.to_queue_config().sync_policy.timeout,
            Duration::from_millis(50)
        );
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_missing_path_uses_defaults() {
        assert_eq!(SpoolConfig::load(None).unwrap(), SpoolConfig::default());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(SpoolConfig::load(Some(&path)).is_err());
    }
}
