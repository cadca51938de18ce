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

//! The envelope records travel in.
//!
//! The queue stores opaque bytes. Outputs encode a [`Record`] as one JSON
//! object per payload and decode it again on the way out.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{ResultExt, Whatever};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Routing tag, e.g. `app.access`.
    pub tag:    String,
    /// Event time in seconds since the Unix epoch.
    pub time:   u64,
    pub fields: Map<String, Value>,
}

impl Record {
    /// A record stamped with the current time.
    pub fn now<S: Into<String>>(tag: S, fields: Map<String, Value>) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self {
            tag: tag.into(),
            time,
            fields,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Whatever> {
        serde_json::to_vec(self).whatever_context("Failed to encode record")
    }

    pub fn decode(payload: &[u8]) -> Result<Self, Whatever> {
        serde_json::from_slice(payload).whatever_context("Failed to decode record")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_encode_is_single_line_json() {
        let mut fields = Map::new();
        fields.insert("message".to_string(), json!("line one\nline two"));
        let record = Record {
            tag: "app.access".to_string(),
            time: 1_700_000_000,
            fields,
        };

        let payload = record.encode().unwrap();

        assert!(!payload.contains(&b'\n'));
        assert_eq!(Record::decode(&payload).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_garbage() { assert!(Record::decode(b"\x00\x01").is_err()); }

    #[test]
    fn test_now_is_stamped() {
        let record = Record::now("tag", Map::new());
        assert!(record.time > 0);
    }
}
