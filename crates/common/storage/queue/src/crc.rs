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

//! CRC32 checksum for the metadata record.
//!
//! Uses CRC-32 (IEEE polynomial) via crc32fast. Segments carry no checksum;
//! only the small metadata file does, so a torn or garbled save is caught at
//! open time instead of silently seeding wrong cursors.

use crc32fast::Hasher;

/// Calculates the CRC32 of an encoded metadata body.
#[inline]
pub(crate) fn calculate_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies an encoded metadata body against its stored checksum.
#[inline]
pub(crate) fn verify_crc(data: &[u8], expected: u32) -> bool { calculate_crc(data) == expected }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_crc() {
        let data = b"cursor metadata";
        assert_eq!(calculate_crc(data), calculate_crc(data));
        assert_ne!(calculate_crc(data), calculate_crc(b"cursor metadatA"));
    }

    #[test]
    fn test_verify_crc() {
        let data = b"cursor metadata";
        let crc = calculate_crc(data);

        assert!(verify_crc(data, crc));
        assert!(!verify_crc(data, crc.wrapping_add(1)));
        assert!(!verify_crc(b"wrong", crc));
    }
}
