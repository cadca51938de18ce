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

//! File naming for segments and metadata.
//!
//! Every file a queue owns lives directly under its data directory and is
//! prefixed with the queue name:
//!
//! ```text
//! {name}.diskqueue.000000.dat    segment 0
//! {name}.diskqueue.000001.dat    segment 1
//! {name}.diskqueue.meta.dat      cursor metadata
//! ```

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use snafu::ResultExt;

use crate::{Result, error::RemoveFileSnafu};

const SEGMENT_SUFFIX: &str = ".dat";
const QUARANTINE_SUFFIX: &str = ".bad";

fn file_prefix(name: &str) -> String { format!("{name}.diskqueue.") }

/// Generates a segment file name: `{name}.diskqueue.NNNNNN.dat`.
pub fn segment_file_name(name: &str, file_num: u64) -> String {
    format!("{}{file_num:06}{SEGMENT_SUFFIX}", file_prefix(name))
}

/// Returns full path to a segment file.
pub fn segment_file_path<P: AsRef<Path>>(dir: P, name: &str, file_num: u64) -> PathBuf {
    dir.as_ref().join(segment_file_name(name, file_num))
}

/// Generates the metadata file name: `{name}.diskqueue.meta.dat`.
pub fn metadata_file_name(name: &str) -> String {
    format!("{}meta{SEGMENT_SUFFIX}", file_prefix(name))
}

/// Returns full path to the metadata file.
pub fn metadata_file_path<P: AsRef<Path>>(dir: P, name: &str) -> PathBuf {
    dir.as_ref().join(metadata_file_name(name))
}

/// Path a damaged segment is moved to so it can be inspected later.
pub fn quarantine_path(path: &Path) -> PathBuf {
    let mut quarantined = OsString::from(path.as_os_str());
    quarantined.push(QUARANTINE_SUFFIX);
    PathBuf::from(quarantined)
}

/// Parses the segment number out of a file name belonging to `name`.
fn parse_segment_number(name: &str, file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(&file_prefix(name))?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

fn scan_numbered<P, F>(dir: P, parse: F) -> Result<Vec<u64>>
where
    P: AsRef<Path>,
    F: Fn(&str) -> Option<u64>,
{
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut numbers = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(file_num) = entry.file_name().to_str().and_then(&parse) {
            numbers.push(file_num);
        }
    }

    numbers.sort_unstable();
    Ok(numbers)
}

/// Lists the numbers of every segment file of queue `name` under `dir`.
///
/// Quarantined segments and other queues' files are ignored.
pub fn scan_segment_files<P: AsRef<Path>>(dir: P, name: &str) -> Result<Vec<u64>> {
    scan_numbered(dir, |file_name| parse_segment_number(name, file_name))
}

/// Lists the numbers of every quarantined segment of queue `name`.
pub fn scan_quarantined_files<P: AsRef<Path>>(dir: P, name: &str) -> Result<Vec<u64>> {
    scan_numbered(dir, |file_name| {
        parse_segment_number(name, file_name.strip_suffix(QUARANTINE_SUFFIX)?)
    })
}

/// Removes a file, treating a missing file as already removed.
///
/// Returns whether a file was actually deleted.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(RemoveFileSnafu { path }),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0, "orders.diskqueue.000000.dat" ; "first segment")]
    #[test_case(42, "orders.diskqueue.000042.dat" ; "padded number")]
    #[test_case(1_234_567, "orders.diskqueue.1234567.dat" ; "wider than padding")]
    fn test_segment_file_name(file_num: u64, expected: &str) {
        assert_eq!(segment_file_name("orders", file_num), expected);
    }

    #[test]
    fn test_full_paths() {
        assert_eq!(
            segment_file_path("/spool", "orders", 3),
            PathBuf::from("/spool/orders.diskqueue.000003.dat")
        );
        assert_eq!(
            metadata_file_path("/spool", "orders"),
            PathBuf::from("/spool/orders.diskqueue.meta.dat")
        );
        assert_eq!(
            quarantine_path(Path::new("/spool/orders.diskqueue.000003.dat")),
            PathBuf::from("/spool/orders.diskqueue.000003.dat.bad")
        );
    }

    #[test]
    fn test_parse_segment_number() {
        assert_eq!(
            parse_segment_number("orders", "orders.diskqueue.000007.dat"),
            Some(7)
        );
        assert_eq!(parse_segment_number("orders", "orders.diskqueue.meta.dat"), None);
        assert_eq!(
            parse_segment_number("orders", "orders.diskqueue.000007.dat.bad"),
            None
        );
        assert_eq!(parse_segment_number("orders", "other.diskqueue.000007.dat"), None);
    }

    #[test]
    fn test_scan_segment_files() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let base = temp_dir.path();

        for path in [
            segment_file_path(base, "orders", 2),
            segment_file_path(base, "orders", 0),
            segment_file_path(base, "orders", 11),
            segment_file_path(base, "other", 1),
            metadata_file_path(base, "orders"),
        ] {
            std::fs::File::create(path).unwrap();
        }

        assert_eq!(scan_segment_files(base, "orders").unwrap(), vec![0, 2, 11]);
        assert_eq!(scan_segment_files(base, "other").unwrap(), vec![1]);
        assert!(scan_quarantined_files(base, "orders").unwrap().is_empty());
        assert!(
            scan_segment_files(base.join("missing"), "orders")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_scan_quarantined_files() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let base = temp_dir.path();

        for path in [
            quarantine_path(&segment_file_path(base, "orders", 4)),
            quarantine_path(&segment_file_path(base, "orders", 1)),
            quarantine_path(&segment_file_path(base, "other", 2)),
            segment_file_path(base, "orders", 5),
        ] {
            std::fs::File::create(path).unwrap();
        }

        assert_eq!(scan_quarantined_files(base, "orders").unwrap(), vec![1, 4]);
        assert_eq!(scan_segment_files(base, "orders").unwrap(), vec![5]);
    }

    #[test]
    fn test_remove_file_if_exists() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("victim");
        std::fs::File::create(&path).unwrap();

        assert!(remove_file_if_exists(&path).unwrap());
        assert!(!remove_file_if_exists(&path).unwrap());
    }
}
