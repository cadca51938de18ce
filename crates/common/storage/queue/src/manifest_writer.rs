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

//! Atomic metadata persistence.
//!
//! Saves write the full record to `{meta}.tmp`, fsync it, then rename it
//! over the live file and fsync the directory. A crash at any point leaves
//! either the previous record or the new one, never a torn mix.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use tracing::debug;

use crate::{
    Result,
    error::{LoadMetadataSnafu, MetadataCorruptedSnafu, SaveMetadataSnafu},
    manifest::Manifest,
    path::{metadata_file_path, remove_file_if_exists},
};

pub(crate) struct ManifestWriter {
    dir:      PathBuf,
    path:     PathBuf,
    tmp_path: PathBuf,
}

impl ManifestWriter {
    pub fn new<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let path = metadata_file_path(&dir, name);
        let tmp_path = path.with_extension("dat.tmp");
        Self {
            dir,
            path,
            tmp_path,
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Reads the persisted manifest. A missing file means a fresh queue.
    pub fn read_latest(&self) -> Result<Option<Manifest>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(LoadMetadataSnafu { path: &self.path }),
        };

        let manifest =
            Manifest::deserialize(&data).context(MetadataCorruptedSnafu { path: &self.path })?;
        Ok(Some(manifest))
    }

    pub fn write(&self, manifest: &Manifest) -> Result<()> {
        self.replace_atomically(&manifest.serialize())
            .context(SaveMetadataSnafu { path: &self.path })?;

        debug!(
            path = ?self.path,
            read_file_num = manifest.read.file_num,
            read_pos = manifest.read.pos,
            write_file_num = manifest.write.file_num,
            write_pos = manifest.write.pos,
            depth = manifest.depth,
            "Metadata saved"
        );
        Ok(())
    }

    /// Deletes the metadata file and any leftover temporary file.
    pub fn remove(&self) -> Result<()> {
        remove_file_if_exists(&self.tmp_path)?;
        remove_file_if_exists(&self.path)?;
        Ok(())
    }

    fn replace_atomically(&self, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        sync_dir(&self.dir)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> { File::open(dir)?.sync_all() }

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> { Ok(()) }
