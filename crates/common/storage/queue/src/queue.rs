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

//! The disk queue facade and its lifecycle.
//!
//! A [`DiskQueue`] owns one background worker thread that decodes records
//! and hands them, one at a time, to whoever receives from
//! [`read_chan`](DiskQueue::read_chan). Producers call
//! [`put`](DiskQueue::put) from any thread.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new("orders", "/var/lib/logspool").build()?;
//!
//! queue.put(b"hello")?;
//! let record = queue.read_chan().recv()?;
//!
//! // Persists cursors and stops the worker.
//! queue.close()?;
//! ```
//!
//! ## Locking
//!
//! State shared with the worker lives in [`Shared`]. When more than one lock
//! is needed they are taken in this order: `appender`, `committed`,
//! `last_sync`.

use std::{
    fs,
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{error, info};

use crate::{
    QueueConfig, Result,
    appender::Appender,
    error::{ClosedSnafu, SpawnWorkerSnafu, WorkerPanickedSnafu},
    io_worker::IOWorker,
    manifest::{Manifest, Position},
    manifest_writer::ManifestWriter,
    path::{
        quarantine_path, remove_file_if_exists, scan_quarantined_files, scan_segment_files,
        segment_file_path,
    },
    recovery::{self, Recovered},
};

/// The interface output adapters buffer through.
pub trait BackendQueue: Send + Sync {
    fn put(&self, data: &[u8]) -> Result<()>;
    fn read_chan(&self) -> Receiver<Bytes>;
    fn depth(&self) -> i64;
    fn empty(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn delete(&self) -> Result<()>;
}

/// State touched by both producers and the worker.
pub(crate) struct Shared {
    pub config:    Arc<QueueConfig>,
    pub appender:  Mutex<Appender>,
    /// Acknowledged read cursor. Depth decrements happen while it is held so
    /// that a saved snapshot never counts a delivery twice.
    pub committed: Mutex<Position>,
    pub depth:     AtomicI64,
    /// Writes and deliveries since the last metadata save.
    unsynced:      AtomicU64,
    last_sync:     Mutex<Instant>,
    store:         ManifestWriter,
    /// Wakes an idle worker after a put.
    notify_tx:     Sender<()>,
}

impl Shared {
    pub fn write_position(&self) -> Position { self.appender.lock().position() }

    fn snapshot_with(&self, appender: &Appender) -> Manifest {
        let committed = self.committed.lock();
        Manifest {
            read:  *committed,
            write: appender.position(),
            depth: self.depth.load(Ordering::Acquire),
        }
    }

    fn sync_with(&self, appender: &Appender) -> Result<()> {
        appender.sync_file()?;
        self.store.write(&self.snapshot_with(appender))?;
        self.unsynced.store(0, Ordering::Release);
        *self.last_sync.lock() = Instant::now();
        Ok(())
    }

    /// Flush the active segment and persist the cursors.
    pub fn sync(&self) -> Result<()> {
        let appender = self.appender.lock();
        self.sync_with(&appender)
    }

    /// Count one mutation, persisting when the sync policy says so.
    fn record_op(&self, force: bool) -> Result<()> {
        let pending = self.unsynced.fetch_add(1, Ordering::AcqRel) + 1;
        if force || self.sync_due(pending) {
            self.sync()?;
        }
        Ok(())
    }

    /// Like `record_op` for the worker, which has no caller to report to.
    pub fn note_op(&self, force: bool) {
        if let Err(e) = self.record_op(force) {
            error!(error = ?e, "Failed to persist queue metadata");
        }
    }

    /// Time-based trigger, driven by the worker's ticker.
    pub fn sync_if_due(&self) {
        let pending = self.unsynced.load(Ordering::Acquire);
        if self.sync_due(pending) {
            self.sync_logged();
        }
    }

    fn sync_due(&self, pending: u64) -> bool {
        self.config
            .sync_policy
            .should_sync(pending, self.last_sync.lock().elapsed())
    }

    fn sync_logged(&self) {
        if let Err(e) = self.sync() {
            error!(error = ?e, "Failed to persist queue metadata");
        }
    }

    fn put(&self, data: &[u8]) -> Result<()> {
        let rolled = {
            let mut appender = self.appender.lock();
            let rolled = appender.append(data)?;
            self.depth.fetch_add(1, Ordering::AcqRel);
            rolled
        };
        // A full slot already guarantees a wakeup.
        let _ = self.notify_tx.try_send(());
        self.record_op(rolled)
    }

    /// A record was handed to a consumer; `next` is the position after it.
    pub fn commit_delivery(&self, next: Position) {
        {
            let mut committed = self.committed.lock();
            *committed = next;
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        self.note_op(false);
    }

    /// The reader moved on to a new segment. Always persisted.
    pub fn commit_segment(&self, next: Position) {
        *self.committed.lock() = next;
        self.note_op(true);
    }
}

struct WorkerHandle {
    /// Dropping it tells the worker to exit.
    exit_tx: Sender<()>,
    handle:  JoinHandle<()>,
}

impl WorkerHandle {
    fn stop(self) -> Result<()> {
        drop(self.exit_tx);
        self.handle.join().map_err(|_| WorkerPanickedSnafu.build())
    }
}

struct Lifecycle {
    worker:  Option<WorkerHandle>,
    /// Kept here so the read channel survives worker restarts. `None` once
    /// the queue is closed or deleted.
    read_tx: Option<Sender<Bytes>>,
}

impl Lifecycle {
    fn live_sender(&self) -> Result<Sender<Bytes>> { self.read_tx.clone().context(ClosedSnafu) }

    fn stop_worker(&mut self) -> Result<()> {
        match self.worker.take() {
            Some(worker) => worker.stop(),
            None => Ok(()),
        }
    }
}

/// A durable FIFO queue of opaque records backed by segment files.
pub struct DiskQueue {
    shared:    Arc<Shared>,
    read_rx:   Receiver<Bytes>,
    notify_rx: Receiver<()>,
    lifecycle: Mutex<Lifecycle>,
}

impl DiskQueue {
    /// Open the queue, resuming from persisted metadata if there is any.
    pub fn open(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_path)?;
        let config = Arc::new(config);

        let store = ManifestWriter::new(&config.data_path, &config.name);
        let Recovered { manifest, dirty } = recovery::recover(&config, &store)?;

        let (notify_tx, notify_rx) = channel::bounded(1);
        let shared = Arc::new(Shared {
            config: config.clone(),
            appender: Mutex::new(Appender::new(config.clone(), manifest.write)),
            committed: Mutex::new(manifest.read),
            depth: AtomicI64::new(manifest.depth),
            unsynced: AtomicU64::new(0),
            last_sync: Mutex::new(Instant::now()),
            store,
            notify_tx,
        });
        if dirty {
            shared.sync()?;
        }

        let (read_tx, read_rx) = channel::bounded(0);
        let worker = spawn_worker(&shared, manifest.read, &read_tx, &notify_rx)?;

        info!(
            queue = %config.name,
            path = ?config.data_path,
            read = ?manifest.read,
            write = ?manifest.write,
            depth = manifest.depth,
            "Disk queue opened"
        );

        Ok(Self {
            shared,
            read_rx,
            notify_rx,
            lifecycle: Mutex::new(Lifecycle {
                worker:  Some(worker),
                read_tx: Some(read_tx),
            }),
        })
    }

    /// Append one record. Returns once the frame is in the segment file.
    ///
    /// When the append triggers a metadata save and that save fails, the
    /// error is returned even though the record itself was written and will
    /// be delivered. A retry may therefore store the record twice.
    pub fn put(&self, data: &[u8]) -> Result<()> { self.shared.put(data) }

    /// The single-slot handoff records are delivered on. Every clone shares
    /// the same stream; each record goes to exactly one receiver.
    pub fn read_chan(&self) -> Receiver<Bytes> { self.read_rx.clone() }

    /// Records written and not yet delivered.
    pub fn depth(&self) -> i64 { self.shared.depth.load(Ordering::Acquire) }

    /// Force the active segment and the cursors to disk now.
    pub fn sync(&self) -> Result<()> {
        let lifecycle = self.lifecycle.lock();
        ensure!(lifecycle.read_tx.is_some(), ClosedSnafu);
        self.shared.sync()
    }

    /// Current in-memory cursors and depth.
    pub fn snapshot(&self) -> Manifest {
        let appender = self.shared.appender.lock();
        self.shared.snapshot_with(&appender)
    }

    pub fn config(&self) -> &QueueConfig { &self.shared.config }

    /// Stop the worker, persist metadata and release file handles.
    ///
    /// Any later call other than [`depth`](Self::depth) fails with
    /// [`QueueError::Closed`](crate::QueueError::Closed).
    pub fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        ensure!(lifecycle.read_tx.is_some(), ClosedSnafu);
        let stopped = lifecycle.stop_worker();
        lifecycle.read_tx = None;

        let synced = {
            let mut appender = self.shared.appender.lock();
            let synced = self.shared.sync_with(&appender);
            appender.close();
            synced
        };

        info!(
            queue = %self.shared.config.name,
            depth = self.depth(),
            "Disk queue closed"
        );
        stopped.and(synced)
    }

    /// Close without saving, then remove every file the queue owns.
    pub fn delete(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        ensure!(lifecycle.read_tx.is_some(), ClosedSnafu);
        let stopped = lifecycle.stop_worker();
        lifecycle.read_tx = None;

        let removed = {
            let mut appender = self.shared.appender.lock();
            appender.close();
            self.remove_all_files()
        }?;

        info!(
            queue = %self.shared.config.name,
            segments = removed,
            "Disk queue deleted"
        );
        stopped
    }

    /// Discard the whole backlog and start over at segment 0.
    pub fn empty(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        let read_tx = lifecycle.live_sender()?;
        let stopped = lifecycle.stop_worker();

        let removed = {
            let mut appender = self.shared.appender.lock();
            let mut committed = self.shared.committed.lock();
            appender.reset();
            *committed = Position::default();
            self.shared.depth.store(0, Ordering::Release);
            self.shared.unsynced.store(0, Ordering::Release);
            self.remove_all_files()
        };

        lifecycle.worker = Some(spawn_worker(
            &self.shared,
            Position::default(),
            &read_tx,
            &self.notify_rx,
        )?);

        let removed = removed?;
        info!(
            queue = %self.shared.config.name,
            segments = removed,
            "Disk queue emptied"
        );
        stopped
    }

    /// Removes every segment of this queue, quarantined ones included, and
    /// its metadata.
    fn remove_all_files(&self) -> Result<usize> {
        let config = &self.shared.config;
        let mut removed = 0;
        for file_num in scan_segment_files(&config.data_path, &config.name)? {
            let path = segment_file_path(&config.data_path, &config.name, file_num);
            if remove_file_if_exists(&path)? {
                removed += 1;
            }
        }
        for file_num in scan_quarantined_files(&config.data_path, &config.name)? {
            let path = segment_file_path(&config.data_path, &config.name, file_num);
            if remove_file_if_exists(&quarantine_path(&path))? {
                removed += 1;
            }
        }
        self.shared.store.remove()?;
        Ok(removed)
    }
}

impl BackendQueue for DiskQueue {
    fn put(&self, data: &[u8]) -> Result<()> { DiskQueue::put(self, data) }

    fn read_chan(&self) -> Receiver<Bytes> { DiskQueue::read_chan(self) }

    fn depth(&self) -> i64 { DiskQueue::depth(self) }

    fn empty(&self) -> Result<()> { DiskQueue::empty(self) }

    fn close(&self) -> Result<()> { DiskQueue::close(self) }

    fn delete(&self) -> Result<()> { DiskQueue::delete(self) }
}

impl Drop for DiskQueue {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().read_tx.is_some()
            && let Err(e) = self.close()
        {
            error!(error = ?e, queue = %self.shared.config.name, "Failed to close disk queue on drop");
        }
    }
}

/// Reads the persisted metadata of a queue without opening it.
pub fn read_metadata<P: AsRef<std::path::Path>>(dir: P, name: &str) -> Result<Option<Manifest>> {
    ManifestWriter::new(dir, name).read_latest()
}

fn spawn_worker(
    shared: &Arc<Shared>,
    start: Position,
    read_tx: &Sender<Bytes>,
    notify_rx: &Receiver<()>,
) -> Result<WorkerHandle> {
    let (exit_tx, exit_rx) = channel::bounded(0);
    let worker = IOWorker::new(
        shared.clone(),
        start,
        read_tx.clone(),
        exit_rx,
        notify_rx.clone(),
    );
    let handle = thread::Builder::new()
        .name(format!("diskqueue-{}", shared.config.name))
        .spawn(move || worker.run())
        .context(SpawnWorkerSnafu)?;
    Ok(WorkerHandle { exit_tx, handle })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::{QueueBuilder, QueueError};

    fn open(temp_dir: &TempDir) -> DiskQueue {
        QueueBuilder::new("unit", temp_dir.path())
            .max_bytes_per_file(1024)
            .build()
            .unwrap()
    }

    #[test]
    fn test_put_then_receive() {
        let temp_dir = TempDir::new().unwrap();
        let queue = open(&temp_dir);

        queue.put(b"payload").unwrap();
        let received = queue
            .read_chan()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();

        assert_eq!(received, Bytes::from_static(b"payload"));
        queue.close().unwrap();
    }

    #[test]
    fn test_operations_after_close_fail() {
        let temp_dir = TempDir::new().unwrap();
        let queue = open(&temp_dir);
        queue.close().unwrap();

        assert!(matches!(queue.put(b"late"), Err(QueueError::Closed)));
        assert!(matches!(queue.close(), Err(QueueError::Closed)));
        assert!(matches!(queue.sync(), Err(QueueError::Closed)));
        assert!(matches!(queue.empty(), Err(QueueError::Closed)));
        assert!(matches!(queue.delete(), Err(QueueError::Closed)));
        assert!(queue.read_chan().recv().is_err());
    }

    #[test]
    fn test_sync_persists_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let queue = open(&temp_dir);

        queue.put(b"abc").unwrap();
        queue.sync().unwrap();

        let persisted = read_metadata(temp_dir.path(), "unit").unwrap().unwrap();
        assert_eq!(persisted.write, Position::new(0, 7));
        assert_eq!(persisted.write, queue.snapshot().write);
        queue.close().unwrap();
    }

    #[test]
    fn test_put_reports_failed_metadata_save() {
        let temp_dir = TempDir::new().unwrap();
        let queue = QueueBuilder::new("unit", temp_dir.path())
            .sync_every(1)
            .build()
            .unwrap();
        // A directory where the temporary metadata file goes fails every save.
        let blocker = crate::path::metadata_file_path(temp_dir.path(), "unit")
            .with_extension("dat.tmp");
        std::fs::create_dir(&blocker).unwrap();

        assert!(matches!(
            queue.put(b"stored"),
            Err(QueueError::SaveMetadata { .. })
        ));
        let received = queue
            .read_chan()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(received, Bytes::from_static(b"stored"));

        std::fs::remove_dir(&blocker).unwrap();
        queue.put(b"next").unwrap();
        queue.close().unwrap();
    }

    #[test]
    fn test_drop_closes_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        {
            let queue = open(&temp_dir);
            queue.put(b"kept").unwrap();
        }

        let persisted = read_metadata(temp_dir.path(), "unit").unwrap().unwrap();
        assert_eq!(persisted.write, Position::new(0, 8));
    }
}
