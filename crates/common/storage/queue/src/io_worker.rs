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

//! Background reader for delivering records.
//!
//! ## Architecture
//!
//! One [`IOWorker`] runs per queue on a dedicated thread. It decodes the
//! frame at its look-ahead position, then blocks on a zero-capacity
//! rendezvous until a consumer takes it. Only then does the acknowledged
//! read cursor move.
//!
//! ```text
//! ┌──────────────┐   rendezvous    ┌──────────────┐    read     ┌──────────────┐
//! │   Consumer   │ ◄── channel ─── │   IOWorker   │ ◄────────── │   Segment    │
//! │  (caller)    │                 │  (bg thread) │             │    (.dat)    │
//! └──────────────┘                 └──────────────┘             └──────────────┘
//! ```
//!
//! ## Responsibilities
//!
//! - **Delivery**: one record at a time, in write order
//! - **Segment cleanup**: fully consumed segments are deleted
//! - **Corruption handling**: damaged segments are skipped via
//!   [`recovery::skip_damaged_segment`]
//! - **Time-based sync**: a ticker persists metadata when writes go idle

use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, select, tick};
use tracing::{debug, error, info, info_span};

use crate::{
    manifest::Position,
    path::{remove_file_if_exists, segment_file_path},
    queue::Shared,
    recovery,
    tailer::{ReadOutcome, Tailer},
};

pub(crate) struct IOWorker {
    shared:    Arc<Shared>,
    tailer:    Tailer,
    read_tx:   Sender<Bytes>,
    /// Disconnects when the queue wants the worker gone.
    exit_rx:   Receiver<()>,
    notify_rx: Receiver<()>,
    /// Decoded record waiting for a consumer, with the position after it.
    pending:   Option<(Bytes, Position)>,
}

impl IOWorker {
    pub fn new(
        shared: Arc<Shared>,
        start: Position,
        read_tx: Sender<Bytes>,
        exit_rx: Receiver<()>,
        notify_rx: Receiver<()>,
    ) -> Self {
        let tailer = Tailer::new(shared.config.clone(), start);
        Self {
            shared,
            tailer,
            read_tx,
            exit_rx,
            notify_rx,
            pending: None,
        }
    }

    /// Main loop. Returns when the exit channel disconnects.
    pub fn run(mut self) {
        let span = info_span!("diskqueue", queue = %self.shared.config.name);
        let _guard = span.enter();
        info!(start = ?self.tailer.position(), "Queue worker starting");

        let ticker = tick(self.shared.config.sync_policy.timeout);
        let (read_tx, exit_rx, notify_rx) = (
            self.read_tx.clone(),
            self.exit_rx.clone(),
            self.notify_rx.clone(),
        );
        loop {
            if self.pending.is_none() {
                self.fill();
            }

            match self.pending.as_ref().map(|(payload, _)| payload.clone()) {
                Some(payload) => select! {
                    send(read_tx, payload) -> res => {
                        if res.is_err() {
                            info!("All receivers dropped");
                            break;
                        }
                        self.on_delivered();
                    }
                    recv(ticker) -> _ => self.shared.sync_if_due(),
                    recv(exit_rx) -> _ => break,
                },
                None => select! {
                    recv(notify_rx) -> _ => {}
                    recv(ticker) -> _ => self.shared.sync_if_due(),
                    recv(exit_rx) -> _ => break,
                },
            }
        }

        info!(next = ?self.tailer.position(), "Queue worker stopped");
    }

    /// Decode the next record into `pending`, moving across segment
    /// boundaries and past damage as needed. Leaves `pending` empty when the
    /// reader has caught up with the writer.
    fn fill(&mut self) {
        loop {
            let write = self.shared.write_position();
            if self.tailer.position() == write {
                recovery::heal_depth(&self.shared, write);
                return;
            }

            match self.tailer.read_next(write) {
                Ok(ReadOutcome::Frame(payload)) => {
                    self.pending = Some((payload, self.tailer.position()));
                    return;
                }
                Ok(ReadOutcome::EndOfSegment) => self.finish_segment(),
                Err(err) => recovery::skip_damaged_segment(&self.shared, &mut self.tailer, &err),
            }
        }
    }

    fn on_delivered(&mut self) {
        if let Some((_, next)) = self.pending.take() {
            self.shared.commit_delivery(next);
        }
    }

    /// The reader hit the end of a closed segment: commit the boundary and
    /// delete the file.
    fn finish_segment(&mut self) {
        let finished = self.tailer.advance_segment();
        self.shared.commit_segment(self.tailer.position());

        let config = &self.shared.config;
        let path = segment_file_path(&config.data_path, &config.name, finished);
        match remove_file_if_exists(&path) {
            Ok(_) => debug!(file_num = finished, "Removed consumed segment"),
            Err(e) => error!(error = ?e, file_num = finished, "Failed to remove consumed segment"),
        }
    }
}
