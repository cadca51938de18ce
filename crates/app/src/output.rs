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

//! An output that buffers records through a disk queue and writes them as
//! lines to any [`Write`] sink.

use std::{
    io::Write,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver, select};
use queue::BackendQueue;
use snafu::{ResultExt, Whatever};
use tracing::{debug, info};

use crate::record::Record;

pub struct BufferedOutput<W: Write> {
    queue:          Arc<dyn BackendQueue>,
    writer:         W,
    /// How often written lines are flushed to the sink.
    flush_interval: Duration,
}

impl<W: Write> BufferedOutput<W> {
    pub fn new(queue: Arc<dyn BackendQueue>, writer: W, flush_interval: Duration) -> Self {
        Self {
            queue,
            writer,
            flush_interval,
        }
    }

    /// Encode a record and put it on the queue.
    pub fn emit(&self, record: &Record) -> Result<(), Whatever> {
        let payload = record.encode()?;
        self.queue
            .put(&payload)
            .whatever_context("Failed to buffer record")
    }

    /// Drain the queue into the sink until `stop` fires or disconnects.
    pub fn run(&mut self, stop: &Receiver<()>) -> Result<u64, Whatever> { self.drain(None, None, stop) }

    /// Like [`run`](Self::run), but also returns after `limit` records or
    /// once nothing arrived for `idle_timeout`.
    pub fn drain(
        &mut self,
        limit: Option<u64>,
        idle_timeout: Option<Duration>,
        stop: &Receiver<()>,
    ) -> Result<u64, Whatever> {
        let records = self.queue.read_chan();
        let ticker = channel::tick(self.flush_interval);
        let mut written = 0u64;
        let mut unflushed = 0u64;
        let mut last_record = Instant::now();

        loop {
            if limit.is_some_and(|limit| written >= limit) {
                break;
            }
            let idle = idle_timeout.map_or_else(channel::never, |timeout| {
                channel::after(timeout.saturating_sub(last_record.elapsed()))
            });

            select! {
                recv(records) -> payload => {
                    let Ok(payload) = payload else {
                        debug!("Queue closed, stopping output");
                        break;
                    };
                    self.writer
                        .write_all(&payload)
                        .and_then(|()| self.writer.write_all(b"\n"))
                        .whatever_context("Failed to write record")?;
                    written += 1;
                    unflushed += 1;
                    last_record = Instant::now();
                }
                recv(ticker) -> _ => {
                    if unflushed > 0 {
                        self.flush()?;
                        unflushed = 0;
                    }
                }
                recv(idle) -> _ => break,
                recv(stop) -> _ => break,
            }
        }

        self.flush()?;
        info!(written, "Output drained");
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), Whatever> { self.writer.flush().whatever_context("Failed to flush output") }

    pub fn into_inner(self) -> W { self.writer }
}
