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

use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use crossbeam::channel;
use logspool_app::{BufferedOutput, Record, SpoolConfig, open_queue};
use logspool_common_telemetry as telemetry;
use queue::DiskQueue;
use serde_json::{Map, Value};
use snafu::{ResultExt, Whatever};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "logspool",
about= "Durable on-disk spool for log records",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config:    Option<PathBuf>,
    /// Overrides `queue.data_path`.
    #[arg(long, global = true)]
    data_path: Option<String>,
    /// Overrides `queue.name`.
    #[arg(long, global = true)]
    name:      Option<String>,
    /// Also print diagnostics to stdout.
    #[arg(short, long, global = true)]
    verbose:   bool,
    #[command(subcommand)]
    commands:  Commands,
}

impl Cli {
    fn spool_config(&self) -> Result<SpoolConfig, Whatever> {
        let mut config = SpoolConfig::load(self.config.as_deref())?;
        if let Some(data_path) = &self.data_path {
            config.queue.data_path.clone_from(data_path);
        }
        if let Some(name) = &self.name {
            config.queue.name.clone_from(name);
        }
        // Payloads go to stdout; keep diagnostics out of the way.
        config.logging.append_stdout = self.verbose;
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Put(PutArgs),
    Drain(DrainArgs),
    Depth(DepthArgs),
    Empty(EmptyArgs),
    Stat(StatArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Append records to the queue, one per argument or one per stdin line.
Examples:

logspool put 'first line' 'second line'
tail -f app.log | logspool put --tag app.log

")]
struct PutArgs {
    /// Wrap each line in a JSON record with this tag.
    #[arg(long)]
    tag:   Option<String>,
    lines: Vec<String>,
}

impl PutArgs {
    fn run(&self, config: &SpoolConfig) -> Result<(), Whatever> {
        let queue = Arc::new(open_queue(&config.queue)?);
        let output = BufferedOutput::new(queue.clone(), io::sink(), Duration::from_secs(1));

        let put = |line: &str| -> Result<(), Whatever> {
            match &self.tag {
                Some(tag) => {
                    let mut fields = Map::new();
                    fields.insert("message".to_string(), Value::from(line));
                    output.emit(&Record::now(tag.as_str(), fields))
                }
                None => queue
                    .put(line.as_bytes())
                    .whatever_context("Failed to put record"),
            }
        };

        let mut count = 0u64;
        if self.lines.is_empty() {
            for line in io::stdin().lock().lines() {
                let line = line.whatever_context("Failed to read stdin")?;
                put(&line)?;
                count += 1;
            }
        } else {
            for line in &self.lines {
                put(line)?;
                count += 1;
            }
        }

        queue.close().whatever_context("Failed to close queue")?;
        eprintln!("put {count} records");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print queued records to stdout, one per line, removing them from the queue.
Stops after --count records, after --timeout-ms without new data, or on Ctrl-C.
Examples:

logspool drain --count 10
logspool drain --timeout-ms 0

")]
struct DrainArgs {
    #[arg(long)]
    count:      Option<u64>,
    /// Idle time before giving up; 0 waits forever.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

impl DrainArgs {
    fn run(&self, config: &SpoolConfig) -> Result<(), Whatever> {
        let queue = Arc::new(open_queue(&config.queue)?);
        let (stop_tx, stop_rx) = channel::bounded(1);
        ctrlc::set_handler(move || {
            let _ = stop_tx.try_send(());
        })
        .whatever_context("Failed to install Ctrl-C handler")?;

        let idle = (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms));
        let mut output = BufferedOutput::new(
            queue.clone(),
            io::stdout().lock(),
            Duration::from_millis(100),
        );
        let drained = output.drain(self.count, idle, &stop_rx)?;

        queue.close().whatever_context("Failed to close queue")?;
        eprintln!("drained {drained} records, {} remaining", queue.depth());
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Print the number of records waiting in the queue.
Examples:

logspool depth

")]
struct DepthArgs {}

impl DepthArgs {
    fn run(&self, config: &SpoolConfig) -> Result<(), Whatever> {
        let queue = open_queue(&config.queue)?;
        println!("{}", queue.depth());
        close(&queue)
    }
}

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Discard every queued record and reset the queue.
Examples:

logspool empty

")]
struct EmptyArgs {}

impl EmptyArgs {
    fn run(&self, config: &SpoolConfig) -> Result<(), Whatever> {
        let queue = open_queue(&config.queue)?;
        let discarded = queue.depth();
        queue.empty().whatever_context("Failed to empty queue")?;
        eprintln!("discarded {discarded} records");
        close(&queue)
    }
}

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Print the cursors saved in the metadata file without opening the queue.
Examples:

logspool stat --data-path /var/lib/logspool --name forward

")]
struct StatArgs {}

impl StatArgs {
    fn run(&self, config: &SpoolConfig) -> Result<(), Whatever> {
        let section = &config.queue;
        let metadata = queue::read_metadata(&section.data_path, &section.name)
            .with_whatever_context(|_| format!("Failed to read metadata of {}", section.name))?;
        match metadata {
            Some(manifest) => {
                println!("read:  {}:{}", manifest.read.file_num, manifest.read.pos);
                println!("write: {}:{}", manifest.write.file_num, manifest.write.pos);
                println!("depth: {}", manifest.depth);
            }
            None => println!("no metadata for queue {}", section.name),
        }
        Ok(())
    }
}

fn close(queue: &DiskQueue) -> Result<(), Whatever> { queue.close().whatever_context("Failed to close queue") }

fn main() -> Result<(), Whatever> {
    human_panic::setup_panic!();
    let cli = Cli::parse();
    let config = cli.spool_config()?;
    let _guards = telemetry::init_global_logging("logspool", &config.logging);
    telemetry::set_panic_hook();

    match &cli.commands {
        Commands::Put(args) => args.run(&config),
        Commands::Drain(args) => args.run(&config),
        Commands::Depth(args) => args.run(&config),
        Commands::Empty(args) => args.run(&config),
        Commands::Stat(args) => args.run(&config),
    }
}
