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
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, Registry, filter, layer::SubscriberExt};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory path for storing log files.
    ///
    /// When set to a non-empty string, log files are created in this
    /// directory with hourly rotation, plus a separate error-only file. If
    /// empty, only stdout logging is used.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Log level filter string, e.g. "info" or "info,queue=debug". If None,
    /// falls back to the RUST_LOG environment variable or "info".
    pub level: Option<String>,

    /// Output format for log messages.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated log files to retain. Default is 720 files
    /// (30 days of hourly logs).
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to output logs to stdout in addition to files.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON objects with structured fields, for log aggregation pipelines.
    Json,

    /// Human-readable text.
    ///
    /// ```text
    /// 2024-01-01T12:00:00.123Z  INFO diskqueue{queue=orders}: queue: Rolled to new segment
    /// ```
    #[default]
    Text,
}

/// Initialize logging for unit tests.
///
/// Logs go to files under `UNITTEST_LOG_DIR` (default
/// "/tmp/__unittest_logs") at `UNITTEST_LOG_LEVEL` (default "debug"). Safe
/// to call from every test; only the first call does anything.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let Ok(mut g) = GLOBAL_UT_LOG_GUARD.as_ref().lock() else {
            return;
        };

        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            ..Default::default()
        };
        *g = Some(init_global_logging("unittest", &opts));

        tracing::info!("logs dir = {}", dir);
    });
}

/// Holds the unit test worker guards so they live for the whole test run.
static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Fallback when neither `level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(writer: W, format: LogFormat, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}

/// Initialize the global subscriber.
///
/// Layers, depending on `opts`:
/// - **Stdout**: if `append_stdout` is true
/// - **File**: `{app_name}.*` with hourly rotation, if `dir` is set
/// - **Error file**: `{app_name}-err.*`, errors only, if `dir` is set
///
/// Returns the worker guards of the non-blocking writers; dropping them
/// stops the background logging threads. Only the first call per process
/// installs anything.
///
/// # Panics
///
/// Panics if the log directory cannot be used, the level string does not
/// parse, or another global subscriber is already installed.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let mut layers: Vec<BoxedLayer> = Vec::new();

        if opts.append_stdout {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            layers.push(fmt_layer(
                writer,
                opts.log_format,
                std::io::stdout().is_terminal(),
            ));
        }

        if !opts.dir.is_empty() {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling_appender(opts, app_name.to_string()));
            guards.push(guard);
            layers.push(fmt_layer(writer, opts.log_format, false));

            let (writer, guard) =
                tracing_appender::non_blocking(rolling_appender(opts, format!("{app_name}-err")));
            guards.push(guard);
            layers.push(
                fmt_layer(writer, opts.log_format, false)
                    .with_filter(filter::LevelFilter::ERROR)
                    .boxed(),
            );
        }

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string");

        let subscriber = Registry::default().with(layers).with(filter);

        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");
    });

    guards
}

fn rolling_appender(opts: &LoggingOptions, prefix: String) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| {
            panic!(
                "initializing rolling file appender at {} failed: {}",
                &opts.dir, e
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = LoggingOptions::default();
        assert!(opts.dir.is_empty());
        assert_eq!(opts.level, None);
        assert_eq!(opts.log_format, LogFormat::Text);
        assert_eq!(opts.max_log_files, 720);
        assert!(opts.append_stdout);
    }

    #[test]
    fn test_builder_matches_default() {
        assert_eq!(LoggingOptions::builder().build(), LoggingOptions::default());
    }

    #[test]
    fn test_deserialize_partial_options() {
        let opts: LoggingOptions =
            serde_json::from_str(r#"{"dir": "/var/log/logspool", "log_format": "json"}"#).unwrap();
        assert_eq!(opts.dir, "/var/log/logspool");
        assert_eq!(opts.log_format, LogFormat::Json);
        assert_eq!(opts.max_log_files, 720);
    }

    #[test]
    fn test_empty_log_format_falls_back_to_text() {
        let opts: LoggingOptions = serde_json::from_str(r#"{"log_format": ""}"#).unwrap();
        assert_eq!(opts.log_format, LogFormat::Text);
    }
}
