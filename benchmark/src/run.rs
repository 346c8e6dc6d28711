//! One benchmark run: validate the configuration, open the sink, run
//! producer and monitor to completion, clean up, report.

use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_with::serde_as;
use tracing::debug;
use writeback_sink::{Sink, SinkError, SinkOptions};

use crate::{monitor, producer};

/// Pause applied between successive writes.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// Enqueue the next chunk immediately.
    #[default]
    None,
    /// After a write that left the buffer above the high-water mark, block
    /// until the sink signals drain.
    BlockUntilDrain,
    /// Sleep a fixed duration after every write, regardless of buffer state.
    FixedDelay(#[serde_as(as = "serde_with::DurationMilliSeconds<u64>")] Duration),
}

impl fmt::Display for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pacing::None => f.write_str("none"),
            Pacing::BlockUntilDrain => f.write_str("block-until-drain"),
            Pacing::FixedDelay(delay) => write!(f, "fixed-delay({}ms)", delay.as_millis()),
        }
    }
}

/// Parameters of one run. Immutable once the run starts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub chunk_size: NonZeroU64,
    pub total_size: NonZeroU64,
    #[serde(default)]
    pub pacing: Pacing,
    /// Whether the monitor prints its pending-byte samples.
    #[serde(default)]
    pub report_status: bool,
    /// Pending-byte threshold of the sink; see [`SinkOptions`].
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: u64,
}

pub(crate) fn default_high_water_mark() -> u64 {
    SinkOptions::default().high_water_mark
}

impl RunConfig {
    /// Number of chunks a valid configuration writes.
    pub fn num_chunks(&self) -> u64 {
        self.total_size.get() / self.chunk_size.get()
    }

    fn validate(&self) -> Result<(), RunError> {
        if self.total_size.get() % self.chunk_size.get() != 0 {
            return Err(RunError::IndivisibleTotalSize {
                total_size: self.total_size.get(),
                chunk_size: self.chunk_size.get(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("total size {total_size} is not divisible by chunk size {chunk_size}")]
    IndivisibleTotalSize { total_size: u64, chunk_size: u64 },
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("removing data file {path:?}: {source}")]
    RemoveDataFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RunError {
    /// Rejected runs are skipped; every other error kills the process.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RunError::IndivisibleTotalSize { .. })
    }
}

/// Outcome of one successful run.
#[derive(Debug)]
pub struct RunReport {
    pub config: RunConfig,
    /// Run start until the backing file was flushed and closed.
    pub total_time: Duration,
    /// End-of-input signal until the backing file was flushed and closed.
    pub lag_time: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk_size={} total_size={} pacing={} high_water_mark={} total_time={}ms lag_time={}ms",
            self.config.chunk_size,
            self.config.total_size,
            self.config.pacing,
            self.config.high_water_mark,
            self.total_time.as_millis(),
            self.lag_time.as_millis(),
        )
    }
}

/// Execute one run against `data_file`, which is created at run start and
/// deleted after the sink completes.
pub async fn execute(config: &RunConfig, data_file: &Path) -> Result<RunReport, RunError> {
    config.validate()?;

    let started_at = Instant::now();
    let sink = Sink::open(
        data_file,
        SinkOptions {
            high_water_mark: config.high_water_mark,
        },
    )
    .await?;
    let monitor_observer = sink.observer();
    let mut driver_observer = sink.observer();

    let (produced, samples, flushed) = tokio::join!(
        producer::produce(sink, config),
        monitor::monitor(monitor_observer, config.report_status),
        driver_observer.completed(),
    );

    flushed?;
    let closed_at = Instant::now();
    let writes_finished_at = produced?;
    debug!(samples, "monitor resolved");

    tokio::fs::remove_file(data_file)
        .await
        .map_err(|source| RunError::RemoveDataFile {
            path: data_file.to_owned(),
            source,
        })?;

    Ok(RunReport {
        config: config.clone(),
        total_time: closed_at.duration_since(started_at),
        lag_time: closed_at.duration_since(writes_finished_at),
    })
}
