//! Drives a sequence of buffered-write benchmark runs against a local file
//! and reports total and lag times per run.

use std::num::NonZeroU64;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

mod monitor;
mod producer;
mod run;

use run::{Pacing, RunConfig};

#[derive(clap::Parser)]
struct Args {
    /// JSON file holding an array of run configurations; the built-in matrix
    /// is used when omitted.
    #[clap(long)]
    runs: Option<PathBuf>,
    /// Scratch file every run writes to and deletes afterwards.
    #[clap(long, default_value = "writeback.data")]
    data_file: PathBuf,
}

/// The two runs the benchmark was built around: the same payload with and
/// without drain pacing, so the reported lag times are directly comparable.
fn default_runs() -> Vec<RunConfig> {
    let chunk_size = NonZeroU64::new(4 * 1024).unwrap();
    let total_size = NonZeroU64::new(1024 * 1024 * 1024).unwrap();
    [Pacing::None, Pacing::BlockUntilDrain]
        .into_iter()
        .map(|pacing| RunConfig {
            chunk_size,
            total_size,
            pacing,
            report_status: true,
            high_water_mark: run::default_high_water_mark(),
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let runs: Vec<RunConfig> = match &args.runs {
        Some(path) => {
            let raw = std::fs::read(path).expect("read runs file");
            serde_json::from_slice(&raw).expect("parse runs file")
        }
        None => default_runs(),
    };

    // Producer and monitor are cooperative tasks multiplexed on one executor
    // thread, not parallel threads.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        for config in &runs {
            info!(
                chunk_size = config.chunk_size.get(),
                total_size = config.total_size.get(),
                pacing = %config.pacing,
                "starting run"
            );
            match run::execute(config, &args.data_file).await {
                Ok(report) => info!("{report}"),
                Err(err) if err.is_rejection() => error!("{err}; skipping run"),
                Err(err) => {
                    error!("run failed: {err}");
                    std::process::exit(1);
                }
            }
        }
    });
}
