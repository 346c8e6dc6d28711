//! Read-only observer that samples the sink's pending-byte gauge.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;
use writeback_sink::SinkObserver;

/// Wall-clock sampling period of the monitor.
pub(crate) const MONITOR_PERIOD: Duration = Duration::from_millis(100);

/// Sample the pending-byte gauge every [`MONITOR_PERIOD`] until the sink
/// completes. Resolves immediately after completion is observed and never
/// emits a sample past that point. Returns the number of samples taken.
pub(crate) async fn monitor(observer: SinkObserver, report_status: bool) -> u64 {
    let mut completion = observer.clone();
    let completed = completion.completed();
    tokio::pin!(completed);

    // First sample lands one period in, not at t=0.
    let start = tokio::time::Instant::now() + MONITOR_PERIOD;
    let mut ticker = tokio::time::interval_at(start, MONITOR_PERIOD);
    // A ticker starved by a busy producer must not burst-emit the missed
    // samples afterwards.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut samples = 0;
    loop {
        tokio::select! {
            // Completion is checked first so a tick that raced it is discarded.
            biased;
            _ = &mut completed => break,
            _ = ticker.tick() => {
                let pending_bytes = observer.pending_bytes();
                if report_status {
                    info!(pending_bytes, "sample");
                }
                samples += 1;
            }
        }
    }
    samples
}
