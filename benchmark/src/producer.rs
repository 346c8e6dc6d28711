//! Writes the configured payload into the sink, chunk by chunk.

use std::time::Instant;

use writeback_sink::{Sink, SinkError};

use crate::run::{Pacing, RunConfig};

/// Write exactly `total_size / chunk_size` zero-filled chunks, pacing between
/// writes per the configured policy, then signal end-of-input.
///
/// Returns the instant right after the end-of-input signal, i.e. the moment
/// the producer's side of the run was finished.
pub(crate) async fn produce(mut sink: Sink, config: &RunConfig) -> Result<Instant, SinkError> {
    let chunk_size = usize::try_from(config.chunk_size.get()).expect("chunk size fits in usize");
    for _ in 0..config.num_chunks() {
        let below_mark = sink.write(vec![0u8; chunk_size])?;
        match config.pacing {
            Pacing::None => {}
            Pacing::BlockUntilDrain => {
                if !below_mark {
                    sink.drained().await;
                }
            }
            Pacing::FixedDelay(delay) => tokio::time::sleep(delay).await,
        }
    }
    sink.end()?;
    Ok(Instant::now())
}
