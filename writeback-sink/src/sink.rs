//! Buffered byte sink backed by one local file.
//!
//! [`Sink::open`] spawns a background flusher task that moves enqueued chunks
//! into the backing file. The handle tracks how many bytes sit in the queue
//! but have not reached the file yet ("pending"). A write that leaves the
//! pending gauge above the configured high-water mark reports backpressure to
//! the caller; once the flusher brings the gauge back to or below the mark,
//! the sink fires a drain signal ([`Sink::drained`]).

use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::signal;

/// Tunables for [`Sink::open`].
#[derive(Debug, Clone, Copy)]
pub struct SinkOptions {
    /// Pending-byte threshold above which [`Sink::write`] reports
    /// backpressure.
    pub high_water_mark: u64,
}

impl Default for SinkOptions {
    fn default() -> Self {
        SinkOptions {
            high_water_mark: 64 * 1024,
        }
    }
}

/// Terminal and write-path errors of a sink.
///
/// Clone-able because the completion signal fans the terminal result out to
/// every observer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("backing file I/O failed: {0}")]
    Io(Arc<std::io::Error>),
    #[error("sink is no longer accepting writes")]
    Closed,
    #[error("sink was torn down before end-of-input was signaled")]
    Interrupted,
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(Arc::new(e))
    }
}

enum Command {
    Chunk(Vec<u8>),
    End,
}

struct Shared {
    pending: AtomicU64,
    high_water_mark: u64,
    drain: Notify,
}

/// Ownership-exclusive producer handle to one open backing file.
///
/// [`Send`] but not [`Clone`]: there is exactly one writer. Read-only access
/// for concurrent tasks goes through [`Sink::observer`].
pub struct Sink {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    completion: signal::Waiter<Result<(), SinkError>>,
}

/// Read-only view of a [`Sink`]: the pending-byte gauge plus the completion
/// signal. Obtained via [`Sink::observer`]; stays usable after the `Sink`
/// handle is consumed by [`Sink::end`].
#[derive(Clone)]
pub struct SinkObserver {
    shared: Arc<Shared>,
    completion: signal::Waiter<Result<(), SinkError>>,
}

impl Sink {
    /// Create (truncating) the backing file at `path` and spawn the flusher
    /// task.
    pub async fn open(path: impl AsRef<Path>, options: SinkOptions) -> Result<Sink, SinkError> {
        let file = tokio::fs::File::create(path.as_ref()).await?;
        let shared = Arc::new(Shared {
            pending: AtomicU64::new(0),
            high_water_mark: options.high_water_mark,
            drain: Notify::new(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let (notifier, completion) = signal::channel();
        tokio::spawn(flush_loop(file, Arc::clone(&shared), rx, notifier));
        Ok(Sink {
            tx,
            shared,
            completion,
        })
    }

    /// Enqueue one chunk, taking ownership of it.
    ///
    /// Returns whether the pending gauge stayed at or below the high-water
    /// mark, i.e. `false` signals backpressure.
    pub fn write(&mut self, chunk: Vec<u8>) -> Result<bool, SinkError> {
        let len = chunk.len() as u64;
        // Gauge goes up before the send so the flusher's decrement can never
        // underflow.
        let pending = self.shared.pending.fetch_add(len, Ordering::AcqRel) + len;
        if self.tx.send(Command::Chunk(chunk)).is_err() {
            self.shared.pending.fetch_sub(len, Ordering::AcqRel);
            return Err(SinkError::Closed);
        }
        Ok(pending <= self.shared.high_water_mark)
    }

    /// Buffered-but-unflushed byte count.
    pub fn pending_bytes(&self) -> u64 {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Resolves once the pending gauge is at or below the high-water mark.
    pub async fn drained(&self) {
        let notified = self.shared.drain.notified();
        tokio::pin!(notified);
        loop {
            // Register for the next drain notification before re-checking the
            // gauge, so a notification landing in between is not lost.
            notified.as_mut().enable();
            if self.pending_bytes() <= self.shared.high_water_mark {
                return;
            }
            notified.as_mut().await;
            notified.set(self.shared.drain.notified());
        }
    }

    /// Signal end-of-input.
    ///
    /// The flusher writes out everything still queued, flushes and closes the
    /// backing file, then fires the completion signal. Consuming `self` makes
    /// write-after-end unrepresentable.
    pub fn end(self) -> Result<(), SinkError> {
        self.tx.send(Command::End).map_err(|_| SinkError::Closed)
    }

    /// Read-only view for concurrent tasks.
    pub fn observer(&self) -> SinkObserver {
        SinkObserver {
            shared: Arc::clone(&self.shared),
            completion: self.completion.clone(),
        }
    }
}

impl SinkObserver {
    /// Buffered-but-unflushed byte count.
    pub fn pending_bytes(&self) -> u64 {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Resolves after the backing file is fully flushed and closed, or after
    /// the sink failed terminally. Fires exactly once; waiting again yields
    /// the same result.
    pub async fn completed(&mut self) -> Result<(), SinkError> {
        match self.completion.wait().await {
            Some(result) => result,
            // Flusher died without reporting, e.g. its runtime was torn down.
            None => Err(SinkError::Interrupted),
        }
    }
}

async fn flush_loop(
    mut file: tokio::fs::File,
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    notifier: signal::Notifier<Result<(), SinkError>>,
) {
    let flushed = flush_all(&mut file, &shared, &mut rx).await;
    // Stop accepting writes before announcing the terminal state.
    rx.close();
    let outcome = match flushed {
        Ok(true) => close(file).await.map_err(SinkError::from),
        Ok(false) => {
            // Writer dropped without signaling end-of-input.
            let _ = close(file).await;
            Err(SinkError::Interrupted)
        }
        Err(e) => Err(SinkError::from(e)),
    };
    match &outcome {
        Ok(()) => debug!("backing file flushed and closed"),
        Err(err) => debug!(%err, "flusher terminating"),
    }
    notifier.fire(outcome);
}

async fn flush_all(
    file: &mut tokio::fs::File,
    shared: &Shared,
    rx: &mut mpsc::UnboundedReceiver<Command>,
) -> std::io::Result<bool> {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Chunk(chunk) => {
                file.write_all(&chunk).await?;
                let len = chunk.len() as u64;
                let before = shared.pending.fetch_sub(len, Ordering::AcqRel);
                if before > shared.high_water_mark && before - len <= shared.high_water_mark {
                    shared.drain.notify_waiters();
                }
            }
            // The channel is FIFO: by the time `End` arrives, every prior
            // chunk has been written out.
            Command::End => return Ok(true),
        }
    }
    Ok(false)
}

async fn close(mut file: tokio::fs::File) -> std::io::Result<()> {
    file.flush().await?;
    // Dropping a tokio file defers the close; convert to a std file so the
    // completion signal only fires once the fd is actually closed.
    drop(file.into_std().await);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Sink, SinkError, SinkOptions};

    fn scratch(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        (dir, path)
    }

    #[tokio::test]
    async fn chunks_reach_the_file_in_full() {
        let (_dir, path) = scratch("sink.data");
        let mut sink = Sink::open(&path, SinkOptions::default()).await.unwrap();
        let mut completion = sink.observer();
        for _ in 0..4 {
            sink.write(vec![0u8; 4096]).unwrap();
        }
        sink.end().unwrap();
        completion.completed().await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * 4096);
    }

    #[tokio::test]
    async fn pending_gauge_returns_to_zero() {
        let (_dir, path) = scratch("sink.data");
        let mut sink = Sink::open(&path, SinkOptions::default()).await.unwrap();
        let mut completion = sink.observer();
        let observer = sink.observer();
        sink.write(vec![0u8; 1024]).unwrap();
        sink.end().unwrap();
        completion.completed().await.unwrap();
        assert_eq!(observer.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn oversized_chunk_reports_backpressure_then_drains() {
        let (_dir, path) = scratch("sink.data");
        let mut sink = Sink::open(&path, SinkOptions { high_water_mark: 8 })
            .await
            .unwrap();
        let below_mark = sink.write(vec![0u8; 1024]).unwrap();
        assert!(!below_mark);
        sink.drained().await;
        assert!(sink.pending_bytes() <= 8);
        sink.end().unwrap();
    }

    #[tokio::test]
    async fn completion_waits_for_end_of_input() {
        let (_dir, path) = scratch("sink.data");
        let mut sink = Sink::open(&path, SinkOptions::default()).await.unwrap();
        let mut completion = sink.observer();
        sink.write(vec![0u8; 16]).unwrap();
        let early = tokio::time::timeout(Duration::from_millis(100), completion.completed()).await;
        assert!(early.is_err(), "completion must not fire before end-of-input");
        sink.end().unwrap();
        completion.completed().await.unwrap();
    }

    #[tokio::test]
    async fn completion_fans_out_to_every_observer() {
        let (_dir, path) = scratch("sink.data");
        let sink = Sink::open(&path, SinkOptions::default()).await.unwrap();
        let mut first = sink.observer();
        let mut second = sink.observer();
        sink.end().unwrap();
        first.completed().await.unwrap();
        second.completed().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_unended_sink_interrupts_observers() {
        let (_dir, path) = scratch("sink.data");
        let sink = Sink::open(&path, SinkOptions::default()).await.unwrap();
        let mut completion = sink.observer();
        drop(sink);
        assert!(matches!(
            completion.completed().await,
            Err(SinkError::Interrupted)
        ));
    }
}
