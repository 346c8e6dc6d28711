//! Buffered byte sink backed by a local file, with explicit backpressure
//! signals.
//!
//! # Usage
//!
//! 1. [`Sink::open`] a sink; this spawns a background flusher task that moves
//!    enqueued chunks into the backing file.
//! 2. [`Sink::write`] owned chunks. The return value reports whether the
//!    buffer stayed at or below the high-water mark; on `false`, await
//!    [`Sink::drained`] to block until the flusher has caught up.
//! 3. Hand [`Sink::observer`] handles to tasks that need the pending-byte
//!    gauge or the completion signal without write access.
//! 4. [`Sink::end`] to signal end-of-input; the flusher writes out the
//!    remaining chunks, flushes and closes the backing file, and fires the
//!    completion signal exactly once.
//!
//! ```rust
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let path = std::env::temp_dir().join("writeback-sink-doc.data");
//!     let mut sink = writeback_sink::Sink::open(&path, writeback_sink::SinkOptions::default())
//!         .await
//!         .unwrap();
//!     let mut completion = sink.observer();
//!     let below_mark = sink.write(vec![0u8; 4096]).unwrap();
//!     assert!(below_mark);
//!     sink.end().unwrap();
//!     completion.completed().await.unwrap();
//!     tokio::fs::remove_file(&path).await.unwrap();
//! }
//! ```

mod signal;
mod sink;

pub use sink::{Sink, SinkError, SinkObserver, SinkOptions};
