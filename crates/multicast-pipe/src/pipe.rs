//! `BroadcastPipe`: one writable sink replicated to many independent readers.
//!
//! Each subscriber gets its own bounded in-memory byte channel
//! (`tokio::io::duplex`). The pipe keeps the write ends in a concurrent map
//! and fans every write out to a snapshot of that map:
//!
//! ```text
//!   write(data)
//!       │                    (one delivery future per subscriber, driven concurrently)
//!       ├────────► [duplex S1] ─► Subscription S1
//!       ├────────► [duplex S2] ─► Subscription S2
//!       └────────► [duplex SN] ─► Subscription SN
//! ```
//!
//! A subscriber whose channel rejects a write (reader dropped, pipe broken)
//! is removed from the map and never written again. The producer does not
//! see that failure. A subscriber that merely reads slowly is not a failure:
//! its channel fills up and the delivery future waits, while deliveries to
//! the other subscribers complete independently. `write` returns once every
//! live subscriber has accepted the bytes, so the producer is paced by the
//! slowest live reader and no data is dropped.
//!
//! Writes are cancel-safe per record: if a `write` future is dropped, a
//! subscriber that took only part of the bytes is detached, so its reader
//! sees the prefix and then end-of-stream, never a prefix glued to the next
//! write.

use std::{
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use futures_util::future::join_all;
use multicast_core::{
    config::{PipeConfig, DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_SIZE},
    SubscriptionId,
};
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    sync::Mutex,
};
use tracing::{debug, info};

use crate::{
    error::{PipeError, Result},
    subscription::Subscription,
};

/// Write end of one subscription, held only by the pipe.
type Endpoint = Arc<Mutex<DuplexStream>>;

/// Counters describing a pipe's lifetime so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipeStats {
    /// Subscriptions currently receiving writes.
    pub active: usize,
    /// Subscriptions ever created.
    pub subscribed_total: u64,
    /// Subscriptions removed after a failed write, flush or close.
    pub detached_total: u64,
    /// Bytes accepted by `write` (counted once, not per subscriber).
    pub bytes_written: u64,
}

struct Inner {
    subscribers: DashMap<SubscriptionId, Endpoint>,
    /// Serialises `write`/`flush` across clones so every subscriber sees
    /// records in the same order.
    write_lock: Mutex<()>,
    closed: AtomicBool,
    buffer_size: usize,
    chunk_size: usize,
    subscribed_total: AtomicU64,
    detached_total: AtomicU64,
    bytes_written: AtomicU64,
}

/// Broadcast sink for a single producer and any number of subscribers.
///
/// Cheap to clone; clones share the same subscriber set. Writes from
/// different clones are serialised: each `write` reaches every subscriber
/// as one unit, in the same order for all of them. Dropping the last
/// clone drops every write end, so remaining subscribers observe
/// end-of-stream just as if [`BroadcastPipe::close`] had been called.
///
/// After `close`, `subscribe`, `write` and `flush` return
/// [`PipeError::Closed`]; `close` itself stays a no-op.
#[derive(Clone)]
pub struct BroadcastPipe {
    inner: Arc<Inner>,
}

impl Default for BroadcastPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastPipe {
    /// Open pipe with 8 KiB per-subscriber buffers.
    pub fn new() -> Self {
        Self::with_sizes(DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_SIZE)
    }

    /// Open pipe whose subscriber channels hold up to `buffer_size` bytes.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self::with_sizes(buffer_size, DEFAULT_CHUNK_SIZE)
    }

    pub fn from_config(config: &PipeConfig) -> Self {
        Self::with_sizes(config.buffer_size, config.chunk_size)
    }

    fn with_sizes(buffer_size: usize, chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                write_lock: Mutex::new(()),
                closed: AtomicBool::new(false),
                buffer_size: buffer_size.max(1),
                chunk_size: chunk_size.max(1),
                subscribed_total: AtomicU64::new(0),
                detached_total: AtomicU64::new(0),
                bytes_written: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber and return its read end.
    ///
    /// The subscriber sees only data written after this call returns. A
    /// write already in flight on another task may or may not reach it.
    pub fn subscribe(&self) -> Result<Subscription> {
        self.ensure_open()?;

        let (writer, reader) = tokio::io::duplex(self.inner.buffer_size);
        let id = SubscriptionId::new();
        self.inner
            .subscribers
            .insert(id.clone(), Arc::new(Mutex::new(writer)));

        // A concurrent `close` may have drained the map between the check
        // above and the insert; never leave an entry it will not shut down.
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.subscribers.remove(&id);
            return Err(PipeError::Closed);
        }

        self.inner.subscribed_total.fetch_add(1, Ordering::Relaxed);
        debug!(
            subscription = %id,
            active = self.inner.subscribers.len(),
            "subscriber added"
        );
        Ok(Subscription::new(id, reader))
    }

    /// Append `data` to every active subscription.
    ///
    /// Never fails because of a subscriber; broken subscribers are detached.
    ///
    /// Cancelling the returned future (timeout, `select!`, task abort) is
    /// safe but may leave `data` delivered to only some subscribers. Any
    /// subscriber that received part of it is detached.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(());
        }

        let _serial = self.inner.write_lock.lock().await;
        self.fan_out("write", |id, endpoint| self.deliver(id, endpoint, data)).await;

        self.inner
            .bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Flush every active subscription, detaching any that fail.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let _serial = self.inner.write_lock.lock().await;
        self.fan_out("flush", |_, endpoint| flush_endpoint(endpoint)).await;
        Ok(())
    }

    /// Signal end-of-stream to every remaining subscriber.
    ///
    /// Data already buffered stays readable. Calling `close` again is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let ids: Vec<SubscriptionId> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let endpoints: Vec<(SubscriptionId, Endpoint)> = ids
            .iter()
            .filter_map(|id| self.inner.subscribers.remove(id))
            .collect();

        let count = endpoints.len();
        let results = join_all(endpoints.into_iter().map(|(id, endpoint)| async move {
            let mut writer = endpoint.lock().await;
            let result = writer.shutdown().await;
            (id, result)
        }))
        .await;

        for (id, result) in results {
            if let Err(e) = result {
                // Dropping the write end still delivers end-of-stream.
                debug!(subscription = %id, error = %e, "shutdown failed on close");
            }
        }

        info!(subscribers = count, "broadcast pipe closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    pub fn stats(&self) -> PipeStats {
        PipeStats {
            active: self.inner.subscribers.len(),
            subscribed_total: self.inner.subscribed_total.load(Ordering::Relaxed),
            detached_total: self.inner.detached_total.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(PipeError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run `op` against a snapshot of the active set, concurrently, and
    /// detach every subscription it fails on.
    ///
    /// Entries added while this runs are not part of the snapshot.
    async fn fan_out<F, Fut>(&self, op: &'static str, f: F)
    where
        F: Fn(SubscriptionId, Endpoint) -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        let snapshot: Vec<(SubscriptionId, Endpoint)> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        if snapshot.is_empty() {
            return;
        }

        let results = join_all(snapshot.into_iter().map(|(id, endpoint)| {
            let delivery = f(id.clone(), endpoint);
            async move { (id, delivery.await) }
        }))
        .await;

        for (id, result) in results {
            if let Err(e) = result {
                self.detach(&id, op, &e);
            }
        }
    }

    fn detach(&self, id: &SubscriptionId, op: &str, err: &io::Error) {
        if self.inner.subscribers.remove(id).is_some() {
            self.inner.detached_total.fetch_add(1, Ordering::Relaxed);
            debug!(subscription = %id, op, error = %err, "subscriber detached");
        }
    }

    /// Write one record to one subscriber, tracking progress so a
    /// cancelled delivery can detach a half-written subscriber.
    async fn deliver(
        &self,
        id: SubscriptionId,
        endpoint: Endpoint,
        data: &[u8],
    ) -> io::Result<()> {
        let mut writer = endpoint.lock().await;
        let mut progress = TornWriteGuard {
            pipe: self,
            id: &id,
            written: 0,
            len: data.len(),
        };
        while progress.written < data.len() {
            let n = writer.write(&data[progress.written..]).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            progress.written += n;
        }
        Ok(())
    }
}

/// Detaches its subscription when dropped with a record half-delivered.
///
/// Declared after the endpoint guard in `deliver`, so it runs first and the
/// write end is dropped right after, ending the reader's stream.
struct TornWriteGuard<'a> {
    pipe: &'a BroadcastPipe,
    id: &'a SubscriptionId,
    written: usize,
    len: usize,
}

impl Drop for TornWriteGuard<'_> {
    fn drop(&mut self) {
        if self.written > 0 && self.written < self.len {
            let err = io::Error::new(
                io::ErrorKind::Interrupted,
                format!("record cut after {} of {} bytes", self.written, self.len),
            );
            self.pipe.detach(self.id, "write", &err);
        }
    }
}

async fn flush_endpoint(endpoint: Endpoint) -> io::Result<()> {
    let mut writer = endpoint.lock().await;
    writer.flush().await
}

impl std::fmt::Debug for BroadcastPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastPipe")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .field("buffer_size", &self.inner.buffer_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn write_without_subscribers_is_noop() {
        let pipe = BroadcastPipe::new();
        pipe.write(b"nobody listening").await.unwrap();
        pipe.flush().await.unwrap();
        assert_eq!(pipe.subscriber_count(), 0);
        assert_eq!(pipe.stats().bytes_written, 16);
    }

    #[tokio::test]
    async fn operations_after_close_report_closed() {
        let pipe = BroadcastPipe::new();
        pipe.close().await.unwrap();

        assert!(pipe.is_closed());
        assert!(matches!(pipe.subscribe(), Err(PipeError::Closed)));
        assert!(matches!(pipe.write(b"x").await, Err(PipeError::Closed)));
        assert!(matches!(pipe.flush().await, Err(PipeError::Closed)));
        pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_reader_is_detached_on_next_write() {
        let pipe = BroadcastPipe::new();
        let keep = pipe.subscribe().unwrap();
        let gone = pipe.subscribe().unwrap();
        assert_eq!(pipe.subscriber_count(), 2);

        gone.close();
        pipe.write(b"ping").await.unwrap();

        let stats = pipe.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.subscribed_total, 2);
        assert_eq!(stats.detached_total, 1);
        drop(keep);
    }

    #[tokio::test]
    async fn buffer_size_is_clamped() {
        let pipe = BroadcastPipe::with_buffer_size(0);
        assert_eq!(pipe.buffer_size(), 1);

        let mut sub = pipe.subscribe().unwrap();
        let writer = pipe.clone();
        let producer = tokio::spawn(async move {
            writer.write(b"abc").await.unwrap();
            writer.close().await.unwrap();
        });

        let mut out = Vec::new();
        sub.read_to_end(&mut out).await.unwrap();
        producer.await.unwrap();
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn from_config_uses_configured_sizes() {
        let config = PipeConfig {
            buffer_size: 64,
            chunk_size: 16,
        };
        let pipe = BroadcastPipe::from_config(&config);
        assert_eq!(pipe.buffer_size(), 64);
        assert_eq!(pipe.chunk_size(), 16);
    }

    #[tokio::test]
    async fn dropping_pipe_ends_subscriptions() {
        let pipe = BroadcastPipe::new();
        let mut sub = pipe.subscribe().unwrap();
        pipe.write(b"last words").await.unwrap();
        drop(pipe);

        let mut out = String::new();
        sub.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "last words");
    }
}
