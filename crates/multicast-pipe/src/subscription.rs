//! Read end of one subscriber's bounded channel.

use std::{
    fmt,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use multicast_core::SubscriptionId;
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};
use tokio_util::io::SyncIoBridge;
use tracing::debug;

/// A subscriber's view of the broadcast stream.
///
/// Reads yield every byte written to the pipe after this subscription was
/// created, in write order, then end-of-stream once the pipe is closed (or
/// once this subscription has been detached). Dropping it, or calling
/// [`Subscription::close`], cancels the subscription; the pipe notices on
/// its next write.
pub struct Subscription {
    id: SubscriptionId,
    reader: DuplexStream,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, reader: DuplexStream) -> Self {
        Self { id, reader }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Stop consuming. Buffered data is discarded.
    pub fn close(self) {
        debug!(subscription = %self.id, "subscriber closed its read end");
    }

    /// Adapt into a blocking [`std::io::Read`] for consumers on plain threads.
    ///
    /// Must be called from within a Tokio runtime; the returned reader must
    /// only be used off the runtime's worker threads (e.g. inside
    /// `spawn_blocking`).
    pub fn into_blocking(self) -> SyncIoBridge<Subscription> {
        SyncIoBridge::new(self)
    }
}

impl AsyncRead for Subscription {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
