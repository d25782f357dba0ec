//! Output sinks: each one is an independent subscriber draining into a writer.

use multicast_pipe::Subscription;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// A running copy task from one subscription into one destination.
pub struct Sink {
    pub name: String,
    task: JoinHandle<std::io::Result<u64>>,
}

impl Sink {
    /// Spawn a task copying `sub` into `dest` until end-of-stream.
    ///
    /// A destination write error ends the task and drops the subscription,
    /// which the pipe detaches on its next write.
    pub fn spawn<W>(name: impl Into<String>, mut sub: Subscription, mut dest: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let task = tokio::spawn(async move {
            let copied = tokio::io::copy(&mut sub, &mut dest).await?;
            dest.flush().await?;
            debug!(sink = %task_name, bytes = copied, "sink drained");
            Ok(copied)
        });
        Self { name, task }
    }

    /// Wait for the copy to finish. Returns the bytes copied, or `None` if
    /// the sink failed (already logged).
    pub async fn finish(self) -> Option<u64> {
        match self.task.await {
            Ok(Ok(copied)) => Some(copied),
            Ok(Err(e)) => {
                warn!(sink = %self.name, error = %e, "sink failed and was dropped");
                None
            }
            Err(e) => {
                warn!(sink = %self.name, error = %e, "sink task aborted");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multicast_pipe::BroadcastPipe;
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    /// Destination that rejects every write.
    struct BrokenDest;

    impl AsyncWrite for BrokenDest {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn broken_sink_leaves_healthy_sink_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");

        let pipe = BroadcastPipe::new();
        let file = tokio::fs::File::create(&path).await.unwrap();
        let good = Sink::spawn("file", pipe.subscribe().unwrap(), file);
        let bad = Sink::spawn("broken", pipe.subscribe().unwrap(), BrokenDest);

        pipe.write(b"compile ok\n").await.unwrap();
        tokio::task::yield_now().await;
        pipe.write(b"tests ok\n").await.unwrap();
        pipe.close().await.unwrap();

        assert_eq!(bad.finish().await, None);
        assert_eq!(good.finish().await, Some(20));
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "compile ok\ntests ok\n");
    }
}
