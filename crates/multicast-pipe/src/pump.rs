//! Feed a byte source (typically a child process's output) into a pipe.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::{
    error::{PipeError, Result},
    pipe::BroadcastPipe,
};

/// Copy `source` into `pipe` until EOF, then close the pipe.
///
/// Reads up to [`BroadcastPipe::chunk_size`] bytes at a time and flushes
/// after every chunk so subscribers see output as soon as it is produced.
/// Returns the number of bytes copied.
///
/// The pipe is closed even when reading the source fails, so subscribers
/// always reach end-of-stream.
pub async fn pump<R>(mut source: R, pipe: &BroadcastPipe) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; pipe.chunk_size()];
    let mut total: u64 = 0;

    let outcome = loop {
        match source.read(&mut buf).await {
            Ok(0) => break Ok(total),
            Ok(n) => {
                if let Err(e) = forward(pipe, &buf[..n]).await {
                    break Err(e);
                }
                total += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("pump source read error: {e}");
                break Err(PipeError::Source(e));
            }
        }
    };

    pipe.close().await?;
    debug!(bytes = total, "pump finished");
    outcome
}

async fn forward(pipe: &BroadcastPipe, chunk: &[u8]) -> Result<()> {
    pipe.write(chunk).await?;
    pipe.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::ReadBuf;

    /// Yields `data` once, then fails.
    struct FailingSource {
        data: Option<&'static [u8]>,
    }

    impl AsyncRead for FailingSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(data);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::other("source exploded"))),
            }
        }
    }

    #[tokio::test]
    async fn copies_source_and_closes() {
        let pipe = BroadcastPipe::new();
        let mut sub = pipe.subscribe().unwrap();

        let copied = pump(&b"hello from a process"[..], &pipe).await.unwrap();
        assert_eq!(copied, 20);
        assert!(pipe.is_closed());

        let mut out = String::new();
        sub.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello from a process");
    }

    #[tokio::test]
    async fn source_error_still_closes_pipe() {
        let pipe = BroadcastPipe::new();
        let mut sub = pipe.subscribe().unwrap();

        let err = pump(FailingSource { data: Some(b"partial") }, &pipe)
            .await
            .unwrap_err();
        assert!(matches!(err, PipeError::Source(_)));
        assert!(pipe.is_closed());

        let mut out = Vec::new();
        sub.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"partial");
    }

    #[tokio::test]
    async fn pumping_into_closed_pipe_fails() {
        let pipe = BroadcastPipe::new();
        pipe.close().await.unwrap();

        let err = pump(&b"late"[..], &pipe).await.unwrap_err();
        assert!(matches!(err, PipeError::Closed));
    }
}
