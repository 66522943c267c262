//! Byte counting for streamed transfers.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Shared count of bytes moved through a [`Counted`] stream.
#[derive(Debug, Clone, Default)]
pub struct TransferCounter(Arc<AtomicU64>);

impl TransferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// Reader or writer that reports transferred bytes to a [`TransferCounter`].
pub struct Counted<T> {
    inner: T,
    counter: TransferCounter,
}

impl<T> Counted<T> {
    pub fn new(inner: T, counter: TransferCounter) -> Self {
        Self { inner, counter }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Counted<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.counter.add((buf.filled().len() - before) as u64);
        }

        poll
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Counted<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.counter.add(*n as u64);
        }

        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_counts_reads_and_writes() {
        let counter = TransferCounter::new();
        let mut reader = Counted::new(&b"hello world"[..], counter.clone());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(counter.get(), 11);

        let write_counter = TransferCounter::new();
        let mut writer = Counted::new(Vec::new(), write_counter.clone());
        writer.write_all(b"abc").await.unwrap();
        assert_eq!(write_counter.get(), 3);
        assert_eq!(writer.into_inner(), b"abc");
    }
}
