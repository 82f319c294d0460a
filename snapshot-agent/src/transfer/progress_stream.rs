//! Byte-counting stream wrapper for archive transfers.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::{Duration, Instant};

/// Called with the running byte total.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Counts the bytes flowing through `inner`, reporting at most every
/// `update_interval` and once more at the end of the stream.
pub struct ProgressStream<S> {
    inner: S,
    transferred: Arc<AtomicU64>,
    last_update: Instant,
    update_interval: Duration,
    callback: ProgressCallback,
}

impl<S> ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>>,
{
    pub fn new(inner: S, callback: ProgressCallback) -> Self {
        Self {
            inner,
            transferred: Arc::new(AtomicU64::new(0)),
            last_update: Instant::now(),
            update_interval: Duration::from_secs(1),
            callback,
        }
    }

    /// Shared counter that stays readable after the stream is consumed.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.transferred)
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                let total = self.transferred.fetch_add(bytes.len() as u64, Ordering::Relaxed) + bytes.len() as u64;
                let now = Instant::now();
                if now.duration_since(self.last_update) >= self.update_interval {
                    (self.callback)(total);
                    self.last_update = now;
                }
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(None) => {
                (self.callback)(self.transferred.load(Ordering::Relaxed));
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_counts_every_chunk() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"defgh"))];
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);

        let mut progress = ProgressStream::new(
            stream::iter(chunks),
            Arc::new(move |total: u64| sink.lock().unwrap().push(total)),
        );
        let counter = progress.counter();
        while let Some(chunk) = progress.next().await {
            chunk.unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 8);
        assert_eq!(reports.lock().unwrap().last(), Some(&8));
    }
}
