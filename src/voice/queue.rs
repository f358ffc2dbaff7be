//! FIFO queue between a streamed synthesis response and the audio sink
//!
//! The network reader pushes chunks as they arrive; a single appender takes
//! them one at a time. A chunk is never handed out while the previous append
//! is still in flight, and the finalize signal is only produced once the end
//! of the stream has been seen, the queue is empty and nothing is being
//! appended.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::Notify;

/// What the appender should do next
#[derive(Debug, PartialEq, Eq)]
pub enum Next {
    /// Append this chunk, then call [`ChunkQueue::append_done`]
    Chunk(Bytes),
    /// Everything has been appended; finish the sink
    Finalize,
    /// The stream failed
    Failed(String),
}

#[derive(Debug, Default)]
struct State {
    chunks: VecDeque<Bytes>,
    appending: bool,
    ended: bool,
    finalized: bool,
    failure: Option<String>,
}

/// Shared chunk queue; clones refer to the same queue
#[derive(Debug, Clone, Default)]
pub struct ChunkQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl ChunkQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Enqueue a chunk received from the network
    pub fn push(&self, chunk: Bytes) {
        {
            let mut state = self.lock();
            if state.ended || state.finalized {
                return;
            }
            state.chunks.push_back(chunk);
        }
        self.notify.notify_one();
    }

    /// Record that the network stream has ended
    pub fn end(&self) {
        self.lock().ended = true;
        self.notify.notify_one();
    }

    /// Record that the network stream failed
    pub fn fail(&self, reason: impl Into<String>) {
        {
            let mut state = self.lock();
            state.failure = Some(reason.into());
            state.ended = true;
        }
        self.notify.notify_one();
    }

    /// Mark the in-flight append as finished
    pub fn append_done(&self) {
        self.lock().appending = false;
        self.notify.notify_one();
    }

    /// Drop every pending chunk
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.lock();
            let n = state.chunks.len();
            state.chunks.clear();
            state.appending = false;
            n
        };
        if dropped > 0 {
            tracing::debug!(dropped, "discarded pending audio chunks");
        }
    }

    /// Number of chunks waiting to be appended
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    /// Whether no chunks are waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an append is in flight
    #[must_use]
    pub fn is_appending(&self) -> bool {
        self.lock().appending
    }

    fn poll_next(&self) -> Option<Next> {
        let mut state = self.lock();

        if let Some(reason) = state.failure.take() {
            return Some(Next::Failed(reason));
        }
        if state.appending || state.finalized {
            return None;
        }
        if let Some(chunk) = state.chunks.pop_front() {
            state.appending = true;
            return Some(Next::Chunk(chunk));
        }
        if state.ended {
            state.finalized = true;
            return Some(Next::Finalize);
        }
        None
    }

    /// Wait for the next action
    ///
    /// Re-checks the queue on every push, end, failure or finished append,
    /// so finalize is only returned once the queue has fully drained.
    pub async fn next(&self) -> Next {
        loop {
            if let Some(next) = self.poll_next() {
                return next;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = ChunkQueue::new();
        queue.push(Bytes::from_static(b"a"));
        queue.push(Bytes::from_static(b"b"));
        queue.end();

        assert_eq!(queue.next().await, Next::Chunk(Bytes::from_static(b"a")));
        queue.append_done();
        assert_eq!(queue.next().await, Next::Chunk(Bytes::from_static(b"b")));
        queue.append_done();
        assert_eq!(queue.next().await, Next::Finalize);
    }

    #[tokio::test]
    async fn test_no_second_chunk_while_appending() {
        let queue = ChunkQueue::new();
        queue.push(Bytes::from_static(b"a"));
        queue.push(Bytes::from_static(b"b"));

        assert!(matches!(queue.next().await, Next::Chunk(_)));
        assert!(queue.is_appending());

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.next()).await;
        assert!(blocked.is_err(), "second chunk handed out during append");
        assert_eq!(queue.len(), 1);

        queue.append_done();
        assert_eq!(queue.next().await, Next::Chunk(Bytes::from_static(b"b")));
    }

    #[tokio::test]
    async fn test_finalize_waits_for_in_flight_append() {
        let queue = ChunkQueue::new();
        queue.push(Bytes::from_static(b"a"));
        assert!(matches!(queue.next().await, Next::Chunk(_)));
        queue.end();

        let early = tokio::time::timeout(Duration::from_millis(50), queue.next()).await;
        assert!(early.is_err(), "finalized while append in flight");

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.append_done();
        assert_eq!(waiter.await.unwrap(), Next::Finalize);
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let queue = ChunkQueue::new();
        queue.fail("connection reset");
        assert_eq!(queue.next().await, Next::Failed("connection reset".to_string()));
    }

    #[test]
    fn test_clear_and_push_after_end() {
        let queue = ChunkQueue::new();
        queue.push(Bytes::from_static(b"a"));
        queue.push(Bytes::from_static(b"b"));
        queue.clear();
        assert!(queue.is_empty());

        queue.end();
        queue.push(Bytes::from_static(b"late"));
        assert!(queue.is_empty());
    }
}
