//! Outbound half of a connection.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Queue of encoded frames waiting to be written to the transport.
///
/// The queue is bounded, so a slow peer applies back-pressure to the push
/// loops feeding it. Push loops race every send against their own
/// cancellation, which keeps a stalled peer from blocking teardown.
#[derive(Debug, Clone)]
pub struct PeerSender {
    frames: mpsc::Sender<Bytes>,
}

impl PeerSender {
    /// Wraps an existing queue.
    #[must_use]
    pub const fn new(frames: mpsc::Sender<Bytes>) -> Self {
        Self { frames }
    }

    /// Creates a queue holding at most `capacity` frames.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (frames, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(frames), receiver)
    }

    /// Queues a frame; `false` once the transport has gone away.
    pub async fn send(&self, frame: Bytes) -> bool {
        self.frames.send(frame).await.is_ok()
    }

    /// Waits for room in the queue without sending yet; `None` once the
    /// transport has gone away.
    pub async fn reserve(&self) -> Option<mpsc::Permit<'_, Bytes>> {
        self.frames.reserve().await.ok()
    }

    /// Returns `true` once the writing side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }
}
