use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use model::Status;

#[cfg(test)]
use mockall::automock;

/// Monotonic counter identifying a logical stream incarnation.
///
/// The driving stream owns the counter and advances it exactly once per
/// teardown. Operations capture the value at submission time and compare it
/// against the live value when their completion is finally drained; the
/// comparison is the sole cancellation mechanism, so the counter is atomic
/// as the only datum shared across the submission/completion seam.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    counter: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Advance to the next incarnation, turning every operation submitted
    /// under prior values into a zombie. Returns the new value.
    pub fn bump(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Observer that gets notified of events on a stream.
///
/// All callbacks are dispatched from the single completion-drain thread,
/// serialized with respect to each other, and must not block: that thread
/// serves every stream sharing the queue.
///
/// `generation()` must report the value of the [`Generation`] handle
/// registered with the driving stream. Consumers keep the observer alive at
/// least as long as any operation that may still reference it; the `Arc`
/// held by each in-flight operation guarantees exactly that, and the
/// generation is consulted purely as an intent flag, never as a liveness
/// proof.
#[cfg_attr(test, automock)]
pub trait StreamObserver: Send + Sync {
    /// Stream has been successfully established.
    fn on_stream_start(&self);

    /// A message has been received from the server. Ownership of the payload
    /// transfers to the callback for the duration of the call.
    fn on_stream_read(&self, message: Bytes);

    /// The stream is ready to accept another write. The previous write may
    /// not have reached the wire yet.
    fn on_stream_write(&self);

    /// The stream has been broken, perhaps by the server. Terminal for this
    /// generation; no further callback follows.
    fn on_stream_error(&self, status: Status);

    /// Generation this observer is currently interested in. Completions of
    /// operations submitted under an older generation are discarded.
    fn generation(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::Generation;

    #[test]
    fn test_generation_monotonic() {
        let generation = Generation::new();
        assert_eq!(0, generation.current());
        assert_eq!(1, generation.bump());
        assert_eq!(2, generation.bump());
        assert_eq!(2, generation.current());

        let clone = generation.clone();
        clone.bump();
        assert_eq!(3, generation.current());
    }
}
