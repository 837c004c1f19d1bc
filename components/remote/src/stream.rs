use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use log::{info, trace};

use crate::{
    call::StreamCall,
    error::StreamError,
    observer::{Generation, StreamObserver},
    operation::Operation,
    ops::{StreamFinish, StreamStart, StreamWrite},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Open,
    Closed,
}

/// State shared between the driver and its in-flight operations. Mutated on
/// both sides of the submission/completion seam, hence the mutex.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: StreamState,
    pub(crate) pending_writes: VecDeque<Bytes>,
    pub(crate) write_in_flight: bool,
    /// Whether a finish operation has gone out for this call. The transport
    /// call is finished exactly once, whether teardown came from `stop` or
    /// from a failed step.
    pub(crate) finish_submitted: bool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: StreamState::Idle,
            pending_writes: VecDeque::new(),
            write_in_flight: false,
            finish_submitted: false,
        }
    }
}

/// One incarnation of a bidirectional stream.
///
/// The driver owns the generation counter and sequences operation
/// submission: start precedes reads and writes, at most one write is
/// outstanding at a time, and teardown advances the generation before the
/// finish operation goes out so that every completion still in flight is
/// discarded rather than delivered to an observer that has moved on.
/// Submission may happen from any thread; completions all arrive on the
/// queue-drain thread.
pub struct RemoteStream {
    config: Arc<config::Configuration>,
    call: Arc<dyn StreamCall>,
    observer: Arc<dyn StreamObserver>,
    generation: Generation,
    shared: Arc<Mutex<Shared>>,
}

impl RemoteStream {
    /// The observer's `generation()` must be backed by the `generation`
    /// handle passed here; the guard comparison is meaningless otherwise.
    pub fn new(
        call: Arc<dyn StreamCall>,
        observer: Arc<dyn StreamObserver>,
        generation: Generation,
        config: &Arc<config::Configuration>,
    ) -> Self {
        Self {
            config: Arc::clone(config),
            call,
            observer,
            generation,
            shared: Arc::new(Mutex::new(Shared::new())),
        }
    }

    pub fn state(&self) -> StreamState {
        self.shared.lock().unwrap().state
    }

    /// Submit the start operation. Once it completes successfully the
    /// observer is notified and the first read is armed.
    pub fn start(&self) -> Result<(), StreamError> {
        // The generation is captured under the same lock that guards the
        // state check: a concurrent failure closes the stream before bumping
        // the counter, so an operation admitted here never carries a
        // generation the failure already superseded.
        let generation = {
            let mut shared = self.shared.lock().unwrap();
            if shared.state != StreamState::Idle {
                return Err(StreamError::AlreadyStarted);
            }
            shared.state = StreamState::Starting;
            self.generation.current()
        };

        info!("Starting stream [generation={}]", generation);
        Box::new(StreamStart::new(
            Arc::clone(&self.call),
            Arc::clone(&self.observer),
            Arc::clone(&self.shared),
            self.generation.clone(),
            generation,
        ))
        .execute();
        Ok(())
    }

    /// Send one message. If a write is already in flight the payload is
    /// buffered until the write slot frees up; the buffer is bounded by
    /// `write-buffer-capacity`.
    pub fn write(&self, payload: Bytes) -> Result<(), StreamError> {
        // Capture the generation inside the lock for the same reason as in
        // `start`.
        let generation = {
            let mut shared = self.shared.lock().unwrap();
            if shared.state != StreamState::Open {
                return Err(StreamError::NotOpen(shared.state));
            }

            if shared.write_in_flight {
                let capacity = self.config.remote.write_buffer_capacity;
                if shared.pending_writes.len() >= capacity {
                    return Err(StreamError::WriteBufferFull(capacity));
                }
                trace!("Write slot is taken; buffer {} bytes", payload.len());
                shared.pending_writes.push_back(payload);
                return Ok(());
            }
            shared.write_in_flight = true;
            self.generation.current()
        };

        Box::new(StreamWrite::new(
            Arc::clone(&self.call),
            Arc::clone(&self.observer),
            Arc::clone(&self.shared),
            self.generation.clone(),
            generation,
            payload,
        ))
        .execute();
        Ok(())
    }

    /// Tear this incarnation down. Advances the generation first, so every
    /// outstanding completion becomes a zombie, then submits a finish
    /// operation to release transport resources. Idempotent.
    pub fn stop(&self) {
        let prior = {
            let mut shared = self.shared.lock().unwrap();
            // A failed step finishes the call itself; a second finish on an
            // already-finished call is never submitted.
            if shared.finish_submitted {
                return;
            }
            shared.finish_submitted = true;
            shared.state = StreamState::Closed;
            shared.write_in_flight = false;
            shared.pending_writes.clear();
            self.generation.current()
        };

        let next = self.generation.bump();
        info!("Stream torn down [generation {} -> {}]", prior, next);

        // Deliberately submitted under the superseded generation: the finish
        // completion is a zombie whose only purpose is releasing transport
        // resources.
        Box::new(StreamFinish::new(
            Arc::clone(&self.call),
            Arc::clone(&self.observer),
            Arc::clone(&self.shared),
            self.generation.clone(),
            prior,
        ))
        .execute();
    }
}

impl Clone for RemoteStream {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            call: Arc::clone(&self.call),
            observer: Arc::clone(&self.observer),
            generation: self.generation.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}
