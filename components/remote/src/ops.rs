//! Concrete operations submitted to the completion queue.
//!
//! Every completion entry point first compares the generation captured at
//! submission against the observer's live generation. On mismatch the
//! operation is a zombie: it returns without touching the observer or the
//! transport and without chaining further work. Queue-reported failure
//! (`ok == false`) of a start/read/write step is a stream-level failure and
//! routes to `on_stream_error`; a finish completion runs its finalization
//! path regardless of `ok`.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{error, info, trace, warn};
use model::Status;

use crate::{
    call::{MessageSlot, StatusSlot, StreamCall},
    observer::{Generation, StreamObserver},
    operation::Operation,
    stream::{Shared, StreamState},
};

fn stale(observer: &dyn StreamObserver, submitted: u64, kind: &str) -> bool {
    let current = observer.generation();
    if submitted != current {
        trace!(
            "Discard a stale {} completion [submitted-generation={}, current-generation={}]",
            kind,
            submitted,
            current
        );
        return true;
    }
    false
}

/// Close the current incarnation after a failed step: mark the stream
/// closed, advance the generation so every other outstanding completion
/// becomes a zombie, report the failure, then release the transport call
/// with a finish submitted under the superseded generation. Error is
/// terminal for a generation.
fn abort(
    call: &Arc<dyn StreamCall>,
    observer: &Arc<dyn StreamObserver>,
    guard: &Generation,
    shared: &Arc<Mutex<Shared>>,
    generation: u64,
    status: Status,
) {
    let submit_finish = {
        let mut shared = shared.lock().unwrap();
        shared.state = StreamState::Closed;
        shared.write_in_flight = false;
        shared.pending_writes.clear();
        let first = !shared.finish_submitted;
        shared.finish_submitted = true;
        first
    };
    guard.bump();
    observer.on_stream_error(status);

    if submit_finish {
        Box::new(StreamFinish::new(
            Arc::clone(call),
            Arc::clone(observer),
            Arc::clone(shared),
            guard.clone(),
            generation,
        ))
        .execute();
    }
}

pub(crate) struct StreamStart {
    call: Arc<dyn StreamCall>,
    observer: Arc<dyn StreamObserver>,
    shared: Arc<Mutex<Shared>>,
    guard: Generation,
    generation: u64,
}

impl StreamStart {
    pub(crate) fn new(
        call: Arc<dyn StreamCall>,
        observer: Arc<dyn StreamObserver>,
        shared: Arc<Mutex<Shared>>,
        guard: Generation,
        generation: u64,
    ) -> Self {
        Self {
            call,
            observer,
            shared,
            guard,
            generation,
        }
    }
}

impl Operation for StreamStart {
    fn execute(self: Box<Self>) {
        trace!("Submit a start operation [generation={}]", self.generation);
        let call = Arc::clone(&self.call);
        call.start(self);
    }

    fn complete(self: Box<Self>, ok: bool) {
        if stale(self.observer.as_ref(), self.generation, "start") {
            return;
        }

        if !ok {
            error!("Failed to establish the stream");
            abort(
                &self.call,
                &self.observer,
                &self.guard,
                &self.shared,
                self.generation,
                Status::unavailable("Failed to establish the stream"),
            );
            return;
        }

        {
            let mut shared = self.shared.lock().unwrap();
            if shared.state == StreamState::Starting {
                shared.state = StreamState::Open;
            }
        }
        self.observer.on_stream_start();

        // Arm the first read.
        Box::new(StreamRead::new(
            Arc::clone(&self.call),
            Arc::clone(&self.observer),
            Arc::clone(&self.shared),
            self.guard.clone(),
            self.generation,
        ))
        .execute();
    }
}

pub(crate) struct StreamRead {
    call: Arc<dyn StreamCall>,
    observer: Arc<dyn StreamObserver>,
    shared: Arc<Mutex<Shared>>,
    guard: Generation,
    generation: u64,
    message: MessageSlot,
}

impl StreamRead {
    pub(crate) fn new(
        call: Arc<dyn StreamCall>,
        observer: Arc<dyn StreamObserver>,
        shared: Arc<Mutex<Shared>>,
        guard: Generation,
        generation: u64,
    ) -> Self {
        Self {
            call,
            observer,
            shared,
            guard,
            generation,
            message: MessageSlot::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn message_slot(&self) -> MessageSlot {
        Arc::clone(&self.message)
    }
}

impl Operation for StreamRead {
    fn execute(self: Box<Self>) {
        trace!("Submit a read operation [generation={}]", self.generation);
        let call = Arc::clone(&self.call);
        let message = Arc::clone(&self.message);
        call.read(message, self);
    }

    fn complete(self: Box<Self>, ok: bool) {
        if stale(self.observer.as_ref(), self.generation, "read") {
            return;
        }

        if !ok {
            warn!("Stream was broken while awaiting an inbound message");
            abort(
                &self.call,
                &self.observer,
                &self.guard,
                &self.shared,
                self.generation,
                Status::unavailable("The stream was broken while reading"),
            );
            return;
        }

        let message = self.message.lock().unwrap().take();
        match message {
            Some(payload) => {
                trace!("Received a message of {} bytes", payload.len());
                self.observer.on_stream_read(payload);

                // Re-arm: each successful read chains exactly one more.
                Box::new(StreamRead::new(
                    Arc::clone(&self.call),
                    Arc::clone(&self.observer),
                    Arc::clone(&self.shared),
                    self.guard.clone(),
                    self.generation,
                ))
                .execute();
            }
            None => {
                error!("Transport signalled a successful read without a payload");
                abort(
                    &self.call,
                    &self.observer,
                    &self.guard,
                    &self.shared,
                    self.generation,
                    Status::internal("Read completion carried no payload"),
                );
            }
        }
    }
}

pub(crate) struct StreamWrite {
    call: Arc<dyn StreamCall>,
    observer: Arc<dyn StreamObserver>,
    shared: Arc<Mutex<Shared>>,
    guard: Generation,
    generation: u64,
    payload: Bytes,
}

impl StreamWrite {
    pub(crate) fn new(
        call: Arc<dyn StreamCall>,
        observer: Arc<dyn StreamObserver>,
        shared: Arc<Mutex<Shared>>,
        guard: Generation,
        generation: u64,
        payload: Bytes,
    ) -> Self {
        Self {
            call,
            observer,
            shared,
            guard,
            generation,
            payload,
        }
    }
}

impl Operation for StreamWrite {
    fn execute(self: Box<Self>) {
        trace!(
            "Submit a write operation of {} bytes [generation={}]",
            self.payload.len(),
            self.generation
        );
        let call = Arc::clone(&self.call);
        let payload = self.payload.clone();
        call.write(payload, self);
    }

    fn complete(self: Box<Self>, ok: bool) {
        if stale(self.observer.as_ref(), self.generation, "write") {
            return;
        }

        if !ok {
            warn!("Stream was broken while writing");
            abort(
                &self.call,
                &self.observer,
                &self.guard,
                &self.shared,
                self.generation,
                Status::unavailable("The stream was broken while writing"),
            );
            return;
        }

        self.observer.on_stream_write();

        // The write slot is free again; hand it to the next buffered write
        // if there is one.
        let next = {
            let mut shared = self.shared.lock().unwrap();
            let next = shared.pending_writes.pop_front();
            if next.is_none() {
                shared.write_in_flight = false;
            }
            next
        };

        if let Some(payload) = next {
            trace!("Dequeue a buffered write of {} bytes", payload.len());
            Box::new(StreamWrite::new(
                Arc::clone(&self.call),
                Arc::clone(&self.observer),
                Arc::clone(&self.shared),
                self.guard.clone(),
                self.generation,
                payload,
            ))
            .execute();
        }
    }
}

pub(crate) struct StreamFinish {
    call: Arc<dyn StreamCall>,
    observer: Arc<dyn StreamObserver>,
    shared: Arc<Mutex<Shared>>,
    guard: Generation,
    generation: u64,
    status: StatusSlot,
}

impl StreamFinish {
    pub(crate) fn new(
        call: Arc<dyn StreamCall>,
        observer: Arc<dyn StreamObserver>,
        shared: Arc<Mutex<Shared>>,
        guard: Generation,
        generation: u64,
    ) -> Self {
        Self {
            call,
            observer,
            shared,
            guard,
            generation,
            status: StatusSlot::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn status_slot(&self) -> StatusSlot {
        Arc::clone(&self.status)
    }
}

impl Operation for StreamFinish {
    fn execute(self: Box<Self>) {
        trace!("Submit a finish operation [generation={}]", self.generation);
        let call = Arc::clone(&self.call);
        let status = Arc::clone(&self.status);
        call.finish(status, self);
    }

    fn complete(self: Box<Self>, _ok: bool) {
        // A stale finish releases only its own resources; transport-level
        // teardown remains the driving stream's explicit job.
        if stale(self.observer.as_ref(), self.generation, "finish") {
            return;
        }

        // Finalization runs regardless of the queue's verdict.
        {
            let mut shared = self.shared.lock().unwrap();
            shared.state = StreamState::Closed;
            shared.write_in_flight = false;
            shared.pending_writes.clear();
        }
        self.guard.bump();

        let status = self
            .status
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Status::unknown("The transport recorded no final status"));
        if status.is_ok() {
            info!("Stream finished cleanly");
        } else {
            self.observer.on_stream_error(status);
        }
    }
}
