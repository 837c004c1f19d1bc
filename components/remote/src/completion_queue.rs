use std::{io, thread};

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{info, trace, warn};

use crate::operation::Tag;

struct CompletionEvent {
    tag: Tag,
    ok: bool,
}

/// Transport-side handle used to report completed asynchronous steps.
///
/// Cheap to clone; the drain loop ends once every producer has been dropped.
#[derive(Clone)]
pub struct CompletionProducer {
    tx: Sender<CompletionEvent>,
}

impl CompletionProducer {
    /// Yield `(tag, ok)` to the drain thread. Blocks briefly if the queue is
    /// at capacity.
    pub fn complete(&self, tag: Tag, ok: bool) {
        if self.tx.send(CompletionEvent { tag, ok }).is_err() {
            warn!("Completion queue has shut down; a completion is dropped");
        }
    }
}

/// Consumer half of the completion queue: yields completed tags to exactly
/// one drain loop.
pub struct CompletionQueue {
    rx: Receiver<CompletionEvent>,
}

impl CompletionQueue {
    pub fn new(depth: usize) -> (CompletionProducer, CompletionQueue) {
        let (tx, rx) = bounded(depth);
        (CompletionProducer { tx }, CompletionQueue { rx })
    }

    /// Drain the queue until all producers are dropped, invoking each tag's
    /// completion entry point in delivery order. This is the system's only
    /// blocking wait; every operation completion and therefore every
    /// observer callback happens inside this loop.
    pub fn run(self) {
        trace!("Completion queue drain loop started");
        while let Ok(event) = self.rx.recv() {
            event.tag.complete(event.ok);
        }
        info!("All completion producers have been dropped. Stop drain loop");
    }

    /// Drain completions that are already ready without blocking. Returns
    /// the number of completions dispatched. Callers embedding the queue in
    /// their own loop, and tests stepping the queue deterministically, use
    /// this instead of [`run`](Self::run).
    pub fn drain_ready(&self) -> usize {
        let mut drained = 0;
        while let Ok(event) = self.rx.try_recv() {
            event.tag.complete(event.ok);
            drained += 1;
        }
        drained
    }

    /// Run the drain loop on a dedicated thread.
    pub fn spawn(self) -> io::Result<CompletionWorker> {
        let handle = thread::Builder::new()
            .name("completion-drain".to_owned())
            .spawn(move || self.run())?;
        Ok(CompletionWorker { handle })
    }
}

pub struct CompletionWorker {
    handle: thread::JoinHandle<()>,
}

impl CompletionWorker {
    /// Wait for the drain loop to exit.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}
