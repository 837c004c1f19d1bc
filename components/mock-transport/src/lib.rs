//! In-memory transport for tests.
//!
//! `MockCall` implements the asynchronous call surface against plain memory:
//! every submitted step completes through the real completion queue, reads
//! park until a message is pushed, and tests script failures per step.

use std::{
    collections::VecDeque,
    sync::Mutex,
};

use bytes::Bytes;
use log::warn;
use model::Status;
use remote::{CompletionProducer, MessageSlot, StatusSlot, StreamCall, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Start,
    Read,
    Write,
    Finish,
}

struct Inner {
    fail_start: bool,
    fail_write: bool,
    inbound: VecDeque<Bytes>,
    parked_read: Option<(MessageSlot, Tag)>,
    writes: Vec<Bytes>,
    final_status: Status,
    submissions: Vec<SubmissionKind>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            fail_start: false,
            fail_write: false,
            inbound: VecDeque::new(),
            parked_read: None,
            writes: vec![],
            final_status: Status::ok(),
            submissions: vec![],
        }
    }
}

pub struct MockCall {
    producer: CompletionProducer,
    inner: Mutex<Inner>,
}

impl MockCall {
    pub fn new(producer: CompletionProducer) -> Self {
        Self {
            producer,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Script the next start submission to fail.
    pub fn fail_start(&self) {
        self.inner.lock().unwrap().fail_start = true;
    }

    /// Script write submissions to fail.
    pub fn fail_write(&self) {
        self.inner.lock().unwrap().fail_write = true;
    }

    pub fn set_final_status(&self, status: Status) {
        self.inner.lock().unwrap().final_status = status;
    }

    /// Serve one inbound message, releasing the parked read if there is one.
    pub fn push_message(&self, payload: Bytes) {
        let parked = {
            let mut inner = self.inner.lock().unwrap();
            match inner.parked_read.take() {
                Some(parked) => Some(parked),
                None => {
                    inner.inbound.push_back(payload.clone());
                    None
                }
            }
        };
        if let Some((slot, tag)) = parked {
            slot.lock().unwrap().replace(payload);
            self.producer.complete(tag, true);
        }
    }

    /// Fail the parked read, emulating the peer breaking the connection.
    pub fn break_stream(&self) {
        let parked = self.inner.lock().unwrap().parked_read.take();
        match parked {
            Some((_slot, tag)) => self.producer.complete(tag, false),
            None => warn!("No read is parked; nothing to break"),
        }
    }

    pub fn writes(&self) -> Vec<Bytes> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn submissions(&self) -> Vec<SubmissionKind> {
        self.inner.lock().unwrap().submissions.clone()
    }
}

impl StreamCall for MockCall {
    fn start(&self, tag: Tag) {
        let ok = {
            let mut inner = self.inner.lock().unwrap();
            inner.submissions.push(SubmissionKind::Start);
            !inner.fail_start
        };
        self.producer.complete(tag, ok);
    }

    fn read(&self, message: MessageSlot, tag: Tag) {
        let mut inner = self.inner.lock().unwrap();
        inner.submissions.push(SubmissionKind::Read);
        debug_assert!(
            inner.parked_read.is_none(),
            "At most one read may be outstanding per stream"
        );
        match inner.inbound.pop_front() {
            Some(payload) => {
                drop(inner);
                message.lock().unwrap().replace(payload);
                self.producer.complete(tag, true);
            }
            None => {
                inner.parked_read = Some((message, tag));
            }
        }
    }

    fn write(&self, payload: Bytes, tag: Tag) {
        let ok = {
            let mut inner = self.inner.lock().unwrap();
            inner.submissions.push(SubmissionKind::Write);
            inner.writes.push(payload);
            !inner.fail_write
        };
        self.producer.complete(tag, ok);
    }

    fn finish(&self, status: StatusSlot, tag: Tag) {
        let final_status = {
            let mut inner = self.inner.lock().unwrap();
            inner.submissions.push(SubmissionKind::Finish);
            inner.final_status.clone()
        };
        status.lock().unwrap().replace(final_status);
        self.producer.complete(tag, true);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
        time::{Duration, Instant},
    };

    use bytes::Bytes;
    use model::{ErrorCode, Status};
    use remote::{
        CompletionQueue, Generation, RemoteStream, StreamError, StreamObserver, StreamState,
    };

    use super::{MockCall, SubmissionKind};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Started,
        Read(Bytes),
        Wrote,
        Errored(ErrorCode),
    }

    struct TestObserver {
        generation: Generation,
        events: Mutex<Vec<Event>>,
    }

    impl TestObserver {
        fn new(generation: Generation) -> Self {
            Self {
                generation,
                events: Mutex::new(vec![]),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl StreamObserver for TestObserver {
        fn on_stream_start(&self) {
            self.events.lock().unwrap().push(Event::Started);
        }

        fn on_stream_read(&self, message: Bytes) {
            self.events.lock().unwrap().push(Event::Read(message));
        }

        fn on_stream_write(&self) {
            self.events.lock().unwrap().push(Event::Wrote);
        }

        fn on_stream_error(&self, status: Status) {
            self.events.lock().unwrap().push(Event::Errored(status.code));
        }

        fn generation(&self) -> u64 {
            self.generation.current()
        }
    }

    fn fixture(
        config: config::Configuration,
    ) -> (
        Arc<MockCall>,
        Arc<TestObserver>,
        Generation,
        CompletionQueue,
        RemoteStream,
    ) {
        ulog::try_init_log();
        let depth = config.remote.completion_queue_depth;
        let (producer, queue) = CompletionQueue::new(depth);
        let call = Arc::new(MockCall::new(producer));
        let generation = Generation::new();
        let observer = Arc::new(TestObserver::new(generation.clone()));
        let config = Arc::new(config);
        let stream = RemoteStream::new(
            call.clone(),
            observer.clone(),
            generation.clone(),
            &config,
        );
        (call, observer, generation, queue, stream)
    }

    fn wait_until<F>(limit: Duration, condition: F)
    where
        F: Fn() -> bool,
    {
        let deadline = Instant::now() + limit;
        while !condition() {
            assert!(Instant::now() < deadline, "Condition not met in time");
            thread::yield_now();
        }
    }

    #[test]
    fn test_stream_lifecycle() -> Result<(), StreamError> {
        let (call, observer, generation, queue, stream) =
            fixture(config::Configuration::default());

        stream.start()?;
        assert_eq!(StreamState::Starting, stream.state());
        queue.drain_ready();
        assert_eq!(StreamState::Open, stream.state());
        assert_eq!(vec![Event::Started], observer.events());

        // Inbound messages flow through the chained reads.
        call.push_message(Bytes::from_static(b"m-0"));
        call.push_message(Bytes::from_static(b"m-1"));
        queue.drain_ready();
        assert_eq!(
            vec![
                Event::Started,
                Event::Read(Bytes::from_static(b"m-0")),
                Event::Read(Bytes::from_static(b"m-1")),
            ],
            observer.events()
        );

        // Second write is buffered until the first one's completion frees
        // the write slot.
        stream.write(Bytes::from_static(b"w-0"))?;
        stream.write(Bytes::from_static(b"w-1"))?;
        queue.drain_ready();
        assert_eq!(
            vec![Bytes::from_static(b"w-0"), Bytes::from_static(b"w-1")],
            call.writes()
        );
        assert_eq!(
            2,
            observer
                .events()
                .iter()
                .filter(|e| **e == Event::Wrote)
                .count()
        );

        let events_before_stop = observer.events();
        stream.stop();
        assert_eq!(StreamState::Closed, stream.state());
        assert_eq!(1, generation.current());
        queue.drain_ready();

        // A message arriving for the superseded incarnation completes the
        // outstanding read, but the zombie fires no callback and arms no
        // further read.
        call.push_message(Bytes::from_static(b"late"));
        queue.drain_ready();
        assert_eq!(events_before_stop, observer.events());
        assert_eq!(
            Some(&SubmissionKind::Finish),
            call.submissions().last()
        );

        // Repeated stop is a no-op.
        stream.stop();
        assert_eq!(1, generation.current());
        Ok(())
    }

    #[test]
    fn test_failed_start_reports_error() {
        let (call, observer, generation, queue, stream) =
            fixture(config::Configuration::default());
        call.fail_start();
        stream.start().unwrap();
        queue.drain_ready();

        assert_eq!(
            vec![Event::Errored(ErrorCode::Unavailable)],
            observer.events()
        );
        assert_eq!(StreamState::Closed, stream.state());
        assert_eq!(1, generation.current());
        // The failure releases the transport call.
        assert_eq!(
            vec![SubmissionKind::Start, SubmissionKind::Finish],
            call.submissions()
        );
    }

    #[test]
    fn test_failed_write_reports_error() -> Result<(), StreamError> {
        let (call, observer, _generation, queue, stream) =
            fixture(config::Configuration::default());
        call.fail_write();
        stream.start()?;
        queue.drain_ready();
        stream.write(Bytes::from_static(b"doomed"))?;
        queue.drain_ready();

        assert_eq!(
            vec![Event::Started, Event::Errored(ErrorCode::Unavailable)],
            observer.events()
        );
        assert_eq!(StreamState::Closed, stream.state());
        assert_eq!(
            Some(&SubmissionKind::Finish),
            call.submissions().last()
        );
        Ok(())
    }

    #[test]
    fn test_broken_stream_is_terminal() -> Result<(), StreamError> {
        let (call, observer, generation, queue, stream) =
            fixture(config::Configuration::default());
        stream.start()?;
        queue.drain_ready();

        // The parked read fails; the error is terminal for this generation
        // and the transport call is finished.
        call.break_stream();
        queue.drain_ready();
        assert_eq!(
            vec![Event::Started, Event::Errored(ErrorCode::Unavailable)],
            observer.events()
        );
        assert_eq!(StreamState::Closed, stream.state());
        assert_eq!(1, generation.current());
        assert_eq!(
            vec![
                SubmissionKind::Start,
                SubmissionKind::Read,
                SubmissionKind::Finish,
            ],
            call.submissions()
        );
        assert_eq!(
            Err(StreamError::NotOpen(StreamState::Closed)),
            stream.write(Bytes::from_static(b"after"))
        );

        // Teardown after an observed failure neither advances the
        // generation again nor finishes the call a second time.
        stream.stop();
        assert_eq!(1, generation.current());
        assert_eq!(
            1,
            call.submissions()
                .iter()
                .filter(|s| **s == SubmissionKind::Finish)
                .count()
        );
        Ok(())
    }

    /// Races live writes against a stream failure with a real drain thread:
    /// once the error callback has fired, no later write completion may
    /// reach the observer.
    #[test]
    fn test_error_is_terminal_for_live_writes() {
        ulog::try_init_log();
        for _ in 0..32 {
            let config = Arc::new(config::Configuration::default());
            let (producer, queue) =
                CompletionQueue::new(config.remote.completion_queue_depth);
            let call = Arc::new(MockCall::new(producer));
            let generation = Generation::new();
            let observer = Arc::new(TestObserver::new(generation.clone()));
            let stream = RemoteStream::new(
                call.clone(),
                observer.clone(),
                generation.clone(),
                &config,
            );
            let worker = queue.spawn().expect("Spawn the drain thread");

            stream.start().expect("Start the stream");
            wait_until(Duration::from_secs(5), || {
                call.submissions().contains(&SubmissionKind::Read)
            });

            let writer = {
                let stream = stream.clone();
                thread::spawn(move || loop {
                    match stream.write(Bytes::from_static(b"w")) {
                        Ok(_) => {}
                        Err(StreamError::WriteBufferFull(_)) => thread::yield_now(),
                        Err(_) => break,
                    }
                })
            };
            call.break_stream();
            writer.join().expect("Join the writer thread");

            drop(stream);
            drop(call);
            worker.join();

            let events = observer.events();
            let first_error = events
                .iter()
                .position(|e| matches!(e, Event::Errored(_)))
                .expect("The broken read surfaces an error");
            assert_eq!(
                first_error,
                events.len() - 1,
                "No callback may follow the error: {:?}",
                events
            );
        }
    }
}
