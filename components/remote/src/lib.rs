//! Generation-guarded dispatch of asynchronous stream operations.
//!
//! A bidirectional streaming call produces its events out-of-band: the
//! transport signals each completed step through a completion queue drained
//! by a dedicated thread, while the logical stream may be torn down or
//! superseded at any moment from another thread. Every operation therefore
//! captures the observer's generation at submission and compares it against
//! the live value when its completion arrives; a mismatch turns the
//! completion into a no-op instead of a callback to a consumer that has
//! moved on.

pub mod call;
pub mod completion_queue;
pub mod error;
pub mod observer;
pub mod operation;
pub(crate) mod ops;
pub mod stream;

pub use call::MessageSlot;
pub use call::StatusSlot;
pub use call::StreamCall;
pub use completion_queue::CompletionProducer;
pub use completion_queue::CompletionQueue;
pub use completion_queue::CompletionWorker;
pub use error::StreamError;
pub use observer::Generation;
pub use observer::StreamObserver;
pub use operation::Operation;
pub use operation::Tag;
pub use stream::RemoteStream;
pub use stream::StreamState;
