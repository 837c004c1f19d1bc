use std::sync::{Arc, Mutex};

use bytes::Bytes;
use model::Status;

use crate::operation::Tag;

/// Slot the transport fills with the next inbound message before signalling
/// the matching read completion.
pub type MessageSlot = Arc<Mutex<Option<Bytes>>>;

/// Slot the transport fills with the final stream status before signalling
/// the finish completion.
pub type StatusSlot = Arc<Mutex<Option<Status>>>;

/// Asynchronous surface of a single bidirectional streaming call.
///
/// Each method enqueues one asynchronous step and returns immediately; the
/// transport later pushes `(tag, ok)` into the completion queue. Sequential
/// reads issued one after another are completed in issuance order, a
/// guarantee of the transport that this crate relies on rather than
/// reimplements.
pub trait StreamCall: Send + Sync {
    /// Establish the stream.
    fn start(&self, tag: Tag);

    /// Wait for the next inbound message, delivering it through `message`.
    fn read(&self, message: MessageSlot, tag: Tag);

    /// Send one message. At most one write is outstanding per stream.
    fn write(&self, payload: Bytes, tag: Tag);

    /// Close the call and retrieve the final status through `status`.
    fn finish(&self, status: StatusSlot, tag: Tag);
}
