/// A unit of asynchronous work submitted to the completion queue.
pub trait Operation: Send {
    /// Submit the asynchronous work against the transport, handing `self`
    /// over as the tag the completion queue will later yield. Called exactly
    /// once; returns immediately. Submission failures are not reported here
    /// but through `complete`.
    fn execute(self: Box<Self>);

    /// React to the completion queue yielding this operation's tag, with
    /// `ok == false` signalling unrecoverable failure of this asynchronous
    /// step. Runs on the queue-drain thread. Consuming the box makes a
    /// second invocation impossible and releases the operation's resources
    /// on return.
    fn complete(self: Box<Self>, ok: bool);
}

/// Tag handed to the transport and returned verbatim by the completion
/// queue.
pub type Tag = Box<dyn Operation>;
