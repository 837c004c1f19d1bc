use thiserror::Error;

use crate::stream::StreamState;

#[derive(Debug, Error, PartialEq)]
pub enum StreamError {
    #[error("Stream has already been started")]
    AlreadyStarted,

    #[error("Stream is not open [state={0:?}]")]
    NotOpen(StreamState),

    #[error("Write buffer is full [capacity={0}]")]
    WriteBufferFull(usize),
}
