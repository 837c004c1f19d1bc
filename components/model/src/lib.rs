pub mod status;

pub use status::ErrorCode;
pub use status::Status;
