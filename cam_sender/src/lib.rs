//! Frame sources feeding the sample server.
pub mod sensors;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
