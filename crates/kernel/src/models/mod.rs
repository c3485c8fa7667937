//! Database models.

pub mod envelope;

pub use envelope::{ContentEnvelope, DEFAULT_STREAM_CHANNEL, Visibility};
