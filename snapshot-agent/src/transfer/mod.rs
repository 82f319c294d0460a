//! Streaming helpers shared by the storage clients.

pub mod progress_stream;

pub use progress_stream::{ProgressCallback, ProgressStream};
