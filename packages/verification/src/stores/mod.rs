//! Storage implementations.
//!
//! - `MemoryCache` - in-process evidence cache
//! - `MemoryResultSink` - in-process result store keyed by check id

mod memory;

pub use memory::{MemoryCache, MemoryResultSink};
