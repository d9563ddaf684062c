//! Capability interfaces for every external collaborator.
//!
//! Stages depend only on these traits, so providers can be swapped and
//! deterministic doubles used in tests (see [`crate::testing`]).

pub mod cache;
pub mod classifier;
pub mod completion;
pub mod embedder;
pub mod fetcher;
pub mod media;
pub mod searcher;
pub mod sink;
