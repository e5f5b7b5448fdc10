//! Aspect-ratio probing for the gallery grid.
//!
//! This module provides:
//! - `AspectRatioProber` - Bounded worker pool that reads image dimensions
//! - `ProbeBatch` - Joined results for one photo list
//! - `ProbeCancel` - Drops a batch that is no longer wanted

pub mod queue;

pub use queue::{AspectRatioProber, ProbeCancel};
