//! # Incremental Title Detection
//!
//! Splits a freshly collected batch of titles into genuinely new ones and
//! repeats of what the store already saw inside a rolling lookback window.
//!
//! The detector is read-only: it never writes to the store, so running it
//! twice over an unchanged store yields the same answer. Persisting the
//! batch afterwards is the caller's move, via the storage manager.

pub mod detector;

pub use detector::{DedupeKey, Detection, DetectorConfig, IncrementalDetector};
