//! # Trendwatch Core
//!
//! Shared types and traits for the title store.
//!
//! This crate provides:
//! - The canonical title/observation entity ([`TitleRecord`]) and its
//!   pre-persistence forms ([`RawTitle`], [`NewTitle`])
//! - The [`TitleStore`] capability contract every storage backend satisfies
//! - Validation and normalization of incoming observations

pub mod traits;
pub mod types;

pub use traits::TitleStore;
pub use types::{
    NewTitle, PushBatchId, RawTitle, SchemaKind, SkippedTitle, TitleRecord, WriteSummary,
};
