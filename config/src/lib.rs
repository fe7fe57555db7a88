//! # Trendwatch Configuration
//!
//! Configuration structures consumed (not loaded) by this core.
//!
//! An external loader owns YAML parsing and environment overrides; the
//! structs here are what it hands to the storage manager, already merged.
//! All structures use `serde` defaults and `validator` rules so a loader can
//! call `validate()` before handing them over.

pub mod config;

pub use config::{DetectorSettings, LocalConfig, RemoteConfig, StorageConfig};
