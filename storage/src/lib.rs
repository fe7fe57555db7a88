//! # Storage Layer
//!
//! Two interchangeable title store backends behind one contract, plus the
//! manager that routes to the configured one.
//!
//! - [`local`]: embedded DuckDB store, file-resident, schema-versioned
//! - [`remote`]: S3-backed store with manifest-indexed batch objects
//! - [`manager`]: configuration-driven facade over either backend

pub mod local;
pub mod manager;
pub mod remote;

pub use local::LocalTitleStore;
pub use manager::StorageManager;
pub use remote::RemoteTitleStore;
