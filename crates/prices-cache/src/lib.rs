#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/prices/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cache backends for memoized price tables.
//!
//! This crate provides implementations of the [`DataCache`] trait from `prices-core`:
//!
//! - [`FileCache`] - Durable filesystem cache (Parquet + JSON metadata)
//! - [`InMemoryCache`] - Simple in-memory cache for testing
//! - [`NoopCache`] - No-op cache that doesn't store anything

/// Filesystem cache implementation.
pub mod file;
/// In-memory cache implementation.
pub mod memory;
/// No-op cache implementation.
pub mod noop;

// Re-export the trait for convenience
pub use prices_core::DataCache;

pub use file::FileCache;
pub use memory::InMemoryCache;
pub use noop::NoopCache;
