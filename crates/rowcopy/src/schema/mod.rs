//! Schema graph construction.
//!
//! - [`SchemaBuilder`]: scans a live catalog into a [`SchemaGraph`](crate::core::SchemaGraph)
//! - [`SchemaCache`]: keeps built graphs on disk, keyed by connection URL

mod builder;
mod cache;

pub use builder::SchemaBuilder;
pub use cache::SchemaCache;
