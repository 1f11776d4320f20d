//! Data retrieval: the foreign-key walk from a seed query.
//!
//! - [`walker`]: [`DataRetriever`] and [`WalkDirection`]
//! - [`select`]: join-shaped, chunked select statements
//! - [`filter`]: [`TableFilter`], the tables excluded from the walk

pub mod filter;
pub mod select;
pub mod walker;

pub use filter::TableFilter;
pub use select::{chunk_size_for, SelectQuery, MAX_PARAMS_PER_STATEMENT};
pub use walker::{remove_duplicate_rows, DataRetriever, WalkDirection, DEFAULT_CHUNK_SIZE};
