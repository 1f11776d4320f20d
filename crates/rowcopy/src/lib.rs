//! # rowcopy
//!
//! Copies a referentially complete subset of rows from one relational
//! database to another.
//!
//! A seed query selects the starting rows. The copier then follows foreign
//! keys in both directions, collecting the parent rows those rows need and
//! the child rows that hang off them, and writes everything to the target in
//! an order that satisfies the constraints:
//!
//! - **Schema graph** built concurrently from driver metadata, optionally cached
//! - **Chunked relationship queries** that stay under driver parameter limits
//! - **Target mapping** that validates rows against the target schema
//! - **Insert, update or script output** in one transaction per write
//!
//! ## Example
//!
//! ```rust,no_run
//! use rowcopy::{CopyOptions, Copier};
//!
//! #[tokio::main]
//! async fn main() -> rowcopy::Result<()> {
//!     let options = CopyOptions {
//!         source_connection: Some("postgres://localhost/prod".into()),
//!         target_connection: Some("postgres://localhost/dev".into()),
//!         query: "SELECT * FROM customer WHERE id = 42".into(),
//!         ..Default::default()
//!     };
//!     let report = Copier::new(options).run().await?;
//!     println!("Copied {} rows", report.rows_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod copier;
pub mod core;
pub mod drivers;
pub mod error;
pub mod mapper;
pub mod query;
pub mod retrieve;
pub mod schema;
pub mod visualize;
pub mod writer;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use config::{CopyOptions, ParamFile, SchemaCacheMode};
pub use copier::{Copier, CopyReport, QueryReport};
pub use core::{DataNode, DataRow, Database, SchemaGraph, Table};
pub use error::{CopyError, Result};
pub use query::{parse_queries, Query};
pub use retrieve::{DataRetriever, TableFilter, WalkDirection};
pub use schema::{SchemaBuilder, SchemaCache};
pub use visualize::{CopyVisualizer, TreeTable};
pub use writer::{DataWriter, Inserter, SqlScriptWriter, Updater, WriteSummary};
