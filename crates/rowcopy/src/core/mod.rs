//! Core abstractions for database-agnostic row copying.
//!
//! - [`schema`]: tables, columns, relationships and the schema graph
//! - [`value`]: SQL value representation and type codes
//! - [`data`]: retrieved rows, their filter/binding behaviour and the data tree
//! - [`traits`]: database, session and dialect traits implemented by drivers
//! - [`identifier`]: identifier validation and quoting
//!
//! Drivers (`drivers/sqlite`, `drivers/postgres`, `drivers/mysql`) implement the
//! traits; everything else in the crate is written against them only, so the
//! walker and writers can be exercised against an in-memory database.

pub mod data;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use data::{ColumnData, DataNode, DataRow};
pub use schema::{group_key_columns, repair_relationships, Column, KeyColumn, Relationship, SchemaGraph, Table};
pub use traits::{Database, Dialect, Session};
pub use value::{SqlType, SqlValue};
