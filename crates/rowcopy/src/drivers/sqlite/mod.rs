//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteDatabase`]: catalog introspection through `sqlite_master` and the
//!   `pragma_*` table-valued functions, row retrieval and transactions
//!
//! # Connection String
//!
//! ```text
//! sqlite::memory:
//! sqlite://path/to/file.db
//! ```

mod database;
mod dialect;

pub use database::SqliteDatabase;
pub use dialect::SqliteDialect;
