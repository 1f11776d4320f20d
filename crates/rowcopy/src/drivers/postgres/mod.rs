//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresDatabase`]: catalog, retrieval and transactions over a deadpool pool

mod database;
mod dialect;

pub use database::PostgresDatabase;
pub use dialect::PostgresDialect;
