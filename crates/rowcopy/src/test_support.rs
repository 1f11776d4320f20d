//! Fixture databases shared by the unit tests.
//!
//! `main` is the root of the scenario graph:
//!
//! ```text
//! sub_main_rel <- sub_main -> main <- intermediate <- intermediate_to_child -> child
//! ```
//!
//! Arrows point from child to parent. `employee` references itself and
//! `cycle_a`/`cycle_b` reference each other.

use std::sync::Arc;

use crate::core::{DataNode, DataRow, Database, SchemaGraph, SqlValue};
use crate::drivers::SqliteDatabase;
use crate::schema::SchemaBuilder;

pub const SCHEMA: &str = "
CREATE TABLE main (
    id INTEGER PRIMARY KEY,
    text VARCHAR(100)
);
CREATE TABLE sub_main_rel (
    id INTEGER PRIMARY KEY,
    name VARCHAR(50) NOT NULL
);
CREATE TABLE sub_main (
    id INTEGER PRIMARY KEY,
    code VARCHAR(20) NOT NULL,
    main_id INTEGER NOT NULL REFERENCES main (id),
    rel_id INTEGER REFERENCES sub_main_rel (id)
);
CREATE TABLE intermediate (
    id INTEGER PRIMARY KEY,
    main_id INTEGER NOT NULL REFERENCES main (id),
    contents VARCHAR(100),
    updated_at TIMESTAMP
);
CREATE TABLE child (
    first VARCHAR(20) NOT NULL,
    second VARCHAR(20) NOT NULL,
    value INTEGER,
    note TEXT,
    PRIMARY KEY (first, second)
);
CREATE TABLE intermediate_to_child (
    intermediate_id INTEGER NOT NULL REFERENCES intermediate (id),
    child_first VARCHAR(20) NOT NULL,
    child_second VARCHAR(20) NOT NULL,
    PRIMARY KEY (intermediate_id, child_first, child_second),
    FOREIGN KEY (child_first, child_second) REFERENCES child (first, second)
);
CREATE TABLE employee (
    id INTEGER PRIMARY KEY,
    name VARCHAR(50) NOT NULL,
    manager_id INTEGER REFERENCES employee (id)
);
CREATE TABLE cycle_a (
    id INTEGER PRIMARY KEY,
    b_id INTEGER REFERENCES cycle_b (id)
);
CREATE TABLE cycle_b (
    id INTEGER PRIMARY KEY,
    a_id INTEGER REFERENCES cycle_a (id)
);
";

pub const DATA: &str = "
INSERT INTO main VALUES (1, 'text 1'), (2, 'text 2'), (3, 'text 3');
INSERT INTO sub_main_rel VALUES (1, 'rel 1'), (2, 'rel 2');
INSERT INTO sub_main VALUES (1, 'k1', 1, 1), (2, 'k2', 2, 2);
INSERT INTO intermediate (id, main_id, contents) VALUES
    (1, 1, 'content 1'),
    (2, 1, 'content 2'),
    (3, 2, 'content 3'),
    (4, 3, 'content 4'),
    (5, 3, 'content 5');
INSERT INTO child (first, second, value) VALUES
    ('first 1', 'second 1', 1),
    ('first 2', 'second 2', 2),
    ('first 3', 'second 3', 3),
    ('first 4', 'second 4', 4),
    ('first 5', 'second 5', 5);
INSERT INTO intermediate_to_child VALUES
    (1, 'first 1', 'second 1'),
    (2, 'first 2', 'second 2'),
    (3, 'first 3', 'second 3'),
    (4, 'first 4', 'second 4'),
    (4, 'first 5', 'second 5');
INSERT INTO employee VALUES (1, 'boss', NULL), (2, 'lead', 1), (3, 'dev', 2), (4, 'other', NULL);
INSERT INTO cycle_a VALUES (1, NULL);
INSERT INTO cycle_b VALUES (1, 1);
UPDATE cycle_a SET b_id = 1 WHERE id = 1;
";

/// In-memory database with the fixture schema and data.
pub async fn source_database() -> Arc<dyn Database> {
    let db = SqliteDatabase::memory().await.unwrap();
    db.execute_script(SCHEMA).await.unwrap();
    db.execute_script(DATA).await.unwrap();
    Arc::new(db)
}

/// In-memory database with the fixture schema and no rows.
pub async fn target_database() -> Arc<dyn Database> {
    let db = SqliteDatabase::memory().await.unwrap();
    db.execute_script(SCHEMA).await.unwrap();
    Arc::new(db)
}

/// In-memory SQLite database built from `script`.
pub async fn scripted_database(script: &str) -> Arc<dyn Database> {
    let db = SqliteDatabase::memory().await.unwrap();
    db.execute_script(script).await.unwrap();
    Arc::new(db)
}

pub async fn graph(db: &Arc<dyn Database>) -> SchemaGraph {
    SchemaBuilder::with_concurrency(4)
        .build(Arc::clone(db))
        .await
        .unwrap()
}

/// Rows of `table` anywhere in the tree.
pub fn rows_of<'a>(node: &'a DataNode, table: &str) -> Vec<&'a DataRow> {
    node.flatten()
        .into_iter()
        .filter(|row| row.table_name() == table)
        .collect()
}

/// The leading `n` values of each row, for comparing against literals.
pub fn leading_values(rows: &[&DataRow], n: usize) -> Vec<Vec<SqlValue>> {
    rows.iter()
        .map(|row| {
            row.columns
                .iter()
                .take(n)
                .filter_map(|c| c.value.clone())
                .collect()
        })
        .collect()
}

pub fn int(v: i64) -> SqlValue {
    SqlValue::I64(v)
}

pub fn text(v: &str) -> SqlValue {
    SqlValue::Text(v.to_string())
}

/// `SELECT COUNT(*)` against `table` in a throwaway transaction.
pub async fn count_rows(db: &Arc<dyn Database>, table: &str) -> i64 {
    let mut session = db.begin().await.unwrap();
    let count = session
        .count(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .await
        .unwrap();
    session.rollback().await.unwrap();
    count
}

/// A SQLite file under `dir` with the fixture schema, and data when `seeded`.
///
/// Returns its connection URL. The pool is closed before returning.
pub async fn file_database(dir: &std::path::Path, name: &str, seeded: bool) -> String {
    let url = format!("sqlite://{}?mode=rwc", dir.join(name).display());
    let db = SqliteDatabase::connect(&url).await.unwrap();
    db.execute_script(SCHEMA).await.unwrap();
    if seeded {
        db.execute_script(DATA).await.unwrap();
    }
    db.close().await;
    url
}
