//! Storage engine for the Spanner emulator.
//!
//! One [`StorageEngine`] backs one database: a schema plus redb-backed
//! ordered tables and secondary indexes. DDL batches and mutation batches
//! are each atomic; reads return lazy, key-ordered [`RowStream`]s.

pub mod ddl;
pub mod engine;
pub mod error;
pub mod key;
pub mod mutation;
pub mod schema;
pub mod tables;
pub mod value;

pub use ddl::{DdlStatement, parse_statement, parse_statements};
pub use engine::{ReadRequest, RowStream, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use key::{Key, KeyRange, KeySet};
pub use mutation::{Mutation, WriteOp};
pub use schema::{ColumnDef, IndexDef, Schema, TableDef};
pub use value::{ColumnType, Row, Value};
