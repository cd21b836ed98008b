//! Row mutations buffered by transactions and applied as one batch.

use serde::{Deserialize, Serialize};

use crate::key::KeySet;
use crate::value::Value;

/// How a write mutation treats an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    /// Fails with ALREADY_EXISTS if the row exists.
    Insert,
    /// Fails with NOT_FOUND if the row does not exist.
    Update,
    /// Inserts, or overwrites only the given columns.
    InsertOrUpdate,
    /// Inserts, or replaces the whole row; unspecified columns become NULL.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    Write {
        op: WriteOp,
        table: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        key_set: KeySet,
    },
}

impl Mutation {
    pub fn insert(table: impl Into<String>) -> WriteBuilder {
        WriteBuilder::new(WriteOp::Insert, table)
    }

    pub fn update(table: impl Into<String>) -> WriteBuilder {
        WriteBuilder::new(WriteOp::Update, table)
    }

    pub fn insert_or_update(table: impl Into<String>) -> WriteBuilder {
        WriteBuilder::new(WriteOp::InsertOrUpdate, table)
    }

    pub fn replace(table: impl Into<String>) -> WriteBuilder {
        WriteBuilder::new(WriteOp::Replace, table)
    }

    pub fn delete(table: impl Into<String>, key_set: KeySet) -> Mutation {
        Mutation::Delete {
            table: table.into(),
            key_set,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Mutation::Write { table, .. } | Mutation::Delete { table, .. } => table,
        }
    }
}

/// Builder for write mutations: `Mutation::insert("t").set("a", 1).build()`.
#[derive(Debug, Clone)]
pub struct WriteBuilder {
    op: WriteOp,
    table: String,
    columns: Vec<String>,
    values: Vec<Value>,
}

impl WriteBuilder {
    fn new(op: WriteOp, table: impl Into<String>) -> Self {
        Self {
            op,
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push(column.into());
        self.values.push(value.into());
        self
    }

    pub fn build(self) -> Mutation {
        Mutation::Write {
            op: self.op,
            table: self.table,
            columns: self.columns,
            values: self.values,
        }
    }
}
