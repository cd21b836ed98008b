//! redb table naming for the storage engine.
//!
//! Each schema table and each index gets its own redb table with `&[u8]`
//! keys (order-preserving key encodings) and `&[u8]` values:
//!
//! - `rows/{table}`: primary key → JSON-serialized row values
//! - `index/{index}`: index key ++ primary key → primary key

use redb::TableDefinition;

/// Byte-keyed ordered store.
pub type Store<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

/// redb table name holding a schema table's rows.
pub fn rows_store(table: &str) -> String {
    format!("rows/{}", table.to_ascii_lowercase())
}

/// redb table name holding an index's entries.
pub fn index_store(index: &str) -> String {
    format!("index/{}", index.to_ascii_lowercase())
}

pub fn store(name: &str) -> Store<'_> {
    TableDefinition::new(name)
}
