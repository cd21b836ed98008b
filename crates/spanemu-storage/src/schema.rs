//! Schema: table, column, and index definitions.
//!
//! Names are matched case-insensitively, as in the DDL dialect.

use serde::{Deserialize, Serialize};

use crate::value::ColumnType;

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType, not_null: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null,
        }
    }

    fn to_ddl(&self) -> String {
        if self.not_null {
            format!("{} {} NOT NULL", self.name, self.column_type)
        } else {
            format!("{} {}", self.name, self.column_type)
        }
    }
}

/// A table: ordered columns plus the ordered primary-key column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Positions of the primary-key columns within `columns`.
    pub fn key_positions(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|k| self.column_index(k))
            .collect()
    }

    /// Names and types of the primary-key columns, in key order.
    pub fn key_columns(&self) -> Vec<(String, ColumnType)> {
        self.primary_key
            .iter()
            .filter_map(|k| self.column(k))
            .map(|c| (c.name.clone(), c.column_type))
            .collect()
    }

    pub fn to_ddl(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnDef::to_ddl).collect();
        format!(
            "CREATE TABLE {} ({}) PRIMARY KEY ({})",
            self.name,
            columns.join(", "),
            self.primary_key.join(", ")
        )
    }
}

/// A secondary index over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    /// Names and types of the indexed columns, in index order.
    pub fn key_columns(&self, table: &TableDef) -> Vec<(String, ColumnType)> {
        self.columns
            .iter()
            .filter_map(|c| table.column(c))
            .map(|c| (c.name.clone(), c.column_type))
            .collect()
    }

    pub fn to_ddl(&self) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.name,
            self.table,
            self.columns.join(", ")
        )
    }
}

/// The full schema of one database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    tables: Vec<TableDef>,
    indexes: Vec<IndexDef>,
}

impl Schema {
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableDef> {
        self.tables.iter_mut().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn indexes_on<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a IndexDef> + 'a {
        self.indexes
            .iter()
            .filter(move |i| i.table.eq_ignore_ascii_case(table))
    }

    /// True if a table or index already uses `name`.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.table(name).is_some() || self.index(name).is_some()
    }

    pub(crate) fn add_table(&mut self, table: TableDef) {
        self.tables.push(table);
    }

    pub(crate) fn add_index(&mut self, index: IndexDef) {
        self.indexes.push(index);
    }

    /// Remove a table and its indexes, returning the removed indexes.
    pub(crate) fn remove_table(&mut self, name: &str) -> Vec<IndexDef> {
        self.tables.retain(|t| !t.name.eq_ignore_ascii_case(name));
        let (dropped, kept): (Vec<IndexDef>, Vec<IndexDef>) = std::mem::take(&mut self.indexes)
            .into_iter()
            .partition(|i| i.table.eq_ignore_ascii_case(name));
        self.indexes = kept;
        dropped
    }

    pub(crate) fn remove_index(&mut self, name: &str) {
        self.indexes.retain(|i| !i.name.eq_ignore_ascii_case(name));
    }

    /// Render the schema as DDL statements: tables first, then indexes.
    pub fn to_ddl(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(TableDef::to_ddl)
            .chain(self.indexes.iter().map(IndexDef::to_ddl))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_table() -> TableDef {
        TableDef {
            name: "number".to_string(),
            columns: vec![
                ColumnDef::new("number", ColumnType::Int64, true),
                ColumnDef::new("name", ColumnType::String(Some(100)), true),
            ],
            primary_key: vec!["number".to_string()],
        }
    }

    #[test]
    fn lookups_ignore_case() {
        let mut schema = Schema::default();
        schema.add_table(number_table());
        assert!(schema.table("NUMBER").is_some());
        assert_eq!(schema.table("number").unwrap().column_index("Name"), Some(1));
        assert!(schema.name_in_use("Number"));
    }

    #[test]
    fn remove_table_takes_its_indexes() {
        let mut schema = Schema::default();
        schema.add_table(number_table());
        schema.add_index(IndexDef {
            name: "idx_number_name".to_string(),
            table: "number".to_string(),
            columns: vec!["name".to_string()],
            unique: false,
        });

        let dropped = schema.remove_table("number");
        assert_eq!(dropped.len(), 1);
        assert!(schema.tables().is_empty());
        assert!(schema.indexes().is_empty());
    }

    #[test]
    fn renders_ddl() {
        let mut schema = Schema::default();
        schema.add_table(number_table());
        assert_eq!(
            schema.to_ddl(),
            vec![
                "CREATE TABLE number (number INT64 NOT NULL, name STRING(100) NOT NULL) PRIMARY KEY (number)"
                    .to_string()
            ]
        );
    }
}
