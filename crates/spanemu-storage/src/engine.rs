//! StorageEngine: redb-backed tables and secondary indexes for one database.
//!
//! Every schema table is an ordered redb table keyed by the encoded primary
//! key; every index is an ordered redb table keyed by the encoded index key
//! followed by the primary key. Schema changes and mutation batches each
//! run inside a single redb write transaction, so they land completely or
//! not at all.

use std::collections::BTreeSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use redb::{
    Database, Range, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, WriteTransaction,
};
use tracing::{debug, info};

use crate::ddl::DdlStatement;
use crate::error::{StorageError, StorageResult};
use crate::key::{KeySet, ScanBounds, encode_key};
use crate::mutation::{Mutation, WriteOp};
use crate::schema::{IndexDef, Schema, TableDef};
use crate::tables::{index_store, rows_store, store};
use crate::value::{Row, Value};

/// Convert any `Display` error into a `StorageError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StorageError::$variant(e.to_string())
    };
}

/// A key-ordered read against a table, optionally through one of its indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub table: String,
    pub index: Option<String>,
    pub key_set: KeySet,
    pub columns: Vec<String>,
    pub limit: Option<usize>,
}

impl ReadRequest {
    pub fn new<S: Into<String>>(
        table: impl Into<String>,
        key_set: KeySet,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            table: table.into(),
            index: None,
            key_set,
            columns: columns.into_iter().map(Into::into).collect(),
            limit: None,
        }
    }

    /// Read in index order; key set parts refer to the index columns.
    pub fn using_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Storage for one database: its schema plus the redb database holding rows.
pub struct StorageEngine {
    db: Database,
    schema: RwLock<Schema>,
    closed: AtomicBool,
}

impl StorageEngine {
    /// Create an empty in-memory engine.
    pub fn open_in_memory() -> StorageResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        debug!("in-memory storage engine opened");
        Ok(Self {
            db,
            schema: RwLock::new(Schema::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Mark the engine dropped; later calls fail with NOT_FOUND.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    /// Snapshot of the current schema.
    pub fn schema(&self) -> Schema {
        self.schema.read().expect("schema lock").clone()
    }

    // ── Schema changes ─────────────────────────────────────────────

    /// Apply a batch of DDL statements atomically.
    ///
    /// Statements see the effects of earlier statements in the batch. If any
    /// statement fails, neither the schema nor the stored rows change.
    pub fn apply_ddl(&self, statements: &[DdlStatement]) -> StorageResult<()> {
        self.ensure_open()?;
        let mut schema = self.schema.write().expect("schema lock");
        let mut next = schema.clone();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for statement in statements {
            if let Err(e) = apply_statement(&txn, &mut next, statement) {
                txn.abort().map_err(map_err!(Transaction))?;
                debug!(error = %e, "schema change rolled back");
                return Err(e);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        *schema = next;
        info!(
            statements = statements.len(),
            tables = schema.tables().len(),
            indexes = schema.indexes().len(),
            "schema updated"
        );
        Ok(())
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Apply a batch of mutations atomically, in order.
    pub fn write(&self, mutations: &[Mutation]) -> StorageResult<()> {
        self.ensure_open()?;
        let schema = self.schema.read().expect("schema lock");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for mutation in mutations {
            if let Err(e) = apply_mutation(&txn, &schema, mutation) {
                txn.abort().map_err(map_err!(Transaction))?;
                debug!(table = mutation.table(), error = %e, "mutation batch rolled back");
                return Err(e);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(mutations = mutations.len(), "mutation batch committed");
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Start a key-ordered read against a snapshot.
    ///
    /// Nothing is scanned until the stream is consumed.
    pub fn read(&self, request: &ReadRequest) -> StorageResult<RowStream> {
        self.ensure_open()?;
        let schema = self.schema.read().expect("schema lock");
        let table = lookup_table(&schema, &request.table)?;
        let projection = request
            .columns
            .iter()
            .map(|c| {
                table.column_index(c).ok_or_else(|| {
                    StorageError::NotFound(format!("column {c} in table {}", table.name))
                })
            })
            .collect::<StorageResult<Vec<usize>>>()?;

        let index = match &request.index {
            Some(name) => {
                let index = schema
                    .index(name)
                    .ok_or_else(|| StorageError::NotFound(format!("index {name}")))?;
                if !index.table.eq_ignore_ascii_case(&table.name) {
                    return Err(StorageError::NotFound(format!(
                        "index {name} on table {}",
                        table.name
                    )));
                }
                Some(index)
            }
            None => None,
        };
        let key_columns = match index {
            Some(index) => index.key_columns(table),
            None => table.key_columns(),
        };
        let bounds = request.key_set.bounds(&key_columns)?;
        let limit = request.limit.unwrap_or(usize::MAX);

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let rows_name = rows_store(&table.name);
        let rows = txn.open_table(store(&rows_name)).map_err(map_err!(Table))?;

        let cursor = if bounds.is_empty() || limit == 0 {
            Cursor::Exhausted
        } else {
            match index {
                Some(index) => {
                    let index_name = index_store(&index.name);
                    let entries = txn.open_table(store(&index_name)).map_err(map_err!(Table))?;
                    Cursor::Index(
                        entries
                            .range::<&[u8]>(bounds.as_range())
                            .map_err(map_err!(Read))?,
                    )
                }
                None => Cursor::Rows(
                    rows.range::<&[u8]>(bounds.as_range())
                        .map_err(map_err!(Read))?,
                ),
            }
        };
        debug!(table = %table.name, index = ?request.index, limit = ?request.limit, "read started");

        Ok(RowStream {
            rows,
            cursor,
            remaining: limit,
            projection,
            width: table.columns.len(),
            columns: request.columns.clone(),
            _txn: txn,
        })
    }

    /// Number of rows stored in a table.
    pub fn row_count(&self, table: &str) -> StorageResult<u64> {
        self.ensure_open()?;
        let schema = self.schema.read().expect("schema lock");
        let table = lookup_table(&schema, table)?;
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let name = rows_store(&table.name);
        let rows = txn.open_table(store(&name)).map_err(map_err!(Table))?;
        rows.len().map_err(map_err!(Read))
    }
}

type Entries = Range<'static, &'static [u8], &'static [u8]>;

/// Position of a read within its snapshot.
enum Cursor {
    /// Walking the table itself: entries are (primary key, row).
    Rows(Entries),
    /// Walking an index: entries are (index key ++ primary key, primary key).
    Index(Entries),
    Exhausted,
}

/// Lazy, finite, key-ordered sequence of projected rows.
///
/// Holds a read snapshot; later writes and schema changes are not visible.
/// Each call to `next` pulls one entry from the underlying range, so
/// dropping the stream early leaves the rest of the scan untouched.
pub struct RowStream {
    rows: ReadOnlyTable<&'static [u8], &'static [u8]>,
    cursor: Cursor,
    remaining: usize,
    projection: Vec<usize>,
    width: usize,
    columns: Vec<String>,
    _txn: ReadTransaction,
}

impl RowStream {
    /// Column names, in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn project(&self, stored: &[u8]) -> StorageResult<Row> {
        let values = decode_row(stored, self.width)?;
        Ok(Row::new(
            self.projection.iter().map(|&i| values[i].clone()).collect(),
        ))
    }

    fn fetch(&self, pk: &[u8]) -> StorageResult<Row> {
        let guard = self
            .rows
            .get(pk)
            .map_err(map_err!(Read))?
            .ok_or_else(|| StorageError::Read("index entry points at a missing row".to_string()))?;
        self.project(guard.value())
    }

    fn advance(&mut self) -> Option<StorageResult<Row>> {
        let (through_index, entry) = match &mut self.cursor {
            Cursor::Exhausted => return None,
            Cursor::Rows(entries) => (false, entries.next()?),
            Cursor::Index(entries) => (true, entries.next()?),
        };
        Some(entry.map_err(map_err!(Read)).and_then(|(_, value)| {
            if through_index {
                self.fetch(value.value())
            } else {
                self.project(value.value())
            }
        }))
    }
}

impl Iterator for RowStream {
    type Item = StorageResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.advance() {
            Some(Ok(row)) => {
                self.remaining -= 1;
                Some(Ok(row))
            }
            Some(Err(e)) => {
                self.cursor = Cursor::Exhausted;
                Some(Err(e))
            }
            None => {
                self.cursor = Cursor::Exhausted;
                None
            }
        }
    }
}

// ── Schema change internals ────────────────────────────────────────

fn lookup_table<'a>(schema: &'a Schema, name: &str) -> StorageResult<&'a TableDef> {
    schema
        .table(name)
        .ok_or_else(|| StorageError::NotFound(format!("table {name}")))
}

fn apply_statement(
    txn: &WriteTransaction,
    schema: &mut Schema,
    statement: &DdlStatement,
) -> StorageResult<()> {
    match statement {
        DdlStatement::CreateTable(table) => create_table(txn, schema, table),
        DdlStatement::CreateIndex(index) => create_index(txn, schema, index),
        DdlStatement::DropTable(name) => {
            let table = lookup_table(schema, name)?.name.clone();
            let dropped = schema.remove_table(&table);
            let rows_name = rows_store(&table);
            txn.delete_table(store(&rows_name)).map_err(map_err!(Table))?;
            for index in &dropped {
                let index_name = index_store(&index.name);
                txn.delete_table(store(&index_name)).map_err(map_err!(Table))?;
            }
            debug!(%table, indexes = dropped.len(), "table dropped");
            Ok(())
        }
        DdlStatement::DropIndex(name) => {
            let index = schema
                .index(name)
                .ok_or_else(|| StorageError::NotFound(format!("index {name}")))?
                .name
                .clone();
            let index_name = index_store(&index);
            txn.delete_table(store(&index_name)).map_err(map_err!(Table))?;
            schema.remove_index(&index);
            debug!(%index, "index dropped");
            Ok(())
        }
        DdlStatement::AddColumn { table, column } => {
            let table = schema
                .table_mut(table)
                .ok_or_else(|| StorageError::NotFound(format!("table {table}")))?;
            if table.column(&column.name).is_some() {
                return Err(StorageError::AlreadyExists(format!(
                    "column {} in table {}",
                    column.name, table.name
                )));
            }
            if column.not_null {
                return Err(StorageError::FailedPrecondition(format!(
                    "cannot add NOT NULL column {} to existing table {}",
                    column.name, table.name
                )));
            }
            table.columns.push(column.clone());
            Ok(())
        }
    }
}

fn create_table(txn: &WriteTransaction, schema: &mut Schema, table: &TableDef) -> StorageResult<()> {
    if schema.name_in_use(&table.name) {
        return Err(StorageError::AlreadyExists(format!("table {}", table.name)));
    }
    let mut seen = BTreeSet::new();
    for column in &table.columns {
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(StorageError::InvalidArgument(format!(
                "duplicate column {} in table {}",
                column.name, table.name
            )));
        }
    }
    let mut key_seen = BTreeSet::new();
    for key in &table.primary_key {
        if table.column(key).is_none() {
            return Err(StorageError::InvalidArgument(format!(
                "primary key column {key} is not a column of table {}",
                table.name
            )));
        }
        if !key_seen.insert(key.to_ascii_lowercase()) {
            return Err(StorageError::InvalidArgument(format!(
                "primary key column {key} listed twice"
            )));
        }
    }

    let rows_name = rows_store(&table.name);
    txn.open_table(store(&rows_name)).map_err(map_err!(Table))?;
    schema.add_table(table.clone());
    debug!(table = %table.name, columns = table.columns.len(), "table created");
    Ok(())
}

fn create_index(txn: &WriteTransaction, schema: &mut Schema, index: &IndexDef) -> StorageResult<()> {
    let table = lookup_table(schema, &index.table)?.clone();
    if schema.name_in_use(&index.name) {
        return Err(StorageError::AlreadyExists(format!("index {}", index.name)));
    }
    for column in &index.columns {
        if table.column(column).is_none() {
            return Err(StorageError::NotFound(format!(
                "column {column} in table {}",
                table.name
            )));
        }
    }
    let index = IndexDef {
        table: table.name.clone(),
        ..index.clone()
    };

    // Snapshot the current rows, then backfill the index in key order.
    let rows_name = rows_store(&table.name);
    let existing: Vec<(Vec<u8>, Vec<Value>)> = {
        let rows = txn.open_table(store(&rows_name)).map_err(map_err!(Table))?;
        let mut existing = Vec::new();
        for entry in rows.iter().map_err(map_err!(Read))? {
            let (pk, row) = entry.map_err(map_err!(Read))?;
            existing.push((
                pk.value().to_vec(),
                decode_row(row.value(), table.columns.len())?,
            ));
        }
        existing
    };

    let index_name = index_store(&index.name);
    let mut entries = txn.open_table(store(&index_name)).map_err(map_err!(Table))?;
    let mut seen = BTreeSet::new();
    for (pk, row) in &existing {
        let (prefix, key) = index_entry(&index, &table, row, pk);
        if index.unique && !seen.insert(prefix) {
            return Err(StorageError::AlreadyExists(format!(
                "duplicate key while building unique index {}",
                index.name
            )));
        }
        entries
            .insert(key.as_slice(), pk.as_slice())
            .map_err(map_err!(Write))?;
    }
    drop(entries);

    debug!(index = %index.name, table = %table.name, backfilled = existing.len(), "index created");
    schema.add_index(index);
    Ok(())
}

// ── Mutation internals ─────────────────────────────────────────────

fn apply_mutation(txn: &WriteTransaction, schema: &Schema, mutation: &Mutation) -> StorageResult<()> {
    match mutation {
        Mutation::Write {
            op,
            table,
            columns,
            values,
        } => {
            let table = lookup_table(schema, table)?;
            apply_write(txn, schema, table, *op, columns, values)
        }
        Mutation::Delete { table, key_set } => {
            let table = lookup_table(schema, table)?;
            apply_delete(txn, schema, table, key_set)
        }
    }
}

fn apply_write(
    txn: &WriteTransaction,
    schema: &Schema,
    table: &TableDef,
    op: WriteOp,
    columns: &[String],
    values: &[Value],
) -> StorageResult<()> {
    if columns.len() != values.len() {
        return Err(StorageError::InvalidArgument(format!(
            "{} columns but {} values for table {}",
            columns.len(),
            values.len(),
            table.name
        )));
    }

    let mut provided: Vec<(usize, Value)> = Vec::with_capacity(columns.len());
    for (name, value) in columns.iter().zip(values) {
        let position = table.column_index(name).ok_or_else(|| {
            StorageError::NotFound(format!("column {name} in table {}", table.name))
        })?;
        if provided.iter().any(|(p, _)| *p == position) {
            return Err(StorageError::InvalidArgument(format!(
                "column {name} specified more than once"
            )));
        }
        let def = &table.columns[position];
        provided.push((position, value.clone().coerce(&def.name, def.column_type)?));
    }

    let mut key = Vec::with_capacity(table.primary_key.len());
    for position in table.key_positions() {
        match provided.iter().find(|(p, _)| *p == position) {
            Some((_, value)) => key.push(value.clone()),
            None => {
                return Err(StorageError::InvalidArgument(format!(
                    "missing primary key column {} for table {}",
                    table.columns[position].name, table.name
                )));
            }
        }
    }
    let pk = encode_key(&key);

    let width = table.columns.len();
    let rows_name = rows_store(&table.name);
    let mut rows = txn.open_table(store(&rows_name)).map_err(map_err!(Table))?;
    let existing = match rows.get(pk.as_slice()).map_err(map_err!(Read))? {
        Some(guard) => Some(decode_row(guard.value(), width)?),
        None => None,
    };

    let mut row = match (op, &existing) {
        (WriteOp::Insert, Some(_)) => {
            return Err(StorageError::AlreadyExists(format!(
                "row {} in table {}",
                describe_key(&key),
                table.name
            )));
        }
        (WriteOp::Update, None) => {
            return Err(StorageError::NotFound(format!(
                "row {} in table {}",
                describe_key(&key),
                table.name
            )));
        }
        (WriteOp::Update | WriteOp::InsertOrUpdate, Some(current)) => current.clone(),
        _ => vec![Value::Null; width],
    };
    for (position, value) in provided {
        row[position] = value;
    }
    for (column, value) in table.columns.iter().zip(&row) {
        if column.not_null && value.is_null() {
            return Err(StorageError::InvalidArgument(format!(
                "column {} of table {} is NOT NULL",
                column.name, table.name
            )));
        }
    }

    let encoded = encode_row(&row)?;
    rows.insert(pk.as_slice(), encoded.as_slice())
        .map_err(map_err!(Write))?;

    for index in schema.indexes_on(&table.name) {
        update_index(txn, table, index, existing.as_deref(), Some(&row), &pk)?;
    }
    Ok(())
}

fn apply_delete(
    txn: &WriteTransaction,
    schema: &Schema,
    table: &TableDef,
    key_set: &KeySet,
) -> StorageResult<()> {
    let bounds = key_set.bounds(&table.key_columns())?;
    if bounds.is_empty() {
        return Ok(());
    }
    let width = table.columns.len();
    let rows_name = rows_store(&table.name);
    let mut rows = txn.open_table(store(&rows_name)).map_err(map_err!(Table))?;

    let doomed: Vec<(Vec<u8>, Vec<Value>)> = {
        let mut doomed = Vec::new();
        for entry in rows
            .range::<&[u8]>(bounds.as_range())
            .map_err(map_err!(Read))?
        {
            let (pk, row) = entry.map_err(map_err!(Read))?;
            doomed.push((pk.value().to_vec(), decode_row(row.value(), width)?));
        }
        doomed
    };

    for (pk, row) in &doomed {
        rows.remove(pk.as_slice()).map_err(map_err!(Write))?;
        for index in schema.indexes_on(&table.name) {
            update_index(txn, table, index, Some(row), None, pk)?;
        }
    }
    debug!(table = %table.name, deleted = doomed.len(), "rows deleted");
    Ok(())
}

/// Replace a row's entry in one index: remove the old entry, insert the new.
fn update_index(
    txn: &WriteTransaction,
    table: &TableDef,
    index: &IndexDef,
    old: Option<&[Value]>,
    new: Option<&[Value]>,
    pk: &[u8],
) -> StorageResult<()> {
    let index_name = index_store(&index.name);
    let mut entries = txn.open_table(store(&index_name)).map_err(map_err!(Table))?;
    if let Some(old) = old {
        let (_, key) = index_entry(index, table, old, pk);
        entries.remove(key.as_slice()).map_err(map_err!(Write))?;
    }
    if let Some(new) = new {
        let (prefix, key) = index_entry(index, table, new, pk);
        if index.unique {
            let bounds = ScanBounds::prefix(prefix);
            let taken = {
                let mut range = entries
                    .range::<&[u8]>(bounds.as_range())
                    .map_err(map_err!(Read))?;
                match range.next() {
                    Some(Ok(_)) => true,
                    Some(Err(e)) => return Err(StorageError::Read(e.to_string())),
                    None => false,
                }
            };
            if taken {
                return Err(StorageError::AlreadyExists(format!(
                    "unique index {} already contains this key",
                    index.name
                )));
            }
        }
        entries
            .insert(key.as_slice(), pk)
            .map_err(map_err!(Write))?;
    }
    Ok(())
}

/// Encoded index values, and the full entry key (index values ++ primary key).
fn index_entry(index: &IndexDef, table: &TableDef, row: &[Value], pk: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let values: Vec<Value> = index
        .columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .map(|i| row[i].clone())
        .collect();
    let prefix = encode_key(&values);
    let mut key = prefix.clone();
    key.extend_from_slice(pk);
    (prefix, key)
}

fn encode_row(values: &[Value]) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(values).map_err(map_err!(Serialize))
}

/// Decode a stored row, padding columns added after it was written with NULL.
fn decode_row(bytes: &[u8], width: usize) -> StorageResult<Vec<Value>> {
    let mut values: Vec<Value> = serde_json::from_slice(bytes).map_err(map_err!(Deserialize))?;
    values.resize(width, Value::Null);
    Ok(values)
}

fn describe_key(key: &[Value]) -> String {
    let parts: Vec<String> = key
        .iter()
        .map(|v| v.to_json().to_string())
        .collect();
    format!("[{}]", parts.join(", "))
}
