//! DatabaseClient: The data path for one database.

use std::sync::Arc;

use spanemu_core::DatabaseName;
use spanemu_storage::{KeySet, Mutation, ReadRequest, RowStream, StorageEngine};
use tracing::debug;

use crate::error::ServiceResult;

/// Reads and writes rows of one database.
///
/// Holds the database's storage directly; once the database is dropped,
/// every call fails with NOT_FOUND.
#[derive(Clone)]
pub struct DatabaseClient {
    name: DatabaseName,
    engine: Arc<StorageEngine>,
}

impl DatabaseClient {
    pub(crate) fn new(name: DatabaseName, engine: Arc<StorageEngine>) -> Self {
        Self { name, engine }
    }

    pub fn database(&self) -> &DatabaseName {
        &self.name
    }

    /// Read rows of `table` in primary-key order.
    pub fn read<S: Into<String>>(
        &self,
        table: &str,
        key_set: KeySet,
        columns: impl IntoIterator<Item = S>,
    ) -> ServiceResult<RowStream> {
        self.execute(&ReadRequest::new(table, key_set, columns))
    }

    /// Read rows of `table` in the order of `index`; `key_set` addresses
    /// the index columns.
    pub fn read_using_index<S: Into<String>>(
        &self,
        table: &str,
        index: &str,
        key_set: KeySet,
        columns: impl IntoIterator<Item = S>,
    ) -> ServiceResult<RowStream> {
        self.execute(&ReadRequest::new(table, key_set, columns).using_index(index))
    }

    pub fn execute(&self, request: &ReadRequest) -> ServiceResult<RowStream> {
        Ok(self.engine.read(request)?)
    }

    /// Apply mutations atomically.
    pub fn write(&self, mutations: &[Mutation]) -> ServiceResult<()> {
        self.engine.write(mutations)?;
        debug!(database = %self.name, mutations = mutations.len(), "mutations committed");
        Ok(())
    }

    /// Run `body` with a transaction context and commit its buffered
    /// mutations if it succeeds. Nothing is written if `body` fails.
    pub fn read_write_transaction<R>(
        &self,
        body: impl FnOnce(&mut TransactionContext) -> ServiceResult<R>,
    ) -> ServiceResult<R> {
        let mut ctx = TransactionContext {
            engine: self.engine.clone(),
            buffer: Vec::new(),
        };
        let result = body(&mut ctx)?;
        self.write(&ctx.buffer)?;
        Ok(result)
    }
}

/// Reads see committed data; writes are buffered until commit.
pub struct TransactionContext {
    engine: Arc<StorageEngine>,
    buffer: Vec<Mutation>,
}

impl TransactionContext {
    pub fn read(&self, request: &ReadRequest) -> ServiceResult<RowStream> {
        Ok(self.engine.read(request)?)
    }

    pub fn buffer(&mut self, mutation: Mutation) {
        self.buffer.push(mutation);
    }

    pub fn buffer_all(&mut self, mutations: impl IntoIterator<Item = Mutation>) {
        self.buffer.extend(mutations);
    }

    pub fn buffered(&self) -> &[Mutation] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use spanemu_core::ErrorCode;
    use spanemu_storage::{Key, Row, parse_statements};

    fn client() -> DatabaseClient {
        let engine = StorageEngine::open_in_memory().unwrap();
        engine
            .apply_ddl(
                &parse_statements(&[
                    "CREATE TABLE singers (id INT64 NOT NULL, name STRING(64)) PRIMARY KEY (id)",
                    "CREATE INDEX singers_by_name ON singers (name)",
                ])
                .unwrap(),
            )
            .unwrap();
        DatabaseClient::new(
            DatabaseName::new("test-project", "test-instance", "test-db"),
            Arc::new(engine),
        )
    }

    fn names(stream: RowStream) -> Vec<String> {
        stream
            .map(|row| row.unwrap().get_str(0).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn transaction_commits_buffered_mutations() {
        let client = client();
        let count = client
            .read_write_transaction(|tx| {
                tx.buffer(Mutation::insert("singers").set("id", 1i64).set("name", "Marc").build());
                tx.buffer(Mutation::insert("singers").set("id", 2i64).set("name", "Catalina").build());
                Ok(tx.buffered().len())
            })
            .unwrap();
        assert_eq!(count, 2);
        let stream = client
            .read_using_index("singers", "singers_by_name", KeySet::all(), ["name"])
            .unwrap();
        assert_eq!(names(stream), vec!["Catalina", "Marc"]);
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let client = client();
        let err = client
            .read_write_transaction(|tx| -> ServiceResult<()> {
                tx.buffer(Mutation::insert("singers").set("id", 1i64).build());
                Err(ServiceError::FailedPrecondition("abort".into()))
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FailedPrecondition);
        let rows: Vec<Row> = client
            .read("singers", KeySet::all(), ["id"])
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert!(rows.is_empty());
    }

    #[test]
    fn transaction_reads_committed_rows() {
        let client = client();
        client
            .write(&[Mutation::insert("singers").set("id", 7i64).set("name", "Alice").build()])
            .unwrap();
        client
            .read_write_transaction(|tx| {
                let request = ReadRequest::new("singers", KeySet::single_key(Key::of([7i64])), ["name"]);
                let found = tx.read(&request)?.count();
                assert_eq!(found, 1);
                tx.buffer(Mutation::update("singers").set("id", 7i64).set("name", "Alicia").build());
                Ok(())
            })
            .unwrap();
        let stream = client
            .read("singers", KeySet::single_key(Key::of([7i64])), ["name"])
            .unwrap();
        assert_eq!(names(stream), vec!["Alicia"]);
    }
}
