//! DatabaseRegistry: Databases per instance, each owning a storage engine.
//!
//! A database is reserved in CREATING state as soon as its create call
//! validates, so concurrent creates of the same id fail fast. The create
//! operation applies the initial DDL and flips the database to READY, or
//! removes the reservation if the DDL fails.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use spanemu_core::{DatabaseName, InstanceName, epoch_secs};
use spanemu_storage::{StorageEngine, parse_statements};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::instance::InstanceRegistry;
use crate::operation::{Operation, OperationKind, OperationScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseState {
    Creating,
    Ready,
}

/// A database as reported by admin calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    /// `projects/{p}/instances/{i}/databases/{d}`.
    pub name: String,
    pub id: DatabaseName,
    pub state: DatabaseState,
    pub create_time: u64,
}

struct DatabaseSlot {
    database: Database,
    engine: Arc<StorageEngine>,
}

type Slots = Arc<RwLock<Vec<DatabaseSlot>>>;

pub struct DatabaseRegistry {
    instances: Arc<InstanceRegistry>,
    scheduler: Arc<OperationScheduler>,
    databases: Slots,
}

impl DatabaseRegistry {
    pub fn new(instances: Arc<InstanceRegistry>, scheduler: Arc<OperationScheduler>) -> Self {
        Self {
            instances,
            scheduler,
            databases: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Reserve a database and start applying its initial schema.
    pub fn create(
        &self,
        id: DatabaseName,
        initial_ddl: &[String],
    ) -> ServiceResult<Operation<Database>> {
        id.validate()?;
        let statements = parse_statements(initial_ddl)?;

        let (database, engine) = self.instances.with_instance(&id.instance, |_| {
            let mut databases = self.databases.write().expect("databases lock");
            if databases.iter().any(|s| s.database.id == id) {
                return Err(ServiceError::AlreadyExists(format!("database {id}")));
            }
            let engine = Arc::new(StorageEngine::open_in_memory()?);
            let database = Database {
                name: id.to_string(),
                id: id.clone(),
                state: DatabaseState::Creating,
                create_time: epoch_secs(),
            };
            databases.push(DatabaseSlot {
                database: database.clone(),
                engine: engine.clone(),
            });
            Ok((database, engine))
        })?;
        debug!(database = %database.name, statements = statements.len(), "database reserved");

        let slots = self.databases.clone();
        let name = database.name.clone();
        Ok(self
            .scheduler
            .schedule(&name, OperationKind::CreateDatabase, &name, move || {
                let outcome = engine.apply_ddl(&statements);
                let mut databases = slots.write().expect("databases lock");
                let position = databases
                    .iter()
                    .position(|s| Arc::ptr_eq(&s.engine, &engine))
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("database {} was dropped", database.name))
                    })?;
                match outcome {
                    Ok(()) => {
                        let slot = &mut databases[position];
                        slot.database.state = DatabaseState::Ready;
                        info!(database = %slot.database.name, "database ready");
                        Ok(slot.database.clone())
                    }
                    Err(e) => {
                        databases.remove(position);
                        engine.close();
                        Err(e.into())
                    }
                }
            }))
    }

    pub fn get(&self, id: &DatabaseName) -> ServiceResult<Database> {
        self.with_slot(id, |slot| slot.database.clone())
    }

    /// Databases of an instance, in creation order.
    pub fn list(&self, instance: &InstanceName) -> ServiceResult<Vec<Database>> {
        self.instances.with_instance(instance, |_| {
            Ok(self
                .databases
                .read()
                .expect("databases lock")
                .iter()
                .filter(|s| &s.database.id.instance == instance)
                .map(|s| s.database.clone())
                .collect())
        })
    }

    /// Remove a database and discard its storage.
    pub fn drop_database(&self, id: &DatabaseName) -> ServiceResult<()> {
        let mut databases = self.databases.write().expect("databases lock");
        let position = databases
            .iter()
            .position(|s| &s.database.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("database {id}")))?;
        let slot = databases.remove(position);
        slot.engine.close();
        self.scheduler.forget(&slot.database.name);
        info!(database = %slot.database.name, "database dropped");
        Ok(())
    }

    /// Drop every database of an instance; returns how many were dropped.
    pub fn drop_instance_databases(&self, instance: &InstanceName) -> usize {
        let mut databases = self.databases.write().expect("databases lock");
        let before = databases.len();
        databases.retain(|slot| {
            let owned = &slot.database.id.instance == instance;
            if owned {
                slot.engine.close();
            }
            !owned
        });
        let dropped = before - databases.len();
        if dropped > 0 {
            info!(instance = %instance, dropped, "instance databases dropped");
        }
        dropped
    }

    /// Start applying a batch of schema changes.
    pub fn update_ddl(
        &self,
        id: &DatabaseName,
        statements: &[String],
    ) -> ServiceResult<Operation<()>> {
        let engine = self.engine(id)?;
        let parsed = parse_statements(statements)?;
        let name = id.to_string();
        Ok(self
            .scheduler
            .schedule(&name, OperationKind::UpdateDatabaseDdl, &name, move || {
                engine.apply_ddl(&parsed).map_err(ServiceError::from)
            }))
    }

    /// The current schema rendered as DDL statements.
    pub fn get_ddl(&self, id: &DatabaseName) -> ServiceResult<Vec<String>> {
        Ok(self.engine(id)?.schema().to_ddl())
    }

    /// Storage of a READY database.
    pub fn engine(&self, id: &DatabaseName) -> ServiceResult<Arc<StorageEngine>> {
        self.with_slot(id, |slot| match slot.database.state {
            DatabaseState::Ready => Ok(slot.engine.clone()),
            DatabaseState::Creating => Err(ServiceError::FailedPrecondition(format!(
                "database {id} is still being created"
            ))),
        })?
    }

    fn with_slot<R>(&self, id: &DatabaseName, f: impl FnOnce(&DatabaseSlot) -> R) -> ServiceResult<R> {
        let databases = self.databases.read().expect("databases lock");
        databases
            .iter()
            .find(|s| &s.database.id == id)
            .map(f)
            .ok_or_else(|| ServiceError::NotFound(format!("database {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InstanceConfigCatalog;
    use crate::instance::InstanceInfo;
    use spanemu_core::config::OperationMode;
    use spanemu_core::{ErrorCode, SequentialNames};

    fn registries(mode: OperationMode) -> (Arc<InstanceRegistry>, DatabaseRegistry) {
        let scheduler = Arc::new(OperationScheduler::new(mode, Arc::new(SequentialNames::new())));
        let instances = Arc::new(InstanceRegistry::new(
            Arc::new(InstanceConfigCatalog::new()),
            scheduler.clone(),
        ));
        instances
            .create(InstanceInfo::new(
                InstanceName::new("test-project", "test-instance"),
                "regional-us-central1",
            ))
            .unwrap();
        let databases = DatabaseRegistry::new(instances.clone(), scheduler);
        (instances, databases)
    }

    fn db(id: &str) -> DatabaseName {
        DatabaseName::new("test-project", "test-instance", id)
    }

    fn ddl(statements: &[&str]) -> Vec<String> {
        statements.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn create_applies_initial_ddl() {
        let (_, databases) = registries(OperationMode::Inline);
        let op = databases
            .create(
                db("test-db"),
                &ddl(&["CREATE TABLE t (id INT64 NOT NULL) PRIMARY KEY (id)"]),
            )
            .unwrap();
        let database = op.result().unwrap().unwrap();
        assert_eq!(database.state, DatabaseState::Ready);
        assert_eq!(
            databases.get_ddl(&db("test-db")).unwrap(),
            vec!["CREATE TABLE t (id INT64 NOT NULL) PRIMARY KEY (id)".to_string()]
        );
    }

    #[test]
    fn create_validates_synchronously() {
        let (_, databases) = registries(OperationMode::Inline);
        databases.create(db("test-db"), &[]).unwrap();

        let err = databases.create(db("test-db"), &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);

        let err = databases
            .create(DatabaseName::new("test-project", "missing", "test-db"), &[])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = databases
            .create(db("other-db"), &ddl(&["CREATE VIEW v"]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = databases.create(db("X"), &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn failed_initial_ddl_removes_reservation() {
        let (_, databases) = registries(OperationMode::Inline);
        let op = databases
            .create(db("test-db"), &ddl(&["CREATE INDEX i ON missing (a)"]))
            .unwrap();
        assert_eq!(op.result().unwrap().unwrap_err().code(), ErrorCode::NotFound);
        assert_eq!(databases.get(&db("test-db")).unwrap_err().code(), ErrorCode::NotFound);
    }

    #[test]
    fn update_ddl_runs_as_operation() {
        let (_, databases) = registries(OperationMode::Inline);
        databases.create(db("test-db"), &[]).unwrap();
        let op = databases
            .update_ddl(
                &db("test-db"),
                &ddl(&["CREATE TABLE t (id INT64 NOT NULL, v STRING(MAX)) PRIMARY KEY (id)"]),
            )
            .unwrap();
        assert!(op.is_successful());

        let op = databases
            .update_ddl(&db("test-db"), &ddl(&["CREATE TABLE t (id INT64) PRIMARY KEY (id)"]))
            .unwrap();
        assert_eq!(op.result().unwrap().unwrap_err().code(), ErrorCode::AlreadyExists);

        assert_eq!(
            databases
                .update_ddl(&db("missing"), &[])
                .unwrap_err()
                .code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn drop_closes_storage() {
        let (_, databases) = registries(OperationMode::Inline);
        databases.create(db("test-db"), &[]).unwrap();
        let engine = databases.engine(&db("test-db")).unwrap();
        databases.drop_database(&db("test-db")).unwrap();
        assert!(engine.is_closed());
        assert_eq!(
            databases.drop_database(&db("test-db")).unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn list_and_instance_cascade() {
        let (_, databases) = registries(OperationMode::Inline);
        databases.create(db("first-db"), &[]).unwrap();
        databases.create(db("second-db"), &[]).unwrap();
        let instance = InstanceName::new("test-project", "test-instance");
        let names: Vec<String> = databases
            .list(&instance)
            .unwrap()
            .into_iter()
            .map(|d| d.id.database)
            .collect();
        assert_eq!(names, vec!["first-db", "second-db"]);

        assert_eq!(databases.drop_instance_databases(&instance), 2);
        assert!(databases.list(&instance).unwrap().is_empty());
    }

    #[tokio::test]
    async fn background_create_reaches_ready() {
        let (_, databases) = registries(OperationMode::Background);
        let op = databases
            .create(
                db("test-db"),
                &ddl(&["CREATE TABLE t (id INT64 NOT NULL) PRIMARY KEY (id)"]),
            )
            .unwrap();
        let database = op.wait().await.unwrap();
        assert_eq!(database.state, DatabaseState::Ready);
        assert_eq!(
            databases.get(&db("test-db")).unwrap().state,
            DatabaseState::Ready
        );
    }

    #[test]
    fn concurrent_creates_of_one_id_admit_exactly_one() {
        let (_, databases) = registries(OperationMode::Inline);
        let outcomes: Vec<ServiceResult<Operation<Database>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| databases.create(db("test-db"), &[])))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| e.code() == ErrorCode::AlreadyExists)
        );
        let instance = InstanceName::new("test-project", "test-instance");
        assert_eq!(databases.list(&instance).unwrap().len(), 1);
    }

    #[test]
    fn instance_delete_racing_database_create_leaves_no_orphan() {
        let instance = InstanceName::new("test-project", "test-instance");
        for _ in 0..32 {
            let (instances, databases) = registries(OperationMode::Inline);
            let created = std::thread::scope(|scope| {
                let create = scope.spawn(|| databases.create(db("test-db"), &[]));
                let delete = scope.spawn(|| {
                    instances.delete(&instance, |removed| {
                        databases.drop_instance_databases(&removed.id);
                    })
                });
                delete.join().unwrap().unwrap();
                create.join().unwrap()
            });
            if let Err(e) = created {
                assert_eq!(e.code(), ErrorCode::NotFound);
            }
            assert_eq!(databases.get(&db("test-db")).unwrap_err().code(), ErrorCode::NotFound);
            assert_eq!(databases.drop_instance_databases(&instance), 0);
        }
    }

    #[test]
    fn drop_forgets_database_operations() {
        let (_, databases) = registries(OperationMode::Inline);
        let op = databases.create(db("test-db"), &[]).unwrap();
        assert_eq!(databases.scheduler.list(&db("test-db").to_string()).len(), 1);
        databases.drop_database(&db("test-db")).unwrap();
        assert_eq!(
            databases.scheduler.get(op.name()).unwrap_err().code(),
            ErrorCode::NotFound
        );
        // The instance's own create operation is untouched.
        assert_eq!(
            databases
                .scheduler
                .list("projects/test-project/instances/test-instance")
                .len(),
            1
        );
    }
}
