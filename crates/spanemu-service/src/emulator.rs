//! Emulator: One handle over every admin and data service.

use std::sync::Arc;

use spanemu_core::config::OperationMode;
use spanemu_core::{DatabaseName, InstanceName, NameGenerator, RandomNames};

use crate::catalog::{InstanceConfig, InstanceConfigCatalog};
use crate::client::DatabaseClient;
use crate::database::{Database, DatabaseRegistry};
use crate::error::ServiceResult;
use crate::instance::{Instance, InstanceField, InstanceInfo, InstanceRegistry};
use crate::operation::{Operation, OperationScheduler, OperationSummary};

struct Inner {
    catalog: Arc<InstanceConfigCatalog>,
    scheduler: Arc<OperationScheduler>,
    instances: Arc<InstanceRegistry>,
    databases: DatabaseRegistry,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Emulator {
    inner: Arc<Inner>,
}

impl Emulator {
    /// Emulator with random operation ids.
    pub fn new(mode: OperationMode) -> Self {
        Self::with_names(mode, Arc::new(RandomNames::new()))
    }

    pub fn with_names(mode: OperationMode, names: Arc<dyn NameGenerator>) -> Self {
        let catalog = Arc::new(InstanceConfigCatalog::new());
        let scheduler = Arc::new(OperationScheduler::new(mode, names));
        let instances = Arc::new(InstanceRegistry::new(catalog.clone(), scheduler.clone()));
        let databases = DatabaseRegistry::new(instances.clone(), scheduler.clone());
        Self {
            inner: Arc::new(Inner {
                catalog,
                scheduler,
                instances,
                databases,
            }),
        }
    }

    // ── Instance configs ───────────────────────────────────────────

    pub fn list_instance_configs(&self, _project: &str) -> Vec<InstanceConfig> {
        self.inner.catalog.list().to_vec()
    }

    pub fn get_instance_config(&self, _project: &str, id: &str) -> ServiceResult<InstanceConfig> {
        self.inner.catalog.get(id).cloned()
    }

    // ── Instances ──────────────────────────────────────────────────

    pub fn create_instance(&self, info: InstanceInfo) -> ServiceResult<Operation<Instance>> {
        self.inner.instances.create(info)
    }

    pub fn update_instance(
        &self,
        info: InstanceInfo,
        mask: &[InstanceField],
    ) -> ServiceResult<Operation<Instance>> {
        self.inner.instances.update(info, mask)
    }

    pub fn get_instance(&self, id: &InstanceName) -> ServiceResult<Instance> {
        self.inner.instances.get(id)
    }

    pub fn list_instances(&self, project: &str) -> Vec<Instance> {
        self.inner.instances.list(project)
    }

    /// Delete an instance together with all of its databases.
    pub fn delete_instance(&self, id: &InstanceName) -> ServiceResult<()> {
        let databases = &self.inner.databases;
        self.inner.instances.delete(id, |instance| {
            databases.drop_instance_databases(&instance.id);
        })
    }

    // ── Databases ──────────────────────────────────────────────────

    pub fn create_database(
        &self,
        id: DatabaseName,
        initial_ddl: &[String],
    ) -> ServiceResult<Operation<Database>> {
        self.inner.databases.create(id, initial_ddl)
    }

    pub fn update_database_ddl(
        &self,
        id: &DatabaseName,
        statements: &[String],
    ) -> ServiceResult<Operation<()>> {
        self.inner.databases.update_ddl(id, statements)
    }

    pub fn get_database_ddl(&self, id: &DatabaseName) -> ServiceResult<Vec<String>> {
        self.inner.databases.get_ddl(id)
    }

    pub fn get_database(&self, id: &DatabaseName) -> ServiceResult<Database> {
        self.inner.databases.get(id)
    }

    pub fn list_databases(&self, instance: &InstanceName) -> ServiceResult<Vec<Database>> {
        self.inner.databases.list(instance)
    }

    pub fn drop_database(&self, id: &DatabaseName) -> ServiceResult<()> {
        self.inner.databases.drop_database(id)
    }

    /// Data client for a READY database.
    pub fn database_client(&self, id: &DatabaseName) -> ServiceResult<DatabaseClient> {
        let engine = self.inner.databases.engine(id)?;
        Ok(DatabaseClient::new(id.clone(), engine))
    }

    // ── Operations ─────────────────────────────────────────────────

    pub fn get_operation(&self, name: &str) -> ServiceResult<OperationSummary> {
        self.inner.scheduler.get(name)
    }

    pub fn list_operations(&self, parent: &str) -> Vec<OperationSummary> {
        self.inner.scheduler.list(parent)
    }
}
