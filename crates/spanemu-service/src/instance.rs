//! InstanceRegistry: In-memory instances keyed by (project, instance id).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use spanemu_core::{InstanceName, epoch_secs};
use tracing::{debug, info};

use crate::catalog::InstanceConfigCatalog;
use crate::error::{ServiceError, ServiceResult};
use crate::operation::{Operation, OperationKind, OperationScheduler};

const DEFAULT_NODE_COUNT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Ready,
}

/// Mutable instance attributes, as supplied by create and update calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: InstanceName,
    /// Config id or resource name; resolved against the catalog.
    pub config: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_node_count")]
    pub node_count: u32,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_node_count() -> u32 {
    DEFAULT_NODE_COUNT
}

impl InstanceInfo {
    pub fn new(id: InstanceName, config: impl Into<String>) -> Self {
        let display_name = id.instance.clone();
        Self {
            id,
            config: config.into(),
            display_name,
            node_count: DEFAULT_NODE_COUNT,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_node_count(mut self, node_count: u32) -> Self {
        self.node_count = node_count;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Fields an update may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceField {
    DisplayName,
    NodeCount,
    Config,
    Labels,
}

/// A stored instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// `projects/{project}/instances/{instance}`.
    pub name: String,
    pub id: InstanceName,
    /// Resolved instance config id.
    pub config: String,
    pub display_name: String,
    pub node_count: u32,
    pub labels: BTreeMap<String, String>,
    pub state: InstanceState,
    pub create_time: u64,
}

pub struct InstanceRegistry {
    catalog: Arc<InstanceConfigCatalog>,
    scheduler: Arc<OperationScheduler>,
    instances: RwLock<Vec<Instance>>,
}

impl InstanceRegistry {
    pub fn new(catalog: Arc<InstanceConfigCatalog>, scheduler: Arc<OperationScheduler>) -> Self {
        Self {
            catalog,
            scheduler,
            instances: RwLock::new(Vec::new()),
        }
    }

    /// Create a READY instance; the returned operation is already DONE.
    pub fn create(&self, info: InstanceInfo) -> ServiceResult<Operation<Instance>> {
        info.id.validate()?;
        let mut instances = self.instances.write().expect("instances lock");
        if instances.iter().any(|i| i.id == info.id) {
            return Err(ServiceError::AlreadyExists(format!("instance {}", info.id)));
        }
        let config = self.catalog.get(&info.config)?.id.clone();
        if info.node_count == 0 {
            return Err(ServiceError::InvalidArgument(
                "node count must be positive".into(),
            ));
        }

        let name = info.id.to_string();
        let instance = Instance {
            name: name.clone(),
            id: info.id,
            config,
            display_name: info.display_name,
            node_count: info.node_count,
            labels: info.labels,
            state: InstanceState::Ready,
            create_time: epoch_secs(),
        };
        instances.push(instance.clone());
        info!(instance = %name, config = %instance.config, "instance created");
        Ok(self
            .scheduler
            .completed(&name, OperationKind::CreateInstance, &name, Ok(instance)))
    }

    /// Apply the masked fields of `info`; the returned operation is already DONE.
    pub fn update(
        &self,
        info: InstanceInfo,
        mask: &[InstanceField],
    ) -> ServiceResult<Operation<Instance>> {
        if mask.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "update mask must name at least one field".into(),
            ));
        }
        let mut instances = self.instances.write().expect("instances lock");
        let instance = instances
            .iter_mut()
            .find(|i| i.id == info.id)
            .ok_or_else(|| ServiceError::NotFound(format!("instance {}", info.id)))?;

        // Validate everything before touching the stored instance.
        let config = if mask.contains(&InstanceField::Config) {
            Some(self.catalog.get(&info.config)?.id.clone())
        } else {
            None
        };
        if mask.contains(&InstanceField::NodeCount) && info.node_count == 0 {
            return Err(ServiceError::InvalidArgument(
                "node count must be positive".into(),
            ));
        }

        for field in mask {
            match field {
                InstanceField::DisplayName => instance.display_name = info.display_name.clone(),
                InstanceField::NodeCount => instance.node_count = info.node_count,
                InstanceField::Labels => instance.labels = info.labels.clone(),
                InstanceField::Config => {
                    if let Some(config) = &config {
                        instance.config = config.clone();
                    }
                }
            }
        }
        let updated = instance.clone();
        info!(instance = %updated.name, fields = mask.len(), "instance updated");
        Ok(self.scheduler.completed(
            &updated.name,
            OperationKind::UpdateInstance,
            &updated.name,
            Ok(updated.clone()),
        ))
    }

    pub fn get(&self, id: &InstanceName) -> ServiceResult<Instance> {
        self.instances
            .read()
            .expect("instances lock")
            .iter()
            .find(|i| &i.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("instance {id}")))
    }

    /// Instances of a project, in creation order.
    pub fn list(&self, project: &str) -> Vec<Instance> {
        self.instances
            .read()
            .expect("instances lock")
            .iter()
            .filter(|i| i.id.project == project)
            .cloned()
            .collect()
    }

    /// Run `f` while the instance is guaranteed to stay registered.
    ///
    /// Holds the instances read lock for the duration of `f`, so callers
    /// that take the databases lock inside `f` keep the instances-first order.
    pub fn with_instance<R>(
        &self,
        id: &InstanceName,
        f: impl FnOnce(&Instance) -> ServiceResult<R>,
    ) -> ServiceResult<R> {
        let instances = self.instances.read().expect("instances lock");
        let instance = instances
            .iter()
            .find(|i| &i.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("instance {id}")))?;
        f(instance)
    }

    /// Remove an instance, running `cascade` under the instances write lock.
    ///
    /// Operations on the instance and its databases leave the log with it.
    pub fn delete(&self, id: &InstanceName, cascade: impl FnOnce(&Instance)) -> ServiceResult<()> {
        let mut instances = self.instances.write().expect("instances lock");
        let position = instances
            .iter()
            .position(|i| &i.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("instance {id}")))?;
        let removed = instances.remove(position);
        cascade(&removed);
        self.scheduler.forget(&removed.name);
        debug!(remaining = instances.len(), "instance removed from registry");
        info!(instance = %removed.name, "instance deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanemu_core::config::OperationMode;
    use spanemu_core::{ErrorCode, SequentialNames};

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(
            Arc::new(InstanceConfigCatalog::new()),
            Arc::new(OperationScheduler::new(
                OperationMode::Inline,
                Arc::new(SequentialNames::new()),
            )),
        )
    }

    fn info(id: &str) -> InstanceInfo {
        InstanceInfo::new(InstanceName::new("test-project", id), "regional-europe-west1")
            .with_display_name("Test instance")
    }

    #[test]
    fn create_returns_done_operation() {
        let registry = registry();
        let op = registry.create(info("test-instance")).unwrap();
        assert!(op.is_done());
        let instance = op.result().unwrap().unwrap();
        assert_eq!(instance.state, InstanceState::Ready);
        assert_eq!(instance.name, "projects/test-project/instances/test-instance");
        assert!(
            op.name()
                .starts_with("projects/test-project/instances/test-instance/operations/")
        );
    }

    #[test]
    fn duplicate_is_checked_before_config() {
        let registry = registry();
        registry.create(info("test-instance")).unwrap();
        let mut dup = info("test-instance");
        dup.config = "norway".into();
        assert_eq!(registry.create(dup).unwrap_err().code(), ErrorCode::AlreadyExists);
    }

    #[test]
    fn unknown_config_is_not_found() {
        let mut bad = info("test-instance");
        bad.config = "norway".into();
        assert_eq!(registry().create(bad).unwrap_err().code(), ErrorCode::NotFound);
    }

    #[test]
    fn short_config_id_resolves() {
        let registry = registry();
        let mut short = info("test-instance");
        short.config = "europe-west1".into();
        let instance = registry.create(short).unwrap().result().unwrap().unwrap();
        assert_eq!(instance.config, "regional-europe-west1");
    }

    #[test]
    fn update_applies_only_masked_fields() {
        let registry = registry();
        registry.create(info("test-instance")).unwrap();
        let change = info("test-instance")
            .with_display_name("Renamed")
            .with_node_count(3);
        let updated = registry
            .update(change, &[InstanceField::NodeCount])
            .unwrap()
            .result()
            .unwrap()
            .unwrap();
        assert_eq!(updated.node_count, 3);
        assert_eq!(updated.display_name, "Test instance");
    }

    #[test]
    fn update_rejects_empty_mask_and_zero_nodes() {
        let registry = registry();
        registry.create(info("test-instance")).unwrap();
        assert_eq!(
            registry.update(info("test-instance"), &[]).unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
        let zero = info("test-instance").with_node_count(0);
        assert_eq!(
            registry
                .update(zero, &[InstanceField::NodeCount])
                .unwrap_err()
                .code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            registry
                .update(info("missing"), &[InstanceField::DisplayName])
                .unwrap_err()
                .code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn list_is_per_project_in_creation_order() {
        let registry = registry();
        registry.create(info("bravo")).unwrap();
        registry.create(info("alpha")).unwrap();
        registry
            .create(InstanceInfo::new(InstanceName::new("other", "charlie"), "nam-eur-asia1"))
            .unwrap();
        let ids: Vec<String> = registry
            .list("test-project")
            .into_iter()
            .map(|i| i.id.instance)
            .collect();
        assert_eq!(ids, vec!["bravo", "alpha"]);
    }

    #[test]
    fn delete_runs_cascade() {
        let registry = registry();
        registry.create(info("test-instance")).unwrap();
        let id = InstanceName::new("test-project", "test-instance");
        let mut cascaded = None;
        registry
            .delete(&id, |instance| cascaded = Some(instance.name.clone()))
            .unwrap();
        assert_eq!(
            cascaded.as_deref(),
            Some("projects/test-project/instances/test-instance")
        );
        assert_eq!(registry.get(&id).unwrap_err().code(), ErrorCode::NotFound);
        assert_eq!(
            registry.delete(&id, |_| {}).unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn invalid_instance_id_is_rejected() {
        assert_eq!(
            registry().create(info("Bad_Id")).unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn concurrent_creates_of_one_id_admit_exactly_one() {
        let registry = registry();
        let outcomes: Vec<ServiceResult<Operation<Instance>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.create(info("test-instance"))))
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
        assert_eq!(registry.list("test-project").len(), 1);
    }

    #[test]
    fn concurrent_deletes_of_one_id_succeed_once() {
        let registry = registry();
        registry.create(info("test-instance")).unwrap();
        let id = InstanceName::new("test-project", "test-instance");
        let cascades = std::sync::atomic::AtomicUsize::new(0);
        let outcomes: Vec<ServiceResult<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        registry.delete(&id, |_| {
                            cascades.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(cascades.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
