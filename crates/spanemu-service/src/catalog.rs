//! InstanceConfigCatalog: The fixed set of region configurations.

use serde::{Deserialize, Serialize};
use spanemu_core::names::instance_config_name;

use crate::error::{ServiceError, ServiceResult};

const BUILTIN: [(&str, &str); 12] = [
    ("regional-asia-east1", "Taiwan"),
    ("regional-asia-northeast1", "Tokyo"),
    ("regional-asia-south1", "Mumbai"),
    ("regional-australia-southeast1", "Sydney"),
    ("regional-europe-west1", "Belgium"),
    ("regional-europe-west2", "London"),
    ("regional-europe-west4", "Netherlands"),
    ("regional-northamerica-northeast1", "Montréal"),
    ("regional-us-central1", "Iowa"),
    ("regional-us-east1", "South Carolina"),
    ("regional-us-east4", "Northern Virginia"),
    ("nam-eur-asia1", "North America, Europe, and Asia"),
];

/// A named placement configuration instances are created against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub id: String,
    pub display_name: String,
}

impl InstanceConfig {
    /// Full resource name within a project.
    pub fn name(&self, project: &str) -> String {
        instance_config_name(project, &self.id)
    }
}

/// Read-only catalog, identical for every project.
#[derive(Debug, Clone)]
pub struct InstanceConfigCatalog {
    configs: Vec<InstanceConfig>,
}

impl Default for InstanceConfigCatalog {
    fn default() -> Self {
        Self {
            configs: BUILTIN
                .iter()
                .map(|(id, display_name)| InstanceConfig {
                    id: id.to_string(),
                    display_name: display_name.to_string(),
                })
                .collect(),
        }
    }
}

impl InstanceConfigCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[InstanceConfig] {
        &self.configs
    }

    /// Look up a config by id, full resource name, or bare region
    /// (`europe-west1` finds `regional-europe-west1`).
    pub fn get(&self, id: &str) -> ServiceResult<&InstanceConfig> {
        let id = id.rsplit_once("/instanceConfigs/").map_or(id, |(_, id)| id);
        self.configs
            .iter()
            .find(|c| c.id == id)
            .or_else(|| {
                let regional = format!("regional-{id}");
                self.configs.iter().find(|c| c.id == regional)
            })
            .ok_or_else(|| ServiceError::NotFound(format!("instance config {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanemu_core::ErrorCode;

    #[test]
    fn lists_all_configs() {
        let catalog = InstanceConfigCatalog::new();
        assert_eq!(catalog.list().len(), 12);
        assert_eq!(catalog.list()[0].id, "regional-asia-east1");
    }

    #[test]
    fn lookup_forms() {
        let catalog = InstanceConfigCatalog::new();
        assert_eq!(catalog.get("regional-europe-west1").unwrap().display_name, "Belgium");
        assert_eq!(catalog.get("europe-west1").unwrap().id, "regional-europe-west1");
        assert_eq!(
            catalog
                .get("projects/p/instanceConfigs/nam-eur-asia1")
                .unwrap()
                .display_name,
            "North America, Europe, and Asia"
        );
        assert_eq!(
            catalog.get("regional-northamerica-northeast1").unwrap().display_name,
            "Montréal"
        );
    }

    #[test]
    fn unknown_config_is_not_found() {
        let err = InstanceConfigCatalog::new().get("norway").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn config_resource_name() {
        let catalog = InstanceConfigCatalog::new();
        assert_eq!(
            catalog.get("regional-us-east4").unwrap().name("test-project"),
            "projects/test-project/instanceConfigs/regional-us-east4"
        );
    }
}
