//! Resource names: `projects/{p}/instances/{i}/databases/{d}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum NameError {
    #[error("invalid resource name: {0}")]
    InvalidName(String),
    #[error("invalid instance id: {0}")]
    InvalidInstanceId(String),
    #[error("invalid database id: {0}")]
    InvalidDatabaseId(String),
}

/// Fully qualified instance name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceName {
    pub project: String,
    pub instance: String,
}

impl InstanceName {
    pub fn new(project: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
        }
    }

    /// Parse `projects/{project}/instances/{instance}`.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let parts: Vec<&str> = name.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "instances", instance]
                if !project.is_empty() && !instance.is_empty() =>
            {
                Ok(Self::new(*project, *instance))
            }
            _ => Err(NameError::InvalidName(name.to_string())),
        }
    }

    /// Check the instance id against `[a-z][-a-z0-9]*[a-z0-9]`, 2 to 64 chars.
    pub fn validate(&self) -> Result<(), NameError> {
        if is_valid_id(&self.instance, 2, 64, |c| c == '-') {
            Ok(())
        } else {
            Err(NameError::InvalidInstanceId(self.instance.clone()))
        }
    }

    pub fn database(&self, database: impl Into<String>) -> DatabaseName {
        DatabaseName {
            instance: self.clone(),
            database: database.into(),
        }
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/instances/{}", self.project, self.instance)
    }
}

/// Fully qualified database name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatabaseName {
    pub instance: InstanceName,
    pub database: String,
}

impl DatabaseName {
    pub fn new(
        project: impl Into<String>,
        instance: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        InstanceName::new(project, instance).database(database)
    }

    /// Parse `projects/{p}/instances/{i}/databases/{d}`.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let (parent, database) = name
            .rsplit_once("/databases/")
            .ok_or_else(|| NameError::InvalidName(name.to_string()))?;
        if database.is_empty() || database.contains('/') {
            return Err(NameError::InvalidName(name.to_string()));
        }
        let instance =
            InstanceName::parse(parent).map_err(|_| NameError::InvalidName(name.to_string()))?;
        Ok(instance.database(database))
    }

    /// Check the database id against `[a-z][a-z0-9_-]*[a-z0-9]`, 2 to 30 chars.
    pub fn validate(&self) -> Result<(), NameError> {
        if is_valid_id(&self.database, 2, 30, |c| c == '-' || c == '_') {
            Ok(())
        } else {
            Err(NameError::InvalidDatabaseId(self.database.clone()))
        }
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/databases/{}", self.instance, self.database)
    }
}

/// Full resource name of an instance config.
pub fn instance_config_name(project: &str, config_id: &str) -> String {
    format!("projects/{project}/instanceConfigs/{config_id}")
}

fn is_valid_id(id: &str, min: usize, max: usize, extra: impl Fn(char) -> bool) -> bool {
    let len = id.chars().count();
    if len < min || len > max {
        return false;
    }
    let mut chars = id.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let last_ok = id
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    first_ok
        && last_ok
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || extra(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_round_trips_through_display() {
        let name = InstanceName::new("test-project", "test-instance");
        assert_eq!(name.to_string(), "projects/test-project/instances/test-instance");
        assert_eq!(InstanceName::parse(&name.to_string()).unwrap(), name);
    }

    #[test]
    fn database_name_parse() {
        let name =
            DatabaseName::parse("projects/p/instances/i1/databases/test-database").unwrap();
        assert_eq!(name.instance.project, "p");
        assert_eq!(name.instance.instance, "i1");
        assert_eq!(name.database, "test-database");
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(InstanceName::parse("projects/p/instance/i").is_err());
        assert!(InstanceName::parse("projects//instances/i").is_err());
        assert!(DatabaseName::parse("projects/p/instances/i/databases/").is_err());
        assert!(DatabaseName::parse("projects/p/databases/d").is_err());
    }

    #[test]
    fn id_validation() {
        assert!(InstanceName::new("p", "test-instance-42").validate().is_ok());
        assert!(InstanceName::new("p", "Test").validate().is_err());
        assert!(InstanceName::new("p", "trailing-").validate().is_err());
        assert!(InstanceName::new("p", "x").validate().is_err());
        assert!(DatabaseName::new("p", "i", "test_db").validate().is_ok());
        assert!(DatabaseName::new("p", "i", "1db").validate().is_err());
    }
}
