//! Request and response bodies.
//!
//! Cell values travel as plain JSON (`1`, `"fifty"`, `null`); column types
//! are applied by the storage engine when rows and keys are resolved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use spanemu_core::ErrorDetail;
use spanemu_service::{InstanceConfig, InstanceField, Operation, OperationStatus};
use spanemu_storage::{Key, KeyRange, KeySet, Mutation, StorageResult, Value, WriteOp};

#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub instance_id: String,
    pub config: String,
    pub display_name: Option<String>,
    pub node_count: Option<u32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Fields left out keep their current value. With no explicit mask, the
/// mask is every field present in the body.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateInstanceRequest {
    pub display_name: Option<String>,
    pub node_count: Option<u32>,
    pub config: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub update_mask: Vec<InstanceField>,
}

impl UpdateInstanceRequest {
    pub fn mask(&self) -> Vec<InstanceField> {
        if !self.update_mask.is_empty() {
            return self.update_mask.clone();
        }
        let mut mask = Vec::new();
        if self.display_name.is_some() {
            mask.push(InstanceField::DisplayName);
        }
        if self.node_count.is_some() {
            mask.push(InstanceField::NodeCount);
        }
        if self.config.is_some() {
            mask.push(InstanceField::Config);
        }
        if self.labels.is_some() {
            mask.push(InstanceField::Labels);
        }
        mask
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDatabaseRequest {
    pub database_id: String,
    #[serde(default)]
    pub extra_statements: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDdlRequest {
    pub statements: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DdlResponse {
    pub statements: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySetBody {
    #[default]
    All,
    Key(Vec<serde_json::Value>),
    Prefix(Vec<serde_json::Value>),
    Range {
        start: Vec<serde_json::Value>,
        end: Vec<serde_json::Value>,
        #[serde(default = "closed")]
        start_closed: bool,
        #[serde(default)]
        end_closed: bool,
    },
}

fn closed() -> bool {
    true
}

fn key(parts: &[serde_json::Value]) -> StorageResult<Key> {
    parts
        .iter()
        .map(Value::from_json)
        .collect::<StorageResult<Vec<Value>>>()
        .map(Key::new)
}

impl KeySetBody {
    pub fn to_key_set(&self) -> StorageResult<KeySet> {
        Ok(match self {
            KeySetBody::All => KeySet::all(),
            KeySetBody::Key(parts) => KeySet::single_key(key(parts)?),
            KeySetBody::Prefix(parts) => KeySet::prefix_range(key(parts)?),
            KeySetBody::Range {
                start,
                end,
                start_closed,
                end_closed,
            } => KeySet::range(KeyRange {
                start: key(start)?,
                start_closed: *start_closed,
                end: key(end)?,
                end_closed: *end_closed,
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadBody {
    pub table: String,
    pub index: Option<String>,
    #[serde(default)]
    pub key_set: KeySetBody,
    pub columns: Vec<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct WriteBody {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationBody {
    Insert(WriteBody),
    Update(WriteBody),
    InsertOrUpdate(WriteBody),
    Replace(WriteBody),
    Delete {
        table: String,
        #[serde(default)]
        key_set: KeySetBody,
    },
}

impl MutationBody {
    pub fn to_mutation(&self) -> StorageResult<Mutation> {
        let (op, body) = match self {
            MutationBody::Insert(body) => (WriteOp::Insert, body),
            MutationBody::Update(body) => (WriteOp::Update, body),
            MutationBody::InsertOrUpdate(body) => (WriteOp::InsertOrUpdate, body),
            MutationBody::Replace(body) => (WriteOp::Replace, body),
            MutationBody::Delete { table, key_set } => {
                return Ok(Mutation::delete(table.clone(), key_set.to_key_set()?));
            }
        };
        Ok(Mutation::Write {
            op,
            table: body.table.clone(),
            columns: body.columns.clone(),
            values: body
                .values
                .iter()
                .map(Value::from_json)
                .collect::<StorageResult<Vec<Value>>>()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CommitBody {
    pub mutations: Vec<MutationBody>,
}

#[derive(Debug, Serialize)]
pub struct InstanceConfigView {
    pub name: String,
    pub id: String,
    pub display_name: String,
}

impl InstanceConfigView {
    pub fn new(project: &str, config: &InstanceConfig) -> Self {
        Self {
            name: config.name(project),
            id: config.id.clone(),
            display_name: config.display_name.clone(),
        }
    }
}

/// Snapshot of an operation handle.
#[derive(Debug, Serialize)]
pub struct OperationView<T: Serialize> {
    pub name: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl<T: Serialize + Clone> From<&Operation<T>> for OperationView<T> {
    fn from(op: &Operation<T>) -> Self {
        let (done, response, error) = match op.status() {
            OperationStatus::Running => (false, None, None),
            OperationStatus::Succeeded(value) => (true, Some(value), None),
            OperationStatus::Failed(e) => (true, None, Some(e.detail())),
        };
        Self {
            name: op.name().to_string(),
            done,
            response,
            error,
        }
    }
}
