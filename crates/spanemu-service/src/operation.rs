//! Long-running operations.
//!
//! Admin calls that change resources return an [`Operation`] handle as soon
//! as validation passes. The work itself runs either on the calling thread
//! (`OperationMode::Inline`) or on tokio's blocking pool
//! (`OperationMode::Background`). Each operation moves from RUNNING to DONE
//! exactly once; its outcome is published through a `watch` channel, so any
//! number of handles can poll or await it.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use spanemu_core::config::OperationMode;
use spanemu_core::{ErrorDetail, NameGenerator, epoch_secs};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};

const OPERATION_ID_PREFIX: &str = "_auto_op_";

/// What an operation is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateInstance,
    UpdateInstance,
    CreateDatabase,
    UpdateDatabaseDdl,
}

/// Progress of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus<T> {
    Running,
    Succeeded(T),
    Failed(ServiceError),
}

impl<T> OperationStatus<T> {
    pub fn is_done(&self) -> bool {
        !matches!(self, OperationStatus::Running)
    }
}

impl<T: Clone> OperationStatus<T> {
    fn outcome(&self) -> Option<ServiceResult<T>> {
        match self {
            OperationStatus::Running => None,
            OperationStatus::Succeeded(value) => Some(Ok(value.clone())),
            OperationStatus::Failed(e) => Some(Err(e.clone())),
        }
    }
}

/// Type-erased view of an operation, kept in the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub name: String,
    pub kind: OperationKind,
    /// Resource the operation acts on.
    pub target: String,
    pub done: bool,
    pub error: Option<ErrorDetail>,
    pub started_at: u64,
    pub finished_at: Option<u64>,
}

/// Handle to a long-running operation producing a `T`.
#[derive(Debug, Clone)]
pub struct Operation<T> {
    name: String,
    kind: OperationKind,
    target: String,
    rx: watch::Receiver<OperationStatus<T>>,
}

impl<T: Clone> Operation<T> {
    /// `{parent}/operations/{id}`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status(&self) -> OperationStatus<T> {
        self.rx.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_done()
    }

    pub fn is_successful(&self) -> bool {
        matches!(*self.rx.borrow(), OperationStatus::Succeeded(_))
    }

    /// The outcome, or `None` while still running.
    pub fn result(&self) -> Option<ServiceResult<T>> {
        self.rx.borrow().outcome()
    }

    /// Wait for the operation to finish and return its outcome.
    pub async fn wait(&self) -> ServiceResult<T> {
        if let Some(outcome) = self.result() {
            return outcome;
        }
        let mut rx = self.rx.clone();
        let status = rx
            .wait_for(OperationStatus::is_done)
            .await
            .map_err(|_| ServiceError::Internal(format!("operation {} was abandoned", self.name)))?;
        status
            .outcome()
            .unwrap_or_else(|| Err(ServiceError::Internal("operation still running".into())))
    }
}

/// Operation summaries keyed by full name; `seq` records issue order.
#[derive(Default)]
struct LogState {
    next_seq: u64,
    entries: BTreeMap<String, (u64, OperationSummary)>,
}

impl LogState {
    /// Names at or below `prefix`, in key order.
    fn names_under(&self, prefix: &str) -> impl Iterator<Item = &String> {
        self.entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(name, _)| name)
            .take_while(move |name| name.starts_with(prefix))
    }
}

type OperationLog = Arc<RwLock<LogState>>;

/// Issues operation handles and runs their work.
pub struct OperationScheduler {
    mode: OperationMode,
    names: Arc<dyn NameGenerator>,
    log: OperationLog,
}

impl OperationScheduler {
    pub fn new(mode: OperationMode, names: Arc<dyn NameGenerator>) -> Self {
        Self {
            mode,
            names,
            log: Arc::new(RwLock::new(LogState::default())),
        }
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    /// Start `work` and return its handle immediately.
    ///
    /// Background mode falls back to inline when called outside a tokio
    /// runtime. A panic in `work` fails the operation with INTERNAL.
    pub fn schedule<T, F>(
        &self,
        parent: &str,
        kind: OperationKind,
        target: &str,
        work: F,
    ) -> Operation<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> ServiceResult<T> + Send + 'static,
    {
        let (tx, operation) = self.begin(parent, kind, target);
        let log = self.log.clone();
        let name = operation.name.clone();

        let handle = match self.mode {
            OperationMode::Background => tokio::runtime::Handle::try_current().ok(),
            OperationMode::Inline => None,
        };
        match handle {
            Some(handle) => {
                debug!(operation = %name, "operation scheduled on worker");
                handle.spawn_blocking(move || finish(&log, &tx, &name, run_guarded(work)));
            }
            None => finish(&log, &tx, &name, run_guarded(work)),
        }
        operation
    }

    /// Issue an operation that is DONE at birth with `outcome`.
    pub fn completed<T>(
        &self,
        parent: &str,
        kind: OperationKind,
        target: &str,
        outcome: ServiceResult<T>,
    ) -> Operation<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (tx, operation) = self.begin(parent, kind, target);
        finish(&self.log, &tx, &operation.name, outcome);
        operation
    }

    /// Look up an operation in the log by full name.
    pub fn get(&self, name: &str) -> ServiceResult<OperationSummary> {
        self.log
            .read()
            .expect("operation log lock")
            .entries
            .get(name)
            .map(|(_, summary)| summary.clone())
            .ok_or_else(|| ServiceError::NotFound(format!("operation {name}")))
    }

    /// Operations issued under `parent`, oldest first.
    pub fn list(&self, parent: &str) -> Vec<OperationSummary> {
        let prefix = format!("{parent}/operations/");
        let log = self.log.read().expect("operation log lock");
        let mut found: Vec<&(u64, OperationSummary)> = log
            .names_under(&prefix)
            .filter_map(|name| log.entries.get(name))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, summary)| summary.clone()).collect()
    }

    /// Drop the log entries of `resource` and everything beneath it.
    ///
    /// Called when the resource is deleted; returns how many were removed.
    pub fn forget(&self, resource: &str) -> usize {
        let prefix = format!("{resource}/");
        let mut log = self.log.write().expect("operation log lock");
        let doomed: Vec<String> = log.names_under(&prefix).cloned().collect();
        for name in &doomed {
            log.entries.remove(name);
        }
        if !doomed.is_empty() {
            debug!(%resource, removed = doomed.len(), "operations forgotten");
        }
        doomed.len()
    }

    fn begin<T: Clone>(
        &self,
        parent: &str,
        kind: OperationKind,
        target: &str,
    ) -> (watch::Sender<OperationStatus<T>>, Operation<T>) {
        let name = format!(
            "{parent}/operations/{}",
            self.names.next_name(OPERATION_ID_PREFIX)
        );
        {
            let mut log = self.log.write().expect("operation log lock");
            let seq = log.next_seq;
            log.next_seq += 1;
            log.entries.insert(
                name.clone(),
                (
                    seq,
                    OperationSummary {
                        name: name.clone(),
                        kind,
                        target: target.to_string(),
                        done: false,
                        error: None,
                        started_at: epoch_secs(),
                        finished_at: None,
                    },
                ),
            );
        }
        let (tx, rx) = watch::channel(OperationStatus::Running);
        let operation = Operation {
            name,
            kind,
            target: target.to_string(),
            rx,
        };
        (tx, operation)
    }
}

fn run_guarded<T, F>(work: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T>,
{
    catch_unwind(AssertUnwindSafe(work))
        .unwrap_or_else(|_| Err(ServiceError::Internal("operation worker panicked".into())))
}

/// Record the terminal state in the log, then publish it to handles.
fn finish<T>(
    log: &OperationLog,
    tx: &watch::Sender<OperationStatus<T>>,
    name: &str,
    outcome: ServiceResult<T>,
) {
    let error = outcome.as_ref().err().map(ServiceError::detail);
    match &error {
        Some(detail) => warn!(operation = %name, code = %detail.code, error = %detail.message, "operation failed"),
        None => info!(operation = %name, "operation succeeded"),
    }
    if let Some((_, summary)) = log
        .write()
        .expect("operation log lock")
        .entries
        .get_mut(name)
    {
        summary.done = true;
        summary.error = error;
        summary.finished_at = Some(epoch_secs());
    }
    tx.send_replace(match outcome {
        Ok(value) => OperationStatus::Succeeded(value),
        Err(e) => OperationStatus::Failed(e),
    });
}
