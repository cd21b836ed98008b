//! spanemu-service: Admin and data services of the Spanner emulator.
//!
//! ```text
//! Emulator
//!   ├── InstanceConfigCatalog (fixed region configs)
//!   ├── OperationScheduler (operation handles + log)
//!   ├── InstanceRegistry (instances per project)
//!   └── DatabaseRegistry (databases per instance)
//!       └── StorageEngine per database (via spanemu-storage)
//! ```
//!
//! Lock order is instances before databases; every registry guards its map
//! with a `std::sync::RwLock`.

pub mod catalog;
pub mod client;
pub mod database;
pub mod emulator;
pub mod error;
pub mod instance;
pub mod operation;

pub use catalog::{InstanceConfig, InstanceConfigCatalog};
pub use client::{DatabaseClient, TransactionContext};
pub use database::{Database, DatabaseRegistry, DatabaseState};
pub use emulator::Emulator;
pub use error::{ServiceError, ServiceResult};
pub use instance::{Instance, InstanceField, InstanceInfo, InstanceRegistry, InstanceState};
pub use operation::{
    Operation, OperationKind, OperationScheduler, OperationStatus, OperationSummary,
};
