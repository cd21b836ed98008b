pub mod config;
pub mod names;
pub mod naming;
pub mod types;

pub use config::EmulatorConfig;
pub use names::{DatabaseName, InstanceName, NameError};
pub use naming::{NameGenerator, RandomNames, SequentialNames};
pub use types::*;
