//! Atlas Core - Data Sources and Schema State
//!
//! This crate lets configuration documents pull in external data at
//! evaluation time (runtime variables, query results, rendered or remote
//! migration directories), and routes schema sources to the loaders and
//! differs that turn them into migrations.

pub mod cloud;
pub mod context;
pub mod error;
pub mod eval;
pub mod providers;
pub mod registry;
pub mod state;
pub mod vdir;

pub use cloud::{CloudClient, CloudConfig};
pub use context::EvalContext;
pub use error::{CoreError, ProviderError, Result};
pub use eval::{Document, EvalOptions, Evaluation, eval};
pub use registry::{DataSource, DataSourceRegistry, DynamicDataSource};
pub use state::{DiffOptions, Differ, EntSource, LoadOptions, StateLoader, StateRegistry};
pub use vdir::VirtualDirs;
