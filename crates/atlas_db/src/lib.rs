//! Atlas Database Layer
//!
//! Connections, schema introspection and migration directories used by the
//! atlas configuration extensions.
//!
//! # Architecture
//!
//! - **One connection per driver** - opened for a single operation, closed when it ends
//! - **Realm model** - introspected and desired schemas share the same types
//! - **Diff then plan** - a [`SchemaDiff`] is rendered into SQL per [`Dialect`]
//! - **Migration directories** - flat files plus an `atlas.sum` checksum
//!
//! # Usage
//!
//! ```rust,ignore
//! use atlas_db::{driver, diff_realms};
//!
//! let mut db = driver::open("sqlite://app.db").await?;
//! let current = db.inspect_realm().await?;
//! db.close().await?;
//! ```

pub mod dialect;
pub mod diff;
pub mod driver;
pub mod error;
pub mod migrate;
pub mod plan;
pub mod schema;

pub use dialect::Dialect;
pub use diff::{Change, SchemaDiff, TableDiff, diff_realms};
pub use driver::{Driver, Rows};
pub use error::{DbError, DbResult};
pub use migrate::{Dir, File, GolangMigrateDir, HashFile, LocalDir, MemDir};
pub use plan::{Plan, PlannedChange, plan_changes};
pub use schema::{Column, Realm, Schema, Table};
