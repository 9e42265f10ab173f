pub mod config;
pub mod db;
pub mod error;
pub mod fields;
pub mod hierarchy;
pub mod installation;
pub mod query;
pub mod reconcile;
pub mod tables;
pub mod telemetry;

pub use config::{load_config, StoreConfig};
pub use db::{Database, DatabaseError, TableNames};
pub use error::{ConfigError, KbError, Result};
pub use fields::{FieldCatalog, FieldDeclaration, FieldKind};
pub use hierarchy::{load_manifest, HierarchyBuilder, Manifest, PathStack};
pub use installation::InstallationValidator;
pub use query::{PathOperator, PathPattern, QueryEngine};
pub use reconcile::{Reconcile, ReconcileReport, ReconcilerSet};
