//! Construction of the node hierarchy.

pub mod builder;
pub mod manifest;
pub mod path_stack;

pub use builder::HierarchyBuilder;
pub use manifest::{load_manifest, Manifest, NodeDecl};
pub use path_stack::{PathStack, SEPARATOR};
