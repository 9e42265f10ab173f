//! The construction facade.
//!
//! A `HierarchyBuilder` runs one construction pass: knowledge bases are
//! declared, nodes are written through to the node table while each
//! knowledge base's `PathStack` tracks the open header nodes, and
//! `check_installation` closes the pass by reconciling every field table.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::path_stack::{PathStack, SEPARATOR};
use crate::config::StoreConfig;
use crate::db::link_repo::{self, LinkMountRow, LinkRow};
use crate::db::node_repo::{self, NewNode};
use crate::db::{ensure_schema, Database, TableNames};
use crate::error::{KbError, Result};
use crate::fields::{FieldCatalog, FieldKind};
use crate::installation::InstallationValidator;
use crate::query::QueryEngine;
use crate::reconcile::{self, ReconcileReport, ReconcilerSet};

pub struct HierarchyBuilder {
    db: Database,
    tables: TableNames,
    stacks: BTreeMap<String, PathStack>,
    active: Option<String>,
    reconcilers: ReconcilerSet,
}

impl HierarchyBuilder {
    /// Starts a construction pass. Prior declarations of the schema are
    /// cleared; field tables are left for the reconcilers.
    pub fn new(db: Database, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let tables = db.with_conn(|conn| ensure_schema(conn, &config.schema))?;
        node_repo::clear_declarations(&db, &tables)?;

        log::info!("Construction pass started for schema '{}'", config.schema);

        Ok(Self {
            db,
            tables,
            stacks: BTreeMap::new(),
            active: None,
            reconcilers: ReconcilerSet::new(config.delete_batch_size),
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub fn active_kb(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn stack(&self, kb: &str) -> Option<&PathStack> {
        self.stacks.get(kb)
    }

    pub fn stacks(&self) -> impl Iterator<Item = &PathStack> {
        self.stacks.values()
    }

    /// Declares a knowledge base and makes it active.
    pub fn add_kb(&mut self, name: &str, description: &str) -> Result<()> {
        validate_segment("knowledge base name", name)?;
        if self.stacks.contains_key(name) {
            return Err(KbError::duplicate("knowledge base", name));
        }
        node_repo::insert_kb(&self.db, &self.tables, name, description)?;
        self.stacks.insert(name.to_string(), PathStack::new(name));
        self.active = Some(name.to_string());
        log::debug!("Declared knowledge base '{}'", name);
        Ok(())
    }

    pub fn select_kb(&mut self, name: &str) -> Result<()> {
        if !self.stacks.contains_key(name) {
            return Err(KbError::not_found("knowledge base", name));
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    /// The materialized path of the active stack.
    pub fn current_path(&self) -> Result<String> {
        Ok(self.active_stack()?.path())
    }

    /// Writes a header node and leaves it open on the stack.
    pub fn add_header_node(
        &mut self,
        link: &str,
        name: &str,
        properties: Value,
        data: Value,
        description: &str,
    ) -> Result<String> {
        let path = self.write_node(link, name, properties, data, description)?;
        self.active_stack_mut()?.enter(link, name);
        Ok(path)
    }

    /// Writes a leaf node; the stack depth is unchanged.
    pub fn add_info_node(
        &mut self,
        link: &str,
        name: &str,
        properties: Value,
        data: Value,
        description: &str,
    ) -> Result<String> {
        self.write_node(link, name, properties, data, description)
    }

    /// Closes the header node `(link, name)`.
    pub fn leave_header_node(&mut self, link: &str, name: &str) -> Result<()> {
        self.active_stack_mut()?.leave(link, name)
    }

    /// Enters a header node, runs `f`, and leaves the node again.
    pub fn with_header_node<F, T>(
        &mut self,
        link: &str,
        name: &str,
        properties: Value,
        data: Value,
        description: &str,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.add_header_node(link, name, properties, data, description)?;
        match f(self) {
            Ok(out) => {
                self.leave_header_node(link, name)?;
                Ok(out)
            }
            Err(e) => {
                if let Err(leave_err) = self.leave_header_node(link, name) {
                    log::debug!("Header '{}.{}' left open after error: {}", link, name, leave_err);
                }
                Err(e)
            }
        }
    }

    /// Records `link_name` as pointing at the current path.
    pub fn add_link_node(&mut self, link_name: &str) -> Result<()> {
        let stack = self.active_stack()?;
        let row = LinkRow {
            link_name: link_name.to_string(),
            knowledge_base: stack.root().to_string(),
            parent_path: stack.path(),
        };
        link_repo::insert_link(&self.db, &self.tables, &row)?;
        Ok(())
    }

    /// Records the current path as a mount point of `link_name`.
    pub fn add_link_mount(&mut self, link_name: &str, description: &str) -> Result<()> {
        let stack = self.active_stack()?;
        let row = LinkMountRow {
            link_name: link_name.to_string(),
            knowledge_base: stack.root().to_string(),
            mount_path: stack.path(),
            description: description.to_string(),
        };
        link_repo::insert_mount(&self.db, &self.tables, &row)?;
        Ok(())
    }

    pub fn add_status_field(
        &mut self,
        key: &str,
        properties: Value,
        description: &str,
        initial_data: Value,
    ) -> Result<String> {
        let properties = object_or_empty("properties", properties)?;
        let initial_data = object_or_empty("initial_data", initial_data)?;
        self.add_field(FieldKind::Status, key, properties, initial_data, description)
    }

    pub fn add_job_field(&mut self, key: &str, length: usize, description: &str) -> Result<String> {
        self.add_sized_field(FieldKind::Job, key, length, description)
    }

    pub fn add_stream_field(
        &mut self,
        key: &str,
        length: usize,
        description: &str,
    ) -> Result<String> {
        self.add_sized_field(FieldKind::Stream, key, length, description)
    }

    pub fn add_rpc_client_field(
        &mut self,
        key: &str,
        queue_depth: usize,
        description: &str,
    ) -> Result<String> {
        self.add_sized_field(FieldKind::RpcClient, key, queue_depth, description)
    }

    pub fn add_rpc_server_field(
        &mut self,
        key: &str,
        queue_depth: usize,
        description: &str,
    ) -> Result<String> {
        self.add_sized_field(FieldKind::RpcServer, key, queue_depth, description)
    }

    /// Runs the reconciler of one kind.
    ///
    /// Fails with `NotFound` when the kind has no declarations; the table
    /// is then left untouched.
    pub fn reconcile_kind(&self, kind: FieldKind) -> Result<ReconcileReport> {
        let declared = self
            .db
            .with_transaction(|tx| FieldCatalog::load(tx, &self.tables, kind))?;
        if declared.is_empty() {
            return Err(KbError::not_found("field declarations", kind.to_string()));
        }
        reconcile::run(&self.db, &self.tables, self.reconcilers.get(kind))
    }

    /// Verifies every stack is closed, then reconciles all field kinds.
    pub fn check_installation(&self) -> Result<Vec<ReconcileReport>> {
        InstallationValidator::new(&self.db, &self.tables, &self.reconcilers).run(self.stacks())
    }

    /// A query engine over the current declarations.
    pub fn query(&self) -> Result<QueryEngine> {
        QueryEngine::new(&self.db, &self.tables)
    }

    fn add_sized_field(
        &mut self,
        kind: FieldKind,
        key: &str,
        size: usize,
        description: &str,
    ) -> Result<String> {
        let size_key = kind.size_key().unwrap_or("length");
        if size == 0 {
            return Err(KbError::Validation(format!(
                "{} field '{}': {} must be at least 1",
                kind, key, size_key
            )));
        }
        let mut properties = Map::new();
        properties.insert(size_key.to_string(), Value::from(size));
        self.add_field(kind, key, properties, Map::new(), description)
    }

    fn add_field(
        &mut self,
        kind: FieldKind,
        key: &str,
        properties: Map<String, Value>,
        data: Map<String, Value>,
        description: &str,
    ) -> Result<String> {
        let path = self.add_info_node(
            kind.label(),
            key,
            Value::Object(properties),
            Value::Object(data),
            description,
        )?;
        log::debug!("Declared {} field {}", kind, path);
        Ok(path)
    }

    fn write_node(
        &self,
        link: &str,
        name: &str,
        properties: Value,
        data: Value,
        description: &str,
    ) -> Result<String> {
        validate_segment("link", link)?;
        validate_segment("name", name)?;
        let mut properties = object_or_empty("properties", properties)?;
        let data = object_or_empty("data", data)?;
        properties.insert("description".to_string(), Value::from(description));

        let stack = self.active_stack()?;
        let path = stack.child_path(link, name);
        if node_repo::exists(&self.db, &self.tables, &path)? {
            return Err(KbError::duplicate("path", path));
        }

        node_repo::insert(
            &self.db,
            &self.tables,
            &NewNode {
                knowledge_base: stack.root(),
                label: link,
                name,
                properties: &Value::Object(properties),
                data: &Value::Object(data),
                path: &path,
            },
        )?;
        Ok(path)
    }

    fn active_stack(&self) -> Result<&PathStack> {
        let active = self
            .active
            .as_deref()
            .ok_or_else(|| KbError::not_found("knowledge base", "<none selected>"))?;
        self.stacks
            .get(active)
            .ok_or_else(|| KbError::not_found("knowledge base", active))
    }

    fn active_stack_mut(&mut self) -> Result<&mut PathStack> {
        let active = self
            .active
            .clone()
            .ok_or_else(|| KbError::not_found("knowledge base", "<none selected>"))?;
        self.stacks
            .get_mut(&active)
            .ok_or_else(|| KbError::not_found("knowledge base", active))
    }
}

/// Segments are opaque but may not be empty or contain the separator.
fn validate_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(KbError::Validation(format!("{} must not be empty", what)));
    }
    if segment.contains(SEPARATOR) {
        return Err(KbError::Validation(format!(
            "{} '{}' must not contain '{}'",
            what, segment, SEPARATOR
        )));
    }
    Ok(())
}

fn object_or_empty(what: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(KbError::Validation(format!(
            "{} must be a JSON object, got {}",
            what, other
        ))),
    }
}
