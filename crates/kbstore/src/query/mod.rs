//! Chainable filtering over a snapshot of the node table.
//!
//! A `QueryEngine` loads every node once and indexes it by knowledge base,
//! label and name (first, penultimate and last path segment). Each
//! `search_*` call narrows the working result set; `clear_filters` starts
//! over. Later writes are not observed: build a new engine to see them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use crate::db::link_repo::{self, LinkMountRow, LinkRow};
use crate::db::node_repo::{self, NodeRow};
use crate::db::{Database, TableNames};
use crate::error::Result;
use crate::hierarchy::SEPARATOR;

pub mod pattern;

pub use pattern::{PathOperator, PathPattern};

pub struct QueryEngine {
    db: Database,
    tables: TableNames,
    nodes: BTreeMap<String, NodeRow>,
    by_kb: HashMap<String, BTreeSet<String>>,
    by_label: HashMap<String, BTreeSet<String>>,
    by_name: HashMap<String, BTreeSet<String>>,
    results: BTreeSet<String>,
}

impl QueryEngine {
    /// Snapshots the node table and builds the indexes.
    pub fn new(db: &Database, tables: &TableNames) -> Result<Self> {
        let rows = node_repo::list_all(db, tables)?;

        let mut by_kb: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut by_label: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut by_name: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut nodes = BTreeMap::new();

        for row in rows {
            let segments: Vec<&str> = row.path.split(SEPARATOR).collect();
            if let Some(kb) = segments.first() {
                by_kb.entry(kb.to_string()).or_default().insert(row.path.clone());
            }
            if segments.len() >= 3 {
                let label = segments[segments.len() - 2];
                let name = segments[segments.len() - 1];
                by_label.entry(label.to_string()).or_default().insert(row.path.clone());
                by_name.entry(name.to_string()).or_default().insert(row.path.clone());
            }
            nodes.insert(row.path.clone(), row);
        }

        log::debug!("Query engine indexed {} nodes", nodes.len());

        let results = nodes.keys().cloned().collect();
        Ok(Self {
            db: db.clone(),
            tables: tables.clone(),
            nodes,
            by_kb,
            by_label,
            by_name,
            results,
        })
    }

    /// Resets the working set to every node.
    pub fn clear_filters(&mut self) -> &mut Self {
        self.results = self.nodes.keys().cloned().collect();
        self
    }

    pub fn search_kb(&mut self, kb: &str) -> &mut Self {
        let hits = self.by_kb.get(kb).cloned().unwrap_or_default();
        self.intersect(&hits)
    }

    pub fn search_label(&mut self, label: &str) -> &mut Self {
        let hits = self.by_label.get(label).cloned().unwrap_or_default();
        self.intersect(&hits)
    }

    pub fn search_name(&mut self, name: &str) -> &mut Self {
        let hits = self.by_name.get(name).cloned().unwrap_or_default();
        self.intersect(&hits)
    }

    /// Keeps nodes whose properties carry `key`.
    pub fn search_property_key(&mut self, key: &str) -> &mut Self {
        self.retain(|node| node.properties.get(key).is_some())
    }

    /// Keeps nodes whose data payload has `key` equal to `value`.
    pub fn search_property_value(&mut self, key: &str, value: &Value) -> &mut Self {
        self.retain(|node| node.data.get(key) == Some(value))
    }

    /// Keeps `path` and its descendants, as stored at query time.
    pub fn search_starting_path(&mut self, path: &str) -> Result<&mut Self> {
        let hits: BTreeSet<String> = node_repo::descendant_paths(&self.db, &self.tables, path)?
            .into_iter()
            .collect();
        Ok(self.intersect(&hits))
    }

    pub fn search_path(&mut self, operator: PathOperator, argument: &str) -> Result<&mut Self> {
        match operator {
            PathOperator::Exact => Ok(self.retain(|node| node.path == argument)),
            PathOperator::Ancestor => {
                Ok(self.retain(|node| pattern::is_ancestor_or_self(&node.path, argument)))
            }
            PathOperator::Descendant => {
                Ok(self.retain(|node| pattern::is_ancestor_or_self(argument, &node.path)))
            }
            PathOperator::Match => {
                let compiled = PathPattern::parse(argument)?;
                Ok(self.retain(|node| compiled.matches(&node.path)))
            }
        }
    }

    /// Descriptions of the nodes in the working set, keyed by path. Nodes
    /// without a description map to the empty string.
    pub fn find_descriptions(&self) -> BTreeMap<String, String> {
        self.nodes()
            .map(|node| {
                (
                    node.path.clone(),
                    node.description().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    pub fn find_link_nodes(&self, link_name: &str) -> Result<Vec<LinkRow>> {
        Ok(link_repo::find_links(&self.db, &self.tables, link_name)?)
    }

    pub fn find_link_mounts(&self, link_name: &str) -> Result<Vec<LinkMountRow>> {
        Ok(link_repo::find_mounts(&self.db, &self.tables, link_name)?)
    }

    /// Paths in the working set, in path order.
    pub fn paths(&self) -> Vec<String> {
        self.results.iter().cloned().collect()
    }

    /// Nodes in the working set, in path order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRow> + '_ {
        self.results.iter().filter_map(|p| self.nodes.get(p))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Total nodes in the snapshot.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, path: &str) -> Option<&NodeRow> {
        self.nodes.get(path)
    }

    fn intersect(&mut self, hits: &BTreeSet<String>) -> &mut Self {
        self.results.retain(|p| hits.contains(p));
        self
    }

    fn retain<F>(&mut self, keep: F) -> &mut Self
    where
        F: Fn(&NodeRow) -> bool,
    {
        let nodes = &self.nodes;
        self.results
            .retain(|p| nodes.get(p).map(&keep).unwrap_or(false));
        self
    }
}
