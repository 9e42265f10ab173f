//! Declarative hierarchy manifests.
//!
//! ```yaml
//! kbs:
//!   - name: kb1
//!     description: plant one
//!     nodes:
//!       - header:
//!           link: site
//!           name: s1
//!           children:
//!             - info: { link: sensor, name: t1, data: { unit: C } }
//!             - job: { key: work, length: 3 }
//!             - rpc_server: { key: commands, queue_depth: 4 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::HierarchyBuilder;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub kbs: Vec<KbDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbDecl {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<NodeDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub link: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderDecl {
    pub link: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub children: Vec<NodeDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDecl {
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub initial_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDecl {
    pub key: String,
    pub length: usize,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcDecl {
    pub key: String,
    pub queue_depth: usize,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDecl {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeDecl {
    Header(HeaderDecl),
    Info(NodeSpec),
    Status(StatusDecl),
    Job(QueueDecl),
    Stream(QueueDecl),
    RpcClient(RpcDecl),
    RpcServer(RpcDecl),
    Link(LinkDecl),
    LinkMount(LinkDecl),
}

impl Manifest {
    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Replays the manifest through `builder`. Returns the number of
    /// nodes written.
    pub fn apply(&self, builder: &mut HierarchyBuilder) -> Result<usize> {
        let mut written = 0;
        for kb in &self.kbs {
            builder.add_kb(&kb.name, &kb.description)?;
            for node in &kb.nodes {
                written += apply_node(builder, node)?;
            }
        }
        log::info!(
            "Applied manifest: {} knowledge bases, {} nodes",
            self.kbs.len(),
            written
        );
        Ok(written)
    }
}

/// Loads a manifest file; `.json` is parsed as JSON, anything else as YAML.
pub fn load_manifest<P: AsRef<Path>>(path: P) -> std::result::Result<Manifest, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => Manifest::from_yaml_str(&content),
    }
}

fn apply_node(builder: &mut HierarchyBuilder, node: &NodeDecl) -> Result<usize> {
    match node {
        NodeDecl::Header(header) => {
            builder.with_header_node(
                &header.link,
                &header.name,
                header.properties.clone(),
                header.data.clone(),
                &header.description,
                |b| {
                    let mut written = 1;
                    for child in &header.children {
                        written += apply_node(b, child)?;
                    }
                    Ok(written)
                },
            )
        }
        NodeDecl::Info(n) => {
            builder.add_info_node(
                &n.link,
                &n.name,
                n.properties.clone(),
                n.data.clone(),
                &n.description,
            )?;
            Ok(1)
        }
        NodeDecl::Status(s) => {
            builder.add_status_field(
                &s.key,
                s.properties.clone(),
                &s.description,
                s.initial_data.clone(),
            )?;
            Ok(1)
        }
        NodeDecl::Job(q) => builder.add_job_field(&q.key, q.length, &q.description).map(|_| 1),
        NodeDecl::Stream(q) => builder
            .add_stream_field(&q.key, q.length, &q.description)
            .map(|_| 1),
        NodeDecl::RpcClient(r) => builder
            .add_rpc_client_field(&r.key, r.queue_depth, &r.description)
            .map(|_| 1),
        NodeDecl::RpcServer(r) => builder
            .add_rpc_server_field(&r.key, r.queue_depth, &r.description)
            .map(|_| 1),
        NodeDecl::Link(l) => builder.add_link_node(&l.name).map(|_| 0),
        NodeDecl::LinkMount(l) => builder.add_link_mount(&l.name, &l.description).map(|_| 0),
    }
}
