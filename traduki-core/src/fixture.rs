//! Fixture loading
//!
//! A fixture is a JSON document describing workspaces, sites and node
//! records to seed a store with.

use crate::dimension::DimensionValues;
use crate::node::{LIVE_WORKSPACE, NodeData, PropertyValue, Site, Workspace};
use crate::store::{ContentStore, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

fn default_workspace() -> String {
    LIVE_WORKSPACE.to_string()
}

/// One node record of a fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureNode {
    /// Records sharing a path without an identifier share a generated one
    #[serde(default)]
    pub identifier: Option<String>,

    pub path: String,

    #[serde(default = "default_workspace")]
    pub workspace: String,

    pub node_type: String,

    #[serde(default)]
    pub index: i64,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub removed: bool,

    #[serde(default)]
    pub dimensions: DimensionValues,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,

    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub workspaces: Vec<Workspace>,

    #[serde(default)]
    pub sites: Vec<Site>,

    #[serde(default)]
    pub nodes: Vec<FixtureNode>,
}

impl Fixture {
    pub fn from_json_str(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }
}

/// Counts of what a fixture added to a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureStats {
    pub workspaces: usize,
    pub sites: usize,
    pub nodes: usize,
}

/// Load a fixture into a store.
///
/// Workspaces already present are left untouched; sites and records are
/// upserted.
pub fn load_fixture(store: &dyn ContentStore, fixture: Fixture) -> Result<FixtureStats> {
    let mut stats = FixtureStats::default();

    for workspace in fixture.workspaces {
        if store.find_workspace(&workspace.name)?.is_some() {
            debug!("Workspace {} already exists", workspace.name);
            continue;
        }
        store.add_workspace(workspace)?;
        stats.workspaces += 1;
    }

    for site in fixture.sites {
        store.save_site(site)?;
        stats.sites += 1;
    }

    let now = Utc::now();
    let mut generated: HashMap<String, String> = HashMap::new();
    for node in fixture.nodes {
        let identifier = match node.identifier {
            Some(identifier) => identifier,
            None => generated
                .entry(node.path.clone())
                .or_insert_with(|| Uuid::new_v4().to_string())
                .clone(),
        };
        store.save_node_data(&NodeData {
            identifier,
            path: node.path,
            workspace: node.workspace,
            node_type: node.node_type,
            index: node.index,
            hidden: node.hidden,
            removed: node.removed,
            dimensions: node.dimensions,
            properties: node.properties,
            last_modified: node.last_modified.unwrap_or(now),
        })?;
        stats.nodes += 1;
    }

    Ok(stats)
}
