//! In-memory content store
//!
//! Node data is kept in an arena keyed by identifier; each identifier maps
//! to its records keyed by `(workspace, dimensions hash)`.

use crate::node::{NodeData, Site, Workspace, paths};
use crate::store::{ContentStore, Result, StoreError, sort_records};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

type VariantKey = (String, String);

#[derive(Default)]
struct MemoryState {
    workspaces: BTreeMap<String, Workspace>,
    sites: BTreeMap<String, Site>,
    nodes: BTreeMap<String, BTreeMap<VariantKey, NodeData>>,
}

/// In-memory store
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store containing only the live workspace
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        let live = Workspace::live();
        state.workspaces.insert(live.name.clone(), live);
        Self {
            state: RwLock::new(state),
        }
    }

    /// Number of stored records over all workspaces
    pub fn record_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.nodes.values().map(BTreeMap::len).sum()
    }

    fn collect<F>(&self, workspace: &str, predicate: F) -> Vec<NodeData>
    where
        F: Fn(&NodeData) -> bool,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<NodeData> = state
            .nodes
            .values()
            .flat_map(BTreeMap::values)
            .filter(|node| node.workspace == workspace && predicate(node))
            .cloned()
            .collect();
        sort_records(&mut records);
        records
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for MemoryStore {
    fn find_workspace(&self, name: &str) -> Result<Option<Workspace>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.workspaces.get(name).cloned())
    }

    fn add_workspace(&self, workspace: Workspace) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.workspaces.contains_key(&workspace.name) {
            return Err(StoreError::WorkspaceExists(workspace.name));
        }
        if let Some(base) = &workspace.base_workspace {
            if !state.workspaces.contains_key(base) {
                return Err(StoreError::WorkspaceNotFound(base.clone()));
            }
        }
        state.workspaces.insert(workspace.name.clone(), workspace);
        Ok(())
    }

    fn find_site(&self, node_name: &str) -> Result<Option<Site>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.sites.get(node_name).cloned())
    }

    fn find_site_by_package_key(&self, package_key: &str) -> Result<Option<Site>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .sites
            .values()
            .find(|site| site.site_package_key == package_key)
            .cloned())
    }

    fn save_site(&self, site: Site) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.sites.insert(site.node_name.clone(), site);
        Ok(())
    }

    fn node_data_by_identifier(&self, workspace: &str, identifier: &str) -> Result<Vec<NodeData>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<NodeData> = state
            .nodes
            .get(identifier)
            .map(|variants| {
                variants
                    .values()
                    .filter(|node| node.workspace == workspace)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_records(&mut records);
        Ok(records)
    }

    fn node_data_by_path(&self, workspace: &str, path: &str) -> Result<Vec<NodeData>> {
        Ok(self.collect(workspace, |node| node.path == path))
    }

    fn node_data_below(
        &self,
        workspace: &str,
        parent_path: &str,
        recursive: bool,
    ) -> Result<Vec<NodeData>> {
        Ok(self.collect(workspace, |node| {
            paths::is_below(&node.path, parent_path, recursive)
        }))
    }

    fn save_node_data(&self, node: &NodeData) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.workspaces.contains_key(&node.workspace) {
            return Err(StoreError::WorkspaceNotFound(node.workspace.clone()));
        }
        state
            .nodes
            .entry(node.identifier.clone())
            .or_default()
            .insert((node.workspace.clone(), node.dimensions_hash()), node.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionValues;
    use crate::node::LIVE_WORKSPACE;
    use chrono::Utc;

    fn record(identifier: &str, path: &str, language: &str) -> NodeData {
        NodeData {
            identifier: identifier.into(),
            path: path.into(),
            workspace: LIVE_WORKSPACE.into(),
            node_type: "Acme:Page".into(),
            index: 0,
            hidden: false,
            removed: false,
            dimensions: DimensionValues::new().with("language", vec![language.into()]),
            properties: Default::default(),
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_store_has_live_workspace() {
        let store = MemoryStore::new();
        assert_eq!(store.find_workspace("live").unwrap(), Some(Workspace::live()));
        assert!(store.find_workspace("user-admin").unwrap().is_none());
    }

    #[test]
    fn test_add_workspace_requires_base() {
        let store = MemoryStore::new();
        assert!(store.add_workspace(Workspace::new("review", Some("missing"))).is_err());
        store.add_workspace(Workspace::new("review", Some("live"))).unwrap();
        assert!(matches!(
            store.add_workspace(Workspace::new("review", Some("live"))),
            Err(StoreError::WorkspaceExists(_))
        ));
    }

    #[test]
    fn test_variants_are_keyed_by_dimensions() {
        let store = MemoryStore::new();
        store.save_node_data(&record("n1", "/sites/acme", "en")).unwrap();
        store.save_node_data(&record("n1", "/sites/acme", "de")).unwrap();
        store.save_node_data(&record("n1", "/sites/acme", "de")).unwrap();

        assert_eq!(store.record_count(), 2);
        assert_eq!(store.node_data_by_identifier("live", "n1").unwrap().len(), 2);
        assert!(store.node_data_by_identifier("review", "n1").unwrap().is_empty());
    }

    #[test]
    fn test_node_data_below() {
        let store = MemoryStore::new();
        store.save_node_data(&record("a", "/sites/acme", "en")).unwrap();
        store.save_node_data(&record("b", "/sites/acme/home", "en")).unwrap();
        store.save_node_data(&record("c", "/sites/acme/home/about", "en")).unwrap();

        let children = store.node_data_below("live", "/sites/acme", false).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].identifier, "b");

        let descendants = store.node_data_below("live", "/sites/acme", true).unwrap();
        let ids: Vec<&str> = descendants.iter().map(|n| n.identifier.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_save_requires_workspace() {
        let store = MemoryStore::new();
        let mut node = record("n1", "/sites/acme", "en");
        node.workspace = "missing".into();
        assert!(matches!(
            store.save_node_data(&node),
            Err(StoreError::WorkspaceNotFound(_))
        ));
    }
}
