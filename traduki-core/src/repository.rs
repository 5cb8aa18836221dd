//! Node data repository
//!
//! Resolves raw store records into the records visible from a workspace and
//! a set of dimension fallback lists:
//! - workspace reduction: per identifier and dimension combination, the
//!   record of the nearest workspace in the base chain wins
//! - removal: removed shadow records hide the variant unless removed
//!   content is requested
//! - dimension reduction: per identifier, the variant with the best
//!   fallback position wins

use crate::dimension::DimensionValues;
use crate::node::{NodeData, Workspace};
use crate::node_type::{NodeTypeFilter, NodeTypeManager};
use crate::store::{ContentStore, Result, StoreError};
use indexmap::IndexMap;
use std::sync::Arc;

/// Workspace and dimension aware queries over a content store
#[derive(Clone)]
pub struct NodeDataRepository {
    store: Arc<dyn ContentStore>,
}

impl NodeDataRepository {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// The workspace and all workspaces it stacks on, nearest first
    pub fn workspace_chain(&self, name: &str) -> Result<Vec<Workspace>> {
        let mut chain: Vec<Workspace> = Vec::new();
        let mut next = Some(name.to_string());
        while let Some(current) = next {
            if chain.iter().any(|w| w.name == current) {
                return Err(StoreError::InvalidData(format!(
                    "Workspace {} has a cyclic base chain",
                    name
                )));
            }
            let workspace = self
                .store
                .find_workspace(&current)?
                .ok_or(StoreError::WorkspaceNotFound(current))?;
            next = workspace.base_workspace.clone();
            chain.push(workspace);
        }
        Ok(chain)
    }

    /// Collect records from every workspace of the chain, nearest wins
    fn collect_in_chain<F>(&self, workspace: &str, removed_shown: bool, fetch: F) -> Result<Vec<NodeData>>
    where
        F: Fn(&str) -> Result<Vec<NodeData>>,
    {
        let mut reduced: IndexMap<(String, String), NodeData> = IndexMap::new();
        for ws in self.workspace_chain(workspace)? {
            for record in fetch(&ws.name)? {
                let key = (record.identifier.clone(), record.dimensions_hash());
                reduced.entry(key).or_insert(record);
            }
        }
        Ok(reduced
            .into_values()
            .filter(|record| removed_shown || !record.removed)
            .collect())
    }

    /// Fallback position of a record within context dimensions.
    ///
    /// `None` when a dimension value of the record is outside the context's
    /// fallback list. Records without a value for a dimension match it at
    /// the lowest priority.
    pub fn dimension_rank(record: &NodeData, dimensions: &DimensionValues) -> Option<Vec<usize>> {
        dimensions
            .iter()
            .map(|(name, fallback)| match record.dimension(name) {
                Some(value) => fallback.iter().position(|v| v == value),
                None => Some(fallback.len()),
            })
            .collect()
    }

    /// Per identifier, keep the variant with the best rank
    fn reduce_by_dimensions(records: Vec<NodeData>, dimensions: &DimensionValues) -> Vec<NodeData> {
        let mut best: IndexMap<String, (Vec<usize>, NodeData)> = IndexMap::new();
        for record in records {
            let Some(rank) = Self::dimension_rank(&record, dimensions) else {
                continue;
            };
            match best.get_mut(&record.identifier) {
                Some((current, existing)) if rank < *current => {
                    *current = rank;
                    *existing = record;
                }
                Some(_) => {}
                None => {
                    best.insert(record.identifier.clone(), (rank, record));
                }
            }
        }
        best.into_values().map(|(_, record)| record).collect()
    }

    /// Best matching variant of an identifier
    pub fn find_by_identifier(
        &self,
        identifier: &str,
        workspace: &str,
        dimensions: &DimensionValues,
        removed_shown: bool,
    ) -> Result<Option<NodeData>> {
        let records = self.collect_in_chain(workspace, removed_shown, |ws| {
            self.store.node_data_by_identifier(ws, identifier)
        })?;
        Ok(Self::reduce_by_dimensions(records, dimensions).into_iter().next())
    }

    /// Best matching variant at a path
    pub fn find_by_path(
        &self,
        path: &str,
        workspace: &str,
        dimensions: &DimensionValues,
        removed_shown: bool,
    ) -> Result<Option<NodeData>> {
        let records = self.collect_in_chain(workspace, removed_shown, |ws| {
            self.store.node_data_by_path(ws, path)
        })?;
        Ok(Self::reduce_by_dimensions(records, dimensions).into_iter().next())
    }

    /// Every variant of an identifier, one per dimension combination
    pub fn find_variants_by_identifier(
        &self,
        identifier: &str,
        workspace: &str,
        removed_shown: bool,
    ) -> Result<Vec<NodeData>> {
        self.collect_in_chain(workspace, removed_shown, |ws| {
            self.store.node_data_by_identifier(ws, identifier)
        })
    }

    /// The record of one exact dimension combination, searched through the chain
    pub fn find_exact(
        &self,
        identifier: &str,
        workspace: &str,
        dimensions: &DimensionValues,
    ) -> Result<Option<NodeData>> {
        let hash = dimensions.hash();
        for ws in self.workspace_chain(workspace)? {
            if let Some(record) = self
                .store
                .node_data_by_identifier(&ws.name, identifier)?
                .into_iter()
                .find(|record| record.dimensions_hash() == hash)
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Records below a parent path, optionally filtered by node type.
    ///
    /// Results are reduced per identifier and ordered by path.
    #[allow(clippy::too_many_arguments)]
    pub fn find_by_parent_and_node_type(
        &self,
        parent_path: &str,
        filter: Option<&NodeTypeFilter>,
        node_types: &NodeTypeManager,
        workspace: &str,
        dimensions: &DimensionValues,
        removed_shown: bool,
        recursive: bool,
    ) -> Result<Vec<NodeData>> {
        let records = self.collect_in_chain(workspace, removed_shown, |ws| {
            self.store.node_data_below(ws, parent_path, recursive)
        })?;
        let mut reduced: Vec<NodeData> = Self::reduce_by_dimensions(records, dimensions)
            .into_iter()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.node_type, node_types)))
            .collect();
        reduced.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.identifier.cmp(&b.identifier)));
        Ok(reduced)
    }

    /// Persist a record
    pub fn save(&self, node: &NodeData) -> Result<()> {
        self.store.save_node_data(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::node::LIVE_WORKSPACE;
    use chrono::Utc;

    fn language(values: &[&str]) -> DimensionValues {
        DimensionValues::new().with("language", values.iter().map(|v| v.to_string()).collect())
    }

    fn record(identifier: &str, path: &str, workspace: &str, lang: &str) -> NodeData {
        NodeData {
            identifier: identifier.into(),
            path: path.into(),
            workspace: workspace.into(),
            node_type: "Acme:Page".into(),
            index: 0,
            hidden: false,
            removed: false,
            dimensions: language(&[lang]),
            properties: Default::default(),
            last_modified: Utc::now(),
        }
    }

    fn repository() -> (Arc<MemoryStore>, NodeDataRepository) {
        let store = Arc::new(MemoryStore::new());
        store.add_workspace(Workspace::new("review", Some(LIVE_WORKSPACE))).unwrap();
        let repository = NodeDataRepository::new(store.clone());
        (store, repository)
    }

    #[test]
    fn test_workspace_chain() {
        let (_, repository) = repository();
        let chain = repository.workspace_chain("review").unwrap();
        let names: Vec<&str> = chain.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["review", "live"]);
        assert!(matches!(
            repository.workspace_chain("missing"),
            Err(StoreError::WorkspaceNotFound(_))
        ));
    }

    #[test]
    fn test_fallback_resolution() {
        let (store, repository) = repository();
        store.save_node_data(&record("n1", "/sites/acme", "live", "de")).unwrap();

        let found = repository
            .find_by_identifier("n1", "live", &language(&["de_CH", "de"]), false)
            .unwrap()
            .unwrap();
        assert_eq!(found.dimension("language"), Some("de"));

        store.save_node_data(&record("n1", "/sites/acme", "live", "de_CH")).unwrap();
        let found = repository
            .find_by_identifier("n1", "live", &language(&["de_CH", "de"]), false)
            .unwrap()
            .unwrap();
        assert_eq!(found.dimension("language"), Some("de_CH"));

        assert!(repository
            .find_by_identifier("n1", "live", &language(&["fr"]), false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_nearest_workspace_wins() {
        let (store, repository) = repository();
        store.save_node_data(&record("n1", "/sites/acme", "live", "en")).unwrap();
        let mut shadow = record("n1", "/sites/acme", "review", "en");
        shadow.index = 7;
        store.save_node_data(&shadow).unwrap();

        let live = repository.find_by_identifier("n1", "live", &language(&["en"]), false).unwrap().unwrap();
        assert_eq!(live.index, 0);
        let review = repository.find_by_identifier("n1", "review", &language(&["en"]), false).unwrap().unwrap();
        assert_eq!(review.index, 7);
        assert_eq!(review.workspace, "review");
    }

    #[test]
    fn test_removed_shadow_hides_base_record() {
        let (store, repository) = repository();
        store.save_node_data(&record("n1", "/sites/acme", "live", "en")).unwrap();
        let mut shadow = record("n1", "/sites/acme", "review", "en");
        shadow.removed = true;
        store.save_node_data(&shadow).unwrap();

        assert!(repository.find_by_identifier("n1", "review", &language(&["en"]), false).unwrap().is_none());
        assert!(repository.find_by_identifier("n1", "review", &language(&["en"]), true).unwrap().is_some());
    }

    #[test]
    fn test_dimensionless_records_match_everything() {
        let (store, repository) = repository();
        let mut sites = record("root", "/sites", "live", "en");
        sites.dimensions = DimensionValues::new();
        store.save_node_data(&sites).unwrap();

        assert!(repository.find_by_path("/sites", "live", &language(&["fr"]), false).unwrap().is_some());
    }

    #[test]
    fn test_find_by_parent_and_node_type() {
        let (store, repository) = repository();
        store.save_node_data(&record("a", "/sites/acme/a", "live", "en")).unwrap();
        store.save_node_data(&record("a", "/sites/acme/a", "live", "de")).unwrap();
        let mut text = record("t", "/sites/acme/a/text", "live", "en");
        text.node_type = "Acme:Text".into();
        store.save_node_data(&text).unwrap();

        let types = NodeTypeManager::default();
        let all = repository
            .find_by_parent_and_node_type("/sites/acme", None, &types, "live", &language(&["en"]), false, true)
            .unwrap();
        assert_eq!(all.len(), 2);

        let pages = NodeTypeFilter::parse("Acme:Page");
        let filtered = repository
            .find_by_parent_and_node_type("/sites/acme", Some(&pages), &types, "live", &language(&["de"]), false, true)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].dimension("language"), Some("de"));
    }

    #[test]
    fn test_find_exact_searches_base_chain() {
        let (store, repository) = repository();
        store.save_node_data(&record("n1", "/sites/acme", "live", "fr")).unwrap();
        let found = repository.find_exact("n1", "review", &language(&["fr"])).unwrap().unwrap();
        assert_eq!(found.workspace, "live");
        assert!(repository.find_exact("n1", "review", &language(&["it"])).unwrap().is_none());
    }
}
