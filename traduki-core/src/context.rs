//! Content contexts
//!
//! A content context is a read/write view over the store for one workspace,
//! one set of dimension fallback lists and three visibility flags. Writes go
//! to the context's workspace under its target dimensions.

use crate::dimension::DimensionValues;
use crate::node::{NodeData, PropertyValue};
use crate::node_type::{NodeTypeFilter, NodeTypeManager};
use crate::repository::NodeDataRepository;
use crate::security::SecurityContext;
use crate::store::{ContentStore, Result, StoreError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parameters of a content context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    pub workspace_name: String,

    /// Fallback list per dimension used for reading
    pub dimensions: DimensionValues,

    /// Dimension values new variants are written under; derived from the
    /// first value of each dimension when empty
    pub target_dimensions: BTreeMap<String, String>,

    pub invisible_content_shown: bool,
    pub removed_content_shown: bool,
    pub inaccessible_content_shown: bool,
}

impl ContextOptions {
    pub fn new(workspace_name: impl Into<String>) -> Self {
        Self {
            workspace_name: workspace_name.into(),
            ..Default::default()
        }
    }

    pub fn with_dimensions(mut self, dimensions: DimensionValues) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_target_dimensions(mut self, target_dimensions: BTreeMap<String, String>) -> Self {
        self.target_dimensions = target_dimensions;
        self
    }

    pub fn invisible_content_shown(mut self, shown: bool) -> Self {
        self.invisible_content_shown = shown;
        self
    }

    pub fn removed_content_shown(mut self, shown: bool) -> Self {
        self.removed_content_shown = shown;
        self
    }

    pub fn inaccessible_content_shown(mut self, shown: bool) -> Self {
        self.inaccessible_content_shown = shown;
        self
    }
}

/// How an adopted variant came to exist in the target context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adoption {
    /// The target workspace already held the variant
    Existing,
    /// Copied from a base workspace into the target workspace
    Materialized,
    /// Newly created from the adopted variant
    Created,
}

/// Result of adopting a variant into a context
#[derive(Debug, Clone)]
pub struct AdoptedNode {
    pub node: NodeData,
    pub adoption: Adoption,
}

/// Read/write view over the store
#[derive(Clone)]
pub struct ContentContext {
    repository: NodeDataRepository,
    node_types: Arc<NodeTypeManager>,
    security: Arc<SecurityContext>,
    options: ContextOptions,
}

impl ContentContext {
    /// Open a context; the workspace must exist
    pub fn new(
        store: Arc<dyn ContentStore>,
        node_types: Arc<NodeTypeManager>,
        security: Arc<SecurityContext>,
        options: ContextOptions,
    ) -> Result<Self> {
        let repository = NodeDataRepository::new(store);
        if repository
            .store()
            .find_workspace(&options.workspace_name)?
            .is_none()
        {
            return Err(StoreError::WorkspaceNotFound(options.workspace_name));
        }
        Ok(Self {
            repository,
            node_types,
            security,
            options,
        })
    }

    /// Sibling context over the same store with different options
    pub fn derive(&self, options: ContextOptions) -> Result<Self> {
        Self::new(
            self.repository.store().clone(),
            self.node_types.clone(),
            self.security.clone(),
            options,
        )
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn workspace_name(&self) -> &str {
        &self.options.workspace_name
    }

    pub fn dimensions(&self) -> &DimensionValues {
        &self.options.dimensions
    }

    /// Single-valued dimensions new variants are written under
    pub fn target_dimensions(&self) -> BTreeMap<String, String> {
        if self.options.target_dimensions.is_empty() {
            self.options.dimensions.first_values()
        } else {
            self.options.target_dimensions.clone()
        }
    }

    pub fn is_invisible_content_shown(&self) -> bool {
        self.options.invisible_content_shown
    }

    pub fn is_removed_content_shown(&self) -> bool {
        self.options.removed_content_shown
    }

    pub fn is_inaccessible_content_shown(&self) -> bool {
        self.options.inaccessible_content_shown
    }

    pub fn node_types(&self) -> &NodeTypeManager {
        &self.node_types
    }

    pub fn security(&self) -> &Arc<SecurityContext> {
        &self.security
    }

    pub fn repository(&self) -> &NodeDataRepository {
        &self.repository
    }

    fn is_accessible(&self, node: &NodeData) -> bool {
        self.options.inaccessible_content_shown || self.security.can_read(&node.path)
    }

    fn is_visible(&self, node: &NodeData) -> bool {
        (self.options.invisible_content_shown || !node.hidden) && self.is_accessible(node)
    }

    /// Node with the given identifier, resolved through dimension fallback
    pub fn node_by_identifier(&self, identifier: &str) -> Result<Option<NodeData>> {
        Ok(self
            .repository
            .find_by_identifier(
                identifier,
                &self.options.workspace_name,
                &self.options.dimensions,
                self.options.removed_content_shown,
            )?
            .filter(|node| self.is_visible(node)))
    }

    /// Node at the given path, resolved through dimension fallback
    pub fn node(&self, path: &str) -> Result<Option<NodeData>> {
        Ok(self.node_data(path)?.filter(|node| self.is_visible(node)))
    }

    /// Record at a path regardless of the hidden flag and access policy
    pub fn node_data(&self, path: &str) -> Result<Option<NodeData>> {
        self.repository.find_by_path(
            path,
            &self.options.workspace_name,
            &self.options.dimensions,
            self.options.removed_content_shown,
        )
    }

    /// All variants of a node, one per dimension combination
    pub fn node_variants_by_identifier(&self, identifier: &str) -> Result<Vec<NodeData>> {
        Ok(self
            .repository
            .find_variants_by_identifier(
                identifier,
                &self.options.workspace_name,
                self.options.removed_content_shown,
            )?
            .into_iter()
            .filter(|node| self.is_visible(node))
            .collect())
    }

    /// Records below a parent path matching a type filter.
    ///
    /// Hidden records are included; callers decide how hidden content is
    /// treated.
    pub fn find_children(
        &self,
        parent_path: &str,
        filter: Option<&NodeTypeFilter>,
        recursive: bool,
    ) -> Result<Vec<NodeData>> {
        Ok(self
            .repository
            .find_by_parent_and_node_type(
                parent_path,
                filter,
                &self.node_types,
                &self.options.workspace_name,
                &self.options.dimensions,
                self.options.removed_content_shown,
                recursive,
            )?
            .into_iter()
            .filter(|node| self.is_accessible(node))
            .collect())
    }

    /// Whether the node at `path` or anything below it changed at or after `since`
    pub fn modified_since(&self, node: &NodeData, since: &DateTime<Utc>) -> Result<bool> {
        if node.last_modified >= *since {
            return Ok(true);
        }
        Ok(self
            .find_children(&node.path, None, true)?
            .iter()
            .any(|child| child.last_modified >= *since))
    }

    /// Make `variant` exist under this context's target dimensions
    pub fn adopt_node(&self, variant: &NodeData) -> Result<AdoptedNode> {
        let workspace = &self.options.workspace_name;
        let target = DimensionValues::from_single(&self.target_dimensions());

        if let Some(existing) =
            self.repository
                .find_exact(&variant.identifier, workspace, &target)?
        {
            if !existing.removed {
                if existing.workspace == *workspace {
                    return Ok(AdoptedNode {
                        node: existing,
                        adoption: Adoption::Existing,
                    });
                }
                let node = existing.variant_in(workspace, target);
                self.repository.save(&node)?;
                return Ok(AdoptedNode {
                    node,
                    adoption: Adoption::Materialized,
                });
            }
        }

        let node = variant.variant_in(workspace, target);
        self.repository.save(&node)?;
        Ok(AdoptedNode {
            node,
            adoption: Adoption::Created,
        })
    }

    /// Set a property, writing into this context's workspace
    pub fn set_property(
        &self,
        node: &mut NodeData,
        name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        if node.workspace != self.options.workspace_name {
            node.workspace = self.options.workspace_name.clone();
        }
        node.properties.insert(name.to_string(), value);
        node.last_modified = Utc::now();
        self.repository.save(node)
    }
}
