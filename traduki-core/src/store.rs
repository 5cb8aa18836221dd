//! Storage abstraction for content
//!
//! A store keeps raw node data records keyed by workspace, identifier and
//! dimension combination, plus the workspaces and sites they belong to.
//! It knows nothing about workspace stacking or dimension fallback; that
//! is resolved by the repository and context layers on top of it.

use crate::node::{NodeData, Site, Workspace};

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Workspace already exists: {0}")]
    WorkspaceExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Content store interface
///
/// Record lists are returned ordered by path, then identifier, then
/// dimension hash, so every caller sees a deterministic order.
pub trait ContentStore: Send + Sync {
    /// Find a workspace by name
    fn find_workspace(&self, name: &str) -> Result<Option<Workspace>>;

    /// Add a new workspace
    fn add_workspace(&self, workspace: Workspace) -> Result<()>;

    /// Find a site by its node name
    fn find_site(&self, node_name: &str) -> Result<Option<Site>>;

    /// Find a site by its site package key
    fn find_site_by_package_key(&self, package_key: &str) -> Result<Option<Site>>;

    /// Add or replace a site
    fn save_site(&self, site: Site) -> Result<()>;

    /// All records of an identifier in one workspace
    fn node_data_by_identifier(&self, workspace: &str, identifier: &str) -> Result<Vec<NodeData>>;

    /// All records at a path in one workspace
    fn node_data_by_path(&self, workspace: &str, path: &str) -> Result<Vec<NodeData>>;

    /// Records below a parent path in one workspace
    fn node_data_below(
        &self,
        workspace: &str,
        parent_path: &str,
        recursive: bool,
    ) -> Result<Vec<NodeData>>;

    /// Insert or replace a record, keyed by workspace, identifier and dimensions
    fn save_node_data(&self, node: &NodeData) -> Result<()>;
}

/// Sort records into store order
pub(crate) fn sort_records(records: &mut [NodeData]) {
    records.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then_with(|| a.identifier.cmp(&b.identifier))
            .then_with(|| a.dimensions_hash().cmp(&b.dimensions_hash()))
    });
}
