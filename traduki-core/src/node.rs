//! Node data model
//!
//! A node is identified by a dimension-independent identifier. Each of its
//! variants is stored as one `NodeData` record per workspace and dimension
//! combination.

use crate::dimension::DimensionValues;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the workspace every other workspace ultimately stacks on
pub const LIVE_WORKSPACE: &str = "live";

/// Property value as stored; only JSON strings are translatable
pub type PropertyValue = serde_json::Value;

/// One variant of a node in one workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Stable identifier shared by all variants of the node
    pub identifier: String,

    /// Absolute path, `/`-separated
    pub path: String,

    /// Workspace this record belongs to
    pub workspace: String,

    /// Node type name
    pub node_type: String,

    /// Sorting index among siblings
    pub index: i64,

    /// Hidden flag
    #[serde(default)]
    pub hidden: bool,

    /// Removal shadow: hides the variant from the base workspaces
    #[serde(default)]
    pub removed: bool,

    /// Dimension combination of this variant
    #[serde(default)]
    pub dimensions: DimensionValues,

    /// Properties
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,

    /// Last modification time
    pub last_modified: DateTime<Utc>,
}

impl NodeData {
    /// Last path segment
    pub fn name(&self) -> &str {
        paths::name_of(&self.path)
    }

    /// Parent path, empty for the root node
    pub fn parent_path(&self) -> &str {
        paths::parent_of(&self.path).unwrap_or("")
    }

    pub fn dimensions_hash(&self) -> String {
        self.dimensions.hash()
    }

    /// First value of the given dimension
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.first(name)
    }

    /// Raw property value
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Property value if it is a string
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_str)
    }

    /// Copy of this record placed in another workspace and dimension combination
    pub fn variant_in(&self, workspace: &str, dimensions: DimensionValues) -> Self {
        Self {
            workspace: workspace.to_string(),
            dimensions,
            removed: false,
            last_modified: Utc::now(),
            ..self.clone()
        }
    }
}

/// Named, stackable editing context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,

    /// Workspace this one stacks on
    #[serde(default)]
    pub base_workspace: Option<String>,
}

impl Workspace {
    pub fn new(name: impl Into<String>, base_workspace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            base_workspace: base_workspace.map(str::to_string),
        }
    }

    pub fn live() -> Self {
        Self::new(LIVE_WORKSPACE, None)
    }
}

/// A site rooted at `/sites/<node_name>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub node_name: String,
    pub name: String,
    pub site_package_key: String,
}

/// Path helpers
pub mod paths {
    /// Root of all sites
    pub const SITES_ROOT: &str = "/sites";

    /// Parent of a path; `None` for the root node
    pub fn parent_of(path: &str) -> Option<&str> {
        if path == "/" || path.is_empty() {
            return None;
        }
        match path.rfind('/') {
            Some(0) => Some("/"),
            Some(pos) => Some(&path[..pos]),
            None => None,
        }
    }

    /// Last path segment
    pub fn name_of(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or("")
    }

    /// Join a parent path and a child name
    pub fn join(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent, name)
        }
    }

    /// Whether `path` lies below `parent` (direct child unless `recursive`)
    pub fn is_below(path: &str, parent: &str, recursive: bool) -> bool {
        if recursive {
            let prefix = if parent == "/" {
                "/".to_string()
            } else {
                format!("{}/", parent)
            };
            path != parent && path.starts_with(&prefix)
        } else {
            parent_of(path) == Some(parent)
        }
    }

    /// Absolute path of a site-relative starting point
    pub fn site_path(relative: &str) -> String {
        format!("{}/{}", SITES_ROOT, relative.trim_start_matches('/'))
    }

    /// Site node name of a path below `/sites`
    pub fn site_node_name(path: &str) -> Option<&str> {
        path.strip_prefix("/sites/")
            .and_then(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::paths::*;
    use super::*;

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of("/sites"), Some("/"));
        assert_eq!(parent_of("/sites/acme/home"), Some("/sites/acme"));
    }

    #[test]
    fn test_is_below() {
        assert!(is_below("/sites/acme/a", "/sites/acme", false));
        assert!(!is_below("/sites/acme/a/b", "/sites/acme", false));
        assert!(is_below("/sites/acme/a/b", "/sites/acme", true));
        assert!(!is_below("/sites/acme-x/a", "/sites/acme", true));
        assert!(!is_below("/sites/acme", "/sites/acme", true));
        assert!(is_below("/sites", "/", true));
    }

    #[test]
    fn test_site_helpers() {
        assert_eq!(site_path("acme/home"), "/sites/acme/home");
        assert_eq!(site_node_name("/sites/acme/home"), Some("acme"));
        assert_eq!(site_node_name("/sites/acme"), Some("acme"));
        assert_eq!(site_node_name("/other"), None);
        assert_eq!(name_of("/sites/acme/home"), "home");
        assert_eq!(join("/", "sites"), "/sites");
        assert_eq!(join("/sites", "acme"), "/sites/acme");
    }

    #[test]
    fn test_string_property() {
        let mut properties = BTreeMap::new();
        properties.insert("title".to_string(), PropertyValue::from("Home"));
        properties.insert("count".to_string(), PropertyValue::from(3));
        let node = NodeData {
            identifier: "n1".into(),
            path: "/sites/acme/home".into(),
            workspace: LIVE_WORKSPACE.into(),
            node_type: "Acme:Page".into(),
            index: 1,
            hidden: false,
            removed: false,
            dimensions: DimensionValues::new(),
            properties,
            last_modified: Utc::now(),
        };

        assert_eq!(node.string_property("title"), Some("Home"));
        assert_eq!(node.string_property("count"), None);
        assert_eq!(node.name(), "home");
        assert_eq!(node.parent_path(), "/sites/acme");
    }
}
