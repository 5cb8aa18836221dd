//! Node type declarations and node type filters

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Declared type of a string property
pub const STRING_TYPE: &str = "string";

/// Declaration of a single property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDeclaration {
    /// Declared type (`string`, `boolean`, `reference`, ...)
    #[serde(rename = "type")]
    pub property_type: String,

    /// Exclude from export even if declared `string`
    #[serde(default)]
    pub skip: bool,
}

/// Declaration of a node type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeTypeDeclaration {
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,

    #[serde(default)]
    pub super_types: Vec<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDeclaration>,
}

/// Resolves node type inheritance and property declarations
#[derive(Debug, Clone, Default)]
pub struct NodeTypeManager {
    types: BTreeMap<String, NodeTypeDeclaration>,
}

impl NodeTypeManager {
    pub fn new(types: BTreeMap<String, NodeTypeDeclaration>) -> Self {
        Self { types }
    }

    pub fn has_node_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Declaration of a property, searching super types depth-first
    pub fn property(&self, node_type: &str, property: &str) -> Option<&PropertyDeclaration> {
        let mut visited = HashSet::new();
        self.find_property(node_type, property, &mut visited)
    }

    fn find_property<'a>(
        &'a self,
        node_type: &str,
        property: &str,
        visited: &mut HashSet<String>,
    ) -> Option<&'a PropertyDeclaration> {
        if !visited.insert(node_type.to_string()) {
            return None;
        }
        let declaration = self.types.get(node_type)?;
        if let Some(found) = declaration.properties.get(property) {
            return Some(found);
        }
        declaration
            .super_types
            .iter()
            .find_map(|super_type| self.find_property(super_type, property, visited))
    }

    /// Declared type of a property
    pub fn property_type(&self, node_type: &str, property: &str) -> Option<&str> {
        self.property(node_type, property)
            .map(|declaration| declaration.property_type.as_str())
    }

    /// Whether a property is declared `string` and not skipped
    pub fn is_exported_string(&self, node_type: &str, property: &str) -> bool {
        self.property(node_type, property)
            .is_some_and(|declaration| declaration.property_type == STRING_TYPE && !declaration.skip)
    }

    /// Whether `node_type` is `super_type` or inherits from it
    pub fn is_of_type(&self, node_type: &str, super_type: &str) -> bool {
        let mut visited = HashSet::new();
        self.inherits(node_type, super_type, &mut visited)
    }

    fn inherits(&self, node_type: &str, super_type: &str, visited: &mut HashSet<String>) -> bool {
        if node_type == super_type {
            return true;
        }
        if !visited.insert(node_type.to_string()) {
            return false;
        }
        self.types.get(node_type).is_some_and(|declaration| {
            declaration
                .super_types
                .iter()
                .any(|parent| self.inherits(parent, super_type, visited))
        })
    }
}

/// Filter over node types: `Acme:Document,!Acme:Shortcut`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTypeFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl NodeTypeFilter {
    pub fn parse(filter: &str) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for term in filter.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match term.strip_prefix('!') {
                Some(negated) => exclude.push(negated.trim().to_string()),
                None => include.push(term.to_string()),
            }
        }
        Self { include, exclude }
    }

    pub fn matches(&self, node_type: &str, types: &NodeTypeManager) -> bool {
        let included = self.include.is_empty()
            || self.include.iter().any(|t| types.is_of_type(node_type, t));
        included && !self.exclude.iter().any(|t| types.is_of_type(node_type, t))
    }
}

impl std::fmt::Display for NodeTypeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let terms: Vec<String> = self
            .include
            .iter()
            .cloned()
            .chain(self.exclude.iter().map(|t| format!("!{}", t)))
            .collect();
        write!(f, "{}", terms.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> NodeTypeManager {
        let toml = r#"
            ["Acme:Document"]
            abstract = true
            properties.title = { type = "string" }
            properties.uriPathSegment = { type = "string", skip = true }

            ["Acme:Page"]
            super_types = ["Acme:Document"]
            properties.hiddenInMenu = { type = "boolean" }

            ["Acme:Shortcut"]
            super_types = ["Acme:Document"]

            ["Acme:Text"]
            properties.text = { type = "string" }
        "#;
        let types: BTreeMap<String, NodeTypeDeclaration> = toml::from_str(toml).unwrap();
        NodeTypeManager::new(types)
    }

    #[test]
    fn test_inherited_property() {
        let types = manager();
        assert_eq!(types.property_type("Acme:Page", "title"), Some("string"));
        assert_eq!(types.property_type("Acme:Page", "hiddenInMenu"), Some("boolean"));
        assert!(types.property_type("Acme:Text", "title").is_none());
    }

    #[test]
    fn test_exported_string() {
        let types = manager();
        assert!(types.is_exported_string("Acme:Page", "title"));
        assert!(!types.is_exported_string("Acme:Page", "uriPathSegment"));
        assert!(!types.is_exported_string("Acme:Page", "hiddenInMenu"));
        assert!(!types.is_exported_string("Unknown:Type", "title"));
    }

    #[test]
    fn test_filter_with_negation() {
        let types = manager();
        let filter = NodeTypeFilter::parse("Acme:Document, !Acme:Shortcut");
        assert!(filter.matches("Acme:Page", &types));
        assert!(!filter.matches("Acme:Shortcut", &types));
        assert!(!filter.matches("Acme:Text", &types));
        assert_eq!(filter.to_string(), "Acme:Document,!Acme:Shortcut");
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let types = manager();
        assert!(NodeTypeFilter::parse("").matches("Acme:Text", &types));
        assert!(!NodeTypeFilter::parse("!Acme:Text").matches("Acme:Text", &types));
    }

    #[test]
    fn test_cyclic_super_types_terminate() {
        let mut types = BTreeMap::new();
        types.insert(
            "A".to_string(),
            NodeTypeDeclaration {
                super_types: vec!["B".into()],
                ..Default::default()
            },
        );
        types.insert(
            "B".to_string(),
            NodeTypeDeclaration {
                super_types: vec!["A".into()],
                ..Default::default()
            },
        );
        let manager = NodeTypeManager::new(types);
        assert!(!manager.is_of_type("A", "C"));
        assert!(manager.property("A", "missing").is_none());
    }
}
