//! Settings
//!
//! Loaded from a TOML file; a missing file yields the defaults.

use crate::dimension::{DimensionCombinator, DimensionConfig};
use crate::node::LIVE_WORKSPACE;
use crate::node_type::{NodeTypeDeclaration, NodeTypeFilter, NodeTypeManager};
use crate::security::{AccessPolicy, AllowAll, PathAccessPolicy, SecurityContext};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Preset key used when no filter preset is requested
pub const DEFAULT_PRESET: &str = "default";

/// Errors raised while loading or validating settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("Invalid access policy: {0}")]
    Policy(String),
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Workspace content is exported from
    pub workspace: String,

    /// Base directory of export files
    pub directory: PathBuf,

    /// Preset key -> node type filter selecting document nodes
    pub document_type_filter_presets: IndexMap<String, String>,

    /// Preset key -> node type filter selecting content nodes
    pub content_type_filter_presets: IndexMap<String, String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        let mut document_type_filter_presets = IndexMap::new();
        document_type_filter_presets.insert(DEFAULT_PRESET.to_string(), "Traduki:Document".to_string());
        let mut content_type_filter_presets = IndexMap::new();
        content_type_filter_presets.insert(DEFAULT_PRESET.to_string(), "Traduki:Content".to_string());
        Self {
            workspace: LIVE_WORKSPACE.to_string(),
            directory: PathBuf::from("Data/Traduki/Export"),
            document_type_filter_presets,
            content_type_filter_presets,
        }
    }
}

/// Import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Base directory relative import file names are resolved against
    pub directory: PathBuf,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("Data/Traduki/Import"),
        }
    }
}

/// Account and access policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Roles of the executing account
    pub roles: Vec<String>,

    /// Path access rules; everything is readable when absent
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the dimension holding the language
    pub language_dimension: String,

    /// Source language used when an export does not name one
    pub source_language: String,

    /// Wire format version written on export
    pub format_version: String,

    /// Write sorting indexes and variant details on export
    pub debug: bool,

    pub export: ExportSettings,
    pub import: ImportSettings,

    /// Content dimensions by name
    pub dimensions: BTreeMap<String, DimensionConfig>,

    /// Node type declarations by name
    pub node_types: BTreeMap<String, NodeTypeDeclaration>,

    pub security: SecuritySettings,
}

impl Default for Settings {
    fn default() -> Self {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("language".to_string(), DimensionConfig::single("en"));
        Self {
            language_dimension: "language".to_string(),
            source_language: "en".to_string(),
            format_version: "2.0".to_string(),
            debug: false,
            export: ExportSettings::default(),
            import: ImportSettings::default(),
            dimensions,
            node_types: BTreeMap::new(),
            security: SecuritySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(data)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !matches!(self.format_version.as_str(), "1.0" | "2.0") {
            return Err(SettingsError::Invalid(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if !self.dimensions.contains_key(&self.language_dimension) {
            return Err(SettingsError::Invalid(format!(
                "language dimension {} is not configured",
                self.language_dimension
            )));
        }
        for (name, config) in &self.dimensions {
            if !config.presets.contains_key(&config.default) {
                return Err(SettingsError::Invalid(format!(
                    "default preset {} of dimension {} does not exist",
                    config.default, name
                )));
            }
            for (key, preset) in &config.presets {
                if preset.values.is_empty() {
                    return Err(SettingsError::Invalid(format!(
                        "preset {} of dimension {} has no values",
                        key, name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn combinator(&self) -> DimensionCombinator {
        DimensionCombinator::new(self.language_dimension.clone(), self.dimensions.clone())
    }

    pub fn node_type_manager(&self) -> NodeTypeManager {
        NodeTypeManager::new(self.node_types.clone())
    }

    /// Document type filter of a preset
    pub fn document_type_filter(&self, preset: &str) -> Option<NodeTypeFilter> {
        self.export
            .document_type_filter_presets
            .get(preset)
            .map(|filter| NodeTypeFilter::parse(filter))
    }

    /// Content type filter of a preset
    pub fn content_type_filter(&self, preset: &str) -> Option<NodeTypeFilter> {
        self.export
            .content_type_filter_presets
            .get(preset)
            .map(|filter| NodeTypeFilter::parse(filter))
    }

    /// Security context of the configured account
    pub fn security_context(&self) -> Result<SecurityContext, SettingsError> {
        let policy: Arc<dyn AccessPolicy> = match &self.security.policy {
            Some(content) => Arc::new(
                PathAccessPolicy::from_content(content).map_err(SettingsError::Policy)?,
            ),
            None => Arc::new(AllowAll),
        };
        Ok(SecurityContext::new(self.security.roles.clone(), policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SETTINGS: &str = r#"
        source_language = "de"
        format_version = "1.0"

        [export]
        workspace = "review"
        document_type_filter_presets = { default = "Acme:Document", landing = "Acme:LandingPage" }

        [dimensions.language]
        default = "de"
        presets.de = { values = ["de"] }
        presets.de_CH = { values = ["de_CH", "de"] }

        [node_types."Acme:Page"]
        properties.title = { type = "string" }

        [security]
        roles = ["Acme.Translator"]
        policy = """
        [/sites/acme/intern]
        * =
        """
    "#;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.language_dimension, "language");
        assert_eq!(settings.source_language, "en");
        assert_eq!(settings.format_version, "2.0");
        assert_eq!(settings.export.workspace, "live");
        assert!(settings.document_type_filter(DEFAULT_PRESET).is_some());
        assert_eq!(
            settings.combinator().fallback_chain_for_language("en"),
            Some(vec!["en".to_string()])
        );
    }

    #[test]
    fn test_parse_settings() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        assert_eq!(settings.source_language, "de");
        assert_eq!(settings.format_version, "1.0");
        assert_eq!(settings.export.workspace, "review");
        assert_eq!(
            settings.export.content_type_filter_presets.get(DEFAULT_PRESET).map(String::as_str),
            Some("Traduki:Content")
        );
        assert_eq!(
            settings.document_type_filter("landing").map(|f| f.to_string()),
            Some("Acme:LandingPage".to_string())
        );
        assert!(settings.document_type_filter("missing").is_none());
        assert_eq!(
            settings.combinator().fallback_chain_for_language("de_CH"),
            Some(vec!["de_CH".to_string(), "de".to_string()])
        );
        assert!(settings.node_type_manager().is_exported_string("Acme:Page", "title"));

        let security = settings.security_context().unwrap();
        assert_eq!(security.roles(), ["Acme.Translator".to_string()]);
        assert!(!security.can_read("/sites/acme/intern/page"));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            Settings::from_toml_str("format_version = \"3.0\""),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("language_dimension = \"locale\""),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[dimensions.language]\ndefault = \"en\"\npresets.en = { values = [] }"),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(Settings::from_toml_str("debug = 3"), Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("traduki.toml")).unwrap();
        assert_eq!(settings.format_version, "2.0");

        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "debug = true").unwrap();
        assert!(Settings::load(&path).unwrap().debug);
    }
}
