//! Errors of the export/import engine

use traduki_core::{SettingsError, StoreError};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, TradukiError>;

/// Errors raised by export and import runs.
///
/// Every variant carries a stable code, see [`TradukiError::code`].
#[derive(Debug, thiserror::Error)]
pub enum TradukiError {
    #[error("Could not find node \"{0}\"")]
    StartingPointNotFound(String),

    #[error("Could not find workspace \"{0}\"")]
    WorkspaceNotFound(String),

    #[error("Unsupported format version ({0})")]
    UnsupportedFormatVersion(String),

    #[error("Site for package \"{0}\" specified in the XML as site package could not be found")]
    SitePackageUnknown(String),

    #[error("No site found for node \"{0}\"")]
    SiteNotFound(String),

    #[error("No target language given (neither in XML nor as argument)")]
    NoTargetLanguage,

    #[error("No language dimension preset found for language \"{0}\"")]
    NoDimensionPresetForLanguage(String),

    #[error("Unexpected element <{0}>")]
    UnexpectedElement(String),

    #[error("Unexpected end element </{0}>")]
    UnexpectedEndElement(String),

    #[error("Non-string property \"{0}\" found in XML file")]
    NonStringProperty(String),

    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    #[error("Missing attribute \"{attribute}\" on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Unknown {kind} type filter preset \"{preset}\"")]
    FilterPresetUnknown { kind: &'static str, preset: String },

    #[error("Node {path} of type {node_type} matches both the document and the content type filter")]
    TypeFilterOverlap { path: String, node_type: String },

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TradukiError {
    /// Stable code of the error
    pub fn code(&self) -> &'static str {
        match self {
            Self::StartingPointNotFound(_) => "starting-point-not-found",
            Self::WorkspaceNotFound(_) => "workspace-not-found",
            Self::UnsupportedFormatVersion(_) => "unsupported-format-version",
            Self::SitePackageUnknown(_) => "site-package-unknown",
            Self::SiteNotFound(_) => "site-not-found",
            Self::NoTargetLanguage => "no-target-language",
            Self::NoDimensionPresetForLanguage(_) => "no-dimension-preset-for-language",
            Self::UnexpectedElement(_) => "unexpected-element",
            Self::UnexpectedEndElement(_) => "unexpected-end-element",
            Self::NonStringProperty(_) => "non-string-property",
            Self::MalformedXml(_) => "malformed-xml",
            Self::MissingAttribute { .. } => "missing-attribute",
            Self::FilterPresetUnknown { .. } => "filter-preset-unknown",
            Self::TypeFilterOverlap { .. } => "type-filter-overlap",
            Self::Settings(_) => "settings",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
        }
    }

    /// Whether the error aborts a run before any node is read or written
    pub fn is_fatal_preflight(&self) -> bool {
        matches!(
            self,
            Self::StartingPointNotFound(_)
                | Self::WorkspaceNotFound(_)
                | Self::UnsupportedFormatVersion(_)
                | Self::SitePackageUnknown(_)
                | Self::SiteNotFound(_)
                | Self::NoTargetLanguage
                | Self::NoDimensionPresetForLanguage(_)
                | Self::FilterPresetUnknown { .. }
        )
    }

    pub(crate) fn missing_attribute(element: &str, attribute: &str) -> Self {
        Self::MissingAttribute {
            element: element.to_string(),
            attribute: attribute.to_string(),
        }
    }
}

impl From<StoreError> for TradukiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::WorkspaceNotFound(name) => TradukiError::WorkspaceNotFound(name),
            other => TradukiError::Store(other),
        }
    }
}

impl From<quick_xml::Error> for TradukiError {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Io(io) => {
                TradukiError::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            other => TradukiError::MalformedXml(other.to_string()),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for TradukiError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        TradukiError::MalformedXml(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_workspace_error_maps_to_engine_error() {
        let error = TradukiError::from(StoreError::WorkspaceNotFound("review".into()));
        assert!(matches!(error, TradukiError::WorkspaceNotFound(ref name) if name == "review"));
        assert_eq!(error.code(), "workspace-not-found");
        assert!(error.is_fatal_preflight());

        let error = TradukiError::from(StoreError::Database("locked".into()));
        assert_eq!(error.code(), "store");
        assert!(!error.is_fatal_preflight());
    }

    #[test]
    fn test_mid_stream_errors_are_not_preflight() {
        for error in [
            TradukiError::UnexpectedElement("foo".into()),
            TradukiError::UnexpectedEndElement("foo".into()),
            TradukiError::NonStringProperty("title".into()),
            TradukiError::MalformedXml("eof".into()),
        ] {
            assert!(!error.is_fatal_preflight(), "{}", error.code());
        }
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            TradukiError::NonStringProperty("title".into()).to_string(),
            "Non-string property \"title\" found in XML file"
        );
        assert_eq!(
            TradukiError::missing_attribute("node", "identifier").to_string(),
            "Missing attribute \"identifier\" on <node>"
        );
    }
}
