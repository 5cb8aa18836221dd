//! Wire format versions

use crate::error::{Result, TradukiError};
use std::fmt;

/// Revision of the XML schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    /// Flat whole-tree export
    V1,
    /// Nested document/content tree
    V2,
}

impl FormatVersion {
    pub const SUPPORTED: [&'static str; 2] = ["1.0", "2.0"];

    pub fn parse(version: &str) -> Result<Self> {
        match version {
            "1.0" => Ok(Self::V1),
            "2.0" => Ok(Self::V2),
            other => Err(TradukiError::UnsupportedFormatVersion(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
        }
    }

    /// Attribute of `<content>` naming the exported workspace
    pub fn workspace_attribute(&self) -> &'static str {
        match self {
            Self::V1 => "workspace",
            Self::V2 => "sourceWorkspace",
        }
    }

    /// Whether content nodes are nested below their documents
    pub fn is_nested(&self) -> bool {
        matches!(self, Self::V2)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
