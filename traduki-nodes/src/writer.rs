//! XML tree writer
//!
//! Emits the export document one element at a time. The document header
//! (format version, site, workspace, languages) is written before any node,
//! so a streaming reader can reject a file early.

use crate::error::Result;
use crate::format::FormatVersion;
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;
use tracing::debug;
use traduki_core::{NodeData, NodeTypeManager, PropertyValue};

/// Attributes of the `<content>` root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHeader {
    pub site_name: String,
    pub site_package_key: String,
    pub workspace: String,
    pub source_language: String,
    pub target_language: Option<String>,
    pub modified_after: Option<DateTime<Utc>>,
}

/// Split text into CDATA sections; `]]>` cannot occur inside one section
fn cdata_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        sections.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    sections.push(rest);
    sections
}

/// Streaming writer of the export format
pub struct TreeWriter<W: Write> {
    writer: Writer<W>,
    format: FormatVersion,
    language_dimension: String,
    debug: bool,
    nodes_written: usize,
    variants_written: usize,
}

impl<W: Write> TreeWriter<W> {
    pub fn new(inner: W, format: FormatVersion, language_dimension: impl Into<String>, debug: bool) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
            format,
            language_dimension: language_dimension.into(),
            debug,
            nodes_written: 0,
            variants_written: 0,
        }
    }

    pub fn nodes_written(&self) -> usize {
        self.nodes_written
    }

    pub fn variants_written(&self) -> usize {
        self.variants_written
    }

    /// Write the XML declaration, `<content>` and the opening `<nodes>`
    pub fn start_document(&mut self, header: &DocumentHeader) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut content = BytesStart::new("content");
        content.push_attribute(("name", header.site_name.as_str()));
        content.push_attribute(("sitePackageKey", header.site_package_key.as_str()));
        content.push_attribute((self.format.workspace_attribute(), header.workspace.as_str()));
        content.push_attribute(("sourceLanguage", header.source_language.as_str()));
        if let Some(target_language) = &header.target_language {
            content.push_attribute(("targetLanguage", target_language.as_str()));
        }
        if let Some(modified_after) = &header.modified_after {
            content.push_attribute(("modifiedAfter", modified_after.to_rfc3339().as_str()));
        }
        self.writer.write_event(Event::Start(content))?;

        let mut nodes = BytesStart::new("nodes");
        nodes.push_attribute(("formatVersion", self.format.as_str()));
        self.writer.write_event(Event::Start(nodes))?;
        Ok(())
    }

    /// Open a `<node>` element
    pub fn start_node(&mut self, node: &NodeData) -> Result<()> {
        let mut element = BytesStart::new("node");
        if self.format == FormatVersion::V2 {
            element.push_attribute(("nodeType", node.node_type.as_str()));
        }
        element.push_attribute(("nodeName", node.name()));
        element.push_attribute(("identifier", node.identifier.as_str()));
        if self.debug {
            element.push_attribute(("sortingIndex", node.index.to_string().as_str()));
        }
        self.writer.write_event(Event::Start(element))?;
        self.nodes_written += 1;
        Ok(())
    }

    pub fn end_node(&mut self) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new("node")))?;
        Ok(())
    }

    pub fn start_child_nodes(&mut self) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new("childNodes")))?;
        Ok(())
    }

    pub fn end_child_nodes(&mut self) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new("childNodes")))?;
        Ok(())
    }

    /// `<childNodes/>` of a node without content children
    pub fn empty_child_nodes(&mut self) -> Result<()> {
        self.writer.write_event(Event::Empty(BytesStart::new("childNodes")))?;
        Ok(())
    }

    /// Write one `<variant>` with its dimensions and string properties
    pub fn write_variant(&mut self, variant: &NodeData, node_types: &NodeTypeManager) -> Result<()> {
        let mut element = BytesStart::new("variant");
        if self.format == FormatVersion::V1 || self.debug {
            element.push_attribute(("nodeType", variant.node_type.as_str()));
        }
        if self.debug {
            element.push_attribute(("identifier", variant.identifier.as_str()));
            element.push_attribute(("nodeName", variant.name()));
            element.push_attribute(("dimensionsHash", variant.dimensions_hash().as_str()));
        }
        self.writer.write_event(Event::Start(element))?;

        self.write_dimensions(variant)?;
        self.write_properties(variant, node_types)?;

        self.writer.write_event(Event::End(BytesEnd::new("variant")))?;
        self.variants_written += 1;
        Ok(())
    }

    fn write_dimensions(&mut self, variant: &NodeData) -> Result<()> {
        let values: Vec<(&str, &str)> = variant
            .dimensions
            .iter()
            .filter(|(name, _)| **name != self.language_dimension)
            .flat_map(|(name, values)| values.iter().map(move |value| (name.as_str(), value.as_str())))
            .collect();

        if values.is_empty() {
            self.writer.write_event(Event::Empty(BytesStart::new("dimensions")))?;
            return Ok(());
        }

        self.writer.write_event(Event::Start(BytesStart::new("dimensions")))?;
        for (name, value) in values {
            self.writer.write_event(Event::Start(BytesStart::new(name)))?;
            self.writer.write_event(Event::Text(BytesText::new(value)))?;
            self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        self.writer.write_event(Event::End(BytesEnd::new("dimensions")))?;
        Ok(())
    }

    fn write_properties(&mut self, variant: &NodeData, node_types: &NodeTypeManager) -> Result<()> {
        let mut properties: Vec<(&str, &str)> = Vec::new();
        for (name, value) in &variant.properties {
            if !node_types.is_exported_string(&variant.node_type, name) {
                continue;
            }
            match value {
                PropertyValue::String(text) => properties.push((name.as_str(), text.as_str())),
                PropertyValue::Null => properties.push((name.as_str(), "")),
                other => debug!(
                    "Skipping property {} of {}: declared string but holds {}",
                    name, variant.path, other
                ),
            }
        }

        if properties.is_empty() {
            self.writer.write_event(Event::Empty(BytesStart::new("properties")))?;
            return Ok(());
        }

        self.writer.write_event(Event::Start(BytesStart::new("properties")))?;
        for (name, value) in properties {
            let mut element = BytesStart::new(name);
            element.push_attribute(("type", "string"));
            if value.is_empty() {
                self.writer.write_event(Event::Empty(element))?;
                continue;
            }
            self.writer.write_event(Event::Start(element))?;
            for section in cdata_sections(value) {
                self.writer.write_event(Event::CData(BytesCData::new(section)))?;
            }
            self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        self.writer.write_event(Event::End(BytesEnd::new("properties")))?;
        Ok(())
    }

    /// Close `<nodes>` and `<content>` and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_event(Event::End(BytesEnd::new("nodes")))?;
        self.writer.write_event(Event::End(BytesEnd::new("content")))?;
        self.writer.get_mut().write_all(b"\n")?;
        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }
}
