//! Streaming XML tree reader
//!
//! Pulls the export format apart one event at a time: the document header
//! first, then node starts, completed variants and node ends in document
//! order. Only the element stack and the variant being read are held in
//! memory.

use crate::error::{Result, TradukiError};
use crate::format::FormatVersion;
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::BufRead;
use tracing::debug;
use traduki_core::DimensionValues;

/// Attributes of `<content>` and `<nodes>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportHeader {
    pub format: FormatVersion,
    pub site_name: Option<String>,
    pub site_package_key: String,
    /// `workspace` (1.0) or `sourceWorkspace` (2.0), by format version
    pub source_workspace: Option<String>,
    pub source_language: String,
    pub target_language: Option<String>,
    pub modified_after: Option<String>,
}

/// One `<variant>` as read from the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedVariant {
    /// Non-language dimensions
    pub dimensions: DimensionValues,
    /// Property name -> text, in document order
    pub properties: IndexMap<String, String>,
}

/// Events produced while reading `<nodes>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    NodeStart { identifier: String },
    Variant(ParsedVariant),
    NodeEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    SeekingContentRoot,
    ReadingMetadata,
    SeekingNodesElement,
    InNodes,
    InDimensions { current: Option<String> },
    InProperties { current: Option<String> },
    Done,
}

/// Owned view of one parser event
enum Token {
    Start { name: String, attributes: HashMap<String, String> },
    Empty { name: String, attributes: HashMap<String, String> },
    End(String),
    Text(String),
    Eof,
    Skip,
}

fn element_name(element: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(element.name().as_ref())
        .map(str::to_string)
        .map_err(|e| TradukiError::MalformedXml(e.to_string()))
}

fn element_attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut attributes = HashMap::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| TradukiError::MalformedXml(e.to_string()))?
            .to_string();
        let value = attribute.unescape_value()?.into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

/// Pull reader of the export format
pub struct TreeReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: State,
    stack: Vec<String>,
    variant: Option<ParsedVariant>,
    pending: Option<ReaderEvent>,
}

impl<R: BufRead> TreeReader<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            state: State::SeekingContentRoot,
            stack: Vec::new(),
            variant: None,
            pending: None,
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.buf.clear();
        let token = match self.reader.read_event_into(&mut self.buf)? {
            Event::Start(e) => Token::Start {
                name: element_name(&e)?,
                attributes: element_attributes(&e)?,
            },
            Event::Empty(e) => Token::Empty {
                name: element_name(&e)?,
                attributes: element_attributes(&e)?,
            },
            Event::End(e) => Token::End(
                std::str::from_utf8(e.name().as_ref())
                    .map_err(|e| TradukiError::MalformedXml(e.to_string()))?
                    .to_string(),
            ),
            Event::Text(e) => Token::Text(e.unescape()?.into_owned()),
            Event::CData(e) => Token::Text(
                String::from_utf8(e.into_inner().into_owned())
                    .map_err(|e| TradukiError::MalformedXml(e.to_string()))?,
            ),
            Event::Eof => Token::Eof,
            _ => Token::Skip,
        };
        Ok(token)
    }

    /// Read up to and including the opening `<nodes>` element
    pub fn read_header(&mut self) -> Result<ImportHeader> {
        let mut content: Option<HashMap<String, String>> = None;
        loop {
            let token = self.next_token()?;
            match (self.state.clone(), token) {
                (State::SeekingContentRoot, Token::Start { name, attributes }) if name == "content" => {
                    content = Some(attributes);
                    self.state = State::ReadingMetadata;
                }
                (State::SeekingContentRoot, Token::Eof) => {
                    return Err(TradukiError::MalformedXml("no <content> element found".into()));
                }
                (State::SeekingContentRoot, _) => {}
                (State::ReadingMetadata | State::SeekingNodesElement, token) => {
                    self.state = State::SeekingNodesElement;
                    let (attributes, empty) = match token {
                        Token::Start { name, attributes } if name == "nodes" => (attributes, false),
                        Token::Empty { name, attributes } if name == "nodes" => (attributes, true),
                        Token::Eof => {
                            return Err(TradukiError::MalformedXml("no <nodes> element found".into()));
                        }
                        _ => continue,
                    };
                    let content = content.take().unwrap_or_default();
                    let header = Self::build_header(content, &attributes)?;
                    self.state = if empty { State::Done } else { State::InNodes };
                    return Ok(header);
                }
                (state, _) => {
                    return Err(TradukiError::MalformedXml(format!(
                        "header requested in state {:?}",
                        state
                    )));
                }
            }
        }
    }

    fn build_header(
        mut content: HashMap<String, String>,
        nodes: &HashMap<String, String>,
    ) -> Result<ImportHeader> {
        let version = nodes
            .get("formatVersion")
            .ok_or_else(|| TradukiError::missing_attribute("nodes", "formatVersion"))?;
        let format = FormatVersion::parse(version)?;
        let site_package_key = content
            .remove("sitePackageKey")
            .ok_or_else(|| TradukiError::missing_attribute("content", "sitePackageKey"))?;
        let source_language = content
            .remove("sourceLanguage")
            .ok_or_else(|| TradukiError::missing_attribute("content", "sourceLanguage"))?;
        Ok(ImportHeader {
            format,
            site_name: content.remove("name"),
            site_package_key,
            source_workspace: content.remove(format.workspace_attribute()),
            source_language,
            target_language: content.remove("targetLanguage").filter(|l| !l.is_empty()),
            modified_after: content.remove("modifiedAfter"),
        })
    }

    fn variant_mut(&mut self, element: &str) -> Result<&mut ParsedVariant> {
        self.variant
            .as_mut()
            .ok_or_else(|| TradukiError::UnexpectedElement(element.to_string()))
    }

    /// Next node event; `None` once `</nodes>` has been read
    pub fn next_event(&mut self) -> Result<Option<ReaderEvent>> {
        if let Some(event) = self.pending.take() {
            return Ok(Some(event));
        }
        loop {
            if self.state == State::Done {
                return Ok(None);
            }
            let token = self.next_token()?;
            if let Token::Eof = token {
                return Err(TradukiError::MalformedXml("unexpected end of document".into()));
            }

            let state = std::mem::replace(&mut self.state, State::Done);
            let (next, event) = match state {
                State::InNodes => self.in_nodes(token)?,
                State::InDimensions { current } => (self.in_dimensions(current, token)?, None),
                State::InProperties { current } => (self.in_properties(current, token)?, None),
                other => {
                    return Err(TradukiError::MalformedXml(format!(
                        "node events requested in state {:?}",
                        other
                    )));
                }
            };
            self.state = next;
            if event.is_some() {
                return Ok(event);
            }
        }
    }

    fn in_nodes(&mut self, token: Token) -> Result<(State, Option<ReaderEvent>)> {
        match token {
            Token::Start { name, attributes } => {
                let parent = self.stack.last().cloned();
                let next = match (name.as_str(), parent.as_deref()) {
                    ("node", None | Some("childNodes")) => {
                        let identifier = attributes
                            .get("identifier")
                            .cloned()
                            .ok_or_else(|| TradukiError::missing_attribute("node", "identifier"))?;
                        self.stack.push(name);
                        return Ok((State::InNodes, Some(ReaderEvent::NodeStart { identifier })));
                    }
                    ("variant", Some("node")) => {
                        self.variant = Some(ParsedVariant::default());
                        State::InNodes
                    }
                    ("childNodes", Some("node")) => State::InNodes,
                    ("dimensions", Some("variant")) => {
                        self.variant_mut(&name)?;
                        State::InDimensions { current: None }
                    }
                    ("properties", Some("variant")) => {
                        self.variant_mut(&name)?;
                        State::InProperties { current: None }
                    }
                    _ => return Err(TradukiError::UnexpectedElement(name)),
                };
                if !matches!(next, State::InDimensions { .. } | State::InProperties { .. }) {
                    self.stack.push(name);
                }
                Ok((next, None))
            }
            Token::Empty { name, attributes } => {
                let parent = self.stack.last().map(String::as_str);
                match (name.as_str(), parent) {
                    ("node", None | Some("childNodes")) => {
                        let identifier = attributes
                            .get("identifier")
                            .cloned()
                            .ok_or_else(|| TradukiError::missing_attribute("node", "identifier"))?;
                        self.pending = Some(ReaderEvent::NodeEnd);
                        Ok((State::InNodes, Some(ReaderEvent::NodeStart { identifier })))
                    }
                    ("variant", Some("node")) => {
                        debug!("Ignoring empty variant element");
                        Ok((State::InNodes, None))
                    }
                    ("childNodes", Some("node")) | ("dimensions" | "properties", Some("variant")) => {
                        Ok((State::InNodes, None))
                    }
                    _ => Err(TradukiError::UnexpectedElement(name)),
                }
            }
            Token::End(name) => {
                if name == "nodes" && self.stack.is_empty() {
                    return Ok((State::Done, None));
                }
                if self.stack.last() != Some(&name) {
                    return Err(TradukiError::UnexpectedEndElement(name));
                }
                self.stack.pop();
                match name.as_str() {
                    "node" => Ok((State::InNodes, Some(ReaderEvent::NodeEnd))),
                    "variant" => {
                        let event = self.variant.take().map(ReaderEvent::Variant);
                        Ok((State::InNodes, event))
                    }
                    "childNodes" => Ok((State::InNodes, None)),
                    _ => Err(TradukiError::UnexpectedEndElement(name)),
                }
            }
            Token::Text(_) | Token::Skip | Token::Eof => Ok((State::InNodes, None)),
        }
    }

    fn in_dimensions(&mut self, current: Option<String>, token: Token) -> Result<State> {
        match token {
            Token::Start { name, .. } => Ok(State::InDimensions { current: Some(name) }),
            Token::End(name) if name == "dimensions" => Ok(State::InNodes),
            Token::End(_) | Token::Empty { .. } => Ok(State::InDimensions { current: None }),
            Token::Text(value) => {
                if let Some(dimension) = &current {
                    let variant = self.variant_mut("dimensions")?;
                    let mut values = variant.dimensions.get(dimension).map(<[String]>::to_vec).unwrap_or_default();
                    values.push(value);
                    variant.dimensions.insert(dimension.clone(), values);
                }
                Ok(State::InDimensions { current })
            }
            Token::Skip | Token::Eof => Ok(State::InDimensions { current }),
        }
    }

    fn in_properties(&mut self, current: Option<String>, token: Token) -> Result<State> {
        match token {
            Token::Start { name, attributes } => {
                if attributes.get("type").map(String::as_str) != Some("string") {
                    return Err(TradukiError::NonStringProperty(name));
                }
                self.variant_mut("properties")?
                    .properties
                    .insert(name.clone(), String::new());
                Ok(State::InProperties { current: Some(name) })
            }
            Token::Empty { name, attributes } => {
                if attributes.get("type").map(String::as_str) != Some("string") {
                    return Err(TradukiError::NonStringProperty(name));
                }
                self.variant_mut("properties")?
                    .properties
                    .insert(name, String::new());
                Ok(State::InProperties { current: None })
            }
            Token::End(name) if name == "properties" => Ok(State::InNodes),
            Token::End(_) => Ok(State::InProperties { current: None }),
            Token::Text(text) => {
                if let Some(property) = &current {
                    if let Some(value) = self.variant_mut("properties")?.properties.get_mut(property) {
                        value.push_str(&text);
                    }
                }
                Ok(State::InProperties { current })
            }
            Token::Skip | Token::Eof => Ok(State::InProperties { current }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<content name="Acme" sitePackageKey="Acme.Site" sourceWorkspace="live" sourceLanguage="en" targetLanguage="fr">
  <nodes formatVersion="2.0">
    <node nodeType="Acme:Page" nodeName="home" identifier="n1">
      <variant>
        <dimensions>
          <country>ch</country>
        </dimensions>
        <properties>
          <title type="string"><![CDATA[Fish & <Chips>]]></title>
          <teaser type="string"/>
          <note type="string"><![CDATA[a]]]]><![CDATA[>b]]></note>
        </properties>
      </variant>
      <childNodes>
        <node nodeType="Acme:Text" nodeName="text" identifier="n2">
          <variant>
            <dimensions/>
            <properties>
              <text type="string">plain &amp; simple</text>
            </properties>
          </variant>
          <childNodes/>
        </node>
      </childNodes>
    </node>
  </nodes>
</content>
"#;

    fn reader(xml: &str) -> TreeReader<&[u8]> {
        TreeReader::new(xml.as_bytes())
    }

    fn events(reader: &mut TreeReader<&[u8]>) -> Result<Vec<ReaderEvent>> {
        let mut events = Vec::new();
        while let Some(event) = reader.next_event()? {
            events.push(event);
        }
        Ok(events)
    }

    #[test]
    fn test_header() {
        let mut reader = reader(DOCUMENT);
        let header = reader.read_header().unwrap();
        assert_eq!(header.format, FormatVersion::V2);
        assert_eq!(header.site_name.as_deref(), Some("Acme"));
        assert_eq!(header.site_package_key, "Acme.Site");
        assert_eq!(header.source_workspace.as_deref(), Some("live"));
        assert_eq!(header.source_language, "en");
        assert_eq!(header.target_language.as_deref(), Some("fr"));
        assert!(header.modified_after.is_none());
    }

    #[test]
    fn test_events_in_document_order() {
        let mut reader = reader(DOCUMENT);
        reader.read_header().unwrap();
        let events = events(&mut reader).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], ReaderEvent::NodeStart { identifier: "n1".into() });

        let ReaderEvent::Variant(variant) = &events[1] else {
            panic!("expected variant, got {:?}", events[1]);
        };
        assert_eq!(variant.dimensions.get("country"), Some(&["ch".to_string()][..]));
        assert_eq!(variant.properties.get("title").map(String::as_str), Some("Fish & <Chips>"));
        assert_eq!(variant.properties.get("teaser").map(String::as_str), Some(""));
        assert_eq!(variant.properties.get("note").map(String::as_str), Some("a]]>b"));

        assert_eq!(events[2], ReaderEvent::NodeStart { identifier: "n2".into() });
        let ReaderEvent::Variant(text) = &events[3] else {
            panic!("expected variant, got {:?}", events[3]);
        };
        assert!(text.dimensions.is_empty());
        assert_eq!(text.properties.get("text").map(String::as_str), Some("plain & simple"));
        assert_eq!(events[4], ReaderEvent::NodeEnd);
        assert_eq!(events[5], ReaderEvent::NodeEnd);
    }

    #[test]
    fn test_legacy_workspace_attribute() {
        let xml = r#"<content sitePackageKey="Acme.Site" workspace="review" sourceWorkspace="ignored" sourceLanguage="en"><nodes formatVersion="1.0"></nodes></content>"#;
        let mut reader = reader(xml);
        let header = reader.read_header().unwrap();
        assert_eq!(header.format, FormatVersion::V1);
        assert_eq!(header.source_workspace.as_deref(), Some("review"));
        assert!(header.target_language.is_none());
        assert!(reader.next_event().unwrap().is_none());
    }

    #[test]
    fn test_unsupported_version() {
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="3.0"></nodes></content>"#;
        assert!(matches!(
            reader(xml).read_header(),
            Err(TradukiError::UnsupportedFormatVersion(v)) if v == "3.0"
        ));
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes></nodes></content>"#;
        assert!(matches!(reader(xml).read_header(), Err(TradukiError::MissingAttribute { .. })));
    }

    #[test]
    fn test_non_string_property() {
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0">
            <node identifier="n1"><variant><properties><count type="integer">3</count></properties></variant></node>
        </nodes></content>"#;
        let mut reader = reader(xml);
        reader.read_header().unwrap();
        assert_eq!(reader.next_event().unwrap(), Some(ReaderEvent::NodeStart { identifier: "n1".into() }));
        assert!(matches!(reader.next_event(), Err(TradukiError::NonStringProperty(p)) if p == "count"));
    }

    #[test]
    fn test_unexpected_elements() {
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0"><page/></nodes></content>"#;
        let mut reader = reader(xml);
        reader.read_header().unwrap();
        assert!(matches!(reader.next_event(), Err(TradukiError::UnexpectedElement(e)) if e == "page"));

        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0"><node identifier="n1"><properties></properties></node></nodes></content>"#;
        let mut reader = self::reader(xml);
        reader.read_header().unwrap();
        reader.next_event().unwrap();
        assert!(matches!(reader.next_event(), Err(TradukiError::UnexpectedElement(e)) if e == "properties"));
    }

    #[test]
    fn test_unknown_element_inside_node() {
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0"><node identifier="n1"><variant></variant><extra></extra></node></nodes></content>"#;
        let mut reader = reader(xml);
        reader.read_header().unwrap();
        reader.next_event().unwrap();
        reader.next_event().unwrap();
        assert!(matches!(reader.next_event(), Err(TradukiError::UnexpectedElement(e)) if e == "extra"));
    }

    #[test]
    fn test_truncated_document() {
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0"><node identifier="n1">"#;
        let mut reader = reader(xml);
        reader.read_header().unwrap();
        reader.next_event().unwrap();
        assert!(reader.next_event().is_err());
    }

    #[test]
    fn test_self_closing_elements() {
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0">
            <node identifier="n1"><variant/><childNodes><node identifier="n2"/></childNodes></node>
            <node identifier="n3"/>
        </nodes></content>"#;
        let mut reader = reader(xml);
        reader.read_header().unwrap();
        assert_eq!(
            events(&mut reader).unwrap(),
            vec![
                ReaderEvent::NodeStart { identifier: "n1".into() },
                ReaderEvent::NodeStart { identifier: "n2".into() },
                ReaderEvent::NodeEnd,
                ReaderEvent::NodeEnd,
                ReaderEvent::NodeStart { identifier: "n3".into() },
                ReaderEvent::NodeEnd,
            ]
        );

        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0"><node nodeName="x"/></nodes></content>"#;
        let mut reader = self::reader(xml);
        reader.read_header().unwrap();
        assert!(matches!(reader.next_event(), Err(TradukiError::MissingAttribute { .. })));
    }

    #[test]
    fn test_missing_identifier() {
        let xml = r#"<content sitePackageKey="Acme.Site" sourceLanguage="en"><nodes formatVersion="2.0"><node nodeName="x"></node></nodes></content>"#;
        let mut reader = reader(xml);
        reader.read_header().unwrap();
        assert!(matches!(reader.next_event(), Err(TradukiError::MissingAttribute { .. })));
    }
}
