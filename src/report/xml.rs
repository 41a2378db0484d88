//! Minimal in-memory XML element tree.
//!
//! JUnit reports are small enough to hold entirely in memory, and
//! restructuring one needs random access to its elements, which a streaming
//! reader can't give. This module reads a document into an [`Element`] tree
//! with `quick_xml::Reader` and writes it back out with `quick_xml::Writer`.
//!
//! Only elements, text and CDATA survive a round trip. Comments, processing
//! instructions and the DOCTYPE are dropped, and whitespace-only text between
//! sibling elements is treated as formatting and discarded; the writer
//! re-indents the output.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;

use super::ReportError;

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

/// An XML element with its attributes and children, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attribute names and unescaped values.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder form of [`Element::set_attribute`].
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Sets an attribute, replacing the value if it already exists.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Returns the value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Appends a child node.
    pub fn push(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
    }

    /// Iterates over the direct child elements, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Collects every descendant element named `name`, depth-first in
    /// document order. The element itself is not included.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// Parses a complete document and returns its root element.
    pub fn parse(xml: &str) -> Result<Element, ReportError> {
        let mut reader = Reader::from_str(xml);
        let mut open: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                ReportError::Malformed(format!(
                    "{} (at byte {})",
                    e,
                    reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(start) => {
                    if open.is_empty() && root.is_some() {
                        return Err(second_root(&start));
                    }
                    open.push(element_from_start(&start)?);
                }
                Event::Empty(start) => {
                    if open.is_empty() && root.is_some() {
                        return Err(second_root(&start));
                    }
                    let element = element_from_start(&start)?;
                    attach(element, &mut open, &mut root);
                }
                Event::End(_) => {
                    // The reader has already matched this against the open tag.
                    let element = open.pop().ok_or_else(|| {
                        ReportError::Malformed("end tag without a start tag".to_string())
                    })?;
                    attach(element, &mut open, &mut root);
                }
                Event::Text(text) => {
                    let raw = std::str::from_utf8(&text)
                        .map_err(|e| ReportError::Malformed(format!("invalid text: {}", e)))?;
                    let text = unescape(&normalize_line_endings(raw))
                        .map_err(|e| ReportError::Malformed(format!("invalid text: {}", e)))?
                        .into_owned();
                    match open.last_mut() {
                        Some(parent) => push_text(parent, &text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(ReportError::Malformed(
                                "text outside the root element".to_string(),
                            ));
                        }
                    }
                }
                Event::CData(data) => {
                    let data = String::from_utf8(data.into_inner().into_owned())
                        .map_err(|e| ReportError::Malformed(format!("invalid CDATA: {}", e)))?;
                    match open.last_mut() {
                        Some(parent) => parent.children.push(Node::CData(data)),
                        None => {
                            return Err(ReportError::Malformed(
                                "CDATA outside the root element".to_string(),
                            ));
                        }
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, DOCTYPE
                _ => {}
            }
        }

        if let Some(unclosed) = open.last() {
            return Err(ReportError::Malformed(format!(
                "unexpected end of document inside <{}>",
                unclosed.name
            )));
        }

        root.ok_or_else(|| ReportError::Malformed("document has no root element".to_string()))
    }

    /// Serializes the tree as a UTF-8 document with an XML declaration.
    pub fn to_document(&self) -> anyhow::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write_to(&mut writer)?;

        let mut xml = String::from_utf8(writer.into_inner())?;
        xml.push('\n');
        Ok(xml)
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> anyhow::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (name, value) in &self.attributes {
            start.push_attribute(Attribute {
                key: QName(name.as_bytes()),
                value: Cow::Owned(escape_attribute(value).into_bytes()),
            });
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_to(writer)?,
                Node::Text(text) => {
                    writer.write_event(Event::Text(BytesText::from_escaped(escape_text(text))))?
                }
                Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;

        Ok(())
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, ReportError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| ReportError::Malformed(format!("invalid element name: {}", e)))?
        .to_string();

    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            ReportError::Malformed(format!("invalid attribute in <{}>: {}", element.name, e))
        })?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| ReportError::Malformed(format!("invalid attribute name: {}", e)))?
            .to_string();
        let invalid = |e: &dyn std::fmt::Display| {
            ReportError::Malformed(format!("invalid value for attribute '{}': {}", key, e))
        };
        let raw = std::str::from_utf8(&attr.value).map_err(|e| invalid(&e))?;
        // Literal whitespace normalizes to a space; character references do not.
        let raw = normalize_line_endings(raw).replace(['\t', '\n'], " ");
        let value = unescape(&raw).map_err(|e| invalid(&e))?.into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

/// Converts `\r\n` and lone `\r` to `\n`, as XML parsers do before
/// reporting text.
fn normalize_line_endings(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Escapes an attribute value so whitespace survives attribute-value
/// normalization when the document is read back.
fn escape_attribute(value: &str) -> String {
    escape(value)
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}

/// Escapes text content; a raw `\r` would be read back as `\n`.
fn escape_text(text: &str) -> String {
    escape(text).replace('\r', "&#13;")
}

fn second_root(start: &BytesStart<'_>) -> ReportError {
    ReportError::Malformed(format!(
        "second root element <{}>",
        String::from_utf8_lossy(start.name().as_ref())
    ))
}

/// Appends text to `parent`, merging with a preceding text node.
fn push_text(parent: &mut Element, text: &str) {
    if let Some(Node::Text(last)) = parent.children.last_mut() {
        last.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

/// Hands a closed element to its parent, or makes it the root.
fn attach(mut element: Element, open: &mut [Element], root: &mut Option<Element>) {
    drop_formatting_whitespace(&mut element);
    match open.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn drop_formatting_whitespace(element: &mut Element) {
    let has_elements = element
        .children
        .iter()
        .any(|child| matches!(child, Node::Element(_)));
    if has_elements {
        element
            .children
            .retain(|child| !matches!(child, Node::Text(text) if text.trim().is_empty()));
    }
}
