//! Owned element tree for hierarchical (XML) upstream responses.
//!
//! Upstream documents are parsed once into an ordered tree and then walked by
//! the extraction plan. Parsing is bounded by the document size and either
//! yields a complete tree or a parse error; there is no partial result.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Malformed hierarchical document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("xml parse error: {detail}")]
pub struct XmlParseError {
    detail: String,
}

impl XmlParseError {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// One element node: name, attributes, ordered children, and directly
/// contained text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: BTreeMap<String, String>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlParseError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = BTreeMap::new();
        for attribute in start.attributes() {
            let attribute =
                attribute.map_err(|e| XmlParseError::new(format!("bad attribute: {e}")))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| XmlParseError::new(format!("bad attribute value: {e}")))?
                .into_owned();
            attributes.insert(key, value);
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Text contained directly in this element, not including descendants.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> impl Iterator<Item = &Element> {
        // Explicit stack, pushed in reverse so pops come out in document order.
        let mut stack: Vec<&Element> = self.children.iter().rev().collect();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.iter().rev());
            Some(next)
        })
    }
}

/// A fully parsed hierarchical document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn parse(input: &str) -> Result<Self, XmlParseError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| XmlParseError::new(e.to_string()))?;
            match event {
                Event::Start(start) => {
                    stack.push(Element::from_start(&start)?);
                }
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    Self::close_element(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| XmlParseError::new(format!("bad text content: {e}")))?;
                    if let Some(open) = stack.last_mut() {
                        open.text.push_str(&value);
                    }
                }
                Event::CData(cdata) => {
                    if let Some(open) = stack.last_mut() {
                        open.text
                            .push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlParseError::new("unbalanced closing tag"))?;
                    Self::close_element(&mut stack, &mut root, element)?;
                }
                Event::Eof => break,
                // Declarations, comments, doctypes, and processing
                // instructions carry no record data.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlParseError::new("unclosed element at end of document"));
        }
        root.map(|root| Self { root })
            .ok_or_else(|| XmlParseError::new("document has no root element"))
    }

    fn close_element(
        stack: &mut Vec<Element>,
        root: &mut Option<Element>,
        element: Element,
    ) -> Result<(), XmlParseError> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
            Ok(())
        } else if root.is_none() {
            *root = Some(element);
            Ok(())
        } else {
            Err(XmlParseError::new("multiple root elements"))
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }
}
