//! Document tree adapter.
//!
//! Turns program-document bytes into a generic, read-only element tree. This
//! is the external collaborator the loader (`program.rs`) is built against:
//! it performs no semantic validation of its own, only enough normalisation
//! (dropping whitespace-only text nodes between elements) that the loader
//! sees a clean child list when it inspects an instruction's arguments.

use crate::error::{Error, Result};

/// A read-only XML-like element: a tag name, its attributes in document
/// order, and its element children in document order.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse `source` as an element tree, or report [`Error::BadDocument`].
///
/// A zero-byte document parses to `None`; the loader treats that as a
/// successful no-op program. Whitespace-only content is not empty — it is
/// not well-formed XML either, and falls through to the parser below so it
/// surfaces as `BadDocument` like any other malformed markup.
pub fn parse(source: &str) -> Result<Option<Element>> {
    if source.is_empty() {
        return Ok(None);
    }

    let doc = roxmltree::Document::parse(source)
        .map_err(|e| Error::BadDocument(e.to_string()))?;

    Ok(Some(to_element(doc.root_element())))
}

fn to_element(node: roxmltree::Node) -> Element {
    let tag = node.tag_name().name().to_string();
    let attrs = node
        .attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();

    let children = node
        .children()
        .filter(|c| c.is_element())
        .map(to_element)
        .collect();

    // Concatenate direct text children; whitespace-only text between
    // sibling elements carries no meaning for this document shape.
    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();

    Element {
        tag,
        attrs,
        children,
        text,
    }
}
