//! Generic record tree.
//!
//! One input record is parsed into a tree of [`Node`]s that keeps qualified
//! names, attributes and trimmed text. The same type carries the output tree
//! produced by the mapping engine.

use std::collections::BTreeMap;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{ParseError, PathError};
use crate::parser::{MetadataParser, ParseOptions};
use crate::path::{Path, Tag};
use crate::rec_def::Namespace;
use crate::xml::{XmlError, document_writer, finish_document, write_event};

/// One element of a record or output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: Tag,
    pub attributes: BTreeMap<Tag, String>,
    pub text: Option<String>,
    pub children: Vec<Node>,
}

/// A value found by navigating a tree: an element or an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Node(&'a Node),
    Attribute(&'a str),
}

impl<'a> Value<'a> {
    /// Element text or attribute value.
    pub fn text(&self) -> Option<&'a str> {
        match self {
            Value::Node(node) => node.text.as_deref(),
            Value::Attribute(value) => Some(value),
        }
    }

    pub fn node(&self) -> Option<&'a Node> {
        match self {
            Value::Node(node) => Some(node),
            Value::Attribute(_) => None,
        }
    }
}

impl Node {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, tag: Tag, value: impl Into<String>) -> Self {
        self.attributes.insert(tag, value.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Parse a single XML document into a tree.
    pub fn parse(xml: &str) -> Result<Node, ParseError> {
        Self::parse_with_options(xml, ParseOptions::default())
    }

    /// Parse a single XML document, qualifying unprefixed element tags.
    pub fn parse_with_prefix(xml: &str, default_prefix: &str) -> Result<Node, ParseError> {
        Self::parse_with_options(
            xml,
            ParseOptions::default().with_default_prefix(Some(default_prefix.to_string())),
        )
    }

    fn parse_with_options(xml: &str, options: ParseOptions) -> Result<Node, ParseError> {
        let mut parser = MetadataParser::new(xml.as_bytes(), options);
        match parser.next() {
            Some(record) => Ok(record?.root),
            None => Err(XmlError::new(0, "document has no root element").into()),
        }
    }

    pub fn attribute(&self, tag: &Tag) -> Option<&str> {
        self.attributes.get(tag).map(String::as_str)
    }

    /// Unprefixed attribute looked up by name, as used in definition documents.
    pub fn plain_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(tag, _)| tag.prefix().is_none() && tag.local_name() == name)
            .map(|(_, value)| value.as_str())
    }

    /// Unprefixed child elements with the given local name.
    pub fn elements<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Node> + use<'a, 'n> {
        self.children
            .iter()
            .filter(move |child| child.tag.prefix().is_none() && child.tag.local_name() == name)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children_named<'a, 't>(
        &'a self,
        tag: &'t Tag,
    ) -> impl Iterator<Item = &'a Node> + use<'a, 't> {
        self.children.iter().filter(move |child| &child.tag == tag)
    }

    /// True when the node carries no text, attributes or children.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.attributes.is_empty() && self.children.is_empty()
    }

    /// Navigate `relative` (tags below this node) and collect every match in
    /// document order. Repeated elements fan out at each step.
    pub fn select<'a>(&'a self, relative: &Path) -> Vec<Value<'a>> {
        let mut current = vec![Value::Node(self)];
        for tag in relative.iter() {
            let mut next = Vec::new();
            for value in &current {
                let Some(node) = value.node() else { continue };
                if tag.is_attribute() {
                    if let Some(attr) = node.attributes.get(tag) {
                        next.push(Value::Attribute(attr.as_str()));
                    }
                } else {
                    next.extend(node.children_named(tag).map(Value::Node));
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }

    /// Visit every non-empty element text and attribute value with its path,
    /// starting with this node's own tag.
    pub fn visit_values<F>(&self, visitor: &mut F) -> Result<(), PathError>
    where
        F: FnMut(&Path, &str),
    {
        let path = Path::from_tags(vec![self.tag.clone()])?;
        self.visit_from(&path, visitor)
    }

    fn visit_from<F>(&self, path: &Path, visitor: &mut F) -> Result<(), PathError>
    where
        F: FnMut(&Path, &str),
    {
        for (tag, value) in &self.attributes {
            if !value.trim().is_empty() {
                visitor(&path.child(tag.clone())?, value);
            }
        }
        if let Some(text) = &self.text {
            visitor(path, text);
        }
        for child in &self.children {
            child.visit_from(&path.child(child.tag.clone())?, visitor)?;
        }
        Ok(())
    }

    /// Write this node as an element, declaring `namespaces` on it.
    pub fn write_xml(
        &self,
        writer: &mut Writer<Vec<u8>>,
        namespaces: &[Namespace],
    ) -> Result<(), XmlError> {
        let name = self.tag.qualified_name();
        let mut start = BytesStart::new(name.as_str());
        for namespace in namespaces {
            let key = if namespace.prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", namespace.prefix)
            };
            start.push_attribute((key.as_str(), namespace.uri.as_str()));
        }
        for (tag, value) in &self.attributes {
            let key = tag.qualified_name();
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.text.is_none() && self.children.is_empty() {
            return write_event(writer, Event::Empty(start));
        }
        write_event(writer, Event::Start(start))?;
        if let Some(text) = &self.text {
            write_event(writer, Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write_xml(writer, &[])?;
        }
        write_event(writer, Event::End(BytesEnd::new(name.as_str())))
    }

    /// Render this node as a standalone document without declaration.
    pub fn to_xml_string(&self, namespaces: &[Namespace]) -> Result<String, XmlError> {
        let mut writer = document_writer();
        self.write_xml(&mut writer, namespaces)?;
        finish_document(writer)
    }
}

/// One parsed input record with its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub id: String,
    /// 1-based position in the source stream.
    pub number: usize,
    pub root: Node,
}

impl MetadataRecord {
    pub fn new(id: impl Into<String>, number: usize, root: Node) -> Self {
        Self {
            id: id.into(),
            number,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(text: &str) -> Tag {
        Tag::parse(text).unwrap()
    }

    fn sample() -> Node {
        Node::parse(
            r#"<record id="7">
                 <title>  First  </title>
                 <actor><name>Ann</name></actor>
                 <actor><name>Bob</name></actor>
               </record>"#,
        )
        .unwrap()
    }

    #[test]
    fn parse_trims_text_and_keeps_attributes() {
        let root = sample();
        assert_eq!(root.tag, tag("record"));
        assert_eq!(root.text, None);
        assert_eq!(root.attribute(&tag("@id")), Some("7"));
        assert_eq!(root.children[0].text(), Some("First"));
    }

    #[test]
    fn select_fans_out_over_repeats() {
        let root = sample();
        let names: Vec<_> = root
            .select(&Path::parse("/actor/name").unwrap())
            .iter()
            .filter_map(Value::text)
            .collect();
        assert_eq!(names, vec!["Ann", "Bob"]);
        let id = root.select(&Path::parse("/@id").unwrap());
        assert_eq!(id, vec![Value::Attribute("7")]);
        assert!(root.select(&Path::parse("/missing/x").unwrap()).is_empty());
    }

    #[test]
    fn lookups_outlive_their_name() {
        let root = sample();
        let actors: Vec<&Node> = {
            let name = String::from("actor");
            root.elements(&name).collect()
        };
        assert_eq!(actors.len(), 2);
        let titles: Vec<&Node> = {
            let title = tag("title");
            root.children_named(&title).collect()
        };
        assert_eq!(titles[0].text(), Some("First"));
    }

    #[test]
    fn visit_values_reports_paths() {
        let mut seen = Vec::new();
        sample()
            .visit_values(&mut |path, value| seen.push(format!("{path}={value}")))
            .unwrap();
        assert_eq!(
            seen,
            vec![
                "/record/@id=7",
                "/record/title=First",
                "/record/actor/name=Ann",
                "/record/actor/name=Bob",
            ]
        );
    }

    #[test]
    fn writes_indented_xml_with_namespaces() {
        let node = Node::new(tag("lido:lido")).with_child(
            Node::new(tag("lido:title"))
                .with_attribute(tag("@xml:lang"), "en")
                .with_text("A title"),
        );
        let namespaces = vec![Namespace::new("lido", "http://www.lido-schema.org")];
        let xml = node.to_xml_string(&namespaces).unwrap();
        assert_eq!(
            xml,
            "<lido:lido xmlns:lido=\"http://www.lido-schema.org\">\n  \
             <lido:title xml:lang=\"en\">A title</lido:title>\n</lido:lido>\n"
        );
    }
}
