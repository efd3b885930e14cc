//! Streaming record splitter for large metadata dumps.
//!
//! The parser walks the dump event by event and only materialises the element
//! subtree found at the configured record root, so memory use is bounded by
//! the largest single record rather than by the dump.
//!
//! # Usage
//!
//! ```ignore
//! use sip_model::{MetadataParser, ParseOptions, Path};
//!
//! let options = ParseOptions::default()
//!     .with_record_root(Path::parse("/harvest/record")?)
//!     .with_unique_element(Some(Path::parse("/harvest/record/@id")?));
//! for record in MetadataParser::new(reader, options) {
//!     let record = record?;
//!     println!("{} has {} children", record.id, record.root.children.len());
//! }
//! ```

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::path::{Path, Tag};
use crate::record::{MetadataRecord, Node};
use crate::xml::{EventReader, XmlError, XmlEvent};

/// Options for splitting a dump into records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Document path of the element that delimits one record.
    /// The empty path treats the document root element as the only record.
    pub record_root: Path,
    /// Document path, below the record root, holding the record identifier.
    /// Without one the 1-based record number is used.
    pub unique_element: Option<Path>,
    /// Prefix applied to unprefixed element tags.
    pub default_prefix: Option<String>,
}

impl ParseOptions {
    #[must_use]
    pub fn with_record_root(mut self, record_root: Path) -> Self {
        self.record_root = record_root;
        self
    }

    #[must_use]
    pub fn with_unique_element(mut self, unique_element: Option<Path>) -> Self {
        self.unique_element = unique_element;
        self
    }

    #[must_use]
    pub fn with_default_prefix(mut self, default_prefix: Option<String>) -> Self {
        self.default_prefix = default_prefix;
        self
    }
}

/// True for elements marked `xml:space="preserve"`, whose text is kept as is.
fn preserves_space(node: &Node) -> bool {
    node.attributes.iter().any(|(tag, value)| {
        tag.prefix() == Some("xml") && tag.local_name() == "space" && value == "preserve"
    })
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<(Node, String)>,
}

impl TreeBuilder {
    fn start(&mut self, node: Node) {
        self.stack.push((node, String::new()));
    }

    fn text(&mut self, text: &str) {
        if let Some((_, buffer)) = self.stack.last_mut() {
            buffer.push_str(text);
        }
    }

    /// Close the innermost element; returns the root once it closes.
    fn end(&mut self) -> Option<Node> {
        let (mut node, text) = self.stack.pop()?;
        if preserves_space(&node) {
            node.text = (!text.is_empty()).then_some(text);
        } else {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                node.text = Some(trimmed.to_string());
            }
        }
        match self.stack.last_mut() {
            Some((parent, _)) => {
                parent.children.push(node);
                None
            }
            None => Some(node),
        }
    }
}

/// Iterator over the records of a dump.
///
/// Per-record problems (a missing identifier) are yielded as errors and the
/// stream continues; malformed XML ends the stream after the error.
pub struct MetadataParser<R: BufRead> {
    events: EventReader<R>,
    record_root: Path,
    unique_element: Option<Path>,
    default_prefix: Option<String>,
    open: Vec<Tag>,
    builder: Option<TreeBuilder>,
    record_count: usize,
    done: bool,
    keep_unidentified: bool,
    unidentified: Vec<ParseError>,
}

impl<R: BufRead> MetadataParser<R> {
    pub fn new(input: R, options: ParseOptions) -> Self {
        let qualify = |path: Path| match &options.default_prefix {
            Some(prefix) => path.with_default_prefix(prefix),
            None => path,
        };
        Self {
            events: EventReader::new(input),
            record_root: qualify(options.record_root.clone()),
            unique_element: options.unique_element.clone().map(qualify),
            default_prefix: options.default_prefix.clone(),
            open: Vec::new(),
            builder: None,
            record_count: 0,
            done: false,
            keep_unidentified: false,
            unidentified: Vec::new(),
        }
    }

    /// Yield records without an identifier under their record number instead
    /// of as errors. The missing identifiers are listed by [`Self::unidentified`].
    #[must_use]
    pub fn keep_unidentified(mut self) -> Self {
        self.keep_unidentified = true;
        self
    }

    /// Records kept without an identifier so far.
    pub fn unidentified(&self) -> &[ParseError] {
        &self.unidentified
    }

    /// Number of records completed so far, including failed ones.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    fn at_record_root(&self) -> bool {
        if self.record_root.is_empty() {
            self.open.len() == 1
        } else {
            self.open.as_slice() == self.record_root.tags()
        }
    }

    fn start_element(
        &mut self,
        name: &str,
        attributes: Vec<(String, String)>,
    ) -> Result<(), ParseError> {
        let mut tag = Tag::from_qualified_name(name, false)?;
        if let Some(prefix) = &self.default_prefix {
            tag = tag.with_default_prefix(prefix);
        }
        self.open.push(tag.clone());
        if self.builder.is_none() && self.at_record_root() {
            self.builder = Some(TreeBuilder::default());
        }
        if let Some(builder) = self.builder.as_mut() {
            let mut node = Node::new(tag);
            for (key, value) in attributes {
                if key == "xmlns" || key.starts_with("xmlns:") {
                    continue;
                }
                node.attributes
                    .insert(Tag::from_qualified_name(&key, true)?, value);
            }
            builder.start(node);
        }
        Ok(())
    }

    fn end_element(&mut self) -> Option<Result<MetadataRecord, ParseError>> {
        self.open.pop();
        let root = self.builder.as_mut()?.end()?;
        self.builder = None;
        self.record_count += 1;
        Some(self.finish_record(root))
    }

    fn finish_record(&mut self, root: Node) -> Result<MetadataRecord, ParseError> {
        let number = self.record_count;
        let Some(unique) = &self.unique_element else {
            return Ok(MetadataRecord::new(number.to_string(), number, root));
        };
        let record_path = if self.record_root.is_empty() {
            Path::from_tags(vec![root.tag.clone()])?
        } else {
            self.record_root.clone()
        };
        let relative = unique.extend_ancestor(&record_path)?;
        let id = root
            .select(&relative)
            .iter()
            .filter_map(|value| value.text())
            .map(str::trim)
            .find(|text| !text.is_empty())
            .map(str::to_string);
        match id {
            Some(id) => Ok(MetadataRecord::new(id, number, root)),
            None => {
                warn!(record_number = number, unique_element = %unique, "record has no identifier");
                let error = ParseError::MissingIdentifier {
                    record_number: number,
                    unique_element: unique.to_string(),
                };
                if self.keep_unidentified {
                    self.unidentified.push(error);
                    Ok(MetadataRecord::new(number.to_string(), number, root))
                } else {
                    Err(error)
                }
            }
        }
    }

    fn fail(&mut self, error: ParseError) -> Option<Result<MetadataRecord, ParseError>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<R: BufRead> Iterator for MetadataParser<R> {
    type Item = Result<MetadataRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let event = match self.events.next_event() {
                Ok(event) => event,
                Err(error) => return self.fail(error.into()),
            };
            match event {
                XmlEvent::Start {
                    name,
                    attributes,
                    empty,
                } => {
                    if let Err(error) = self.start_element(&name, attributes) {
                        return self.fail(error);
                    }
                    if empty && let Some(record) = self.end_element() {
                        return Some(record);
                    }
                }
                XmlEvent::Text(text) => {
                    if let Some(builder) = self.builder.as_mut() {
                        builder.text(&text);
                    }
                }
                XmlEvent::End => {
                    if let Some(record) = self.end_element() {
                        return Some(record);
                    }
                }
                XmlEvent::Eof => {
                    self.done = true;
                    if !self.open.is_empty() {
                        return Some(Err(XmlError::new(0, "unexpected end of document").into()));
                    }
                    debug!(records = self.record_count, "finished parsing dump");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"<?xml version="1.0"?>
<harvest xmlns:dc="http://purl.org/dc/elements/1.1/">
  <record id="a1"><dc:title>One</dc:title></record>
  <record id="a2"><dc:title>Two</dc:title></record>
  <record><dc:title>No id</dc:title></record>
  <record id="a4"/>
</harvest>"#;

    fn options() -> ParseOptions {
        ParseOptions::default()
            .with_record_root(Path::parse("/harvest/record").unwrap())
            .with_unique_element(Some(Path::parse("/harvest/record/@id").unwrap()))
    }

    #[test]
    fn kept_unidentified_records_are_yielded_and_listed() {
        let mut parser = MetadataParser::new(DUMP.as_bytes(), options()).keep_unidentified();
        let ids: Vec<String> = parser
            .by_ref()
            .map(|record| record.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "3", "a4"]);
        assert!(matches!(
            parser.unidentified(),
            [ParseError::MissingIdentifier {
                record_number: 3,
                ..
            }]
        ));
    }

    #[test]
    fn preserved_text_is_not_trimmed() {
        let root = Node::parse(
            "<doc><a xml:space=\"preserve\"> kept </a><b> trimmed </b></doc>",
        )
        .unwrap();
        assert_eq!(root.children[0].text(), Some(" kept "));
        assert_eq!(root.children[1].text(), Some("trimmed"));
    }

    #[test]
    fn splits_records_and_reads_identifiers() {
        let results: Vec<_> = MetadataParser::new(DUMP.as_bytes(), options()).collect();
        assert_eq!(results.len(), 4);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.id, "a1");
        assert_eq!(first.number, 1);
        assert_eq!(first.root.children[0].text(), Some("One"));
        assert!(matches!(
            results[2],
            Err(ParseError::MissingIdentifier {
                record_number: 3,
                ..
            })
        ));
        assert_eq!(results[3].as_ref().unwrap().id, "a4");
    }

    #[test]
    fn numbers_records_without_unique_element() {
        let options = options().with_unique_element(None);
        let ids: Vec<_> = MetadataParser::new(DUMP.as_bytes(), options)
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn applies_default_prefix() {
        let options = options().with_default_prefix(Some("in".to_string()));
        let record = MetadataParser::new(DUMP.as_bytes(), options)
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(record.root.tag.to_string(), "in:record");
        assert_eq!(record.root.children[0].tag.to_string(), "dc:title");
        assert_eq!(record.id, "a1");
    }

    #[test]
    fn malformed_dump_ends_stream() {
        let dump = "<harvest><record id=\"1\"></harvest>";
        let results: Vec<_> = MetadataParser::new(dump.as_bytes(), options()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ParseError::Xml(_))));
    }
}
