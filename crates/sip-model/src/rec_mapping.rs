//! The crosswalk document: facts plus node mappings keyed by output path.
//!
//! A [`RecMapping`] is bound to the [`RecDefTree`] it was written for; every
//! output path must name a node of that tree. Reading and writing use one
//! canonical layout so a written crosswalk reads back identical and writes
//! back byte for byte.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::listener::{MappingEvent, MappingListener};
use crate::node_mapping::{Dictionary, NodeMapping, Operator, SourceInput, Unmatched};
use crate::path::Path;
use crate::rec_def::document_root;
use crate::rec_def_tree::RecDefTree;
use crate::record::Node;
use crate::xml::{document_writer, finish_document, write_declaration, write_event, write_text_element};

#[derive(Clone)]
pub struct RecMapping {
    prefix: String,
    schema_version: String,
    facts: BTreeMap<String, String>,
    node_mappings: BTreeMap<Path, NodeMapping>,
    rec_def_tree: Arc<RecDefTree>,
    listeners: Vec<Arc<dyn MappingListener>>,
}

impl fmt::Debug for RecMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecMapping")
            .field("prefix", &self.prefix)
            .field("schema_version", &self.schema_version)
            .field("facts", &self.facts)
            .field("node_mappings", &self.node_mappings)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Equal when prefix, version, facts and mappings match; listeners and the
/// tree instance are not compared.
impl PartialEq for RecMapping {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
            && self.schema_version == other.schema_version
            && self.facts == other.facts
            && self.node_mappings == other.node_mappings
    }
}

impl Eq for RecMapping {}

fn required_attr<'a>(node: &'a Node, attribute: &'static str) -> Result<&'a str> {
    node.plain_attribute(attribute)
        .ok_or_else(|| SchemaError::MissingAttribute {
            element: node.tag.to_string(),
            attribute,
        })
}

fn unexpected(node: &Node, context: &'static str) -> SchemaError {
    SchemaError::UnexpectedElement {
        element: node.tag.to_string(),
        context,
    }
}

impl RecMapping {
    /// An empty crosswalk for `tree`.
    pub fn create(rec_def_tree: Arc<RecDefTree>) -> Self {
        Self {
            prefix: rec_def_tree.prefix().to_string(),
            schema_version: rec_def_tree.rec_def().version.clone(),
            facts: BTreeMap::new(),
            node_mappings: BTreeMap::new(),
            rec_def_tree,
            listeners: Vec::new(),
        }
    }

    /// Read a crosswalk document written for `rec_def_tree`.
    pub fn read(text: &str, rec_def_tree: Arc<RecDefTree>) -> Result<Self> {
        let doc = document_root(text.as_bytes())?;
        if doc.tag.to_string() != "rec-mapping" {
            return Err(unexpected(&doc, "document"));
        }
        let prefix = required_attr(&doc, "prefix")?;
        if prefix != rec_def_tree.prefix() {
            return Err(SchemaError::PrefixMismatch {
                expected: rec_def_tree.prefix().to_string(),
                found: prefix.to_string(),
            });
        }
        let mut mapping = Self::create(rec_def_tree);
        if let Some(version) = doc.plain_attribute("schema-version") {
            mapping.schema_version = version.to_string();
        }

        for section in &doc.children {
            match section.tag.to_string().as_str() {
                "facts" => {
                    for fact in &section.children {
                        if fact.tag.to_string() != "fact" {
                            return Err(unexpected(fact, "<facts>"));
                        }
                        mapping.facts.insert(
                            required_attr(fact, "name")?.to_string(),
                            required_attr(fact, "value")?.to_string(),
                        );
                    }
                }
                "node-mappings" => {
                    for node in &section.children {
                        if node.tag.to_string() != "node-mapping" {
                            return Err(unexpected(node, "<node-mappings>"));
                        }
                        let output = Path::parse(required_attr(node, "output")?)?;
                        if mapping.rec_def_tree.get_rec_def_node(&output).is_none() {
                            return Err(SchemaError::UnknownPath {
                                path: output.to_string(),
                            });
                        }
                        let node_mapping = read_node_mapping(node)?;
                        if mapping.node_mappings.insert(output.clone(), node_mapping).is_some() {
                            return Err(SchemaError::DuplicatePath {
                                path: output.to_string(),
                            });
                        }
                    }
                }
                _ => return Err(unexpected(section, "<rec-mapping>")),
            }
        }
        debug!(
            prefix = %mapping.prefix,
            facts = mapping.facts.len(),
            node_mappings = mapping.node_mappings.len(),
            "read crosswalk"
        );
        Ok(mapping)
    }

    /// Write the canonical document: facts sorted by name, node mappings in
    /// output-path order, empty sections omitted.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = document_writer();
        write_declaration(&mut writer)?;
        let mut root = BytesStart::new("rec-mapping");
        root.push_attribute(("prefix", self.prefix.as_str()));
        root.push_attribute(("schema-version", self.schema_version.as_str()));
        if self.facts.is_empty() && self.node_mappings.is_empty() {
            write_event(&mut writer, Event::Empty(root))?;
            return Ok(finish_document(writer)?);
        }
        write_event(&mut writer, Event::Start(root))?;

        if !self.facts.is_empty() {
            write_event(&mut writer, Event::Start(BytesStart::new("facts")))?;
            for (name, value) in &self.facts {
                let mut fact = BytesStart::new("fact");
                fact.push_attribute(("name", name.as_str()));
                fact.push_attribute(("value", value.as_str()));
                write_event(&mut writer, Event::Empty(fact))?;
            }
            write_event(&mut writer, Event::End(BytesEnd::new("facts")))?;
        }

        if !self.node_mappings.is_empty() {
            write_event(&mut writer, Event::Start(BytesStart::new("node-mappings")))?;
            for (output, node_mapping) in &self.node_mappings {
                let output = output.to_string();
                let mut start = BytesStart::new("node-mapping");
                start.push_attribute(("output", output.as_str()));
                start.push_attribute(("operator", node_mapping.operator.as_str()));
                write_event(&mut writer, Event::Start(start))?;
                for input in &node_mapping.inputs {
                    let path = input.path.to_string();
                    let mut node = BytesStart::new("input");
                    node.push_attribute(("name", input.name.as_str()));
                    node.push_attribute(("path", path.as_str()));
                    write_event(&mut writer, Event::Empty(node))?;
                }
                if let Some(dictionary) = &node_mapping.dictionary {
                    let mut start = BytesStart::new("dictionary");
                    let unmatched = dictionary.unmatched().to_string();
                    if *dictionary.unmatched() != Unmatched::Pass {
                        start.push_attribute(("unmatched", unmatched.as_str()));
                    }
                    if dictionary.is_empty() {
                        write_event(&mut writer, Event::Empty(start))?;
                    } else {
                        write_event(&mut writer, Event::Start(start))?;
                        for (key, value) in dictionary.entries() {
                            let mut entry = BytesStart::new("entry");
                            entry.push_attribute(("key", key.as_str()));
                            entry.push_attribute(("value", value.as_str()));
                            write_event(&mut writer, Event::Empty(entry))?;
                        }
                        write_event(&mut writer, Event::End(BytesEnd::new("dictionary")))?;
                    }
                }
                if let Some(expression) = &node_mapping.expression {
                    if expression.trim() == expression.as_str() {
                        write_text_element(&mut writer, "expression", expression)?;
                    } else {
                        let mut start = BytesStart::new("expression");
                        start.push_attribute(("xml:space", "preserve"));
                        write_event(&mut writer, Event::Start(start))?;
                        write_event(&mut writer, Event::Text(BytesText::new(expression)))?;
                        write_event(&mut writer, Event::End(BytesEnd::new("expression")))?;
                    }
                }
                write_event(&mut writer, Event::End(BytesEnd::new("node-mapping")))?;
            }
            write_event(&mut writer, Event::End(BytesEnd::new("node-mappings")))?;
        }
        write_event(&mut writer, Event::End(BytesEnd::new("rec-mapping")))?;
        Ok(finish_document(writer)?)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn rec_def_tree(&self) -> &Arc<RecDefTree> {
        &self.rec_def_tree
    }

    pub fn facts(&self) -> &BTreeMap<String, String> {
        &self.facts
    }

    pub fn fact(&self, name: &str) -> Option<&str> {
        self.facts.get(name).map(String::as_str)
    }

    pub fn node_mappings(&self) -> &BTreeMap<Path, NodeMapping> {
        &self.node_mappings
    }

    pub fn node_mapping(&self, output: &Path) -> Option<&NodeMapping> {
        self.node_mappings.get(output)
    }

    pub fn add_listener(&mut self, listener: Arc<dyn MappingListener>) {
        self.listeners.push(listener);
    }

    pub fn set_fact(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.facts.insert(name.into(), value.into())
    }

    pub fn remove_fact(&mut self, name: &str) -> Option<String> {
        self.facts.remove(name)
    }

    /// Attach `node_mapping` to `output`, replacing any previous one.
    pub fn add_node_mapping(
        &mut self,
        output: &Path,
        node_mapping: NodeMapping,
    ) -> Result<Option<NodeMapping>> {
        if self.rec_def_tree.get_rec_def_node(output).is_none() {
            return Err(SchemaError::UnknownPath {
                path: output.to_string(),
            });
        }
        let before = self.population(output);
        let previous = self.node_mappings.insert(output.clone(), node_mapping);
        let event = if previous.is_some() {
            MappingEvent::Changed {
                output: output.clone(),
            }
        } else {
            MappingEvent::Added {
                output: output.clone(),
            }
        };
        self.notify(&event);
        self.notify_population(output, &before);
        Ok(previous)
    }

    pub fn remove_node_mapping(&mut self, output: &Path) -> Option<NodeMapping> {
        let before = self.population(output);
        let removed = self.node_mappings.remove(output)?;
        self.notify(&MappingEvent::Removed {
            output: output.clone(),
        });
        self.notify_population(output, &before);
        Some(removed)
    }

    /// Edit the mapping at `output` in place. Returns false when there is none.
    pub fn update_node_mapping<F>(&mut self, output: &Path, edit: F) -> bool
    where
        F: FnOnce(&mut NodeMapping),
    {
        let Some(node_mapping) = self.node_mappings.get_mut(output) else {
            return false;
        };
        edit(node_mapping);
        self.notify(&MappingEvent::Changed {
            output: output.clone(),
        });
        true
    }

    /// True when some node mapping targets a strict descendant of `node`.
    pub fn has_mapped_descendant(&self, node: &Path) -> bool {
        self.node_mappings
            .range((Bound::Excluded(node.clone()), Bound::Unbounded))
            .next()
            .is_some_and(|(output, _)| node.is_ancestor_of(output))
    }

    fn population(&self, output: &Path) -> Vec<(Path, bool)> {
        (1..output.size())
            .filter_map(|count| output.take_first(count).ok())
            .map(|ancestor| {
                let populated = self.has_mapped_descendant(&ancestor);
                (ancestor, populated)
            })
            .collect()
    }

    fn notify_population(&self, output: &Path, before: &[(Path, bool)]) {
        for ((node, was), (_, now)) in before.iter().zip(self.population(output)) {
            if *was != now {
                self.notify(&MappingEvent::PopulationChanged {
                    node: node.clone(),
                    populated: now,
                });
            }
        }
    }

    fn notify(&self, event: &MappingEvent) {
        for listener in &self.listeners {
            listener.mapping_changed(event);
        }
    }
}

fn read_node_mapping(node: &Node) -> Result<NodeMapping> {
    let mut inputs = Vec::new();
    let mut dictionary = None;
    let mut expression = None;
    for child in &node.children {
        match child.tag.to_string().as_str() {
            "input" => {
                let path = Path::parse(required_attr(child, "path")?)?;
                inputs.push(match child.plain_attribute("name") {
                    Some(name) => SourceInput::named(name, path),
                    None => SourceInput::new(path),
                });
            }
            "dictionary" => {
                let unmatched = match child.plain_attribute("unmatched") {
                    Some(text) => text.parse::<Unmatched>()?,
                    None => Unmatched::Pass,
                };
                let mut dict = Dictionary::new().with_unmatched(unmatched);
                for entry in &child.children {
                    if entry.tag.to_string() != "entry" {
                        return Err(unexpected(entry, "<dictionary>"));
                    }
                    dict.insert(required_attr(entry, "key")?, required_attr(entry, "value")?);
                }
                dictionary = Some(dict);
            }
            "expression" => expression = Some(child.text.clone().unwrap_or_default()),
            _ => return Err(unexpected(child, "<node-mapping>")),
        }
    }
    let operator = match node.plain_attribute("operator") {
        Some(text) => text.parse::<Operator>()?,
        None => Operator::default(),
    };
    Ok(NodeMapping {
        inputs,
        operator,
        dictionary,
        expression,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const DEF: &str = r#"<record-definition prefix="lido" version="1.0.0">
  <root tag="lido:lido">
    <elem tag="lido:title"/>
    <elem tag="lido:actor" repeatable="true">
      <elem tag="lido:name"/>
      <elem tag="lido:role"/>
    </elem>
  </root>
</record-definition>"#;

    fn tree() -> Arc<RecDefTree> {
        Arc::new(RecDefTree::read(DEF.as_bytes()).unwrap())
    }

    fn path(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    #[test]
    fn rejects_unknown_output_and_prefix() {
        let mut mapping = RecMapping::create(tree());
        let err = mapping
            .add_node_mapping(&path("/lido:lido/lido:nope"), NodeMapping::new(path("/r/a")))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownPath { .. }));

        let err = RecMapping::read(r#"<rec-mapping prefix="ese"/>"#, tree()).unwrap_err();
        assert!(matches!(err, SchemaError::PrefixMismatch { .. }));
    }

    #[test]
    fn notifies_listeners_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut mapping = RecMapping::create(tree());
        mapping.add_listener(Arc::new(move |event: &MappingEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        let name = path("/lido:lido/lido:actor/lido:name");
        let role = path("/lido:lido/lido:actor/lido:role");
        mapping.add_node_mapping(&name, NodeMapping::new(path("/r/creator"))).unwrap();
        mapping.add_node_mapping(&role, NodeMapping::new(path("/r/role"))).unwrap();
        assert!(mapping.update_node_mapping(&role, |m| m.operator = Operator::First));
        mapping.remove_node_mapping(&name);
        mapping.remove_node_mapping(&role);

        let actor = path("/lido:lido/lido:actor");
        let root = path("/lido:lido");
        let got = events.lock().unwrap().clone();
        assert_eq!(
            got,
            vec![
                MappingEvent::Added { output: name.clone() },
                MappingEvent::PopulationChanged { node: root.clone(), populated: true },
                MappingEvent::PopulationChanged { node: actor.clone(), populated: true },
                MappingEvent::Added { output: role.clone() },
                MappingEvent::Changed { output: role.clone() },
                MappingEvent::Removed { output: name },
                MappingEvent::Removed { output: role },
                MappingEvent::PopulationChanged { node: root, populated: false },
                MappingEvent::PopulationChanged { node: actor, populated: false },
            ]
        );
    }

    #[test]
    fn equality_ignores_listeners() {
        let mut a = RecMapping::create(tree());
        let b = RecMapping::create(tree());
        a.add_listener(Arc::new(|_: &MappingEvent| {}));
        assert_eq!(a, b);
        a.set_fact("provider", "Museum");
        assert_ne!(a, b);
    }
}
