//! The produced document for one record.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sip_model::{Node, Path, RecDefNode, RecDefTree, RecMapping, XmlError};

use crate::error::MissingFieldsError;

/// Output tree of one mapped record, with views used by indexers.
#[derive(Debug, Clone)]
pub struct MappingResult {
    record_id: String,
    root: Node,
    rec_mapping: Arc<RecMapping>,
}

impl MappingResult {
    pub fn new(record_id: String, root: Node, rec_mapping: Arc<RecMapping>) -> Self {
        Self {
            record_id,
            root,
            rec_mapping,
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    pub fn rec_mapping(&self) -> &Arc<RecMapping> {
        &self.rec_mapping
    }

    /// The document with the target namespaces declared on its root.
    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        self.root
            .to_xml_string(self.rec_mapping.rec_def_tree().namespaces())
    }

    /// Every value keyed by its target field name, in document order.
    pub fn fields(&self) -> BTreeMap<String, Vec<String>> {
        self.collect(|node| Some(node.field_name.as_str()))
    }

    /// Values of targets flagged with a system-field name.
    pub fn system_fields(&self) -> BTreeMap<String, Vec<String>> {
        self.collect(|node| node.system_field.as_deref())
    }

    /// Values of targets flagged with a search-field name.
    pub fn search_fields(&self) -> BTreeMap<String, Vec<String>> {
        self.collect(|node| node.search_field.as_deref())
    }

    /// Fails listing every required target that is absent below a present
    /// parent. The document itself stays valid.
    pub fn check_missing_fields(&self) -> Result<(), MissingFieldsError> {
        let tree = self.rec_mapping.rec_def_tree();
        let mut missing = BTreeSet::new();
        if self.root.tag == *tree.root().tag() {
            find_missing(tree, tree.root(), &self.root, &mut missing);
        } else if tree.root().required {
            missing.insert(tree.root().path().clone());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingFieldsError {
                record_id: self.record_id.clone(),
                missing: missing.into_iter().collect(),
            })
        }
    }

    fn collect<'t, F>(&'t self, key: F) -> BTreeMap<String, Vec<String>>
    where
        F: Fn(&'t RecDefNode) -> Option<&'t str>,
    {
        let tree = self.rec_mapping.rec_def_tree();
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if self.root.tag == *tree.root().tag() {
            visit(tree, tree.root(), &self.root, &mut |schema, value| {
                if let Some(name) = key(schema) {
                    fields
                        .entry(name.to_string())
                        .or_default()
                        .push(value.to_string());
                }
            });
        }
        fields
    }
}

/// Walk an output element together with its schema node, reporting every
/// text and attribute value in document order.
fn visit<'t, F>(tree: &'t RecDefTree, schema: &'t RecDefNode, node: &Node, report: &mut F)
where
    F: FnMut(&'t RecDefNode, &str),
{
    if let Some(text) = &node.text {
        report(schema, text);
    }
    for child in tree.children(schema.id()).filter(|child| child.is_attribute()) {
        if let Some(value) = node.attributes.get(child.tag()) {
            report(child, value);
        }
    }
    for element in &node.children {
        if let Some(child) = tree
            .children(schema.id())
            .find(|child| !child.is_attribute() && *child.tag() == element.tag)
        {
            visit(tree, child, element, report);
        }
    }
}

fn find_missing(tree: &RecDefTree, schema: &RecDefNode, node: &Node, missing: &mut BTreeSet<Path>) {
    for child in tree.children(schema.id()) {
        let present = if child.is_attribute() {
            node.attributes.contains_key(child.tag())
        } else {
            node.children.iter().any(|element| element.tag == *child.tag())
        };
        if child.required && !present {
            missing.insert(child.path().clone());
        }
    }
    for element in &node.children {
        if let Some(child) = tree
            .children(schema.id())
            .find(|child| !child.is_attribute() && *child.tag() == element.tag)
        {
            find_missing(tree, child, element, missing);
        }
    }
}
