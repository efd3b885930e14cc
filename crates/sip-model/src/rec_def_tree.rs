//! Indexed target-schema tree.
//!
//! [`RecDefTree`] flattens a [`RecDef`] into an arena of [`RecDefNode`]s with
//! parent and child links, plus a path index for O(1) lookup by output path.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::path::{Path, Tag};
use crate::rec_def::{Namespace, OptionEntry, RecDef, RecDefElement};

/// Builtin field types every definition can use directly.
pub const BUILTIN_FIELD_TYPES: &[&str] = &["text", "link", "uri", "number"];

/// Arena index of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A schema node with its resolved output path.
#[derive(Debug, Clone)]
pub struct RecDefNode {
    id: NodeId,
    path: Path,
    tag: Tag,
    pub repeatable: bool,
    pub required: bool,
    pub always_present: bool,
    pub field_type: Option<String>,
    /// Output field name; defaults to the qualified name with `_` for `:`.
    pub field_name: String,
    pub system_field: Option<String>,
    pub search_field: Option<String>,
    pub doc: Option<String>,
    pub options: Vec<OptionEntry>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl RecDefNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn is_attribute(&self) -> bool {
        self.path.is_attribute()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn child_ids(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone)]
pub struct RecDefTree {
    rec_def: RecDef,
    nodes: Vec<RecDefNode>,
    index: HashMap<Path, NodeId>,
}

impl RecDefTree {
    /// Build the tree, checking structural consistency.
    pub fn create(rec_def: RecDef) -> Result<Self> {
        let mut tree = Self {
            rec_def,
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        let root = tree.rec_def.root.clone();
        tree.add(&root, &Path::empty(), None)?;

        for bookmark in &tree.rec_def.bookmarks {
            if !tree.index.contains_key(&bookmark.path) {
                return Err(SchemaError::UnknownPath {
                    path: bookmark.path.to_string(),
                });
            }
        }
        debug!(
            prefix = %tree.rec_def.prefix,
            nodes = tree.nodes.len(),
            "built record definition tree"
        );
        Ok(tree)
    }

    /// Read and index a record-definition document.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        Self::create(RecDef::read(bytes)?)
    }

    fn add(&mut self, element: &RecDefElement, parent_path: &Path, parent: Option<NodeId>) -> Result<NodeId> {
        let path = parent_path.child(element.tag.clone())?;
        if element.tag.is_attribute() {
            if !element.children.is_empty() {
                return Err(SchemaError::AttributeWithChildren {
                    path: path.to_string(),
                });
            }
            if element.repeatable {
                return Err(SchemaError::RepeatableAttribute {
                    path: path.to_string(),
                });
            }
        }
        let id = NodeId(self.nodes.len());
        if self.index.insert(path.clone(), id).is_some() {
            return Err(SchemaError::DuplicatePath {
                path: path.to_string(),
            });
        }
        let field_name = element
            .field_name
            .clone()
            .unwrap_or_else(|| element.tag.qualified_name().replace(':', "_"));
        self.nodes.push(RecDefNode {
            id,
            path: path.clone(),
            tag: element.tag.clone(),
            repeatable: element.repeatable,
            required: element.required,
            always_present: element.always_present,
            field_type: element.field_type.clone(),
            field_name,
            system_field: element.system_field.clone(),
            search_field: element.search_field.clone(),
            doc: element.doc.clone(),
            options: element.options.clone(),
            parent,
            children: Vec::new(),
        });
        for child in &element.children {
            let child_id = self.add(child, &path, Some(id))?;
            self.nodes[id.0].children.push(child_id);
        }
        Ok(id)
    }

    pub fn rec_def(&self) -> &RecDef {
        &self.rec_def
    }

    pub fn prefix(&self) -> &str {
        &self.rec_def.prefix
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.rec_def.namespaces
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> &RecDefNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &RecDefNode {
        &self.nodes[id.0]
    }

    pub fn get_rec_def_node(&self, path: &Path) -> Option<&RecDefNode> {
        self.index.get(path).map(|id| self.node(*id))
    }

    /// Children in definition order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &RecDefNode> + '_ {
        self.node(id).children.iter().map(|child| self.node(*child))
    }

    pub fn parent(&self, id: NodeId) -> Option<&RecDefNode> {
        self.node(id).parent.map(|parent| self.node(parent))
    }

    /// Every node, ordered by output path.
    pub fn walk(&self) -> Vec<&RecDefNode> {
        let mut nodes: Vec<_> = self.nodes.iter().collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    /// Nodes flagged required, ordered by output path.
    pub fn required_nodes(&self) -> Vec<&RecDefNode> {
        self.walk().into_iter().filter(|node| node.required).collect()
    }

    /// Nodes carrying a system-field or search-field name.
    pub fn field_nodes(&self) -> Vec<&RecDefNode> {
        self.walk()
            .into_iter()
            .filter(|node| node.system_field.is_some() || node.search_field.is_some())
            .collect()
    }

    /// Resolve a field-type name through the definition's aliases.
    /// Returns `None` when the name is neither an alias nor a builtin type.
    pub fn resolve_field_type<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        let base = self
            .rec_def
            .field_types
            .iter()
            .find(|alias| alias.name == name)
            .map_or(name, |alias| alias.base.as_str());
        BUILTIN_FIELD_TYPES.contains(&base).then_some(base)
    }

    /// The schema node at `path` or its nearest ancestor in the tree.
    pub fn nearest_node(&self, path: &Path) -> Option<&RecDefNode> {
        let mut current = Some(path.clone());
        while let Some(candidate) = current {
            if let Some(node) = self.get_rec_def_node(&candidate) {
                return Some(node);
            }
            current = candidate.parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEF: &str = r#"<record-definition prefix="lido" version="1.0.0">
  <field-types><field-type name="resource" base="link"/></field-types>
  <root tag="lido:lido">
    <elem tag="lido:title" required="true"/>
    <elem tag="lido:actor" repeatable="true">
      <attr tag="lido:type" required="true"/>
      <elem tag="lido:name" field-type="resource" system-field="CREATOR"/>
    </elem>
  </root>
</record-definition>"#;

    fn path(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    #[test]
    fn indexes_nodes_by_path() {
        let tree = RecDefTree::read(DEF.as_bytes()).unwrap();
        assert_eq!(tree.len(), 5);
        let name = tree.get_rec_def_node(&path("/lido:lido/lido:actor/lido:name")).unwrap();
        assert_eq!(name.field_name, "lido_name");
        let actor = tree.parent(name.id()).unwrap();
        assert!(actor.repeatable);
        let children: Vec<_> = tree.children(actor.id()).map(|n| n.path().to_string()).collect();
        assert_eq!(
            children,
            vec!["/lido:lido/lido:actor/@lido:type", "/lido:lido/lido:actor/lido:name"]
        );
        assert!(tree.get_rec_def_node(&path("/lido:lido/missing")).is_none());
    }

    #[test]
    fn walks_in_path_order_and_lists_required() {
        let tree = RecDefTree::read(DEF.as_bytes()).unwrap();
        let required: Vec<_> = tree.required_nodes().iter().map(|n| n.path().to_string()).collect();
        assert_eq!(
            required,
            vec!["/lido:lido/lido:actor/@lido:type", "/lido:lido/lido:title"]
        );
        assert_eq!(tree.walk()[0].path(), &path("/lido:lido"));
    }

    #[test]
    fn resolves_field_type_aliases() {
        let tree = RecDefTree::read(DEF.as_bytes()).unwrap();
        assert_eq!(tree.resolve_field_type("resource"), Some("link"));
        assert_eq!(tree.resolve_field_type("number"), Some("number"));
        assert_eq!(tree.resolve_field_type("colour"), None);
    }

    #[test]
    fn rejects_inconsistent_definitions() {
        let duplicate = r#"<record-definition prefix="x" version="1">
  <root tag="r"><elem tag="a"/><elem tag="a"/></root></record-definition>"#;
        assert!(matches!(
            RecDefTree::read(duplicate.as_bytes()),
            Err(SchemaError::DuplicatePath { .. })
        ));

        let attr_children = r#"<record-definition prefix="x" version="1">
  <root tag="r"><attr tag="a"><elem tag="b"/></attr></root></record-definition>"#;
        assert!(matches!(
            RecDefTree::read(attr_children.as_bytes()),
            Err(SchemaError::AttributeWithChildren { .. })
        ));

        let bookmark = r#"<record-definition prefix="x" version="1">
  <root tag="r"/><bookmarks><bookmark name="b" path="/r/nope"/></bookmarks></record-definition>"#;
        assert!(matches!(
            RecDefTree::read(bookmark.as_bytes()),
            Err(SchemaError::UnknownPath { .. })
        ));
    }
}
