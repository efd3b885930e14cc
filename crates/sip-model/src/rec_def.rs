//! Record-definition documents: the target schema a crosswalk compiles to.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ParseError, Result, SchemaError};
use crate::path::{Path, Tag};
use crate::record::Node;
use crate::xml::{
    XmlError, document_writer, finish_document, write_declaration, write_event,
    write_text_element,
};

/// A namespace declared by the target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

/// A schema-local field type name resolving to a builtin type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTypeAlias {
    pub name: String,
    pub base: String,
}

/// An allowed value hint for a schema node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    pub key: String,
    pub value: String,
}

/// A named shortcut to a schema node, shown by editors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub name: String,
    pub path: Path,
}

/// One `<elem>` or `<attr>` of the definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecDefElement {
    pub tag: Tag,
    pub repeatable: bool,
    pub required: bool,
    pub always_present: bool,
    pub field_type: Option<String>,
    pub field_name: Option<String>,
    pub system_field: Option<String>,
    pub search_field: Option<String>,
    pub doc: Option<String>,
    pub options: Vec<OptionEntry>,
    /// Attributes and elements in definition order.
    pub children: Vec<RecDefElement>,
}

impl RecDefElement {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            repeatable: false,
            required: false,
            always_present: false,
            field_type: None,
            field_name: None,
            system_field: None,
            search_field: None,
            doc: None,
            options: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// A parsed record-definition document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecDef {
    pub prefix: String,
    pub version: String,
    pub namespaces: Vec<Namespace>,
    pub field_types: Vec<FieldTypeAlias>,
    pub root: RecDefElement,
    pub bookmarks: Vec<Bookmark>,
}

fn required_attr<'a>(node: &'a Node, attribute: &'static str) -> Result<&'a str> {
    node.plain_attribute(attribute)
        .ok_or_else(|| SchemaError::MissingAttribute {
            element: node.tag.to_string(),
            attribute,
        })
}

fn flag(node: &Node, attribute: &str) -> Result<bool> {
    match node.plain_attribute(attribute) {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(SchemaError::InvalidValue {
            attribute: attribute.to_string(),
            value: other.to_string(),
        }),
    }
}

fn optional(node: &Node, attribute: &str) -> Option<String> {
    node.plain_attribute(attribute).map(str::to_string)
}

pub(crate) fn document_root(bytes: &[u8]) -> Result<Node> {
    let text = std::str::from_utf8(bytes).map_err(|err| XmlError::new(0, err.to_string()))?;
    Node::parse(text).map_err(|err| match err {
        ParseError::Xml(err) => SchemaError::Xml(err),
        ParseError::Path(err) => SchemaError::Path(err),
        other => SchemaError::Xml(XmlError::new(0, other.to_string())),
    })
}

impl RecDef {
    /// Parse a record-definition document.
    pub fn read(bytes: &[u8]) -> Result<RecDef> {
        let doc = document_root(bytes)?;
        if doc.tag.to_string() != "record-definition" {
            return Err(SchemaError::UnexpectedElement {
                element: doc.tag.to_string(),
                context: "document",
            });
        }
        let prefix = required_attr(&doc, "prefix")?.to_string();
        let version = required_attr(&doc, "version")?.to_string();
        let mut namespaces = Vec::new();
        let mut field_types = Vec::new();
        let mut root = None;
        let mut bookmarks = Vec::new();

        for section in &doc.children {
            match section.tag.to_string().as_str() {
                "namespaces" => {
                    for ns in &section.children {
                        expect_name(ns, "namespace", "<namespaces>")?;
                        namespaces.push(Namespace::new(
                            required_attr(ns, "prefix")?,
                            required_attr(ns, "uri")?,
                        ));
                    }
                }
                "field-types" => {
                    for ft in &section.children {
                        expect_name(ft, "field-type", "<field-types>")?;
                        field_types.push(FieldTypeAlias {
                            name: required_attr(ft, "name")?.to_string(),
                            base: required_attr(ft, "base")?.to_string(),
                        });
                    }
                }
                "root" => {
                    if root.is_some() {
                        return Err(SchemaError::UnexpectedElement {
                            element: "root".to_string(),
                            context: "<record-definition> (second root)",
                        });
                    }
                    root = Some(read_element(section, false)?);
                }
                "bookmarks" => {
                    for bookmark in &section.children {
                        expect_name(bookmark, "bookmark", "<bookmarks>")?;
                        bookmarks.push(Bookmark {
                            name: required_attr(bookmark, "name")?.to_string(),
                            path: Path::parse(required_attr(bookmark, "path")?)?,
                        });
                    }
                }
                other => {
                    return Err(SchemaError::UnexpectedElement {
                        element: other.to_string(),
                        context: "<record-definition>",
                    });
                }
            }
        }

        let root = root.ok_or(SchemaError::MissingRoot)?;
        if root.tag.is_attribute() {
            return Err(SchemaError::InvalidValue {
                attribute: "tag".to_string(),
                value: root.tag.to_string(),
            });
        }
        Ok(RecDef {
            prefix,
            version,
            namespaces,
            field_types,
            root,
            bookmarks,
        })
    }

    /// Render the definition in its document form.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = document_writer();
        write_declaration(&mut writer)?;
        let mut start = BytesStart::new("record-definition");
        start.push_attribute(("prefix", self.prefix.as_str()));
        start.push_attribute(("version", self.version.as_str()));
        write_event(&mut writer, Event::Start(start))?;

        if !self.namespaces.is_empty() {
            write_event(&mut writer, Event::Start(BytesStart::new("namespaces")))?;
            for ns in &self.namespaces {
                let mut node = BytesStart::new("namespace");
                node.push_attribute(("prefix", ns.prefix.as_str()));
                node.push_attribute(("uri", ns.uri.as_str()));
                write_event(&mut writer, Event::Empty(node))?;
            }
            write_event(&mut writer, Event::End(BytesEnd::new("namespaces")))?;
        }
        if !self.field_types.is_empty() {
            write_event(&mut writer, Event::Start(BytesStart::new("field-types")))?;
            for ft in &self.field_types {
                let mut node = BytesStart::new("field-type");
                node.push_attribute(("name", ft.name.as_str()));
                node.push_attribute(("base", ft.base.as_str()));
                write_event(&mut writer, Event::Empty(node))?;
            }
            write_event(&mut writer, Event::End(BytesEnd::new("field-types")))?;
        }
        write_element(&mut writer, &self.root, "root")?;
        if !self.bookmarks.is_empty() {
            write_event(&mut writer, Event::Start(BytesStart::new("bookmarks")))?;
            for bookmark in &self.bookmarks {
                let mut node = BytesStart::new("bookmark");
                let path = bookmark.path.to_string();
                node.push_attribute(("name", bookmark.name.as_str()));
                node.push_attribute(("path", path.as_str()));
                write_event(&mut writer, Event::Empty(node))?;
            }
            write_event(&mut writer, Event::End(BytesEnd::new("bookmarks")))?;
        }
        write_event(
            &mut writer,
            Event::End(BytesEnd::new("record-definition")),
        )?;
        Ok(finish_document(writer)?)
    }
}

fn expect_name(node: &Node, name: &str, context: &'static str) -> Result<()> {
    if node.tag.to_string() == name {
        Ok(())
    } else {
        Err(SchemaError::UnexpectedElement {
            element: node.tag.to_string(),
            context,
        })
    }
}

fn read_element(node: &Node, attribute: bool) -> Result<RecDefElement> {
    let tag = Tag::parse(required_attr(node, "tag")?)?;
    let tag = if attribute {
        Tag::from_qualified_name(&tag.qualified_name(), true)?
    } else {
        tag
    };
    let mut element = RecDefElement::new(tag);
    element.repeatable = flag(node, "repeatable")?;
    element.required = flag(node, "required")?;
    element.always_present = flag(node, "always-present")?;
    element.field_type = optional(node, "field-type");
    element.field_name = optional(node, "field-name");
    element.system_field = optional(node, "system-field");
    element.search_field = optional(node, "search-field");

    for (key, _) in &node.attributes {
        let known = matches!(
            key.local_name(),
            "tag"
                | "repeatable"
                | "required"
                | "always-present"
                | "field-type"
                | "field-name"
                | "system-field"
                | "search-field"
        );
        if !known {
            debug!(attribute = %key, element = %element.tag, "ignoring unknown definition attribute");
        }
    }

    for child in &node.children {
        match child.tag.to_string().as_str() {
            "doc" => element.doc = child.text.clone(),
            "opt" => element.options.push(OptionEntry {
                key: required_attr(child, "key")?.to_string(),
                value: required_attr(child, "value")?.to_string(),
            }),
            "elem" => element.children.push(read_element(child, false)?),
            "attr" => element.children.push(read_element(child, true)?),
            other => {
                return Err(SchemaError::UnexpectedElement {
                    element: other.to_string(),
                    context: "<elem>",
                });
            }
        }
    }
    Ok(element)
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &RecDefElement,
    name: &str,
) -> std::result::Result<(), XmlError> {
    let mut start = BytesStart::new(name);
    let tag = element.tag.qualified_name();
    start.push_attribute(("tag", tag.as_str()));
    for (key, value) in [
        ("repeatable", element.repeatable),
        ("required", element.required),
        ("always-present", element.always_present),
    ] {
        if value {
            start.push_attribute((key, "true"));
        }
    }
    for (key, value) in [
        ("field-type", &element.field_type),
        ("field-name", &element.field_name),
        ("system-field", &element.system_field),
        ("search-field", &element.search_field),
    ] {
        if let Some(value) = value {
            start.push_attribute((key, value.as_str()));
        }
    }
    if element.doc.is_none() && element.options.is_empty() && element.children.is_empty() {
        return write_event(writer, Event::Empty(start));
    }
    write_event(writer, Event::Start(start))?;
    if let Some(doc) = &element.doc {
        write_text_element(writer, "doc", doc)?;
    }
    for option in &element.options {
        let mut opt = BytesStart::new("opt");
        opt.push_attribute(("key", option.key.as_str()));
        opt.push_attribute(("value", option.value.as_str()));
        write_event(writer, Event::Empty(opt))?;
    }
    for child in &element.children {
        let child_name = if child.tag.is_attribute() { "attr" } else { "elem" };
        write_element(writer, child, child_name)?;
    }
    write_event(writer, Event::End(BytesEnd::new(name)))
}
