//! Data model for SIP metadata mapping.
//!
//! This crate holds everything the mapping engine reads and writes, apart from
//! the engine itself:
//!
//! - **Paths**: [`Tag`] and [`Path`], the addressing scheme shared by input
//!   records and the target schema
//! - **Records**: [`Node`] trees and the streaming [`MetadataParser`] that
//!   splits a dump into [`MetadataRecord`]s
//! - **Target schema**: [`RecDef`] documents indexed as a [`RecDefTree`]
//! - **Crosswalks**: [`RecMapping`] with its [`NodeMapping`] rules, facts and
//!   change notifications
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sip_model::{NodeMapping, Path, RecDefTree, RecMapping};
//!
//! let tree = Arc::new(RecDefTree::read(&std::fs::read("lido-record-definition.xml")?)?);
//! let mut mapping = RecMapping::create(tree);
//! mapping.add_node_mapping(
//!     &Path::parse("/lido:lido/lido:title")?,
//!     NodeMapping::new(Path::parse("/record/title")?),
//! )?;
//! println!("{}", mapping.to_xml_string()?);
//! ```

pub mod error;
mod listener;
mod node_mapping;
mod parser;
mod path;
mod rec_def;
mod rec_def_tree;
mod rec_mapping;
mod record;
pub mod xml;

pub use error::{ParseError, PathError, Result, SchemaError};
pub use listener::{MappingEvent, MappingListener};
pub use node_mapping::{Dictionary, NodeMapping, Operator, SourceInput, Unmatched};
pub use parser::{MetadataParser, ParseOptions};
pub use path::{Path, Tag};
pub use rec_def::{Bookmark, FieldTypeAlias, Namespace, OptionEntry, RecDef, RecDefElement};
pub use rec_def_tree::{BUILTIN_FIELD_TYPES, NodeId, RecDefNode, RecDefTree};
pub use rec_mapping::RecMapping;
pub use record::{MetadataRecord, Node, Value};
pub use xml::XmlError;
