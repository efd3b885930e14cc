//! Compiled crosswalk: an operation tree interpreted once per record.
//!
//! Source paths are absolute record paths. While a loop runs, each frame
//! remembers the group path it iterates and the current occurrence; a source
//! path resolves against the innermost frame whose group is an ancestor (or
//! self) of it. Sibling targets fed from the same repeating group therefore
//! read from the same occurrence and come out zipped, never cross-joined.

use sip_model::{Dictionary, MetadataRecord, Namespace, Node, Path, Tag, Value};
use tracing::trace;

use crate::error::{CompileWarning, MappingError};
use crate::escape::{Escaper, Function};

/// How many instances of a target element one context produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// One instance in the current context.
    Once,
    /// One instance per occurrence of the group.
    Each(Path),
    /// An instance for the first occurrence of the group only.
    First(Path),
}

#[derive(Debug, Clone)]
pub struct ElementOp {
    pub(crate) tag: Tag,
    pub(crate) output: Path,
    pub(crate) iteration: Iteration,
    pub(crate) value: Option<ValueOp>,
    pub(crate) attributes: Vec<AttributeOp>,
    pub(crate) children: Vec<ElementOp>,
    pub(crate) always_present: bool,
}

impl ElementOp {
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn iteration(&self) -> &Iteration {
        &self.iteration
    }

    pub fn children(&self) -> &[ElementOp] {
        &self.children
    }

    pub fn attributes(&self) -> &[AttributeOp] {
        &self.attributes
    }

    pub fn is_mapped(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AttributeOp {
    pub(crate) tag: Tag,
    pub(crate) value: Option<ValueOp>,
    pub(crate) always_present: bool,
}

impl AttributeOp {
    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

/// Where a placeholder takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Variable {
    Input(usize),
    Constant(String),
    RecordId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Value {
        name: String,
        variable: Variable,
        functions: Vec<Function>,
    },
}

/// Extraction, rewriting and escaping of one target value.
#[derive(Debug, Clone)]
pub struct ValueOp {
    pub(crate) output: Path,
    /// Absolute source paths; the first is primary.
    pub(crate) inputs: Vec<Path>,
    pub(crate) dictionary: Option<Dictionary>,
    pub(crate) template: Option<Vec<Segment>>,
    pub(crate) escaper: Escaper,
}

#[derive(Debug, Clone)]
pub struct Program {
    /// Single-tag path of the expected record root; empty when nothing is mapped.
    pub(crate) source_root: Path,
    pub(crate) root: ElementOp,
    pub(crate) namespaces: Vec<Namespace>,
    pub(crate) warnings: Vec<CompileWarning>,
}

struct Frame<'r> {
    group: Path,
    node: &'r Node,
}

struct Context<'r> {
    record_id: &'r str,
    frames: Vec<Frame<'r>>,
}

impl<'r> Context<'r> {
    fn resolve(&self, path: &Path) -> Vec<Value<'r>> {
        for frame in self.frames.iter().rev() {
            if let Ok(relative) = path.extend_ancestor(&frame.group) {
                return frame.node.select(&relative);
            }
        }
        Vec::new()
    }

    fn first_text(&self, path: &Path) -> Option<String> {
        self.resolve(path)
            .iter()
            .filter_map(Value::text)
            .find(|text| !text.trim().is_empty())
            .map(str::to_string)
    }
}

impl Program {
    /// Generation warnings collected while compiling.
    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    pub fn root(&self) -> &ElementOp {
        &self.root
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// The element every input record must have as its root, when known.
    pub fn source_root(&self) -> Option<&Tag> {
        self.source_root.first()
    }

    /// Produce the output tree for one record.
    pub fn execute(&self, record: &MetadataRecord) -> Result<Node, MappingError> {
        if let Some(expected) = self.source_root()
            && *expected != record.root.tag
        {
            return Err(MappingError::UnexpectedRoot {
                record_id: record.id.clone(),
                expected: expected.to_string(),
                found: record.root.tag.to_string(),
            });
        }
        let mut context = Context {
            record_id: &record.id,
            frames: vec![Frame {
                group: self.source_root.clone(),
                node: &record.root,
            }],
        };
        let mut instances = self.run_element(&self.root, &mut context)?;
        let root = if instances.is_empty() {
            Node::new(self.root.tag.clone())
        } else {
            instances.swap_remove(0)
        };
        trace!(record_id = %record.id, "executed program");
        Ok(root)
    }

    fn run_element<'r>(
        &self,
        op: &ElementOp,
        context: &mut Context<'r>,
    ) -> Result<Vec<Node>, MappingError> {
        let mut out = Vec::new();
        match &op.iteration {
            Iteration::Once => {
                if let Some(node) = self.instance(op, context)? {
                    out.push(node);
                }
            }
            Iteration::Each(group) | Iteration::First(group) => {
                let mut occurrences: Vec<&'r Node> = context
                    .resolve(group)
                    .into_iter()
                    .filter_map(|value| value.node())
                    .collect();
                if matches!(op.iteration, Iteration::First(_)) {
                    occurrences.truncate(1);
                }
                for node in occurrences {
                    context.frames.push(Frame {
                        group: group.clone(),
                        node,
                    });
                    let instance = self.instance(op, context);
                    context.frames.pop();
                    if let Some(node) = instance? {
                        out.push(node);
                    }
                }
            }
        }
        if out.is_empty() && op.always_present {
            out.push(Node::new(op.tag.clone()));
        }
        Ok(out)
    }

    fn instance(&self, op: &ElementOp, context: &mut Context<'_>) -> Result<Option<Node>, MappingError> {
        let mut node = Node::new(op.tag.clone());
        if let Some(value) = &op.value {
            node.text = value.evaluate(context)?;
        }
        for attribute in &op.attributes {
            let value = match &attribute.value {
                Some(value) => value.evaluate(context)?,
                None => None,
            };
            match value {
                Some(value) => {
                    node.attributes.insert(attribute.tag.clone(), value);
                }
                None if attribute.always_present => {
                    node.attributes.insert(attribute.tag.clone(), String::new());
                }
                None => {}
            }
        }
        for child in &op.children {
            let produced = self.run_element(child, context)?;
            node.children.extend(produced);
        }
        let has_content =
            node.text.is_some() || !node.attributes.is_empty() || !node.children.is_empty();
        Ok(has_content.then_some(node))
    }
}

impl ValueOp {
    fn evaluate(&self, context: &Context<'_>) -> Result<Option<String>, MappingError> {
        let mut values: Vec<Option<String>> = self
            .inputs
            .iter()
            .map(|path| context.first_text(path))
            .collect();
        let Some(Some(primary)) = values.first().cloned() else {
            return Ok(None);
        };
        let primary = match &self.dictionary {
            Some(dictionary) => match dictionary.rewrite(&primary) {
                Some(rewritten) => rewritten,
                None => return Ok(None),
            },
            None => primary,
        };
        values[0] = Some(primary);

        let text = match &self.template {
            Some(segments) => self.render(segments, &values, context)?,
            None => values.into_iter().flatten().collect::<Vec<_>>().join(" "),
        };
        if text.is_empty() {
            return Ok(None);
        }
        self.escaper
            .escape(&text)
            .map(Some)
            .map_err(|_| MappingError::InvalidNumber {
                record_id: context.record_id.to_string(),
                output: self.output.clone(),
                value: text,
            })
    }

    fn render(
        &self,
        segments: &[Segment],
        values: &[Option<String>],
        context: &Context<'_>,
    ) -> Result<String, MappingError> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Value {
                    name,
                    variable,
                    functions,
                } => {
                    let raw = match variable {
                        Variable::Input(index) => values.get(*index).cloned().flatten(),
                        Variable::Constant(text) => Some(text.clone()),
                        Variable::RecordId => Some(context.record_id.to_string()),
                    };
                    let value = functions
                        .iter()
                        .fold(raw, |value, function| function.apply(value));
                    let Some(value) = value else {
                        return Err(MappingError::MissingValue {
                            record_id: context.record_id.to_string(),
                            output: self.output.clone(),
                            name: name.clone(),
                        });
                    };
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}
