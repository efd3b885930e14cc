//! Crosswalk compiler.
//!
//! [`compile`] checks every node mapping against the record definition and
//! builds the [`Program`] the runners interpret. All structural problems are
//! reported here, before any record is read.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sip_model::{NodeMapping, Operator, Path, RecDefNode, RecDefTree, RecMapping};
use tracing::{debug, info_span, warn};

use crate::error::{CompileError, CompileWarning, Result};
use crate::escape::{Escaper, FunctionError};
use crate::expression::{Part, Template, TemplateError};
use crate::program::{AttributeOp, ElementOp, Iteration, Program, Segment, ValueOp, Variable};

/// Name that expressions use for the record identifier.
pub const RECORD_ID_VARIABLE: &str = "_id";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Source paths known to occur in the input, usually taken from statistics.
    /// When set, every input must be one of them or an ancestor of one.
    pub source_paths: Option<BTreeSet<Path>>,
}

impl CompileOptions {
    #[must_use]
    pub fn with_source_paths(mut self, source_paths: Option<BTreeSet<Path>>) -> Self {
        self.source_paths = source_paths;
        self
    }
}

/// Compile `rec_mapping` against its record definition.
pub fn compile(rec_mapping: &RecMapping, options: &CompileOptions) -> Result<Program> {
    let _span = info_span!("compile", prefix = %rec_mapping.prefix()).entered();
    let tree = rec_mapping.rec_def_tree();
    let mut compiler = Compiler {
        rec_mapping,
        tree,
        options,
        source_root: None,
        warnings: Vec::new(),
    };
    for (output, node_mapping) in rec_mapping.node_mappings() {
        compiler.check(output, node_mapping)?;
    }
    for node in tree.required_nodes() {
        let mapped = rec_mapping.node_mapping(node.path()).is_some()
            || rec_mapping.has_mapped_descendant(node.path());
        if !mapped && !node.always_present {
            compiler.warn(CompileWarning::RequiredUnmapped {
                output: node.path().clone(),
            });
        }
    }

    let source_root = compiler.source_root.clone().unwrap_or_default();
    let root = compiler
        .element(tree.root(), &source_root)?
        .unwrap_or_else(|| ElementOp {
            tag: tree.root().tag().clone(),
            output: tree.root().path().clone(),
            iteration: Iteration::Once,
            value: None,
            attributes: Vec::new(),
            children: Vec::new(),
            always_present: true,
        });
    debug!(
        node_mappings = rec_mapping.node_mappings().len(),
        warnings = compiler.warnings.len(),
        "compiled crosswalk"
    );
    Ok(Program {
        source_root,
        root,
        namespaces: tree.namespaces().to_vec(),
        warnings: compiler.warnings,
    })
}

struct Compiler<'a> {
    rec_mapping: &'a RecMapping,
    tree: &'a RecDefTree,
    options: &'a CompileOptions,
    /// Single-step path every input starts with, fixed by the first input seen.
    source_root: Option<Path>,
    warnings: Vec<CompileWarning>,
}

/// The loop group of a mapping: its input, or the longest common prefix of
/// its inputs, without a trailing attribute step.
fn group_of(node_mapping: &NodeMapping) -> Option<Path> {
    let mut inputs = node_mapping.inputs.iter().map(|input| &input.path);
    let first = inputs.next()?.clone();
    let prefix = inputs.fold(first, |acc, path| acc.common_prefix(path));
    if prefix.is_attribute() {
        prefix.parent()
    } else {
        Some(prefix)
    }
}

impl Compiler<'_> {
    fn warn(&mut self, warning: CompileWarning) {
        warn!(%warning, "crosswalk warning");
        self.warnings.push(warning);
    }

    fn check(&mut self, output: &Path, node_mapping: &NodeMapping) -> Result<()> {
        let Some(target) = self.tree.get_rec_def_node(output) else {
            return Err(CompileError::UnknownTarget {
                output: output.clone(),
            });
        };
        if node_mapping.inputs.is_empty() {
            return Err(CompileError::NoInputs {
                output: output.clone(),
            });
        }
        for input in &node_mapping.inputs {
            self.check_source(output, &input.path)?;
        }
        if let Some(dictionary) = &node_mapping.dictionary
            && let Some(key) = dictionary.duplicate_keys().first()
        {
            return Err(CompileError::DuplicateDictionaryKey {
                output: output.clone(),
                key: (*key).to_string(),
            });
        }
        self.escaper(target)?;
        if node_mapping.expression.is_some() {
            let segments = self.segments(output, node_mapping)?.unwrap_or_default();
            for (index, input) in node_mapping.inputs.iter().enumerate() {
                let used = segments.iter().any(|segment| {
                    matches!(segment, Segment::Value { variable: Variable::Input(i), .. } if *i == index)
                });
                if !used {
                    self.warn(CompileWarning::UnusedInput {
                        output: output.clone(),
                        name: input.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_source(&mut self, output: &Path, path: &Path) -> Result<()> {
        let root = path.root();
        let consistent = match &self.source_root {
            _ if root.is_empty() || root.is_attribute() => false,
            Some(expected) => *expected == root,
            None => {
                self.source_root = Some(root);
                true
            }
        };
        if !consistent {
            return Err(CompileError::InconsistentSourceRoot {
                output: output.clone(),
                expected: self
                    .source_root
                    .as_ref()
                    .map_or_else(|| "/".to_string(), ToString::to_string),
                found: path.clone(),
            });
        }
        if let Some(known) = &self.options.source_paths {
            let resolved = known.contains(path)
                || known
                    .range(path.clone()..)
                    .next()
                    .is_some_and(|candidate| path.is_ancestor_of(candidate));
            if !resolved {
                return Err(CompileError::UnresolvedSource {
                    output: output.clone(),
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    fn escaper(&self, target: &RecDefNode) -> Result<Escaper> {
        let Some(field_type) = target.field_type.as_deref() else {
            return Ok(Escaper::Text);
        };
        self.tree
            .resolve_field_type(field_type)
            .and_then(Escaper::from_name)
            .ok_or_else(|| CompileError::UnknownFieldType {
                output: target.path().clone(),
                field_type: field_type.to_string(),
            })
    }

    fn segments(&self, output: &Path, node_mapping: &NodeMapping) -> Result<Option<Vec<Segment>>> {
        let Some(expression) = &node_mapping.expression else {
            return Ok(None);
        };
        let template = Template::parse(expression).map_err(|err| match err {
            TemplateError::Invalid(reason) => CompileError::InvalidExpression {
                output: output.clone(),
                reason,
            },
            TemplateError::Function(FunctionError::Unknown(name)) => {
                CompileError::UnknownFunction {
                    output: output.clone(),
                    name,
                }
            }
            TemplateError::Function(FunctionError::MissingArgument(function)) => {
                CompileError::MissingArgument {
                    output: output.clone(),
                    function,
                }
            }
        })?;
        let mut segments = Vec::new();
        for part in template.parts() {
            let segment = match part {
                Part::Literal(text) => Segment::Literal(text.clone()),
                Part::Placeholder(placeholder) => {
                    let name = placeholder.name.as_str();
                    let variable = if let Some(index) =
                        node_mapping.inputs.iter().position(|input| input.name == name)
                    {
                        Variable::Input(index)
                    } else if let Some(value) = self.rec_mapping.fact(name) {
                        Variable::Constant(value.to_string())
                    } else if name == RECORD_ID_VARIABLE {
                        Variable::RecordId
                    } else {
                        return Err(CompileError::UnknownVariable {
                            output: output.clone(),
                            name: name.to_string(),
                        });
                    };
                    Segment::Value {
                        name: name.to_string(),
                        variable,
                        functions: placeholder.functions.clone(),
                    }
                }
            };
            segments.push(segment);
        }
        Ok(Some(segments))
    }

    fn value(&self, target: &RecDefNode, node_mapping: &NodeMapping) -> Result<ValueOp> {
        Ok(ValueOp {
            output: target.path().clone(),
            inputs: node_mapping
                .inputs
                .iter()
                .map(|input| input.path.clone())
                .collect(),
            dictionary: node_mapping.dictionary.clone(),
            template: self.segments(target.path(), node_mapping)?,
            escaper: self.escaper(target)?,
        })
    }

    /// Loop group for an unmapped repeatable `target`, chosen from the groups
    /// of the mappings below it that lie strictly inside `enclosing`.
    ///
    /// `ALL` mappings decide when there are any. Inputs read directly from
    /// the enclosing element do not pin the loop; they resolve against the
    /// outer occurrence instead.
    fn descendant_group(&self, target: &RecDefNode, enclosing: &Path) -> Option<Path> {
        let below: Vec<(Operator, Path)> = self
            .rec_mapping
            .node_mappings()
            .iter()
            .filter(|(output, _)| target.path().is_ancestor_of(output))
            .filter_map(|(_, node_mapping)| {
                group_of(node_mapping).map(|group| (node_mapping.operator, group))
            })
            .filter(|(_, group)| enclosing.is_ancestor_of(group))
            .collect();
        let all: Vec<&Path> = below
            .iter()
            .filter(|(operator, _)| *operator == Operator::All)
            .map(|(_, group)| group)
            .collect();
        let groups: Vec<&Path> = if all.is_empty() {
            below.iter().map(|(_, group)| group).collect()
        } else {
            all
        };
        let inside = |candidates: &[&Path]| {
            candidates
                .iter()
                .map(|group| (*group).clone())
                .reduce(|acc, group| acc.common_prefix(&group))
                .filter(|prefix| enclosing.is_ancestor_of(prefix))
        };
        inside(&groups).or_else(|| {
            let nested: Vec<&Path> = groups
                .iter()
                .copied()
                .filter(|group| group.size() > enclosing.size() + 1)
                .collect();
            inside(&nested)
        })
    }

    /// Build the operation for one element, or `None` when nothing in its
    /// subtree can produce output.
    fn element(&self, target: &RecDefNode, enclosing: &Path) -> Result<Option<ElementOp>> {
        let node_mapping = self.rec_mapping.node_mapping(target.path());
        let populated =
            node_mapping.is_some() || self.rec_mapping.has_mapped_descendant(target.path());
        if !populated && !target.always_present {
            return Ok(None);
        }

        let iteration = match node_mapping.and_then(|m| group_of(m).map(|g| (m, g))) {
            Some((m, group)) if target.repeatable && m.operator == Operator::All => {
                Iteration::Each(group)
            }
            Some((_, group)) => Iteration::First(group),
            None if target.repeatable => self
                .descendant_group(target, enclosing)
                .map_or(Iteration::Once, Iteration::Each),
            None => Iteration::Once,
        };
        let inner = match &iteration {
            Iteration::Each(group) | Iteration::First(group) => group.clone(),
            Iteration::Once => enclosing.clone(),
        };

        let mut attributes = Vec::new();
        let mut children = Vec::new();
        for child in self.tree.children(target.id()) {
            if child.is_attribute() {
                let mapping = self.rec_mapping.node_mapping(child.path());
                if mapping.is_none() && !child.always_present {
                    continue;
                }
                attributes.push(AttributeOp {
                    tag: child.tag().clone(),
                    value: mapping.map(|m| self.value(child, m)).transpose()?,
                    always_present: child.always_present,
                });
            } else if let Some(op) = self.element(child, &inner)? {
                children.push(op);
            }
        }

        Ok(Some(ElementOp {
            tag: target.tag().clone(),
            output: target.path().clone(),
            iteration,
            value: node_mapping.map(|m| self.value(target, m)).transpose()?,
            attributes,
            children,
            always_present: target.always_present,
        }))
    }
}
