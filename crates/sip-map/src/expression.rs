//! Expression templates.
//!
//! A template is literal text with placeholders:
//!
//! ```text
//! ${baseUrl}/${id|trim|uri-encode}
//! ${title|default(untitled)}
//! ```
//!
//! A placeholder names an input, a fact or `_id`, followed by a chain of
//! [`Function`]s applied left to right.

use std::sync::LazyLock;

use regex::Regex;

use crate::escape::{Function, FunctionError};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("Invalid placeholder regex"));

static FUNCTION_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9-]*)\s*(?:\(([^)]*)\))?\s*$")
        .expect("Invalid function call regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub functions: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Literal(String),
    Placeholder(Placeholder),
}

/// Problems found while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    Invalid(String),
    Function(FunctionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Template, TemplateError> {
        let mut parts = Vec::new();
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            push_literal(&mut parts, &text[last..whole.start()])?;
            parts.push(Part::Placeholder(parse_placeholder(body.as_str())?));
            last = whole.end();
        }
        push_literal(&mut parts, &text[last..])?;
        Ok(Template { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.parts.iter().filter_map(|part| match part {
            Part::Placeholder(placeholder) => Some(placeholder),
            Part::Literal(_) => None,
        })
    }
}

fn push_literal(parts: &mut Vec<Part>, literal: &str) -> Result<(), TemplateError> {
    if literal.contains("${") {
        return Err(TemplateError::Invalid(format!(
            "unterminated placeholder in '{literal}'"
        )));
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal.to_string()));
    }
    Ok(())
}

fn parse_placeholder(body: &str) -> Result<Placeholder, TemplateError> {
    let mut segments = body.split('|');
    let name = segments.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(TemplateError::Invalid(format!(
            "placeholder '${{{body}}}' has no name"
        )));
    }
    let mut functions = Vec::new();
    for segment in segments {
        let Some(call) = FUNCTION_CALL.captures(segment) else {
            return Err(TemplateError::Invalid(format!(
                "cannot read function '{}'",
                segment.trim()
            )));
        };
        let function_name = call.get(1).map_or("", |m| m.as_str());
        let argument = call.get(2).map(|m| m.as_str());
        functions.push(Function::resolve(function_name, argument).map_err(TemplateError::Function)?);
    }
    Ok(Placeholder {
        name: name.to_string(),
        functions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_literals_and_placeholders() {
        let template = Template::parse("${baseUrl}/object/${id|trim|uri-encode}").unwrap();
        assert_eq!(
            template.parts(),
            &[
                Part::Placeholder(Placeholder {
                    name: "baseUrl".to_string(),
                    functions: vec![],
                }),
                Part::Literal("/object/".to_string()),
                Part::Placeholder(Placeholder {
                    name: "id".to_string(),
                    functions: vec![Function::Trim, Function::UriEncode],
                }),
            ]
        );
    }

    #[test]
    fn reads_function_arguments() {
        let template = Template::parse("${title | default(no title) }").unwrap();
        let placeholder = template.placeholders().next().unwrap();
        assert_eq!(
            placeholder.functions,
            vec![Function::Default("no title".to_string())]
        );
    }

    #[test]
    fn rejects_bad_templates() {
        assert!(matches!(
            Template::parse("${title"),
            Err(TemplateError::Invalid(_))
        ));
        assert!(matches!(Template::parse("${}"), Err(TemplateError::Invalid(_))));
        assert_eq!(
            Template::parse("${title|reverse}"),
            Err(TemplateError::Function(FunctionError::Unknown(
                "reverse".to_string()
            )))
        );
        assert_eq!(
            Template::parse("${title|default}"),
            Err(TemplateError::Function(FunctionError::MissingArgument(
                "default".to_string()
            )))
        );
    }

    #[test]
    fn plain_text_is_one_literal() {
        let template = Template::parse("fixed").unwrap();
        assert_eq!(template.parts(), &[Part::Literal("fixed".to_string())]);
        assert_eq!(template.placeholders().count(), 0);
    }
}
