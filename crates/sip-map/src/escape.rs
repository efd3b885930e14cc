//! Field-type escapers and expression functions.
//!
//! Both registries are closed enums resolved while compiling, so an unknown
//! name is a compile error rather than a failure on some later record.

use std::fmt::Write as _;

/// How a produced value is encoded for its target field type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Escaper {
    /// Literal text, left to the XML writer.
    #[default]
    Text,
    /// URI reference: characters outside the RFC 3986 sets are percent-encoded.
    Link,
    /// Trimmed decimal number.
    Number,
}

/// Outcome of escaping a number that does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotANumber;

impl Escaper {
    /// Resolve a builtin field-type name.
    pub fn from_name(name: &str) -> Option<Escaper> {
        match name {
            "text" => Some(Escaper::Text),
            "link" | "uri" => Some(Escaper::Link),
            "number" => Some(Escaper::Number),
            _ => None,
        }
    }

    pub fn escape(self, value: &str) -> Result<String, NotANumber> {
        match self {
            Escaper::Text => Ok(value.to_string()),
            Escaper::Link => Ok(percent_encode(value, is_uri_char)),
            Escaper::Number => {
                let trimmed = value.trim();
                match trimmed.parse::<f64>() {
                    Ok(number) if number.is_finite() => Ok(trimmed.to_string()),
                    _ => Err(NotANumber),
                }
            }
        }
    }
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn is_uri_char(c: char) -> bool {
    // `%` is kept so already-encoded references are not encoded twice.
    is_unreserved(c)
        || matches!(
            c,
            ':' | '/' | '?' | '#' | '[' | ']' | '@' | '!' | '$' | '&' | '\'' | '(' | ')' | '*'
                | '+' | ',' | ';' | '=' | '%'
        )
}

fn percent_encode(value: &str, keep: fn(char) -> bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if keep(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

/// A step in a placeholder's function chain: `${name|trim|default(n/a)}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    Trim,
    Uppercase,
    Lowercase,
    /// Percent-encode everything but unreserved characters.
    UriEncode,
    /// Replace an absent or empty value.
    Default(String),
    /// Treat an absent value as empty instead of failing the record.
    Optional,
}

/// Why a function could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionError {
    Unknown(String),
    MissingArgument(String),
}

impl Function {
    pub fn resolve(name: &str, argument: Option<&str>) -> Result<Function, FunctionError> {
        let function = match name {
            "trim" => Function::Trim,
            "uppercase" => Function::Uppercase,
            "lowercase" => Function::Lowercase,
            "uri-encode" => Function::UriEncode,
            "optional" => Function::Optional,
            "default" => match argument {
                Some(text) => Function::Default(text.to_string()),
                None => return Err(FunctionError::MissingArgument(name.to_string())),
            },
            other => return Err(FunctionError::Unknown(other.to_string())),
        };
        Ok(function)
    }

    pub fn apply(&self, value: Option<String>) -> Option<String> {
        match self {
            Function::Trim => value.map(|v| v.trim().to_string()),
            Function::Uppercase => value.map(|v| v.to_uppercase()),
            Function::Lowercase => value.map(|v| v.to_lowercase()),
            Function::UriEncode => value.map(|v| percent_encode(&v, is_unreserved)),
            Function::Default(text) => match value {
                Some(v) if !v.is_empty() => Some(v),
                _ => Some(text.clone()),
            },
            Function::Optional => Some(value.unwrap_or_default()),
        }
    }
}
