//! Thin helpers around `quick-xml` shared by every document format in the
//! workspace: record dumps, record definitions, crosswalks and statistics.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

/// A well-formedness or encoding problem in an XML document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("xml error at byte {position}: {message}")]
pub struct XmlError {
    pub position: u64,
    pub message: String,
}

impl XmlError {
    pub fn new(position: u64, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Simplified pull events; comments, processing instructions and the
/// declaration are skipped, references are resolved into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum XmlEvent {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
        empty: bool,
    },
    End,
    Text(String),
    Eof,
}

pub(crate) struct EventReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> EventReader<R> {
    pub(crate) fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
        }
    }

    fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn error(&self, message: impl Into<String>) -> XmlError {
        XmlError::new(self.position(), message)
    }

    pub(crate) fn next_event(&mut self) -> Result<XmlEvent, XmlError> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_event_into(&mut self.buf)
                .map(Event::into_owned);
            let event = match read {
                Ok(event) => event,
                Err(err) => return Err(self.error(err.to_string())),
            };
            match event {
                Event::Start(e) => return self.start(&e, false),
                Event::Empty(e) => return self.start(&e, true),
                Event::End(_) => return Ok(XmlEvent::End),
                Event::Text(e) => {
                    let raw = self.utf8(&e)?;
                    let text = quick_xml::escape::unescape(&raw)
                        .map_err(|err| self.error(err.to_string()))?;
                    return Ok(XmlEvent::Text(text.into_owned()));
                }
                Event::CData(e) => return Ok(XmlEvent::Text(self.utf8(&e)?)),
                Event::GeneralRef(e) => {
                    let name = self.utf8(&e)?;
                    let resolved = resolve_reference(&name)
                        .ok_or_else(|| self.error(format!("unknown entity reference &{name};")))?;
                    return Ok(XmlEvent::Text(resolved));
                }
                Event::Eof => return Ok(XmlEvent::Eof),
                _ => {}
            }
        }
    }

    fn start(&self, e: &BytesStart<'_>, empty: bool) -> Result<XmlEvent, XmlError> {
        let name = self.utf8(e.name().as_ref())?;
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.error(err.to_string()))?;
            let key = self.utf8(attr.key.as_ref())?;
            let raw = self.utf8(&attr.value)?;
            let value = quick_xml::escape::unescape(&raw)
                .map_err(|err| self.error(err.to_string()))?;
            attributes.push((key, value.into_owned()));
        }
        Ok(XmlEvent::Start {
            name,
            attributes,
            empty,
        })
    }

    fn utf8(&self, bytes: &[u8]) -> Result<String, XmlError> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|err| self.error(err.to_string()))
    }
}

/// Resolve a predefined entity (`amp`) or character reference (`#x41`).
fn resolve_reference(name: &str) -> Option<String> {
    let predefined = match name {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        _ => None,
    };
    if let Some(value) = predefined {
        return Some(value.to_string());
    }
    let number = name.strip_prefix('#')?;
    let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => number.parse().ok()?,
    };
    char::from_u32(code).map(String::from)
}

/// A writer with the two-space indentation used by every written document.
pub fn document_writer() -> Writer<Vec<u8>> {
    Writer::new_with_indent(Vec::new(), b' ', 2)
}

pub fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|err| XmlError::new(0, err.to_string()))
}

pub fn write_declaration(writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
    write_event(
        writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )
}

/// Write `<name>text</name>`.
pub fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), XmlError> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

/// Consume the writer and return the document text with a trailing newline.
pub fn finish_document(writer: Writer<Vec<u8>>) -> Result<String, XmlError> {
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|err| XmlError::new(0, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(xml: &str) -> Vec<XmlEvent> {
        let mut reader = EventReader::new(xml.as_bytes());
        let mut out = Vec::new();
        loop {
            let event = reader.next_event().unwrap();
            if event == XmlEvent::Eof {
                break;
            }
            out.push(event);
        }
        out
    }

    #[test]
    fn resolves_references() {
        assert_eq!(resolve_reference("amp").as_deref(), Some("&"));
        assert_eq!(resolve_reference("#x41").as_deref(), Some("A"));
        assert_eq!(resolve_reference("#66").as_deref(), Some("B"));
        assert_eq!(resolve_reference("nbsp"), None);
    }

    #[test]
    fn reads_attributes_and_text() {
        let text: String = events("<a x=\"1 &amp; 2\">b &lt; c</a>")
            .into_iter()
            .filter_map(|e| match e {
                XmlEvent::Text(t) => Some(t),
                XmlEvent::Start { attributes, .. } => {
                    assert_eq!(attributes, vec![("x".to_string(), "1 & 2".to_string())]);
                    None
                }
                _ => None,
            })
            .collect();
        assert_eq!(text, "b < c");
    }

    #[test]
    fn reports_malformed_documents() {
        let mut reader = EventReader::new("<a><b></a>".as_bytes());
        let mut failed = false;
        for _ in 0..10 {
            match reader.next_event() {
                Err(_) => {
                    failed = true;
                    break;
                }
                Ok(XmlEvent::Eof) => break,
                Ok(_) => {}
            }
        }
        assert!(failed);
    }
}
