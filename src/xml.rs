//! JSON/XML transcoding of audit records

use crate::errors::{EventGenError, Result};
use crate::record::Record;
use std::fmt::Write;

/// Root element of every transcoded record
pub const ROOT_ELEMENT: &str = "AuditRecord";

const INDENT: &str = "  ";

/// Minimal element tree: a name, optional text and child elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    fn write_pretty(&self, out: &mut String, depth: usize) {
        let pad = INDENT.repeat(depth);
        let text = self.text.as_deref().unwrap_or("");

        if self.children.is_empty() {
            if text.is_empty() {
                let _ = writeln!(out, "{}<{}/>", pad, self.name);
            } else {
                let _ = writeln!(out, "{}<{}>{}</{}>", pad, self.name, escape_value(text), self.name);
            }
            return;
        }

        let _ = writeln!(out, "{}<{}>", pad, self.name);
        if !text.is_empty() {
            let _ = writeln!(out, "{}{}{}", pad, INDENT, escape_value(text));
        }
        for child in &self.children {
            child.write_pretty(out, depth + 1);
        }
        let _ = writeln!(out, "{}</{}>", pad, self.name);
    }
}

/// Replace anything outside `[A-Za-z0-9_]` with `_`, one per character.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `client_terminal` -> `Client_Terminal`. Separators are kept.
pub fn to_camel_hump(key: &str) -> String {
    key.split('_')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("_")
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Element name for a record key: sanitized, then cased. An empty result or
/// one starting with a digit is not a valid XML name and gets a `_` prefix.
pub fn element_name(key: &str) -> String {
    let name = to_camel_hump(&sanitize_key(key));
    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => name,
        _ => format!("_{}", name),
    }
}

/// Escape the five predefined XML entities.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Build an `AuditRecord` tree with one child per field, in field order.
pub fn record_to_xml(record: &Record) -> XmlElement {
    let mut root = XmlElement::new(ROOT_ELEMENT);

    for (key, value) in record.iter() {
        root.push(XmlElement::new(element_name(key)).with_text(value));
    }

    root
}

/// Pretty-print a tree with a two-space indent and an XML declaration.
pub fn xml_to_text(element: &XmlElement) -> String {
    let mut out = String::from("<?xml version=\"1.0\" ?>\n");
    element.write_pretty(&mut out, 0);
    out
}

/// Decode serialized JSON back into a record.
pub fn decode_json_text(text: &str) -> Result<Record> {
    serde_json::from_str(text).map_err(|e| EventGenError::MalformedPayload(e.to_string()))
}

/// JSON text straight to an XML tree.
pub fn json_text_to_xml(text: &str) -> Result<XmlElement> {
    decode_json_text(text).map(|record| record_to_xml(&record))
}
