//! Minimal XML element tree over quick-xml, plus the JSON <-> XML mapping
//! used for configuration content.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("Malformed document: {0}")]
    Malformed(String),
}

pub type XmlResult<T> = Result<T, XmlError>;

/// A parsed element. Names are stored without namespace prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attributes with their qualified names as written.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Attribute by local name, ignoring any prefix.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == local || k.rsplit_once(':').is_some_and(|(_, l)| l == local))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Name of the single child, for choices like `<target><candidate/></target>`.
    pub fn only_child_name(&self) -> Option<&str> {
        match self.children.as_slice() {
            [only] => Some(only.name.as_str()),
            _ => None,
        }
    }
}

fn local_name(bytes: &[u8]) -> XmlResult<String> {
    let s = std::str::from_utf8(bytes).map_err(|e| XmlError::Parse(e.to_string()))?;
    Ok(s.rsplit_once(':').map_or(s, |(_, l)| l).to_string())
}

fn start_element(start: &BytesStart<'_>) -> XmlResult<Element> {
    let mut el = Element::new(local_name(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlError::Parse(e.to_string()))?
            .to_string();
        let value = attr.unescape_value().map_err(|e| XmlError::Parse(e.to_string()))?;
        el.attrs.push((key, value.into_owned()));
    }
    Ok(el)
}

/// Parse a document into its root element.
pub fn parse(input: &[u8]) -> XmlResult<Element> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| XmlError::Parse(format!("at byte {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(start) => stack.push(start_element(&start)?),
            Event::Empty(start) => {
                let el = start_element(&start)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| XmlError::Parse(e.to_string()))?;
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None => return Err(XmlError::Malformed("text outside the root element".into())),
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element".into()));
    }
    root.ok_or_else(|| XmlError::Malformed("empty document".into()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> XmlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => return Err(XmlError::Malformed("multiple root elements".into())),
    }
    Ok(())
}

// =============================================================================
// JSON mapping
// =============================================================================

/// Convert an element's content to JSON. Leaves become strings, repeated
/// child names become arrays.
pub fn element_to_json(el: &Element) -> Value {
    if el.children.is_empty() {
        return Value::String(el.text().to_string());
    }
    let mut obj = Map::new();
    for child in &el.children {
        let value = element_to_json(child);
        match obj.get_mut(&child.name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                obj.insert(child.name.clone(), value);
            }
        }
    }
    Value::Object(obj)
}

/// Write `value` as element(s) named `name`. Arrays become repeated
/// elements; `attrs` is written verbatim on the outermost element(s).
pub fn write_json(out: &mut String, name: &str, value: &Value, attrs: &str) {
    match value {
        Value::Array(items) => {
            for item in items {
                write_json(out, name, item, attrs);
            }
        }
        Value::Null => {
            out.push_str(&format!("<{}{}/>", name, attrs));
        }
        Value::Object(obj) => {
            out.push_str(&format!("<{}{}>", name, attrs));
            for (k, v) in obj {
                write_json(out, k, v, "");
            }
            out.push_str(&format!("</{}>", name));
        }
        Value::String(s) => {
            out.push_str(&format!("<{}{}>{}</{}>", name, attrs, escape(s.as_str()), name));
        }
        Value::Bool(_) | Value::Number(_) => {
            out.push_str(&format!("<{}{}>{}</{}>", name, attrs, value, name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rpc_with_prefixes() {
        let doc = br#"<?xml version="1.0"?>
            <nc:rpc xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="7">
              <nc:get-config><nc:source><nc:running/></nc:source></nc:get-config>
            </nc:rpc>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.name, "rpc");
        assert_eq!(root.attr("message-id"), Some("7"));
        let op = &root.children[0];
        assert_eq!(op.name, "get-config");
        assert_eq!(op.child("source").unwrap().only_child_name(), Some("running"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(b"<rpc><get></rpc>").is_err());
        assert!(parse(b"").is_err());
        assert!(parse(b"<a/><b/>").is_err());
    }

    #[test]
    fn test_text_is_unescaped() {
        let root = parse(b"<v>a &amp; b</v>").unwrap();
        assert_eq!(root.text(), "a & b");
    }

    #[test]
    fn test_element_to_json_lists_and_leaves() {
        let root = parse(
            b"<subscribers><imsi>001010000000001</imsi><profile><qos-profile-id>q</qos-profile-id>\
              <allowed-slices>1</allowed-slices><allowed-slices>2</allowed-slices></profile></subscribers>",
        )
        .unwrap();
        assert_eq!(
            element_to_json(&root),
            json!({
                "imsi": "001010000000001",
                "profile": {"qos-profile-id": "q", "allowed-slices": ["1", "2"]}
            })
        );
    }

    #[test]
    fn test_write_json_escapes_and_repeats() {
        let mut out = String::new();
        write_json(
            &mut out,
            "qos-profiles",
            &json!([{"id": "a<b", "priority": 5}, {"id": "c", "priority": 6}]),
            " xmlns=\"urn:x\"",
        );
        assert_eq!(
            out,
            "<qos-profiles xmlns=\"urn:x\"><id>a&lt;b</id><priority>5</priority></qos-profiles>\
             <qos-profiles xmlns=\"urn:x\"><id>c</id><priority>6</priority></qos-profiles>"
        );
    }
}
