//! Minimal XML element tree for the mission control documents.
//!
//! Only what the handshake needs: element names without namespace prefixes,
//! attributes, concatenated text, and the byte span of every element in the
//! source so sub-documents can be copied out verbatim.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::ops::Range;

/// Error produced while reading a control document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct XmlError(pub String);

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for XmlError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
    pub span: Range<usize>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>, start: usize) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
            span: start..start,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of a named child.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    pub fn required_text(&self, name: &str) -> Result<&str, XmlError> {
        self.child_text(name)
            .ok_or_else(|| XmlError(format!("missing <{name}> in <{}>", self.name)))
    }

    /// Parses a named child's text, e.g. a port number.
    pub fn parse_child<T: std::str::FromStr>(&self, name: &str) -> Result<T, XmlError> {
        let text = self.required_text(name)?;
        text.parse()
            .map_err(|_| XmlError(format!("invalid value for <{name}>: {text}")))
    }
}

fn local_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn read_attributes(start: &quick_xml::events::BytesStart<'_>) -> Result<Vec<(String, String)>, XmlError> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = local_name(attribute.key.local_name().as_ref());
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

/// Parses a document and returns its root element.
pub fn parse_document(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(start) => {
                let element = Element::new(
                    local_name(start.local_name().as_ref()),
                    read_attributes(&start)?,
                    position,
                );
                stack.push(element);
            }
            Event::Empty(start) => {
                let mut element = Element::new(
                    local_name(start.local_name().as_ref()),
                    read_attributes(&start)?,
                    position,
                );
                element.span.end = reader.buffer_position() as usize;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| XmlError("unexpected closing tag".to_string()))?;
                element.span.end = reader.buffer_position() as usize;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| XmlError("document has no root element".to_string()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError("multiple root elements".to_string())),
    }
    Ok(())
}

/// Escapes text for use in element content or attribute values.
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_spans_and_text() {
        let xml = r#"<?xml version="1.0"?><Root a="1"><Inner x="y &amp; z">hi<B/></Inner><T> 42 </T></Root>"#;
        let root = parse_document(xml).unwrap();
        assert_eq!(root.name, "Root");
        assert_eq!(root.attribute("a"), Some("1"));

        let inner = root.child("Inner").unwrap();
        assert_eq!(inner.attribute("x"), Some("y & z"));
        assert_eq!(&xml[inner.span.clone()], r#"<Inner x="y &amp; z">hi<B/></Inner>"#);
        assert_eq!(&xml[inner.child("B").unwrap().span.clone()], "<B/>");
        assert_eq!(root.parse_child::<u16>("T").unwrap(), 42);
    }

    #[test]
    fn strips_namespace_prefixes() {
        let root = parse_document(r#"<m:ping xmlns:m="urn:x"/>"#).unwrap();
        assert_eq!(root.name, "ping");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a>").is_err());
        assert!(parse_document("just text").is_err());
    }
}
