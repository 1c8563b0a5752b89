use crate::domain::{DomainError, DomainResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use serde_json::{Map, Value};

const INDENT_SIZE: usize = 4;

/// Convert a single-root XML document into a JSON object keyed by the root
/// element name.
///
/// - elements with child elements become objects
/// - repeated sibling elements become arrays in document order
/// - text-only elements become strings, empty elements become `null`
/// - attributes, comments, processing instructions and declarations are ignored
pub fn xml_to_json(payload: &[u8]) -> DomainResult<Value> {
    let mut reader = Reader::from_reader(payload);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<ElementFrame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            malformed(format!(
                "invalid XML at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => {
                let name = element_name(&start)?;
                ensure_single_root(&stack, &root)?;
                stack.push(ElementFrame::new(name));
            }
            Event::Empty(start) => {
                let name = element_name(&start)?;
                ensure_single_root(&stack, &root)?;
                attach(&mut stack, &mut root, name, Value::Null);
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| malformed("closing tag without matching opening tag"))?;
                let name = frame.name.clone();
                let value = frame.into_value()?;
                attach(&mut stack, &mut root, name, value);
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| malformed(format!("invalid text content: {}", e)))?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| malformed(format!("invalid CDATA content: {}", e)))?;
                push_text(&mut stack, text)?;
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if let Some(unclosed) = stack.last() {
        return Err(malformed(format!("unclosed element '{}'", unclosed.name)));
    }

    let (name, value) = root.ok_or_else(|| malformed("document has no root element"))?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

/// Inverse of [`xml_to_json`]: render a single-key JSON object as an indented
/// XML document.
pub fn json_to_xml(document: &Value) -> DomainResult<Vec<u8>> {
    let root = document
        .as_object()
        .ok_or_else(|| malformed("document must be a JSON object"))?;

    if root.len() != 1 {
        return Err(malformed(format!(
            "document must have exactly one root key, found {}",
            root.len()
        )));
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_SIZE);
    for (name, value) in root {
        write_element(&mut writer, name, value)?;
    }

    Ok(writer.into_inner())
}

struct ElementFrame {
    name: String,
    fields: Map<String, Value>,
    text: String,
    has_children: bool,
}

impl ElementFrame {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Map::new(),
            text: String::new(),
            has_children: false,
        }
    }

    fn into_value(self) -> DomainResult<Value> {
        if self.has_children {
            if !self.text.trim().is_empty() {
                return Err(malformed(format!(
                    "mixed content in element '{}'",
                    self.name
                )));
            }
            Ok(Value::Object(self.fields))
        } else if self.text.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::String(self.text))
        }
    }
}

fn malformed(reason: impl Into<String>) -> DomainError {
    DomainError::MalformedInput(reason.into())
}

fn element_name(start: &BytesStart<'_>) -> DomainResult<String> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| malformed(format!("invalid element name: {}", e)))
}

fn ensure_single_root(stack: &[ElementFrame], root: &Option<(String, Value)>) -> DomainResult<()> {
    if stack.is_empty() && root.is_some() {
        return Err(malformed("document has more than one root element"));
    }
    Ok(())
}

fn push_text(stack: &mut [ElementFrame], text: &str) -> DomainResult<()> {
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(text);
            Ok(())
        }
        None => Err(malformed("text outside the root element")),
    }
}

fn attach(
    stack: &mut [ElementFrame],
    root: &mut Option<(String, Value)>,
    name: String,
    value: Value,
) {
    match stack.last_mut() {
        Some(parent) => {
            parent.has_children = true;
            insert_field(&mut parent.fields, name, value);
        }
        None => *root = Some((name, value)),
    }
}

fn insert_field(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> DomainResult<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
            Ok(())
        }
        Value::Null => write_event(writer, Event::Empty(BytesStart::new(name))),
        Value::Object(fields) => {
            write_event(writer, Event::Start(BytesStart::new(name)))?;
            for (child, child_value) in fields {
                write_element(writer, child, child_value)?;
            }
            write_event(writer, Event::End(BytesEnd::new(name)))
        }
        Value::String(text) => write_text_element(writer, name, text),
        Value::Bool(flag) => write_text_element(writer, name, &flag.to_string()),
        Value::Number(number) => write_text_element(writer, name, &number.to_string()),
    }
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> DomainResult<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> DomainResult<()> {
    writer
        .write_event(event)
        .map_err(|e| malformed(format!("failed to write XML: {}", e)))
}
