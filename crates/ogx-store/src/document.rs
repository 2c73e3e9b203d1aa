//! XML text form of unit documents.
//!
//! Object nodes are written as elements named after their type tag. Include
//! markers become `<include href=".." [object=".."]/>` and same-unit
//! references become `<Type class="Type" ref="id"/>`. Reading reverses the
//! mapping: an `include` element without a `class` is an include marker, and
//! an element carrying both `class` and `ref` is a reference.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use ogx_types::node::{ATTR_CLASS, ATTR_HREF, ATTR_OBJECT, ATTR_REF, INCLUDE_ELEMENT};
use ogx_types::{IncludeMarker, NodeChild, ObjectId, ObjectReference, SerializedNode, TypeTag};

use crate::error::{StoreError, StoreResult};

/// Render a document tree as indented UTF-8 XML.
pub fn write_document(root: &SerializedNode) -> StoreResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| StoreError::Xml(e.to_string()))?;
    write_node(&mut writer, root)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> StoreResult<()> {
    writer
        .write_event(event)
        .map_err(|e| StoreError::Xml(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &SerializedNode) -> StoreResult<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children.is_empty() && node.text.is_none() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    if let Some(text) = &node.text {
        emit(writer, Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        write_child(writer, node, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(node.name.as_str())))
}

fn write_child(
    writer: &mut Writer<Vec<u8>>,
    parent: &SerializedNode,
    child: &NodeChild,
) -> StoreResult<()> {
    match child {
        NodeChild::Element(node) => write_node(writer, node),
        NodeChild::Include(marker) => {
            let mut start = BytesStart::new(INCLUDE_ELEMENT);
            start.push_attribute((ATTR_HREF, marker.href.as_str()));
            if let Some(object) = &marker.object {
                start.push_attribute((ATTR_OBJECT, object.as_str()));
            }
            emit(writer, Event::Empty(start))
        }
        NodeChild::Reference(reference) => {
            let mut start = BytesStart::new(reference.type_tag.as_str());
            start.push_attribute((ATTR_CLASS, reference.type_tag.as_str()));
            start.push_attribute((ATTR_REF, reference.id.as_str()));
            emit(writer, Event::Empty(start))
        }
        NodeChild::Comment(text) => {
            // "--" may not appear inside an XML comment.
            let safe = text.replace("--", "- -");
            emit(writer, Event::Comment(BytesText::from_escaped(format!(" {safe} "))))
        }
        NodeChild::Pending(_) => Err(StoreError::PendingNode(parent.name.clone())),
    }
}

/// Element under construction while parsing.
struct Frame {
    node: SerializedNode,
    text: String,
}

/// Parse a document into its root node.
pub fn read_document(bytes: &[u8]) -> StoreResult<SerializedNode> {
    let text = std::str::from_utf8(bytes).map_err(|e| StoreError::Xml(e.to_string()))?;
    let mut reader = Reader::from_str(text);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<SerializedNode> = None;

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Frame {
                node: start_node(&e)?,
                text: String::new(),
            }),
            Ok(Event::Empty(e)) => {
                let node = start_node(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| StoreError::Xml(format!("unbalanced end tag at {position}")))?;
                let node = finish_frame(frame);
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(t)) => push_text(&mut stack, &String::from_utf8_lossy(&t))?,
            Ok(Event::CData(c)) => push_text(&mut stack, &String::from_utf8_lossy(&c))?,
            Ok(Event::GeneralRef(r)) => {
                let entity = format!("&{};", String::from_utf8_lossy(&r));
                let resolved = quick_xml::escape::unescape(&entity)
                    .map_err(|e| StoreError::Xml(format!("at {position}: {e}")))?;
                push_text(&mut stack, &resolved)?;
            }
            Ok(Event::Comment(c)) => {
                if let Some(frame) = stack.last_mut() {
                    let comment = String::from_utf8_lossy(&c).trim().to_string();
                    frame.node.push(NodeChild::Comment(comment));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(StoreError::Xml(format!("at {position}: {e}"))),
        }
    }

    if !stack.is_empty() {
        return Err(StoreError::Xml("unexpected end of document".into()));
    }
    root.ok_or_else(|| StoreError::Malformed("document has no root element".into()))
}

fn start_node(e: &BytesStart<'_>) -> StoreResult<SerializedNode> {
    let mut node = SerializedNode::new(String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes() {
        let attr = attr.map_err(|err| StoreError::Xml(format!("bad attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|err| StoreError::Xml(format!("bad attribute {key}: {err}")))?;
        node.attributes.push((key, value.into_owned()));
    }
    Ok(node)
}

fn push_text(stack: &mut [Frame], text: &str) -> StoreResult<()> {
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(StoreError::Xml("text outside the root element".into())),
    }
}

/// Indentation whitespace around child elements is dropped; text of leaf
/// elements is kept verbatim.
fn finish_frame(frame: Frame) -> SerializedNode {
    let Frame { mut node, text } = frame;
    if node.children.is_empty() {
        if !text.is_empty() {
            node.text = Some(text);
        }
    } else if !text.trim().is_empty() {
        node.text = Some(text.trim().to_string());
    }
    node
}

fn attach(
    stack: &mut [Frame],
    root: &mut Option<SerializedNode>,
    node: SerializedNode,
) -> StoreResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            let child = classify(node)?;
            parent.node.push(child);
            Ok(())
        }
        None if root.is_some() => Err(StoreError::Malformed("more than one root element".into())),
        None => {
            *root = Some(node);
            Ok(())
        }
    }
}

fn classify(node: SerializedNode) -> StoreResult<NodeChild> {
    if node.name == INCLUDE_ELEMENT && node.attribute(ATTR_CLASS).is_none() {
        let href = node
            .attribute(ATTR_HREF)
            .ok_or_else(|| StoreError::Malformed("include without href".into()))?
            .to_string();
        let object = node
            .attribute(ATTR_OBJECT)
            .map(ObjectId::new)
            .transpose()
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        return Ok(NodeChild::Include(IncludeMarker { href, object }));
    }
    if let (Some(class), Some(target)) = (node.attribute(ATTR_CLASS), node.attribute(ATTR_REF)) {
        let type_tag = TypeTag::new(class).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let id = ObjectId::new(target).map_err(|e| StoreError::Malformed(e.to_string()))?;
        return Ok(NodeChild::Reference(ObjectReference { type_tag, id }));
    }
    Ok(NodeChild::Element(node))
}

/// BLAKE3 digest of document bytes, hex-encoded.
pub fn document_digest(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}
