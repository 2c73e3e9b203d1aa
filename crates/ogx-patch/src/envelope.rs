//! The version envelope around a root unit.
//!
//! ```text
//! <archive version="2">
//!   <content>
//!     <Patient class="Patient" id="p1"> ... </Patient>
//!   </content>
//! </archive>
//! ```
//!
//! Satellite units are written bare and inherit the root's version.

use ogx_types::node::ATTR_CLASS;
use ogx_types::{FormatVersion, NodeChild, SerializedNode};

use crate::error::{PatchError, PatchResult};

pub const ENVELOPE_ELEMENT: &str = "archive";
pub const CONTENT_ELEMENT: &str = "content";
pub const ATTR_VERSION: &str = "version";

/// A document split from its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// `None` when the document was stored bare.
    pub version: Option<FormatVersion>,
    pub content: SerializedNode,
}

impl Envelope {
    /// The version to read the content as; bare documents count as `current`.
    pub fn version_or(&self, current: FormatVersion) -> FormatVersion {
        self.version.unwrap_or(current)
    }
}

/// Wrap `content` in an envelope stamped with `version`.
pub fn wrap(content: SerializedNode, version: FormatVersion) -> SerializedNode {
    let body = SerializedNode::new(CONTENT_ELEMENT).with_child(NodeChild::Element(content));
    SerializedNode::new(ENVELOPE_ELEMENT)
        .with_attribute(ATTR_VERSION, version.to_string())
        .with_child(NodeChild::Element(body))
}

/// Whether `document` is an envelope rather than a bare object node.
pub fn is_envelope(document: &SerializedNode) -> bool {
    document.name == ENVELOPE_ELEMENT && document.attribute(ATTR_CLASS).is_none()
}

/// Take a document apart into version and content.
pub fn unwrap(document: SerializedNode) -> PatchResult<Envelope> {
    if !is_envelope(&document) {
        return Ok(Envelope {
            version: None,
            content: document,
        });
    }

    let version = document
        .attribute(ATTR_VERSION)
        .ok_or_else(|| PatchError::Envelope("archive without version".into()))?;
    let version = FormatVersion::parse(version)?;

    let body = document
        .children
        .into_iter()
        .find_map(|child| match child {
            NodeChild::Element(node) if node.name == CONTENT_ELEMENT => Some(node),
            _ => None,
        })
        .ok_or_else(|| PatchError::Envelope("archive without content".into()))?;

    let mut objects = body.children.into_iter().filter_map(|child| match child {
        NodeChild::Element(node) => Some(node),
        _ => None,
    });
    let content = objects
        .next()
        .ok_or_else(|| PatchError::Envelope("empty content".into()))?;
    if objects.next().is_some() {
        return Err(PatchError::Envelope("content holds more than one root".into()));
    }

    Ok(Envelope {
        version: Some(version),
        content,
    })
}
