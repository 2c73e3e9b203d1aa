//! Ready-made patch steps for common format changes.

use std::collections::HashMap;

use ogx_codec::builtin::ATTR_VALUE;
use ogx_codec::record::{ATTR_NAME, ATTR_TYPE, FIELD_ELEMENT};
use ogx_types::node::{ATTR_CLASS, ATTR_ID};
use ogx_types::{
    FormatVersion, IncludeMarker, NodeChild, ObjectId, Scalar, ScalarKind, SerializedNode, TypeTag,
};
use tracing::debug;

use crate::error::{PatchError, PatchResult};
use crate::step::{PatchContext, PatchStep};

fn has_class(node: &SerializedNode, type_tag: &TypeTag) -> bool {
    node.attribute(ATTR_CLASS) == Some(type_tag.as_str())
}

/// Apply `f` to every child slot of the subtree, children of an element
/// before the element's own slot.
fn visit_children(node: &mut SerializedNode, f: &mut impl FnMut(&mut NodeChild)) {
    for child in &mut node.children {
        if let NodeChild::Element(inner) = child {
            visit_children(inner, f);
        }
        f(child);
    }
}

/// Rename a type tag in object nodes and references.
#[derive(Debug, Clone)]
pub struct RenameType {
    from: FormatVersion,
    old: TypeTag,
    new: TypeTag,
    name: String,
}

impl RenameType {
    pub fn new(from: FormatVersion, old: TypeTag, new: TypeTag) -> Self {
        let name = format!("rename type {old} to {new}");
        Self { from, old, new, name }
    }

    fn rename(&self, node: &mut SerializedNode) {
        if has_class(node, &self.old) {
            node.set_attribute(ATTR_CLASS, self.new.as_str());
            if node.name == self.old.as_str() {
                node.name = self.new.as_str().to_string();
            }
        }
    }
}

impl PatchStep for RenameType {
    fn from_version(&self) -> FormatVersion {
        self.from
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, document: &mut SerializedNode, _ctx: &mut PatchContext) -> PatchResult<()> {
        self.rename(document);
        visit_children(document, &mut |child| match child {
            NodeChild::Element(node) => self.rename(node),
            NodeChild::Reference(r) if r.type_tag == self.old => r.type_tag = self.new.clone(),
            _ => {}
        });
        Ok(())
    }
}

/// Rename an XML attribute on object nodes of one type.
#[derive(Debug, Clone)]
pub struct RenameAttribute {
    from: FormatVersion,
    type_tag: TypeTag,
    old: String,
    new: String,
    name: String,
}

impl RenameAttribute {
    pub fn new(
        from: FormatVersion,
        type_tag: TypeTag,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        let (old, new) = (old.into(), new.into());
        let name = format!("rename {type_tag}@{old} to {new}");
        Self {
            from,
            type_tag,
            old,
            new,
            name,
        }
    }
}

impl PatchStep for RenameAttribute {
    fn from_version(&self) -> FormatVersion {
        self.from
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, document: &mut SerializedNode, _ctx: &mut PatchContext) -> PatchResult<()> {
        document.walk_mut(&mut |node| {
            if has_class(node, &self.type_tag) {
                if let Some(value) = node.remove_attribute(&self.old) {
                    node.set_attribute(self.new.clone(), value);
                }
            }
        });
        Ok(())
    }
}

/// Move an XML attribute of one type into a typed record field.
///
/// The attribute's text must parse as `kind`.
#[derive(Debug, Clone)]
pub struct AttributeToField {
    from: FormatVersion,
    type_tag: TypeTag,
    attribute: String,
    field: String,
    kind: ScalarKind,
    name: String,
}

impl AttributeToField {
    pub fn new(
        from: FormatVersion,
        type_tag: TypeTag,
        attribute: impl Into<String>,
        field: impl Into<String>,
        kind: ScalarKind,
    ) -> Self {
        let (attribute, field) = (attribute.into(), field.into());
        let name = format!("move {type_tag}@{attribute} to field {field}");
        Self {
            from,
            type_tag,
            attribute,
            field,
            kind,
            name,
        }
    }
}

impl PatchStep for AttributeToField {
    fn from_version(&self) -> FormatVersion {
        self.from
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, document: &mut SerializedNode, _ctx: &mut PatchContext) -> PatchResult<()> {
        let mut failure = None;
        document.walk_mut(&mut |node| {
            if failure.is_some() || !has_class(node, &self.type_tag) {
                return;
            }
            let Some(text) = node.remove_attribute(&self.attribute) else {
                return;
            };
            match Scalar::parse(self.kind, &text) {
                Ok(value) => node.push_element(
                    SerializedNode::new(FIELD_ELEMENT)
                        .with_attribute(ATTR_NAME, self.field.clone())
                        .with_attribute(ATTR_TYPE, self.kind.as_str())
                        .with_attribute(ATTR_VALUE, value.to_string()),
                ),
                Err(err) => failure = Some(err),
            }
        });
        match failure {
            Some(err) => Err(PatchError::step(&self.name, err.to_string())),
            None => Ok(()),
        }
    }
}

/// Move every inline object of one type into its own unit `Type_id.xml`,
/// next to the unit being patched.
///
/// References that end up crossing a unit boundary become include markers.
/// Includes in other units that name an extracted object by id are left
/// alone. Inline objects without an id stay where they are.
#[derive(Debug, Clone)]
pub struct ExtractToUnit {
    from: FormatVersion,
    type_tag: TypeTag,
    name: String,
}

/// Where an object node ended up: document index and whether it is that
/// document's root.
type Placement = (usize, bool);

impl ExtractToUnit {
    pub fn new(from: FormatVersion, type_tag: TypeTag) -> Self {
        let name = format!("extract {type_tag} into units");
        Self {
            from,
            type_tag,
            name,
        }
    }

    fn file_name(&self, id: &str) -> String {
        format!("{}_{}.xml", self.type_tag, id)
    }

    /// Post-order so nested objects of the type land in their own units
    /// before their ancestor is moved.
    fn extract(
        &self,
        node: &mut SerializedNode,
        out: &mut Vec<(String, SerializedNode)>,
    ) -> PatchResult<()> {
        for child in &mut node.children {
            let NodeChild::Element(inner) = child else {
                continue;
            };
            self.extract(inner, out)?;
            if !has_class(inner, &self.type_tag) {
                continue;
            }
            let Some(id) = inner.object_id()? else {
                continue;
            };
            let file = self.file_name(id.as_str());
            let moved = std::mem::replace(child, NodeChild::Include(IncludeMarker::new(file.clone())));
            if let NodeChild::Element(moved) = moved {
                out.push((file, moved));
            }
        }
        Ok(())
    }
}

fn object_key(node: &SerializedNode) -> Option<(String, String)> {
    Some((
        node.attribute(ATTR_CLASS)?.to_string(),
        node.attribute(ATTR_ID)?.to_string(),
    ))
}

fn index_objects(
    doc: usize,
    document: &SerializedNode,
    placements: &mut HashMap<(String, String), Placement>,
) {
    document.walk_objects(&mut |node| {
        if let Some(key) = object_key(node) {
            placements.insert(key, (doc, std::ptr::eq(node, document)));
        }
    });
}

fn relink(
    doc: usize,
    document: &mut SerializedNode,
    files: &[String],
    placements: &HashMap<(String, String), Placement>,
) -> PatchResult<()> {
    let mut failure = None;
    visit_children(document, &mut |child| {
        let NodeChild::Reference(r) = child else {
            return;
        };
        let key = (r.type_tag.as_str().to_string(), r.id.as_str().to_string());
        let Some(&(target, is_root)) = placements.get(&key) else {
            return;
        };
        if target == doc {
            return;
        }
        let href = files[target].clone();
        *child = NodeChild::Include(if is_root {
            IncludeMarker::new(href)
        } else {
            match ObjectId::new(key.1) {
                Ok(id) => IncludeMarker::to_object(href, id),
                Err(err) => {
                    failure = Some(err);
                    return;
                }
            }
        });
    });
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

impl PatchStep for ExtractToUnit {
    fn from_version(&self) -> FormatVersion {
        self.from
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, document: &mut SerializedNode, ctx: &mut PatchContext) -> PatchResult<()> {
        let mut extracted = Vec::new();
        self.extract(document, &mut extracted)?;
        if extracted.is_empty() {
            return Ok(());
        }

        let own = ctx
            .unit()
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut files = vec![own];
        files.extend(extracted.iter().map(|(file, _)| file.clone()));

        let mut placements = HashMap::new();
        index_objects(0, document, &mut placements);
        for (i, (_, node)) in extracted.iter().enumerate() {
            index_objects(i + 1, node, &mut placements);
        }

        relink(0, document, &files, &placements)?;
        let folder = ctx.folder().to_path_buf();
        for (i, (file, mut node)) in extracted.into_iter().enumerate() {
            relink(i + 1, &mut node, &files, &placements)?;
            debug!(unit = %file, "extracted unit");
            ctx.emit(folder.join(file), node);
        }
        Ok(())
    }
}
