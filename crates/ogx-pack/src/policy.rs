//! Split and path policies.
//!
//! A [`SplitPolicy`] decides whether an object starts a new unit; a
//! [`PathPolicy`] names the unit it starts. Both are consulted in traversal
//! order and reset at the start of every save.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use ogx_types::{DataObject, ObjectId, TypeTag};

/// Location of a unit relative to the save's root folder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnitPath {
    pub folder: PathBuf,
    pub base_name: String,
    pub extension: String,
}

impl UnitPath {
    pub fn new(folder: impl Into<PathBuf>, base_name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            base_name: base_name.into(),
            extension: extension.into(),
        }
    }

    /// Split a relative file path into folder, base name and extension.
    pub fn from_path(path: &Path) -> Self {
        let folder = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            folder,
            base_name,
            extension,
        }
    }

    /// `folder/base_name.extension`
    pub fn relative(&self) -> PathBuf {
        let file = if self.extension.is_empty() {
            self.base_name.clone()
        } else {
            format!("{}.{}", self.base_name, self.extension)
        };
        self.folder.join(file)
    }
}

/// Decides unit boundaries.
pub trait SplitPolicy: Send {
    /// Should `object` (which has a father) start a new unit?
    fn split(&mut self, object: &DataObject) -> bool;

    /// Forget per-save state.
    fn reset(&mut self) {}
}

/// Every object is its own unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSplit;

impl SplitPolicy for AlwaysSplit {
    fn split(&mut self, _object: &DataObject) -> bool {
        true
    }
}

/// The whole graph is one unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverSplit;

impl SplitPolicy for NeverSplit {
    fn split(&mut self, _object: &DataObject) -> bool {
        false
    }
}

/// Split exactly at objects whose type tag is on the allow-list.
#[derive(Debug, Default, Clone)]
pub struct ListManaged {
    types: BTreeSet<TypeTag>,
}

impl ListManaged {
    pub fn new(types: impl IntoIterator<Item = TypeTag>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    pub fn add(&mut self, type_tag: TypeTag) {
        self.types.insert(type_tag);
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeTag> {
        self.types.iter()
    }
}

impl SplitPolicy for ListManaged {
    fn split(&mut self, object: &DataObject) -> bool {
        self.types.contains(object.type_tag())
    }
}

/// Names units.
pub trait PathPolicy: Send {
    /// Path of the unit started by `object`, relative to the root folder.
    fn get_path(&mut self, object: &DataObject, id: &ObjectId) -> UnitPath;

    /// Forget per-save state.
    fn reset(&mut self) {}
}

/// `Type_id.xml` in the root folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeAndId;

impl PathPolicy for TypeAndId {
    fn get_path(&mut self, object: &DataObject, id: &ObjectId) -> UnitPath {
        UnitPath::new("", format!("{}_{}", object.type_tag(), id), "xml")
    }
}

/// `Type_N.xml`, with `N` counting units per type from 0.
#[derive(Debug, Default, Clone)]
pub struct Index {
    counters: HashMap<TypeTag, u64>,
}

impl PathPolicy for Index {
    fn get_path(&mut self, object: &DataObject, _id: &ObjectId) -> UnitPath {
        let counter = self.counters.entry(object.type_tag().clone()).or_insert(0);
        let n = *counter;
        *counter += 1;
        UnitPath::new("", format!("{}_{}", object.type_tag(), n), "xml")
    }

    fn reset(&mut self) {
        self.counters.clear();
    }
}

/// One fixed path for every unit. Only sound with [`NeverSplit`]; any other
/// pairing makes units collide, which the partitioner reports.
#[derive(Debug, Clone)]
pub struct UniquePath {
    path: UnitPath,
}

impl UniquePath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: UnitPath::from_path(path.as_ref()),
        }
    }
}

impl PathPolicy for UniquePath {
    fn get_path(&mut self, _object: &DataObject, _id: &ObjectId) -> UnitPath {
        self.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(tag: &str) -> ogx_types::ObjectRef {
        DataObject::new(TypeTag::new(tag).unwrap())
    }

    fn id(s: &str) -> ObjectId {
        ObjectId::new(s).unwrap()
    }

    #[test]
    fn split_policies() {
        let foo = obj("Foo");
        let bar = obj("Bar");
        assert!(AlwaysSplit.split(&bar));
        assert!(!NeverSplit.split(&foo));
        let mut listed = ListManaged::new([TypeTag::new("Foo").unwrap()]);
        assert!(listed.split(&foo));
        assert!(!listed.split(&bar));
        listed.add(TypeTag::new("Bar").unwrap());
        assert!(listed.split(&bar));
    }

    #[test]
    fn type_and_id_path() {
        let path = TypeAndId.get_path(&obj("Patient"), &id("p1"));
        assert_eq!(path.relative(), PathBuf::from("Patient_p1.xml"));
    }

    #[test]
    fn index_counts_per_type_and_resets() {
        let mut policy = Index::default();
        let names: Vec<PathBuf> = ["Study", "Study", "Patient", "Study"]
            .iter()
            .map(|t| policy.get_path(&obj(t), &id("x")).relative())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("Study_0.xml"),
                PathBuf::from("Study_1.xml"),
                PathBuf::from("Patient_0.xml"),
                PathBuf::from("Study_2.xml"),
            ]
        );
        policy.reset();
        assert_eq!(
            policy.get_path(&obj("Study"), &id("y")).relative(),
            PathBuf::from("Study_0.xml")
        );
    }

    #[test]
    fn unique_path_is_fixed() {
        let mut policy = UniquePath::new("out/archive.xml");
        let a = policy.get_path(&obj("A"), &id("1"));
        let b = policy.get_path(&obj("B"), &id("2"));
        assert_eq!(a, b);
        assert_eq!(a.folder, PathBuf::from("out"));
        assert_eq!(a.base_name, "archive");
        assert_eq!(a.extension, "xml");
    }
}
