//! External buffer handlers.
//!
//! A buffer is an object's out-of-band byte payload. The engine never inlines
//! it: the owning object's node gets a `<buffer protocol=".." href=".."/>`
//! element and the handler registered for that protocol moves the bytes to
//! and from a file placed next to the owning unit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use ogx_types::{DataObject, ObjectId};

use crate::error::{StoreError, StoreResult};
use crate::traits::UnitStore;

/// Element recording a buffer inside its object's node.
pub const BUFFER_ELEMENT: &str = "buffer";
/// Attribute naming the handler that wrote the buffer.
pub const ATTR_PROTOCOL: &str = "protocol";

/// Moves an object's buffer between memory and a store.
pub trait BufferHandler: Send + Sync {
    /// Tag recorded in documents to select this handler on load.
    fn protocol(&self) -> &str;

    /// File extension of buffer files, without the dot.
    fn extension(&self) -> &str;

    /// Where the buffer of `object` lives when its unit is in `unit_folder`.
    fn locate(&self, unit_folder: &Path, object: &DataObject, id: &ObjectId) -> PathBuf {
        unit_folder.join(format!(
            "{}_{}.{}",
            object.type_tag(),
            id,
            self.extension()
        ))
    }

    /// Write the object's buffer to `target`.
    fn save_buffer(&self, store: &dyn UnitStore, object: &DataObject, target: &Path)
        -> StoreResult<()>;

    /// Read the buffer at `source` into the object.
    fn load_buffer(&self, store: &dyn UnitStore, object: &DataObject, source: &Path)
        -> StoreResult<()>;
}

fn payload(object: &DataObject) -> StoreResult<Vec<u8>> {
    object.buffer().ok_or_else(|| {
        StoreError::MissingBuffer(
            object
                .id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| object.type_tag().to_string()),
        )
    })
}

/// Stores buffer bytes unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBuffers;

impl BufferHandler for RawBuffers {
    fn protocol(&self) -> &str {
        "raw"
    }

    fn extension(&self) -> &str {
        "bin"
    }

    fn save_buffer(
        &self,
        store: &dyn UnitStore,
        object: &DataObject,
        target: &Path,
    ) -> StoreResult<()> {
        let bytes = payload(object)?;
        store.write(target, &bytes)?;
        debug!(path = %target.display(), bytes = bytes.len(), "saved raw buffer");
        Ok(())
    }

    fn load_buffer(
        &self,
        store: &dyn UnitStore,
        object: &DataObject,
        source: &Path,
    ) -> StoreResult<()> {
        object.set_buffer(store.read_required(source)?);
        Ok(())
    }
}

const ZSTD_MAGIC: &[u8; 4] = b"OGXB";
const ZSTD_HEADER_LEN: usize = 4 + 4 + 8;

/// Stores buffers zstd-compressed behind a checked header.
///
/// Layout: `OGXB` magic, CRC32 of the uncompressed bytes (u32 BE),
/// uncompressed length (u64 BE), zstd frame.
#[derive(Debug, Clone, Copy)]
pub struct ZstdBuffers {
    level: i32,
}

impl ZstdBuffers {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    fn encode(&self, raw: &[u8]) -> StoreResult<Vec<u8>> {
        let compressed = zstd::encode_all(raw, self.level)
            .map_err(|e| StoreError::Malformed(format!("zstd compression failed: {e}")))?;
        let mut out = Vec::with_capacity(ZSTD_HEADER_LEN + compressed.len());
        out.extend_from_slice(ZSTD_MAGIC);
        out.extend_from_slice(&crc32fast::hash(raw).to_be_bytes());
        out.extend_from_slice(&(raw.len() as u64).to_be_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn decode(path: &Path, data: &[u8]) -> StoreResult<Vec<u8>> {
        let corrupt = |reason: String| StoreError::CorruptBuffer {
            path: path.to_path_buf(),
            reason,
        };
        if data.len() < ZSTD_HEADER_LEN || &data[..4] != ZSTD_MAGIC {
            return Err(corrupt("missing OGXB header".into()));
        }
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[4..8]);
        let mut len = [0u8; 8];
        len.copy_from_slice(&data[8..16]);
        let expected_crc = u32::from_be_bytes(crc);
        let expected_len = u64::from_be_bytes(len);

        let raw = zstd::decode_all(&data[ZSTD_HEADER_LEN..])
            .map_err(|e| corrupt(format!("zstd decompression failed: {e}")))?;
        if raw.len() as u64 != expected_len {
            return Err(corrupt(format!(
                "length mismatch: header says {expected_len}, got {}",
                raw.len()
            )));
        }
        let actual_crc = crc32fast::hash(&raw);
        if actual_crc != expected_crc {
            return Err(corrupt(format!(
                "crc mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"
            )));
        }
        Ok(raw)
    }
}

impl Default for ZstdBuffers {
    fn default() -> Self {
        Self::new(3)
    }
}

impl BufferHandler for ZstdBuffers {
    fn protocol(&self) -> &str {
        "zstd"
    }

    fn extension(&self) -> &str {
        "bin.zst"
    }

    fn save_buffer(
        &self,
        store: &dyn UnitStore,
        object: &DataObject,
        target: &Path,
    ) -> StoreResult<()> {
        let raw = payload(object)?;
        let encoded = self.encode(&raw)?;
        store.write(target, &encoded)?;
        debug!(
            path = %target.display(),
            raw = raw.len(),
            stored = encoded.len(),
            "saved zstd buffer"
        );
        Ok(())
    }

    fn load_buffer(
        &self,
        store: &dyn UnitStore,
        object: &DataObject,
        source: &Path,
    ) -> StoreResult<()> {
        let data = store.read_required(source)?;
        object.set_buffer(Self::decode(source, &data)?);
        Ok(())
    }
}

/// Buffer handlers by protocol tag.
#[derive(Clone)]
pub struct BufferRegistry {
    handlers: BTreeMap<String, Arc<dyn BufferHandler>>,
}

impl BufferRegistry {
    /// A registry without any handler.
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// A registry with the built-in `raw` and `zstd` handlers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RawBuffers));
        registry.register(Arc::new(ZstdBuffers::default()));
        registry
    }

    /// Register a handler under its protocol tag, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn BufferHandler>) {
        self.handlers.insert(handler.protocol().to_string(), handler);
    }

    pub fn get(&self, protocol: &str) -> StoreResult<Arc<dyn BufferHandler>> {
        self.handlers
            .get(protocol)
            .cloned()
            .ok_or_else(|| StoreError::UnknownProtocol(protocol.to_string()))
    }

    /// Registered protocol tags, sorted.
    pub fn protocols(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for BufferRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryUnitStore;
    use ogx_types::TypeTag;

    fn image(bytes: &[u8]) -> ogx_types::ObjectRef {
        let obj = DataObject::with_id(TypeTag::new("Image").unwrap(), ObjectId::new("i1").unwrap());
        obj.set_buffer(bytes.to_vec());
        obj
    }

    #[test]
    fn default_location_is_next_to_unit() {
        let obj = image(b"x");
        let id = obj.id().unwrap();
        assert_eq!(
            RawBuffers.locate(Path::new("archive/img"), &obj, &id),
            PathBuf::from("archive/img/Image_i1.bin")
        );
        assert_eq!(
            ZstdBuffers::default().locate(Path::new("a"), &obj, &id),
            PathBuf::from("a/Image_i1.bin.zst")
        );
    }

    #[test]
    fn raw_buffer_moves_bytes() {
        let store = InMemoryUnitStore::new();
        let obj = image(b"pixels");
        let target = Path::new("Image_i1.bin");
        RawBuffers.save_buffer(&store, &obj, target).unwrap();
        assert_eq!(store.read_required(target).unwrap(), b"pixels");

        let fresh = DataObject::new(TypeTag::new("Image").unwrap());
        RawBuffers.load_buffer(&store, &fresh, target).unwrap();
        assert_eq!(fresh.buffer().as_deref(), Some(&b"pixels"[..]));
    }

    #[test]
    fn zstd_buffer_compresses_and_restores() {
        let store = InMemoryUnitStore::new();
        let payload = vec![7u8; 64 * 1024];
        let obj = image(&payload);
        let handler = ZstdBuffers::default();
        let target = Path::new("Image_i1.bin.zst");
        handler.save_buffer(&store, &obj, target).unwrap();

        let stored = store.read_required(target).unwrap();
        assert_eq!(&stored[..4], b"OGXB");
        assert!(stored.len() < payload.len());

        let fresh = DataObject::new(TypeTag::new("Image").unwrap());
        handler.load_buffer(&store, &fresh, target).unwrap();
        assert_eq!(fresh.buffer().unwrap(), payload);
    }

    #[test]
    fn zstd_detects_corruption() {
        let store = InMemoryUnitStore::new();
        let handler = ZstdBuffers::default();
        let target = Path::new("b.bin.zst");
        handler.save_buffer(&store, &image(b"abcdef"), target).unwrap();

        let mut data = store.read_required(target).unwrap();
        data[4] ^= 0xff;
        store.write(target, &data).unwrap();
        let fresh = DataObject::new(TypeTag::new("Image").unwrap());
        let err = handler.load_buffer(&store, &fresh, target).unwrap_err();
        assert!(matches!(err, StoreError::CorruptBuffer { reason, .. } if reason.contains("crc")));

        store.write(target, b"not a buffer").unwrap();
        assert!(matches!(
            handler.load_buffer(&store, &fresh, target),
            Err(StoreError::CorruptBuffer { .. })
        ));
    }

    #[test]
    fn missing_payload_is_an_error() {
        let store = InMemoryUnitStore::new();
        let obj = DataObject::with_id(TypeTag::new("Image").unwrap(), ObjectId::new("i9").unwrap());
        let err = RawBuffers.save_buffer(&store, &obj, Path::new("x.bin")).unwrap_err();
        assert!(matches!(err, StoreError::MissingBuffer(id) if id == "i9"));
    }

    #[test]
    fn registry_lookup() {
        let registry = BufferRegistry::with_builtin();
        assert_eq!(registry.protocols(), vec!["raw", "zstd"]);
        assert_eq!(registry.get("zstd").unwrap().extension(), "bin.zst");
        assert!(matches!(
            registry.get("png"),
            Err(StoreError::UnknownProtocol(p)) if p == "png"
        ));
    }
}
