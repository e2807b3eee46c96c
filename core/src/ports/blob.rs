use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use bytes::Bytes;
use thiserror::Error;

use crate::types::BlobHandle;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(BlobHandle),

    #[error("blob store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// `get(handle) -> byte stream`, `put(byte stream) -> handle`.
/// Every `get` yields a fresh stream from the first byte.
pub trait BlobStore: Send + Sync {
    fn get(&self, handle: &BlobHandle) -> Result<Box<dyn Read + Send>, BlobError>;
    fn put(&self, reader: &mut dyn Read) -> Result<BlobHandle, BlobError>;

    /// Length in bytes. The default streams the blob once.
    fn size(&self, handle: &BlobHandle) -> Result<u64, BlobError> {
        let mut reader = self.get(handle)?;
        Ok(io::copy(&mut reader, &mut io::sink())?)
    }
}

/// Read a whole blob into memory (payload-sized blobs only).
pub fn read_blob(store: &dyn BlobStore, handle: &BlobHandle) -> Result<Vec<u8>, BlobError> {
    let mut reader = store.get(handle)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

// ============================================================
// In-memory store
// ============================================================
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobHandle, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, data: impl Into<Bytes>) -> Result<BlobHandle, BlobError> {
        let handle = BlobHandle::generate();
        self.blobs
            .write()
            .map_err(|_| BlobError::Unavailable("blob map poisoned".into()))?
            .insert(handle.clone(), data.into());
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, handle: &BlobHandle) -> Result<Box<dyn Read + Send>, BlobError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| BlobError::Unavailable("blob map poisoned".into()))?;
        let data = blobs.get(handle).cloned().ok_or_else(|| BlobError::NotFound(handle.clone()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn size(&self, handle: &BlobHandle) -> Result<u64, BlobError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| BlobError::Unavailable("blob map poisoned".into()))?;
        blobs.get(handle).map(|b| b.len() as u64).ok_or_else(|| BlobError::NotFound(handle.clone()))
    }

    fn put(&self, reader: &mut dyn Read) -> Result<BlobHandle, BlobError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.insert(buf)
    }
}

// ============================================================
// Filesystem store
// ============================================================
/// One file per blob under `root`, named by handle. Writes land in a
/// `.part` file first and are renamed once complete.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, handle: &BlobHandle) -> PathBuf {
        self.root.join(handle.as_str())
    }

    /// Handles are generated by `put`; reject anything that could escape the root.
    fn stored_path(&self, handle: &BlobHandle) -> Result<PathBuf, BlobError> {
        if handle.as_str().contains(['/', '\\']) || handle.as_str().starts_with('.') {
            return Err(BlobError::NotFound(handle.clone()));
        }
        Ok(self.path_of(handle))
    }

    /// Copy an existing file into the store.
    pub fn ingest(&self, path: &Path) -> Result<BlobHandle, BlobError> {
        let mut file = File::open(path)?;
        self.put(&mut file)
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, handle: &BlobHandle) -> Result<Box<dyn Read + Send>, BlobError> {
        match File::open(self.stored_path(handle)?) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(handle.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn size(&self, handle: &BlobHandle) -> Result<u64, BlobError> {
        match fs::metadata(self.stored_path(handle)?) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(handle.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, reader: &mut dyn Read) -> Result<BlobHandle, BlobError> {
        let handle = BlobHandle::generate();
        let final_path = self.path_of(&handle);
        let part_path = final_path.with_extension("part");

        let mut file = File::create(&part_path)?;
        let copied = io::copy(reader, &mut file).and_then(|n| file.flush().map(|_| n));
        match copied {
            Ok(_) => {
                fs::rename(&part_path, &final_path)?;
                Ok(handle)
            }
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                Err(e.into())
            }
        }
    }
}
