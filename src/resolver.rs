//! Asset resolution.
//!
//! A resolver turns a remote code/asset location into a locally
//! dereferenceable handle, optionally reporting download progress. The host
//! only ever calls it during a load; retry and caching policy belong to the
//! resolver, not to this layer.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::ResolveError;
use crate::protocol::DownloadProgress;

/// The role an asset plays, carried as an expected content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// The engine's primary code.
    CoreScript,
    /// The engine's binary payload.
    BinaryPayload,
    /// The engine's secondary-worker code.
    WorkerScript,
}

impl AssetKind {
    /// The content type requested from the resolver for this asset.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            AssetKind::CoreScript | AssetKind::WorkerScript => "text/javascript",
            AssetKind::BinaryPayload => "application/wasm",
        }
    }
}

/// Resolves a location into a locally dereferenceable handle.
pub trait AssetResolver: Send {
    /// Resolves `url` into a local handle, reporting progress through
    /// `progress` as data arrives. The final report must have `done` set.
    fn resolve(
        &self,
        url: &str,
        asset_kind: AssetKind,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<String, ResolveError>;
}

/// Read chunk size for [`FileResolver`] progress reporting.
const FILE_CHUNK_BYTES: usize = 64 * 1024;

/// A resolver backed by the local filesystem.
///
/// Reads `file://` locations (or plain paths) into in-memory blobs and hands
/// back `blob:` handles. Blob contents stay available through
/// [`FileResolver::blob`] for engine modules that dereference them.
#[derive(Debug, Default)]
pub struct FileResolver {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_handle: AtomicU64,
}

impl FileResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the blob behind `handle`, if it exists.
    #[must_use]
    pub fn blob(&self, handle: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(handle).cloned())
    }

    fn store(&self, bytes: Vec<u8>) -> Result<String, ResolveError> {
        let handle = format!("blob:{}", self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut blobs = self.blobs.lock().map_err(|_| ResolveError::Fetch {
            url: handle.clone(),
            message: "blob registry lock poisoned".to_string(),
        })?;
        blobs.insert(handle.clone(), bytes);
        Ok(handle)
    }
}

impl AssetResolver for FileResolver {
    fn resolve(
        &self,
        url: &str,
        _asset_kind: AssetKind,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<String, ResolveError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        if path.contains("://") {
            return Err(ResolveError::Unsupported {
                url: url.to_string(),
            });
        }

        let fetch_err = |message: String| ResolveError::Fetch {
            url: url.to_string(),
            message,
        };

        let mut file = File::open(path).map_err(|e| fetch_err(e.to_string()))?;
        let total = file.metadata().ok().map(|m| m.len());

        let mut bytes = Vec::new();
        let mut chunk = vec![0_u8; FILE_CHUNK_BYTES];
        loop {
            let n = file.read(&mut chunk).map_err(|e| fetch_err(e.to_string()))?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
            progress(DownloadProgress {
                url: url.to_string(),
                received: bytes.len() as u64,
                total,
                done: false,
            });
        }
        progress(DownloadProgress {
            url: url.to_string(),
            received: bytes.len() as u64,
            total,
            done: true,
        });

        self.store(bytes)
    }
}
