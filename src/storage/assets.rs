//! Storage of imported featured images

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::Result;

/// An asset as kept by an [`AssetStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub asset_ref: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Opaque storage for downloaded assets
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `bytes` and return a reference to them
    ///
    /// `source_url` only informs the reference name.
    async fn put(&self, source_url: &str, content_type: &str, bytes: Bytes) -> Result<String>;

    /// Fetch a stored asset
    async fn get(&self, asset_ref: &str) -> Result<Option<StoredAsset>>;
}

/// Content-addressed reference for an asset
///
/// The same bytes always map to the same reference, so re-importing an
/// image does not duplicate it.
pub fn asset_ref_for(source_url: &str, content_type: &str, bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    format!("{}.{}", &digest[..16], extension_for(source_url, content_type))
}

fn extension_for(source_url: &str, content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => return "jpg",
        "image/png" => return "png",
        "image/gif" => return "gif",
        "image/webp" => return "webp",
        "image/bmp" => return "bmp",
        "image/svg+xml" => return "svg",
        _ => {}
    }

    let path = crate::utils::url_path(source_url).to_lowercase();
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg" | "jpeg") => "jpg",
        Some("png") => "png",
        Some("gif") => "gif",
        Some("webp") => "webp",
        Some("bmp") => "bmp",
        _ => "img",
    }
}

// ============================================================================
// Filesystem Implementation
// ============================================================================

/// Assets as files under one directory
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    /// Create a store, creating `root` if needed
    pub async fn new(root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_type_of(asset_ref: &str) -> &'static str {
        match asset_ref.rsplit_once('.').map(|(_, ext)| ext) {
            Some("jpg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            Some("svg") => "image/svg+xml",
            _ => "application/octet-stream",
        }
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn put(&self, source_url: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        let asset_ref = asset_ref_for(source_url, content_type, &bytes);
        let path = self.root.join(&asset_ref);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(asset_ref = %asset_ref, "Asset already stored");
            return Ok(asset_ref);
        }

        // Write to temp file first, then rename
        let temp_path = self.root.join(format!("{asset_ref}.tmp"));
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::debug!(asset_ref = %asset_ref, bytes = bytes.len(), "Asset stored");
        Ok(asset_ref)
    }

    async fn get(&self, asset_ref: &str) -> Result<Option<StoredAsset>> {
        // References are flat file names
        if asset_ref.contains(['/', '\\']) || asset_ref.starts_with('.') {
            return Ok(None);
        }
        let path = self.root.join(asset_ref);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok(Some(StoredAsset {
            asset_ref: asset_ref.to_string(),
            content_type: Self::content_type_of(asset_ref).to_string(),
            bytes: Bytes::from(bytes),
        }))
    }
}

// ============================================================================
// Memory Implementation
// ============================================================================

/// In-memory [`AssetStore`] for tests
#[derive(Default)]
pub struct MemoryAssetStore {
    assets: RwLock<HashMap<String, StoredAsset>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, source_url: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        let asset_ref = asset_ref_for(source_url, content_type, &bytes);
        self.assets.write().await.insert(
            asset_ref.clone(),
            StoredAsset {
                asset_ref: asset_ref.clone(),
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(asset_ref)
    }

    async fn get(&self, asset_ref: &str) -> Result<Option<StoredAsset>> {
        Ok(self.assets.read().await.get(asset_ref).cloned())
    }
}
