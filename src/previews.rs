//! Durable cache for attachment previews captured mid-form.
//!
//! Previews are large encoded strings, so they live as individual files
//! rather than inside the pending-operation store. Each storage key (one
//! in-progress form) gets numbered slot files plus a JSON manifest listing
//! them. `clear` deletes what the manifest lists and only falls back to
//! probing a bounded range of slots when the manifest is gone.
//!
//! Every operation is best-effort: a preview that cannot be written or read
//! is logged and left out, and the rest of the batch carries on. When no
//! cache directory is configured the cache reports itself unavailable and
//! `save`/`load` return nothing, so callers keep previews inline instead.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::DEFAULT_PREVIEW_SCAN_LIMIT;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Not a base64 data URL")]
    InvalidDataUrl,

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPreviewRef {
    pub storage_key: String,
    pub index: usize,
    pub handle: PathBuf,
}

pub struct PhotoPreviewCache {
    root: Option<PathBuf>,
    scan_limit: usize,
}

impl PhotoPreviewCache {
    pub fn new(root: Option<PathBuf>, scan_limit: usize) -> Self {
        Self { root, scan_limit }
    }

    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_PREVIEW_SCAN_LIMIT)
    }

    pub fn is_available(&self) -> bool {
        self.root.is_some()
    }

    /// Persist the previews for `storage_key`, replacing anything saved under
    /// it before. Returns one ref per stored preview, in input order.
    pub async fn save(&self, storage_key: &str, previews: &[String]) -> Vec<PhotoPreviewRef> {
        let Some(root) = &self.root else {
            return Vec::new();
        };

        if let Err(e) = tokio::fs::create_dir_all(root).await {
            tracing::error!("Preview cache directory unavailable: {}", e);
            return Vec::new();
        }

        self.clear(storage_key).await;

        let mut refs = Vec::with_capacity(previews.len());
        for (index, preview) in previews.iter().enumerate() {
            let handle = slot_path(root, storage_key, index);
            match tokio::fs::write(&handle, preview).await {
                Ok(()) => refs.push(PhotoPreviewRef {
                    storage_key: storage_key.to_string(),
                    index,
                    handle,
                }),
                Err(e) => {
                    tracing::warn!("Failed to cache preview {} for {}: {}", index, storage_key, e);
                }
            }
        }

        if let Err(e) = write_manifest(root, storage_key, &refs).await {
            tracing::warn!("Failed to write preview manifest for {}: {}", storage_key, e);
        }

        tracing::debug!("Cached {} previews for {}", refs.len(), storage_key);
        refs
    }

    /// Read previews back. Unreadable entries are skipped, so the result may be
    /// shorter than `refs`.
    pub async fn load(&self, refs: &[PhotoPreviewRef]) -> Vec<String> {
        if !self.is_available() {
            return Vec::new();
        }

        let mut previews = Vec::with_capacity(refs.len());
        for preview_ref in refs {
            match tokio::fs::read_to_string(&preview_ref.handle).await {
                Ok(preview) => previews.push(preview),
                Err(e) => {
                    tracing::debug!(
                        "Skipping preview {} for {}: {}",
                        preview_ref.index,
                        preview_ref.storage_key,
                        e
                    );
                }
            }
        }
        previews
    }

    /// Delete every preview saved under `storage_key`. Misses are ignored.
    pub async fn clear(&self, storage_key: &str) {
        let Some(root) = &self.root else {
            return;
        };

        let manifest = manifest_path(root, storage_key);
        match read_manifest(&manifest).await {
            Ok(refs) => {
                for preview_ref in &refs {
                    remove_quietly(&preview_ref.handle).await;
                }
                remove_quietly(&manifest).await;
            }
            Err(PreviewError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                // No manifest: probe the slot range instead.
                for index in 0..self.scan_limit {
                    remove_quietly(&slot_path(root, storage_key, index)).await;
                }
            }
            Err(e) => {
                tracing::warn!("Unreadable preview manifest for {}: {}", storage_key, e);
                for index in 0..self.scan_limit {
                    remove_quietly(&slot_path(root, storage_key, index)).await;
                }
                remove_quietly(&manifest).await;
            }
        }
    }

    /// Delete specific previews, e.g. after their upload succeeded.
    pub async fn delete(&self, refs: &[PhotoPreviewRef]) {
        if !self.is_available() {
            return;
        }
        for preview_ref in refs {
            remove_quietly(&preview_ref.handle).await;
        }
    }
}

/// Encode raw image bytes as a `data:` URL preview.
pub fn encode_preview(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Split a `data:` URL preview back into its mime type and bytes.
pub fn decode_preview(preview: &str) -> Result<(String, Vec<u8>), PreviewError> {
    let rest = preview
        .strip_prefix("data:")
        .ok_or(PreviewError::InvalidDataUrl)?;
    let (mime, data) = rest
        .split_once(";base64,")
        .ok_or(PreviewError::InvalidDataUrl)?;
    Ok((mime.to_string(), BASE64.decode(data)?))
}

fn key_digest(storage_key: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(storage_key.as_bytes()));
    digest[..16].to_string()
}

fn slot_path(root: &Path, storage_key: &str, index: usize) -> PathBuf {
    root.join(format!("{}_{}.preview", key_digest(storage_key), index))
}

fn manifest_path(root: &Path, storage_key: &str) -> PathBuf {
    root.join(format!("{}.manifest.json", key_digest(storage_key)))
}

async fn read_manifest(path: &Path) -> Result<Vec<PhotoPreviewRef>, PreviewError> {
    let json = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json)?)
}

async fn write_manifest(
    root: &Path,
    storage_key: &str,
    refs: &[PhotoPreviewRef],
) -> Result<(), PreviewError> {
    let json = serde_json::to_string(refs)?;
    tokio::fs::write(manifest_path(root, storage_key), json).await?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::debug!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn previews(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| encode_preview(format!("jpeg-bytes-{}", i).as_bytes(), "image/jpeg"))
            .collect()
    }

    fn cache(dir: &tempfile::TempDir) -> PhotoPreviewCache {
        PhotoPreviewCache::new(Some(dir.path().join("previews")), 20)
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let originals = previews(3);

        let refs = cache.save("checkout-form", &originals).await;
        assert_eq!(refs.len(), 3);
        assert_eq!(
            refs.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        assert_eq!(cache.load(&refs).await, originals);
    }

    #[tokio::test]
    async fn test_load_after_clear_omits_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let refs = cache.save("checkin-form", &previews(2)).await;

        cache.clear("checkin-form").await;

        assert!(cache.load(&refs).await.is_empty());
        assert!(!refs[0].handle.exists());
    }

    #[tokio::test]
    async fn test_load_skips_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let originals = previews(3);
        let refs = cache.save("form", &originals).await;

        cache.delete(&refs[1..2]).await;

        let loaded = cache.load(&refs).await;
        assert_eq!(loaded, vec![originals[0].clone(), originals[2].clone()]);
    }

    #[tokio::test]
    async fn test_clear_missing_key_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        cache.clear("never-saved").await;
        cache.clear("never-saved").await;
    }

    #[tokio::test]
    async fn test_clear_without_manifest_scans_bounded_slots() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("previews");
        let cache = PhotoPreviewCache::new(Some(root.clone()), 20);
        let refs = cache.save("big-form", &previews(25)).await;
        assert_eq!(refs.len(), 25);

        tokio::fs::remove_file(manifest_path(&root, "big-form")).await.unwrap();
        cache.clear("big-form").await;

        // Slots past the scan limit are orphaned
        assert!(!refs[19].handle.exists());
        assert!(refs[20].handle.exists());
        assert_eq!(cache.load(&refs).await.len(), 5);
    }

    #[tokio::test]
    async fn test_resave_replaces_previous_previews() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let first = cache.save("form", &previews(3)).await;
        let second = cache.save("form", &previews(1)).await;

        assert_eq!(second.len(), 1);
        assert!(!first[2].handle.exists());
        assert_eq!(cache.load(&first).await.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let a = cache.save("form-a", &previews(1)).await;
        let b = cache.save("form-b", &previews(1)).await;

        cache.clear("form-a").await;

        assert!(cache.load(&a).await.is_empty());
        assert_eq!(cache.load(&b).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_cache_returns_nothing() {
        let cache = PhotoPreviewCache::disabled();
        assert!(!cache.is_available());

        let refs = cache.save("form", &previews(2)).await;
        assert!(refs.is_empty());

        let stray = PhotoPreviewRef {
            storage_key: "form".into(),
            index: 0,
            handle: PathBuf::from("/nonexistent/preview"),
        };
        assert!(cache.load(&[stray]).await.is_empty());
        cache.clear("form").await;
    }

    #[test]
    fn test_data_url_encoding() {
        let encoded = encode_preview(b"\xff\xd8\xff", "image/jpeg");
        assert_eq!(encoded, "data:image/jpeg;base64,/9j/");

        let (mime, bytes) = decode_preview(&encoded).unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(bytes, b"\xff\xd8\xff");

        assert!(matches!(
            decode_preview("not a data url"),
            Err(PreviewError::InvalidDataUrl)
        ));
    }
}
