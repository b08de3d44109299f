//! # Local Filesystem Store
//!
//! Objects live under `<root>/objects/<key>`; each has a JSON sidecar under
//! `<root>/meta/<key>.json` holding its content type and ACL.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::errors::{StoreError, StoreResult};
use super::presign::{PresignedUrl, UrlSigner};
use super::{ObjectAcl, ObjectHead, ObjectStore};

const STORAGE_CLASS: &str = "STANDARD";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    acl: ObjectAcl,
}

/// Filesystem-backed object store
#[derive(Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
    signer: UrlSigner,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`. Presigned URLs point at
    /// `<base_url>/blobs/<key>`.
    pub fn new(root: PathBuf, base_url: impl Into<String>, secret: &[u8]) -> Self {
        Self {
            root,
            base_url: base_url.into(),
            signer: UrlSigner::new(secret),
        }
    }

    fn check_key(key: &str) -> StoreResult<()> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
            || key.chars().any(char::is_control)
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join("objects").join(key)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root.join("meta").join(format!("{}.json", key))
    }

    async fn read_sidecar(&self, key: &str) -> StoreResult<Sidecar> {
        let raw = fs::read(self.sidecar_path(key))
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        serde_json::from_slice(&raw).map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn write_sidecar(&self, key: &str, sidecar: &Sidecar) -> StoreResult<()> {
        let raw = serde_json::to_vec(sidecar).map_err(|e| StoreError::Io(e.to_string()))?;
        let path = self.sidecar_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::from_io(key, e))
    }

    async fn discard(&self, key: &str) {
        let sidecar = self.sidecar_path(key);
        for path in [
            self.object_path(key),
            sidecar.with_extension("json.tmp"),
            sidecar,
        ] {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(object_key = key, path = %path.display(), error = %e, "failed to clean up partial object");
                }
            }
        }
    }

    /// Check the signature and expiry of a URL from
    /// [`ObjectStore::presign_get`] without reading the object
    pub fn verify_presigned(&self, key: &str, expires: i64, signature: &str) -> StoreResult<()> {
        Self::check_key(key)?;
        self.signer.verify(key, expires, signature, Utc::now())
    }

    /// Serve a request made with a URL from [`ObjectStore::presign_get`].
    /// The URL alone decides; callers that track revocation check it
    /// around this read.
    pub async fn get_presigned(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> StoreResult<(ObjectHead, Bytes)> {
        self.verify_presigned(key, expires, signature)?;
        let head = self.head(key).await?;
        let data = self.get(key).await?;
        Ok((head, data))
    }
}

async fn write_fully(file: &mut fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.sync_all().await
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        acl: ObjectAcl,
    ) -> StoreResult<()> {
        Self::check_key(key)?;
        let path = self.object_path(key);

        for dir in [self.root.join("objects"), self.root.join("meta")] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        // create_new makes the key claim atomic at the filesystem
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        let written = match write_fully(&mut file, &data).await {
            Ok(()) => {
                self.write_sidecar(
                    key,
                    &Sidecar {
                        content_type: content_type.to_string(),
                        acl,
                    },
                )
                .await
            }
            Err(e) => Err(StoreError::from_io(key, e)),
        };
        drop(file);

        // A half-written object must not keep its key claimed
        if let Err(e) = written {
            self.discard(key).await;
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        Self::check_key(key)?;
        fs::read(self.object_path(key))
            .await
            .map(Bytes::from)
            .map_err(|e| StoreError::from_io(key, e))
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectHead> {
        Self::check_key(key)?;
        let meta = fs::metadata(self.object_path(key))
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        let sidecar = self.read_sidecar(key).await?;
        let last_modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(|e| StoreError::from_io(key, e))?;

        Ok(ObjectHead {
            size: meta.len(),
            last_modified,
            storage_class: STORAGE_CLASS.to_string(),
            content_type: sidecar.content_type,
            acl: sidecar.acl,
        })
    }

    async fn set_acl(&self, key: &str, acl: ObjectAcl) -> StoreResult<()> {
        Self::check_key(key)?;
        let mut sidecar = self.read_sidecar(key).await?;
        sidecar.acl = acl;
        self.write_sidecar(key, &sidecar).await
    }

    async fn presign_get(&self, key: &str, ttl_seconds: u64) -> StoreResult<PresignedUrl> {
        Self::check_key(key)?;
        // Only existing objects get URLs
        fs::metadata(self.object_path(key))
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        Ok(self
            .signer
            .presign(&self.base_url, key, ttl_seconds, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> LocalObjectStore {
        LocalObjectStore::new(temp.path().to_path_buf(), "http://localhost:8080", b"secret")
    }

    #[tokio::test]
    async fn test_put_get_head() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store
            .put("a.txt", Bytes::from_static(b"hello"), "text/plain", ObjectAcl::Private)
            .await
            .unwrap();

        assert_eq!(store.get("a.txt").await.unwrap(), Bytes::from_static(b"hello"));

        let head = store.head("a.txt").await.unwrap();
        assert_eq!(head.size, 5);
        assert_eq!(head.content_type, "text/plain");
        assert_eq!(head.storage_class, "STANDARD");
        assert_eq!(head.acl, ObjectAcl::Private);
    }

    #[tokio::test]
    async fn test_put_is_create_only() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store
            .put("a.txt", Bytes::from_static(b"first"), "text/plain", ObjectAcl::Private)
            .await
            .unwrap();
        let second = store
            .put("a.txt", Bytes::from_static(b"second"), "text/plain", ObjectAcl::Private)
            .await;

        assert_eq!(second, Err(StoreError::AlreadyExists("a.txt".into())));
        assert_eq!(store.get("a.txt").await.unwrap(), Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn test_failed_sidecar_write_releases_key() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        // A directory where the sidecar temp file goes makes the write fail
        let blocker = temp.path().join("meta").join("a.txt.json.tmp");
        std::fs::create_dir_all(&blocker).unwrap();

        let result = store
            .put("a.txt", Bytes::from_static(b"hello"), "text/plain", ObjectAcl::Private)
            .await;
        assert!(result.is_err());
        assert!(!temp.path().join("objects").join("a.txt").exists());
        assert!(matches!(store.get("a.txt").await, Err(StoreError::NotFound(_))));

        std::fs::remove_dir(&blocker).unwrap();
        store
            .put("a.txt", Bytes::from_static(b"again"), "text/plain", ObjectAcl::Private)
            .await
            .unwrap();
        assert_eq!(store.get("a.txt").await.unwrap(), Bytes::from_static(b"again"));
    }

    #[tokio::test]
    async fn test_set_acl() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store
            .put("pub.png", Bytes::from_static(b"png"), "image/png", ObjectAcl::PublicRead)
            .await
            .unwrap();
        store.set_acl("pub.png", ObjectAcl::Private).await.unwrap();

        assert_eq!(store.head("pub.png").await.unwrap().acl, ObjectAcl::Private);
        assert!(matches!(
            store.set_acl("missing.png", ObjectAcl::Private).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        for key in ["../escape.txt", "a/b.txt", ".hidden", ""] {
            let result = store
                .put(key, Bytes::from_static(b"x"), "text/plain", ObjectAcl::Private)
                .await;
            assert!(matches!(result, Err(StoreError::InvalidKey(_))), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_presigned_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .put("doc.pdf", Bytes::from_static(b"%PDF"), "application/pdf", ObjectAcl::Private)
            .await
            .unwrap();

        let presigned = store.presign_get("doc.pdf", 30).await.unwrap();
        let signature = presigned.url.split("signature=").nth(1).unwrap().to_string();

        let (head, data) = store
            .get_presigned("doc.pdf", presigned.expires_at.timestamp(), &signature)
            .await
            .unwrap();
        assert_eq!(head.content_type, "application/pdf");
        assert_eq!(data, Bytes::from_static(b"%PDF"));

        assert!(store
            .get_presigned("doc.pdf", presigned.expires_at.timestamp(), "forged")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        assert_eq!(
            store.get("nope.txt").await,
            Err(StoreError::NotFound("nope.txt".into()))
        );
        assert!(matches!(store.presign_get("nope.txt", 10).await, Err(StoreError::NotFound(_))));
    }
}
