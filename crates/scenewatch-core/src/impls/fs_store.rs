//! FsArtifactStore - ファイルシステム上の ArtifactStore 実装
//!
//! # レイアウト
//! ```text
//! {root}/{aoi_id}/{YYYY-MM-DD}_{recipe}_{artifact_id}.{ext}   画像
//! {root}/{aoi_id}/artifact.json                 メタデータ（commit point）
//! ```
//!
//! # put の手順
//! 1. 画像を一時ファイルに書いて rename（artifact ごとに別名なので現行の画像には触れない）
//! 2. artifact.json を一時ファイルに書いて rename（ここで新しい artifact が見える）
//! 3. 古い画像を削除
//!
//! 2 が失敗した場合は 1 の画像を消し、現行の artifact はそのまま残ります。
//!
//! 同じ AOI への読み書きは AOI ごとの RwLock で直列化します。

use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::domain::{AoiId, Artifact, ArtifactMeta, ImageFormat, StoreError};
use crate::ports::ArtifactStore;
use crate::ports::artifact_store::ensure_key;

const SIDECAR: &str = "artifact.json";

pub struct FsArtifactStore {
    root: PathBuf,
    locks: Mutex<HashMap<AoiId, Arc<RwLock<()>>>>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, aoi_id: &AoiId) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(aoi_id.clone()).or_default())
    }

    fn aoi_dir(&self, aoi_id: &AoiId) -> PathBuf {
        self.root.join(aoi_id.as_str())
    }

    /// Image path for a stored location, confined to the AOI directory.
    fn image_path(&self, aoi_id: &AoiId, location: &str) -> Option<PathBuf> {
        let file_name = Path::new(location).file_name()?;
        Some(self.aoi_dir(aoi_id).join(file_name))
    }

    /// Write the image under a name unique to this artifact. Nothing points
    /// at it until the sidecar is committed.
    async fn stage_image(
        &self,
        dir: &Path,
        meta: &ArtifactMeta,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let file_name = image_file_name(meta);
        write_atomic(&dir.join(&file_name), bytes).await?;
        Ok(file_name)
    }

    async fn read_meta(&self, aoi_id: &AoiId) -> Result<Option<ArtifactMeta>, StoreError> {
        let path = self.aoi_dir(aoi_id).join(SIDECAR);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: ArtifactMeta = serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
            aoi_id: aoi_id.to_string(),
            message: e.to_string(),
        })?;
        if &meta.aoi_id != aoi_id {
            return Err(StoreError::Corrupt {
                aoi_id: aoi_id.to_string(),
                message: format!("sidecar belongs to {}", meta.aoi_id),
            });
        }
        Ok(Some(meta))
    }
}

fn image_file_name(meta: &ArtifactMeta) -> String {
    let ext = ImageFormat::from_mime(&meta.content_type)
        .map(ImageFormat::extension)
        .unwrap_or("bin");
    format!(
        "{}_{}_{}.{}",
        meta.acquired_at.format("%Y-%m-%d"),
        meta.recipe,
        meta.id,
        ext
    )
}

async fn commit_sidecar(dir: &Path, meta: &ArtifactMeta) -> Result<(), StoreError> {
    let sidecar = serde_json::to_vec_pretty(meta).map_err(|e| StoreError::Corrupt {
        aoi_id: meta.aoi_id.to_string(),
        message: e.to_string(),
    })?;
    write_atomic(&dir.join(SIDECAR), &sidecar).await?;
    Ok(())
}

/// Write via a sibling temp file and rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp-{}", ulid::Ulid::new()));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get(&self, aoi_id: &AoiId) -> Result<Option<Artifact>, StoreError> {
        let lock = self.lock_for(aoi_id);
        let _guard = lock.read().await;

        let Some(meta) = self.read_meta(aoi_id).await? else {
            return Ok(None);
        };
        let corrupt = |message: String| StoreError::Corrupt {
            aoi_id: aoi_id.to_string(),
            message,
        };
        let location = meta
            .location
            .as_deref()
            .ok_or_else(|| corrupt("sidecar has no image location".to_string()))?;
        let path = self
            .image_path(aoi_id, location)
            .ok_or_else(|| corrupt(format!("bad image location {location:?}")))?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(corrupt(format!("image {} is missing", path.display())));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Artifact { meta, bytes }))
    }

    async fn head(&self, aoi_id: &AoiId) -> Result<Option<ArtifactMeta>, StoreError> {
        let lock = self.lock_for(aoi_id);
        let _guard = lock.read().await;
        self.read_meta(aoi_id).await
    }

    async fn put(&self, aoi_id: &AoiId, artifact: Artifact) -> Result<ArtifactMeta, StoreError> {
        ensure_key(aoi_id, &artifact)?;
        let lock = self.lock_for(aoi_id);
        let _guard = lock.write().await;

        let dir = self.aoi_dir(aoi_id);
        tokio::fs::create_dir_all(&dir).await?;
        let previous = self.read_meta(aoi_id).await.unwrap_or_else(|err| {
            tracing::warn!(aoi_id = %aoi_id, error = %err, "ignoring unreadable previous sidecar");
            None
        });

        let Artifact { mut meta, bytes } = artifact;
        let file_name = self.stage_image(&dir, &meta, &bytes).await?;
        let location = format!("{aoi_id}/{file_name}");
        meta.location = Some(location.clone());

        if let Err(err) = commit_sidecar(&dir, &meta).await {
            let staged = dir.join(&file_name);
            if let Err(e) = tokio::fs::remove_file(&staged).await {
                tracing::warn!(path = %staged.display(), error = %e, "cannot remove uncommitted image");
            }
            return Err(err);
        }

        if let Some(old) = previous.and_then(|p| p.location)
            && old != location
            && let Some(old_path) = self.image_path(aoi_id, &old)
        {
            match tokio::fs::remove_file(&old_path).await {
                Ok(()) => tracing::debug!(path = %old_path.display(), "superseded image removed"),
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %old_path.display(), error = %e, "cannot remove superseded image")
                }
            }
        }

        tracing::debug!(aoi_id = %aoi_id, location = %location, "artifact committed");
        Ok(meta)
    }

    async fn list(&self) -> Result<Vec<ArtifactMeta>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Ok(id) = AoiId::parse(entry.file_name().to_string_lossy().into_owned()) {
                ids.push(id);
            }
        }
        ids.sort();

        let mut metas = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(meta) = self.head(&id).await? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResolvedScene;
    use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
    use crate::testing::{png, t0};
    use chrono::{Duration, TimeZone, Utc};

    fn artifact(aoi: &str, scene: &str, day: u32) -> Artifact {
        artifact_at(aoi, scene, day, 9)
    }

    fn artifact_at(aoi: &str, scene: &str, day: u32, hour: u32) -> Artifact {
        let scene = ResolvedScene {
            id: crate::domain::SceneId::new(scene),
            acquired_at: Utc.with_ymd_and_hms(2026, 1, day, hour, 50, 0).unwrap(),
            cloud_cover: Some(7.5),
        };
        Artifact::new(
            UlidGenerator::new(SystemClock).generate_artifact_id(),
            AoiId::parse(aoi).unwrap(),
            &scene,
            "false_color",
            png(&format!("bytes of {}", scene.id)),
            t0(),
        )
    }

    fn id(raw: &str) -> AoiId {
        AoiId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn put_writes_image_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        let meta = store.put(&id("etna"), artifact("etna", "S1", 20)).await.unwrap();

        let expected = format!("etna/2026-01-20_false_color_{}.png", meta.id);
        assert_eq!(meta.location.as_deref(), Some(expected.as_str()));
        let image = std::fs::read(dir.path().join(&expected)).unwrap();
        assert_eq!(image, b"bytes of S1");
        assert!(dir.path().join("etna/artifact.json").exists());

        let loaded = store.get(&id("etna")).await.unwrap().unwrap();
        assert_eq!(loaded.meta, meta);
        assert_eq!(loaded.bytes.as_ref(), b"bytes of S1");
    }

    #[tokio::test]
    async fn replacement_removes_superseded_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        let first = store.put(&id("etna"), artifact("etna", "S1", 20)).await.unwrap();
        store.put(&id("etna"), artifact("etna", "S2", 22)).await.unwrap();

        let first_image = first.location.unwrap();
        assert!(!dir.path().join(first_image).exists());
        let head = store.head(&id("etna")).await.unwrap().unwrap();
        assert_eq!(head.scene_id.as_str(), "S2");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("etna"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
    }

    #[tokio::test]
    async fn same_day_replacement_keeps_both_images_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        let first = store.put(&id("etna"), artifact_at("etna", "S1", 20, 9)).await.unwrap();
        let second = store.put(&id("etna"), artifact_at("etna", "S2", 20, 10)).await.unwrap();

        assert_ne!(first.location, second.location);
        assert!(!dir.path().join(first.location.unwrap()).exists());
        let loaded = store.get(&id("etna")).await.unwrap().unwrap();
        assert_eq!(loaded.meta.scene_id.as_str(), "S2");
        assert_eq!(loaded.bytes.as_ref(), b"bytes of S2");
    }

    #[tokio::test]
    async fn uncommitted_image_leaves_the_current_artifact_intact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.put(&id("etna"), artifact_at("etna", "S1", 20, 9)).await.unwrap();

        // second image written on the same day, sidecar never committed
        let Artifact { meta, bytes } = artifact_at("etna", "S2", 20, 10);
        store
            .stage_image(&dir.path().join("etna"), &meta, &bytes)
            .await
            .unwrap();

        let loaded = store.get(&id("etna")).await.unwrap().unwrap();
        assert_eq!(loaded.meta.scene_id.as_str(), "S1");
        assert_eq!(loaded.bytes.as_ref(), b"bytes of S1");
    }

    #[tokio::test]
    async fn state_survives_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        FsArtifactStore::new(dir.path())
            .put(&id("fuji"), artifact("fuji", "S9", 21))
            .await
            .unwrap();

        let reopened = FsArtifactStore::new(dir.path());
        let scene = ResolvedScene {
            id: crate::domain::SceneId::new("S9"),
            acquired_at: t0() - Duration::days(2),
            cloud_cover: None,
        };
        assert!(reopened.is_fresh(&id("fuji"), &scene).await.unwrap());
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("not-yet"));

        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get(&id("etna")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_ordered_by_aoi() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.put(&id("vesuvius"), artifact("vesuvius", "S3", 19)).await.unwrap();
        store.put(&id("etna"), artifact("etna", "S1", 20)).await.unwrap();
        std::fs::write(dir.path().join("README"), "not an aoi").unwrap();

        let ids: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.aoi_id.to_string())
            .collect();
        assert_eq!(ids, vec!["etna", "vesuvius"]);
    }

    #[tokio::test]
    async fn garbage_sidecar_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etna")).unwrap();
        std::fs::write(dir.path().join("etna/artifact.json"), "{not json").unwrap();
        let store = FsArtifactStore::new(dir.path());

        assert!(matches!(
            store.head(&id("etna")).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_never_see_partial_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsArtifactStore::new(dir.path()));
        store.put(&id("etna"), artifact("etna", "S0", 1)).await.unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for day in 2..=20 {
                    store
                        .put(&id("etna"), artifact("etna", &format!("S{day}"), day))
                        .await
                        .unwrap();
                }
            })
        };
        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let a = store.get(&id("etna")).await.unwrap().unwrap();
                    assert_eq!(a.bytes.as_ref(), format!("bytes of {}", a.meta.scene_id).as_bytes());
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();
    }
}
