//! Build history persistence: one `metadata.json` per build directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::fs::FileSystem;
use crate::domain::{
    BuildId, RebuildError, RebuildResult, Result, BUILD_DIR_PREFIX, METADATA_FILE_NAME,
};

/// Persisted build results.
///
/// Guarantees:
/// - `find_recent` returns newest builds first.
/// - `delete` removes the whole build directory, or fails with
///   `RebuildError::BuildNotFound`.
#[async_trait]
pub trait BuildRepository: Send + Sync {
    async fn save(&self, result: &RebuildResult) -> Result<()>;

    async fn find_by_id(&self, build_id: &BuildId) -> Result<Option<RebuildResult>>;

    /// At most `limit` results (all when `None`), newest first.
    async fn find_recent(&self, limit: Option<usize>) -> Result<Vec<RebuildResult>>;

    async fn delete(&self, build_id: &BuildId) -> Result<()>;
}

/// [`BuildRepository`] over build directories on a [`FileSystem`].
///
/// Builds are saved next to their artifacts; lookups search the base
/// directory first, then any fallback roots.
#[derive(Clone)]
pub struct FsBuildRepository {
    roots: Vec<PathBuf>,
    fs: Arc<dyn FileSystem>,
}

impl FsBuildRepository {
    pub fn new(base_dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            roots: vec![base_dir.into()],
            fs,
        }
    }

    /// Also search `root`, where builds go when the base directory is
    /// unusable.
    pub fn with_fallback_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// First root holding a directory for `build_id`.
    async fn locate(&self, build_id: &BuildId) -> Option<PathBuf> {
        for root in &self.roots {
            let dir = root.join(build_id.dir_name());
            if self.fs.is_dir(&dir).await {
                return Some(dir);
            }
        }
        None
    }

    async fn load(&self, metadata_file: &Path) -> Result<RebuildResult> {
        let text = self.fs.read_text(metadata_file).await?;
        serde_json::from_str(&text).map_err(|e| RebuildError::CorruptedMetadata {
            path: metadata_file.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl BuildRepository for FsBuildRepository {
    async fn save(&self, result: &RebuildResult) -> Result<()> {
        let path = result.output_dir.join(METADATA_FILE_NAME);
        let json = serde_json::to_string_pretty(result)?;
        self.fs.write_text(&path, &json).await?;
        debug!(path = %path.display(), "saved build metadata");
        Ok(())
    }

    async fn find_by_id(&self, build_id: &BuildId) -> Result<Option<RebuildResult>> {
        for root in &self.roots {
            let path = root.join(build_id.dir_name()).join(METADATA_FILE_NAME);
            if self.fs.exists(&path).await {
                return self.load(&path).await.map(Some);
            }
        }
        Ok(None)
    }

    async fn find_recent(&self, limit: Option<usize>) -> Result<Vec<RebuildResult>> {
        let pattern = format!("{}*", BUILD_DIR_PREFIX);
        let mut dirs = self.fs.list_directories(&self.roots[0], &pattern).await?;
        for root in &self.roots[1..] {
            match self.fs.list_directories(root, &pattern).await {
                Ok(found) => dirs.extend(found),
                Err(e) => warn!(path = %root.display(), error = %e, "skipping unreadable fallback root"),
            }
        }

        let mut dated: Vec<(SystemTime, PathBuf)> = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let mtime = self
                .fs
                .modified_time(&dir)
                .await
                .unwrap_or(SystemTime::UNIX_EPOCH);
            dated.push((mtime, dir));
        }
        dated.sort_by(|a, b| b.0.cmp(&a.0));

        let limit = limit.unwrap_or(usize::MAX);
        let mut results = Vec::new();
        for (_, dir) in dated {
            if results.len() >= limit {
                break;
            }
            let metadata_file = dir.join(METADATA_FILE_NAME);
            if !self.fs.exists(&metadata_file).await {
                continue;
            }
            match self.load(&metadata_file).await {
                Ok(result) => results.push(result),
                Err(e) => warn!(path = %metadata_file.display(), error = %e, "skipping unreadable build metadata"),
            }
        }
        Ok(results)
    }

    async fn delete(&self, build_id: &BuildId) -> Result<()> {
        let Some(dir) = self.locate(build_id).await else {
            return Err(RebuildError::BuildNotFound(build_id.dir_name()));
        };
        self.fs.delete_directory(&dir).await?;
        debug!(build_id = %build_id, "deleted build directory");
        Ok(())
    }
}
