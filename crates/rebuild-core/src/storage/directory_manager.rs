use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::fs::FileSystem;
use crate::domain::{BuildId, OutputDirectory, RebuildError, Result, BUILD_DIR_PREFIX};

/// Creates and locates per-build directories under a base directory.
#[derive(Clone)]
pub struct BuildDirectoryManager {
    base_dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl BuildDirectoryManager {
    /// `base_dir` is resolved against the current directory when relative.
    pub fn new(base_dir: impl AsRef<Path>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        Ok(Self {
            base_dir: absolutize(base_dir.as_ref())?,
            fs,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Bump `id`'s sequence until it names a directory that does not exist.
    pub async fn allocate_build_id(&self, id: BuildId) -> BuildId {
        let mut candidate = id;
        while self
            .fs
            .exists(&self.base_dir.join(candidate.dir_name()))
            .await
        {
            candidate = candidate.with_sequence(candidate.sequence() + 1);
        }
        candidate
    }

    /// Canonical (not yet created) directory for `build_id`.
    pub fn get_build_directory(&self, build_id: &BuildId) -> OutputDirectory {
        OutputDirectory::from_absolute(self.base_dir.join(build_id.dir_name()), build_id.clone())
    }

    /// Create the base directory if needed, then the build directory.
    pub async fn create_for_build(&self, build_id: &BuildId) -> Result<OutputDirectory> {
        let output = self.get_build_directory(build_id);
        for path in [self.base_dir.as_path(), output.path()] {
            self.fs
                .create_directory(path)
                .await
                .map_err(|e| RebuildError::DirectoryCreationFailed {
                    path: path.to_path_buf(),
                    source: Box::new(e),
                })?;
        }
        debug!(path = %output.path().display(), "created build directory");
        Ok(output)
    }

    /// Every `rebuild-*` directory under the base directory.
    pub async fn list_build_directories(&self) -> Result<Vec<PathBuf>> {
        self.fs
            .list_directories(&self.base_dir, &format!("{}*", BUILD_DIR_PREFIX))
            .await
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fs::LocalFileSystem;

    fn manager(base: &Path) -> BuildDirectoryManager {
        BuildDirectoryManager::new(base, Arc::new(LocalFileSystem::new())).unwrap()
    }

    #[tokio::test]
    async fn test_create_for_build_creates_parent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let base = tmp.path().join("nested/logs");
        let id = BuildId::generate();

        let out = manager(&base).create_for_build(&id).await.unwrap();
        assert!(out.path().is_dir());
        assert_eq!(out.path(), base.join(id.dir_name()));
        assert_eq!(out.build_id(), &id);
    }

    #[tokio::test]
    async fn test_allocate_build_id_skips_existing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mgr = manager(tmp.path());
        let id = BuildId::generate();
        mgr.create_for_build(&id).await.unwrap();
        mgr.create_for_build(&id.with_sequence(1)).await.unwrap();

        let next = mgr.allocate_build_id(id.clone()).await;
        assert_eq!(next.sequence(), 2);
        assert_eq!(next.timestamp(), id.timestamp());
    }

    #[tokio::test]
    async fn test_create_failure_is_wrapped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = manager(&blocker)
            .create_for_build(&BuildId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, RebuildError::DirectoryCreationFailed { .. }));
    }

    #[tokio::test]
    async fn test_list_build_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mgr = manager(tmp.path());
        let id = BuildId::generate();
        mgr.create_for_build(&id).await.unwrap();
        std::fs::create_dir(tmp.path().join("unrelated")).unwrap();

        let dirs = mgr.list_build_directories().await.unwrap();
        assert_eq!(dirs, vec![tmp.path().join(id.dir_name())]);
    }

    #[test]
    fn test_relative_base_is_absolutized() {
        let mgr = manager(Path::new("rebuild-logs"));
        assert!(mgr.base_dir().is_absolute());
    }
}
