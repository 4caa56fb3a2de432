//! Minimal async filesystem interface used by the storage layer.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;

use crate::domain::Result;

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create `path` and any missing parents.
    async fn create_directory(&self, path: &Path) -> Result<()>;

    /// Remove `path` and everything under it.
    async fn delete_directory(&self, path: &Path) -> Result<()>;

    async fn read_text(&self, path: &Path) -> Result<String>;

    async fn write_text(&self, path: &Path, content: &str) -> Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    async fn is_dir(&self, path: &Path) -> bool;

    async fn modified_time(&self, path: &Path) -> Result<SystemTime>;

    /// Direct child directories of `path` whose name matches `pattern`,
    /// where `*` matches any run of characters. A missing `path` yields an
    /// empty list.
    async fn list_directories(&self, path: &Path, pattern: &str) -> Result<Vec<PathBuf>>;
}

/// [`FileSystem`] over `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn create_directory(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn delete_directory(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_dir_all(path).await?;
        Ok(())
    }

    async fn read_text(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn modified_time(&self, path: &Path) -> Result<SystemTime> {
        Ok(tokio::fs::metadata(path).await?.modified()?)
    }

    async fn list_directories(&self, path: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| glob_match(pattern, n)) {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// Match `name` against a pattern where `*` matches any (possibly empty)
/// run of characters.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // no `*`: exact match
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("rebuild-*", "rebuild-20250101-120000"));
        assert!(glob_match("rebuild-*", "rebuild-"));
        assert!(!glob_match("rebuild-*", "other-20250101"));
        assert!(glob_match("*.json", "metadata.json"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_list_directories_filters_files_and_names() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(tmp.path().join("rebuild-20250101-120000")).unwrap();
        std::fs::create_dir(tmp.path().join("rebuild-20250102-120000")).unwrap();
        std::fs::create_dir(tmp.path().join("scratch")).unwrap();
        std::fs::write(tmp.path().join("rebuild-notes"), "file").unwrap();

        let fs = LocalFileSystem::new();
        let dirs = fs.list_directories(tmp.path(), "rebuild-*").await.unwrap();
        assert_eq!(dirs.len(), 2);

        let missing = fs
            .list_directories(&tmp.path().join("nope"), "*")
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_text_round_trip_and_delete() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let fs = LocalFileSystem::new();
        let dir = tmp.path().join("a/b");
        fs.create_directory(&dir).await.unwrap();
        assert!(fs.is_dir(&dir).await);

        let file = dir.join("x.txt");
        fs.write_text(&file, "hello").await.unwrap();
        assert_eq!(fs.read_text(&file).await.unwrap(), "hello");
        assert!(fs.modified_time(&file).await.is_ok());

        fs.delete_directory(&tmp.path().join("a")).await.unwrap();
        assert!(!fs.exists(&file).await);
    }
}
