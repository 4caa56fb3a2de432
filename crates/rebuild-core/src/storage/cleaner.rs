use std::sync::Arc;

use tracing::warn;

use super::repository::BuildRepository;
use super::retention::RetentionPolicy;
use crate::domain::{BuildId, Result};
use crate::obs::emit_retention_pruned;

/// Applies a [`RetentionPolicy`] to the stored build history.
#[derive(Clone)]
pub struct BuildCleaner {
    repository: Arc<dyn BuildRepository>,
    policy: RetentionPolicy,
}

impl BuildCleaner {
    pub fn new(repository: Arc<dyn BuildRepository>, policy: RetentionPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Delete builds beyond the retention limit.
    ///
    /// `keep_override` replaces the configured limit for this call. Each
    /// deletion is independent; failures are logged and skipped. Returns the
    /// ids actually deleted.
    pub async fn cleanup(&self, keep_override: Option<usize>) -> Result<Vec<BuildId>> {
        let policy = match keep_override {
            Some(n) => RetentionPolicy::new(Some(n)),
            None => self.policy,
        };
        if policy.keep_last_n.is_none() {
            return Ok(Vec::new());
        }

        let builds = self.repository.find_recent(None).await?;
        let selected = policy.select_for_deletion(builds);
        let mut deleted = Vec::with_capacity(selected.len());

        for build in &selected {
            match self.repository.delete(&build.build_id).await {
                Ok(()) => deleted.push(build.build_id.clone()),
                Err(e) => warn!(build_id = %build.build_id, error = %e, "failed to delete old build"),
            }
        }

        emit_retention_pruned(selected.len(), deleted.len());
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{sample_result, MemoryBuildRepository};
    use chrono::{Duration, Local};

    fn history(n: i64) -> Vec<crate::domain::RebuildResult> {
        let now = Local::now();
        (0..n)
            .map(|i| sample_result(now - Duration::hours(i), true))
            .collect()
    }

    #[tokio::test]
    async fn test_cleanup_deletes_oldest() {
        let builds = history(5);
        let newest: Vec<BuildId> = builds[..2].iter().map(|b| b.build_id.clone()).collect();
        let repo = Arc::new(MemoryBuildRepository::with_results(builds));
        let cleaner = BuildCleaner::new(repo.clone(), RetentionPolicy::new(Some(2)));

        let deleted = cleaner.cleanup(None).await.unwrap();
        assert_eq!(deleted.len(), 3);
        let remaining: Vec<BuildId> = repo
            .find_recent(None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.build_id)
            .collect();
        assert_eq!(remaining, newest);
    }

    #[tokio::test]
    async fn test_cleanup_continues_past_failures() {
        let builds = history(4);
        let stuck = builds[3].build_id.clone();
        let repo = Arc::new(MemoryBuildRepository::with_results(builds).failing_delete(stuck));
        let cleaner = BuildCleaner::new(repo.clone(), RetentionPolicy::new(Some(1)));

        let deleted = cleaner.cleanup(None).await.unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_override_and_no_limit() {
        let repo = Arc::new(MemoryBuildRepository::with_results(history(3)));
        let cleaner = BuildCleaner::new(repo.clone(), RetentionPolicy::new(None));

        assert!(cleaner.cleanup(None).await.unwrap().is_empty());
        assert_eq!(cleaner.cleanup(Some(1)).await.unwrap().len(), 2);
        assert_eq!(repo.len(), 1);
    }
}
