use crate::domain::RebuildResult;

/// Count-based retention over the build history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many builds (newest first). `None` keeps everything.
    pub keep_last_n: Option<usize>,
}

impl RetentionPolicy {
    pub fn new(keep_last_n: Option<usize>) -> Self {
        Self { keep_last_n }
    }

    /// Builds to delete: everything after the newest `keep_last_n`, ordered
    /// newest to oldest.
    pub fn select_for_deletion(&self, mut builds: Vec<RebuildResult>) -> Vec<RebuildResult> {
        let Some(keep) = self.keep_last_n else {
            return Vec::new();
        };
        if builds.len() <= keep {
            return Vec::new();
        }
        builds.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        builds.split_off(keep)
    }
}
