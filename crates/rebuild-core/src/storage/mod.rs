//! On-disk build history: directories, metadata and retention.

pub mod cleaner;
pub mod directory_manager;
pub mod fs;
pub mod repository;
pub mod retention;

pub use cleaner::BuildCleaner;
pub use directory_manager::BuildDirectoryManager;
pub use fs::{glob_match, FileSystem, LocalFileSystem};
pub use repository::{BuildRepository, FsBuildRepository};
pub use retention::RetentionPolicy;
