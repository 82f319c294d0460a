//! Directory traversal over an unpacked snapshot.
//!
//! The layout loader needs every regular file of an unpacked archive grouped
//! by the object directory that holds it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,
}

/// A regular file found during walking
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,

    /// Path relative to the walk root
    pub relative_path: PathBuf,

    pub size: u64,

    pub depth: usize,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Self> {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        Ok(Self {
            size: entry.metadata()?.len(),
            relative_path,
            path,
            depth: entry.depth(),
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Collect every regular file under `root`, sorted by path.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut walker = WalkDir::new(root).follow_links(options.follow_links).sort_by_file_name();
    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        files.push(FileInfo::from_entry(&entry, root)?);
    }

    Ok(files)
}

/// Group files by their parent directory, relative to the walk root.
pub fn group_by_directory(files: Vec<FileInfo>) -> BTreeMap<PathBuf, Vec<FileInfo>> {
    let mut groups: BTreeMap<PathBuf, Vec<FileInfo>> = BTreeMap::new();
    for file in files {
        let parent = file
            .relative_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        groups.entry(parent).or_default().push(file);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_skips_directories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let object_dir = temp_dir.path().join("apps_/v1/deployments/shop/web");
        fs::create_dir_all(&object_dir)?;
        fs::create_dir_all(temp_dir.path().join("empty"))?;
        fs::write(object_dir.join("web.json"), b"{}")?;
        fs::write(object_dir.join("metadata.json"), b"{}")?;

        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name(), Some("metadata.json"));
        assert_eq!(files[1].depth, 6);
        Ok(())
    }

    #[test]
    fn test_group_by_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for object in ["web", "api"] {
            let dir = temp_dir.path().join("apps_/v1/deployments/shop").join(object);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(format!("{object}.json")), b"{}")?;
            fs::write(dir.join("metadata.json"), b"{}")?;
        }

        let groups = group_by_directory(walk_directory(temp_dir.path(), &WalkOptions::default())?);
        assert_eq!(groups.len(), 2);
        let web = &groups[Path::new("apps_/v1/deployments/shop/web")];
        assert_eq!(web.len(), 2);
        Ok(())
    }
}
