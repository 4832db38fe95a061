use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One published article as remembered locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub title: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// JSON file listing previously published articles.
#[derive(Debug, Clone)]
pub struct ArticleIndex {
    path: PathBuf,
}

impl ArticleIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries on disk; a missing or unreadable file reads as empty.
    pub fn load(&self) -> Vec<IndexEntry> {
        self.try_load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "cannot read article index");
            Vec::new()
        })
    }

    /// Entries on disk. A missing file is empty; an unreadable or invalid
    /// one is an error.
    pub fn try_load(&self) -> io::Result<Vec<IndexEntry>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Add an entry unless one with the same URL exists. Returns whether the
    /// file changed. An existing file that does not parse is left untouched.
    pub fn append(&self, entry: IndexEntry) -> io::Result<bool> {
        let mut entries = self.try_load()?;
        if entry.url.is_some() && entries.iter().any(|e| e.url == entry.url) {
            return Ok(false);
        }
        entries.push(entry);

        let json = serde_json::to_string_pretty(&entries).map_err(io::Error::other)?;
        std::fs::write(&self.path, json)?;
        debug!(entries = entries.len(), "article index updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, url: &str) -> IndexEntry {
        IndexEntry {
            title: title.to_string(),
            categories: vec!["AI".to_string()],
            url: Some(url.to_string()),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = ArticleIndex::new(dir.path().join("none.json"));
        assert!(index.load().is_empty());
    }

    #[test]
    fn append_dedups_by_url() {
        let dir = tempfile::tempdir().unwrap();
        let index = ArticleIndex::new(dir.path().join("index.json"));

        assert!(index.append(entry("One", "https://m.com/1")).unwrap());
        assert!(index.append(entry("Two", "https://m.com/2")).unwrap());
        assert!(!index.append(entry("One again", "https://m.com/1")).unwrap());

        let titles: Vec<String> = index.load().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(ArticleIndex::new(path).load().is_empty());
    }

    #[test]
    fn append_leaves_invalid_index_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let hand_edited = r#"[
  {"title": "A", "categories": [], "url": "https://m.com/1"},
  {"title": "B", "categories": [], "url": "https://m.com/2"},
]"#;
        std::fs::write(&path, hand_edited).unwrap();

        let index = ArticleIndex::new(&path);
        let err = index.append(entry("C", "https://m.com/3")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), hand_edited);
    }

    #[test]
    fn entries_without_url_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, r#"[{"title": "Old", "categories": ["Web3"]}]"#).unwrap();
        let entries = ArticleIndex::new(path).load();
        assert_eq!(entries[0].url, None);
    }
}
