//! The set of HTML articles a run feeds to the engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Articles keyed by bare file name, ordered by name.
///
/// The engine only ever sees the bare name; the full path is used to read the
/// article body when indexing over HTTP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleSet {
    root: PathBuf,
    articles: BTreeMap<String, PathBuf>,
}

impl ArticleSet {
    /// Create an empty set rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            articles: BTreeMap::new(),
        }
    }

    /// Add an article. A later file with the same name replaces the earlier one.
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Option<PathBuf> {
        self.articles.insert(name.into(), path.into())
    }

    /// Source directory, as handed to the batch subcommands.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.articles.get(name).map(PathBuf::as_path)
    }

    /// Iterate `(name, full path)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.articles
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }
}
