//! newscheck-scanner: Collects the HTML articles a run feeds to the engine.

use newscheck_core::{ArticleSet, Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const ARTICLE_EXTENSION: &str = ".html";

/// Scan `source_dir` recursively for `*.html` files.
///
/// Fails when the directory does not exist or holds no articles. Articles are
/// keyed by bare file name; when names collide across subdirectories the file
/// visited last wins. Symlinks are followed, and a link to an article counts
/// under the link's own name. Link cycles are logged and skipped.
pub fn collect_articles(source_dir: &Path) -> Result<ArticleSet> {
    if !source_dir.is_dir() {
        return Err(Error::Environment("source_dir not found".to_string()));
    }

    let root = normalize_root(source_dir);
    info!("Scanning articles under {}", root.display());

    let mut articles = ArticleSet::new(&root);
    let entries = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file());

    for entry in entries {
        let Some(name) = entry.file_name().to_str() else {
            warn!("Skipping non UTF-8 file name: {}", entry.path().display());
            continue;
        };
        if !is_article(name) {
            continue;
        }

        if let Some(previous) = articles.insert(name, entry.path()) {
            debug!(
                "{} shadows {} (same file name)",
                entry.path().display(),
                previous.display()
            );
        }
    }

    if articles.is_empty() {
        return Err(Error::Environment("source_dir is empty".to_string()));
    }

    info!("Found {} articles", articles.len());
    Ok(articles)
}

fn is_article(name: &str) -> bool {
    name.len() > ARTICLE_EXTENSION.len() && name.ends_with(ARTICLE_EXTENSION)
}

/// Drop trailing and doubled separators so the engine receives `dir`, not
/// `dir/`. Works on path components, so non UTF-8 directories pass through.
fn normalize_root(source_dir: &Path) -> PathBuf {
    source_dir.components().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_article() {
        assert!(is_article("a.html"));
        assert!(!is_article("a.htm"));
        assert!(!is_article("a.html.bak"));
        assert!(!is_article(".html"));
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_root(Path::new("data/")), PathBuf::from("data"));
        assert_eq!(normalize_root(Path::new("data//")), PathBuf::from("data"));
        assert_eq!(normalize_root(Path::new("/")), PathBuf::from("/"));
        assert_eq!(normalize_root(Path::new("/srv/data")), PathBuf::from("/srv/data"));
        assert_eq!(normalize_root(Path::new("./data/")), PathBuf::from("./data"));
    }
}
