//! Glob filtering of directory contents

use std::path::Path;

use glob::{MatchOptions, Pattern};
use tracing::debug;
use walkdir::WalkDir;

use croissant_core::FilePath;

use crate::error::Result;

// `*` also crosses directory separators, so `*.csv` matches `train/a.csv`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled include and exclude patterns of a FileSet
#[derive(Debug, Clone)]
pub struct GlobFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl GlobFilter {
    /// Compile include and exclude patterns
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| Pattern::new(pattern))
                .collect::<std::result::Result<Vec<_>, _>>()
        };
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Whether a relative path is selected
    ///
    /// No include pattern selects everything; excludes always win.
    pub fn matches(&self, fullpath: &str) -> bool {
        let included = self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|pattern| pattern.matches_with(fullpath, MATCH_OPTIONS));
        included
            && !self
                .excludes
                .iter()
                .any(|pattern| pattern.matches_with(fullpath, MATCH_OPTIONS))
    }

    /// Select files among several roots, sorted
    ///
    /// A root that is itself a file is kept when its `fullpath` matches. Directories
    /// are walked recursively and their files matched on the path relative to the root.
    pub fn select(&self, roots: &[FilePath]) -> Result<Vec<FilePath>> {
        let mut selected = Vec::new();
        for root in roots {
            if root.filepath.is_file() {
                if self.matches(&root.fullpath_str()) {
                    selected.push(root.clone());
                }
                continue;
            }
            selected.extend(self.walk(&root.filepath)?);
        }
        selected.sort();
        selected.dedup();
        debug!(files = selected.len(), "filtered files");
        Ok(selected)
    }

    fn walk(&self, dir: &Path) -> Result<Vec<FilePath>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = FilePath::under_root(entry.path(), dir);
            if self.matches(&path.fullpath_str()) {
                files.push(path);
            }
        }
        Ok(files)
    }
}
