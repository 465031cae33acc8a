use std::path::{Path, PathBuf};

/// Ordered list of directories to scan for dSYM bundles.
///
/// Adding a directory that is already present moves it to the end, so the
/// last mention decides its precedence. On case-insensitive file systems
/// paths differing only in case are the same directory.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    case_insensitive: bool,
    paths: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn new(case_insensitive: bool) -> SearchPaths {
        SearchPaths {
            case_insensitive,
            paths: Vec::new(),
        }
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let key = self.key(&path);
        let case_insensitive = self.case_insensitive;
        self.paths
            .retain(|existing| comparison_key(existing, case_insensitive) != key);
        self.paths.push(path);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn key(&self, path: &Path) -> String {
        comparison_key(path, self.case_insensitive)
    }
}

fn comparison_key(path: &Path, case_insensitive: bool) -> String {
    let text = path.to_string_lossy();
    let text = text.trim_end_matches(std::path::MAIN_SEPARATOR);
    if case_insensitive {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}
