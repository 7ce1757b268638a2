use std::path::{Path, PathBuf};

use ignore::gitignore::Gitignore;

/// Editor swap and backup file suffixes.
const IGNORED_SUFFIXES: &[&str] = &[".swp", ".swx", "~"];

/// Decides which changed paths are noise.
///
/// A path is ignored when its file name starts with `.`, ends with an editor
/// suffix, matches the project's `.gitignore`, or lies under one of the
/// ignored directories.
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    root: PathBuf,
    gitignore: Option<Gitignore>,
    ignored_dirs: Vec<PathBuf>,
}

impl IgnorePolicy {
    /// Policy rooted at `root`, loading `root/.gitignore` when present.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let gitignore_path = root.join(".gitignore");
        let gitignore = if gitignore_path.is_file() {
            let (gitignore, error) = Gitignore::new(&gitignore_path);
            if let Some(e) = error {
                tracing::warn!(
                    path = %gitignore_path.display(),
                    error = %e,
                    "some .gitignore patterns could not be parsed"
                );
            }
            Some(gitignore)
        } else {
            None
        };
        Self {
            root,
            gitignore,
            ignored_dirs: Vec::new(),
        }
    }

    /// Ignores everything under `dir`, relative to the root unless absolute.
    pub fn ignore_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.ignored_dirs.push(self.root.join(dir));
        self
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                return true;
            }
            if IGNORED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
                return true;
            }
        }

        if self.ignored_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        match &self.gitignore {
            // `matched_path_or_any_parents` panics on paths outside its root.
            Some(gitignore) if path.starts_with(gitignore.path()) && path != gitignore.path() => {
                gitignore
                    .matched_path_or_any_parents(path, is_dir)
                    .is_ignore()
            }
            _ => false,
        }
    }
}
