use std::fmt;
use std::path::{Component, Path, PathBuf};

/// What a rebuild session should build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    All,
    Function(String),
}

impl Target {
    pub fn function(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Function(name) => Some(name),
        }
    }

    /// Combines the targets of two events in one batch.
    pub fn coalesce(self, other: Target) -> Target {
        if self == other { self } else { Self::All }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Function(name) => f.write_str(name),
        }
    }
}

/// Maps changed paths back to the function whose handler owns them.
#[derive(Debug, Clone, Default)]
pub struct HandlerIndex {
    /// Sorted by function name.
    handlers: Vec<(String, PathBuf)>,
    stack_file: Option<PathBuf>,
}

impl HandlerIndex {
    /// `handlers` pairs function names with handler directories relative to
    /// `root`.
    pub fn new<I, N, P>(root: &Path, handlers: I) -> Self
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: AsRef<Path>,
    {
        let mut handlers: Vec<(String, PathBuf)> = handlers
            .into_iter()
            .map(|(name, dir)| (name.into(), normalize(&root.join(dir))))
            .collect();
        handlers.sort();
        Self {
            handlers,
            stack_file: None,
        }
    }

    /// Changes to the stack file always rebuild everything.
    pub fn with_stack_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stack_file = Some(normalize(path.as_ref()));
        self
    }

    pub fn stack_file(&self) -> Option<&Path> {
        self.stack_file.as_deref()
    }

    pub fn is_stack_file(&self, path: &Path) -> bool {
        self.stack_file.as_deref() == Some(normalize(path).as_path())
    }

    pub fn handler_dirs(&self) -> impl Iterator<Item = &Path> {
        self.handlers.iter().map(|(_, dir)| dir.as_path())
    }

    /// Exact handler match first, then the deepest handler directory
    /// containing `path`, otherwise [`Target::All`].
    pub fn resolve(&self, path: &Path) -> Target {
        if self.is_stack_file(path) {
            return Target::All;
        }
        let path = normalize(path);

        if let Some((name, _)) = self.handlers.iter().find(|(_, dir)| *dir == path) {
            return Target::Function(name.clone());
        }

        let mut best: Option<(&str, usize)> = None;
        for (name, dir) in &self.handlers {
            if !path.starts_with(dir) {
                continue;
            }
            let depth = dir.components().count();
            // Names are sorted, so the first of equal depth wins.
            if best.is_none_or(|(_, best_depth)| depth > best_depth) {
                best = Some((name, depth));
            }
        }

        match best {
            Some((name, _)) => Target::Function(name.to_owned()),
            None => Target::All,
        }
    }

    /// Whether `path` lies inside any handler directory.
    pub fn owns(&self, path: &Path) -> bool {
        let path = normalize(path);
        self.handlers.iter().any(|(_, dir)| path.starts_with(dir))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
