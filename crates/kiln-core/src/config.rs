use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::function::FunctionSpec;

/// Default stack file name looked up in the project directory.
pub const DEFAULT_STACK_FILE: &str = "kiln.toml";

/// kiln.toml stack definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub stack: StackSection,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionSpec>,
    #[serde(default)]
    pub build: BuildDefaults,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Settings shared by every function in the stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackSection {
    /// Extra paths copied into every function's build context.
    #[serde(default)]
    pub copy_extra: Vec<String>,
    /// Build args applied to every function; function-level values win.
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDefaults {
    /// Directory build contexts are materialized under
    #[serde(default = "default_build_root")]
    pub build_root: String,
    /// Directory holding language templates
    #[serde(default = "default_template_dir")]
    pub template_dir: String,
    /// Platforms passed to `docker buildx build --platform`
    #[serde(default = "default_platforms")]
    pub platforms: String,
    /// Number of concurrent build workers
    #[serde(default = "default_parallel")]
    pub parallel: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiescence window before a change batch triggers a rebuild
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Directories (relative to the project) whose changes never trigger
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            build_root: default_build_root(),
            template_dir: default_template_dir(),
            platforms: default_platforms(),
            parallel: default_parallel(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ignore: Vec::new(),
        }
    }
}

impl StackConfig {
    /// Load a stack file. Unlike optional project config, a stack is required.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| crate::Error::ConfigLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;

        for (name, function) in config.functions.iter_mut() {
            function.name = name.clone();
        }

        tracing::debug!(
            path = %path.display(),
            functions = config.functions.len(),
            "stack loaded"
        );
        Ok(config)
    }

    /// Functions in name order, narrowed to `filter` when given.
    pub fn select(&self, filter: Option<&str>) -> crate::Result<Vec<FunctionSpec>> {
        match filter {
            None => Ok(self.functions.values().cloned().collect()),
            Some(name) => self
                .functions
                .get(name)
                .map(|f| vec![f.clone()])
                .ok_or_else(|| crate::Error::UnknownFunction {
                    name: name.to_owned(),
                    available: self.functions.keys().cloned().collect(),
                }),
        }
    }
}

fn default_build_root() -> String {
    "build".to_owned()
}

fn default_template_dir() -> String {
    "template".to_owned()
}

fn default_platforms() -> String {
    "linux/amd64".to_owned()
}

fn default_parallel() -> usize {
    1
}

fn default_debounce_ms() -> u64 {
    1500
}
