use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Language sentinel for functions that ship their own Dockerfile.
pub const DOCKERFILE_LANGUAGE: &str = "dockerfile";

/// A single deployable function as declared in `[functions.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Function name; filled from the table key when the stack is loaded.
    #[serde(skip)]
    pub name: String,
    /// Template identifier under the template directory, or `dockerfile`.
    #[serde(rename = "lang", default)]
    pub language: String,
    /// Handler source directory, relative to the project directory.
    pub handler: String,
    /// Image reference; may already carry a tag.
    pub image: String,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    #[serde(default)]
    pub build_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub skip_build: bool,
    /// Template build options always applied to this function.
    #[serde(default)]
    pub build_options: Vec<String>,
    #[serde(default)]
    pub constraints: Option<Vec<String>>,
    #[serde(default)]
    pub limits: Option<FunctionResources>,
    #[serde(default)]
    pub requests: Option<FunctionResources>,
}

/// Memory and CPU figures for limits / requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResources {
    pub memory: Option<String>,
    pub cpu: Option<String>,
}

impl FunctionSpec {
    pub fn uses_dockerfile(&self) -> bool {
        self.language.eq_ignore_ascii_case(DOCKERFILE_LANGUAGE)
    }
}
