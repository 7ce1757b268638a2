use std::path::Path;

use serde::{Deserialize, Serialize};

/// Manifest file name inside `template/<language>/`.
pub const TEMPLATE_MANIFEST: &str = "template.toml";

/// Per-language template settings read from `template/<language>/template.toml`.
///
/// Every field is optional; a template without a manifest builds with the
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateManifest {
    #[serde(default)]
    pub language: Option<String>,
    /// Folder inside the build context the handler is copied into.
    #[serde(default)]
    pub handler_folder: Option<String>,
    /// The template's Dockerfile mounts an SSH agent; requires BuildKit.
    #[serde(default)]
    pub mount_ssh: bool,
    #[serde(default)]
    pub build_options: Vec<BuildOption>,
}

/// A named set of packages selectable with `--build-option`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOption {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<String>,
}

impl TemplateManifest {
    /// Loads the manifest in `template_dir`, or the defaults when the
    /// template ships none.
    pub fn load(template_dir: &Path) -> crate::Result<Self> {
        let path = template_dir.join(TEMPLATE_MANIFEST);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| crate::Error::TemplateLoad {
            path: path.clone(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| crate::Error::TemplateParse { path, source: e })
    }

    /// Packages contributed by the requested build options, in request
    /// order.
    pub fn packages_for(&self, language: &str, requested: &[String]) -> crate::Result<Vec<String>> {
        let mut packages = Vec::new();
        for name in requested {
            let option = self
                .build_options
                .iter()
                .find(|option| option.name == *name)
                .ok_or_else(|| crate::Error::UnknownBuildOption {
                    option: name.clone(),
                    language: language.to_owned(),
                })?;
            packages.extend(option.packages.iter().cloned());
        }
        Ok(packages)
    }
}
