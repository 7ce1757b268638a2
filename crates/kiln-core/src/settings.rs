use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use crate::function::FunctionSpec;
use crate::tag::TagFormat;

/// Build-arg key whose repeated values are concatenated instead of replaced.
pub const ADDITIONAL_PACKAGE_BUILD_ARG: &str = "ADDITIONAL_PACKAGE";

/// Whether a round produces local images or pushes multi-arch images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// `docker build`, image lands in the local library
    #[default]
    Build,
    /// `docker buildx build` straight to the registry
    Publish,
}

/// Run-level options for one build round.
///
/// Built by the CLI from flags and stack defaults and handed to the
/// coordinator explicitly.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub mode: BuildMode,
    pub no_cache: bool,
    pub squash: bool,
    pub pull: bool,
    pub quiet: bool,
    /// Assemble build contexts only, skip docker entirely.
    pub shrinkwrap: bool,
    pub tag_format: TagFormat,
    pub build_args: BTreeMap<String, String>,
    pub build_labels: BTreeMap<String, String>,
    pub copy_extra: Vec<String>,
    /// Template build options requested with `--build-option`.
    pub build_options: Vec<String>,
    pub platforms: String,
    pub extra_tags: Vec<String>,
    pub parallel: NonZeroUsize,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            mode: BuildMode::Build,
            no_cache: false,
            squash: false,
            pull: false,
            quiet: false,
            shrinkwrap: false,
            tag_format: TagFormat::Default,
            build_args: BTreeMap::new(),
            build_labels: BTreeMap::new(),
            copy_extra: Vec::new(),
            build_options: Vec::new(),
            platforms: "linux/amd64".to_owned(),
            extra_tags: Vec::new(),
            parallel: NonZeroUsize::MIN,
            http_proxy: None,
            https_proxy: None,
        }
    }
}

impl BuildSettings {
    /// Validates a requested worker count.
    pub fn parallelism(requested: usize) -> crate::Result<NonZeroUsize> {
        NonZeroUsize::new(requested).ok_or(crate::Error::InvalidParallelism)
    }

    /// Stack defaults, then function values, then run-level values.
    pub fn merged_build_args(
        &self,
        stack_args: &BTreeMap<String, String>,
        function: &FunctionSpec,
    ) -> BTreeMap<String, String> {
        let function_level = merge_map(stack_args, &function.build_args);
        merge_map(&function_level, &self.build_args)
    }

    pub fn merged_build_labels(&self, function: &FunctionSpec) -> BTreeMap<String, String> {
        merge_map(&function.build_labels, &self.build_labels)
    }

    pub fn merged_extra_paths(&self, stack_paths: &[String]) -> Vec<String> {
        merge_slice(stack_paths, &self.copy_extra)
    }

    pub fn merged_build_options(&self, function: &FunctionSpec) -> Vec<String> {
        merge_slice(&function.build_options, &self.build_options)
    }
}

/// Folds template build-option packages into `ADDITIONAL_PACKAGE`.
///
/// The result is the sorted, de-duplicated union of the existing value's
/// packages and `packages`. Without packages the args are left untouched.
pub fn append_additional_packages(build_args: &mut BTreeMap<String, String>, packages: &[String]) {
    if packages.is_empty() {
        return;
    }
    let mut combined: Vec<String> = packages.iter().map(|p| p.trim().to_owned()).collect();
    if let Some(existing) = build_args.get(ADDITIONAL_PACKAGE_BUILD_ARG) {
        combined.extend(existing.split_whitespace().map(str::to_owned));
    }
    combined.retain(|p| !p.is_empty());
    combined.sort();
    combined.dedup();
    build_args.insert(ADDITIONAL_PACKAGE_BUILD_ARG.to_owned(), combined.join(" "));
}

/// Merges two maps into a new one, `overlay` winning on key collision.
pub fn merge_map(
    base: &BTreeMap<String, String>,
    overlay: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// `overlay` entries first, then any `values` not already present.
pub fn merge_slice(values: &[String], overlay: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(values.len() + overlay.len());
    for value in overlay.iter().chain(values) {
        if !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    merged
}

/// Parses `--build-arg KEY=VALUE` flags.
///
/// Repeated `ADDITIONAL_PACKAGE` values accumulate, space separated.
pub fn parse_build_args(args: &[String]) -> crate::Result<BTreeMap<String, String>> {
    let mut mapped: BTreeMap<String, String> = BTreeMap::new();
    for arg in args {
        let (key, value) = split_pair("build-arg", arg)?;
        if key == ADDITIONAL_PACKAGE_BUILD_ARG {
            if let Some(existing) = mapped.get_mut(&key) {
                existing.push(' ');
                existing.push_str(&value);
                continue;
            }
        }
        mapped.insert(key, value);
    }
    Ok(mapped)
}

/// Parses `KEY=VALUE` flags such as `--build-label`; later keys win.
pub fn parse_map(values: &[String], kind: &'static str) -> crate::Result<BTreeMap<String, String>> {
    values
        .iter()
        .map(|value| split_pair(kind, value))
        .collect()
}

fn split_pair(kind: &'static str, raw: &str) -> crate::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| crate::Error::MalformedPair {
            kind,
            value: raw.to_owned(),
        })?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() {
        return Err(crate::Error::EmptyKey {
            kind,
            value: raw.to_owned(),
        });
    }
    if value.is_empty() {
        return Err(crate::Error::EmptyValue {
            kind,
            value: raw.to_owned(),
        });
    }
    Ok((key.to_owned(), value.to_owned()))
}
