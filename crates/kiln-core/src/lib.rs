//! Core types and configuration for kiln.
//!
//! This crate defines the `kiln.toml` stack schema ([`StackConfig`]), the
//! function data model ([`FunctionSpec`]), image tag resolution
//! ([`tag::resolve`]) and the run-level [`BuildSettings`] shared by the
//! `build`, `publish` and `up` commands. Language templates may carry a
//! [`TemplateManifest`].

pub mod config;
pub mod error;
pub mod function;
pub mod settings;
pub mod tag;
pub mod template;

pub use config::{BuildDefaults, DEFAULT_STACK_FILE, StackConfig, StackSection, WatchConfig};
pub use error::{Error, Result};
pub use function::{DOCKERFILE_LANGUAGE, FunctionResources, FunctionSpec};
pub use settings::{BuildMode, BuildSettings};
pub use tag::{TagFormat, TagValues, VcsInfo};
pub use template::{BuildOption, TEMPLATE_MANIFEST, TemplateManifest};
