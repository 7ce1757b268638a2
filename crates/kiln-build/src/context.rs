use std::fs;
use std::path::{Component, Path, PathBuf};

use kiln_core::{DOCKERFILE_LANGUAGE, TemplateManifest};

/// Folder inside the build context the handler is overlaid into.
pub const DEFAULT_HANDLER_OVERLAY: &str = "function";

/// Handler entries never copied into a build context.
const HANDLER_EXCLUDES: &[&str] = &["build", "template"];

const RESTRICTED_DIR_MODE: u32 = 0o700;
const CI_DIR_MODE: u32 = 0o777;

/// A language template resolved for one build.
#[derive(Debug, Clone, Default)]
pub struct Template {
    /// Template directory; `None` for functions that bring a Dockerfile.
    pub dir: Option<PathBuf>,
    pub manifest: TemplateManifest,
}

/// Materializes per-function Docker build contexts.
///
/// Layout of a context for a template language:
///
/// ```text
/// <build_root>/<function>/
///   Dockerfile, ...            ← template/<language>/ (base layer)
///   function/
///     handler files            ← handler directory (overlay, wins on collision)
///     <extra paths>
/// ```
///
/// The project directory is the scope extra paths must stay within; pass an
/// absolute path.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    project_dir: PathBuf,
    build_root: PathBuf,
    template_dir: PathBuf,
    handler_overlay: String,
    dir_mode: u32,
}

impl ContextAssembler {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let dir_mode = if running_in_ci() {
            CI_DIR_MODE
        } else {
            RESTRICTED_DIR_MODE
        };
        Self {
            project_dir: normalize(&project_dir.into()),
            build_root: PathBuf::from("build"),
            template_dir: PathBuf::from("template"),
            handler_overlay: DEFAULT_HANDLER_OVERLAY.to_owned(),
            dir_mode,
        }
    }

    /// Directory contexts are created under, relative to the project.
    pub fn with_build_root(mut self, build_root: impl Into<PathBuf>) -> Self {
        self.build_root = build_root.into();
        self
    }

    /// Directory language templates are read from, relative to the project.
    pub fn with_template_dir(mut self, template_dir: impl Into<PathBuf>) -> Self {
        self.template_dir = template_dir.into();
        self
    }

    /// Overlay folder for templates whose manifest names none.
    pub fn with_handler_overlay(mut self, overlay: impl Into<String>) -> Self {
        self.handler_overlay = overlay.into();
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn build_root(&self) -> PathBuf {
        self.project_dir.join(&self.build_root)
    }

    pub fn template_root(&self) -> PathBuf {
        self.project_dir.join(&self.template_dir)
    }

    pub fn context_path(&self, function_name: &str) -> PathBuf {
        self.build_root().join(function_name)
    }

    /// Resolves a handler path against the project directory.
    pub fn handler_path(&self, handler_dir: &str) -> PathBuf {
        normalize(&self.project_dir.join(handler_dir))
    }

    /// Looks up `language` under the template directory and reads its
    /// manifest. The `dockerfile` language has no template.
    pub fn template(&self, language: &str) -> Result<Template, ContextError> {
        if language.eq_ignore_ascii_case(DOCKERFILE_LANGUAGE) {
            return Ok(Template::default());
        }
        let dir = self.template_root().join(language);
        if !dir.is_dir() {
            return Err(ContextError::TemplateNotFound {
                language: language.to_owned(),
                path: dir,
            });
        }
        let manifest =
            TemplateManifest::load(&dir).map_err(|source| ContextError::Manifest { source })?;
        Ok(Template {
            dir: Some(dir),
            manifest,
        })
    }

    /// Rebuilds the context for one function from scratch.
    ///
    /// Any error means the context is unusable and the function's build must
    /// be reported as failed.
    pub fn assemble(
        &self,
        function_name: &str,
        handler_dir: &str,
        language: &str,
        extra_paths: &[String],
    ) -> Result<PathBuf, ContextError> {
        let template = self.template(language)?;
        self.assemble_with(&template, function_name, handler_dir, extra_paths)
    }

    /// [`assemble`](Self::assemble) with an already resolved template.
    pub fn assemble_with(
        &self,
        template: &Template,
        function_name: &str,
        handler_dir: &str,
        extra_paths: &[String],
    ) -> Result<PathBuf, ContextError> {
        let context = self.context_path(function_name);
        let handler_dst = match &template.dir {
            Some(_) => context.join(self.overlay_folder(&template.manifest)?),
            None => context.clone(),
        };
        self.clear(&context);
        create_dir(&handler_dst, self.dir_mode)?;

        if let Some(template_src) = &template.dir {
            copy_tree(template_src, &context)?;
        }

        let handler_src = self.handler_path(handler_dir);
        let entries = fs::read_dir(&handler_src).map_err(|e| ContextError::HandlerRead {
            path: handler_src.clone(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| ContextError::HandlerRead {
                path: handler_src.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            if HANDLER_EXCLUDES.iter().any(|ex| name == *ex) {
                continue;
            }
            copy_tree(&entry.path(), &handler_dst.join(&name))?;
        }

        for extra in extra_paths {
            let source = self.scoped_path(extra)?;
            let relative: PathBuf = source
                .components()
                .skip(self.project_dir.components().count())
                .collect();
            copy_tree(&source, &handler_dst.join(relative))?;
        }

        tracing::debug!(
            function = function_name,
            context = %context.display(),
            "build context assembled"
        );
        Ok(context)
    }

    /// Resolves `path` against the project and checks it stays inside.
    ///
    /// The project directory itself is rejected as well.
    pub fn scoped_path(&self, path: &str) -> Result<PathBuf, ContextError> {
        let resolved = normalize(&self.project_dir.join(path));
        if resolved == self.project_dir {
            return Err(ContextError::EqualsProject {
                path: path.to_owned(),
                resolved,
            });
        }
        if !resolved.starts_with(&self.project_dir) {
            return Err(ContextError::OutsideProject {
                path: path.to_owned(),
                resolved,
            });
        }
        Ok(resolved)
    }

    /// The manifest's handler folder, which must stay inside the context.
    fn overlay_folder<'a>(&'a self, manifest: &'a TemplateManifest) -> Result<&'a Path, ContextError> {
        let folder = match manifest.handler_folder.as_deref() {
            Some(folder) if !folder.trim().is_empty() => Path::new(folder),
            _ => return Ok(Path::new(&self.handler_overlay)),
        };
        if !folder.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(ContextError::InvalidHandlerFolder {
                folder: folder.to_path_buf(),
            });
        }
        Ok(folder)
    }

    /// Best-effort removal of a stale context; later steps surface real
    /// problems.
    fn clear(&self, context: &Path) {
        if !context.exists() {
            return;
        }
        // arch-lint: allow(no-error-swallowing) reason="assembly recreates the directory and reports any real failure"
        if let Err(e) = fs::remove_dir_all(context) {
            tracing::warn!(
                context = %context.display(),
                error = %e,
                "unable to clear previous build context"
            );
        }
    }
}

/// Copies a file or directory tree, preserving mode bits.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), ContextError> {
    let meta = fs::metadata(src).map_err(|e| ContextError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    if !meta.is_dir() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| ContextError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::copy(src, dst).map_err(|e| ContextError::CopyFile {
            path: src.to_path_buf(),
            source: e,
        })?;
        return Ok(());
    }

    let created = !dst.exists();
    fs::create_dir_all(dst).map_err(|e| ContextError::CreateDir {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let entries = fs::read_dir(src).map_err(|e| ContextError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| ContextError::Read {
            path: src.to_path_buf(),
            source: e,
        })?;
        copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
    }

    // Applied last so a read-only source directory can still be filled.
    if created {
        fs::set_permissions(dst, meta.permissions()).map_err(|e| {
            ContextError::SetPermissions {
                path: dst.to_path_buf(),
                source: e,
            }
        })?;
    }
    Ok(())
}

#[cfg_attr(not(unix), allow(unused_variables))]
fn create_dir(path: &Path, mode: u32) -> Result<(), ContextError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    builder.create(path).map_err(|e| ContextError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Lexically resolves `.` and `..` without touching the filesystem.
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

fn running_in_ci() -> bool {
    matches!(std::env::var("CI").as_deref(), Ok("true") | Ok("1"))
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("language template '{language}' not found at {path}; build a custom Dockerfile or pull templates")]
    TemplateNotFound { language: String, path: PathBuf },
    #[error("invalid template manifest: {source}")]
    Manifest { source: kiln_core::Error },
    #[error("template handler_folder {} must be a relative path inside the build context", folder.display())]
    InvalidHandlerFolder { folder: PathBuf },
    #[error("failed to read function handler {path}: {source}")]
    HandlerRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy file {path}: {source}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to set permissions on {path}: {source}")]
    SetPermissions {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("forbidden path appears to equal the entire project: {path} ({})", resolved.display())]
    EqualsProject { path: String, resolved: PathBuf },
    #[error("forbidden path appears to be outside of the build context: {path} ({})", resolved.display())]
    OutsideProject { path: String, resolved: PathBuf },
}
