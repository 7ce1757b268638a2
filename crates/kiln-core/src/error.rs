use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load stack file from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse stack file at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no function named '{name}' in stack; available: {}", format_names(available))]
    UnknownFunction {
        name: String,
        available: Vec<String>,
    },

    // ── Templates ──
    #[error("failed to read template manifest {path}: {source}")]
    TemplateLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse template manifest {path}: {source}")]
    TemplateParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("build option '{option}' is not available for {language}; check template/{language}/template.toml")]
    UnknownBuildOption { option: String, language: String },

    // ── Run-level settings ──
    #[error("unknown image tag format '{0}', accepts 'latest', 'sha' or 'branch'")]
    UnknownTagFormat(String),

    #[error("each {kind} must take the form key=value, got {value:?}")]
    MalformedPair { kind: &'static str, value: String },

    #[error("{kind} must have a non-empty key: {value:?}")]
    EmptyKey { kind: &'static str, value: String },

    #[error("{kind} must have a non-empty value: {value:?}")]
    EmptyValue { kind: &'static str, value: String },

    #[error("the --parallel flag must be greater than 0")]
    InvalidParallelism,

    // ── Tag values ──
    #[error("cannot tag image with Git SHA as this is not a Git repository")]
    MissingRevision,

    #[error("cannot tag image with Git branch and SHA as this is not a Git repository")]
    MissingBranch,
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_owned()
    } else {
        names.join(", ")
    }
}
