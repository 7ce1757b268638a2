use std::path::{Path, PathBuf};
use std::process::Command;

use kiln_core::VcsInfo;

/// Reads revision and branch from the git working tree at `repo_dir`.
///
/// Outside a repository (or without git installed) both values are empty.
#[derive(Debug, Clone)]
pub struct GitInfo {
    repo_dir: PathBuf,
}

impl GitInfo {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    fn query(&self, args: &[&str]) -> String {
        match git(&self.repo_dir, args) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "git query failed, treating as unavailable");
                String::new()
            }
        }
    }
}

impl VcsInfo for GitInfo {
    fn revision(&self) -> String {
        self.query(&["rev-parse", "--short", "HEAD"])
    }

    fn branch(&self) -> String {
        self.query(&["rev-parse", "--symbolic-full-name", "--abbrev-ref", "HEAD"])
    }
}

fn git(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| GitError::Command {
            detail: format!("failed to execute git {}", args.join(" ")),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::Failed {
            detail: format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git command failed: {detail}")]
    Command {
        detail: String,
        source: std::io::Error,
    },
    #[error("git failed: {detail}")]
    Failed { detail: String },
}
