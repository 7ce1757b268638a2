//! Image tag resolution.
//!
//! ```text
//! Default       img          → img:latest
//! Sha           img:0.2      → img:0.2-<revision>
//! BranchAndSha  img          → img:latest-<branch>-<revision>
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the final image tag is derived from the declared image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFormat {
    /// The declared tag, or `latest`.
    #[default]
    Default,
    /// `<tag>-<revision>`
    Sha,
    /// `<tag>-<branch>-<revision>`
    BranchAndSha,
}

impl FromStr for TagFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "default" | "latest" => Ok(Self::Default),
            "sha" => Ok(Self::Sha),
            "branch" => Ok(Self::BranchAndSha),
            _ => Err(crate::Error::UnknownTagFormat(s.to_owned())),
        }
    }
}

impl fmt::Display for TagFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "latest",
            Self::Sha => "sha",
            Self::BranchAndSha => "branch",
        };
        f.write_str(name)
    }
}

/// Computes the image reference to build and push.
///
/// Only the last path segment is inspected for a tag, so a registry with a
/// port (`localhost:5000/img`) still gets `:latest` appended.
pub fn resolve(format: TagFormat, image: &str, revision: &str, branch: &str) -> String {
    let last_segment = match image.rsplit_once('/') {
        Some((_, last)) => last,
        None => image,
    };
    let mut resolved = image.to_owned();
    if !last_segment.contains(':') {
        resolved.push_str(":latest");
    }

    match format {
        TagFormat::Default => resolved,
        TagFormat::Sha => format!("{resolved}-{revision}"),
        TagFormat::BranchAndSha => format!("{resolved}-{branch}-{revision}"),
    }
}

/// Source of repository state used for tagging.
pub trait VcsInfo {
    /// Short revision hash, empty if unavailable.
    fn revision(&self) -> String;
    /// Current branch name, empty if unavailable.
    fn branch(&self) -> String;
}

/// Revision and branch captured once per build round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagValues {
    pub revision: String,
    pub branch: String,
}

impl TagValues {
    /// Queries `vcs` for the values `format` needs.
    ///
    /// Git-derived formats fail when the repository state is unavailable,
    /// before any worker starts.
    pub fn for_format(format: TagFormat, vcs: &dyn VcsInfo) -> crate::Result<Self> {
        match format {
            TagFormat::Default => Ok(Self::default()),
            TagFormat::Sha => {
                let revision = vcs.revision();
                if revision.is_empty() {
                    return Err(crate::Error::MissingRevision);
                }
                Ok(Self {
                    revision,
                    branch: String::new(),
                })
            }
            TagFormat::BranchAndSha => {
                let branch = vcs.branch();
                if branch.is_empty() {
                    return Err(crate::Error::MissingBranch);
                }
                let revision = vcs.revision();
                if revision.is_empty() {
                    return Err(crate::Error::MissingRevision);
                }
                Ok(Self { revision, branch })
            }
        }
    }

    pub fn resolve(&self, format: TagFormat, image: &str) -> String {
        resolve(format, image, &self.revision, &self.branch)
    }
}
