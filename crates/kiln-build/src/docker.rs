//! Docker CLI argument construction.

use std::collections::BTreeMap;

use kiln_core::{BuildMode, BuildSettings};

/// buildx output mode that pushes straight to the registry.
const PUSH_ONLY: &str = "--output=type=registry,push=true";

/// Arguments for building `image` in the current build context.
///
/// Build mode produces `docker build`, publish mode produces
/// `docker buildx build` with a push-only output and every extra tag.
pub fn build_command(
    image: &str,
    build_args: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
    settings: &BuildSettings,
) -> Vec<String> {
    let mut args: Vec<String> = match settings.mode {
        BuildMode::Build => vec!["build".to_owned()],
        BuildMode::Publish => vec![
            "buildx".to_owned(),
            "build".to_owned(),
            "--progress=plain".to_owned(),
            format!("--platform={}", settings.platforms),
            PUSH_ONLY.to_owned(),
        ],
    };

    args.extend(flag_slice(build_args, labels, settings));
    args.push("--tag".to_owned());
    args.push(image.to_owned());

    if settings.mode == BuildMode::Publish {
        for tag in &settings.extra_tags {
            args.push("--tag".to_owned());
            args.push(with_tag(image, tag));
        }
    }

    args.push(".".to_owned());
    args
}

fn flag_slice(
    build_args: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
    settings: &BuildSettings,
) -> Vec<String> {
    let mut flags = Vec::new();

    if settings.no_cache {
        flags.push("--no-cache".to_owned());
    }
    if settings.squash {
        flags.push("--squash".to_owned());
    }

    let proxies = [
        ("http_proxy", settings.http_proxy.as_deref()),
        ("https_proxy", settings.https_proxy.as_deref()),
    ];
    for (name, value) in proxies {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            flags.push("--build-arg".to_owned());
            flags.push(format!("{name}={value}"));
        }
    }

    for (key, value) in build_args {
        flags.push("--build-arg".to_owned());
        flags.push(format!("{key}={value}"));
    }
    for (key, value) in labels {
        flags.push("--label".to_owned());
        flags.push(format!("{key}={value}"));
    }

    if settings.pull {
        flags.push("--pull".to_owned());
    }

    flags
}

/// Replaces the tag of `image` (the part after the last `:` of the final
/// path segment) with `tag`.
pub fn with_tag(image: &str, tag: &str) -> String {
    let segment_start = image.rfind('/').map_or(0, |i| i + 1);
    let repository = match image[segment_start..].rfind(':') {
        Some(i) => &image[..segment_start + i],
        None => image,
    };
    format!("{repository}:{tag}")
}

/// Creates and selects the multi-arch buildx builder used by `publish`.
pub fn buildx_create_command() -> Vec<String> {
    [
        "buildx",
        "create",
        "--use",
        "--name=multiarch",
        "--node=multiarch",
    ]
    .map(str::to_owned)
    .to_vec()
}

/// Registers qemu binfmt handlers for cross-platform builds (AMD64 hosts).
pub fn reset_qemu_command() -> Vec<String> {
    [
        "run",
        "--rm",
        "--privileged",
        "multiarch/qemu-user-static",
        "--reset",
        "-p",
        "yes",
    ]
    .map(str::to_owned)
    .to_vec()
}

pub fn push_command(image: &str) -> Vec<String> {
    vec!["push".to_owned(), image.to_owned()]
}

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker CLI not found, install it from https://docs.docker.com/get-docker/")]
    NotFound { source: std::io::Error },

    #[error("failed to read docker output")]
    Output { source: std::io::Error },

    #[error("received non-zero exit code from docker {}: {}, error: {}", args.first().map(String::as_str).unwrap_or(""), format_code(*code), stderr.trim())]
    CommandFailed {
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },
}

fn format_code(code: Option<i32>) -> String {
    code.map_or_else(|| "terminated by signal".to_owned(), |c| c.to_string())
}
