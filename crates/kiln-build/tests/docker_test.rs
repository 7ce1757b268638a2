use std::collections::BTreeMap;

use kiln_build::docker::{
    build_command, buildx_create_command, push_command, reset_qemu_command, with_tag,
};
use kiln_core::{BuildMode, BuildSettings};

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_owned()).collect()
}

// ── docker build ──

#[test]
fn plain_build_command() {
    let settings = BuildSettings::default();
    let args = build_command("acme/hello:latest", &BTreeMap::new(), &BTreeMap::new(), &settings);
    assert_eq!(args, strings(&["build", "--tag", "acme/hello:latest", "."]));
}

#[test]
fn build_flags_are_ordered() {
    let settings = BuildSettings {
        no_cache: true,
        squash: true,
        pull: true,
        http_proxy: Some("http://proxy:3128".to_owned()),
        https_proxy: Some(String::new()),
        ..Default::default()
    };
    let args = build_command(
        "acme/hello:latest",
        &map(&[("B", "2"), ("A", "1")]),
        &map(&[("team", "core")]),
        &settings,
    );
    assert_eq!(
        args,
        strings(&[
            "build",
            "--no-cache",
            "--squash",
            "--build-arg",
            "http_proxy=http://proxy:3128",
            "--build-arg",
            "A=1",
            "--build-arg",
            "B=2",
            "--label",
            "team=core",
            "--pull",
            "--tag",
            "acme/hello:latest",
            ".",
        ])
    );
}

#[test]
fn extra_tags_are_ignored_for_local_builds() {
    let settings = BuildSettings {
        extra_tags: vec!["stable".to_owned()],
        ..Default::default()
    };
    let args = build_command("acme/hello:1.0", &BTreeMap::new(), &BTreeMap::new(), &settings);
    assert!(!args.iter().any(|a| a.contains("stable")));
}

// ── docker buildx build ──

#[test]
fn publish_command_pushes_every_tag() {
    let settings = BuildSettings {
        mode: BuildMode::Publish,
        platforms: "linux/amd64,linux/arm64".to_owned(),
        extra_tags: vec!["stable".to_owned(), "v1".to_owned()],
        ..Default::default()
    };
    let args = build_command(
        "registry:5000/acme/hello:1.0",
        &map(&[("K", "V")]),
        &BTreeMap::new(),
        &settings,
    );
    assert_eq!(
        args,
        strings(&[
            "buildx",
            "build",
            "--progress=plain",
            "--platform=linux/amd64,linux/arm64",
            "--output=type=registry,push=true",
            "--build-arg",
            "K=V",
            "--tag",
            "registry:5000/acme/hello:1.0",
            "--tag",
            "registry:5000/acme/hello:stable",
            "--tag",
            "registry:5000/acme/hello:v1",
            ".",
        ])
    );
}

// ── with_tag ──

#[test]
fn with_tag_replaces_existing_tag() {
    assert_eq!(with_tag("acme/hello:1.0", "stable"), "acme/hello:stable");
}

#[test]
fn with_tag_appends_when_untagged() {
    assert_eq!(with_tag("acme/hello", "stable"), "acme/hello:stable");
}

#[test]
fn with_tag_ignores_registry_port() {
    assert_eq!(
        with_tag("localhost:5000/hello", "stable"),
        "localhost:5000/hello:stable"
    );
    assert_eq!(
        with_tag("localhost:5000/hello:dev", "stable"),
        "localhost:5000/hello:stable"
    );
}

// ── Setup commands ──

#[test]
fn setup_commands() {
    assert_eq!(
        buildx_create_command(),
        strings(&["buildx", "create", "--use", "--name=multiarch", "--node=multiarch"])
    );
    assert_eq!(&reset_qemu_command()[..3], &strings(&["run", "--rm", "--privileged"])[..]);
    assert_eq!(push_command("acme/hello:1.0"), strings(&["push", "acme/hello:1.0"]));
}
