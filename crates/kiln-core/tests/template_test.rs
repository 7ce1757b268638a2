use std::fs;

use kiln_core::{BuildOption, Error, TEMPLATE_MANIFEST, TemplateManifest};
use tempfile::TempDir;

const MANIFEST: &str = r#"
language = "python3"
handler_folder = "src"
mount_ssh = true

[[build_options]]
name = "dev"
packages = ["make", "gcc"]

[[build_options]]
name = "db"
packages = ["libpq-dev"]
"#;

fn template(contents: Option<&str>) -> TempDir {
    let tmp = TempDir::new().unwrap();
    if let Some(contents) = contents {
        fs::write(tmp.path().join(TEMPLATE_MANIFEST), contents).unwrap();
    }
    tmp
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

// ── Loading ──

#[test]
fn missing_manifest_loads_defaults() {
    let tmp = template(None);

    let manifest = TemplateManifest::load(tmp.path()).unwrap();

    assert_eq!(manifest, TemplateManifest::default());
    assert!(!manifest.mount_ssh);
}

#[test]
fn manifest_fields_are_read() {
    let tmp = template(Some(MANIFEST));

    let manifest = TemplateManifest::load(tmp.path()).unwrap();

    assert_eq!(manifest.language.as_deref(), Some("python3"));
    assert_eq!(manifest.handler_folder.as_deref(), Some("src"));
    assert!(manifest.mount_ssh);
    assert_eq!(
        manifest.build_options[1],
        BuildOption {
            name: "db".to_owned(),
            packages: strings(&["libpq-dev"]),
        }
    );
}

#[test]
fn invalid_manifest_is_a_parse_error() {
    let tmp = template(Some("mount_ssh = \"maybe\""));

    let err = TemplateManifest::load(tmp.path()).unwrap_err();

    assert!(matches!(err, Error::TemplateParse { .. }));
}

// ── Build options ──

#[test]
fn packages_follow_request_order() {
    let manifest = TemplateManifest::load(template(Some(MANIFEST)).path()).unwrap();

    let packages = manifest
        .packages_for("python3", &strings(&["db", "dev"]))
        .unwrap();

    assert_eq!(packages, strings(&["libpq-dev", "make", "gcc"]));
}

#[test]
fn unknown_option_names_the_language() {
    let manifest = TemplateManifest::load(template(Some(MANIFEST)).path()).unwrap();

    let err = manifest
        .packages_for("python3", &strings(&["gpu"]))
        .unwrap_err();

    assert!(matches!(err, Error::UnknownBuildOption { ref option, .. } if option == "gpu"));
    assert!(err.to_string().contains("python3"));
}
