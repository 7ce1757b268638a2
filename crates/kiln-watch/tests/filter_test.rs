use std::fs;
use std::path::Path;

use kiln_watch::IgnorePolicy;
use tempfile::TempDir;

fn policy(tmp: &TempDir) -> IgnorePolicy {
    IgnorePolicy::new(tmp.path())
        .ignore_dir("build")
        .ignore_dir("template")
}

#[test]
fn regular_files_are_not_ignored() {
    let tmp = TempDir::new().unwrap();
    let policy = policy(&tmp);
    assert!(!policy.is_ignored(&tmp.path().join("hello/handler.py"), false));
    assert!(!policy.is_ignored(&tmp.path().join("kiln.toml"), false));
}

#[test]
fn dotfiles_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let policy = policy(&tmp);
    assert!(policy.is_ignored(&tmp.path().join("hello/.DS_Store"), false));
    assert!(policy.is_ignored(&tmp.path().join("hello/.cache"), true));
}

#[test]
fn editor_swap_files_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let policy = policy(&tmp);
    for name in ["handler.py.swp", "handler.py.swx", "handler.py~"] {
        assert!(policy.is_ignored(&tmp.path().join("hello").join(name), false), "{name}");
    }
}

#[test]
fn build_and_template_dirs_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let policy = policy(&tmp);
    assert!(policy.is_ignored(&tmp.path().join("build/hello/function/handler.py"), false));
    assert!(policy.is_ignored(&tmp.path().join("template/python/Dockerfile"), false));
    assert!(!policy.is_ignored(&tmp.path().join("builder/main.py"), false));
}

#[test]
fn gitignore_patterns_are_honoured() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".gitignore"), "*.log\nnode_modules/\n").unwrap();
    let policy = policy(&tmp);

    assert!(policy.is_ignored(&tmp.path().join("hello/debug.log"), false));
    assert!(policy.is_ignored(&tmp.path().join("hello/node_modules"), true));
    assert!(policy.is_ignored(&tmp.path().join("hello/node_modules/pkg/index.js"), false));
    assert!(!policy.is_ignored(&tmp.path().join("hello/handler.js"), false));
}

#[test]
fn paths_outside_the_root_are_checked_safely() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".gitignore"), "*.log\n").unwrap();
    let policy = policy(&tmp);

    assert!(!policy.is_ignored(Path::new("/somewhere/else/app.log"), false));
    assert!(!policy.is_ignored(Path::new("/somewhere/else/app.py"), false));
}
