use std::path::{Path, PathBuf};

use kiln_watch::{HandlerIndex, Target};

fn root() -> PathBuf {
    PathBuf::from("/work/stack")
}

fn index() -> HandlerIndex {
    HandlerIndex::new(
        &root(),
        [
            ("api", "./api"),
            ("api-admin", "api/admin"),
            ("worker", "worker"),
        ],
    )
    .with_stack_file(root().join("kiln.toml"))
}

fn function(name: &str) -> Target {
    Target::Function(name.to_owned())
}

// ── resolve ──

#[test]
fn exact_handler_directory() {
    assert_eq!(index().resolve(&root().join("worker")), function("worker"));
}

#[test]
fn descendant_of_handler() {
    assert_eq!(
        index().resolve(&root().join("worker/src/jobs/mod.py")),
        function("worker")
    );
}

#[test]
fn deepest_handler_wins() {
    let index = index();
    assert_eq!(index.resolve(&root().join("api/admin/handler.py")), function("api-admin"));
    assert_eq!(index.resolve(&root().join("api/handler.py")), function("api"));
}

#[test]
fn unrelated_path_rebuilds_all() {
    assert_eq!(index().resolve(&root().join("docs/README.md")), Target::All);
    assert_eq!(index().resolve(Path::new("/elsewhere/file")), Target::All);
}

#[test]
fn sibling_with_shared_prefix_is_not_a_descendant() {
    assert_eq!(index().resolve(&root().join("worker2/handler.py")), Target::All);
}

#[test]
fn stack_file_rebuilds_all() {
    assert_eq!(index().resolve(&root().join("kiln.toml")), Target::All);
    assert!(index().is_stack_file(&root().join("./kiln.toml")));
}

#[test]
fn equal_depth_tie_goes_to_first_name() {
    let index = HandlerIndex::new(&root(), [("zeta", "shared"), ("alpha", "shared")]);
    assert_eq!(index.resolve(&root().join("shared/a.py")), function("alpha"));
    assert_eq!(index.resolve(&root().join("shared")), function("alpha"));
}

#[test]
fn owns_only_paths_inside_handlers() {
    let index = index();
    assert!(index.owns(&root().join("api/new_dir")));
    assert!(!index.owns(&root().join("template/python")));
}

// ── coalesce ──

#[test]
fn same_function_coalesces_to_itself() {
    assert_eq!(function("api").coalesce(function("api")), function("api"));
}

#[test]
fn different_targets_coalesce_to_all() {
    assert_eq!(function("api").coalesce(function("worker")), Target::All);
    assert_eq!(function("api").coalesce(Target::All), Target::All);
    assert_eq!(Target::All.coalesce(Target::All), Target::All);
}

#[test]
fn target_display() {
    assert_eq!(Target::All.to_string(), "all");
    assert_eq!(function("api").to_string(), "api");
    assert_eq!(function("api").function(), Some("api"));
    assert_eq!(Target::All.function(), None);
}
