use kiln_core::tag::resolve;
use kiln_core::{Error, TagFormat, TagValues, VcsInfo};
use mockall::mock;
use proptest::prelude::*;

mock! {
    Vcs {}

    impl VcsInfo for Vcs {
        fn revision(&self) -> String;
        fn branch(&self) -> String;
    }
}

// ── resolve ──

#[test]
fn default_appends_latest_when_untagged() {
    assert_eq!(resolve(TagFormat::Default, "img", "x", "y"), "img:latest");
}

#[test]
fn default_keeps_existing_tag() {
    assert_eq!(resolve(TagFormat::Default, "img:0.2", "x", "y"), "img:0.2");
}

#[test]
fn sha_appends_revision_to_tag() {
    assert_eq!(resolve(TagFormat::Sha, "img:0.2", "abc", "y"), "img:0.2-abc");
}

#[test]
fn branch_and_sha_appends_branch_then_revision() {
    assert_eq!(
        resolve(TagFormat::BranchAndSha, "img", "abc", "master"),
        "img:latest-master-abc"
    );
}

#[test]
fn registry_port_is_not_mistaken_for_tag() {
    assert_eq!(
        resolve(TagFormat::Default, "localhost:5000/team/img", "", ""),
        "localhost:5000/team/img:latest"
    );
    assert_eq!(
        resolve(TagFormat::Sha, "localhost:5000/img:1.0", "f00", ""),
        "localhost:5000/img:1.0-f00"
    );
}

#[test]
fn empty_values_are_opaque() {
    assert_eq!(resolve(TagFormat::BranchAndSha, "img", "", ""), "img:latest--");
}

proptest! {
    #[test]
    fn resolve_is_deterministic(
        image in "[a-z0-9./:-]{1,40}",
        revision in "[a-f0-9]{0,12}",
        branch in "[a-z0-9/_-]{0,20}",
        format in prop_oneof![
            Just(TagFormat::Default),
            Just(TagFormat::Sha),
            Just(TagFormat::BranchAndSha),
        ],
    ) {
        let first = resolve(format, &image, &revision, &branch);
        let second = resolve(format, &image, &revision, &branch);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.starts_with(&image));
    }

    #[test]
    fn default_output_always_carries_a_tag(image in "[a-z0-9.-]{1,20}(/[a-z0-9.-]{1,20}){0,2}") {
        let resolved = resolve(TagFormat::Default, &image, "", "");
        let last = resolved.rsplit('/').next().unwrap();
        prop_assert!(last.contains(':'));
    }
}

// ── TagFormat parsing ──

#[test]
fn tag_format_parses_cli_names() {
    assert_eq!("latest".parse::<TagFormat>().unwrap(), TagFormat::Default);
    assert_eq!("".parse::<TagFormat>().unwrap(), TagFormat::Default);
    assert_eq!("SHA".parse::<TagFormat>().unwrap(), TagFormat::Sha);
    assert_eq!("branch".parse::<TagFormat>().unwrap(), TagFormat::BranchAndSha);
    assert!(matches!(
        "describe".parse::<TagFormat>(),
        Err(Error::UnknownTagFormat(_))
    ));
}

#[test]
fn tag_format_display_round_trips_through_parse() {
    for format in [TagFormat::Default, TagFormat::Sha, TagFormat::BranchAndSha] {
        assert_eq!(format.to_string().parse::<TagFormat>().unwrap(), format);
    }
}

// ── TagValues ──

#[test]
fn default_format_does_not_query_vcs() {
    let vcs = MockVcs::new();
    let values = TagValues::for_format(TagFormat::Default, &vcs).unwrap();

    assert_eq!(values, TagValues::default());
}

#[test]
fn sha_format_requires_revision() {
    let mut vcs = MockVcs::new();
    vcs.expect_revision().returning(String::new);

    let result = TagValues::for_format(TagFormat::Sha, &vcs);

    assert!(matches!(result, Err(Error::MissingRevision)));
}

#[test]
fn branch_format_requires_branch() {
    let mut vcs = MockVcs::new();
    vcs.expect_branch().returning(String::new);

    let result = TagValues::for_format(TagFormat::BranchAndSha, &vcs);

    assert!(matches!(result, Err(Error::MissingBranch)));
}

#[test]
fn branch_format_resolves_with_captured_values() {
    let mut vcs = MockVcs::new();
    vcs.expect_branch().times(1).returning(|| "main".to_owned());
    vcs.expect_revision().times(1).returning(|| "1a2b3c4".to_owned());

    let values = TagValues::for_format(TagFormat::BranchAndSha, &vcs).unwrap();

    assert_eq!(
        values.resolve(TagFormat::BranchAndSha, "ghcr.io/acme/fn"),
        "ghcr.io/acme/fn:latest-main-1a2b3c4"
    );
}
