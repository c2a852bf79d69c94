//! Structural extraction over the Solidity fixtures, pinned with inline snapshots.

use std::path::PathBuf;

use fixtrace::core::changed_lines::{ChangedLineSet, Side};
use fixtrace::core::hunk::split_hunks;
use fixtrace::core::{CommitRecord, SourceFilter, analyze_commits, changed_units, scan_units};
use fixtrace::infra::io::{load_records, read_text};

fn fixture(name: &str) -> PathBuf
{
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn patch_lines(side: Side) -> ChangedLineSet
{
    let patch = read_text(fixture("vault.patch")).expect("patch");
    split_hunks(&patch)
        .iter()
        .flat_map(|h| h.changed_lines(side))
        .collect()
}

#[test]
fn scan_finds_every_unit_innermost_first()
{
    let src = read_text(fixture("Vault.sol")).unwrap();
    let units: Vec<(String, usize, usize)> = scan_units(&src)
        .iter()
        .map(|u| (u.qualified_name(), u.start_line, u.end_line))
        .collect();

    insta::assert_debug_snapshot!(units, @r#"
    [
        (
            "Vault::underCap",
            10,
            13,
        ),
        (
            "Vault::deposit",
            15,
            17,
        ),
        (
            "Vault::withdraw",
            19,
            24,
        ),
        (
            "Vault is Ownable",
            6,
            25,
        ),
    ]
    "#);
}

#[test]
fn after_side_reports_member_and_state_change()
{
    let src = read_text(fixture("Vault.sol")).unwrap();
    let changed = patch_lines(Side::New);
    assert_eq!(changed, ChangedLineSet::from([8, 21]));

    let units: Vec<(String, usize, usize)> = changed_units(&src, &changed)
        .iter()
        .map(|u| (u.qualified_name(), u.start_line, u.end_line))
        .collect();

    insta::assert_debug_snapshot!(units, @r#"
    [
        (
            "Vault::withdraw",
            19,
            24,
        ),
        (
            "Vault is Ownable",
            6,
            25,
        ),
    ]
    "#);
}

#[test]
fn before_side_uses_old_numbering()
{
    let src = read_text(fixture("Vault.before.sol")).unwrap();
    let changed = patch_lines(Side::Old);
    assert_eq!(changed, ChangedLineSet::from([22]));

    let names: Vec<String> = changed_units(&src, &changed)
        .iter()
        .map(|u| u.qualified_name())
        .collect();
    assert_eq!(names, vec!["Vault::withdraw"]);
}

#[test]
fn commit_fixture_analysis()
{
    let records: Vec<CommitRecord> = load_records(fixture("commits.json")).unwrap();
    let analyses = analyze_commits(&records, &SourceFilter::default(), true);

    let summary: Vec<(String, Vec<(String, Vec<String>, Vec<String>)>)> = analyses
        .into_iter()
        .map(|c| {
            let files = c
                .files
                .into_iter()
                .map(|f| (f.filename, f.units_before, f.units_after))
                .collect();
            (c.commit_id, files)
        })
        .collect();

    insta::assert_debug_snapshot!(summary, @r#"
    [
        (
            "github.com/acme/vault@a1b2c3d4e5f6",
            [
                (
                    "src/Vault.sol",
                    [
                        "Vault::withdraw",
                    ],
                    [
                        "Vault::withdraw",
                        "Vault is Ownable",
                    ],
                ),
            ],
        ),
        (
            "github.com/acme/vault@b2c3d4e5f6a7",
            [],
        ),
        (
            "github.com/acme/vault@c3d4e5f6a7b8",
            [
                (
                    "src/Token.sol",
                    [],
                    [
                        "mint",
                    ],
                ),
                (
                    "src/Treasury.sol",
                    [],
                    [
                        "sweep",
                    ],
                ),
            ],
        ),
    ]
    "#);
}
