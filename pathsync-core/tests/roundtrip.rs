//! Persist/load round trips for the manifest.
//!
//! Each `#[case]` is isolated: no shared state.

use chrono::{TimeZone, Utc};
use pathsync_core::{manifest, Manifest, PathRecord, RelPath};
use rstest::rstest;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rel(s: &str) -> RelPath {
    RelPath::parse(s).expect("valid path")
}

fn single_file() -> Manifest {
    [PathRecord::file(rel("a.txt"), "0a1b", 4, None)]
        .into_iter()
        .collect()
}

fn nested_tree() -> Manifest {
    let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
        + chrono::Duration::nanoseconds(123_456_789);
    let mut m: Manifest = [
        PathRecord::directory(rel("docs"), Some(when)),
        PathRecord::directory(rel("docs/img"), None),
        PathRecord::file(rel("docs/img/logo.png"), "ffee", 2048, Some(when)),
        PathRecord::file(rel("docs/readme.md"), "c0ffee", 17, Some(when)),
    ]
    .into_iter()
    .collect();
    m.synced_at = Some(when);
    m
}

fn unicode_names() -> Manifest {
    [
        PathRecord::file(rel("データ/ファイル.txt"), "01", 1, None),
        PathRecord::file(rel("проект/файл с пробелом.md"), "02", 2, None),
        PathRecord::file(rel("emoji/🚀.bin"), "03", 3, None),
    ]
    .into_iter()
    .collect()
}

fn many_entries() -> Manifest {
    (0..500)
        .map(|i| PathRecord::file(rel(&format!("bulk/{:02}/f{i:03}.dat", i % 37)), format!("{i:064x}"), i, None))
        .collect()
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[rstest]
#[case("single_file", single_file())]
#[case("nested_tree", nested_tree())]
#[case("unicode_names", unicode_names())]
#[case("many_entries", many_entries())]
fn persist_then_load_is_identity(#[case] label: &str, #[case] original: Manifest) {
    let root = TempDir::new().expect("root");
    manifest::persist_at(root.path(), &original)
        .unwrap_or_else(|e| panic!("[{label}] persist failed: {e}"));
    let loaded = manifest::load_at(root.path())
        .unwrap_or_else(|e| panic!("[{label}] load failed: {e}"));
    assert_eq!(loaded, original, "[{label}] manifest changed across persist/load");
}

#[test]
fn second_persist_overwrites_in_place() {
    let root = TempDir::new().expect("root");
    manifest::persist_at(root.path(), &many_entries()).expect("first persist");
    manifest::persist_at(root.path(), &single_file()).expect("second persist");

    let loaded = manifest::load_at(root.path()).expect("load");
    assert_eq!(loaded, single_file());
}
