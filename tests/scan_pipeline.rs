//! Scan -> format -> query, end to end over real directories.

mod util;

use std::collections::BTreeSet;
use std::fs;

use assert_fs::prelude::*;
use proptest::prelude::*;

use kbtree::core::metadata::MetadataExtractor;
use kbtree::core::model::{ScanTree, UiTreeNode};
use kbtree::core::{FileListOperations, FilterCriteria, TreeFormatter, TreeScanner};
use kbtree::infra::config::{Config, MetadataConfig, ScanOverrides};

fn scan(root: &std::path::Path, overrides: &ScanOverrides) -> ScanTree {
    TreeScanner::new(&Config::default())
        .expect("scanner")
        .scan_complete(root, overrides)
        .expect("scan")
}

fn format(tree: &ScanTree) -> Vec<UiTreeNode> {
    TreeFormatter::new(&Config::default().format).format_for_ui(tree)
}

#[test]
fn fixture_formats_into_three_top_level_nodes() {
    let kb = util::make_kb_fixture();
    let tree = scan(kb.path(), &ScanOverrides::default());
    let ui = format(&tree);

    let names: Vec<_> = ui.iter().map(UiTreeNode::name).collect();
    assert_eq!(names, ["context", "generic", "platforms"]);

    match &ui[1] {
        UiTreeNode::Directory { total_files, .. } => assert_eq!(*total_files, 1),
        other => panic!("expected generic directory, got {other:?}"),
    }

    let stats = FileListOperations::new(&Config::default().format).generate_stats(&tree);
    let by_domain: Vec<_> = stats
        .by_domain
        .iter()
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    assert_eq!(by_domain, [("context", 1), ("generic", 1), ("platforms", 1)]);
    assert_eq!(stats.with_version, 1);
    assert_eq!(stats.with_ref_id, 2);
}

#[test]
fn every_matching_file_appears_exactly_once() {
    let kb = util::make_kb_fixture();
    kb.child("README.md").write_str("# top").unwrap();
    kb.child("platforms/aws/deep/x/y.md").write_str("").unwrap();
    kb.child("platforms/aws/ignored.txt").write_str("").unwrap();
    kb.child("node_modules/z.md").write_str("").unwrap();

    let tree = scan(kb.path(), &ScanOverrides::default());
    let paths = util::ui_file_paths(&format(&tree));

    let unique: BTreeSet<_> = paths.iter().cloned().collect();
    assert_eq!(unique.len(), paths.len(), "duplicates in {paths:?}");
    assert_eq!(
        unique,
        BTreeSet::from(
            [
                "README.md",
                "context/c.md",
                "generic/a.md",
                "platforms/aws/b.md",
                "platforms/aws/deep/x/y.md",
            ]
            .map(String::from)
        )
    );
    assert_eq!(tree.total_files, paths.len());
}

#[test]
fn nothing_beyond_max_depth_is_returned() {
    let kb = assert_fs::TempDir::new().unwrap();
    kb.child("l1/a.md").write_str("").unwrap();
    kb.child("l1/l2/b.md").write_str("").unwrap();
    kb.child("l1/l2/l3/c.md").write_str("").unwrap();
    kb.child("l1/l2/l3/l4/d.md").write_str("").unwrap();

    for depth in 1..=4 {
        let tree = scan(
            kb.path(),
            &ScanOverrides {
                max_depth: Some(depth),
                ..Default::default()
            },
        );
        for f in tree.flat_files() {
            let dirs = f.relative_path.matches('/').count();
            assert!(dirs <= depth, "{} beyond depth {depth}", f.relative_path);
        }
        assert_eq!(tree.total_files, depth);
    }
}

#[test]
fn header_with_early_marker_is_read_through() {
    let kb = assert_fs::TempDir::new().unwrap();
    let file = kb.child("lesson.md");
    file.write_str("**Version:** 1.2\n**REF-ID:** LESS-3\n---\nbody\nmore\n")
        .unwrap();

    let fields = MetadataExtractor::new(&MetadataConfig::default())
        .unwrap()
        .extract(file.path());
    assert_eq!(fields.version.as_deref(), Some("1.2"));
    assert_eq!(fields.ref_id.as_deref(), Some("LESS-3"));
    assert_eq!(fields.category, None);
    assert_eq!(fields.purpose, None);
}

#[test]
fn category_filter_prunes_unmatched_ancestors() {
    let kb = util::make_kb_fixture();
    let tree = scan(kb.path(), &ScanOverrides::default());

    let filtered = FileListOperations::new(&Config::default().format)
        .filter_tree(
            &tree,
            &FilterCriteria {
                category: Some("compute".into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(filtered.directories.keys().collect::<Vec<_>>(), ["platforms"]);
    assert_eq!(filtered.total_files, 1);
    assert_eq!(filtered.total_directories, 2);
    assert_eq!(
        util::ui_file_paths(&format(&filtered)),
        ["platforms/aws/b.md"]
    );
}

fn rel_path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "generic", "docs"]), 0..4).prop_flat_map(
        |dirs| {
            prop::sample::select(vec!["x.md", "y.md", "z.txt"]).prop_map(move |name| {
                let mut parts: Vec<&str> = dirs.clone();
                parts.push(name);
                parts.join("/")
            })
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn rescans_are_identical_and_totals_hold(paths in prop::collection::btree_set(rel_path(), 1..12)) {
        let kb = assert_fs::TempDir::new().unwrap();
        for p in &paths {
            let target = kb.path().join(p);
            // A name may already exist as a directory from another path
            if target.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                if fs::create_dir_all(parent).is_err() {
                    continue;
                }
            }
            let _ = fs::write(&target, "**Version:** 4.3\n");
        }

        let first = scan(kb.path(), &ScanOverrides::default());
        let second = scan(kb.path(), &ScanOverrides::default());

        prop_assert_eq!(&first.root, &second.root);
        prop_assert_eq!(&first.directories, &second.directories);
        prop_assert_eq!(first.total_files, second.total_files);
        prop_assert_eq!(first.total_directories, second.total_directories);

        let stats = FileListOperations::new(&Config::default().format).generate_stats(&first);
        prop_assert_eq!(stats.by_extension.values().sum::<usize>(), stats.total_files);
        prop_assert_eq!(stats.total_files, first.total_files);

        let ui_paths = util::ui_file_paths(&format(&first));
        let unique: BTreeSet<_> = ui_paths.iter().collect();
        prop_assert_eq!(unique.len(), first.total_files);
    }
}
