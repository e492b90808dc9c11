//! Shared fixtures for integration tests

#![allow(dead_code)]

use assert_fs::prelude::*;

/// The canonical three-file knowledge base:
/// `generic/a.md`, `platforms/aws/b.md`, `context/c.md`.
pub fn make_kb_fixture() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("generic/a.md")
        .write_str(
            "# Alpha\n\
             \n\
             **Version:** 4.2\n\
             **REF-ID:** GEN-01\n\
             **Category:** core\n\
             ---\n\
             See knowledge/base.md for details.\n",
        )
        .expect("write a.md");

    tmp.child("platforms/aws/b.md")
        .write_str(
            "# Lambda\n\
             **REF-ID:** AWS-07\n\
             **Category:** compute\n\
             ---\n\
             body\n",
        )
        .expect("write b.md");

    tmp.child("context/c.md")
        .write_str("# Context\n\nNo header here.\n")
        .expect("write c.md");

    tmp
}

/// Paths of every file node in a UI forest, depth-first
pub fn ui_file_paths(nodes: &[kbtree::core::UiTreeNode]) -> Vec<String>
{
    let mut out = Vec::new();
    for n in nodes
    {
        n.file_paths(&mut out);
    }
    out.into_iter().map(String::from).collect()
}
