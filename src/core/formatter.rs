//! Normalizes a [`ScanTree`] into display-ready [`UiTreeNode`]s.

use crate::core::model::{DirectoryNode, ScanTree, UiTreeNode};
use crate::infra::config::FormatConfig;

pub struct TreeFormatter {
    config: FormatConfig,
}

impl TreeFormatter {
    pub fn new(config: &FormatConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Root files first, then the promoted top-level directories in stored
    /// order.
    pub fn format_for_ui(&self, tree: &ScanTree) -> Vec<UiTreeNode> {
        if tree.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(root) = &tree.root {
            out.extend(root.files.iter().map(UiTreeNode::from));
        }

        for (key, node) in &tree.directories {
            if self.should_promote(tree, key, node) {
                out.push(format_directory(key, node));
            }
        }

        out
    }

    fn should_promote(&self, tree: &ScanTree, key: &str, node: &DirectoryNode) -> bool {
        if self.config.is_domain(key) || self.config.is_support(key) {
            return true;
        }
        // Nodes anchored at the base are never hidden
        node.path == key || !self.is_subdirectory_of_any(tree, key)
    }

    /// Whether `name` appears at any depth under a recognized top-level
    /// directory present in the scan.
    pub fn is_subdirectory_of_any(&self, tree: &ScanTree, name: &str) -> bool {
        tree.directories.iter().any(|(key, node)| {
            key != name
                && (self.config.is_domain(key) || self.config.is_support(key))
                && node.has_subdirectory(name)
        })
    }
}

fn format_directory(name: &str, node: &DirectoryNode) -> UiTreeNode {
    let mut children: Vec<UiTreeNode> = node.files.iter().map(UiTreeNode::from).collect();
    children.extend(
        node.subdirectories
            .iter()
            .map(|(sub_name, sub)| format_directory(sub_name, sub)),
    );

    UiTreeNode::Directory {
        name: name.to_string(),
        path: node.path.clone(),
        file_count: node.files.len(),
        total_files: node.total_files(),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{FileEntry, ROOT_BUCKET};
    use indexmap::IndexMap;

    fn file(rel: &str) -> FileEntry {
        let name = rel.rsplit('/').next().unwrap_or(rel).to_string();
        FileEntry::new(name, rel.to_string(), 10, 0)
    }

    fn dir(path: &str, files: &[&str]) -> DirectoryNode {
        DirectoryNode {
            path: path.to_string(),
            files: files.iter().map(|f| file(f)).collect(),
            subdirectories: IndexMap::new(),
        }
    }

    fn tree(root: Option<DirectoryNode>, dirs: Vec<(&str, DirectoryNode)>) -> ScanTree {
        ScanTree {
            base_path: "/kb".into(),
            scan_timestamp: "2025-01-01T00:00:00+00:00".into(),
            total_files: 0,
            total_directories: 0,
            root,
            directories: dirs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn formatter() -> TreeFormatter {
        TreeFormatter::new(&FormatConfig::default())
    }

    #[test]
    fn empty_tree_formats_to_nothing() {
        assert!(formatter().format_for_ui(&tree(None, vec![])).is_empty());
    }

    #[test]
    fn root_files_come_first_then_dirs() {
        let mut platforms = dir("platforms", &[]);
        platforms
            .subdirectories
            .insert("aws".into(), dir("platforms/aws", &["platforms/aws/b.md"]));

        let t = tree(
            Some(dir(ROOT_BUCKET, &["index.md"])),
            vec![
                ("generic", dir("generic", &["generic/a.md"])),
                ("platforms", platforms),
            ],
        );
        let ui = formatter().format_for_ui(&t);

        let names: Vec<_> = ui.iter().map(UiTreeNode::name).collect();
        assert_eq!(names, ["index.md", "generic", "platforms"]);

        match &ui[2] {
            UiTreeNode::Directory {
                file_count,
                total_files,
                children,
                ..
            } => {
                assert_eq!((*file_count, *total_files), (0, 1));
                assert_eq!(children[0].path(), "platforms/aws");
            }
            other => panic!("expected directory, got {other:?}"),
        }
    }

    #[test]
    fn hoisted_nested_node_is_not_listed_twice() {
        let mut platforms = dir("platforms", &[]);
        platforms
            .subdirectories
            .insert("aws".into(), dir("platforms/aws", &["platforms/aws/b.md"]));

        // A merged tree that also carries the nested node at the top level
        let t = tree(
            None,
            vec![
                ("platforms", platforms),
                ("aws", dir("platforms/aws", &["platforms/aws/b.md"])),
            ],
        );
        let ui = formatter().format_for_ui(&t);
        assert_eq!(ui.len(), 1);
        assert_eq!(ui[0].name(), "platforms");
    }

    #[test]
    fn anchored_dir_sharing_a_nested_name_is_kept() {
        let mut generic = dir("generic", &[]);
        generic
            .subdirectories
            .insert("notes".into(), dir("generic/notes", &["generic/notes/a.md"]));

        let t = tree(
            None,
            vec![("generic", generic), ("notes", dir("notes", &["notes/b.md"]))],
        );
        let ui = formatter().format_for_ui(&t);

        let mut paths = Vec::new();
        for node in &ui {
            node.file_paths(&mut paths);
        }
        assert_eq!(paths, ["generic/notes/a.md", "notes/b.md"]);
    }
}
