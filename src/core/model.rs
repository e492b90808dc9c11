//! Raw scan tree and the UI tree derived from it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::metadata::HeaderFields;

/// Key and path of the synthetic bucket holding files directly under the base
pub const ROOT_BUCKET: &str = "root";

/// One scanned file; a snapshot taken at scan time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    /// Relative to the scan root, forward slashes
    pub relative_path: String,
    pub size: u64,
    /// Seconds since the UNIX epoch
    pub modified: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl FileEntry {
    pub fn new(filename: String, relative_path: String, size: u64, modified: u64) -> Self {
        Self {
            filename,
            relative_path,
            size,
            modified,
            version: None,
            ref_id: None,
            category: None,
            purpose: None,
        }
    }

    pub fn with_header(mut self, header: HeaderFields) -> Self {
        self.version = header.version;
        self.ref_id = header.ref_id;
        self.category = header.category;
        self.purpose = header.purpose;
        self
    }

    /// First path segment, or `None` for files at the root
    pub fn domain(&self) -> Option<&str> {
        self.relative_path
            .split_once('/')
            .map(|(first, _)| first)
    }

    /// Parent directory of `relative_path`, or `None` at the root
    pub fn parent_dir(&self) -> Option<&str> {
        self.relative_path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
    }

    /// Extension without the dot
    pub fn extension(&self) -> Option<&str> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// Relative to the scan root
    pub path: String,
    pub files: Vec<FileEntry>,
    pub subdirectories: IndexMap<String, DirectoryNode>,
}

impl DirectoryNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.subdirectories.is_empty()
    }

    /// Files here and in every descendant
    pub fn total_files(&self) -> usize {
        self.files.len()
            + self
                .subdirectories
                .values()
                .map(DirectoryNode::total_files)
                .sum::<usize>()
    }

    /// This directory plus every descendant
    pub fn total_directories(&self) -> usize {
        1 + self
            .subdirectories
            .values()
            .map(DirectoryNode::total_directories)
            .sum::<usize>()
    }

    /// Depth-first, files before subdirectories
    pub fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileEntry>) {
        out.extend(self.files.iter());
        for sub in self.subdirectories.values() {
            sub.collect_files(out);
        }
    }

    /// Recursive lookup of a subdirectory key anywhere below this node
    pub fn has_subdirectory(&self, name: &str) -> bool {
        self.subdirectories
            .iter()
            .any(|(key, sub)| key == name || sub.has_subdirectory(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTree {
    pub base_path: String,
    /// RFC3339
    pub scan_timestamp: String,
    pub total_files: usize,
    pub total_directories: usize,
    /// Files directly under the base; path is always [`ROOT_BUCKET`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<DirectoryNode>,
    pub directories: IndexMap<String, DirectoryNode>,
}

impl ScanTree {
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.directories.is_empty()
    }

    /// Root bucket first, then each directory depth-first
    pub fn flat_files(&self) -> Vec<&FileEntry> {
        let mut out = Vec::with_capacity(self.total_files);
        if let Some(root) = &self.root {
            root.collect_files(&mut out);
        }
        for dir in self.directories.values() {
            dir.collect_files(&mut out);
        }
        out
    }
}

/// Display-ready node; serialized with a `"type"` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UiTreeNode {
    Directory {
        name: String,
        path: String,
        /// Direct files only
        file_count: usize,
        /// Recursive
        total_files: usize,
        children: Vec<UiTreeNode>,
    },
    File {
        name: String,
        path: String,
        size: u64,
        modified: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ref_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        purpose: Option<String>,
    },
}

impl UiTreeNode {
    pub fn name(&self) -> &str {
        match self {
            UiTreeNode::Directory { name, .. } | UiTreeNode::File { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            UiTreeNode::Directory { path, .. } | UiTreeNode::File { path, .. } => path,
        }
    }

    pub fn children(&self) -> &[UiTreeNode] {
        match self {
            UiTreeNode::Directory { children, .. } => children,
            UiTreeNode::File { .. } => &[],
        }
    }

    /// Paths of every file node at or below this one
    pub fn file_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            UiTreeNode::File { path, .. } => out.push(path),
            UiTreeNode::Directory { children, .. } => {
                for child in children {
                    child.file_paths(out);
                }
            }
        }
    }
}

impl From<&FileEntry> for UiTreeNode {
    fn from(f: &FileEntry) -> Self {
        UiTreeNode::File {
            name: f.filename.clone(),
            path: f.relative_path.clone(),
            size: f.size,
            modified: f.modified,
            version: f.version.clone(),
            ref_id: f.ref_id.clone(),
            category: f.category.clone(),
            purpose: f.purpose.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(rel: &str) -> FileEntry {
        let name = rel.rsplit('/').next().unwrap_or(rel).to_string();
        FileEntry::new(name, rel.to_string(), 1, 0)
    }

    #[test]
    fn path_helpers() {
        let f = file("platforms/aws/lambda.md");
        assert_eq!(f.domain(), Some("platforms"));
        assert_eq!(f.parent_dir(), Some("platforms/aws"));
        assert_eq!(f.extension(), Some("md"));

        let r = file("README");
        assert_eq!(r.domain(), None);
        assert_eq!(r.parent_dir(), None);
        assert_eq!(r.extension(), None);
    }

    #[test]
    fn ui_node_is_type_tagged() {
        let node = UiTreeNode::from(&file("a.md"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["path"], "a.md");
        assert!(json.get("version").is_none());
    }
}
