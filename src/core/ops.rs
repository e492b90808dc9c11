//! Grouping, filtering and statistics over a scanned tree.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

use crate::core::model::{DirectoryNode, FileEntry, ROOT_BUCKET, ScanTree};
use crate::error::{KbError, Result};
use crate::infra::config::FormatConfig;

const UNGROUPED: &str = "ungrouped";
const UNKNOWN_EXT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// Parent directory of the file
    Directory,
    /// Header category
    Category,
    /// First path segment
    Domain,
    /// File extension
    Extension,
    /// `domain/sub` under domain directories, else the first segment
    Section,
}

/// Unset or empty criteria do not filter.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    pub category: Option<String>,
    pub domain: Option<String>,
    pub has_ref_id: bool,
    pub has_version: bool,
    /// Regex tested against the file name
    pub filename_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub total_files: usize,
    pub total_directories: usize,
    pub by_domain: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_extension: BTreeMap<String, usize>,
    pub with_ref_id: usize,
    pub with_version: usize,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.is_empty())
}

/// Compiled form of [`FilterCriteria`]
struct FileMatcher<'a> {
    category: Option<&'a str>,
    domain: Option<&'a str>,
    has_ref_id: bool,
    has_version: bool,
    pattern: Option<Regex>,
}

impl<'a> FileMatcher<'a> {
    fn new(criteria: &'a FilterCriteria) -> Result<Self> {
        let pattern = non_empty(&criteria.filename_pattern)
            .map(|p| Regex::new(p).map_err(|e| KbError::pattern(p, e)))
            .transpose()?;

        Ok(Self {
            category: non_empty(&criteria.category),
            domain: non_empty(&criteria.domain),
            has_ref_id: criteria.has_ref_id,
            has_version: criteria.has_version,
            pattern,
        })
    }

    fn matches(&self, f: &FileEntry) -> bool {
        if let Some(c) = self.category
            && f.category.as_deref() != Some(c)
        {
            return false;
        }
        if let Some(d) = self.domain
            && f.domain() != Some(d)
        {
            return false;
        }
        if self.has_ref_id && non_empty(&f.ref_id).is_none() {
            return false;
        }
        if self.has_version && non_empty(&f.version).is_none() {
            return false;
        }
        self.pattern
            .as_ref()
            .is_none_or(|re| re.is_match(&f.filename))
    }

    /// Bottom-up prune; `None` when nothing under `node` survives.
    fn prune(&self, node: &DirectoryNode) -> Option<DirectoryNode> {
        let files: Vec<FileEntry> = node
            .files
            .iter()
            .filter(|f| self.matches(f))
            .cloned()
            .collect();
        let subdirectories: IndexMap<String, DirectoryNode> = node
            .subdirectories
            .iter()
            .filter_map(|(k, sub)| self.prune(sub).map(|s| (k.clone(), s)))
            .collect();

        let pruned = DirectoryNode {
            path: node.path.clone(),
            files,
            subdirectories,
        };
        (!pruned.is_empty()).then_some(pruned)
    }
}

pub struct FileListOperations {
    format: FormatConfig,
}

impl FileListOperations {
    pub fn new(format: &FormatConfig) -> Self {
        Self {
            format: format.clone(),
        }
    }

    /// Root bucket first, then each directory depth-first, files before
    /// subdirectories.
    pub fn flat_files<'a>(&self, tree: &'a ScanTree) -> Vec<&'a FileEntry> {
        tree.flat_files()
    }

    /// Single pass; every file lands in exactly one bucket.
    pub fn group_by<'a>(
        &self,
        files: &[&'a FileEntry],
        by: GroupBy,
    ) -> IndexMap<String, Vec<&'a FileEntry>> {
        let mut groups: IndexMap<String, Vec<&'a FileEntry>> = IndexMap::new();
        for &f in files {
            groups.entry(self.group_key(f, by)).or_default().push(f);
        }
        groups
    }

    fn group_key(&self, f: &FileEntry, by: GroupBy) -> String {
        match by {
            GroupBy::Directory => f.parent_dir().unwrap_or(ROOT_BUCKET).to_string(),
            GroupBy::Category => non_empty(&f.category).unwrap_or(UNGROUPED).to_string(),
            GroupBy::Domain => f.domain().unwrap_or(ROOT_BUCKET).to_string(),
            GroupBy::Extension => f.extension().unwrap_or(UNKNOWN_EXT).to_string(),
            GroupBy::Section => {
                let Some(parent) = f.parent_dir() else {
                    return ROOT_BUCKET.to_string();
                };
                let mut segments = parent.split('/');
                let first = segments.next().unwrap_or(ROOT_BUCKET);
                match segments.next() {
                    Some(second) if self.format.is_domain(first) => format!("{first}/{second}"),
                    _ => first.to_string(),
                }
            }
        }
    }

    /// Files matching every supplied criterion, with empty directories pruned
    /// and totals recomputed.
    pub fn filter_tree(&self, tree: &ScanTree, criteria: &FilterCriteria) -> Result<ScanTree> {
        let matcher = FileMatcher::new(criteria)?;

        let root = tree.root.as_ref().and_then(|r| matcher.prune(r));
        let directories: IndexMap<String, DirectoryNode> = tree
            .directories
            .iter()
            .filter_map(|(k, node)| matcher.prune(node).map(|n| (k.clone(), n)))
            .collect();

        let total_files = root.as_ref().map_or(0, |r| r.files.len())
            + directories
                .values()
                .map(DirectoryNode::total_files)
                .sum::<usize>();
        let total_directories = usize::from(root.is_some())
            + directories
                .values()
                .map(DirectoryNode::total_directories)
                .sum::<usize>();

        Ok(ScanTree {
            base_path: tree.base_path.clone(),
            scan_timestamp: tree.scan_timestamp.clone(),
            total_files,
            total_directories,
            root,
            directories,
        })
    }

    pub fn generate_stats(&self, tree: &ScanTree) -> TreeStats {
        let files = tree.flat_files();
        let mut stats = TreeStats {
            total_files: files.len(),
            total_directories: tree.total_directories,
            ..Default::default()
        };

        for f in files {
            *stats
                .by_domain
                .entry(f.domain().unwrap_or(ROOT_BUCKET).to_string())
                .or_default() += 1;
            *stats
                .by_extension
                .entry(f.extension().unwrap_or(UNKNOWN_EXT).to_string())
                .or_default() += 1;
            if let Some(c) = non_empty(&f.category) {
                *stats.by_category.entry(c.to_string()).or_default() += 1;
            }
            if non_empty(&f.ref_id).is_some() {
                stats.with_ref_id += 1;
            }
            if non_empty(&f.version).is_some() {
                stats.with_version += 1;
            }
        }

        stats
    }
}
