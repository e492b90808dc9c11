//! Recursive, depth-bounded directory scan into a [`ScanTree`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, instrument};

use crate::core::metadata::MetadataExtractor;
use crate::core::model::{DirectoryNode, FileEntry, ROOT_BUCKET, ScanTree};
use crate::error::{KbError, Result};
use crate::infra::config::{Config, ScanConfig, ScanOverrides};

pub struct TreeScanner {
    config: ScanConfig,
    extractor: MetadataExtractor,
}

/// Per-scan state
struct ScanState<'a> {
    opts: &'a ScanConfig,
    /// Canonical directories from the base down to the current one
    ancestors: HashSet<PathBuf>,
}

impl TreeScanner {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            config: config.scan.clone(),
            extractor: MetadataExtractor::new(&config.metadata)?,
        })
    }

    #[instrument(skip_all, fields(base = %base.display()))]
    pub fn scan_complete(&self, base: &Path, overrides: &ScanOverrides) -> Result<ScanTree> {
        let opts = self.config.merged(overrides);
        let not_readable = || KbError::NotReadable {
            path: base.to_path_buf(),
        };

        if !base.is_dir() {
            return Err(not_readable());
        }
        let canonical = dunce::canonicalize(base).map_err(|_| not_readable())?;
        let (files, dirs) = list_dir(base, &opts).map_err(|_| not_readable())?;

        let mut state = ScanState {
            opts: &opts,
            ancestors: HashSet::from([canonical.clone()]),
        };

        let root_files: Vec<FileEntry> = files
            .iter()
            .filter_map(|name| self.file_entry(base, name, None, &opts))
            .collect();

        let mut total_files = root_files.len();
        let mut total_directories = 0;

        let root = if root_files.is_empty() {
            None
        } else {
            total_directories += 1;
            Some(DirectoryNode {
                path: ROOT_BUCKET.to_string(),
                files: root_files,
                ..Default::default()
            })
        };

        let mut directories = indexmap::IndexMap::new();
        for name in dirs {
            let Some(node) = self.scan_dir(&base.join(&name), &name, 0, &mut state) else {
                continue;
            };
            if node.is_empty() {
                continue;
            }
            total_files += node.total_files();
            total_directories += node.total_directories();
            directories.insert(name, node);
        }

        debug!(total_files, total_directories, "scan finished");

        Ok(ScanTree {
            base_path: canonical.to_string_lossy().into_owned(),
            scan_timestamp: chrono::Utc::now().to_rfc3339(),
            total_files,
            total_directories,
            root,
            directories,
        })
    }

    fn scan_dir(
        &self,
        path: &Path,
        rel: &str,
        depth: usize,
        state: &mut ScanState<'_>,
    ) -> Option<DirectoryNode> {
        if depth >= state.opts.max_depth {
            return None;
        }

        let canonical = match dunce::canonicalize(path) {
            Ok(c) if c.is_dir() => c,
            _ => {
                debug!(path = %path.display(), "not a readable directory");
                return None;
            }
        };
        if !state.ancestors.insert(canonical.clone()) {
            debug!(path = %path.display(), "symlink cycle");
            return None;
        }
        let node = self.scan_entered(path, rel, depth, state);
        state.ancestors.remove(&canonical);
        node
    }

    /// Body of [`Self::scan_dir`] once `path` is on the ancestor chain.
    fn scan_entered(
        &self,
        path: &Path,
        rel: &str,
        depth: usize,
        state: &mut ScanState<'_>,
    ) -> Option<DirectoryNode> {
        let (files, dirs) = match list_dir(path, state.opts) {
            Ok(listing) => listing,
            Err(err) => {
                debug!(path = %path.display(), %err, "skipping unreadable directory");
                return None;
            }
        };

        let mut node = DirectoryNode::new(rel);
        node.files = files
            .iter()
            .filter_map(|name| self.file_entry(path, name, Some(rel), state.opts))
            .collect();

        for name in dirs {
            let child_rel = format!("{rel}/{name}");
            if let Some(child) = self.scan_dir(&path.join(&name), &child_rel, depth + 1, state)
                && !child.is_empty()
            {
                node.subdirectories.insert(name, child);
            }
        }

        Some(node)
    }

    fn file_entry(
        &self,
        dir: &Path,
        name: &str,
        rel_dir: Option<&str>,
        opts: &ScanConfig,
    ) -> Option<FileEntry> {
        let path = dir.join(name);
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(err) => {
                debug!(path = %path.display(), %err, "skipping unreadable file");
                return None;
            }
        };

        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let relative_path = match rel_dir {
            Some(d) => format!("{d}/{name}"),
            None => name.to_string(),
        };

        let entry = FileEntry::new(name.to_string(), relative_path, meta.len(), modified);
        Some(if opts.include_metadata {
            entry.with_header(self.extractor.extract(&path))
        } else {
            entry
        })
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Accepted file names and accepted subdirectory names, each sorted.
fn list_dir(path: &Path, opts: &ScanConfig) -> std::io::Result<(Vec<String>, Vec<String>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                debug!(dir = %path.display(), %err, "skipping entry");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) && !opts.include_hidden {
            continue;
        }

        // Follows symlinks
        let full = entry.path();
        if full.is_dir() {
            if !opts.exclude_dirs.iter().any(|d| *d == name) {
                dirs.push(name);
            }
        } else if full.is_file()
            && opts
                .file_extensions
                .iter()
                .any(|ext| name.ends_with(ext.as_str()))
        {
            files.push(name);
        }
    }

    files.sort();
    dirs.sort();
    Ok((files, dirs))
}
