//! Filepath: src/infra/walk.rs
//! Sampling file walker used by version assessment.
//! - Suffix filter on file names (e.g. ".md")
//! - Directory pruning by exact name and by glob
//! - Optional hidden file policy, following symlinks, and max depth
//! - Deterministic ordering, then an optional cap on the result
//!
//! Backed by ripgrep's `ignore` crate and `globset`. Ignore files are not
//! consulted: a knowledge base is scanned as it sits on disk.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use tracing::debug;

use crate::error::{KbError, Result};

pub struct FileWalker
{
    /// Compiled set of directory globs to prune
    exclude_globs: GlobSet,

    /// Directory names pruned by exact match
    exclude_dirs: Vec<String>,

    /// Accepted file name suffixes; empty accepts everything
    extensions: Vec<String>,

    /// Include hidden (dot) entries; default false
    include_hidden: bool,

    /// Follow symbolic links; default false
    follow_symlinks: bool,

    /// Maximum recursion depth; default None (unbounded)
    max_depth: Option<usize>,

    /// Cap on returned paths, applied after sorting
    limit: Option<usize>,
}

impl FileWalker
{
    /// Build a walker pruning directories that match any of `exclude_globs`
    /// (e.g. "**/archive", "drafts/**").
    pub fn new(exclude_globs: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in exclude_globs
        {
            let glob = Glob::new(pattern).map_err(|e| KbError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }

        let exclude_globs = builder
            .build()
            .map_err(|e| KbError::InvalidGlob {
                pattern: exclude_globs.join(","),
                reason: e.to_string(),
            })?;

        Ok(Self {
            exclude_globs,
            exclude_dirs: Vec::new(),
            extensions: Vec::new(),
            include_hidden: false,
            follow_symlinks: false,
            max_depth: None,
            limit: None,
        })
    }

    /// Keep only files whose name ends with one of `extensions`.
    pub fn with_extensions(
        mut self,
        extensions: &[String],
    ) -> Self
    {
        self.extensions = extensions.to_vec();
        self
    }

    /// Prune directories with these exact names.
    pub fn with_exclude_dirs(
        mut self,
        names: &[String],
    ) -> Self
    {
        self.exclude_dirs = names.to_vec();
        self
    }

    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_follow_symlinks(
        mut self,
        follow: bool,
    ) -> Self
    {
        self.follow_symlinks = follow;
        self
    }

    /// (Optional) Limit recursion depth (`None` = unbounded).
    pub fn with_max_depth(
        mut self,
        depth: Option<usize>,
    ) -> Self
    {
        self.max_depth = depth;
        self
    }

    /// (Optional) Return at most `limit` paths.
    pub fn with_limit(
        mut self,
        limit: Option<usize>,
    ) -> Self
    {
        self.limit = limit;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // No .gitignore / .ignore handling; hidden policy is ours
        b.standard_filters(false);
        b.hidden(!self.include_hidden);

        b.follow_links(self.follow_symlinks);
        b.max_depth(self.max_depth);

        let globs = self
            .exclude_globs
            .clone();
        let names = self
            .exclude_dirs
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            if !is_dir || ent.depth() == 0
            {
                return true;
            }

            let name = ent
                .file_name()
                .to_string_lossy();
            if names
                .iter()
                .any(|n| *n == name)
            {
                return false;
            }

            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());
            !globs.is_match(rel)
        });

        b
    }

    fn accepts(
        &self,
        path: &Path,
    ) -> bool
    {
        if self
            .extensions
            .is_empty()
        {
            return true;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }

    /// Traverse files under `root`. Returns a **sorted** list, truncated to
    /// the configured limit.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            .filter_map(|res| match res
            {
                Ok(entry) => Some(entry),
                Err(err) =>
                {
                    debug!(%err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            .filter(|p| self.accepts(p))
            .collect();

        // Deterministic order (stable CLI & tests)
        out.sort();

        if let Some(limit) = self.limit
        {
            out.truncate(limit);
        }

        out
    }
}
