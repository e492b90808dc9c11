//! **kbtree** - scan, version and package markdown knowledge bases
//!
//! Depth-bounded directory scanning with header metadata, a display-ready tree
//! normalization, structural version detection with a compatibility graph,
//! rule-based conversion, and staged export packages.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Typed library errors
pub mod error;

/// Core pipeline - scan, normalize, query, version and export
pub mod core {
    /// `**Field:** value` header extraction
    pub mod metadata;
    pub use metadata::{HeaderFields, MetadataExtractor};

    /// Scan tree data model and display nodes
    pub mod model;
    pub use model::{DirectoryNode, FileEntry, ScanTree, UiTreeNode};

    /// Recursive directory scan with cycle and depth guards
    pub mod scanner;
    pub use scanner::TreeScanner;

    /// Raw tree to UI tree normalization
    pub mod formatter;
    pub use formatter::TreeFormatter;

    /// Flatten, group, filter and summarize
    pub mod ops;
    pub use ops::{FileListOperations, FilterCriteria, GroupBy, TreeStats};

    /// Version detection, compatibility and conversion
    pub mod version;
    pub use version::{VersionCompatibility, VersionConverter, VersionDetector};

    /// Package building
    pub mod export;
    pub use export::{ExportReport, ExportRequest, Exporter};

    /// Tree command handlers
    pub mod tree;
    pub use tree::{VersionedScan, filter_run, group_run, run as scan_run, scan_with_version, stats_run};
}

/// Infrastructure - configuration, I/O, walking and logging
pub mod infra {
    /// Layered configuration with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped file I/O for large files (>1MB threshold)
    pub mod io;
    pub use io::{FileContent, read_file_smart};

    /// Sampled file walking for version assessment
    pub mod walk;
    pub use walk::FileWalker;

    /// Tracing subscriber setup
    pub mod logging;
}

// Re-exports for the binary
pub use cli::{AppContext, Cli, Commands};
pub use core::{filter_run, group_run, scan_run, stats_run};
pub use error::{KbError, Result};
pub use infra::{Config, load_config};
