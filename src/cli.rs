use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::ops::GroupBy;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "kbt")]
#[command(
    about = "A fast, lightweight CLI for scanning, versioning and packaging markdown knowledge bases"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors and requested data
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a knowledge base and print its tree
    Scan(ScanArgs),

    /// Summarize files by domain, category and extension
    Stats(StatsArgs),

    /// Print only files matching every criterion
    Filter(FilterArgs),

    /// Group the flat file list
    Group(GroupArgs),

    /// Detect, inspect and convert knowledge base versions
    Version(VersionArgs),

    /// Package selected files, converting them if needed
    Export(ExportArgs),

    /// Initialize a kbtree.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Scan options shared by every tree-reading command
#[derive(Args, Debug, Clone, Default)]
pub struct ScanOpts {
    /// Maximum directory depth below the base
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// File suffixes to include (repeatable), e.g. --ext .md
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Directory names to skip (repeatable)
    #[arg(long = "exclude", value_name = "DIR")]
    pub exclude_dirs: Vec<String>,

    /// Include dot-files and dot-directories
    #[arg(long)]
    pub hidden: bool,

    /// Skip header extraction
    #[arg(long)]
    pub no_metadata: bool,
}

#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Knowledge base root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub scan: ScanOpts,

    /// Also detect the knowledge base version; JSON becomes
    /// `{version, version_info, stats, base_path, tree}`
    #[arg(long)]
    pub with_version: bool,

    /// Report this version instead of the detected one; implies --with-version
    #[arg(long, value_name = "VERSION")]
    pub assume_version: Option<String>,

    /// Emit the UI tree as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Knowledge base root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub scan: ScanOpts,

    /// Emit JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct FilterArgs {
    /// Knowledge base root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub scan: ScanOpts,

    /// Exact header category
    #[arg(long)]
    pub category: Option<String>,

    /// First path segment, e.g. platforms
    #[arg(long)]
    pub domain: Option<String>,

    /// Only files carrying a REF-ID
    #[arg(long)]
    pub has_ref_id: bool,

    /// Only files carrying a version header
    #[arg(long)]
    pub has_version: bool,

    /// Regex matched against file names
    #[arg(long)]
    pub pattern: Option<String>,

    /// Emit the filtered UI tree as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct GroupArgs {
    /// Knowledge base root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub scan: ScanOpts,

    /// Grouping key
    #[arg(long, value_enum)]
    pub by: GroupBy,

    /// Emit JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct VersionArgs {
    #[command(subcommand)]
    pub command: VersionSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum VersionSubcommand {
    /// Detect the structural version of a knowledge base
    Detect(VersionDetectArgs),

    /// Show version, domains and support directories
    Info(VersionInfoArgs),

    /// Print the conversion path between two versions
    Path(VersionPathArgs),

    /// Compare two versions and report compatibility
    Check(VersionCheckArgs),

    /// List release features, or compare them between two versions
    Features(VersionFeaturesArgs),

    /// Convert files between versions
    Convert(VersionConvertArgs),
}

#[derive(Parser, Debug)]
pub struct VersionDetectArgs {
    /// Knowledge base root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Run every detection method and report confidences
    #[arg(long)]
    pub assess: bool,

    /// Emit JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct VersionInfoArgs {
    /// Knowledge base root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Emit JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct VersionPathArgs {
    pub from: String,
    pub to: String,
}

#[derive(Parser, Debug)]
pub struct VersionCheckArgs {
    pub v1: String,
    pub v2: String,

    /// Emit JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct VersionFeaturesArgs {
    pub version: String,

    /// Compare against this version
    pub other: Option<String>,

    /// Emit JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct VersionConvertArgs {
    /// Files to convert
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Target version
    #[arg(long)]
    pub to: String,

    /// Source version; read from each file's tags when omitted
    #[arg(long)]
    pub from: Option<String>,

    /// Output file for a single input; stdout when no destination is given
    #[arg(short, long, conflicts_with_all = ["out_dir", "in_place"])]
    pub output: Option<PathBuf>,

    /// Write each converted file into DIR under its own name
    #[arg(long, value_name = "DIR", conflicts_with = "in_place")]
    pub out_dir: Option<PathBuf>,

    /// Overwrite the input files
    #[arg(long)]
    pub in_place: bool,

    /// Emit the per-file report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Knowledge base root
    pub path: PathBuf,

    /// Package name; becomes the package directory
    #[arg(long)]
    pub name: String,

    /// Free-text description stored in the manifest
    #[arg(long, default_value = "")]
    pub description: String,

    /// Source version; detected when omitted
    #[arg(long)]
    pub from: Option<String>,

    /// Target version; defaults to the source version
    #[arg(long)]
    pub to: Option<String>,

    /// Output directory; overrides export.output_dir
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Stamp each exported file with a version tag block
    #[arg(long)]
    pub tag: bool,

    /// Instructions document; migration when converting, import otherwise
    #[arg(long, value_enum)]
    pub instructions: Option<InstructionChoice>,

    /// Export every scanned file
    #[arg(long, conflicts_with = "paths")]
    pub all: bool,

    /// Paths relative to the base
    #[arg(required_unless_present = "all")]
    pub paths: Vec<String>,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InstructionChoice {
    Import,
    Export,
    Update,
    Restore,
    Migration,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; required unless --stdout is set
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
