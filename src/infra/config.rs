use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
pub use crate::core::version::VersionConfig;

/// Name of the config file written by `kbt init`
pub const CONFIG_FILE: &str = "kbtree.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Directory traversal settings
    pub scan: ScanConfig,

    /// Header metadata extraction settings
    pub metadata: MetadataConfig,

    /// UI tree normalization settings
    pub format: FormatConfig,

    /// Version signatures, compatibility graph and conversion rules
    pub version: VersionConfig,

    /// Export packaging settings
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig
{
    pub include_hidden: bool,
    pub max_depth: usize,
    /// Case-sensitive filename suffixes, e.g. ".md"
    pub file_extensions: Vec<String>,
    /// Directory names skipped by exact match
    pub exclude_dirs: Vec<String>,
    pub include_metadata: bool,
}

impl Default for ScanConfig
{
    fn default() -> Self
    {
        Self {
            include_hidden: false,
            max_depth: 20,
            file_extensions: vec![".md".to_string()],
            exclude_dirs: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                ".idea".to_string(),
                "__pycache__".to_string(),
                "vendor".to_string(),
            ],
            include_metadata: true,
        }
    }
}

/// Per-call scan overrides; every `Some` replaces the configured value.
#[derive(Debug, Clone, Default)]
pub struct ScanOverrides
{
    pub include_hidden: Option<bool>,
    pub max_depth: Option<usize>,
    pub file_extensions: Option<Vec<String>>,
    pub exclude_dirs: Option<Vec<String>>,
    pub include_metadata: Option<bool>,
}

impl ScanConfig
{
    /// Shallow merge of `overrides` on top of `self`.
    pub fn merged(
        &self,
        overrides: &ScanOverrides,
    ) -> ScanConfig
    {
        ScanConfig {
            include_hidden: overrides
                .include_hidden
                .unwrap_or(self.include_hidden),
            max_depth: overrides
                .max_depth
                .unwrap_or(self.max_depth),
            file_extensions: overrides
                .file_extensions
                .clone()
                .unwrap_or_else(|| self.file_extensions.clone()),
            exclude_dirs: overrides
                .exclude_dirs
                .clone()
                .unwrap_or_else(|| self.exclude_dirs.clone()),
            include_metadata: overrides
                .include_metadata
                .unwrap_or(self.include_metadata),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig
{
    /// Upper bound on header lines read per file
    pub max_lines: usize,
    /// Line that terminates the header region
    pub header_end_marker: String,
    /// Field name -> regex with one capture group, tested in order
    pub fields: IndexMap<String, String>,
}

impl Default for MetadataConfig
{
    fn default() -> Self
    {
        let mut fields = IndexMap::new();
        fields.insert("version".to_string(), r"\*\*Version:\*\*\s*(.+)$".to_string());
        fields.insert("ref_id".to_string(), r"\*\*REF-ID:\*\*\s*(.+)$".to_string());
        fields.insert("category".to_string(), r"\*\*Category:\*\*\s*(.+)$".to_string());
        fields.insert("purpose".to_string(), r"\*\*Purpose:\*\*\s*(.+)$".to_string());

        Self {
            max_lines: 20,
            header_end_marker: "---".to_string(),
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig
{
    /// Subject-matter roots
    pub domain_dirs: Vec<String>,
    /// Auxiliary roots
    pub support_dirs: Vec<String>,
}

impl Default for FormatConfig
{
    fn default() -> Self
    {
        Self {
            domain_dirs: ["generic", "platforms", "languages", "projects"]
                .map(String::from)
                .to_vec(),
            support_dirs: ["context", "docs", "support", "templates"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl FormatConfig
{
    pub fn is_domain(
        &self,
        name: &str,
    ) -> bool
    {
        self.domain_dirs
            .iter()
            .any(|d| d == name)
    }

    pub fn is_support(
        &self,
        name: &str,
    ) -> bool
    {
        self.support_dirs
            .iter()
            .any(|d| d == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig
{
    /// Where finished packages are placed
    pub output_dir: PathBuf,
    /// Extensions accepted by the default path validator
    pub allowed_extensions: Vec<String>,
    /// Directory inside the package holding the knowledge files
    pub base_archive_dir: String,
    pub manifest_filename: String,
    pub instructions_filename: String,
}

impl Default for ExportConfig
{
    fn default() -> Self
    {
        Self {
            output_dir: PathBuf::from("exports"),
            allowed_extensions: vec![".md".to_string(), ".txt".to_string()],
            base_archive_dir: "knowledge-base".to_string(),
            manifest_filename: "manifest.yaml".to_string(),
            instructions_filename: "import-instructions.md".to_string(),
        }
    }
}

pub fn load_config() -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["kbtree.toml", "kbtree.yaml", "kbtree.json", ".kbtree.toml"];

    for path in &config_paths
    {
        if Path::new(path).exists()
        {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // Environment overrides: KBTREE_SCAN__MAX_DEPTH=5
    builder = builder.add_source(
        config::Environment::with_prefix("KBTREE")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILE);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("DRY RUN: Would write {}", config_path.display());
        }
        return Ok(());
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
