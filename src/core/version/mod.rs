//! Schema versions of a knowledge base: signatures, compatibility graph,
//! conversion rules and release metadata.
//!
//! The submodules split the work:
//! - [`detect`] classifies a directory or a file
//! - [`compat`] answers "can A become B, and how"
//! - [`convert`] rewrites content and paths along a conversion plan

pub mod command;
pub mod compat;
pub mod convert;
pub mod detect;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use compat::{
    CompatibilityReport, FeatureComparison, UpgradeRecommendation, VersionCompatibility,
};
pub use convert::{
    BatchReport, ConvertedFile, FailedFile, SkippedFile, TagContext, VersionConverter,
};
pub use detect::{DetectionReport, FileVersion, MethodResult, VersionDetector, VersionInfo};

/// Returned by detection when no signature matches
pub const UNKNOWN_VERSION: &str = "unknown";

/// Directory and marker-file fingerprint of one schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSignature {
    pub version: String,
    /// Every one of these must exist for a match
    pub directories: Vec<String>,
    #[serde(default)]
    pub required_files: Vec<String>,
    #[serde(default)]
    pub optional_files: Vec<String>,
    /// Domain roots reported for this version
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub support_dirs: Vec<String>,
    /// When set, domains are discovered by matching top-level names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Convertible,
    BackwardCompatible,
    Incompatible,
}

impl Relationship {
    /// Whether a conversion may cross this edge
    pub fn is_traversable(self) -> bool {
        !matches!(self, Relationship::Incompatible)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Relationship::Convertible => "convertible",
            Relationship::BackwardCompatible => "backward_compatible",
            Relationship::Incompatible => "incompatible",
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityEdge {
    pub from: String,
    pub to: String,
    pub relationship: Relationship,
}

impl CompatibilityEdge {
    fn new(from: &str, to: &str, relationship: Relationship) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            relationship,
        }
    }
}

/// Rewrites applied when stepping between two adjacent versions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionRule {
    pub from: String,
    pub to: String,
    /// Ordered path prefix -> replacement
    #[serde(default)]
    pub path_rewrites: IndexMap<String, String>,
    /// Ordered header field -> header field
    #[serde(default)]
    pub field_renames: IndexMap<String, String>,
    /// Header fields appended when missing
    #[serde(default)]
    pub add_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Deprecated,
    Legacy,
    Stable,
    Current,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub release_date: String,
    pub status: ReleaseStatus,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Structure,
    FileHeader,
    Metadata,
}

impl DetectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::Structure => "structure",
            DetectionMethod::FileHeader => "file_header",
            DetectionMethod::Metadata => "metadata",
        }
    }
}

/// Tuning for multi-method assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Order in which methods are consulted against the threshold
    pub priority: Vec<DetectionMethod>,
    /// Markdown files sampled for header and metadata scoring
    pub max_files_to_check: usize,
    pub confidence_threshold: f64,
    /// Globs relative to the base (e.g. "archive/**") never sampled
    pub exclude_globs: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            priority: vec![
                DetectionMethod::FileHeader,
                DetectionMethod::Structure,
                DetectionMethod::Metadata,
            ],
            max_files_to_check: 10,
            confidence_threshold: 0.7,
            exclude_globs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
    pub supported_versions: Vec<String>,
    /// Assumed for files carrying no version tag
    pub default_version: String,
    /// Checked in order; the first full directory match wins
    pub signatures: Vec<VersionSignature>,
    pub compatibility: Vec<CompatibilityEdge>,
    pub rules: Vec<ConversionRule>,
    /// Regexes with one capture group holding a version number
    pub tag_patterns: Vec<String>,
    /// Line that separates a header from the body
    pub tag_separator: String,
    pub releases: IndexMap<String, ReleaseInfo>,
    /// Header fields expected per version, used for metadata scoring
    pub metadata_fields: IndexMap<String, Vec<String>>,
    pub detection: DetectionConfig,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn release(name: &str, date: &str, status: ReleaseStatus, features: &[&str]) -> ReleaseInfo {
    ReleaseInfo {
        name: name.to_string(),
        release_date: date.to_string(),
        status,
        features: strings(features),
    }
}

impl Default for VersionConfig {
    fn default() -> Self {
        let modern_domains = strings(&["generic", "platforms", "languages", "projects"]);
        let modern_support = strings(&["context", "docs", "support", "templates"]);

        let signatures = vec![
            VersionSignature {
                version: "4.3".to_string(),
                directories: strings(&["generic", "platforms", "languages", "projects", "docs"]),
                required_files: strings(&[
                    "Master-Index-of-Indexes.md",
                    "SIMA-Quick-Reference-Card.md",
                ]),
                optional_files: strings(&["File-Server-URLs.md"]),
                domains: modern_domains.clone(),
                support_dirs: modern_support.clone(),
                domain_pattern: None,
            },
            VersionSignature {
                version: "4.2".to_string(),
                directories: strings(&["generic", "platforms"]),
                required_files: strings(&["Master-Index-of-Indexes.md", "SIMA-Navigation-Hub.md"]),
                optional_files: strings(&["File-Server-URLs.md"]),
                domains: modern_domains,
                support_dirs: modern_support,
                domain_pattern: None,
            },
            VersionSignature {
                version: "4.1".to_string(),
                directories: strings(&["entries", "integration"]),
                required_files: strings(&["Master-Index-of-Indexes.md"]),
                optional_files: Vec::new(),
                domains: strings(&["entries", "integration"]),
                support_dirs: Vec::new(),
                domain_pattern: None,
            },
            VersionSignature {
                version: "3.0".to_string(),
                directories: strings(&["NM00", "NM01"]),
                required_files: strings(&["Master-Index.md"]),
                optional_files: Vec::new(),
                domains: Vec::new(),
                support_dirs: Vec::new(),
                domain_pattern: Some(r"^NM\d{2}$".to_string()),
            },
        ];

        use Relationship::*;
        let compatibility = vec![
            CompatibilityEdge::new("3.0", "4.1", Convertible),
            CompatibilityEdge::new("3.0", "4.2", Convertible),
            CompatibilityEdge::new("3.0", "4.3", Convertible),
            CompatibilityEdge::new("4.1", "4.2", Convertible),
            CompatibilityEdge::new("4.1", "4.3", Convertible),
            CompatibilityEdge::new("4.2", "4.3", Convertible),
            CompatibilityEdge::new("4.3", "4.2", BackwardCompatible),
            CompatibilityEdge::new("4.2", "4.1", BackwardCompatible),
            CompatibilityEdge::new("4.1", "3.0", Incompatible),
        ];

        let mut rule_30_41 = ConversionRule {
            from: "3.0".to_string(),
            to: "4.1".to_string(),
            ..Default::default()
        };
        rule_30_41
            .path_rewrites
            .insert("knowledge/".to_string(), "generic/".to_string());
        rule_30_41
            .field_renames
            .insert("Category".to_string(), "Purpose".to_string());

        let mut rule_41_42 = ConversionRule {
            from: "4.1".to_string(),
            to: "4.2".to_string(),
            ..Default::default()
        };
        rule_41_42
            .field_renames
            .insert("Category".to_string(), "Type".to_string());

        let rule_42_43 = ConversionRule {
            from: "4.2".to_string(),
            to: "4.3".to_string(),
            add_fields: strings(&["Keywords"]),
            ..Default::default()
        };

        let mut releases = IndexMap::new();
        releases.insert(
            "3.0".to_string(),
            release(
                "SIMA v3.0",
                "2024-01-01",
                ReleaseStatus::Deprecated,
                &["Basic structure", "Single domain"],
            ),
        );
        releases.insert(
            "4.1".to_string(),
            release(
                "SIMA v4.1",
                "2024-06-01",
                ReleaseStatus::Legacy,
                &["Multi-domain", "REF-IDs"],
            ),
        );
        releases.insert(
            "4.2".to_string(),
            release(
                "SIMA v4.2",
                "2024-09-01",
                ReleaseStatus::Stable,
                &["Language support", "Enhanced navigation"],
            ),
        );
        releases.insert(
            "4.3".to_string(),
            release(
                "SIMA v4.3",
                "2024-11-01",
                ReleaseStatus::Current,
                &["Documentation integration", "Enhanced indexes"],
            ),
        );

        let mut metadata_fields = IndexMap::new();
        metadata_fields.insert("3.0".to_string(), strings(&["Version", "Date", "Category"]));
        metadata_fields.insert(
            "4.1".to_string(),
            strings(&["Version", "Date", "Purpose", "Category"]),
        );
        metadata_fields.insert(
            "4.2".to_string(),
            strings(&["Version", "Date", "Purpose", "Type", "REF-ID"]),
        );
        metadata_fields.insert(
            "4.3".to_string(),
            strings(&["Version", "Date", "Purpose", "Type", "REF-ID", "Keywords"]),
        );

        Self {
            supported_versions: strings(&["3.0", "4.1", "4.2", "4.3"]),
            default_version: "4.3".to_string(),
            signatures,
            compatibility,
            rules: vec![rule_30_41, rule_41_42, rule_42_43],
            tag_patterns: strings(&[
                r"\*\*Version:\*\*\s*([0-9.]+)",
                r"\*\*SIMA Version:\*\*\s*([0-9.]+)",
                r"\*\*Exported:\*\*\s*.+\(v([0-9.]+)\)",
                r"\*\*Package Version:\*\*\s*([0-9.]+)",
            ]),
            tag_separator: "---".to_string(),
            releases,
            metadata_fields,
            detection: DetectionConfig::default(),
        }
    }
}

impl VersionConfig {
    pub fn is_supported(&self, version: &str) -> bool {
        self.supported_versions.iter().any(|v| v == version)
    }

    pub fn rule(&self, from: &str, to: &str) -> Option<&ConversionRule> {
        self.rules.iter().find(|r| r.from == from && r.to == to)
    }
}
