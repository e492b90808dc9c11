//! `manifest.yaml` describing a package.

use serde::{Deserialize, Serialize};

use super::ExportFile;
use crate::error::{KbError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub name: String,
    pub created: String,
    pub description: String,
    pub source_version: String,
    pub target_version: String,
    pub total_files: usize,
    pub converted_files: usize,
    pub export_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub filename: String,
    pub path: String,
    pub original_path: String,
    #[serde(default)]
    pub ref_id: Option<String>,
    pub category: String,
    pub size: u64,
    pub checksum: String,
    pub converted: bool,
    pub sima_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub archive: ArchiveInfo,
    pub files: Vec<ManifestFile>,
    pub packages: Vec<PackageEntry>,
}

/// Inputs that are not per-file
pub struct ManifestHeader<'a> {
    pub archive_name: &'a str,
    pub description: &'a str,
    pub source_version: &'a str,
    pub target_version: &'a str,
    pub export_id: &'a str,
    /// Directory inside the package that holds the files
    pub base_archive_dir: &'a str,
    pub created: String,
}

impl Manifest {
    pub fn build(header: &ManifestHeader<'_>, files: &[ExportFile]) -> Self {
        let converted_files = files.iter().filter(|f| f.converted).count();

        Manifest {
            archive: ArchiveInfo {
                name: header.archive_name.to_string(),
                created: header.created.clone(),
                description: header.description.to_string(),
                source_version: header.source_version.to_string(),
                target_version: header.target_version.to_string(),
                total_files: files.len(),
                converted_files,
                export_id: header.export_id.to_string(),
            },
            files: files
                .iter()
                .map(|f| ManifestFile {
                    filename: f.filename.clone(),
                    path: f.relative_path.clone(),
                    original_path: f.original_path.clone(),
                    ref_id: f.ref_id.clone(),
                    category: f.category.clone(),
                    size: f.size,
                    checksum: f.checksum.clone(),
                    converted: f.converted,
                    sima_version: f.target_version.clone(),
                })
                .collect(),
            packages: vec![PackageEntry {
                name: header.base_archive_dir.to_string(),
                kind: "base".to_string(),
                files: files.len(),
            }],
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| KbError::Serialize(e.to_string()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| KbError::Serialize(e.to_string()))
    }
}

pub trait ManifestRenderer: Send + Sync {
    fn render(&self, manifest: &Manifest) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct YamlManifest;

impl ManifestRenderer for YamlManifest {
    fn render(&self, manifest: &Manifest) -> Result<String> {
        manifest.to_yaml()
    }
}
