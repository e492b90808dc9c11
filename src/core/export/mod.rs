//! Export orchestration: select, validate, convert and package files.
//!
//! The [`Exporter`] owns the pipeline. Path validation, manifest rendering,
//! instructions rendering and packaging are pluggable collaborators with one
//! default implementation each.

pub mod command;
pub mod instructions;
pub mod manifest;
pub mod package;
pub mod validate;

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

pub use instructions::{InstructionContext, InstructionKind, InstructionsRenderer, MarkdownInstructions};
pub use manifest::{Manifest, ManifestHeader, ManifestRenderer, YamlManifest};
pub use package::{DirectoryPackager, PackageContents, PackagedArchive, Packager, generate_export_id};
pub use validate::{PathValidator, PathVerdict, RelativePathValidator};

use crate::core::metadata::MetadataExtractor;
use crate::core::model::ROOT_BUCKET;
use crate::core::version::{
    TagContext, UNKNOWN_VERSION, VersionCompatibility, VersionConfig, VersionConverter,
    VersionDetector,
};
use crate::error::{KbError, Result};
use crate::infra::config::Config;
use crate::infra::io::{checksum, read_text};

/// One file ready for packaging
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFile {
    /// Selected path, relative to the base
    pub original_path: String,
    /// Path inside the package, rewritten when converted
    pub relative_path: String,
    pub filename: String,
    pub ref_id: Option<String>,
    pub category: String,
    /// Bytes of the final content
    pub size: u64,
    pub checksum: String,
    #[serde(skip)]
    pub content: String,
    pub converted: bool,
    pub target_version: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub archive_name: String,
    pub description: String,
    /// Paths relative to the base, as selected by the caller
    pub selected_paths: Vec<String>,
    /// Detected from the base when unset
    pub source_version: Option<String>,
    /// Defaults to the source version
    pub target_version: Option<String>,
    /// Stamp each file with a version tag block
    pub tag_files: bool,
    /// Instructions document; chosen from the versions when unset
    pub instructions: Option<InstructionKind>,
}

impl ExportRequest {
    /// The requested kind, else Migration when versions differ and Import
    /// otherwise.
    pub fn instruction_kind(&self, prepared: &PreparedExport) -> InstructionKind {
        match &self.instructions {
            Some(kind) => kind.clone(),
            None if prepared.source_version != prepared.target_version => {
                InstructionKind::Migration
            }
            None => InstructionKind::Import,
        }
    }
}

/// A selection that did not make it into the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPath {
    pub path: String,
    pub reason: String,
}

/// Everything an export would write, before any I/O on the output side
#[derive(Debug, Clone, Serialize)]
pub struct PreparedExport {
    pub archive_name: String,
    pub export_id: String,
    pub source_version: String,
    pub target_version: String,
    pub files: Vec<ExportFile>,
    pub skipped: Vec<SkippedPath>,
}

impl PreparedExport {
    pub fn converted_count(&self) -> usize {
        self.files.iter().filter(|f| f.converted).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub archive_path: PathBuf,
    pub archive_name: String,
    pub bytes: u64,
    pub file_count: usize,
    pub converted_count: usize,
    pub source_version: String,
    pub target_version: String,
    pub export_id: String,
    pub skipped: Vec<SkippedPath>,
}

pub struct Exporter {
    version: VersionConfig,
    description_default: String,
    base_archive_dir: String,
    extractor: MetadataExtractor,
    detector: VersionDetector,
    compat: VersionCompatibility,
    converter: VersionConverter,
    packager: Box<dyn Packager>,
    validator: Box<dyn PathValidator>,
    manifest: Box<dyn ManifestRenderer>,
    instructions: Box<dyn InstructionsRenderer>,
}

impl Exporter {
    pub fn new(config: &Config) -> Result<Self> {
        let export = &config.export;
        let packager = DirectoryPackager {
            output_dir: export.output_dir.clone(),
            base_archive_dir: export.base_archive_dir.clone(),
            manifest_filename: export.manifest_filename.clone(),
            instructions_filename: export.instructions_filename.clone(),
        };

        Ok(Self {
            version: config.version.clone(),
            description_default: "Knowledge base export".to_string(),
            base_archive_dir: export.base_archive_dir.clone(),
            extractor: MetadataExtractor::new(&config.metadata)?,
            detector: VersionDetector::new(&config.version)?.with_scan_filters(&config.scan),
            compat: VersionCompatibility::new(&config.version),
            converter: VersionConverter::new(&config.version),
            packager: Box::new(packager),
            validator: Box::new(RelativePathValidator::new(&export.allowed_extensions)),
            manifest: Box::new(YamlManifest),
            instructions: Box::new(MarkdownInstructions),
        })
    }

    pub fn with_packager(mut self, packager: Box<dyn Packager>) -> Self {
        self.packager = packager;
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn PathValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_manifest_renderer(mut self, renderer: Box<dyn ManifestRenderer>) -> Self {
        self.manifest = renderer;
        self
    }

    pub fn with_instructions_renderer(mut self, renderer: Box<dyn InstructionsRenderer>) -> Self {
        self.instructions = renderer;
        self
    }

    /// For registering custom converters.
    pub fn converter_mut(&mut self) -> &mut VersionConverter {
        &mut self.converter
    }

    /// Resolve versions, validate and convert every selection. Nothing is
    /// written.
    #[instrument(skip_all, fields(base = %base.display(), archive = %req.archive_name))]
    pub fn prepare(&self, base: &Path, req: &ExportRequest) -> Result<PreparedExport> {
        check_archive_name(&req.archive_name)?;

        let source = match req.source_version.as_deref() {
            Some(v) => v.to_string(),
            None => {
                let detected = self.detector.detect_version(base);
                if detected == UNKNOWN_VERSION {
                    debug!(default = %self.version.default_version, "version not detected");
                    self.version.default_version.clone()
                } else {
                    detected
                }
            }
        };
        let target = req.target_version.clone().unwrap_or_else(|| source.clone());
        let converting = source != target;

        if converting && !self.compat.can_convert(&source, &target) {
            return Err(KbError::UnsupportedConversion {
                from: source,
                to: target,
            });
        }

        let canonical_base = dunce::canonicalize(base).map_err(|_| KbError::NotReadable {
            path: base.to_path_buf(),
        })?;
        let tags = TagContext {
            package_name: req.archive_name.clone(),
            ..Default::default()
        };

        let mut files = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        let mut skip = |path: &str, reason: String| {
            warn!(path, %reason, "skipping selection");
            skipped.push(SkippedPath {
                path: path.to_string(),
                reason,
            });
        };

        for selected in &req.selected_paths {
            let rel = match self.validator.validate(selected) {
                PathVerdict::Valid(rel) => rel,
                PathVerdict::Rejected(reason) => {
                    skip(selected, reason);
                    continue;
                }
            };

            let full = base.join(&rel);
            match dunce::canonicalize(&full) {
                Ok(c) if !c.starts_with(&canonical_base) => {
                    skip(selected, "resolves outside the base directory".to_string());
                    continue;
                }
                Ok(c) if !c.is_file() => {
                    skip(selected, "not a regular file".to_string());
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    skip(selected, format!("not readable: {err}"));
                    continue;
                }
            }

            let original = match read_text(&full) {
                Ok(text) => text,
                Err(err) => {
                    skip(selected, format!("not readable: {err}"));
                    continue;
                }
            };
            let header = self.extractor.extract_from_str(&original);

            let (mut content, relative_path) = if converting {
                (
                    self.converter.convert(&original, &source, &target)?,
                    self.converter.convert_path(&rel, &source, &target)?,
                )
            } else {
                (original, rel.clone())
            };
            if req.tag_files {
                content = self.converter.add_version_tags(&content, &target, &tags);
            }

            if !seen.insert(relative_path.clone()) {
                skip(selected, format!("duplicate package path {relative_path}"));
                continue;
            }

            files.push(ExportFile {
                filename: file_name(&relative_path).to_string(),
                category: header
                    .category
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| parent_name(&rel).to_string()),
                ref_id: header.ref_id.filter(|r| !r.is_empty()),
                size: content.len() as u64,
                checksum: checksum(content.as_bytes()),
                original_path: rel,
                relative_path,
                content,
                converted: converting,
                target_version: target.clone(),
            });
        }

        if files.is_empty() {
            return Err(KbError::NothingToExport);
        }

        Ok(PreparedExport {
            archive_name: req.archive_name.clone(),
            export_id: generate_export_id(),
            source_version: source,
            target_version: target,
            files,
            skipped,
        })
    }

    /// Manifest and instructions text for a prepared export.
    pub fn render(
        &self,
        prepared: &PreparedExport,
        description: &str,
        kind: &InstructionKind,
    ) -> Result<(String, String)> {
        let created = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let description = if description.is_empty() {
            self.description_default.as_str()
        } else {
            description
        };

        let header = ManifestHeader {
            archive_name: &prepared.archive_name,
            description,
            source_version: &prepared.source_version,
            target_version: &prepared.target_version,
            export_id: &prepared.export_id,
            base_archive_dir: &self.base_archive_dir,
            created: created.clone(),
        };
        let manifest = self
            .manifest
            .render(&Manifest::build(&header, &prepared.files))?;

        let ctx = InstructionContext {
            archive_name: &prepared.archive_name,
            source_version: &prepared.source_version,
            target_version: &prepared.target_version,
            created: &created,
            files: &prepared.files,
        };
        let instructions = self.instructions.render(kind, &ctx);

        Ok((manifest, instructions))
    }

    #[instrument(skip_all, fields(base = %base.display(), archive = %req.archive_name))]
    pub fn export(&self, base: &Path, req: &ExportRequest) -> Result<ExportReport> {
        let prepared = self.prepare(base, req)?;
        let kind = req.instruction_kind(&prepared);
        let (manifest, instructions) = self.render(&prepared, &req.description, &kind)?;

        let archive = self.packager.package(&PackageContents {
            archive_name: &prepared.archive_name,
            export_id: &prepared.export_id,
            files: &prepared.files,
            manifest: &manifest,
            instructions: &instructions,
        })?;

        let report = ExportReport {
            archive_path: archive.path,
            archive_name: prepared.archive_name.clone(),
            bytes: archive.bytes,
            file_count: prepared.files.len(),
            converted_count: prepared.converted_count(),
            source_version: prepared.source_version,
            target_version: prepared.target_version,
            export_id: prepared.export_id,
            skipped: prepared.skipped,
        };

        info!(
            path = %report.archive_path.display(),
            files = report.file_count,
            converted = report.converted_count,
            skipped = report.skipped.len(),
            "export complete"
        );
        Ok(report)
    }
}

/// Archive names become a single directory under the output dir.
fn check_archive_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(KbError::UnsafePath {
            path: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.trim().is_empty() {
        return reject("empty archive name");
    }
    if name.chars().any(char::is_control) {
        return reject("control character in archive name");
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => reject("archive name must be a single path component"),
    }
}

fn file_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

/// Name of the directory holding `rel`, or the root bucket
fn parent_name(rel: &str) -> &str {
    rel.rsplit_once('/')
        .map(|(dir, _)| file_name(dir))
        .unwrap_or(ROOT_BUCKET)
}
