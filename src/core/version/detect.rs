//! Version classification of a directory (by structure, headers and
//! metadata) and of a single file (by its version tags).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{DetectionMethod, UNKNOWN_VERSION, VersionConfig, VersionSignature};
use crate::error::{KbError, Result};
use crate::infra::config::ScanConfig;
use crate::infra::io::{read_head_lines, read_text};
use crate::infra::walk::FileWalker;

/// Lines inspected per sampled file when scoring metadata fields
const METADATA_HEADER_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub detected: bool,
    pub base_path: Option<PathBuf>,
    pub domains: Vec<String>,
    pub support_dirs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileVersion {
    pub version: String,
    pub confidence: f64,
    /// `file_header`, or `default` when no tag was found
    pub method: String,
}

/// Score of one detection method
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodResult {
    pub version: Option<String>,
    pub confidence: f64,
    /// Per-version score (or vote count for headers)
    pub scores: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub version: Option<String>,
    pub confidence: f64,
    pub method: Option<DetectionMethod>,
    /// No method reached the threshold
    pub low_confidence: bool,
    pub results: IndexMap<String, MethodResult>,
}

pub struct VersionDetector {
    config: VersionConfig,
    tag_patterns: Vec<Regex>,
    domain_patterns: IndexMap<String, Regex>,
    /// Markdown sampler for header and metadata scoring
    sampler: FileWalker,
}

impl VersionDetector {
    pub fn new(config: &VersionConfig) -> Result<Self> {
        let tag_patterns = config
            .tag_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| KbError::pattern(p, e)))
            .collect::<Result<Vec<_>>>()?;

        let mut domain_patterns = IndexMap::new();
        for sig in &config.signatures {
            if let Some(p) = &sig.domain_pattern {
                let re = Regex::new(p).map_err(|e| KbError::pattern(p, e))?;
                domain_patterns.insert(sig.version.clone(), re);
            }
        }

        let sampler = FileWalker::new(&config.detection.exclude_globs)?
            .with_extensions(&[".md".to_string()])
            .with_follow_symlinks(true)
            .with_limit(Some(config.detection.max_files_to_check));

        Ok(Self {
            config: config.clone(),
            tag_patterns,
            domain_patterns,
            sampler,
        }
        .with_scan_filters(&ScanConfig::default()))
    }

    /// Sample only what a scan with `scan` would visit: same excluded
    /// directories, hidden policy and depth.
    pub fn with_scan_filters(mut self, scan: &ScanConfig) -> Self {
        self.sampler = self
            .sampler
            .with_exclude_dirs(&scan.exclude_dirs)
            .with_include_hidden(scan.include_hidden)
            // Files sit one level below the deepest scanned directory
            .with_max_depth(Some(scan.max_depth.saturating_add(1)));
        self
    }

    /// First signature whose directories all exist; marker files are ignored.
    pub fn detect_version(&self, base: &Path) -> String {
        if std::fs::read_dir(base).is_err() {
            return UNKNOWN_VERSION.to_string();
        }

        self.config
            .signatures
            .iter()
            .find(|sig| sig.directories.iter().all(|d| base.join(d).is_dir()))
            .map(|sig| sig.version.clone())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    pub fn get_version_info(&self, base: &Path) -> VersionInfo {
        let version = self.detect_version(base);
        let signature = self.signature(&version);

        let domains = match (signature, self.domain_patterns.get(&version)) {
            (_, Some(re)) => discover_domains(base, re),
            (Some(sig), None) => sig.domains.clone(),
            (None, None) => Vec::new(),
        };

        VersionInfo {
            detected: version != UNKNOWN_VERSION,
            base_path: dunce::canonicalize(base).ok(),
            support_dirs: signature
                .map(|s| s.support_dirs.clone())
                .unwrap_or_default(),
            domains,
            version,
        }
    }

    /// First tag pattern whose first match captures a supported version.
    pub fn extract_version(&self, content: &str) -> Option<String> {
        self.tag_patterns.iter().find_map(|re| {
            let value = re.captures(content)?.get(1)?.as_str().trim();
            self.config
                .is_supported(value)
                .then(|| value.to_string())
        })
    }

    pub fn detect_from_file(&self, path: &Path) -> Result<FileVersion> {
        let content = read_text(path)?;

        Ok(match self.extract_version(&content) {
            Some(version) => FileVersion {
                version,
                confidence: 1.0,
                method: DetectionMethod::FileHeader.as_str().to_string(),
            },
            None => FileVersion {
                version: self.config.default_version.clone(),
                confidence: 0.0,
                method: "default".to_string(),
            },
        })
    }

    /// Score every method, then pick the first in priority order that
    /// reaches the threshold, else the best guess.
    #[instrument(skip_all, fields(base = %base.display()))]
    pub fn assess(&self, base: &Path) -> Result<DetectionReport> {
        if std::fs::read_dir(base).is_err() {
            return Err(KbError::NotReadable {
                path: base.to_path_buf(),
            });
        }

        let samples = self.sampler.walk_files(base);
        debug!(sampled = samples.len(), "collected markdown samples");

        let mut results: IndexMap<String, MethodResult> = IndexMap::new();
        for method in [
            DetectionMethod::Structure,
            DetectionMethod::FileHeader,
            DetectionMethod::Metadata,
        ] {
            let result = match method {
                DetectionMethod::Structure => self.score_structure(base),
                DetectionMethod::FileHeader => self.score_headers(&samples),
                DetectionMethod::Metadata => self.score_metadata(&samples),
            };
            results.insert(method.as_str().to_string(), result);
        }

        let threshold = self.config.detection.confidence_threshold;
        for method in &self.config.detection.priority {
            if let Some(r) = results.get(method.as_str())
                && r.version.is_some()
                && r.confidence >= threshold
            {
                let (version, confidence) = (r.version.clone(), r.confidence);
                return Ok(DetectionReport {
                    version,
                    confidence,
                    method: Some(*method),
                    low_confidence: false,
                    results,
                });
            }
        }

        let mut best: Option<(DetectionMethod, &MethodResult)> = None;
        for method in &self.config.detection.priority {
            if let Some(r) = results.get(method.as_str())
                && r.confidence > best.map_or(0.0, |(_, b)| b.confidence)
            {
                best = Some((*method, r));
            }
        }

        let (version, confidence, method) = match best {
            Some((m, r)) => (r.version.clone(), r.confidence, Some(m)),
            None => (None, 0.0, None),
        };

        Ok(DetectionReport {
            version,
            confidence,
            method,
            low_confidence: true,
            results,
        })
    }

    fn signature(&self, version: &str) -> Option<&VersionSignature> {
        self.config
            .signatures
            .iter()
            .find(|s| s.version == version)
    }

    /// Directories weigh 1, required markers 2, optional markers 1.
    fn score_structure(&self, base: &Path) -> MethodResult {
        let mut scores = IndexMap::new();

        for sig in &self.config.signatures {
            let mut score = 0usize;
            let mut total = 0usize;

            for d in &sig.directories {
                total += 1;
                score += usize::from(base.join(d).is_dir());
            }
            for f in &sig.required_files {
                total += 2;
                if base.join(f).exists() {
                    score += 2;
                }
            }
            for f in &sig.optional_files {
                total += 1;
                score += usize::from(base.join(f).exists());
            }

            let ratio = if total > 0 {
                score as f64 / total as f64
            } else {
                0.0
            };
            scores.insert(sig.version.clone(), ratio);
        }

        top_of(scores, 1.0)
    }

    /// Tag votes over the sample, as a share of the sample size.
    fn score_headers(&self, samples: &[PathBuf]) -> MethodResult {
        let mut votes: IndexMap<String, f64> = IndexMap::new();

        for path in samples {
            match read_text(path) {
                Ok(content) => {
                    if let Some(v) = self.extract_version(&content) {
                        *votes.entry(v).or_insert(0.0) += 1.0;
                    }
                }
                Err(err) => debug!(path = %path.display(), %err, "unreadable sample"),
            }
        }

        if votes.is_empty() {
            return MethodResult::default();
        }
        top_of(votes, samples.len() as f64)
    }

    /// Share of each version's expected header fields present in the sample.
    fn score_metadata(&self, samples: &[PathBuf]) -> MethodResult {
        let headers: Vec<String> = samples
            .iter()
            .filter_map(|p| read_head_lines(p, METADATA_HEADER_LINES).ok())
            .map(|lines| lines.join("\n"))
            .collect();

        let mut scores = IndexMap::new();
        for (version, fields) in &self.config.metadata_fields {
            let mut score = 0usize;
            let mut total = 0usize;
            for header in &headers {
                for field in fields {
                    total += 1;
                    if header.contains(&format!("**{field}:**")) {
                        score += 1;
                    }
                }
            }
            let ratio = if total > 0 {
                score as f64 / total as f64
            } else {
                0.0
            };
            scores.insert(version.clone(), ratio);
        }

        top_of(scores, 1.0)
    }
}

/// Highest score wins; ties go to the earlier entry.
fn top_of(scores: IndexMap<String, f64>, denominator: f64) -> MethodResult {
    let mut top: Option<(&String, f64)> = None;
    for (v, s) in &scores {
        if top.is_none_or(|(_, best)| *s > best) {
            top = Some((v, *s));
        }
    }

    let (version, confidence) = match top {
        Some((v, s)) if denominator > 0.0 => (Some(v.clone()), s / denominator),
        _ => (None, 0.0),
    };

    MethodResult {
        version,
        confidence,
        scores,
    }
}

/// Top-level directory names matching `re`, sorted ascending
fn discover_domains(base: &Path, re: &Regex) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(base) else {
        return Vec::new();
    };

    let mut dirs: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| re.is_match(name))
        .collect();
    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn detector() -> VersionDetector {
        VersionDetector::new(&VersionConfig::default()).unwrap()
    }

    fn mkdirs(root: &Path, dirs: &[&str]) {
        for d in dirs {
            fs::create_dir_all(root.join(d)).unwrap();
        }
    }

    #[test]
    fn detects_by_directories_without_markers() {
        let tmp = TempDir::new().unwrap();
        mkdirs(tmp.path(), &["generic", "platforms"]);
        assert_eq!(detector().detect_version(tmp.path()), "4.2");

        mkdirs(tmp.path(), &["languages", "projects", "docs"]);
        assert_eq!(detector().detect_version(tmp.path()), "4.3");
    }

    #[test]
    fn markers_do_not_change_directory_result() {
        let tmp = TempDir::new().unwrap();
        mkdirs(tmp.path(), &["entries", "integration"]);
        fs::write(tmp.path().join("Master-Index.md"), "# idx").unwrap();
        assert_eq!(detector().detect_version(tmp.path()), "4.1");
    }

    #[test]
    fn unknown_for_missing_or_unmatched() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(detector().detect_version(tmp.path()), UNKNOWN_VERSION);
        assert_eq!(
            detector().detect_version(&tmp.path().join("missing")),
            UNKNOWN_VERSION
        );
        assert!(!detector().get_version_info(tmp.path()).detected);
    }

    #[test]
    fn legacy_domains_are_discovered_sorted() {
        let tmp = TempDir::new().unwrap();
        mkdirs(tmp.path(), &["NM02", "NM00", "NM01", "NMX", "other"]);
        let info = detector().get_version_info(tmp.path());
        assert_eq!(info.version, "3.0");
        assert_eq!(info.domains, ["NM00", "NM01", "NM02"]);
        assert!(info.support_dirs.is_empty());
    }

    #[test]
    fn modern_info_lists_fixed_domains() {
        let tmp = TempDir::new().unwrap();
        mkdirs(tmp.path(), &["generic", "platforms"]);
        let info = detector().get_version_info(tmp.path());
        assert!(info.detected);
        assert_eq!(info.domains, ["generic", "platforms", "languages", "projects"]);
        assert_eq!(info.support_dirs, ["context", "docs", "support", "templates"]);
    }

    #[test]
    fn extract_version_skips_unsupported_values() {
        let d = detector();
        assert_eq!(d.extract_version("**Version:** 4.2\n"), Some("4.2".into()));
        assert_eq!(
            d.extract_version("**Version:** 1.0.0\n**SIMA Version:** 4.3"),
            Some("4.3".into())
        );
        assert_eq!(
            d.extract_version("**Exported:** 2025-01-01 (v4.1)"),
            Some("4.1".into())
        );
        assert_eq!(d.extract_version("nothing here"), None);
    }

    #[test]
    fn file_detection_falls_back_to_default() -> Result<()> {
        let tmp = TempDir::new()?;
        let tagged = tmp.path().join("a.md");
        let plain = tmp.path().join("b.md");
        fs::write(&tagged, "**SIMA Version:** 4.1\n")?;
        fs::write(&plain, "# plain\n")?;

        let d = detector();
        let fv = d.detect_from_file(&tagged)?;
        assert_eq!((fv.version.as_str(), fv.confidence), ("4.1", 1.0));

        let fv = d.detect_from_file(&plain)?;
        assert_eq!(fv.version, "4.3");
        assert_eq!(fv.confidence, 0.0);
        assert_eq!(fv.method, "default");

        assert!(d.detect_from_file(&tmp.path().join("nope.md")).is_err());
        Ok(())
    }

    #[test]
    fn assess_prefers_file_headers_when_confident() -> Result<()> {
        let tmp = TempDir::new()?;
        mkdirs(tmp.path(), &["generic", "platforms"]);
        fs::write(tmp.path().join("generic/a.md"), "**Version:** 4.2\n")?;
        fs::write(tmp.path().join("platforms/b.md"), "**Version:** 4.2\n")?;

        let report = detector().assess(tmp.path())?;
        assert_eq!(report.version.as_deref(), Some("4.2"));
        assert_eq!(report.method, Some(DetectionMethod::FileHeader));
        assert!(!report.low_confidence);
        assert_eq!(report.results.len(), 3);
        Ok(())
    }

    #[test]
    fn assess_flags_low_confidence() -> Result<()> {
        let tmp = TempDir::new()?;
        mkdirs(tmp.path(), &["entries"]);
        fs::write(tmp.path().join("entries/a.md"), "# no tags\n")?;

        let report = detector().assess(tmp.path())?;
        assert!(report.low_confidence);
        assert_eq!(report.method, Some(DetectionMethod::Structure));
        assert_eq!(report.version.as_deref(), Some("4.1"));
        Ok(())
    }

    #[test]
    fn excluded_dirs_do_not_fill_the_sample() -> Result<()> {
        let tmp = TempDir::new()?;
        mkdirs(tmp.path(), &["generic", "platforms", "__pycache__"]);
        fs::write(tmp.path().join("generic/a.md"), "**Version:** 4.2\n")?;
        // Sorted ahead of `generic`; enough to take the whole sample
        for i in 0..12 {
            fs::write(
                tmp.path().join(format!("__pycache__/n{i:02}.md")),
                "**Version:** 3.0\n",
            )?;
        }

        let report = detector().assess(tmp.path())?;
        let headers = &report.results["file_header"];
        assert_eq!(headers.version.as_deref(), Some("4.2"));
        assert_eq!(headers.confidence, 1.0);

        let mut scan = ScanConfig::default();
        scan.exclude_dirs.clear();
        let unfiltered = detector().with_scan_filters(&scan).assess(tmp.path())?;
        assert_eq!(
            unfiltered.results["file_header"].version.as_deref(),
            Some("3.0")
        );
        Ok(())
    }

    #[test]
    fn vendored_markdown_does_not_vote() -> Result<()> {
        let tmp = TempDir::new()?;
        mkdirs(tmp.path(), &["generic", "platforms", "vendor/lib"]);
        fs::write(tmp.path().join("generic/a.md"), "**Version:** 4.2\n")?;
        fs::write(tmp.path().join("vendor/lib/README.md"), "**Version:** 3.0\n")?;

        let report = detector().assess(tmp.path())?;
        assert_eq!(report.version.as_deref(), Some("4.2"));
        let headers = &report.results["file_header"];
        assert_eq!(headers.scores.get("3.0"), None);
        assert_eq!(headers.confidence, 1.0);
        Ok(())
    }

    #[test]
    fn detection_globs_and_hidden_policy_apply() -> Result<()> {
        let tmp = TempDir::new()?;
        mkdirs(tmp.path(), &["generic", "archive/old", ".drafts"]);
        fs::write(tmp.path().join("generic/a.md"), "**Version:** 4.3\n")?;
        fs::write(tmp.path().join("archive/old/b.md"), "**Version:** 3.0\n")?;
        fs::write(tmp.path().join(".drafts/c.md"), "**Version:** 3.0\n")?;

        let mut config = VersionConfig::default();
        config.detection.exclude_globs = vec!["archive/**".to_string()];
        let report = VersionDetector::new(&config)?.assess(tmp.path())?;
        let headers = &report.results["file_header"];
        assert_eq!(headers.scores.get("3.0"), None);
        assert_eq!(headers.scores.get("4.3"), Some(&1.0));

        let scan = ScanConfig {
            include_hidden: true,
            ..Default::default()
        };
        let report = VersionDetector::new(&config)?
            .with_scan_filters(&scan)
            .assess(tmp.path())?;
        assert_eq!(report.results["file_header"].scores.get("3.0"), Some(&1.0));
        Ok(())
    }

    #[test]
    fn bad_exclude_glob_is_rejected() {
        let mut config = VersionConfig::default();
        config.detection.exclude_globs = vec!["a[".to_string()];
        assert!(matches!(
            VersionDetector::new(&config),
            Err(KbError::InvalidGlob { .. })
        ));
    }
}
