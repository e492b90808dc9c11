//! Rule-based migration of file content and relative paths between versions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, warn};

use super::{ConversionRule, Relationship, VersionCompatibility, VersionConfig, VersionDetector};
use crate::core::metadata::MIN_HEADER_LINES;
use crate::error::{KbError, Result};
use crate::infra::io::read_text;

/// Header lines scanned for fields when the file has no separator
const HEADER_FALLBACK_LINES: usize = 20;

type CustomConverter = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Values written into an injected version-tag block
#[derive(Debug, Clone)]
pub struct TagContext {
    pub package_name: String,
    pub export_date: String,
}

impl Default for TagContext {
    fn default() -> Self {
        Self {
            package_name: "Unknown".to_string(),
            export_date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

/// Per-file outcome of [`VersionConverter::batch_convert`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub success: Vec<ConvertedFile>,
    pub failed: Vec<FailedFile>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFile {
    pub path: PathBuf,
    pub from_version: String,
    pub to_version: String,
    #[serde(skip)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

impl FailedFile {
    fn new(path: &Path, error: String) -> Self {
        warn!(path = %path.display(), %error, "conversion failed");
        Self {
            path: path.to_path_buf(),
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct VersionConverter {
    config: VersionConfig,
    compat: VersionCompatibility,
    custom: HashMap<(String, String), CustomConverter>,
}

impl VersionConverter {
    pub fn new(config: &VersionConfig) -> Self {
        Self {
            config: config.clone(),
            compat: VersionCompatibility::new(config),
            custom: HashMap::new(),
        }
    }

    /// Replace the built-in rules for one directed pair.
    pub fn register_converter<F>(&mut self, from: &str, to: &str, f: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.custom
            .insert((from.to_string(), to.to_string()), Box::new(f));
    }

    pub fn convert(&self, content: &str, from: &str, to: &str) -> Result<String> {
        if from == to {
            return Ok(content.to_string());
        }

        if let Some(custom) = self.custom.get(&(from.to_string(), to.to_string())) {
            debug!(from, to, "using registered converter");
            return Ok(custom(content));
        }

        let mut out = content.to_string();
        for rule in self.plan(from, to)? {
            out = apply_rule(&out, rule, &self.config.tag_separator);
        }

        Ok(retag(&out, to, &self.config.tag_separator))
    }

    /// Convert each file in memory. The source version is `from` when given,
    /// else read from the file's tags; untagged files fail. Nothing is
    /// written.
    pub fn batch_convert(
        &self,
        detector: &VersionDetector,
        files: &[PathBuf],
        from: Option<&str>,
        to: &str,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for path in files {
            let content = match read_text(path) {
                Ok(text) => text,
                Err(err) => {
                    report.failed.push(FailedFile::new(path, err.to_string()));
                    continue;
                }
            };
            let Some(source) = from
                .map(str::to_string)
                .or_else(|| detector.extract_version(&content))
            else {
                report.failed.push(FailedFile::new(path, "no version tag".to_string()));
                continue;
            };

            if source == to {
                report.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: "already target version".to_string(),
                });
                continue;
            }

            match self.convert(&content, &source, to) {
                Ok(converted) => report.success.push(ConvertedFile {
                    path: path.clone(),
                    from_version: source,
                    to_version: to.to_string(),
                    content: converted,
                }),
                Err(err) => report.failed.push(FailedFile::new(path, err.to_string())),
            }
        }

        debug!(
            converted = report.success.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "batch conversion done"
        );
        report
    }

    /// Apply the path-prefix rewrites of every planned step to `path`.
    pub fn convert_path(&self, path: &str, from: &str, to: &str) -> Result<String> {
        if from == to {
            return Ok(path.to_string());
        }
        // Registered converters only touch content
        if self.custom.contains_key(&(from.to_string(), to.to_string())) {
            return Ok(path.to_string());
        }

        let mut out = path.to_string();
        for rule in self.plan(from, to)? {
            out = rewrite_paths(&out, rule);
        }
        Ok(out)
    }

    /// Insert the tag block after the first separator, or at the top.
    pub fn add_version_tags(&self, content: &str, version: &str, ctx: &TagContext) -> String {
        let mut lines: Vec<&str> = content.split('\n').collect();
        let insert_at = lines
            .iter()
            .position(|l| l.trim() == self.config.tag_separator)
            .map(|i| i + 1)
            .unwrap_or(0);

        let block = tag_block(version, ctx);
        let block_lines: Vec<&str> = block.split('\n').collect();
        lines.splice(insert_at..insert_at, block_lines);

        lines.join("\n")
    }

    pub fn remove_version_tags(&self, content: &str) -> String {
        content
            .split('\n')
            .filter(|line| !is_tag_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Adjacent rules to apply, in order, for `from -> to`.
    fn plan(&self, from: &str, to: &str) -> Result<Vec<&ConversionRule>> {
        let path = self.compat.get_conversion_path(from, to);
        if path.is_empty() {
            return Err(KbError::UnsupportedConversion {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut rules = Vec::new();
        for hop in path.windows(2) {
            let (a, b) = (hop[0].as_str(), hop[1].as_str());
            match self.compat.relationship(a, b) {
                Some(Relationship::Convertible) => {
                    if let Some(rule) = self.config.rule(a, b) {
                        rules.push(rule);
                        continue;
                    }
                    // Expand through intermediate versions
                    let chain = self.intermediate_chain(a, b);
                    for step in chain.windows(2) {
                        if let Some(rule) = self.config.rule(&step[0], &step[1]) {
                            rules.push(rule);
                        }
                    }
                }
                Some(Relationship::BackwardCompatible) => {
                    debug!(from = a, to = b, "backward-compatible step, no rewrites");
                }
                _ => {
                    return Err(KbError::UnsupportedConversion {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
            }
        }

        Ok(rules)
    }

    /// `a`, every supported version strictly between, then `b`, ascending.
    fn intermediate_chain(&self, a: &str, b: &str) -> Vec<String> {
        use std::cmp::Ordering::*;

        let mut between: Vec<String> = self
            .config
            .supported_versions
            .iter()
            .filter(|v| {
                VersionCompatibility::compare(v, a) == Greater
                    && VersionCompatibility::compare(v, b) == Less
            })
            .cloned()
            .collect();
        between.sort_by(|x, y| VersionCompatibility::compare(x, y));

        let mut chain = Vec::with_capacity(between.len() + 2);
        chain.push(a.to_string());
        chain.extend(between);
        chain.push(b.to_string());
        chain
    }
}

fn tag_block(version: &str, ctx: &TagContext) -> String {
    format!(
        "\n**SIMA Version:** {}\n**Exported:** {}\n**Export Package:** {}\n",
        version, ctx.export_date, ctx.package_name
    )
}

fn is_tag_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("**SIMA Version:**")
        || t.starts_with("**Exported:**")
        || t.starts_with("**Export Package:**")
}

/// Point `**SIMA Version:**` lines in the header, or in the tag block right
/// after the first separator, at `to`. Body lines are left alone.
fn retag(content: &str, to: &str, separator: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let end = tag_region_end(&lines, separator);

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let trimmed = line.trim_start();
            if i < end && trimmed.starts_with("**SIMA Version:**") {
                let indent = &line[..line.len() - trimmed.len()];
                format!("{indent}**SIMA Version:** {to}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Index one past the last header line. A separator on one of the first
/// `MIN_HEADER_LINES` lines (front matter) does not close the header; the
/// first later one does, else the fallback window applies.
fn header_end<S: AsRef<str>>(lines: &[S], separator: &str) -> (usize, bool) {
    match lines
        .iter()
        .enumerate()
        .skip(MIN_HEADER_LINES)
        .find(|(_, l)| l.as_ref().trim() == separator)
    {
        Some((i, _)) => (i, true),
        None => (lines.len().min(HEADER_FALLBACK_LINES), false),
    }
}

/// End of the header or of the tag block `add_version_tags` writes, whichever
/// is later.
fn tag_region_end(lines: &[&str], separator: &str) -> usize {
    let (header, _) = header_end(lines, separator);
    let mut i = lines
        .iter()
        .position(|l| l.trim() == separator)
        .map_or(0, |p| p + 1);
    while i < lines.len() && (lines[i].trim().is_empty() || is_tag_line(lines[i])) {
        i += 1;
    }
    header.max(i)
}

fn field_prefix(field: &str) -> String {
    format!("**{field}:**")
}

fn header_has_field(header: &[String], field: &str) -> bool {
    let prefix = field_prefix(field);
    header.iter().any(|l| l.trim_start().starts_with(&prefix))
}

fn apply_rule(content: &str, rule: &ConversionRule, separator: &str) -> String {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();

    // 1. field renames inside the header
    for (old, new) in &rule.field_renames {
        if old == new {
            continue;
        }
        let (end, _) = header_end(&lines, separator);
        let target_exists = header_has_field(&lines[..end], new);
        let old_prefix = field_prefix(old);
        let new_prefix = field_prefix(new);

        let mut kept = Vec::with_capacity(lines.len());
        for (i, line) in lines.into_iter().enumerate() {
            let trimmed = line.trim_start();
            if i < end && trimmed.starts_with(&old_prefix) {
                if target_exists {
                    debug!(field = %old, target = %new, "dropping field, target already present");
                    continue;
                }
                let indent = &line[..line.len() - trimmed.len()];
                let rest = &trimmed[old_prefix.len()..];
                kept.push(format!("{indent}{new_prefix}{rest}"));
            } else {
                kept.push(line);
            }
        }
        lines = kept;
    }

    // 2. missing fields go just before the separator
    let (end, has_separator) = header_end(&lines, separator);
    let missing: Vec<String> = rule
        .add_fields
        .iter()
        .filter(|f| !header_has_field(&lines[..end], f))
        .map(|f| format!("{} ", field_prefix(f)))
        .collect();
    if !missing.is_empty() {
        let at = if has_separator {
            end
        } else {
            lines[..end]
                .iter()
                .rposition(|l| l.trim_start().starts_with("**") && l.contains(":**"))
                .map(|i| i + 1)
                .unwrap_or(end)
        };
        lines.splice(at..at, missing);
    }

    // 3. path references
    rewrite_paths(&lines.join("\n"), rule)
}

fn rewrite_paths(text: &str, rule: &ConversionRule) -> String {
    let mut out = text.to_string();
    for (prefix, replacement) in &rule.path_rewrites {
        if prefix == replacement || prefix.is_empty() {
            continue;
        }
        let pattern = format!(r#"(?m)(^|[\s(\["'`/]){}"#, regex::escape(prefix));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        out = re
            .replace_all(&out, |caps: &Captures| format!("{}{}", &caps[1], replacement))
            .into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> VersionConverter {
        VersionConverter::new(&VersionConfig::default())
    }

    const DOC_41: &str = "# Lambda\n\n**Version:** 4.1\n**Purpose:** compute\n**Category:** serverless\n---\nSee knowledge/x.md and generic/y.md\n";

    #[test]
    fn same_version_is_untouched() {
        let c = converter();
        assert_eq!(c.convert(DOC_41, "4.1", "4.1").unwrap(), DOC_41);
    }

    #[test]
    fn renames_header_field_only() {
        let c = converter();
        let body = "# Note\n**Version:** 4.1\n**Category:** db\n---\n**Category:** in body\n";
        let out = c.convert(body, "4.1", "4.2").unwrap();
        assert_eq!(
            out,
            "# Note\n**Version:** 4.1\n**Type:** db\n---\n**Category:** in body\n"
        );
    }

    #[test]
    fn leading_front_matter_marker_does_not_end_header() {
        let c = converter();
        let doc = "---\n# Title\n**Category:** db\n**Keywords:** a\n---\nbody";
        let out = c.convert(doc, "4.1", "4.3").unwrap();
        assert_eq!(out, "---\n# Title\n**Type:** db\n**Keywords:** a\n---\nbody");
    }

    #[test]
    fn retag_leaves_body_mentions_alone() {
        let c = converter();
        let doc = "# T\n**SIMA Version:** 4.3\n\n---\nquote: **SIMA Version:** 4.3\n";
        let out = c.convert(doc, "4.3", "4.2").unwrap();
        assert_eq!(
            out,
            "# T\n**SIMA Version:** 4.2\n\n---\nquote: **SIMA Version:** 4.3\n"
        );
    }

    #[test]
    fn rename_drops_when_target_exists() {
        let c = converter();
        let body = "**Purpose:** a\n**Category:** b\n---\nbody";
        let out = c.convert(body, "3.0", "4.1").unwrap();
        assert_eq!(out, "**Purpose:** a\n---\nbody");
    }

    #[test]
    fn multi_step_expands_intermediate_rules() {
        let c = converter();
        // 4.1 -> 4.3 is direct but has no rule; goes through 4.2
        let out = c.convert(DOC_41, "4.1", "4.3").unwrap();
        assert!(out.contains("**Type:** serverless"));
        assert!(out.contains("**Keywords:** \n---"));
        assert!(!out.contains("**Category:**"));
    }

    #[test]
    fn path_rewrites_respect_boundaries() {
        let c = converter();
        let body = "---\n[a](knowledge/a.md) ./knowledge/b.md myknowledge/c.md\nknowledge/d.md";
        let out = c.convert(body, "3.0", "4.1").unwrap();
        assert_eq!(
            out,
            "---\n[a](generic/a.md) ./generic/b.md myknowledge/c.md\ngeneric/d.md"
        );
        assert_eq!(
            c.convert_path("knowledge/aws/x.md", "3.0", "4.3").unwrap(),
            "generic/aws/x.md"
        );
    }

    #[test]
    fn unsupported_conversion_fails() {
        let c = converter();
        let err = c.convert("x", "4.1", "3.0").unwrap_err();
        assert!(matches!(err, KbError::UnsupportedConversion { .. }));
        assert!(c.convert_path("a.md", "4.3", "1.0").is_err());
    }

    #[test]
    fn backward_step_keeps_body_and_retags() {
        let c = converter();
        let tagged = c.add_version_tags(
            "# T\n---\nbody",
            "4.3",
            &TagContext {
                package_name: "pkg".into(),
                export_date: "2025-01-01".into(),
            },
        );
        let out = c.convert(&tagged, "4.3", "4.2").unwrap();
        assert!(out.contains("**SIMA Version:** 4.2"));
        assert!(out.contains("**Exported:** 2025-01-01"));
        assert!(out.contains("**Export Package:** pkg"));
        assert!(out.ends_with("body"));
    }

    #[test]
    fn known_lossy_round_trips() {
        let c = converter();

        let up = c.convert(DOC_41, "4.1", "4.2").unwrap();
        let back = c.convert(&up, "4.2", "4.1").unwrap();
        assert!(!back.contains("**Category:**"));
        assert_ne!(back, DOC_41);

        let base = "**Version:** 4.2\n---\nbody";
        let up = c.convert(base, "4.2", "4.3").unwrap();
        let back = c.convert(&up, "4.3", "4.2").unwrap();
        assert!(back.contains("**Keywords:**"));
    }

    #[test]
    fn tags_inserted_after_separator_and_removed() {
        let c = converter();
        let ctx = TagContext {
            package_name: "p".into(),
            export_date: "2025-02-02".into(),
        };
        let out = c.add_version_tags("# H\n---\nbody", "4.3", &ctx);
        assert_eq!(
            out,
            "# H\n---\n\n**SIMA Version:** 4.3\n**Exported:** 2025-02-02\n**Export Package:** p\n\nbody"
        );
        assert_eq!(c.remove_version_tags(&out), "# H\n---\n\n\nbody");

        let top = c.add_version_tags("no separator", "4.2", &ctx);
        assert!(top.starts_with("\n**SIMA Version:** 4.2"));
    }

    #[test]
    fn custom_converter_wins() {
        let mut c = converter();
        c.register_converter("4.1", "3.0", |s| s.to_uppercase());
        assert_eq!(c.convert("abc", "4.1", "3.0").unwrap(), "ABC");
    }
    #[test]
    fn batch_reports_each_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let write = |name: &str, body: &str| {
            let p = tmp.path().join(name);
            std::fs::write(&p, body).unwrap();
            p
        };
        let files = vec![
            write("a.md", "**Version:** 4.1\n**Category:** db\n---\nbody"),
            write("b.md", "**Version:** 4.2\n---\n"),
            write("c.md", "plain"),
            tmp.path().join("missing.md"),
        ];
        let detector = VersionDetector::new(&VersionConfig::default()).unwrap();

        let report = converter().batch_convert(&detector, &files, None, "4.2");

        assert_eq!(report.success.len(), 1);
        assert_eq!(report.success[0].path, files[0]);
        assert_eq!(report.success[0].from_version, "4.1");
        assert!(report.success[0].content.contains("**Type:** db"));
        assert_eq!(report.skipped[0].path, files[1]);
        assert_eq!(report.skipped[0].reason, "already target version");
        let failed: Vec<_> = report.failed.iter().map(|f| &f.path).collect();
        assert_eq!(failed, [&files[2], &files[3]]);
        assert_eq!(report.failed[0].error, "no version tag");
        // sources are only read
        assert_eq!(
            std::fs::read_to_string(&files[0]).unwrap(),
            "**Version:** 4.1\n**Category:** db\n---\nbody"
        );
    }

    #[test]
    fn batch_with_forced_source_reports_unsupported_pairs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let p = tmp.path().join("old.md");
        std::fs::write(&p, "# Old\n").unwrap();
        let detector = VersionDetector::new(&VersionConfig::default()).unwrap();

        let report = converter().batch_convert(&detector, &[p], Some("4.1"), "3.0");

        assert!(report.success.is_empty());
        assert!(report.failed[0].error.contains("no conversion path"));
    }
}
