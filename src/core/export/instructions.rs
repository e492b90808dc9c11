//! Markdown instructions shipped alongside a package.

use std::collections::BTreeMap;

use super::ExportFile;
use crate::core::model::ROOT_BUCKET;

const DOC_VERSION: &str = "1.0.0";

/// Which document to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    Import,
    Export,
    Update,
    Restore,
    Migration,
    /// Free-form document; each section is `(title, body)`
    Custom {
        title: String,
        sections: Vec<(String, String)>,
    },
}

impl InstructionKind {
    pub fn operation(&self) -> &'static str {
        match self {
            InstructionKind::Import => "Import",
            InstructionKind::Export => "Export",
            InstructionKind::Update => "Update",
            InstructionKind::Restore => "Restore",
            InstructionKind::Migration => "Migrate",
            InstructionKind::Custom { .. } => "Custom",
        }
    }
}

/// Package facts the documents refer to
#[derive(Debug, Clone)]
pub struct InstructionContext<'a> {
    pub archive_name: &'a str,
    pub source_version: &'a str,
    pub target_version: &'a str,
    /// `YYYY-MM-DD HH:MM:SS`
    pub created: &'a str,
    pub files: &'a [ExportFile],
}

impl InstructionContext<'_> {
    fn converted(&self) -> usize {
        self.files.iter().filter(|f| f.converted).count()
    }

    fn date(&self) -> &str {
        self.created.split_whitespace().next().unwrap_or(self.created)
    }
}

pub trait InstructionsRenderer: Send + Sync {
    fn render(&self, kind: &InstructionKind, ctx: &InstructionContext<'_>) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownInstructions;

impl InstructionsRenderer for MarkdownInstructions {
    fn render(&self, kind: &InstructionKind, ctx: &InstructionContext<'_>) -> String {
        match kind {
            InstructionKind::Import => import(ctx),
            InstructionKind::Export => export(ctx),
            InstructionKind::Update => update(ctx),
            InstructionKind::Restore => restore(ctx),
            InstructionKind::Migration => migration(ctx),
            InstructionKind::Custom { title, sections } => custom(title, sections, ctx),
        }
    }
}

fn header(title: &str, kind: &InstructionKind, ctx: &InstructionContext<'_>, files: usize) -> String {
    format!(
        "# {title}\n\n**Version:** {DOC_VERSION}  \n**Date:** {}  \n**Operation:** {}  \n**Files:** {files}\n\n---\n\n",
        ctx.date(),
        kind.operation()
    )
}

fn footer() -> &'static str {
    "\n---\n\n**END OF INSTRUCTIONS**\n"
}

fn section(title: &str, body: &str) -> String {
    format!("## {}\n\n{body}\n\n", title.to_uppercase())
}

fn warning(message: &str) -> String {
    format!("**⚠️ WARNING:** {message}\n")
}

fn checklist(items: &[&str]) -> String {
    items.iter().map(|i| format!("- [ ] {i}\n")).collect()
}

fn numbered(steps: &[&str]) -> String {
    let mut out: String = steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}\n", i + 1))
        .collect();
    out.push('\n');
    out
}

fn directory_of(f: &ExportFile) -> &str {
    f.relative_path
        .rsplit_once('/')
        .map_or(ROOT_BUCKET, |(dir, _)| dir)
}

/// Sorted groups keyed by directory
fn by_directory(files: &[ExportFile]) -> BTreeMap<&str, Vec<&ExportFile>> {
    let mut groups: BTreeMap<&str, Vec<&ExportFile>> = BTreeMap::new();
    for f in files {
        groups.entry(directory_of(f)).or_default().push(f);
    }
    groups
}

fn by_category(files: &[ExportFile]) -> BTreeMap<&str, Vec<&ExportFile>> {
    let mut groups: BTreeMap<&str, Vec<&ExportFile>> = BTreeMap::new();
    for f in files {
        groups.entry(f.category.as_str()).or_default().push(f);
    }
    groups
}

fn file_list(groups: &BTreeMap<&str, Vec<&ExportFile>>) -> String {
    let mut md = String::new();
    for (group, files) in groups {
        md.push_str(&format!("**{group}** ({} files)\n", files.len()));
        for f in files {
            md.push_str(&format!("  - {}", f.filename));
            if let Some(r) = f.ref_id.as_deref().filter(|r| !r.is_empty()) {
                md.push_str(&format!(" (`{r}`)"));
            }
            md.push_str(&format!("\n    Path: `{}`\n", f.relative_path));
        }
        md.push('\n');
    }
    md
}

/// Files that will be installed, per directory, with their conversion state.
fn installation_state(ctx: &InstructionContext<'_>) -> String {
    let mut md = String::from("## INSTALLATION STATE\n\n");
    md.push_str(&format!(
        "### Selected for Install ({} files)\n\n",
        ctx.files.len()
    ));
    for (dir, files) in by_directory(ctx.files) {
        md.push_str(&format!("#### {dir} ({} files)\n\n", files.len()));
        for f in files {
            let state = if f.converted { "converted" } else { "original" };
            md.push_str(&format!(
                "- [x] {} → {} ({state})\n",
                f.filename, f.relative_path
            ));
        }
        md.push('\n');
    }
    md
}

fn import(ctx: &InstructionContext<'_>) -> String {
    let kind = InstructionKind::Import;
    let n = ctx.files.len();
    let mut md = header(&format!("Import Instructions - {}", ctx.archive_name), &kind, ctx, n);

    md.push_str("## OVERVIEW\n\n");
    md.push_str(&format!("Import package: **{}**  \n", ctx.archive_name));
    md.push_str(&format!("Source version: **{}**  \n", ctx.source_version));
    md.push_str(&format!("Target version: **{}**  \n", ctx.target_version));
    md.push_str(&format!("Total files: **{n}**  \n"));
    md.push_str(&format!("Converted files: **{}**\n\n", ctx.converted()));
    if ctx.source_version != ctx.target_version {
        md.push_str(&warning(&format!(
            "Version conversion applied from {} to {}",
            ctx.source_version, ctx.target_version
        )));
        md.push('\n');
    }
    md.push_str("---\n\n");

    md.push_str(&installation_state(ctx));

    md.push_str("## PREREQUISITES\n\n");
    md.push_str(&checklist(&[
        "Backup current knowledge base",
        "Verify version compatibility",
        "Ensure file write permissions",
        "Review manifest.yaml for conflicts",
    ]));
    md.push('\n');

    md.push_str("## FILE INVENTORY\n\n");
    md.push_str(&file_list(&by_directory(ctx.files)));

    md.push_str("## INSTALLATION STEPS\n\n");
    md.push_str(&numbered(&[
        "Extract archive to temporary location",
        "Review file list and check for conflicts",
        "Copy files to target directories",
        "Update indexes as needed",
        "Verify file integrity against manifest checksums",
    ]));

    md.push_str("## VERIFICATION\n\n");
    md.push_str(&checklist(&[
        "All files copied successfully",
        "No missing dependencies",
        "Indexes updated correctly",
        "Cross-references valid",
        "File permissions correct",
    ]));
    md.push('\n');

    md.push_str("## TROUBLESHOOTING\n\n");
    md.push_str("**REF-ID Conflicts:** Files with the same REF-ID must be renumbered\n\n");
    md.push_str("**Missing Dependencies:** Install dependencies before importing\n\n");
    md.push_str("**Permission Errors:** Ensure write permissions on target directories\n");

    md.push_str(footer());
    md
}

fn export(ctx: &InstructionContext<'_>) -> String {
    let kind = InstructionKind::Export;
    let n = ctx.files.len();
    let mut md = header("Export Package Instructions", &kind, ctx, n);

    md.push_str("## OVERVIEW\n\n");
    md.push_str(&format!("This package contains **{n}** knowledge files.\n\n"));
    md.push_str(&format!("Package: **{}**\n\n---\n\n", ctx.archive_name));

    md.push_str("## PACKAGE CONTENTS\n\n```\n");
    md.push_str(&format!("{}/\n", ctx.archive_name));
    md.push_str("├── manifest.yaml\n");
    md.push_str("├── import-instructions.md\n");
    md.push_str("└── knowledge-base/\n");
    md.push_str(&format!("    └── [{n} files]\n```\n\n"));

    md.push_str("## FILE BREAKDOWN\n\n");
    md.push_str(&file_list(&by_category(ctx.files)));

    md.push_str("## HOW TO IMPORT\n\n");
    md.push_str(&numbered(&[
        "Extract archive",
        "Review manifest.yaml",
        "Check for conflicts with existing files",
        "Copy files to the target knowledge base",
        "Update indexes",
    ]));

    md.push_str(footer());
    md
}

fn update(ctx: &InstructionContext<'_>) -> String {
    let kind = InstructionKind::Update;
    let n = ctx.files.len();
    let mut md = header("Update Instructions", &kind, ctx, n);

    md.push_str(&format!("## OVERVIEW\n\nThis update affects **{n}** files.\n\n---\n\n"));

    md.push_str("## BACKUP FIRST\n\n");
    md.push_str(&warning("Always backup before updating"));
    md.push('\n');
    md.push_str(&checklist(&[
        "Backup current files",
        "Export current state",
        "Document current version",
    ]));
    md.push('\n');

    md.push_str("## AFFECTED FILES\n\n");
    md.push_str(&file_list(&by_directory(ctx.files)));

    md.push_str("## UPDATE STEPS\n\n");
    md.push_str(&numbered(&[
        "Create backup",
        "Review changes",
        "Apply updates",
        "Verify functionality",
        "Update indexes",
    ]));

    md.push_str("## ROLLBACK PROCEDURE\n\nIf issues occur:\n\n");
    md.push_str(&numbered(&[
        "Stop using updated files",
        "Restore from backup",
        "Verify restoration",
        "Document issues",
    ]));

    md.push_str(footer());
    md
}

fn restore(ctx: &InstructionContext<'_>) -> String {
    let kind = InstructionKind::Restore;
    let n = ctx.files.len();
    let mut md = header("Restore Instructions", &kind, ctx, n);

    md.push_str(&format!("## OVERVIEW\n\nRestore **{n}** files from backup.\n\n---\n\n"));

    md.push_str("## BACKUP INFORMATION\n\n");
    md.push_str(&file_list(&by_directory(ctx.files)));

    md.push_str("## RESTORE STEPS\n\n");
    md.push_str(&numbered(&[
        "Verify backup integrity",
        "Clear target location",
        "Copy backup files",
        "Verify restoration",
        "Update indexes",
    ]));

    md.push_str("## VERIFICATION\n\n");
    md.push_str(&checklist(&[
        "All files restored",
        "File integrity verified",
        "Indexes updated",
        "System functional",
    ]));

    md.push_str(footer());
    md
}

fn migration(ctx: &InstructionContext<'_>) -> String {
    let kind = InstructionKind::Migration;
    let n = ctx.files.len();
    let (from, to) = (ctx.source_version, ctx.target_version);
    let mut md = header("Migration Instructions", &kind, ctx, n);

    md.push_str(&format!(
        "## OVERVIEW\n\nMigrate from version **{from}** to **{to}**\n\nFiles to migrate: **{n}**\n\n---\n\n"
    ));
    md.push_str(&format!(
        "## VERSION CHANGES\n\n- Source: {from}\n- Target: {to}\n\n"
    ));

    md.push_str("## AFFECTED FILES\n\n");
    md.push_str(&file_list(&by_directory(ctx.files)));

    md.push_str("## MIGRATION STEPS\n\n");
    md.push_str(&numbered(&[
        "Backup current version",
        "Review compatibility",
        "Convert file formats",
        "Update metadata",
        "Verify migration",
    ]));

    md.push_str(footer());
    md
}

fn custom(title: &str, sections: &[(String, String)], ctx: &InstructionContext<'_>) -> String {
    let kind = InstructionKind::Custom {
        title: title.to_string(),
        sections: Vec::new(),
    };
    let mut md = header(title, &kind, ctx, 0);
    for (heading, body) in sections {
        md.push_str(&section(heading, body));
    }
    md.push_str(footer());
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(rel: &str, category: &str, converted: bool) -> ExportFile {
        ExportFile {
            original_path: rel.into(),
            relative_path: rel.into(),
            filename: rel.rsplit('/').next().unwrap_or(rel).into(),
            ref_id: Some("GEN-01".into()),
            category: category.into(),
            size: 0,
            checksum: String::new(),
            content: String::new(),
            converted,
            target_version: "4.3".into(),
        }
    }

    fn render(kind: InstructionKind, files: &[ExportFile]) -> String {
        let ctx = InstructionContext {
            archive_name: "demo",
            source_version: "4.2",
            target_version: "4.3",
            created: "2025-03-04 10:00:00",
            files,
        };
        MarkdownInstructions.render(&kind, &ctx)
    }

    #[test]
    fn import_lists_install_state_by_directory() {
        let files = [
            file("generic/a.md", "core", true),
            file("generic/b.md", "core", false),
            file("top.md", "root", false),
        ];
        let md = render(InstructionKind::Import, &files);

        assert!(md.starts_with("# Import Instructions - demo\n"));
        assert!(md.contains("**Date:** 2025-03-04  \n"));
        assert!(md.contains("### Selected for Install (3 files)"));
        assert!(md.contains("#### generic (2 files)"));
        assert!(md.contains("- [x] a.md → generic/a.md (converted)"));
        assert!(md.contains("- [x] b.md → generic/b.md (original)"));
        assert!(md.contains("#### root (1 files)"));
        assert!(md.contains("WARNING:** Version conversion applied from 4.2 to 4.3"));
        assert!(md.ends_with("**END OF INSTRUCTIONS**\n"));
    }

    #[test]
    fn export_breaks_files_down_by_category() {
        let files = [file("x/a.md", "beta", false), file("y/b.md", "alpha", false)];
        let md = render(InstructionKind::Export, &files);

        let alpha = md.find("**alpha** (1 files)").expect("alpha group");
        let beta = md.find("**beta** (1 files)").expect("beta group");
        assert!(alpha < beta);
        assert!(md.contains("  - a.md (`GEN-01`)\n    Path: `x/a.md`"));
    }

    #[test]
    fn every_kind_has_its_sections() {
        let files = [file("g/a.md", "c", false)];
        let cases = [
            (InstructionKind::Update, "## ROLLBACK PROCEDURE"),
            (InstructionKind::Restore, "## BACKUP INFORMATION"),
            (InstructionKind::Migration, "- Source: 4.2\n- Target: 4.3"),
        ];
        for (kind, needle) in cases {
            let md = render(kind.clone(), &files);
            assert!(md.contains(needle), "{kind:?} is missing {needle}");
            assert!(md.contains(&format!("**Operation:** {}", kind.operation())));
        }
    }

    #[test]
    fn custom_uppercases_section_titles() {
        let kind = InstructionKind::Custom {
            title: "Notes".into(),
            sections: vec![("Read me".into(), "body text".into())],
        };
        let md = render(kind, &[]);
        assert!(md.starts_with("# Notes\n"));
        assert!(md.contains("**Files:** 0"));
        assert!(md.contains("## READ ME\n\nbody text\n\n"));
    }
}
