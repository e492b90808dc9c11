//! Tree commands: `scan`, `stats`, `filter` and `group`.
//!
//! Each command scans the base once, then prints either a colored `ptree`
//! rendering or JSON on stdout.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use ptree::TreeBuilder;
use serde::Serialize;

use crate::cli::{AppContext, FilterArgs, GroupArgs, ScanArgs, ScanOpts, StatsArgs};
use crate::core::formatter::TreeFormatter;
use crate::core::model::{ScanTree, UiTreeNode};
use crate::core::ops::{FileListOperations, FilterCriteria, TreeStats};
use crate::core::scanner::TreeScanner;
use crate::core::version::{VersionDetector, VersionInfo};
use crate::infra::config::{Config, ScanOverrides, load_config};

/// UI tree of one scan together with the knowledge base version
#[derive(Debug, Clone, Serialize)]
pub struct VersionedScan {
    pub version: String,
    pub version_info: VersionInfo,
    pub stats: TreeStats,
    pub base_path: String,
    pub tree: Vec<UiTreeNode>,
}

/// Scan `base` and detect its version. `version` replaces the detected
/// version; `version_info` always reflects detection.
pub fn scan_with_version(
    config: &Config,
    base: &Path,
    overrides: &ScanOverrides,
    version: Option<&str>,
) -> crate::error::Result<VersionedScan> {
    let tree = TreeScanner::new(config)?.scan_complete(base, overrides)?;
    let detector = VersionDetector::new(&config.version)?.with_scan_filters(&config.scan);
    let version_info = detector.get_version_info(base);

    Ok(VersionedScan {
        version: version.map_or_else(|| version_info.version.clone(), str::to_string),
        stats: FileListOperations::new(&config.format).generate_stats(&tree),
        tree: TreeFormatter::new(&config.format).format_for_ui(&tree),
        base_path: tree.base_path,
        version_info,
    })
}

impl From<&ScanOpts> for ScanOverrides {
    fn from(opts: &ScanOpts) -> Self {
        let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
        Self {
            include_hidden: opts.hidden.then_some(true),
            max_depth: opts.max_depth,
            file_extensions: non_empty(&opts.extensions),
            exclude_dirs: non_empty(&opts.exclude_dirs),
            include_metadata: opts.no_metadata.then_some(false),
        }
    }
}

fn scan(path: &Path, opts: &ScanOpts) -> Result<(Config, ScanTree)> {
    let config = load_config()?;
    let scanner = TreeScanner::new(&config).context("invalid metadata configuration")?;
    let tree = scanner
        .scan_complete(path, &ScanOverrides::from(opts))
        .with_context(|| format!("scanning {}", path.display()))?;
    Ok((config, tree))
}

fn print_dry_run(ctx: &AppContext, command: &str, path: &Path, opts: &ScanOpts) -> bool {
    if !ctx.dry_run {
        return false;
    }
    if !ctx.quiet {
        println!("{}", format!("DRY RUN: Would {command}:").yellow());
        println!("  Root: {}", path.display());
        println!("  Overrides: {:?}", ScanOverrides::from(opts));
    }
    true
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serialize output")?
    );
    Ok(())
}

pub fn run(args: ScanArgs, ctx: &AppContext) -> Result<()> {
    if print_dry_run(ctx, "scan", &args.path, &args.scan) {
        return Ok(());
    }

    if args.with_version || args.assume_version.is_some() {
        return run_versioned(&args, ctx);
    }

    let (config, tree) = scan(&args.path, &args.scan)?;
    let ui = TreeFormatter::new(&config.format).format_for_ui(&tree);

    if args.json {
        return print_json(&ui);
    }
    print_tree(&tree, &ui, ctx)
}

fn run_versioned(args: &ScanArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config()?;
    let scan = scan_with_version(
        &config,
        &args.path,
        &ScanOverrides::from(&args.scan),
        args.assume_version.as_deref(),
    )
    .with_context(|| format!("scanning {}", args.path.display()))?;

    if args.json {
        return print_json(&scan);
    }

    print_ui(
        &scan.base_path,
        &scan.tree,
        (scan.stats.total_files, scan.stats.total_directories),
        ctx,
    )?;
    let source = if args.assume_version.is_some() {
        "assumed"
    } else if scan.version_info.detected {
        "detected"
    } else {
        "not detected"
    };
    println!("version: {} ({source})", scan.version);
    Ok(())
}

pub fn stats_run(args: StatsArgs, ctx: &AppContext) -> Result<()> {
    if print_dry_run(ctx, "summarize", &args.path, &args.scan) {
        return Ok(());
    }

    let (config, tree) = scan(&args.path, &args.scan)?;
    let stats = FileListOperations::new(&config.format).generate_stats(&tree);

    if args.json {
        return print_json(&stats);
    }

    let heading = |s: &str| {
        if ctx.no_color {
            s.to_string()
        } else {
            s.bold().to_string()
        }
    };
    println!("{} {}", heading("Files:"), stats.total_files);
    println!("{} {}", heading("Directories:"), stats.total_directories);
    println!("{} {}", heading("With REF-ID:"), stats.with_ref_id);
    println!("{} {}", heading("With version:"), stats.with_version);
    for (title, counts) in [
        ("By domain:", &stats.by_domain),
        ("By category:", &stats.by_category),
        ("By extension:", &stats.by_extension),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!("{}", heading(title));
        for (key, n) in counts {
            println!("  {key}: {n}");
        }
    }
    Ok(())
}

pub fn filter_run(args: FilterArgs, ctx: &AppContext) -> Result<()> {
    if print_dry_run(ctx, "filter", &args.path, &args.scan) {
        return Ok(());
    }

    let (config, tree) = scan(&args.path, &args.scan)?;
    let criteria = FilterCriteria {
        category: args.category,
        domain: args.domain,
        has_ref_id: args.has_ref_id,
        has_version: args.has_version,
        filename_pattern: args.pattern,
    };
    let filtered = FileListOperations::new(&config.format).filter_tree(&tree, &criteria)?;
    let ui = TreeFormatter::new(&config.format).format_for_ui(&filtered);

    if args.json {
        return print_json(&ui);
    }
    print_tree(&filtered, &ui, ctx)
}

pub fn group_run(args: GroupArgs, ctx: &AppContext) -> Result<()> {
    if print_dry_run(ctx, "group", &args.path, &args.scan) {
        return Ok(());
    }

    let (config, tree) = scan(&args.path, &args.scan)?;
    let ops = FileListOperations::new(&config.format);
    let files = ops.flat_files(&tree);
    let groups = ops.group_by(&files, args.by);

    if args.json {
        let paths: indexmap::IndexMap<&str, Vec<&str>> = groups
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str(),
                    v.iter().map(|f| f.relative_path.as_str()).collect(),
                )
            })
            .collect();
        return print_json(&paths);
    }

    for (key, members) in &groups {
        let title = format!("{key} ({} files)", members.len());
        if ctx.no_color {
            println!("{title}");
        } else {
            println!("{}", title.blue());
        }
        for f in members {
            println!("  {}", f.relative_path);
        }
    }
    Ok(())
}

/// Print the UI tree under a base label. `--quiet` suppresses the summary line.
fn print_tree(tree: &ScanTree, ui: &[UiTreeNode], ctx: &AppContext) -> Result<()> {
    print_ui(
        &tree.base_path,
        ui,
        (tree.total_files, tree.total_directories),
        ctx,
    )
}

/// `totals` is `(files, directories)`
fn print_ui(
    base_path: &str,
    ui: &[UiTreeNode],
    totals: (usize, usize),
    ctx: &AppContext,
) -> Result<()> {
    let root_label = Path::new(base_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| base_path.to_string());

    let mut builder = TreeBuilder::new(dir_label(&root_label, ctx.no_color));
    add_nodes(&mut builder, ui, ctx.no_color);
    ptree::print_tree(&builder.build())?;

    if !ctx.quiet {
        println!("{} files in {} directories", totals.0, totals.1);
    }
    Ok(())
}

fn add_nodes(builder: &mut TreeBuilder, nodes: &[UiTreeNode], no_color: bool) {
    for node in nodes {
        let label = node_label(node, no_color);
        if node.children().is_empty() {
            builder.add_empty_child(label);
        } else {
            builder.begin_child(label);
            add_nodes(builder, node.children(), no_color);
            builder.end_child();
        }
    }
}

fn node_label(node: &UiTreeNode, no_color: bool) -> String {
    match node {
        UiTreeNode::Directory {
            name, total_files, ..
        } => format!("{} ({total_files})", dir_label(name, no_color)),
        UiTreeNode::File {
            name,
            version,
            ref_id,
            ..
        } => {
            let mut label = if no_color {
                name.clone()
            } else {
                color_by_ext(name)
            };
            if let Some(r) = ref_id {
                label.push_str(&format!(" [{r}]"));
            }
            if let Some(v) = version {
                label.push_str(&format!(" v{v}"));
            }
            label
        }
    }
}

fn dir_label(name: &str, no_color: bool) -> String {
    if no_color {
        format!("{name}/")
    } else {
        format!("{}/", name.blue())
    }
}

fn color_by_ext(name: &str) -> String {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("md") => name.white().to_string(),
        Some("txt") => name.green().to_string(),
        Some("yaml" | "yml" | "json" | "toml") => name.bright_blue().to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, ref_id: Option<&str>, version: Option<&str>) -> UiTreeNode {
        UiTreeNode::File {
            name: name.into(),
            path: name.into(),
            size: 1,
            modified: 0,
            version: version.map(String::from),
            ref_id: ref_id.map(String::from),
            category: None,
            purpose: None,
        }
    }

    #[test]
    fn plain_labels_carry_ref_and_version() {
        assert_eq!(
            node_label(&file("a.md", Some("GEN-01"), Some("4.3")), true),
            "a.md [GEN-01] v4.3"
        );
        let dir = UiTreeNode::Directory {
            name: "generic".into(),
            path: "generic".into(),
            file_count: 1,
            total_files: 3,
            children: vec![],
        };
        assert_eq!(node_label(&dir, true), "generic/ (3)");
    }

    #[test]
    fn versioned_scan_carries_detection() -> crate::error::Result<()> {
        let kb = tempfile::TempDir::new()?;
        for rel in ["generic/a.md", "platforms/aws/b.md"] {
            let p = kb.path().join(rel);
            std::fs::create_dir_all(p.parent().unwrap())?;
            std::fs::write(p, "# x\n")?;
        }
        let config = Config::default();

        let scan = scan_with_version(&config, kb.path(), &ScanOverrides::default(), None)?;
        assert_eq!(scan.version, "4.2");
        assert!(scan.version_info.detected);
        assert_eq!(scan.stats.total_files, 2);
        assert_eq!(scan.tree.len(), 2);

        let assumed =
            scan_with_version(&config, kb.path(), &ScanOverrides::default(), Some("4.3"))?;
        assert_eq!(assumed.version, "4.3");
        assert_eq!(assumed.version_info.version, "4.2");
        Ok(())
    }

    #[test]
    fn cli_flags_become_overrides() {
        let o = ScanOverrides::from(&ScanOpts {
            max_depth: Some(2),
            extensions: vec![],
            exclude_dirs: vec!["x".into()],
            hidden: false,
            no_metadata: true,
        });
        assert_eq!(o.max_depth, Some(2));
        assert_eq!(o.file_extensions, None);
        assert_eq!(o.exclude_dirs, Some(vec!["x".to_string()]));
        assert_eq!(o.include_hidden, None);
        assert_eq!(o.include_metadata, Some(false));
    }
}
