//! `kbt export` handler.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use super::{ExportRequest, Exporter, InstructionKind};
use crate::cli::{AppContext, ExportArgs, InstructionChoice};
use crate::core::scanner::TreeScanner;
use crate::infra::config::{ScanOverrides, load_config};

impl From<InstructionChoice> for InstructionKind {
    fn from(choice: InstructionChoice) -> Self {
        match choice {
            InstructionChoice::Import => InstructionKind::Import,
            InstructionChoice::Export => InstructionKind::Export,
            InstructionChoice::Update => InstructionKind::Update,
            InstructionChoice::Restore => InstructionKind::Restore,
            InstructionChoice::Migration => InstructionKind::Migration,
        }
    }
}

pub fn run(args: ExportArgs, ctx: &AppContext) -> Result<()> {
    let mut config = load_config()?;
    if let Some(dir) = args.out_dir {
        config.export.output_dir = dir;
    }

    let selected_paths = if args.all {
        let tree = TreeScanner::new(&config)?
            .scan_complete(&args.path, &ScanOverrides::default())
            .with_context(|| format!("scanning {}", args.path.display()))?;
        tree.flat_files()
            .into_iter()
            .map(|f| f.relative_path.clone())
            .collect()
    } else {
        args.paths
    };

    let exporter = Exporter::new(&config).context("invalid export configuration")?;
    let request = ExportRequest {
        archive_name: args.name,
        description: args.description,
        selected_paths,
        source_version: args.from,
        target_version: args.to,
        tag_files: args.tag,
        instructions: args.instructions.map(InstructionKind::from),
    };

    if ctx.dry_run {
        let prepared = exporter.prepare(&args.path, &request)?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&prepared).context("serialize plan")?
            );
            return Ok(());
        }
        if !ctx.quiet {
            println!("{}", "DRY RUN: Would export:".yellow());
            println!(
                "  Package: {}",
                config.export.output_dir.join(&prepared.archive_name).display()
            );
            println!(
                "  Versions: {} -> {}",
                prepared.source_version, prepared.target_version
            );
            println!(
                "  Instructions: {}",
                request.instruction_kind(&prepared).operation()
            );
            for f in &prepared.files {
                let state = if f.converted { "converted" } else { "original" };
                println!("  {} -> {} ({state})", f.original_path, f.relative_path);
            }
            for s in &prepared.skipped {
                println!("  skip {}: {}", s.path, s.reason);
            }
        }
        return Ok(());
    }

    let report = exporter
        .export(&args.path, &request)
        .with_context(|| format!("exporting {}", args.path.display()))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
        return Ok(());
    }

    if !ctx.quiet {
        let line = format!(
            "Exported {} files ({} converted, {} -> {}) to {}",
            report.file_count,
            report.converted_count,
            report.source_version,
            report.target_version,
            report.archive_path.display()
        );
        if ctx.no_color {
            println!("{line}");
        } else {
            println!("{}", line.green());
        }
        for s in &report.skipped {
            eprintln!("skipped {}: {}", s.path, s.reason);
        }
    }
    Ok(())
}
