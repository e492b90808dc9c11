//! `kbt version ...` handlers.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use serde::Serialize;

use super::{BatchReport, UNKNOWN_VERSION, VersionCompatibility, VersionConverter, VersionDetector};
use crate::cli::{
    AppContext, VersionArgs, VersionCheckArgs, VersionConvertArgs, VersionDetectArgs,
    VersionFeaturesArgs, VersionInfoArgs, VersionPathArgs, VersionSubcommand,
};
use crate::infra::config::load_config;

pub fn run(args: VersionArgs, ctx: &AppContext) -> Result<()> {
    match args.command {
        VersionSubcommand::Detect(a) => detect(a, ctx),
        VersionSubcommand::Info(a) => info(a, ctx),
        VersionSubcommand::Path(a) => path(a, ctx),
        VersionSubcommand::Check(a) => check(a, ctx),
        VersionSubcommand::Features(a) => features(a, ctx),
        VersionSubcommand::Convert(a) => convert(a, ctx),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serialize output")?
    );
    Ok(())
}

fn detector() -> Result<VersionDetector> {
    let config = load_config()?;
    Ok(VersionDetector::new(&config.version)
        .context("invalid detection configuration")?
        .with_scan_filters(&config.scan))
}

fn detect(args: VersionDetectArgs, ctx: &AppContext) -> Result<()> {
    let detector = detector()?;

    if args.assess {
        let report = detector
            .assess(&args.path)
            .with_context(|| format!("assessing {}", args.path.display()))?;
        if args.json {
            return print_json(&report);
        }

        println!("{}", report.version.as_deref().unwrap_or(UNKNOWN_VERSION));
        if !ctx.quiet {
            println!(
                "  method: {}  confidence: {:.2}{}",
                report.method.map_or("none", |m| m.as_str()),
                report.confidence,
                if report.low_confidence { " (low)" } else { "" }
            );
            for (method, result) in &report.results {
                println!(
                    "  {method}: {} ({:.2})",
                    result.version.as_deref().unwrap_or("-"),
                    result.confidence
                );
            }
        }
        return Ok(());
    }

    let version = detector.detect_version(&args.path);
    if args.json {
        return print_json(&serde_json::json!({ "version": version }));
    }
    println!("{version}");
    Ok(())
}

fn info(args: VersionInfoArgs, _ctx: &AppContext) -> Result<()> {
    let info = detector()?.get_version_info(&args.path);
    if args.json {
        return print_json(&info);
    }

    println!("version: {}", info.version);
    println!("detected: {}", info.detected);
    if let Some(base) = &info.base_path {
        println!("base: {}", base.display());
    }
    println!("domains: {}", info.domains.join(", "));
    println!("support: {}", info.support_dirs.join(", "));
    Ok(())
}

fn path(args: VersionPathArgs, _ctx: &AppContext) -> Result<()> {
    let config = load_config()?;
    let compat = VersionCompatibility::new(&config.version);

    if args.from == args.to {
        println!("{}", args.from);
        return Ok(());
    }
    let hops = compat.get_conversion_path(&args.from, &args.to);
    if hops.is_empty() {
        bail!("no conversion path from {} to {}", args.from, args.to);
    }
    println!("{}", hops.join(" -> "));
    Ok(())
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    #[serde(flatten)]
    report: super::CompatibilityReport,
    ordering: &'a str,
    breaking: bool,
    conversion_path: Vec<String>,
}

fn check(args: VersionCheckArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config()?;
    let compat = VersionCompatibility::new(&config.version);

    for v in [&args.v1, &args.v2] {
        if !compat.is_valid_version(v) {
            bail!("invalid version {v}");
        }
    }

    let ordering = match VersionCompatibility::compare(&args.v1, &args.v2) {
        std::cmp::Ordering::Less => "older",
        std::cmp::Ordering::Equal => "same",
        std::cmp::Ordering::Greater => "newer",
    };
    let out = CheckOutput {
        report: compat.check_compatibility(&args.v1, &args.v2),
        ordering,
        breaking: VersionCompatibility::has_breaking_changes(&args.v1, &args.v2),
        conversion_path: compat.get_conversion_path(&args.v1, &args.v2),
    };

    if args.json {
        return print_json(&out);
    }

    let verdict = if out.report.compatible {
        "compatible"
    } else {
        "incompatible"
    };
    if ctx.no_color {
        println!("{verdict}");
    } else if out.report.compatible {
        println!("{}", verdict.green());
    } else {
        println!("{}", verdict.red());
    }
    println!("relationship: {}", out.report.relationship);
    println!("{} is {} than {}", args.v1, ordering, args.v2);
    if out.breaking {
        println!("major version changes");
    }
    if !out.conversion_path.is_empty() {
        println!("path: {}", out.conversion_path.join(" -> "));
    }
    if !ctx.quiet && compat.is_deprecated(&args.v1) {
        eprintln!("{} is deprecated", args.v1);
    }
    Ok(())
}

fn features(args: VersionFeaturesArgs, _ctx: &AppContext) -> Result<()> {
    let config = load_config()?;
    let compat = VersionCompatibility::new(&config.version);

    let Some(other) = args.other else {
        let features = compat.features(&args.version);
        if args.json {
            return print_json(&features);
        }
        for f in features {
            println!("{f}");
        }
        return Ok(());
    };

    let diff = compat.compare_features(&args.version, &other);
    if args.json {
        return print_json(&diff);
    }
    for (label, list) in [
        ("added", &diff.added),
        ("removed", &diff.removed),
        ("common", &diff.common),
    ] {
        println!("{label}: {}", list.join(", "));
    }
    Ok(())
}

fn convert(args: VersionConvertArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config()?;
    let detector = VersionDetector::new(&config.version).context("invalid version tag patterns")?;
    let converter = VersionConverter::new(&config.version);

    let single = args.files.len() == 1;
    if args.output.is_some() && !single {
        bail!("--output takes one file; use --out-dir or --in-place");
    }
    let to_stdout = args.output.is_none() && args.out_dir.is_none() && !args.in_place;
    if to_stdout && !single && !ctx.dry_run {
        bail!("converting several files needs --out-dir DIR or --in-place");
    }

    let report = converter.batch_convert(&detector, &args.files, args.from.as_deref(), &args.to);

    if ctx.dry_run {
        if args.json {
            return print_json(&report);
        }
        if !ctx.quiet {
            println!("{}", "DRY RUN: Would convert:".yellow());
            for f in &report.success {
                println!("  {} ({} -> {})", f.path.display(), f.from_version, f.to_version);
            }
            for s in &report.skipped {
                println!("  skip {}: {}", s.path.display(), s.reason);
            }
            for f in &report.failed {
                println!("  fail {}: {}", f.path.display(), f.error);
            }
        }
        return Ok(());
    }

    let destinations = destinations(&args, &report)?;
    for (file, dest) in report.success.iter().zip(&destinations) {
        match dest {
            Some(dest) => {
                fs::write(dest, &file.content)
                    .with_context(|| format!("writing {}", dest.display()))?;
                if !ctx.quiet {
                    eprintln!(
                        "Wrote {} ({} -> {})",
                        dest.display(),
                        file.from_version,
                        file.to_version
                    );
                }
            }
            None if !args.json => print!("{}", file.content),
            None => {}
        }
    }
    // An unchanged single file still reaches stdout
    if to_stdout && !args.json {
        for s in &report.skipped {
            let text = fs::read_to_string(&s.path)
                .with_context(|| format!("reading {}", s.path.display()))?;
            print!("{text}");
        }
    }

    if args.json {
        print_json(&report)?;
    } else if !ctx.quiet {
        for s in &report.skipped {
            eprintln!("skipped {}: {}", s.path.display(), s.reason);
        }
    }
    for f in &report.failed {
        eprintln!("failed {}: {}", f.path.display(), f.error);
    }

    match report.failed.len() {
        0 => Ok(()),
        1 if single => bail!(
            "cannot convert {}: {}",
            report.failed[0].path.display(),
            report.failed[0].error
        ),
        n => bail!("{n} of {} files failed to convert", args.files.len()),
    }
}

/// Target file per converted entry; `None` means stdout. Fails before any
/// write when two inputs would land on the same output name.
fn destinations(args: &VersionConvertArgs, report: &BatchReport) -> Result<Vec<Option<PathBuf>>> {
    if let Some(out) = &args.output {
        return Ok(report.success.iter().map(|_| Some(out.clone())).collect());
    }
    if args.in_place {
        return Ok(report.success.iter().map(|f| Some(f.path.clone())).collect());
    }
    let Some(dir) = &args.out_dir else {
        return Ok(vec![None; report.success.len()]);
    };

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut seen = HashSet::new();
    report
        .success
        .iter()
        .map(|f| {
            let name = f
                .path
                .file_name()
                .with_context(|| format!("no file name in {}", f.path.display()))?;
            if !seen.insert(name.to_os_string()) {
                bail!("two inputs share the output name {}", name.to_string_lossy());
            }
            Ok(Some(dir.join(name)))
        })
        .collect()
}
