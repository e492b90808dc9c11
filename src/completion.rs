//! `kbt completions`: shell completion scripts for every subcommand.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::CommandFactory;
use clap_complete::{Shell as CompletionShell, generate, generate_to};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};

const BIN_NAME: &str = "kbt";

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Stream the script for `shell` into `out`.
pub fn write_script(shell: CompletionShell, out: &mut dyn Write) {
    generate(shell, &mut Cli::command(), BIN_NAME, out);
}

/// Write the script into `dir`, creating it, and return the file path.
pub fn write_script_to(shell: CompletionShell, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create completion dir {}", dir.display()))?;
    generate_to(shell, &mut Cli::command(), BIN_NAME, dir).context("generate completion file")
}

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    let shell: CompletionShell = args.shell.into();

    if args.stdout {
        write_script(shell, &mut io::stdout().lock());
        return Ok(());
    }

    let Some(dir) = args.out_dir else {
        bail!("pass --out-dir DIR or --stdout");
    };

    if ctx.dry_run {
        if !ctx.quiet {
            println!("DRY RUN: Would write {shell} completion to {}", dir.display());
        }
        return Ok(());
    }

    let path = write_script_to(shell, &dir)?;
    if !ctx.quiet {
        eprintln!("Wrote completion to {}", path.display());
    }
    Ok(())
}
