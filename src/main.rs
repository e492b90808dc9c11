use anyhow::Result;
use clap::Parser;
use kbtree::cli::{AppContext, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    kbtree::infra::logging::init(ctx.quiet, ctx.no_color);

    match cli.command {
        Commands::Scan(args) => kbtree::scan_run(args, &ctx),
        Commands::Stats(args) => kbtree::stats_run(args, &ctx),
        Commands::Filter(args) => kbtree::filter_run(args, &ctx),
        Commands::Group(args) => kbtree::group_run(args, &ctx),
        Commands::Version(args) => kbtree::core::version::command::run(args, &ctx),
        Commands::Export(args) => kbtree::core::export::command::run(args, &ctx),
        Commands::Init(args) => kbtree::infra::config::init(args, &ctx),
        Commands::Completions(args) => kbtree::completion::run(args, &ctx),
    }
}
