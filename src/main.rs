use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use letssync::cli::{Cli, Commands};
use letssync::output::{self, Verbosity};
use letssync::{SyncContext, certs, commands};
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "letssync=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    if cli.quiet {
        output::set_verbosity(Verbosity::Quiet);
    } else if cli.verbose {
        output::set_verbosity(Verbosity::Verbose);
    }

    if let Commands::Completion { shell } = cli.command {
        print_completions(shell, &mut Cli::command());
        return Ok(());
    }

    certs::install()?;
    let mut ctx = SyncContext::new(cli.config)?;

    match cli.command {
        Commands::Scan { dir, output, name } => {
            commands::scan::execute(&ctx, &dir, output.as_deref(), name.as_deref())?;
        }
        Commands::Diff { old, new, name_only } => {
            commands::diff::execute(&ctx, &old, &new, name_only)?;
        }
        Commands::Write {
            snapshot,
            dir,
            overwrite,
        } => {
            commands::write::execute(&ctx, &snapshot, &dir, overwrite)?;
        }
        Commands::Copy {
            src,
            dst,
            overwrite,
        } => {
            commands::copy::execute(&ctx, &src, &dst, overwrite)?;
        }
        Commands::Check { dir } => commands::check::execute(&ctx, &dir)?,
        Commands::Config { key, value, list } => {
            commands::config::execute(&mut ctx, key.as_deref(), value, list)?;
        }
        Commands::Completion { .. } => {}
    }

    Ok(())
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
