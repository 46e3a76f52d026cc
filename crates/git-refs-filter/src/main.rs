//! CLI entry point for git-refs-filter.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod commands;

/// Inspect ref advertisements with closed changes filtered out.
#[derive(Parser, Debug)]
#[command(
    name = "git-refs-filter",
    version,
    about = "git-refs-filter: hide refs of closed changes from ref advertisements"
)]
struct Cli {
    /// Path to repo or any subdir (defaults to current).
    #[arg(long)]
    repo: Option<String>,

    /// Explicit config file (defaults to `.git-refs-filter/config.toml` in the repo).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the refs a viewer would be advertised.
    LsRefs {
        /// Project whose settings apply.
        #[arg(long)]
        project: String,
        /// Show refs as a viewer without the filtering capability.
        #[arg(long)]
        unfiltered: bool,
        /// Print JSON instead of `<oid> <ref>` lines.
        #[arg(long)]
        json: bool,
    },

    /// Check whether a single ref is visible.
    CheckRef {
        /// Project whose settings apply.
        #[arg(long)]
        project: String,
        /// Full ref name, e.g. `refs/changes/01/1/1`.
        name: String,
    },
}

fn main() -> Result<()> {
    let Cli { repo, config, cmd } = Cli::parse();
    install_tracing();

    let repo_path = repo.unwrap_or_else(|| ".".to_owned());
    let ctx = commands::Context::open(&repo_path, config.as_deref())?;
    let mut stdout = std::io::stdout().lock();
    match cmd {
        Command::LsRefs {
            project,
            unfiltered,
            json,
        } => commands::ls_refs(&ctx, &project.into(), unfiltered, json, &mut stdout),
        Command::CheckRef { project, name } => {
            commands::check_ref(&ctx, &project.into(), &name, &mut stdout)
        }
    }
}

fn install_tracing() {
    // RUST_LOG overrides the INFO default.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ls_refs_command() {
        let cli = Cli::parse_from([
            "git-refs-filter",
            "--repo",
            "/srv/git/app.git",
            "ls-refs",
            "--project",
            "team/app",
            "--json",
        ]);

        assert_eq!(cli.repo.as_deref(), Some("/srv/git/app.git"));
        match cli.cmd {
            Command::LsRefs {
                project,
                unfiltered,
                json,
            } => {
                assert_eq!(project, "team/app");
                assert!(!unfiltered);
                assert!(json);
            }
            Command::CheckRef { .. } => panic!("expected ls-refs command"),
        }
    }

    #[test]
    fn parse_check_ref_command() {
        let cli = Cli::parse_from([
            "git-refs-filter",
            "--config",
            "filter.toml",
            "check-ref",
            "--project",
            "app",
            "refs/changes/01/1/1",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("filter.toml")));
        match cli.cmd {
            Command::CheckRef { project, name } => {
                assert_eq!(project, "app");
                assert_eq!(name, "refs/changes/01/1/1");
            }
            Command::LsRefs { .. } => panic!("expected check-ref command"),
        }
    }

    #[test]
    fn project_is_required() {
        assert!(Cli::try_parse_from(["git-refs-filter", "ls-refs"]).is_err());
    }
}
