//! CLI interface for the annotator
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scholarly record annotator
///
/// Labels titles and abstracts with one or more prompting strategies against
/// an OpenAI-compatible language model, keeping a transcript per session.
#[derive(Parser, Debug)]
#[command(name = "annotator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Annotate a record file
    Run(RunArgs),

    /// List strategies and their concurrency group
    Strategies,

    /// Inspect or remove stored transcripts
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

/// Arguments of `annotator run`
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Records as JSON Lines (.jsonl) or a JSON array (.json)
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Comma separated strategies, menu numbers 1-5, or "all"
    #[arg(short, long, value_name = "LIST")]
    pub strategy: Option<String>,

    /// Exemplars to include: zero, one or few
    #[arg(long, value_name = "MODE")]
    pub shot: Option<String>,

    /// Process at most N records
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,

    /// Upper bound on concurrently running parallel strategies
    #[arg(short, long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Task name (defaults to the input file stem)
    #[arg(short, long, value_name = "NAME")]
    pub task: Option<String>,

    /// Replace transcripts left by an earlier run of the same task
    #[arg(long)]
    pub overwrite: bool,

    /// Maintain the session index for this run
    #[arg(long)]
    pub index: bool,
}

/// Session management actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List indexed sessions, newest first
    List {
        /// Number of sessions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the transcript of one session
    View {
        /// Session key, e.g. papers/0001_Urban_renewal/single
        key: String,
    },

    /// Delete one session transcript
    Delete {
        /// Session key
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments() {
        let cli = Cli::parse_from([
            "annotator",
            "--json",
            "run",
            "--input",
            "papers.jsonl",
            "--strategy",
            "single,cot",
            "--concurrency",
            "2",
            "--overwrite",
        ]);

        assert!(cli.json);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.input, PathBuf::from("papers.jsonl"));
                assert_eq!(args.strategy.as_deref(), Some("single,cot"));
                assert_eq!(args.concurrency, Some(2));
                assert!(args.overwrite);
                assert!(!args.index);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["annotator", "sessions", "view", "t/single", "--log", "debug"]);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Command::Sessions {
                action: SessionAction::View { .. }
            }
        ));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
