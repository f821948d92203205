//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::config::{OutputFormat, SortOrder, Strategy};

/// Build nested trees from flat, parent-referencing records
#[derive(Parser, Debug)]
#[command(name = "treenode")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Directory with a local .treenode.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build trees from a JSON record file
    Build {
        /// JSON file: array of records or {"records": [...]}
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Code of the record to build from (default: every root-level record)
        #[arg(short, long)]
        root: Option<String>,

        /// Comma separated fields to copy onto each node
        #[arg(short, long)]
        expand: Option<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Sort siblings after building
        #[arg(short, long, value_enum)]
        sort: Option<SortOrder>,

        /// Child lookup strategy
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,

        /// Write output to file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Exit with an error if any record or subtree failed
        #[arg(long)]
        strict: bool,
    },

    /// List root-level records
    Roots {
        /// JSON record file
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective settings
    Show,
    /// Show config file locations
    Path,
}
