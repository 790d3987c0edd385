// src/cli.rs

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::mentor::AssistKind;
use crate::templates::Problem;

/// Sandboxed runner for Python / JavaScript / Java snippets.
///
/// `codementor.yaml` is optional; CLI flags only override config values.
#[derive(Parser, Debug)]
#[command(name = "codementor", version, disable_help_subcommand = true)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "codementor.yaml")]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// How `run` prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
    /// Program output followed by a short status block
    #[default]
    Simple,
    /// Indented JSON
    Pretty,
    /// Single-line JSON
    Json,
}

/// All supported CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a source file.
    Run {
        /// Source file to execute
        file: PathBuf,

        /// Language override
        ///
        /// Inferred from the file extension when omitted.
        #[arg(short, long)]
        language: Option<String>,

        /// File whose contents are fed to the program's stdin
        #[arg(long)]
        stdin: Option<PathBuf>,

        /// Override timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(short, long, value_enum, default_value_t = OutputMode::Simple)]
        output: OutputMode,

        /// Re-run whenever the file changes.
        #[arg(long)]
        watch: bool,
    },

    /// Start the JSON API.
    Serve {
        /// Listen address, e.g. 127.0.0.1:8080
        #[arg(long)]
        addr: Option<String>,
    },

    /// Print (or write) a starter template.
    Template {
        /// python | javascript | java
        language: String,

        #[arg(short, long, value_enum, default_value_t = Problem::Blank)]
        problem: Problem,

        /// Write the template to this path instead of stdout
        #[arg(short, long)]
        write: Option<PathBuf>,
    },

    /// Run pre-execution checks and print code statistics.
    Check {
        file: PathBuf,

        #[arg(short, long)]
        language: Option<String>,
    },

    /// Lint, format-check and measure the complexity of a Python file.
    Analyze {
        file: PathBuf,

        #[arg(short, long)]
        language: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputMode::Simple)]
        output: OutputMode,
    },

    /// Ask the mentor for help with a source file.
    Assist {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = AssistKind::Hint)]
        kind: AssistKind,

        #[arg(long, default_value = "")]
        problem_statement: String,

        #[arg(short, long)]
        language: Option<String>,

        /// Run the file first and share its output with the mentor
        #[arg(long)]
        execute: bool,
    },

    /// Verify the configured toolchains are installed.
    Doctor,

    /// Export a session report as JSON.
    Report {
        /// Source file the report describes
        file: PathBuf,

        #[arg(long, default_value = "")]
        problem_statement: String,

        #[arg(short, long)]
        language: Option<String>,

        /// Also run the file and include the result
        #[arg(long)]
        execute: bool,

        /// Also analyze the file (python only)
        #[arg(long)]
        analyze: bool,

        /// Output path (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
