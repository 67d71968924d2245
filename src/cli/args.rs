//! Command-line argument parsing for ragquery
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ragquery - answer questions from a document store with a local LLM
#[derive(Parser, Debug)]
#[command(name = "ragquery")]
#[command(version)]
#[command(about = "Retrieval-augmented question answering over a vector store", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Address to bind (overrides configuration)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind (overrides configuration)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the HTTP query service
    Serve,

    /// Answer one question from the terminal
    Query {
        /// Question to answer
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// Maximum number of documents to retrieve
        #[arg(long)]
        match_count: Option<usize>,

        /// Minimum similarity (0.0 to 1.0)
        #[arg(long)]
        match_threshold: Option<f64>,
    },

    /// Print the embedding of a text
    Embed {
        #[arg(value_name = "TEXT")]
        text: String,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Subcommand to run
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

impl Verbosity {
    /// Default `tracing` filter directive
    pub fn filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}
