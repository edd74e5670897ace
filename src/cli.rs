use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::export::model::ExportFormat;
use crate::pipeline::RunInputs;

/// Default descriptor stream location, relative to the project root.
pub const DEFAULT_DESCRIPTORS: &str = "descriptors.jsonl";

/// Class dependency graphs, request flows and change impact for layered .NET codebases.
///
/// code-flow reads the type descriptors produced by an upstream source analyzer, builds a
/// dependency graph, traces each request from its entry point down to data access, and
/// reports what a change to a set of files affects.
#[derive(Parser, Debug)]
#[command(
    name = "code-flow",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(Clone, Debug, ValueEnum, Default)]
pub enum OutputFormat {
    /// Compact one-line-per-result format (default).
    #[default]
    Compact,
    /// Human-readable columnar table with optional ANSI color when stdout is a terminal.
    Table,
    /// Structured JSON suitable for programmatic consumption.
    Json,
}

/// Inputs shared by every command.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Path to the project root.
    pub path: PathBuf,

    /// JSON Lines descriptor stream (default: <path>/descriptors.jsonl).
    #[arg(long)]
    pub descriptors: Option<PathBuf>,

    /// Test ownership map: JSON object of test artifact -> type keys.
    #[arg(long)]
    pub tests: Option<PathBuf>,

    /// Raised events map: JSON object of handler -> event names.
    #[arg(long)]
    pub raises: Option<PathBuf>,
}

impl InputArgs {
    pub fn run_inputs(&self) -> RunInputs {
        RunInputs {
            root: self.path.clone(),
            descriptors: self
                .descriptors
                .clone()
                .unwrap_or_else(|| self.path.join(DEFAULT_DESCRIPTORS)),
            tests: self.tests.clone(),
            raises: self.raises.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Full scan: build the graph, trace flows, and replace the persisted state.
    Scan {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,
    },

    /// Incremental update: diff files against the persisted state and report the impact.
    ///
    /// Falls back to a full scan when no usable state exists.
    Update {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,
    },

    /// Delete the persisted state and run a full scan.
    Refresh {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,
    },

    /// Show the blast radius of changing the given files.
    ///
    /// Performs an upstream BFS from every type declared in the files and collects the
    /// affected types, flows, outputs and tests.
    Impact {
        #[command(flatten)]
        inputs: InputArgs,

        /// Changed files, relative to the project root (comma-separated or repeated).
        #[arg(short, long, value_delimiter = ',', required = true)]
        files: Vec<String>,

        /// Max upstream hops (default: [impact].max_depth from code-flow.toml).
        #[arg(short, long)]
        depth: Option<usize>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,
    },

    /// List the request flows traced through the graph.
    Flows {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,
    },

    /// Export the dependency graph as a JSON node/edge list or Graphviz DOT.
    Export {
        #[command(flatten)]
        inputs: InputArgs,

        /// Export format.
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Export only this type key and its neighbourhood.
        #[arg(long)]
        key: Option<String>,

        /// Hop depth for the --key neighbourhood.
        #[arg(long, default_value_t = 1)]
        depth: usize,

        /// Exclude types declared in files matching these globs (comma-separated or repeated).
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Keep placeholder nodes for unresolved references.
        #[arg(long)]
        include_unresolved: bool,

        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Graph statistics: types per role and layer, edges per kind, cycles.
    Stats {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_impact_files_are_comma_separated() {
        let cli = Cli::try_parse_from(["code-flow", "-v", "impact", "repo", "--files", "a.cs,b.cs", "-f", "c.cs"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Impact { inputs, files, depth, .. } => {
                assert_eq!(files, vec!["a.cs", "b.cs", "c.cs"]);
                assert_eq!(depth, None);
                let run = inputs.run_inputs();
                assert_eq!(run.descriptors, PathBuf::from("repo").join(DEFAULT_DESCRIPTORS));
                assert!(run.tests.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_impact_requires_files() {
        assert!(Cli::try_parse_from(["code-flow", "impact", "repo"]).is_err());
    }
}
