mod cli;
mod config;
mod descriptor;
mod diagnostics;
mod export;
mod flow;
mod graph;
mod output;
mod pipeline;
mod query;
mod state;
mod walker;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use config::CodeFlowConfig;
use export::model::ExportParams;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan { inputs, format } => {
            let config = CodeFlowConfig::load(&inputs.path);
            let out = pipeline::full_run(&inputs.run_inputs(), &config)?;
            output::print_scan(&out, &format);
        }

        Commands::Update { inputs, format } => {
            let config = CodeFlowConfig::load(&inputs.path);
            let outcome = pipeline::partial_run(&inputs.run_inputs(), &config)?;
            output::print_update(&outcome, &format);
        }

        Commands::Refresh { inputs, format } => {
            let config = CodeFlowConfig::load(&inputs.path);
            let out = pipeline::refresh(&inputs.run_inputs(), &config)?;
            output::print_scan(&out, &format);
        }

        Commands::Impact {
            inputs,
            files,
            depth,
            format,
        } => {
            let config = CodeFlowConfig::load(&inputs.path);
            let report = pipeline::impact_run(&inputs.run_inputs(), &config, &files, depth)?;
            output::print_impact(&report, &format);
            output::report_diagnostics(&report.diagnostics);
        }

        Commands::Flows { inputs, format } => {
            let analysis = pipeline::analyze(&inputs.run_inputs())?;
            output::print_flows(&analysis.flows, &format);
            output::report_diagnostics(&analysis.diagnostics);
        }

        Commands::Export {
            inputs,
            format,
            key,
            depth,
            exclude,
            include_unresolved,
            output,
        } => {
            let analysis = pipeline::analyze(&inputs.run_inputs())?;
            let params = ExportParams {
                format,
                key_filter: key,
                depth,
                exclude_patterns: exclude,
                include_unresolved,
            };
            let result = export::export_graph(&analysis.graph, &params)?;
            match output {
                Some(path) => {
                    write_export(&path, &result.content)?;
                    eprintln!(
                        "Exported {} nodes, {} edges to {}",
                        result.node_count,
                        result.edge_count,
                        path.display()
                    );
                }
                None => print!("{}", result.content),
            }
        }

        Commands::Stats { inputs, format } => {
            let analysis = pipeline::analyze(&inputs.run_inputs())?;
            let stats = query::stats::graph_stats(&analysis.graph);
            let cycles = query::circular::find_cycles(&analysis.graph);
            output::print_stats(&stats, analysis.flows.len(), &cycles, &format);
            output::report_diagnostics(&analysis.diagnostics);
        }
    }

    Ok(())
}

fn write_export(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
