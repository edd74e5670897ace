use std::collections::BTreeMap;
use std::io::IsTerminal;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::flow::RequestFlow;
use crate::pipeline::{ScanOutput, UpdateOutcome};
use crate::query::impact::{ImpactReport, ImpactedItem};
use crate::query::stats::GraphStats;
use crate::state::ChangeSet;

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error serialising output: {}", e),
    }
}

fn print_header(text: &str) {
    if std::io::stdout().is_terminal() {
        println!("\x1b[1m{}\x1b[0m", text);
    } else {
        println!("{}", text);
    }
}

/// Print a one-line count per diagnostic kind to **stderr** so that stdout stays clean
/// for JSON consumers. Individual diagnostics are logged at debug level.
pub fn report_diagnostics(diagnostics: &[Diagnostic]) {
    let mut by_kind: BTreeMap<DiagnosticKind, usize> = BTreeMap::new();
    for d in diagnostics {
        tracing::debug!("{d}");
        *by_kind.entry(d.kind).or_insert(0) += 1;
    }
    if by_kind.is_empty() {
        return;
    }
    let parts: Vec<String> = by_kind
        .iter()
        .map(|(kind, n)| format!("{} {}", n, kind.as_str()))
        .collect();
    eprintln!("  diagnostics: {}", parts.join(", "));
}

#[derive(Serialize)]
struct ScanSummary<'a> {
    files: usize,
    classes: usize,
    unresolved: usize,
    edges: usize,
    flows: usize,
    outputs: usize,
    diagnostics: &'a [Diagnostic],
}

/// Print the summary of a full scan.
pub fn print_scan(out: &ScanOutput, format: &OutputFormat) {
    let summary = ScanSummary {
        files: out.files,
        classes: out.analysis.graph.class_count(),
        unresolved: out.analysis.graph.unresolved_count(),
        edges: out.analysis.graph.edge_count(),
        flows: out.analysis.flows.len(),
        outputs: out.outputs,
        diagnostics: &out.analysis.diagnostics,
    };
    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Compact | OutputFormat::Table => {
            println!("Scanned {} files", summary.files);
            println!(
                "  {} types, {} unresolved, {} edges",
                summary.classes, summary.unresolved, summary.edges
            );
            println!("  {} flows, {} tracked outputs", summary.flows, summary.outputs);
            report_diagnostics(summary.diagnostics);
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum UpdateSummary<'a> {
    FullScan { files: usize, flows: usize },
    UpToDate,
    Updated { changes: &'a ChangeSet, impact: &'a ImpactReport },
}

/// Print the result of an incremental update.
pub fn print_update(outcome: &UpdateOutcome, format: &OutputFormat) {
    if let OutputFormat::Json = format {
        let summary = match outcome {
            UpdateOutcome::FullScan(scan) => UpdateSummary::FullScan {
                files: scan.files,
                flows: scan.analysis.flows.len(),
            },
            UpdateOutcome::UpToDate => UpdateSummary::UpToDate,
            UpdateOutcome::Updated(out) => UpdateSummary::Updated {
                changes: &out.changes,
                impact: &out.report,
            },
        };
        print_json(&summary);
        return;
    }

    match outcome {
        UpdateOutcome::FullScan(scan) => {
            println!("No usable state, ran a full scan");
            print_scan(scan, format);
        }
        UpdateOutcome::UpToDate => println!("No changes detected"),
        UpdateOutcome::Updated(out) => {
            let c = &out.changes;
            println!(
                "{} added, {} modified, {} removed",
                c.added.len(),
                c.modified.len(),
                c.removed.len()
            );
            for id in &c.stale_outputs {
                println!("stale {}", id);
            }
            print_impact(&out.report, format);
            report_diagnostics(&out.analysis.diagnostics);
        }
    }
}

fn compact_items(tag: &str, items: &[ImpactedItem]) {
    for item in items {
        println!("{} {} {} ({})", tag, item.level.as_str(), item.name, item.reason);
    }
}

fn table_items(title: &str, items: &[ImpactedItem]) {
    if items.is_empty() {
        return;
    }
    let name_w = items.iter().map(|i| i.name.len()).max().unwrap_or(4).max(4);
    print_header(&format!("{:<10}  {:<name_w$}  {}", title, "NAME", "REASON", name_w = name_w));
    println!("{}", "-".repeat(name_w + 30));
    for item in items {
        println!(
            "{:<10}  {:<name_w$}  {}",
            item.level.as_str(),
            item.name,
            item.reason,
            name_w = name_w
        );
    }
    println!();
}

/// Format and print an impact report.
pub fn print_impact(report: &ImpactReport, format: &OutputFormat) {
    match format {
        OutputFormat::Compact => {
            compact_items("class", &report.classes);
            compact_items("flow", &report.flows);
            compact_items("output", &report.outputs);
            compact_items("test", &report.tests);
            for endpoint in &report.endpoints {
                println!("endpoint {}", endpoint);
            }
            println!(
                "{} changed types, {} impacted items, risk {}",
                report.changed_keys.len(),
                report.total(),
                report.risk.as_str()
            );
        }
        OutputFormat::Table => {
            print_header(&format!("Changed: {}", report.changed_keys.join(", ")));
            println!();
            table_items("CLASS", &report.classes);
            table_items("FLOW", &report.flows);
            table_items("OUTPUT", &report.outputs);
            table_items("TEST", &report.tests);
            if !report.endpoints.is_empty() {
                println!("Endpoints: {}", report.endpoints.join(", "));
            }
            println!("Risk: {}", report.risk.as_str());
        }
        OutputFormat::Json => print_json(report),
    }
}

/// Format and print traced flows.
pub fn print_flows(flows: &[RequestFlow], format: &OutputFormat) {
    match format {
        OutputFormat::Compact => {
            for flow in flows {
                println!("flow {} {} [{} steps]", flow.name, flow.entry, flow.steps.len());
            }
            println!("{} flows found", flows.len());
        }
        OutputFormat::Table => {
            for flow in flows {
                print_header(&format!("{} ({})", flow.name, flow.entry));
                for (i, step) in flow.steps.iter().enumerate() {
                    let marker = if step.unresolved { " ?" } else { "" };
                    println!(
                        "  {:>2}. {:<12} {}{}  {}",
                        i + 1,
                        step.role.as_str(),
                        step.key,
                        marker,
                        step.action
                    );
                }
                if let Some(entity) = &flow.target_entity {
                    println!("      entity: {}", entity);
                }
                if !flow.side_effects.is_empty() {
                    println!("      raises: {}", flow.side_effects.join(", "));
                }
                if !flow.cross_cutting.is_empty() {
                    println!("      cross-cutting: {}", flow.cross_cutting.join(", "));
                }
                println!();
            }
        }
        OutputFormat::Json => print_json(flows),
    }
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    #[serde(flatten)]
    stats: &'a GraphStats,
    flows: usize,
    cycles: &'a [Vec<String>],
}

/// Format and print graph statistics.
pub fn print_stats(stats: &GraphStats, flows: usize, cycles: &[Vec<String>], format: &OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatsOutput { stats, flows, cycles }),
        OutputFormat::Compact | OutputFormat::Table => {
            println!(
                "{} types in {} projects, {} unresolved, {} edges, {} flows",
                stats.class_count, stats.projects, stats.unresolved_count, stats.edge_count, flows
            );
            let roles: Vec<String> = stats
                .by_role
                .iter()
                .map(|(r, n)| format!("{} {}", n, r.as_str()))
                .collect();
            println!("  roles: {}", roles.join(", "));
            let layers: Vec<String> = stats
                .by_layer
                .iter()
                .map(|(l, n)| format!("{} {}", n, l.as_str()))
                .collect();
            println!("  layers: {}", layers.join(", "));
            let edges: Vec<String> = stats
                .by_edge_kind
                .iter()
                .map(|(k, n)| format!("{} {}", n, k.as_str()))
                .collect();
            println!("  edges: {}", edges.join(", "));
            println!("  {} interfaces implemented", stats.interfaces_implemented);
            for cycle in cycles {
                println!("cycle {}", cycle.join(" -> "));
            }
        }
    }
}
