use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::CodeFlowConfig;
use crate::descriptor::{ClassDescriptor, DescriptorBatch, load_descriptors};
use crate::diagnostics::Diagnostic;
use crate::flow::{RaisesMap, RequestFlow, trace_flows};
use crate::graph::builder::{BuildOutput, GraphBuilder};
use crate::graph::{DependencyGraph, normalize_path, paths_match};
use crate::query::impact::{ImpactContext, ImpactReport, TestOwnership, analyze_impact, keys_for_files};
use crate::state::changes::{
    FileFingerprint, fingerprint_files, forget_outputs, group_by_file, record_files, record_outputs,
};
use crate::state::{ChangeSet, RepositoryState, compute_changes, load_state, save_state, state_path};
use crate::walker::walk_project;

/// Where a run reads its inputs from.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub root: PathBuf,
    /// JSON Lines descriptor stream.
    pub descriptors: PathBuf,
    /// Test ownership map (test artifact -> keys).
    pub tests: Option<PathBuf>,
    /// Raised-events map (handler -> events).
    pub raises: Option<PathBuf>,
}

impl RunInputs {
    pub fn load_tests(&self) -> anyhow::Result<TestOwnership> {
        load_json_map(self.tests.as_deref())
    }

    pub fn load_raises(&self) -> anyhow::Result<RaisesMap> {
        load_json_map(self.raises.as_deref())
    }
}

/// Read a `{ "name": ["value", ...] }` JSON object. A missing path yields an empty map.
pub fn load_json_map(path: Option<&Path>) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not a JSON object of string lists", path.display()))
}

/// Graph and flows derived from one descriptor set.
#[derive(Debug, Default)]
pub struct Analysis {
    pub graph: DependencyGraph,
    pub flows: Vec<RequestFlow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    fn from_build(build: BuildOutput, raises: &RaisesMap, mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.extend(build.diagnostics);
        let traced = trace_flows(&build.graph, raises);
        diagnostics.extend(traced.diagnostics);
        Self {
            graph: build.graph,
            flows: traced.flows,
            diagnostics,
        }
    }
}

/// Build the graph and trace flows straight from the descriptor stream, without touching
/// state. Used by the read-only commands.
pub fn analyze(inputs: &RunInputs) -> anyhow::Result<Analysis> {
    let batch = load_descriptors(&inputs.descriptors)?;
    let raises = inputs.load_raises()?;
    let build = GraphBuilder::build(&batch.classes);
    Ok(Analysis::from_build(build, &raises, batch.diagnostics))
}

#[derive(Debug)]
pub struct ScanOutput {
    pub files: usize,
    pub analysis: Analysis,
    /// Outputs recorded in the state's dependency map.
    pub outputs: usize,
}

/// Full run: rebuild everything and replace the persisted state.
pub fn full_run(inputs: &RunInputs, config: &CodeFlowConfig) -> anyhow::Result<ScanOutput> {
    let batch = load_descriptors(&inputs.descriptors)?;
    let raises = inputs.load_raises()?;

    let files = walk_project(&inputs.root, config)?;
    let fingerprints = fingerprint_files(&inputs.root, &files);
    let paths: Vec<String> = fingerprints.iter().map(|f| f.path.clone()).collect();

    let build = GraphBuilder::build(&batch.classes);
    let DescriptorBatch {
        classes, diagnostics, ..
    } = batch;
    let analysis = Analysis::from_build(build, &raises, diagnostics);

    let now = crate::state::now_secs();
    let mut state = RepositoryState::new();
    record_files(&mut state, &fingerprints, &group_by_file(&paths, &classes), now);
    record_run_outputs(&mut state, &paths, &analysis.flows, &config.impact.always_regenerate);
    state.last_full_run = Some(now);
    save_state(&inputs.root, &state)?;

    tracing::info!(
        files = paths.len(),
        classes = analysis.graph.class_count(),
        flows = analysis.flows.len(),
        "full scan complete"
    );
    Ok(ScanOutput {
        files: paths.len(),
        analysis,
        outputs: state.outputs.len(),
    })
}

/// Delete the persisted state, then run a full scan.
pub fn refresh(inputs: &RunInputs, config: &CodeFlowConfig) -> anyhow::Result<ScanOutput> {
    let path = state_path(&inputs.root);
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::info!(path = %path.display(), "deleted existing state"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("failed to delete {}", path.display())),
    }
    full_run(inputs, config)
}

#[derive(Debug)]
pub struct UpdateOutput {
    pub changes: ChangeSet,
    pub analysis: Analysis,
    pub report: ImpactReport,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    /// No usable state existed; a full scan ran instead.
    FullScan(ScanOutput),
    /// Nothing changed since the last run.
    UpToDate,
    Updated(Box<UpdateOutput>),
}

/// Partial run: diff against the persisted state, patch the graph for the changed files,
/// and report the blast radius of the change.
///
/// Missing, corrupt or version-mismatched state falls back to a full scan; a graph is
/// never patched on top of a guessed baseline.
pub fn partial_run(inputs: &RunInputs, config: &CodeFlowConfig) -> anyhow::Result<UpdateOutcome> {
    let mut state = match load_state(&inputs.root) {
        Ok(Some(state)) => state,
        Ok(None) => {
            tracing::warn!("no existing state found, falling back to full scan");
            return full_run(inputs, config).map(UpdateOutcome::FullScan);
        }
        Err(err) => {
            tracing::warn!("{err}; falling back to full scan");
            return full_run(inputs, config).map(UpdateOutcome::FullScan);
        }
    };

    let files = walk_project(&inputs.root, config)?;
    let fingerprints = fingerprint_files(&inputs.root, &files);
    let current = fingerprint_map(&fingerprints);
    let mut changes = compute_changes(&current, &state);
    if changes.is_empty() {
        tracing::info!("no changes detected");
        return Ok(UpdateOutcome::UpToDate);
    }
    tracing::info!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        removed = changes.removed.len(),
        "processing changed files"
    );

    let baseline = GraphBuilder::build(&state.descriptors()).graph;

    let batch = load_descriptors(&inputs.descriptors)?;
    let raises = inputs.load_raises()?;
    let tests = inputs.load_tests()?;
    let changed_paths = changes.changed();
    let changed_classes: Vec<ClassDescriptor> = batch
        .classes
        .iter()
        .filter(|c| changed_paths.iter().any(|p| paths_match(p, &c.file)))
        .cloned()
        .collect();

    // Keys the change touched: what the files declared before, and what they declare now.
    let mut changed_keys: BTreeSet<String> = changes
        .modified
        .iter()
        .chain(&changes.removed)
        .filter_map(|p| state.files.get(p))
        .flat_map(|r| r.classes.iter().map(ClassDescriptor::key))
        .collect();

    let build = GraphBuilder::patch(baseline, &changes.removed, &changed_paths, &changed_classes);
    changed_keys.extend(keys_for_files(&build.graph, &changed_paths));
    let analysis = Analysis::from_build(build, &raises, batch.diagnostics);

    let mut changed_files = changed_paths.clone();
    changed_files.extend(changes.removed.iter().cloned());
    changed_files.sort();
    let changed_keys: Vec<String> = changed_keys.into_iter().collect();
    let mut report = {
        let ctx = ImpactContext {
            graph: &analysis.graph,
            flows: &analysis.flows,
            tests: &tests,
            state: Some(&state),
        };
        analyze_impact(&ctx, &changed_files, &changed_keys, &config.impact_options(None))
    };

    let now = crate::state::now_secs();
    let paths: Vec<String> = current.keys().cloned().collect();
    record_files(&mut state, &fingerprints, &group_by_file(&changed_paths, &changed_classes), now);
    let obsolete = record_run_outputs(&mut state, &paths, &analysis.flows, &config.impact.always_regenerate);

    // Documents nothing produces any more are stale, not due for regeneration.
    report.outputs.retain(|o| !obsolete.contains(&o.name));
    changes.stale_outputs.extend(obsolete);
    changes.stale_outputs.sort();
    changes.stale_outputs.dedup();
    if !changes.stale_outputs.is_empty() {
        tracing::info!(stale = ?changes.stale_outputs, "outputs no longer produced");
    }
    tracing::info!(outputs = ?report.output_ids(), "outputs to regenerate");
    state.last_partial_run = Some(now);
    save_state(&inputs.root, &state)?;

    Ok(UpdateOutcome::Updated(Box::new(UpdateOutput {
        changes,
        analysis,
        report,
    })))
}

/// Impact of an explicit list of changed files against the current descriptor stream.
/// Reads the state for the output map when one is available; never writes it.
pub fn impact_run(
    inputs: &RunInputs,
    config: &CodeFlowConfig,
    files: &[String],
    depth: Option<usize>,
) -> anyhow::Result<ImpactReport> {
    let analysis = analyze(inputs)?;
    let tests = inputs.load_tests()?;
    let state = match load_state(&inputs.root) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!("{err}; output impact unavailable");
            None
        }
    };

    let files: Vec<String> = files.iter().map(|f| normalize_path(f)).collect();
    let changed_keys = keys_for_files(&analysis.graph, &files);
    if changed_keys.is_empty() {
        tracing::warn!("no known types are declared in the given files");
    }
    let ctx = ImpactContext {
        graph: &analysis.graph,
        flows: &analysis.flows,
        tests: &tests,
        state: state.as_ref(),
    };
    let mut report = analyze_impact(&ctx, &files, &changed_keys, &config.impact_options(depth));
    let mut diagnostics = analysis.diagnostics;
    diagnostics.append(&mut report.diagnostics);
    report.diagnostics = diagnostics;
    Ok(report)
}

/// Rebuild the output dependency map for this run: every always-regenerated output
/// depends on all tracked files, each flow document on the files of its steps. Outputs
/// that were not produced again are forgotten and returned, sorted.
fn record_run_outputs(
    state: &mut RepositoryState,
    paths: &[String],
    flows: &[RequestFlow],
    always: &[String],
) -> Vec<String> {
    let mut produced: BTreeSet<String> = BTreeSet::new();
    for output in always {
        record_outputs(state, output, paths.iter().cloned());
        produced.insert(output.clone());
    }
    for flow in flows {
        let sources: BTreeSet<String> = flow
            .steps
            .iter()
            .filter(|s| !s.file.is_empty())
            .map(|s| {
                paths
                    .iter()
                    .find(|p| paths_match(p, &s.file))
                    .cloned()
                    .unwrap_or_else(|| normalize_path(&s.file))
            })
            .collect();
        let id = flow.output_id();
        record_outputs(state, &id, sources);
        produced.insert(id);
    }
    let obsolete: Vec<String> = state
        .outputs
        .keys()
        .filter(|id| !produced.contains(*id))
        .cloned()
        .collect();
    forget_outputs(state, &obsolete);
    obsolete
}

fn fingerprint_map(fingerprints: &[FileFingerprint]) -> BTreeMap<String, String> {
    fingerprints
        .iter()
        .map(|f| (f.path.clone(), f.fingerprint.clone()))
        .collect()
}
