use std::path::Path;

use serde::Deserialize;

use crate::query::impact::ImpactOptions;

/// Config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "code-flow.toml";

/// Source extensions tracked when the config names none.
const DEFAULT_EXTENSIONS: &[&str] = &["cs"];

/// Configuration loaded from `code-flow.toml` at the project root.
#[derive(Debug, Deserialize, Default)]
pub struct CodeFlowConfig {
    /// Additional path patterns to exclude from fingerprinting (beyond .gitignore, bin, obj).
    pub exclude: Option<Vec<String>>,
    /// Source file extensions to track, without the dot.
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub impact: ImpactConfig,
}

/// `[impact]` table.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub max_depth: usize,
    pub fan_in_threshold: usize,
    pub always_regenerate: Vec<String>,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        let defaults = ImpactOptions::default();
        Self {
            max_depth: defaults.max_depth,
            fan_in_threshold: defaults.fan_in_threshold,
            always_regenerate: defaults.always_regenerate,
        }
    }
}

impl CodeFlowConfig {
    /// Load configuration from `code-flow.toml` in the given root directory.
    ///
    /// Returns a default configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    pub fn extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(exts) if !exts.is_empty() => exts
                .iter()
                .map(|e| e.trim_start_matches('.').to_owned())
                .collect(),
            _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Impact options, with `depth` overriding the configured `max_depth` when given.
    pub fn impact_options(&self, depth: Option<usize>) -> ImpactOptions {
        ImpactOptions {
            max_depth: depth.unwrap_or(self.impact.max_depth),
            fan_in_threshold: self.impact.fan_in_threshold,
            always_regenerate: self.impact.always_regenerate.clone(),
        }
    }
}
