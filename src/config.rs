//! `Options`: the CLI-surfaced configuration. Loaded from a JSON file and
//! merged with CLI flags, the
//! way `config::pipeline_config::PipelineConfig::from_yaml`
//! loads a versioned export and checks it before use; this schema is JSON
//! rather than YAML since the crate does not carry `serde_yaml`.

use crate::error::{Result, TaintError};
use crate::model::Heuristics;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema version for `Options`' on-disk JSON form; bumped whenever a
/// breaking field is added or removed.
pub const OPTIONS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    pub version: u32,

    /// Directory (or `@`-prefixed single file) of `Method`/`CFG`/call-graph
    /// JSON the frontend has already produced.
    pub program_path: PathBuf,
    pub rules_path: PathBuf,
    #[serde(default)]
    pub models_path: Option<PathBuf>,
    #[serde(default)]
    pub field_models_path: Option<PathBuf>,

    pub output_directory: PathBuf,
    #[serde(default = "default_sharding_width")]
    pub sharding_width: u32,

    #[serde(default)]
    pub heuristics: HeuristicsOptions,

    #[serde(default = "default_max_global_iterations")]
    pub max_number_iterations: usize,
    #[serde(default = "default_max_method_analysis_time_ms")]
    pub maximum_method_analysis_time_ms: u64,

    #[serde(default)]
    pub dump_class_hierarchies: bool,
    #[serde(default)]
    pub dump_call_graph: bool,
    #[serde(default)]
    pub dump_coverage: bool,

    #[serde(default)]
    pub via_type_of_names: Vec<String>,
    #[serde(default)]
    pub class_interval_mode_enabled: bool,
    #[serde(default = "default_maximum_source_sink_distance")]
    pub maximum_source_sink_distance: u32,
}

fn default_sharding_width() -> u32 {
    1
}

fn default_max_global_iterations() -> usize {
    100
}

fn default_max_method_analysis_time_ms() -> u64 {
    60_000
}

fn default_maximum_source_sink_distance() -> u32 {
    10
}

/// JSON-serializable mirror of [`Heuristics`] so `--config` can override the
/// per-method approximation bounds without the internal struct needing
/// `Deserialize` itself (`Heuristics` stays a plain value type elsewhere).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HeuristicsOptions {
    pub max_input_path_depth: usize,
    pub max_input_path_leaves: usize,
    pub max_output_path_depth: usize,
    pub max_output_path_leaves: usize,
    pub propagation_max_collapse_depth: u32,
    pub generation_max_port_size: usize,
    pub sink_max_port_size: usize,
}

impl Default for HeuristicsOptions {
    fn default() -> Self {
        let h = Heuristics::default();
        HeuristicsOptions {
            max_input_path_depth: h.max_input_path_depth,
            max_input_path_leaves: h.max_input_path_leaves,
            max_output_path_depth: h.max_output_path_depth,
            max_output_path_leaves: h.max_output_path_leaves,
            propagation_max_collapse_depth: h.propagation_max_collapse_depth,
            generation_max_port_size: h.generation_max_port_size,
            sink_max_port_size: h.sink_max_port_size,
        }
    }
}

impl HeuristicsOptions {
    pub fn to_heuristics(&self, max_number_iterations: usize) -> Heuristics {
        Heuristics {
            max_input_path_depth: self.max_input_path_depth,
            max_input_path_leaves: self.max_input_path_leaves,
            max_output_path_depth: self.max_output_path_depth,
            max_output_path_leaves: self.max_output_path_leaves,
            propagation_max_collapse_depth: self.propagation_max_collapse_depth,
            generation_max_port_size: self.generation_max_port_size,
            sink_max_port_size: self.sink_max_port_size,
            max_number_iterations,
        }
    }
}

impl Options {
    pub fn from_json_file(path: &Path) -> Result<Options> {
        let content = std::fs::read_to_string(path)?;
        let options: Options = serde_json::from_str(&content)?;
        if options.version != OPTIONS_SCHEMA_VERSION {
            return Err(TaintError::InputValidation(format!(
                "unsupported config schema version {} (expected {})",
                options.version, OPTIONS_SCHEMA_VERSION
            )));
        }
        Ok(options)
    }

    pub fn heuristics(&self) -> Heuristics {
        self.heuristics.to_heuristics(self.max_number_iterations)
    }
}
