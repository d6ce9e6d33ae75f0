//! Analyzer CLI entry point.
//!
//! # Usage
//!
//! ```bash
//! taint-engine run --config analysis.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use taint_engine::config::Options;
use taint_engine::crtex::DefaultCanonicalNameConverter;
use taint_engine::driver::{self, DriverOptions};
use taint_engine::error::TaintError;
use taint_engine::features::FeatureFactory;
use taint_engine::io;
use taint_engine::kind::KindFactory;
use taint_engine::memory_location::MemoryLocationFactory;
use taint_engine::postprocess;
use taint_engine::registry::Registry;
use taint_engine::rules::{RulesCoverage, UsedKinds};
use taint_engine::transfer::AnalysisContext;
use taint_engine::access_path::ElementFactory;
use taint_engine::transform::TransformsFactory;

#[derive(Parser)]
#[command(name = "taint-engine")]
#[command(about = "Whole-program interprocedural taint analysis for JVM/Android bytecode", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis described by a config file and write issues + coverage.
    Run {
        /// Path to an `Options` JSON file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { config } => run(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "analysis failed");
            err.exit_code().into()
        }
    }
}

fn run(config_path: &std::path::Path) -> Result<(), TaintError> {
    let options = Options::from_json_file(config_path)?;
    tracing::info!(program = %options.program_path.display(), "loading program");

    let program = io::load_program(&options.program_path)?;
    let rules = io::load_rules(&options.rules_path)?;

    let kind_factory = KindFactory::new();
    let used_kinds = UsedKinds::from_rules(&kind_factory, &rules);
    let registry = Registry::new();

    if let Some(models_path) = &options.models_path {
        for (method, model) in io::load_models(models_path, &program, &kind_factory)? {
            registry.set(method, model);
        }
    }
    if let Some(field_models_path) = &options.field_models_path {
        for (field, model) in io::load_field_models(field_models_path, &program, &kind_factory)? {
            registry.set_field(field, model);
        }
    }

    let locations = MemoryLocationFactory::new();
    let elements = ElementFactory::new();
    let transforms_factory = TransformsFactory::new();
    let features = FeatureFactory::new();
    let converter = DefaultCanonicalNameConverter;
    let ctx = AnalysisContext {
        registry: &registry,
        rules: &rules,
        used_kinds: &used_kinds,
        transforms_factory: &transforms_factory,
        kind_factory: &kind_factory,
        features: &features,
        locations: &locations,
        elements: &elements,
        via_type_of_names: &options.via_type_of_names,
        canonical_name_converter: &converter,
        maximum_source_sink_distance: options.maximum_source_sink_distance,
        class_interval_mode_enabled: options.class_interval_mode_enabled,
    };

    let heuristics = options.heuristics();
    let driver_options = DriverOptions { max_global_iterations: options.max_number_iterations };

    tracing::info!(methods = program.methods.len(), "starting fixpoint");
    let result_registry = driver::analyze_program(&program, &heuristics, &ctx, &driver_options)?;

    tracing::info!("removing collapsed traces");
    let dependencies = driver::Dependencies::build(&program, &ctx);
    postprocess::remove_collapsed_traces(&result_registry, &dependencies);

    let mut issues = Vec::new();
    let mut coverage = RulesCoverage::new();
    for method in result_registry.methods() {
        let model = result_registry.get(&method);
        for issue in &model.issues {
            coverage.observe_issue(issue);
            issues.push(issue.clone());
        }
    }

    tracing::info!(issues = issues.len(), "writing output");
    io::write_issues_sharded(&options.output_directory, &issues, options.sharding_width)?;
    if options.dump_coverage {
        io::write_coverage(&options.output_directory, &coverage)?;
    }

    Ok(())
}
