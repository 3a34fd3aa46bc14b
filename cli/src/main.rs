use std::path::PathBuf;
use std::sync::Once;

use anyhow::Context;
use casegen_core::{GenerationErrors, GeneratorConfig, RunSummary, config::ConfigFile, generate_from_files};
use clap::Parser;
use tracing::info;

#[cfg(test)]
mod main_test;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "casegen_core=warn,casegen=warn";
const VERBOSE_TRACE_FILTER: &str = "casegen_core=debug,casegen=debug";

#[derive(Debug, Parser)]
#[command(
    name = "casegen",
    author,
    version,
    about = "Generate interpreter dispatch cases from a resolved instruction model",
    long_about = None
)]
struct CliArgs {
    /// Instruction model documents (.json, .toml, .yaml)
    #[arg(value_name = "INPUT", value_parser = parse_path)]
    inputs: Vec<PathBuf>,

    /// Generated C file
    #[arg(short, long, value_name = "PATH", value_parser = parse_path)]
    output: Option<PathBuf>,

    /// Annotate body lines with `#line` directives
    #[arg(short = 'l', long = "emit-line-directives")]
    emit_line_directives: bool,

    /// Worker threads used to render instruction blocks
    #[arg(short, long, value_name = "N", value_parser = parse_jobs)]
    jobs: Option<usize>,

    /// Fail when a family member's cache size disagrees with its family
    #[arg(long)]
    strict_families: bool,

    /// Read settings from a TOML file; command-line flags take precedence
    #[arg(long, value_name = "PATH", value_parser = parse_path)]
    config: Option<PathBuf>,

    /// Log per-instruction progress
    #[arg(short, long)]
    verbose: bool,
}

fn parse_path(raw: &str) -> Result<PathBuf, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("path must not be empty".to_string());
    }
    Ok(PathBuf::from(trimmed))
}

fn parse_jobs(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("jobs must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn init_tracing(verbose: bool) {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = std::env::var("CASEGEN_LOG")
            .ok()
            .and_then(|raw| filter_expr_from(&raw))
            .or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr).with_target(false);

        let default_filter = if verbose { VERBOSE_TRACE_FILTER } else { DEFAULT_TRACE_FILTER };
        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(default_filter),
        };

        let _ = builder.try_init();
    });
}

/// Defaults, then the config file, then flags.
fn resolve_config(args: &CliArgs) -> anyhow::Result<GeneratorConfig> {
    let mut config = GeneratorConfig::default();
    if let Some(path) = &args.config {
        let file = ConfigFile::load(path)?;
        file.apply(&mut config, path.parent());
    }
    if !args.inputs.is_empty() {
        config.input_paths = args.inputs.clone();
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if args.emit_line_directives {
        config.emit_positions = true;
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if args.strict_families {
        config.strict_families = true;
    }
    Ok(config)
}

fn run(args: &CliArgs) -> anyhow::Result<RunSummary> {
    let config = resolve_config(args)?;
    info!(
        inputs = config.input_paths.len(),
        output = %config.output_path.display(),
        jobs = config.jobs,
        "starting generation"
    );
    let summary = generate_from_files(&config)
        .with_context(|| format!("failed to generate {}", config.output_path.display()))?;
    eprintln!(
        "Wrote {} instructions to {} ({} bytes)",
        summary.instructions,
        config.output_path.display(),
        summary.bytes
    );
    Ok(summary)
}

fn report(err: &anyhow::Error) {
    match err.chain().find_map(|cause| cause.downcast_ref::<GenerationErrors>()) {
        Some(errors) => {
            for analysis in &errors.0 {
                eprintln!("Error: {}", analysis);
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}

fn main() {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    if let Err(err) = run(&args) {
        report(&err);
        std::process::exit(1);
    }
}
