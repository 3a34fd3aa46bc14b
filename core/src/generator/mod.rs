//! Dispatch-block generator.
//!
//! Turns a resolved [`InstructionSet`] into the text of the interpreter's
//! main `switch`: one labelled block per instruction, in name order, between a
//! provenance header and a footer.

mod declare;
mod driver;
mod families;
mod part;


use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::GeneratorConfig;
use crate::model::{Instruction, InstructionSet, SourceLocation, Uop, load_instruction_set};
use crate::stack::StackError;
use crate::template::TemplateError;

pub use declare::{declare_variable, required_variables, type_and_null};
pub use driver::{Stage, write_instruction};
pub use families::{FamilySizeMismatch, check_family_sizes};

pub const FOOTER: &str = "#undef TIER_ONE\n";

const PREAMBLE: &str = "
#ifdef TIER_TWO
    #error \"This file is for Tier 1 only\"
#endif
#define TIER_ONE 1
";

/// Generator settings that affect the emitted text.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Name recorded in the header as the producer of the file.
    pub generator: String,
    /// Definition sources recorded in the header.
    pub sources: Vec<String>,
    /// Annotate body lines with `#line` directives.
    pub emit_positions: bool,
    /// Worker threads used to render blocks; 1 renders on the caller's thread.
    pub jobs: usize,
    /// Reject family size mismatches instead of leaving them to `static_assert`.
    pub strict_families: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            generator: env!("CARGO_PKG_NAME").to_string(),
            sources: Vec::new(),
            emit_positions: false,
            jobs: 1,
            strict_families: false,
        }
    }
}

impl From<&GeneratorConfig> for GenerateOptions {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            sources: config
                .input_paths
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
            emit_positions: config.emit_positions,
            jobs: config.jobs.max(1),
            strict_families: config.strict_families,
            ..Self::default()
        }
    }
}

/// A failure attributed to one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError {
    pub instruction: String,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl AnalysisError {
    pub fn new(inst: &Instruction, message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self {
            instruction: inst.name.clone(),
            message: message.into(),
            location,
        }
    }

    pub(crate) fn from_stack(inst: &Instruction, uop: &Uop, err: StackError) -> Self {
        Self::new(inst, err.to_string(), uop.location())
    }

    pub(crate) fn from_template(inst: &Instruction, err: TemplateError) -> Self {
        let location = SourceLocation::new(&*err.file, err.line);
        Self::new(inst, err.message, Some(location))
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.instruction)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AnalysisError {}

/// Every instruction that failed during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationErrors(pub Vec<AnalysisError>);

impl fmt::Display for GenerationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GenerationErrors {}

pub fn write_header(generator: &str, sources: &[String], out: &mut String) {
    out.push_str(&format!("// This file is generated by {generator}\n"));
    out.push_str("// from:\n");
    out.push_str(&format!("//   {}\n", sources.join(", ")));
    out.push_str("// Do not edit!\n");
}

/// Render the complete artifact for `set`.
pub fn generate(set: &InstructionSet, options: &GenerateOptions) -> Result<String, GenerationErrors> {
    let mismatches = check_family_sizes(set);
    for mismatch in &mismatches {
        warn!(
            instruction = %mismatch.instruction,
            family = %mismatch.family,
            declared = mismatch.declared,
            expected = mismatch.expected,
            "family cache size mismatch"
        );
    }
    if options.strict_families && !mismatches.is_empty() {
        let errors = mismatches
            .iter()
            .map(|mismatch| AnalysisError {
                instruction: mismatch.instruction.clone(),
                message: mismatch.to_string(),
                location: None,
            })
            .collect();
        return Err(GenerationErrors(errors));
    }

    let instructions = set.sorted();
    let blocks = driver::render_blocks(&instructions, options);

    let mut text = String::new();
    write_header(&options.generator, &options.sources, &mut text);
    text.push_str(PREAMBLE);
    text.push('\n');
    let mut errors = Vec::new();
    for block in blocks {
        match block {
            Ok(block) => text.push_str(&block),
            Err(err) => errors.push(err),
        }
    }
    if !errors.is_empty() {
        return Err(GenerationErrors(errors));
    }
    text.push_str(FOOTER);
    info!(
        instructions = instructions.len(),
        jobs = options.jobs,
        "generated dispatch blocks"
    );
    Ok(text)
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub instructions: usize,
    pub bytes: usize,
}

/// Load the configured inputs, generate, and write the output file.
pub fn generate_from_files(config: &GeneratorConfig) -> Result<RunSummary> {
    let set = load_instruction_set(&config.input_paths)?;
    let options = GenerateOptions::from(config);
    let text = generate(&set, &options)?;
    write_output(&config.output_path, &text)?;
    Ok(RunSummary {
        instructions: set.len(),
        bytes: text.len(),
    })
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}
