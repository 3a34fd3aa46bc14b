pub mod config;
pub mod generator;
pub mod model;
pub mod stack;
pub mod template;
pub mod util;
pub mod writer;

pub use config::GeneratorConfig;
pub use generator::{AnalysisError, GenerateOptions, GenerationErrors, RunSummary, generate, generate_from_files};
pub use model::{Instruction, InstructionSet, load_instruction_set};
