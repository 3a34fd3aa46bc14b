use std::fmt;

use tracing::debug;

use super::declare::{Locals, declare_variables, required_variables};
use super::{AnalysisError, GenerateOptions};
use crate::model::Instruction;
use crate::stack::Stack;
use crate::writer::CodeWriter;

/// Progress through one instruction's block. Stages only move forward; an
/// error abandons the block wherever it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    HeaderEmitted,
    VariablesDeclared,
    PartsEmitted,
    TailEmitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::HeaderEmitted => "header",
            Stage::VariablesDeclared => "declarations",
            Stage::PartsEmitted => "parts",
            Stage::TailEmitted => "tail",
        };
        f.write_str(name)
    }
}

/// Per-instruction emission state. Created fresh for every block.
pub(super) struct Emitter<'a> {
    pub(super) inst: &'a Instruction,
    pub(super) out: CodeWriter,
    pub(super) stack: Stack,
    pub(super) locals: Locals,
    /// Wrap each micro-op in its own C scope.
    pub(super) braces: bool,
    stage: Stage,
}

impl<'a> Emitter<'a> {
    fn new(inst: &'a Instruction, options: &GenerateOptions) -> Self {
        Self {
            inst,
            out: CodeWriter::new(2, options.emit_positions),
            stack: Stack::with_entry_depth(inst.entry_depth),
            locals: Locals::default(),
            braces: inst.uops().count() > 1,
            stage: Stage::Start,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "stage {} cannot follow {}", next, self.stage);
        self.stage = next;
    }

    fn write_prologue(&mut self) {
        let inst = self.inst;
        let name = &inst.name;
        let size = inst.size;
        let needs_this = inst.uses_this();
        let unused_guard = if inst.family.is_none() { "(void)this_instr;\n" } else { "" };

        self.out.emit("\n");
        self.out.emit(format!("TARGET({name}) {{\n"));
        if inst.properties.needs_prev {
            self.out.emit("_Py_CODEUNIT *prev_instr = frame->instr_ptr;\n");
        }
        if needs_this && !inst.is_target {
            self.out.emit("_Py_CODEUNIT *this_instr = frame->instr_ptr = next_instr;\n");
            self.out.emit(unused_guard);
        } else {
            self.out.emit("frame->instr_ptr = next_instr;\n");
        }
        self.out.emit(format!("next_instr += {size};\n"));
        self.out.emit(format!("INSTRUCTION_STATS({name});\n"));
        if inst.is_target {
            self.out.emit(format!("PREDICTED({name});\n"));
            if needs_this {
                self.out.emit(format!("_Py_CODEUNIT *this_instr = next_instr - {size};\n"));
                self.out.emit(unused_guard);
            }
        }
        if let Some(family) = &inst.family {
            self.out.emit(format!(
                "static_assert({} == {}, \"incorrect cache size\");\n",
                family.size,
                size.saturating_sub(1)
            ));
        }
        self.advance(Stage::HeaderEmitted);
    }

    fn write_declarations(&mut self) -> Result<(), AnalysisError> {
        let required = required_variables(self.inst)?;
        declare_variables(self.inst, &required, &mut self.out);
        self.locals = Locals::new(&required);
        self.advance(Stage::VariablesDeclared);
        Ok(())
    }

    fn write_parts(&mut self) -> Result<(), AnalysisError> {
        // offset 0 is the opcode word itself
        let mut offset = 1;
        let inst = self.inst;
        for part in &inst.parts {
            offset = self.write_part(part, offset)?;
        }
        self.advance(Stage::PartsEmitted);
        Ok(())
    }

    fn write_tail(&mut self) {
        self.out.start_line();
        let last = *self.inst.last_part_properties();
        if !last.always_exits {
            self.stack.flush(&mut self.out);
            if last.ends_with_eval_breaker {
                self.out.emit("CHECK_EVAL_BREAKER();\n");
            }
            self.out.emit("DISPATCH();\n");
        }
        self.out.start_line();
        self.out.emit("}");
        self.out.emit("\n");
        self.advance(Stage::TailEmitted);
    }
}

/// Render the dispatch block of a single instruction.
pub fn write_instruction(inst: &Instruction, options: &GenerateOptions) -> Result<String, AnalysisError> {
    if inst.size == 0 {
        return Err(AnalysisError::new(inst, "Instruction size must be at least 1", None));
    }
    let mut emitter = Emitter::new(inst, options);
    emitter.write_prologue();
    emitter.write_declarations()?;
    emitter.write_parts()?;
    emitter.write_tail();
    debug!(
        instruction = %inst.name,
        parts = inst.parts.len(),
        cache_units = inst.cache_size(),
        "emitted dispatch block"
    );
    Ok(emitter.out.finish())
}

/// Render every block, in the order given. With more than one job the work is
/// split into contiguous chunks on scoped threads; results are reassembled in
/// input order so the output does not depend on scheduling.
pub(super) fn render_blocks(
    instructions: &[&Instruction],
    options: &GenerateOptions,
) -> Vec<Result<String, AnalysisError>> {
    let jobs = options.jobs.max(1);
    if jobs == 1 || instructions.len() < 2 {
        return instructions
            .iter()
            .map(|inst| write_instruction(inst, options))
            .collect();
    }

    let chunk_size = instructions.len().div_ceil(jobs);
    crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = instructions
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move |_| {
                    chunk
                        .iter()
                        .map(|inst| write_instruction(inst, options))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}
