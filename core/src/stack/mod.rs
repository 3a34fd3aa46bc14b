//! Symbolic operand stack used while emitting one instruction.
//!
//! Slots pushed by a micro-op stay symbolic (bound to a C local) until a
//! flush writes them back to `stack_pointer[...]`. Pops beyond the symbolic
//! slots read straight from stack memory. All offsets are kept as symbolic
//! sums because array items have sizes such as `oparg`.

mod offset;


use std::fmt;

use crate::model::StackItem;
use crate::writer::CodeWriter;

pub use offset::StackOffset;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    /// More real-memory operands were popped than the instruction has on entry.
    Underflow { name: String },
    /// The popped slot has a different size than the item bound to it.
    SizeMismatch {
        popped: String,
        name: String,
        expected: String,
        got: String,
    },
    /// A live symbolic slot already carries this name.
    NameCollision { name: String },
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::Underflow { name } => write!(f, "Stack underflow popping '{name}'"),
            StackError::SizeMismatch {
                popped,
                name,
                expected,
                got,
            } => write!(
                f,
                "Size mismatch when popping '{popped}' from stack to assign to '{name}'. Expected {expected} got {got}"
            ),
            StackError::NameCollision { name } => {
                write!(f, "Name '{name}' is already bound to another stack slot")
            }
        }
    }
}

impl std::error::Error for StackError {}

/// Slots `var` occupies in memory, when that is a known number. Items whose
/// condition is not a constant are counted as present.
fn memory_slots(var: &StackItem) -> Option<usize> {
    match var.condition.as_deref() {
        Some("0") => Some(0),
        _ => var.slot_count().parse().ok(),
    }
}

/// Reject a name that appears twice among the inputs, or among the outputs,
/// of one micro-op.
pub fn check_distinct(items: &[StackItem]) -> Result<(), StackError> {
    for (i, var) in items.iter().enumerate() {
        if !var.is_unused() && items[..i].iter().any(|prev| prev.name == var.name) {
            return Err(StackError::NameCollision { name: var.name.clone() });
        }
    }
    Ok(())
}

/// How a popped item gets its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Nothing to emit: the local already holds the value, or the item is unused.
    None,
    /// Copy from the local bound to the popped slot.
    Copy(String),
    /// Read from stack memory; the string is the full right-hand side.
    Load(String),
}

#[derive(Debug, Clone, Default)]
pub struct Stack {
    /// Offset of the real stack top relative to `stack_pointer`.
    base_offset: StackOffset,
    /// Offset of the symbolic top relative to `stack_pointer`.
    top_offset: StackOffset,
    /// Net items consumed since the last flush, ignoring peeks.
    peek_offset: StackOffset,
    variables: Vec<StackItem>,
    /// Items below `stack_pointer` that may still be read, when bounded.
    available: Option<usize>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack that rejects reading more than `depth` operands from memory.
    pub fn with_entry_depth(depth: Option<usize>) -> Self {
        Self {
            available: depth,
            ..Self::default()
        }
    }

    pub fn depth(&self) -> usize {
        self.variables.len()
    }

    /// Slots still held symbolically, bottom first.
    pub fn live(&self) -> &[StackItem] {
        &self.variables
    }

    pub fn peek_offset(&self) -> &StackOffset {
        &self.peek_offset
    }

    pub fn top_offset(&self) -> &StackOffset {
        &self.top_offset
    }

    pub fn pop(&mut self, var: &StackItem) -> Result<Binding, StackError> {
        self.top_offset.pop(var);
        if !var.peek {
            self.peek_offset.pop(var);
        }
        let indirect = if var.is_array() { "&" } else { "" };

        if let Some(popped) = self.variables.pop() {
            if popped.size != var.size {
                return Err(StackError::SizeMismatch {
                    expected: var.slot_count().to_string(),
                    got: popped.slot_count().to_string(),
                    popped: popped.name,
                    name: var.name.clone(),
                });
            }
            if popped.name == var.name || var.is_unused() {
                return Ok(Binding::None);
            }
            if popped.is_unused() {
                // the value was never moved out of memory
                return Ok(Binding::Load(format!(
                    "{indirect}stack_pointer[{}]",
                    self.top_offset.to_c()
                )));
            }
            return Ok(Binding::Copy(popped.name));
        }

        if let Some(left) = self.available.as_mut() {
            let needed = memory_slots(var).unwrap_or(0);
            if needed > *left {
                return Err(StackError::Underflow { name: var.name.clone() });
            }
            *left -= needed;
        }
        self.base_offset.pop(var);
        if var.is_unused() {
            return Ok(Binding::None);
        }
        let (cast, bits) = match &var.ty {
            Some(ty) if !var.is_array() => (format!("({ty})"), ".bits"),
            _ => (String::new(), ""),
        };
        Ok(Binding::Load(format!(
            "{cast}{indirect}stack_pointer[{}]{bits}",
            self.base_offset.to_c()
        )))
    }

    /// Add a symbolic slot for `var`. Array items get their address bound
    /// immediately; the returned string is that address expression.
    pub fn push(&mut self, var: &StackItem) -> Result<Option<String>, StackError> {
        if !var.is_unused() && self.variables.iter().any(|live| live.name == var.name) {
            return Err(StackError::NameCollision { name: var.name.clone() });
        }
        let address = (var.is_array() && !var.is_unused()).then(|| format!("&stack_pointer[{}]", self.top_offset.to_c()));
        self.top_offset.push(var);
        self.variables.push(var.clone());
        Ok(address)
    }

    /// Write every symbolic slot to memory and move `stack_pointer` to the
    /// symbolic top.
    pub fn flush(&mut self, out: &mut CodeWriter) {
        self.write_slots(out);
        self.reset();
    }

    /// Bookkeeping half of a flush: the symbolic slots become real memory.
    pub fn reset(&mut self) {
        if let Some(left) = self.available {
            // a symbolic size written back leaves the readable depth unknown
            self.available = self
                .variables
                .iter()
                .map(memory_slots)
                .sum::<Option<usize>>()
                .map(|written| left + written);
        }
        self.variables.clear();
        self.base_offset.clear();
        self.top_offset.clear();
        self.peek_offset.clear();
    }

    /// Emit the same code as [`Stack::flush`] without forgetting any state,
    /// for exits that leave the block early.
    pub fn flush_locally(&self, out: &mut CodeWriter) {
        self.clone().write_slots(out);
    }

    fn write_slots(&mut self, out: &mut CodeWriter) {
        out.start_line();
        for var in &self.variables {
            if !var.peek && !var.is_unused() && !var.is_array() && var.condition.as_deref() != Some("0") {
                if let Some(condition) = var.condition.as_deref()
                    && condition != "1"
                {
                    out.emit(format!("if ({condition}) "));
                }
                let (bits, cast) = if var.ty.is_some() { (".bits", "(uintptr_t)") } else { ("", "") };
                out.emit(format!(
                    "stack_pointer[{}]{bits} = {cast}{};\n",
                    self.base_offset.to_c(),
                    var.name
                ));
            }
            self.base_offset.push(var);
        }
        let net = self.base_offset.to_c();
        if net != "0" {
            out.emit(format!("stack_pointer += {net};\n"));
            out.emit("assert(WITHIN_STACK_BOUNDS());\n");
        }
    }

    /// Debug rendering of the current state.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        format!(
            "/* Variables: [{}]. Base offset: {}. Top offset: {} */",
            names.join(", "),
            self.base_offset.to_c(),
            self.top_offset.to_c()
        )
    }
}
