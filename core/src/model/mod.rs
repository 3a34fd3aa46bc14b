//! Resolved instruction-set model.
//!
//! The front end hands the generator a fully resolved description of every
//! instruction: its ordered parts, stack effects and inline cache layout.
//! Nothing in here is mutated once loaded.

mod load;


use std::fmt;

use serde::Deserialize;

use crate::template::Token;
use crate::util::FastHashMap;

pub use load::{Document, ModelFormat, load_instruction_set, parse_document};

/// Name that marks a stack item or cache entry as a placeholder.
pub const UNUSED: &str = "unused";

/// Where a piece of the model came from in the definition sources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Behavioural flags of an instruction or a single micro-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Properties {
    /// The body reads the address of the executing instruction.
    pub needs_this: bool,
    /// The body reads the address of the previously executed instruction.
    pub needs_prev: bool,
    /// The body writes `stack_pointer` itself.
    pub stores_sp: bool,
    /// Every path through the body leaves the dispatch block.
    pub always_exits: bool,
    /// The dispatch tail must poll the eval breaker.
    pub ends_with_eval_breaker: bool,
}

/// One operand-stack position consumed or produced by a micro-op.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackItem {
    pub name: String,
    /// Declared C type; `None` means a plain stack reference.
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    /// Guard under which the item materializes.
    #[serde(default)]
    pub condition: Option<String>,
    /// Symbolic length for array items; empty for scalars.
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub peek: bool,
}

impl StackItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            condition: None,
            size: String::new(),
            peek: false,
        }
    }

    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn peeked(mut self) -> Self {
        self.peek = true;
        self
    }

    pub fn is_array(&self) -> bool {
        !self.size.is_empty()
    }

    pub fn is_unused(&self) -> bool {
        self.name == UNUSED
    }

    /// Number of slots the item occupies, as a C expression.
    pub fn slot_count(&self) -> &str {
        if self.size.is_empty() { "1" } else { &self.size }
    }
}

/// An inline-cache operand read by a micro-op.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheEntry {
    pub name: String,
    /// Width in 16-bit code units.
    pub size: usize,
}

impl CacheEntry {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    pub fn is_unused(&self) -> bool {
        self.name == UNUSED
    }
}

/// Input and output items of a micro-op, bottom of stack first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackEffect {
    pub inputs: Vec<StackItem>,
    pub outputs: Vec<StackItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Uop {
    pub name: String,
    pub stack: StackEffect,
    pub caches: Vec<CacheEntry>,
    /// Token stream of the body, including the enclosing braces.
    pub body: Vec<Token>,
    pub properties: Properties,
}

impl Uop {
    /// Location of the first body token, used to attribute diagnostics.
    pub fn location(&self) -> Option<SourceLocation> {
        self.body.first().map(|tkn| SourceLocation::new(&*tkn.file, tkn.line))
    }

    pub fn cache_size(&self) -> usize {
        self.caches.iter().map(|cache| cache.size).sum()
    }

    /// Body tokens without the enclosing braces.
    pub fn body_tokens(&self) -> &[Token] {
        match self.body.len() {
            0..=2 => &[],
            len => &self.body[1..len - 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Cache units reserved without any code.
    Skip(usize),
    /// Synchronisation point that writes the symbolic stack to memory.
    Flush,
    Uop(Uop),
}

const NO_PROPERTIES: Properties = Properties {
    needs_this: false,
    needs_prev: false,
    stores_sp: false,
    always_exits: false,
    ends_with_eval_breaker: false,
};

impl Part {
    pub fn properties(&self) -> &Properties {
        match self {
            Part::Uop(uop) => &uop.properties,
            Part::Skip(_) | Part::Flush => &NO_PROPERTIES,
        }
    }

    /// Code units this part occupies in the inline cache.
    pub fn cache_size(&self) -> usize {
        match self {
            Part::Skip(size) => *size,
            Part::Flush => 0,
            Part::Uop(uop) => uop.cache_size(),
        }
    }

    pub fn as_uop(&self) -> Option<&Uop> {
        match self {
            Part::Uop(uop) => Some(uop),
            Part::Skip(_) | Part::Flush => None,
        }
    }
}

/// A generic instruction together with its specializations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Family {
    pub name: String,
    /// Inline cache units shared by every member.
    pub size: usize,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub name: String,
    pub parts: Vec<Part>,
    /// Total width in code units, opcode word included.
    pub size: usize,
    pub family: Option<Family>,
    pub properties: Properties,
    pub is_target: bool,
    /// Operands guaranteed to be on the stack on entry, when known.
    pub entry_depth: Option<usize>,
}

impl Instruction {
    pub fn new(name: impl Into<String>, parts: Vec<Part>) -> Self {
        let size = 1 + parts.iter().map(Part::cache_size).sum::<usize>();
        Self {
            name: name.into(),
            parts,
            size,
            family: None,
            properties: Properties::default(),
            is_target: false,
            entry_depth: None,
        }
    }

    pub fn uops(&self) -> impl Iterator<Item = &Uop> {
        self.parts.iter().filter_map(Part::as_uop)
    }

    pub fn cache_size(&self) -> usize {
        self.parts.iter().map(Part::cache_size).sum()
    }

    /// Whether the generated block needs a `this_instr` binding.
    pub fn uses_this(&self) -> bool {
        self.properties.needs_this || self.uops().any(|uop| uop.caches.iter().any(|cache| !cache.is_unused()))
    }

    pub fn last_part_properties(&self) -> &Properties {
        self.parts.last().map(Part::properties).unwrap_or(&NO_PROPERTIES)
    }
}

/// Every instruction of one run, keyed by name. Iteration order is not
/// meaningful; emission sorts by name.
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    pub instructions: FastHashMap<String, Instruction>,
}

impl InstructionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instruction: Instruction) {
        self.instructions.insert(instruction.name.clone(), instruction);
    }

    pub fn get(&self, name: &str) -> Option<&Instruction> {
        self.instructions.get(name)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instructions in lexicographic name order.
    pub fn sorted(&self) -> Vec<&Instruction> {
        let mut insts: Vec<&Instruction> = self.instructions.values().collect();
        insts.sort_by(|a, b| a.name.cmp(&b.name));
        insts
    }
}
