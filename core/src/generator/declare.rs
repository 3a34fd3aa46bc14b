use std::collections::BTreeSet;

use super::AnalysisError;
use crate::model::{Instruction, Part, StackItem};
use crate::stack::{Binding, Stack, StackError, check_distinct};
use crate::writer::CodeWriter;

/// C type and null sentinel for a stack item.
pub fn type_and_null(var: &StackItem) -> (&str, &'static str) {
    match &var.ty {
        Some(ty) => (ty.as_str(), "NULL"),
        None if var.is_array() => ("_PyStackRef *", "NULL"),
        None => ("_PyStackRef", "PyStackRef_NULL"),
    }
}

fn declaration(var: &StackItem, init: Option<&str>) -> String {
    let (ty, _) = type_and_null(var);
    let space = if ty.ends_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        " "
    } else {
        ""
    };
    match init {
        Some(init) => format!("{ty}{space}{} = {init};\n", var.name),
        None => format!("{ty}{space}{};\n", var.name),
    }
}

/// Declaration emitted ahead of the parts: guarded items start out null so
/// they are defined even when the guard is false at runtime.
pub fn declare_variable(var: &StackItem, out: &mut CodeWriter) {
    let (_, null) = type_and_null(var);
    let init = var.condition.as_ref().map(|_| null);
    out.emit(declaration(var, init));
}

/// Names that must be declared at the top of the dispatch block.
///
/// Runs the whole instruction through a throwaway stack. With a single micro-op
/// there is no inner scope, so everything can be declared where it is bound.
/// Otherwise every name still live on the symbolic stack when a part ends is
/// referenced outside that part's braces and needs an outer declaration.
pub fn required_variables(inst: &Instruction) -> Result<BTreeSet<String>, AnalysisError> {
    let mut stack = Stack::with_entry_depth(inst.entry_depth);
    let scoped = inst.uops().count() > 1;
    let mut required = BTreeSet::new();
    for part in &inst.parts {
        let uop = match part {
            Part::Uop(uop) => uop,
            Part::Flush => {
                stack.reset();
                continue;
            }
            Part::Skip(_) => continue,
        };
        let simulate = |stack: &mut Stack| -> Result<(), StackError> {
            check_distinct(&uop.stack.inputs)?;
            check_distinct(&uop.stack.outputs)?;
            for var in uop.stack.inputs.iter().rev() {
                stack.pop(var)?;
            }
            for var in &uop.stack.outputs {
                stack.push(var)?;
            }
            Ok(())
        };
        simulate(&mut stack).map_err(|err| AnalysisError::from_stack(inst, uop, err))?;
        if scoped {
            required.extend(
                stack
                    .live()
                    .iter()
                    .filter(|var| !var.is_unused())
                    .map(|var| var.name.clone()),
            );
        }
    }
    Ok(required)
}

/// Emit one declaration per required name, in first-mention order.
pub fn declare_variables(inst: &Instruction, required: &BTreeSet<String>, out: &mut CodeWriter) {
    let mut pending = required.clone();
    for uop in inst.uops() {
        for var in uop.stack.inputs.iter().chain(&uop.stack.outputs) {
            if pending.remove(&var.name) {
                declare_variable(var, out);
            }
        }
    }
}

/// Which locals have a declaration visible at the current point of a block.
#[derive(Debug, Default)]
pub struct Locals {
    declared: BTreeSet<String>,
    scopes: Vec<Vec<String>>,
}

impl Locals {
    pub fn new(outer: &BTreeSet<String>) -> Self {
        Self {
            declared: outer.clone(),
            scopes: Vec::new(),
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    fn record(&mut self, name: &str) {
        if self.declared.insert(name.to_string())
            && let Some(scope) = self.scopes.last_mut()
        {
            scope.push(name.to_string());
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub fn leave_scope(&mut self) {
        if let Some(names) = self.scopes.pop() {
            for name in names {
                self.declared.remove(&name);
            }
        }
    }

    /// `name = value;`, declaring the local first if nothing has yet.
    fn assign(&mut self, var: &StackItem, value: &str) -> String {
        if self.is_declared(&var.name) {
            format!("{} = {value};\n", var.name)
        } else {
            self.record(&var.name);
            declaration(var, Some(value))
        }
    }

    /// Declare `var` if needed, null-initialised when it is guarded.
    pub fn ensure_declared(&mut self, var: &StackItem) -> Option<String> {
        if var.is_unused() || self.is_declared(&var.name) {
            return None;
        }
        self.record(&var.name);
        let (_, null) = type_and_null(var);
        Some(declaration(var, var.condition.as_ref().map(|_| null)))
    }

    /// Code binding a popped input to its local.
    pub fn bind_input(&mut self, var: &StackItem, binding: Binding) -> String {
        if var.is_unused() {
            return String::new();
        }
        match binding {
            Binding::None => self.ensure_declared(var).unwrap_or_default(),
            Binding::Copy(source) => self.assign(var, &source),
            Binding::Load(value) => match var.condition.as_deref() {
                None | Some("1") => self.assign(var, &value),
                Some("0") => self.ensure_declared(var).unwrap_or_default(),
                Some(condition) => {
                    let mut code = self.ensure_declared(var).unwrap_or_default();
                    code.push_str(&format!("if ({condition}) {{ {} = {value}; }}\n", var.name));
                    code
                }
            },
        }
    }

    /// Code for an output slot that was just pushed; `address` is set for
    /// array items bound into the stack.
    pub fn bind_output(&mut self, var: &StackItem, address: Option<String>) -> String {
        match address {
            Some(address) => self.assign(var, &address),
            None => self.ensure_declared(var).unwrap_or_default(),
        }
    }
}
