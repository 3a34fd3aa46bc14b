use super::AnalysisError;
use super::driver::Emitter;
use crate::model::{CacheEntry, Part, Uop};
use crate::template::emit_tokens;

/// Declaration of a local holding an inline-cache operand.
fn cache_read(cache: &CacheEntry, offset: usize) -> String {
    if cache.size == 4 {
        format!("PyObject *{} = read_obj(&this_instr[{offset}].cache);\n", cache.name)
    } else {
        let bits = cache.size * 16;
        format!("uint{bits}_t {} = read_u{bits}(&this_instr[{offset}].cache);\n", cache.name)
    }
}

impl Emitter<'_> {
    /// Emit one part. `offset` is the cache position of the part's first
    /// unit; the returned value is the position just past it.
    pub(super) fn write_part(&mut self, part: &Part, offset: usize) -> Result<usize, AnalysisError> {
        match part {
            Part::Skip(size) => {
                let entries = if *size > 1 { "entries" } else { "entry" };
                self.out.emit(format!("/* Skip {size} cache {entries} */\n"));
                Ok(offset + size)
            }
            Part::Flush => {
                self.out.emit("// flush\n");
                self.stack.flush(&mut self.out);
                Ok(offset)
            }
            Part::Uop(uop) => self.write_uop(uop, offset),
        }
    }

    fn write_uop(&mut self, uop: &Uop, mut offset: usize) -> Result<usize, AnalysisError> {
        let inst = self.inst;
        let stack_err = |err| AnalysisError::from_stack(inst, uop, err);

        self.out.start_line();
        if self.braces {
            self.out.emit(format!("// {}\n", uop.name));
            self.out.emit("{\n");
            self.locals.enter_scope();
        }

        for var in uop.stack.inputs.iter().rev() {
            let binding = self.stack.pop(var).map_err(stack_err)?;
            let code = self.locals.bind_input(var, binding);
            self.out.emit(code);
        }

        if uop.properties.stores_sp {
            // the body moves stack_pointer itself; outputs land afterwards
            for var in &uop.stack.outputs {
                if let Some(code) = self.locals.ensure_declared(var) {
                    self.out.emit(code);
                }
            }
        } else {
            for var in &uop.stack.outputs {
                let address = self.stack.push(var).map_err(stack_err)?;
                let code = self.locals.bind_output(var, address);
                self.out.emit(code);
            }
        }

        for cache in &uop.caches {
            if !cache.is_unused() {
                self.out.emit(cache_read(cache, offset));
                if inst.family.is_none() {
                    self.out.emit(format!("(void){};\n", cache.name));
                }
            }
            offset += cache.size;
        }

        emit_tokens(&mut self.out, uop, &mut self.stack, inst).map_err(|err| AnalysisError::from_template(inst, err))?;

        if uop.properties.stores_sp {
            self.out.start_line();
            for var in &uop.stack.outputs {
                let address = self.stack.push(var).map_err(stack_err)?;
                let code = self.locals.bind_output(var, address);
                self.out.emit(code);
            }
        }

        if self.braces {
            self.out.start_line();
            self.out.emit("}\n");
            self.locals.leave_scope();
        }
        Ok(offset)
    }
}
