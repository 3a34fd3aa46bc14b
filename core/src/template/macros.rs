use std::slice::Iter;

use super::{TemplateError, Token, TokenKind};
use crate::model::{Instruction, Uop};
use crate::stack::Stack;
use crate::writer::CodeWriter;

/// Identifiers expanded during body emission.
pub const MACROS: [&str; 7] = [
    "DEOPT_IF",
    "EXIT_IF",
    "ERROR_IF",
    "ERROR_NO_POP",
    "DECREF_INPUTS",
    "SYNC_SP",
    "CHECK_EVAL_BREAKER",
];

struct Expander<'a, 'o> {
    out: &'o mut CodeWriter,
    tokens: Iter<'a, Token>,
    uop: &'a Uop,
    inst: &'a Instruction,
}

impl<'a> Expander<'a, '_> {
    fn expect(&mut self, kind: TokenKind, what: &str, macro_tkn: &Token) -> Result<&'a Token, TemplateError> {
        match self.tokens.next() {
            Some(tkn) if tkn.kind == kind => Ok(tkn),
            Some(tkn) => Err(TemplateError::at(
                format!("expected {what} in {}, found '{}'", macro_tkn.text, tkn.text),
                tkn,
            )),
            None => Err(TemplateError::at(
                format!("unexpected end of body in {}", macro_tkn.text),
                macro_tkn,
            )),
        }
    }

    fn expect_empty_call(&mut self, macro_tkn: &Token) -> Result<(), TemplateError> {
        self.expect(TokenKind::LParen, "'('", macro_tkn)?;
        self.expect(TokenKind::RParen, "')'", macro_tkn)?;
        self.expect(TokenKind::Semi, "';'", macro_tkn)?;
        Ok(())
    }

    /// Copy tokens up to the first `end` outside nested parentheses. The end
    /// token itself is consumed but not written.
    fn emit_to(&mut self, end: TokenKind, macro_tkn: &Token) -> Result<(), TemplateError> {
        let mut parens = 0usize;
        for tkn in self.tokens.by_ref() {
            if tkn.kind == end && parens == 0 {
                return Ok(());
            }
            match tkn.kind {
                TokenKind::LParen => parens += 1,
                TokenKind::RParen => parens = parens.saturating_sub(1),
                _ => {}
            }
            self.out.emit_token(tkn);
        }
        Err(TemplateError::at(
            format!("unterminated {} invocation", macro_tkn.text),
            macro_tkn,
        ))
    }

    fn deopt(&mut self, tkn: &Token) -> Result<(), TemplateError> {
        self.out.emit_at("DEOPT_IF", tkn);
        let lparen = self.expect(TokenKind::LParen, "'('", tkn)?;
        self.out.emit_token(lparen);
        self.emit_to(TokenKind::RParen, tkn)?;
        self.expect(TokenKind::Semi, "';'", tkn)?;
        let target = self.inst.family.as_ref().map_or(&self.inst.name, |family| &family.name);
        self.out.emit(format!(", {target});\n"));
        Ok(())
    }

    fn error_if(&mut self, tkn: &Token, stack: &Stack) -> Result<(), TemplateError> {
        self.out.emit_at("if ", tkn);
        let lparen = self.expect(TokenKind::LParen, "'('", tkn)?;
        self.out.emit_token(lparen);
        self.emit_to(TokenKind::Comma, tkn)?;
        let label = self.expect(TokenKind::Identifier, "a label", tkn)?.text.clone();
        self.expect(TokenKind::RParen, "')'", tkn)?;
        self.expect(TokenKind::Semi, "';'", tkn)?;
        self.out.emit(") ");
        match stack.peek_offset().as_int().map(|net| -net) {
            Some(popped) if popped > 0 => self.out.emit(format!("goto pop_{popped}_{label};\n")),
            Some(0) => self.out.emit(format!("goto {label};\n")),
            _ => {
                self.out.emit("{\n");
                stack.flush_locally(self.out);
                self.out.emit(format!("goto {label};\n"));
                self.out.emit("}\n");
            }
        }
        Ok(())
    }

    fn decref_inputs(&mut self, tkn: &Token) -> Result<(), TemplateError> {
        self.expect_empty_call(tkn)?;
        self.out.emit_at("", tkn);
        for var in &self.uop.stack.inputs {
            if var.is_unused() || var.peek {
                continue;
            }
            if var.is_array() {
                self.out.emit(format!("for (int _i = {}; --_i >= 0;) {{\n", var.size));
                self.out.emit(format!("PyStackRef_CLOSE({}[_i]);\n", var.name));
                self.out.emit("}\n");
                continue;
            }
            match var.condition.as_deref() {
                None | Some("1") => self.out.emit(format!("PyStackRef_CLOSE({});\n", var.name)),
                Some("0") => {}
                Some(_) => self.out.emit(format!("PyStackRef_XCLOSE({});\n", var.name)),
            }
        }
        Ok(())
    }
}

/// Write the body of `uop`, expanding macro invocations against `stack`.
pub fn emit_tokens(out: &mut CodeWriter, uop: &Uop, stack: &mut Stack, inst: &Instruction) -> Result<(), TemplateError> {
    let body = uop.body_tokens();
    if body.is_empty() {
        return Ok(());
    }
    out.start_line();
    let mut exp = Expander {
        out,
        tokens: body.iter(),
        uop,
        inst,
    };
    while let Some(tkn) = exp.tokens.next() {
        if tkn.kind != TokenKind::Identifier || !MACROS.contains(&tkn.text.as_str()) {
            exp.out.emit_token(tkn);
            continue;
        }
        match tkn.text.as_str() {
            "DEOPT_IF" | "EXIT_IF" => exp.deopt(tkn)?,
            "ERROR_IF" => exp.error_if(tkn, stack)?,
            "ERROR_NO_POP" => {
                exp.expect_empty_call(tkn)?;
                exp.out.emit_at("goto error;", tkn);
            }
            "DECREF_INPUTS" => exp.decref_inputs(tkn)?,
            "SYNC_SP" => {
                exp.expect_empty_call(tkn)?;
                stack.flush(exp.out);
            }
            "CHECK_EVAL_BREAKER" => {
                exp.expect_empty_call(tkn)?;
                if !uop.properties.ends_with_eval_breaker {
                    exp.out.emit_at("CHECK_EVAL_BREAKER();", tkn);
                }
            }
            _ => exp.out.emit_token(tkn),
        }
    }
    Ok(())
}
