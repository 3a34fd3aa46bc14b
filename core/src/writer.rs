//! Indentation-aware sink for generated C text.
//!
//! Plain strings are laid out by brace and parenthesis counting. Body tokens
//! keep the spacing they had in the definition file, and can optionally be
//! annotated with `#line` directives pointing back at it.

use std::fmt::Write as _;

use crate::template::{Token, TokenKind};

const INDENT_WIDTH: usize = 4;

fn is_label(txt: &str) -> bool {
    !txt.starts_with("//") && txt.trim_end().ends_with(':')
}

fn net_count(txt: &str, open: char, close: char) -> isize {
    txt.chars().filter(|c| *c == open).count() as isize - txt.chars().filter(|c| *c == close).count() as isize
}

#[derive(Debug)]
pub struct CodeWriter {
    buf: String,
    indents: Vec<usize>,
    line_directives: bool,
    /// End position of the last token written, cleared by plain text.
    last_token: Option<(u32, u32)>,
    newline: bool,
}

impl CodeWriter {
    /// A writer whose output starts `levels` indentation levels deep.
    pub fn new(levels: usize, line_directives: bool) -> Self {
        Self {
            buf: String::new(),
            indents: (0..=levels).map(|i| i * INDENT_WIDTH).collect(),
            line_directives,
            last_token: None,
            newline: true,
        }
    }

    fn indent(&self) -> usize {
        self.indents.last().copied().unwrap_or(0)
    }

    fn pad(&mut self, width: usize) {
        self.buf.extend(std::iter::repeat_n(' ', width));
    }

    fn pop_indent(&mut self) {
        if self.indents.len() > 1 {
            self.indents.pop();
        }
    }

    fn line_directive(&mut self, tkn: &Token) {
        let _ = writeln!(self.buf, "#line {} \"{}\"", tkn.line, tkn.file);
    }

    fn set_position(&mut self, tkn: &Token) {
        match self.last_token {
            Some((last_line, _)) if last_line < tkn.line => {
                self.buf.push('\n');
                if self.line_directives {
                    self.line_directive(tkn);
                }
                self.pad(self.indent());
            }
            Some((_, last_end)) => {
                self.pad(tkn.column.saturating_sub(last_end) as usize);
            }
            None if self.newline => {
                if self.line_directives {
                    self.line_directive(tkn);
                }
                self.pad(self.indent());
            }
            None => {}
        }
        self.last_token = Some((tkn.end_line, tkn.end_column));
        self.newline = false;
    }

    fn maybe_dedent(&mut self, txt: &str) {
        if net_count(txt, '(', ')') < 0 {
            self.pop_indent();
        }
        if net_count(txt, '{', '}') < 0 || is_label(txt) {
            self.pop_indent();
        }
    }

    fn maybe_indent(&mut self, txt: &str) {
        if net_count(txt, '(', ')') > 0 {
            let current = self.indent();
            let offset = match self.last_token {
                Some((_, end)) => {
                    let aligned = (end as usize).saturating_sub(1);
                    if aligned <= current || aligned > 40 {
                        current + INDENT_WIDTH
                    } else {
                        aligned
                    }
                }
                None => current + INDENT_WIDTH,
            };
            self.indents.push(offset);
        }
        if is_label(txt) || net_count(txt, '{', '}') > 0 {
            self.indents.push(self.indent() + INDENT_WIDTH);
        }
    }

    fn emit_multiline_comment(&mut self, tkn: &Token) {
        self.set_position(tkn);
        for (i, line) in tkn.text.split_inclusive('\n').enumerate() {
            let text = line.trim_start();
            let spaces = match i {
                0 => 0,
                _ if text.starts_with('*') => self.indent() + 1,
                _ => self.indent() + 3,
            };
            self.pad(spaces);
            self.buf.push_str(text);
        }
    }

    pub fn emit_token(&mut self, tkn: &Token) {
        if tkn.kind == TokenKind::Comment && tkn.text.contains('\n') {
            self.emit_multiline_comment(tkn);
            return;
        }
        self.maybe_dedent(&tkn.text);
        self.set_position(tkn);
        self.buf.push_str(&tkn.text);
        if tkn.kind == TokenKind::CMacro {
            // preprocessor lines always stand alone
            self.buf.push('\n');
            self.newline = true;
            self.last_token = None;
            return;
        }
        self.maybe_indent(&tkn.text);
    }

    /// Write text in place of `tkn`, keeping the token's position.
    pub fn emit_at(&mut self, txt: &str, tkn: &Token) {
        self.set_position(tkn);
        self.buf.push_str(txt);
    }

    pub fn emit(&mut self, txt: impl AsRef<str>) {
        let txt = txt.as_ref();
        self.maybe_dedent(txt);
        if self.newline && !txt.is_empty() {
            if !txt.starts_with('\n') {
                self.pad(self.indent());
            }
            self.newline = false;
        }
        self.buf.push_str(txt);
        if txt.ends_with('\n') {
            self.newline = true;
        }
        self.maybe_indent(txt);
        self.last_token = None;
    }

    /// Make sure the next write starts on a fresh line.
    pub fn start_line(&mut self) {
        if !self.newline {
            self.buf.push('\n');
        }
        self.newline = true;
        self.last_token = None;
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod writer_test {
    use std::sync::Arc;

    use super::*;
    use crate::template::lex;

    #[test]
    fn indents_by_brace_level() {
        let mut out = CodeWriter::new(1, false);
        out.emit("if (x) {\n");
        out.emit("y = 1;\n");
        out.emit("}\n");
        assert_eq!(out.finish(), "    if (x) {\n        y = 1;\n    }\n");
    }

    #[test]
    fn start_line_only_breaks_open_lines() {
        let mut out = CodeWriter::new(0, false);
        out.start_line();
        out.emit("a;");
        out.start_line();
        out.start_line();
        out.emit("b;\n");
        assert_eq!(out.finish(), "a;\nb;\n");
    }

    #[test]
    fn tokens_keep_source_spacing() {
        let tokens = lex("x  = y +1;\nz = 2;", Arc::from("defs.c"), 10).expect("lex");
        let mut out = CodeWriter::new(1, false);
        for tkn in &tokens {
            out.emit_token(tkn);
        }
        assert_eq!(out.finish(), "    x  = y +1;\n    z = 2;");
    }

    #[test]
    fn line_directives_precede_each_source_line() {
        let tokens = lex("a = 1;\nb = 2;", Arc::from("defs.c"), 7).expect("lex");
        let mut out = CodeWriter::new(0, true);
        for tkn in &tokens {
            out.emit_token(tkn);
        }
        let text = out.finish();
        assert_eq!(text, "#line 7 \"defs.c\"\na = 1;\n#line 8 \"defs.c\"\nb = 2;");
    }

    #[test]
    fn labels_dedent_their_line() {
        let mut out = CodeWriter::new(1, false);
        out.emit("{\n");
        out.emit("x = 1;\n");
        out.emit("}\n");
        out.emit("done:\n");
        out.emit("y = 2;\n");
        let text = out.finish();
        assert!(text.contains("\ndone:\n"), "label should be dedented:\n{text}");
        assert!(text.contains("\n    y = 2;\n"), "label body should be indented:\n{text}");
    }
}
