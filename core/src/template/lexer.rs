use std::sync::Arc;

use super::{TemplateError, Token, TokenKind};

const THREE_CHAR_OPS: [&str; 3] = ["<<=", ">>=", "..."];
const TWO_CHAR_OPS: [&str; 20] = [
    "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "##",
];

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    file: &'a Arc<str>,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_while(&mut self, text: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
    }

    /// True when only whitespace precedes the cursor on its line.
    fn at_line_start(&self) -> bool {
        self.chars[..self.pos]
            .iter()
            .rev()
            .take_while(|c| **c != '\n')
            .all(|c| c.is_whitespace())
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::new(message, self.file.clone(), self.line)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenize C body text starting at `first_line` of `file`.
pub fn lex(text: &str, file: Arc<str>, first_line: u32) -> Result<Vec<Token>, TemplateError> {
    let mut cur = Cursor {
        chars: text.chars().collect(),
        pos: 0,
        line: first_line,
        column: 0,
        file: &file,
    };
    let mut tokens = Vec::new();

    while let Some(c) = cur.peek() {
        if c.is_whitespace() {
            cur.bump();
            continue;
        }
        let (line, column) = (cur.line, cur.column);
        let mut text = String::new();
        let kind = if cur.starts_with("//") {
            cur.bump_while(&mut text, |c| c != '\n');
            TokenKind::Comment
        } else if cur.starts_with("/*") {
            loop {
                if cur.starts_with("*/") {
                    text.push_str("*/");
                    cur.bump();
                    cur.bump();
                    break;
                }
                match cur.bump() {
                    Some(c) => text.push(c),
                    None => return Err(TemplateError::new("unterminated comment", file.clone(), line)),
                }
            }
            TokenKind::Comment
        } else if c == '#' && cur.at_line_start() {
            while let Some(c) = cur.peek() {
                if c == '\n' {
                    break;
                }
                if c == '\\' && cur.peek_at(1) == Some('\n') {
                    text.push_str("\\\n");
                    cur.bump();
                    cur.bump();
                    continue;
                }
                text.push(c);
                cur.bump();
            }
            TokenKind::CMacro
        } else if is_ident_start(c) {
            cur.bump_while(&mut text, is_ident_continue);
            TokenKind::Identifier
        } else if c.is_ascii_digit() || (c == '.' && cur.peek_at(1).is_some_and(|n| n.is_ascii_digit())) {
            while let Some(c) = cur.peek() {
                let exponent_sign =
                    matches!(c, '+' | '-') && text.ends_with(['e', 'E', 'p', 'P']) && !text.starts_with("0x");
                if !(is_ident_continue(c) || c == '.' || exponent_sign) {
                    break;
                }
                text.push(c);
                cur.bump();
            }
            TokenKind::Number
        } else if c == '"' || c == '\'' {
            let quote = c;
            text.push(quote);
            cur.bump();
            loop {
                match cur.bump() {
                    Some('\\') => {
                        text.push('\\');
                        match cur.bump() {
                            Some(escaped) => text.push(escaped),
                            None => return Err(cur.error("unterminated literal")),
                        }
                    }
                    Some('\n') | None => return Err(TemplateError::new("unterminated literal", file.clone(), line)),
                    Some(c) => {
                        text.push(c);
                        if c == quote {
                            break;
                        }
                    }
                }
            }
            if quote == '"' { TokenKind::Str } else { TokenKind::Char }
        } else {
            let op = THREE_CHAR_OPS
                .iter()
                .chain(TWO_CHAR_OPS.iter())
                .find(|op| cur.starts_with(op))
                .copied();
            match op {
                Some(op) => {
                    for _ in 0..op.chars().count() {
                        cur.bump();
                    }
                    text.push_str(op);
                    TokenKind::Op
                }
                None => {
                    cur.bump();
                    text.push(c);
                    match c {
                        '(' => TokenKind::LParen,
                        ')' => TokenKind::RParen,
                        '{' => TokenKind::LBrace,
                        '}' => TokenKind::RBrace,
                        '[' => TokenKind::LBracket,
                        ']' => TokenKind::RBracket,
                        ',' => TokenKind::Comma,
                        ';' => TokenKind::Semi,
                        _ => TokenKind::Op,
                    }
                }
            }
        };
        tokens.push(Token {
            kind,
            text,
            file: file.clone(),
            line,
            column,
            end_line: cur.line,
            end_column: cur.column,
        });
    }

    Ok(tokens)
}
