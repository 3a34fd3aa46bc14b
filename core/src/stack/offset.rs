use std::cmp::Ordering;

use crate::model::StackItem;

/// Size contributed by one item, as a C expression.
fn var_size(var: &StackItem) -> String {
    match var.condition.as_deref() {
        Some("0") => "0".to_string(),
        Some("1") | None => var.slot_count().to_string(),
        Some(cond) if !var.is_array() && cond == "oparg & 1" => format!("({cond})"),
        Some(cond) => format!("(({cond}) ? {} : 0)", var.slot_count()),
    }
}

/// True when the outermost parentheses enclose the whole expression.
fn is_wrapped(sym: &str) -> bool {
    if !sym.starts_with('(') || !sym.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in sym.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i + 1 < sym.len() {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn maybe_parenthesize(sym: &str) -> String {
    // `*` binds tighter than the `+`/`-` it gets joined with
    if sym.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '*') || is_wrapped(sym) {
        sym.to_string()
    } else {
        format!("({sym})")
    }
}

/// A symbolic stack offset: the sum of pushed sizes minus popped sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackOffset {
    popped: Vec<String>,
    pushed: Vec<String>,
}

impl StackOffset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn pop(&mut self, item: &StackItem) {
        self.popped.push(var_size(item));
    }

    pub fn push(&mut self, item: &StackItem) {
        self.pushed.push(var_size(item));
    }

    pub fn clear(&mut self) {
        self.popped.clear();
        self.pushed.clear();
    }

    /// Cancel terms that appear on both sides.
    fn simplified(&self) -> (Vec<String>, Vec<String>) {
        let mut popped = self.popped.clone();
        let mut pushed = self.pushed.clone();
        if popped.is_empty() || pushed.is_empty() {
            return (popped, pushed);
        }
        popped.sort();
        pushed.sort();
        let mut kept_popped = Vec::new();
        let mut kept_pushed = Vec::new();
        // both sides are sorted, so the larger tail can never find a match
        while let (Some(pop), Some(push)) = (popped.last(), pushed.last()) {
            match pop.cmp(push) {
                Ordering::Equal => {
                    popped.pop();
                    pushed.pop();
                }
                Ordering::Greater => kept_popped.extend(popped.pop()),
                Ordering::Less => kept_pushed.extend(pushed.pop()),
            }
        }
        kept_popped.extend(popped);
        kept_pushed.extend(pushed);
        kept_popped.sort();
        kept_pushed.sort();
        (kept_popped, kept_pushed)
    }

    /// Integer value, if the offset has no symbolic terms.
    pub fn as_int(&self) -> Option<i64> {
        let (popped, pushed) = self.simplified();
        let mut total = 0i64;
        for item in &popped {
            total -= item.parse::<i64>().ok()?;
        }
        for item in &pushed {
            total += item.parse::<i64>().ok()?;
        }
        Some(total)
    }

    /// Render as a C expression such as `-2` or `-1 - oparg`.
    pub fn to_c(&self) -> String {
        let (popped, pushed) = self.simplified();
        let mut int_offset = 0i64;
        let mut symbolic = String::new();
        for item in &popped {
            match item.parse::<i64>() {
                Ok(n) => int_offset -= n,
                Err(_) => symbolic.push_str(&format!(" - {}", maybe_parenthesize(item))),
            }
        }
        for item in &pushed {
            match item.parse::<i64>() {
                Ok(n) => int_offset += n,
                Err(_) => symbolic.push_str(&format!(" + {}", maybe_parenthesize(item))),
            }
        }
        let res = if !symbolic.is_empty() && int_offset == 0 {
            symbolic
        } else {
            format!("{int_offset}{symbolic}")
        };
        if let Some(rest) = res.strip_prefix(" + ") {
            rest.to_string()
        } else if let Some(rest) = res.strip_prefix(" - ") {
            format!("-{rest}")
        } else {
            res
        }
    }
}
