// Macro engine.
//
// Grounded on spec §4.6's redesign note: a macro body is captured as a
// list of tagged segments (`Literal` text vs. `ArgRef` positional
// parameter) rather than storing the raw text and doing textual
// substitution at expansion time. Parameter substitution during capture
// is whole-token, so a parameter named `A` does not corrupt an identifier
// like `ABC` that merely starts with the same letters.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    ArgRef(usize),
}

#[derive(Clone, Debug)]
struct MacroLine {
    segments: Vec<Segment>,
}

#[derive(Clone, Debug)]
pub struct MacroDef {
    pub params: Vec<String>,
    lines:      Vec<MacroLine>,
}

pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable { macros: HashMap::new() }
    }

    pub fn reset(&mut self) {
        self.macros.clear();
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(&name.to_ascii_uppercase())
    }

    /// Captures a macro body, tagging each line's tokens as literal text
    /// or a reference to one of `params` by position.
    pub fn define(&mut self, name: &str, params: Vec<String>, body_lines: &[String]) -> Result<(), String> {
        let key = name.to_ascii_uppercase();
        if self.macros.contains_key(&key) {
            return Err(format!("macro {name} already defined"));
        }
        let lines = body_lines.iter().map(|line| capture_line(line, &params)).collect();
        self.macros.insert(key, MacroDef { params, lines });
        Ok(())
    }

    /// Expands one invocation into the concrete source lines to splice
    /// back into the pass driver (spec §4.6: "pushed back into the pass
    /// driver one line at a time without consuming source-file line
    /// numbers" — the caller is responsible for that splicing; this
    /// function only does text substitution).
    pub fn expand(&self, name: &str, args: &[String]) -> Result<Vec<String>, String> {
        let key = name.to_ascii_uppercase();
        let def = self.macros.get(&key).ok_or_else(|| format!("undefined macro: {name}"))?;
        if args.len() != def.params.len() {
            return Err(format!(
                "macro {name} expects {} argument(s), got {}", def.params.len(), args.len()
            ));
        }
        Ok(def.lines.iter().map(|line| render_line(line, args)).collect())
    }
}

impl Default for MacroTable {
    fn default() -> Self { Self::new() }
}

fn capture_line(line: &str, params: &[String]) -> MacroLine {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = line.char_indices().peekable();
    let bytes = line.as_bytes();

    while let Some(&(i, c)) = chars.peek() {
        if is_ident_start(c) {
            let start = i;
            let mut end = i;
            while end < bytes.len() && is_ident_continue(bytes[end] as char) {
                end += 1;
            }
            let word = &line[start..end];
            if let Some(pos) = params.iter().position(|p| p.eq_ignore_ascii_case(word)) {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::ArgRef(pos));
            } else {
                literal.push_str(word);
            }
            while chars.peek().map(|&(j, _)| j < end).unwrap_or(false) {
                chars.next();
            }
        } else {
            literal.push(c);
            chars.next();
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    MacroLine { segments }
}

fn render_line(line: &MacroLine, args: &[String]) -> String {
    let mut out = String::new();
    for seg in &line.segments {
        match seg {
            Segment::Literal(s) => out.push_str(s),
            Segment::ArgRef(i) => out.push_str(&args[*i]),
        }
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_single_parameter() {
        let mut t = MacroTable::new();
        t.define("PUSHVAL", vec!["VAL".into()], &["LDA #VAL".into(), "PHA".into()]).unwrap();
        let lines = t.expand("PUSHVAL", &["$42".into()]).unwrap();
        assert_eq!(lines, vec!["LDA #$42".to_string(), "PHA".to_string()]);
    }

    #[test]
    fn does_not_substitute_inside_longer_identifier() {
        let mut t = MacroTable::new();
        t.define("M", vec!["A".into()], &["LDA ABC".into()]).unwrap();
        let lines = t.expand("M", &["$FF".into()]).unwrap();
        assert_eq!(lines, vec!["LDA ABC".to_string()]);
    }

    #[test]
    fn wrong_arg_count_errors() {
        let mut t = MacroTable::new();
        t.define("M", vec!["A".into(), "B".into()], &["NOP".into()]).unwrap();
        assert!(t.expand("M", &["1".into()]).is_err());
    }

    #[test]
    fn redefinition_errors() {
        let mut t = MacroTable::new();
        t.define("M", vec![], &["NOP".into()]).unwrap();
        assert!(t.define("M", vec![], &["RTS".into()]).is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut t = MacroTable::new();
        t.define("Foo", vec![], &["NOP".into()]).unwrap();
        assert!(t.is_defined("FOO"));
    }
}
