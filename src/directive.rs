// Pseudo-op dispatcher.
//
// Grounded on spec §4.5's directive table. This module only recognizes a
// line's `op` field and splits its operand text into the pieces the
// directive needs (comma-separated lists, label/expression pairs); actual
// expression evaluation and state mutation happen in `pass.rs`, which
// owns the `SymbolTable`/`Image`/`ModuleScope` the directives act on.
// Keeping parsing and evaluation apart mirrors `operand.rs`'s split
// between `parse_operand_syntax` and `classify`.

use crate::charset::Encoding;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    /// `NAME = expr` — handled here as a directive keyed on the literal
    /// `=` op so `pass.rs` doesn't need a separate code path for it.
    Assign(String),
    SetPc(String),           // .ORG / *=
    SetBss(String),          // &= — sets the BSS pointer, not pc
    Load(String),
    Store { start: String, length: String, path: String },
    Byte(Vec<String>),
    Word(Vec<String>),
    BigWord(Vec<String>),
    Hex4(Vec<String>),
    Dec4(Vec<String>),
    Quad(Vec<String>),
    Real(Vec<String>),
    Real4(Vec<String>),
    Fill(String, Option<String>),
    Bss(String),
    Bits { glyphs: Vec<String>, msb_first: bool },
    Text { text: String, encoding: Encoding },
    Cpu(String),
    Case(bool),
    Base(String),
    Include(String),
    Size(String),
    End,
    Module(String),
    EndModule,
    MacroBegin { name: String, params: Vec<String> },
    MacroEnd,
    /// `SKI`/`PAG`/`NAM`/`SUBTTL` — listing-only no-ops (DESIGN.md open
    /// question #2).
    Skip,
    Page,
    Name(String),
    SubTitle(String),
}

/// Recognizes `op` (already `.`-normalized by `line.rs`, except bare
/// `MODULE`/`ENDMOD`/`MACRO`/`ENDM` which have no leading dot) and splits
/// `operand` as that directive requires. Returns `Ok(None)` when `op`
/// isn't a directive at all, so the caller falls through to instruction
/// encoding.
pub fn parse_directive(op: &str, operand: &str) -> Result<Option<Directive>, String> {
    let upper = op.to_ascii_uppercase();
    let operand = operand.trim();

    Ok(Some(match upper.as_str() {
        "=" => Directive::Assign(operand.to_string()),
        ".ORG" | "*=" => Directive::SetPc(operand.to_string()),
        "&=" => Directive::SetBss(operand.to_string()),
        ".LOAD" => Directive::Load(operand.to_string()),
        ".STORE" => {
            let parts = split_top_level_commas(operand);
            if parts.len() != 3 {
                return Err(format!(".STORE expects start,length,\"file\" — found: {operand}"));
            }
            Directive::Store {
                start:  parts[0].trim().to_string(),
                length: parts[1].trim().to_string(),
                path:   unquote(parts[2].trim())?,
            }
        }
        ".BYTE" | ".BY" => Directive::Byte(split_list(operand)),
        ".WORD" | ".WO" => Directive::Word(split_list(operand)),
        ".BIGW" => Directive::BigWord(split_list(operand)),
        ".HEX4" => Directive::Hex4(split_list(operand)),
        ".DEC4" => Directive::Dec4(split_list(operand)),
        ".QUAD" => Directive::Quad(split_list(operand)),
        ".REAL" => Directive::Real(split_list(operand)),
        ".REAL4" => Directive::Real4(split_list(operand)),
        ".FILL" => {
            let parts = split_list(operand);
            match parts.len() {
                1 => Directive::Fill(parts[0].clone(), None),
                2 => Directive::Fill(parts[0].clone(), Some(parts[1].clone())),
                _ => return Err(".FILL takes one or two arguments".to_string()),
            }
        }
        ".BSS" => Directive::Bss(operand.to_string()),
        ".BITS" | ".LITS" => Directive::Bits {
            glyphs: split_list(operand),
            msb_first: upper == ".BITS",
        },
        ".PET" => Directive::Text { text: unquote(operand)?, encoding: Encoding::Petscii },
        ".DISP" => Directive::Text { text: unquote(operand)?, encoding: Encoding::ScreenCode },
        ".CPU" => Directive::Cpu(strip_quotes(operand).to_string()),
        ".CASE" => Directive::Case(parse_on_off(operand)?),
        ".BASE" => Directive::Base(operand.to_string()),
        ".INCLUDE" | "!SRC" => Directive::Include(unquote(operand)?),
        ".SIZE" => Directive::Size(operand.to_string()),
        ".END" => Directive::End,
        "MODULE" => Directive::Module(operand.to_string()),
        "ENDMOD" => Directive::EndModule,
        "MACRO" => {
            let (name, params) = split_macro_header(operand)?;
            if params.len() > 10 {
                return Err("MACRO supports at most 10 parameters".to_string());
            }
            Directive::MacroBegin { name, params }
        }
        "ENDMAC" | "ENDM" => Directive::MacroEnd,
        "SKI" => Directive::Skip,
        "PAG" => Directive::Page,
        "NAM" => Directive::Name(strip_quotes(operand).to_string()),
        "SUBTTL" => Directive::SubTitle(strip_quotes(operand).to_string()),
        _ => return Ok(None),
    }))
}

/// Whether `op` (already `.`-normalized, as `line.rs` would leave it) is
/// a recognized directive keyword at all, independent of whether the
/// particular operand given happens to be valid for it. `line.rs` uses
/// this to tell a column-1 directive apart from a label with no
/// knowledge of the keyword set itself: `parse_directive(op, "")` only
/// returns `Ok(None)` for a genuinely unrecognized keyword — an empty
/// operand invalid for a *recognized* directive's arity comes back `Err`.
pub fn is_known_op(op: &str) -> bool {
    !matches!(parse_directive(op, ""), Ok(None))
}

pub(crate) fn split_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    split_top_level_commas(s).into_iter().map(|p| p.trim().to_string()).collect()
}

/// `NAME(a,b,…)` — the paren-call syntax spec §4.6 uses for both macro
/// definitions and invocations (`pass.rs` parses invocations the same
/// way via `pub(crate)` reuse of this module's comma splitter).
fn split_macro_header(operand: &str) -> Result<(String, Vec<String>), String> {
    let operand = operand.trim();
    let open = operand.find('(')
        .ok_or_else(|| format!("MACRO expects NAME(params): {operand}"))?;
    if !operand.ends_with(')') {
        return Err(format!("MACRO missing closing ')': {operand}"));
    }
    let name = operand[..open].trim().to_string();
    if name.is_empty() {
        return Err("MACRO requires a name".to_string());
    }
    let params_text = &operand[open + 1..operand.len() - 1];
    Ok((name, split_list(params_text)))
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut fields = Vec::new();
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match in_quote {
            Some(q) => { if c == q { in_quote = None; } }
            None => match c {
                '\'' | '"' => in_quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                ',' if depth == 0 => {
                    fields.push(s[start..i].to_string());
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    fields.push(s[start..].to_string());
    fields
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let b = s.as_bytes();
        if (b[0] == b'"' && b[s.len() - 1] == b'"') || (b[0] == b'\'' && b[s.len() - 1] == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn unquote(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.len() < 2 || !(s.starts_with('"') && s.ends_with('"')) {
        return Err(format!("expected a quoted string, found: {s}"));
    }
    Ok(s[1..s.len() - 1].to_string())
}

fn parse_on_off(s: &str) -> Result<bool, String> {
    match s.trim() {
        "+" => Ok(true),
        "-" => Ok(false),
        other => Err(format!(".CASE expects + or -, found: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_org() {
        assert_eq!(parse_directive(".ORG", "$C000").unwrap(), Some(Directive::SetPc("$C000".into())));
    }

    #[test]
    fn star_equals_alias_for_org() {
        assert_eq!(parse_directive("*=", "$C000").unwrap(), Some(Directive::SetPc("$C000".into())));
    }

    #[test]
    fn byte_list_splits_on_commas() {
        assert_eq!(
            parse_directive(".BYTE", "$01, $02, LABEL+1").unwrap(),
            Some(Directive::Byte(vec!["$01".into(), "$02".into(), "LABEL+1".into()]))
        );
    }

    #[test]
    fn byte_list_ignores_commas_inside_parens() {
        assert_eq!(
            parse_directive(".BYTE", "(1,2), $03").unwrap(),
            Some(Directive::Byte(vec!["(1,2)".into(), "$03".into()]))
        );
    }

    #[test]
    fn store_splits_start_length_and_path() {
        assert_eq!(
            parse_directive(".STORE", "$C000,$0100,\"out.bin\"").unwrap(),
            Some(Directive::Store { start: "$C000".into(), length: "$0100".into(), path: "out.bin".into() })
        );
    }

    #[test]
    fn assign_op_carries_raw_expression() {
        assert_eq!(parse_directive("=", "$10+1").unwrap(), Some(Directive::Assign("$10+1".into())));
    }

    #[test]
    fn include_requires_quoted_path() {
        assert!(parse_directive(".INCLUDE", "unquoted.inc").is_err());
        assert_eq!(
            parse_directive(".INCLUDE", "\"util.inc\"").unwrap(),
            Some(Directive::Include("util.inc".into()))
        );
    }

    #[test]
    fn bang_src_is_include_alias() {
        assert_eq!(
            parse_directive("!SRC", "\"util.inc\"").unwrap(),
            Some(Directive::Include("util.inc".into()))
        );
    }

    #[test]
    fn case_requires_plus_or_minus() {
        assert_eq!(parse_directive(".CASE", "+").unwrap(), Some(Directive::Case(true)));
        assert!(parse_directive(".CASE", "MAYBE").is_err());
    }

    #[test]
    fn unknown_op_returns_none() {
        assert_eq!(parse_directive("LDA", "#$01").unwrap(), None);
    }

    #[test]
    fn macro_begin_splits_name_and_params() {
        assert_eq!(
            parse_directive("MACRO", "LDXY(W)").unwrap(),
            Some(Directive::MacroBegin { name: "LDXY".into(), params: vec!["W".into()] })
        );
    }

    #[test]
    fn macro_begin_allows_zero_params() {
        assert_eq!(
            parse_directive("MACRO", "NOP10()").unwrap(),
            Some(Directive::MacroBegin { name: "NOP10".into(), params: vec![] })
        );
    }

    #[test]
    fn endmac_and_endm_are_both_accepted() {
        assert_eq!(parse_directive("ENDMAC", "").unwrap(), Some(Directive::MacroEnd));
        assert_eq!(parse_directive("ENDM", "").unwrap(), Some(Directive::MacroEnd));
    }

    #[test]
    fn ampersand_equals_sets_bss_pointer() {
        assert_eq!(parse_directive("&=", "$C000").unwrap(), Some(Directive::SetBss("$C000".into())));
    }

    #[test]
    fn no_op_directives_recognized() {
        assert_eq!(parse_directive("SKI", "").unwrap(), Some(Directive::Skip));
        assert_eq!(parse_directive("NAM", "\"My Program\"").unwrap(), Some(Directive::Name("My Program".into())));
    }
}
