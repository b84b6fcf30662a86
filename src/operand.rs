// Addressing-mode classification.
//
// Grounded on spec §4.3 and the redesign note in spec §9: parse the raw
// operand text into a small syntax tree once, then pattern-match over
// that tree (plus the resolved value and CPU/flavor state) to choose a
// concrete addressing mode, instead of ad-hoc substring probing. The
// tree shape is modeled on the teacher's `aex::target::cf::modes`
// module, which does the analogous prefix/inner/suffix decomposition for
// ColdFire operands.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    RelativeShort,
    RelativeLong,
    DirectPage,
    Absolute,
    DirectPageX,
    DirectPageY,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    IndirectZ,
    Indirect32,
    TestBitBranch,
}

impl AddrMode {
    /// Synthetic tags used as the first (definition-site) reference
    /// entry in the symbol table (spec §3).
    pub const DEF: &'static str = "DEF";
    pub const BSS: &'static str = "BSS";
    pub const POS: &'static str = "POS";
}

/// The register named by an index suffix, e.g. `,X` / `,Y` / `,Z`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IndexReg { X, Y, Z }

/// Parsed shape of an operand, before the value has been evaluated.
/// Mirrors the syntactic distinctions spec §4.3's table makes (prefix
/// marker, brackets/parens, suffix marker) without yet knowing whether
/// the inner expression fits in a byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperandSyntax {
    /// No operand text at all.
    None,
    /// Bare `A` or `Q` (accumulator).
    Accumulator,
    /// `#expr`
    Immediate(String),
    /// `expr` or `expr,X` / `expr,Y`
    Bare(String, Option<IndexReg>),
    /// `(expr)` or `(expr),Y` / `(expr),Z` or `(expr,X)`
    Paren { inner: String, pre_index: Option<IndexReg>, post_index: Option<IndexReg> },
    /// `[expr],Z` — 45GS02 32-bit indirect
    Bracket { inner: String, post_index: Option<IndexReg> },
    /// `dp,target` — test-bit-branch form used by some 65C02/45GS02 ops
    TestBitBranch { dp: String, target: String },
}

/// Parses raw operand text (already trimmed of surrounding whitespace
/// and comment) into an `OperandSyntax`. Does not evaluate expressions.
pub fn parse_operand_syntax(text: &str) -> Result<OperandSyntax, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(OperandSyntax::None);
    }
    if text.eq_ignore_ascii_case("A") || text.eq_ignore_ascii_case("Q") {
        return Ok(OperandSyntax::Accumulator);
    }
    if let Some(rest) = text.strip_prefix('#') {
        return Ok(OperandSyntax::Immediate(rest.trim().to_string()));
    }
    if let Some(rest) = text.strip_prefix('[') {
        let (inner, after) = split_bracket(rest, '[', ']')?;
        let post = parse_trailing_index(after)?;
        return Ok(OperandSyntax::Bracket { inner, post_index: post });
    }
    if let Some(rest) = text.strip_prefix('(') {
        let (inner_raw, after) = split_bracket(rest, '(', ')')?;
        // `(expr,X)` — pre-index inside the parens
        if let Some(comma) = find_top_level_comma(&inner_raw) {
            let (inner, idx_text) = inner_raw.split_at(comma);
            let idx_text = &idx_text[1..];
            let reg = parse_index_letter(idx_text.trim())?;
            if after.trim().is_empty() {
                return Ok(OperandSyntax::Paren {
                    inner: inner.trim().to_string(),
                    pre_index: Some(reg),
                    post_index: None,
                });
            }
            return Err("unexpected text after (expr,X)".into());
        }
        // `(expr)` / `(expr),Y` / `(expr),Z` / Commodore `(expr)Y`
        let post = parse_trailing_index(after)?;
        return Ok(OperandSyntax::Paren {
            inner: inner_raw.trim().to_string(),
            pre_index: None,
            post_index: post,
        });
    }
    // bit,target test-bit-branch form: a comma separates two expressions
    // where the first is a bare direct-page value and no index suffix
    // follows. We only take this path when there are exactly two
    // top-level comma-separated fields; plain `expr,X`/`expr,Y` is
    // distinguished in `parse_trailing_index`'s caller by register name.
    if let Some(comma) = find_top_level_comma(text) {
        let (first, rest) = text.split_at(comma);
        let rest = &rest[1..];
        if let Ok(reg) = parse_index_letter(rest.trim()) {
            return Ok(OperandSyntax::Bare(first.trim().to_string(), Some(reg)));
        }
        return Ok(OperandSyntax::TestBitBranch {
            dp: first.trim().to_string(),
            target: rest.trim().to_string(),
        });
    }
    Ok(OperandSyntax::Bare(text.to_string(), None))
}

fn parse_index_letter(s: &str) -> Result<IndexReg, String> {
    match s {
        "X" | "x" => Ok(IndexReg::X),
        "Y" | "y" => Ok(IndexReg::Y),
        "Z" | "z" => Ok(IndexReg::Z),
        other => Err(format!("expected index register, found '{other}'")),
    }
}

/// Handles the text following a closing `)`/`]`: either empty, `,Y`,
/// `,Z`, or the Commodore-style no-comma `Y` suffix (Open Question #1 in
/// DESIGN.md — accepted only when `Y`/`y` is the entire remaining text).
fn parse_trailing_index(after: &str) -> Result<Option<IndexReg>, String> {
    let after = after.trim();
    if after.is_empty() {
        return Ok(None);
    }
    if let Some(rest) = after.strip_prefix(',') {
        return Ok(Some(parse_index_letter(rest.trim())?));
    }
    if after.eq_ignore_ascii_case("y") {
        return Ok(Some(IndexReg::Y));
    }
    Err(format!("unexpected text after closing bracket: '{after}'"))
}

fn split_bracket(rest: &str, open: char, close: char) -> Result<(String, String), String> {
    let mut depth = 1i32;
    for (i, c) in rest.char_indices() {
        if c == open { depth += 1; }
        else if c == close {
            depth -= 1;
            if depth == 0 {
                return Ok((rest[..i].to_string(), rest[i + 1..].to_string()));
            }
        }
    }
    Err(format!("missing closing '{close}'"))
}

fn find_top_level_comma(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Inputs needed to narrow a provisional addressing mode to the
/// shortest legal encoding (spec §4.3's "Resolution rule").
pub struct ClassifyInput {
    pub mnemonic:        String,
    pub value:           i32,
    pub value_defined:   bool,
    pub has_dp_opcode:   bool,
    pub has_abs_opcode:  bool,
    pub force_16bit:     bool, // backtick prefix forces wide encoding
    pub is_branch:       bool,
    pub is_long_branch:  bool,
}

pub fn classify(syntax: &OperandSyntax, input: &ClassifyInput) -> Result<(AddrMode, u8), String> {
    use OperandSyntax::*;
    match syntax {
        None => Ok((AddrMode::Implied, 1)),
        Accumulator => Ok((AddrMode::Accumulator, 1)),
        Immediate(_) => Ok((AddrMode::Immediate, 2)),
        TestBitBranch { .. } => Ok((AddrMode::TestBitBranch, 3)),
        Bracket { .. } => Ok((AddrMode::Indirect32, 3)),
        Paren { pre_index: Some(IndexReg::X), post_index: None, .. } => {
            Ok((AddrMode::IndirectX, 2))
        }
        Paren { pre_index: None, post_index: Some(IndexReg::Y), .. } => {
            Ok((AddrMode::IndirectY, 2))
        }
        Paren { pre_index: None, post_index: Some(IndexReg::Z), .. } => {
            Ok((AddrMode::IndirectZ, 2))
        }
        Paren { pre_index: None, post_index: None, .. } => {
            // JMP/JSR (abs) are always 16-bit; otherwise narrowed like
            // any other direct operand below when the mnemonic allows.
            if input.mnemonic == "JMP" || input.mnemonic == "JSR" {
                Ok((AddrMode::Indirect, 3))
            } else {
                Ok((AddrMode::IndirectZ, 2))
            }
        }
        Paren { .. } => Err("unsupported indirect operand form".into()),
        Bare(_, idx) => {
            if input.is_branch {
                return Ok(if input.is_long_branch {
                    (AddrMode::RelativeLong, 3)
                } else {
                    (AddrMode::RelativeShort, 2)
                });
            }
            let fits_byte = input.value_defined
                && !input.force_16bit
                && (0..=255).contains(&input.value);
            match idx {
                None => {
                    if fits_byte && input.has_dp_opcode {
                        Ok((AddrMode::DirectPage, 2))
                    } else {
                        Ok((AddrMode::Absolute, 3))
                    }
                }
                Some(IndexReg::X) => {
                    if fits_byte && input.has_dp_opcode {
                        Ok((AddrMode::DirectPageX, 2))
                    } else {
                        Ok((AddrMode::AbsoluteX, 3))
                    }
                }
                Some(IndexReg::Y) => {
                    if fits_byte && input.has_dp_opcode {
                        Ok((AddrMode::DirectPageY, 2))
                    } else {
                        Ok((AddrMode::AbsoluteY, 3))
                    }
                }
                Some(IndexReg::Z) => Err("',Z' index is only legal in indirect operands".into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_immediate() {
        assert_eq!(parse_operand_syntax("#$42").unwrap(), OperandSyntax::Immediate("$42".into()));
    }

    #[test]
    fn parses_indexed() {
        assert_eq!(
            parse_operand_syntax("$C000,X").unwrap(),
            OperandSyntax::Bare("$C000".into(), Some(IndexReg::X))
        );
    }

    #[test]
    fn parses_indirect_x() {
        assert_eq!(
            parse_operand_syntax("($20,X)").unwrap(),
            OperandSyntax::Paren { inner: "$20".into(), pre_index: Some(IndexReg::X), post_index: None }
        );
    }

    #[test]
    fn parses_indirect_indexed_y() {
        assert_eq!(
            parse_operand_syntax("($20),Y").unwrap(),
            OperandSyntax::Paren { inner: "$20".into(), pre_index: None, post_index: Some(IndexReg::Y) }
        );
    }

    #[test]
    fn parses_commodore_style_no_comma_y() {
        assert_eq!(
            parse_operand_syntax("($20)Y").unwrap(),
            OperandSyntax::Paren { inner: "$20".into(), pre_index: None, post_index: Some(IndexReg::Y) }
        );
    }

    #[test]
    fn parses_32bit_indirect() {
        assert_eq!(
            parse_operand_syntax("[$20],Z").unwrap(),
            OperandSyntax::Bracket { inner: "$20".into(), post_index: Some(IndexReg::Z) }
        );
    }

    #[test]
    fn narrows_to_direct_page_when_value_fits() {
        let syn = parse_operand_syntax("$10").unwrap();
        let input = ClassifyInput {
            mnemonic: "LDA".into(), value: 0x10, value_defined: true,
            has_dp_opcode: true, has_abs_opcode: true, force_16bit: false,
            is_branch: false, is_long_branch: false,
        };
        assert_eq!(classify(&syn, &input).unwrap(), (AddrMode::DirectPage, 2));
    }

    #[test]
    fn stays_absolute_when_value_too_wide() {
        let syn = parse_operand_syntax("$1000").unwrap();
        let input = ClassifyInput {
            mnemonic: "LDA".into(), value: 0x1000, value_defined: true,
            has_dp_opcode: true, has_abs_opcode: true, force_16bit: false,
            is_branch: false, is_long_branch: false,
        };
        assert_eq!(classify(&syn, &input).unwrap(), (AddrMode::Absolute, 3));
    }

    #[test]
    fn jmp_indirect_always_16bit() {
        let syn = parse_operand_syntax("($20,X)").unwrap();
        let input = ClassifyInput {
            mnemonic: "JMP".into(), value: 0x20, value_defined: true,
            has_dp_opcode: false, has_abs_opcode: true, force_16bit: false,
            is_branch: false, is_long_branch: false,
        };
        assert_eq!(classify(&syn, &input).unwrap(), (AddrMode::IndirectX, 2));
    }
}
