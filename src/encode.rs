// Instruction encoder.
//
// Grounded on spec §4.3/§4.4 (classify the operand, narrow against the
// resolved value, emit bytes) and on the teacher's `aex::target::cf`
// encode path, which separates "pick the addressing mode" from "turn the
// mode + value into bytes" the same way this module separates
// `operand::classify` from `Encoder::encode`.

use crate::cpu::InstructionSet;
use crate::expr::{self, is_undefined, EvalContext, UNDEFINED};
use crate::operand::{self, AddrMode, ClassifyInput, OperandSyntax};

/// Per-instruction state the pass driver carries across passes so branch
/// widening and opcode freezing (spec §4.6, the convergence rules) can
/// see what the previous pass chose.
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeHistory {
    pub forced_long_branch: bool,
    pub prev_length: Option<u8>,
}

pub struct EncodeOutcome {
    pub bytes:  Vec<u8>,
    pub mode:   AddrMode,
    pub length: u8,
    /// Set when this pass had to promote a short branch to the 45GS02
    /// long-branch encoding because the target was out of 8-bit range;
    /// the pass driver uses this to decide whether another pass is
    /// needed (spec §4.6).
    pub widened: bool,
}

/// Encodes one instruction line. `operand_text` has already been split
/// from the mnemonic by the directive dispatcher; `force_16bit` is the
/// backtick-prefix forced-width marker (spec §4.3).
pub fn encode_instruction(
    set: &InstructionSet,
    mnemonic: &str,
    operand_text: &str,
    force_16bit: bool,
    branch_optimization: bool,
    pc: i32,
    ctx: &mut EvalContext,
    history: &mut EncodeHistory,
) -> Result<EncodeOutcome, String> {
    let mnemonic_upper = mnemonic.to_ascii_uppercase();

    // 45GS02 Q-register quad form: a 'Q' prefixed onto an otherwise
    // ordinary mnemonic asks for the same addressing mode, widened to the
    // 32-bit Q register and escaped with 0x42 0x42 (spec §4.3/§4.4 item 6).
    let is_quad = set.cpu().is_45gs02()
        && mnemonic_upper.len() > 1
        && mnemonic_upper.starts_with('Q')
        && set.is_known_mnemonic(&mnemonic_upper[1..]);
    let base_mnemonic = if is_quad { mnemonic_upper[1..].to_string() } else { mnemonic_upper };

    if !set.is_known_mnemonic(&base_mnemonic) {
        return Err(format!("unknown mnemonic on this CPU: {mnemonic}"));
    }

    let mut outcome = encode_base(set, &base_mnemonic, operand_text, force_16bit, branch_optimization, pc, ctx, history)?;
    if is_quad {
        outcome.bytes.insert(0, 0x42);
        outcome.bytes.insert(0, 0x42);
        outcome.length += 2;
    }
    Ok(outcome)
}

fn encode_base(
    set: &InstructionSet,
    mnemonic_upper: &str,
    operand_text: &str,
    force_16bit: bool,
    branch_optimization: bool,
    pc: i32,
    ctx: &mut EvalContext,
    history: &mut EncodeHistory,
) -> Result<EncodeOutcome, String> {
    let syntax = operand::parse_operand_syntax(operand_text)?;

    // BIT with no operand at all is the classic "skip next instruction"
    // trick: a single 0x2C byte borrowed from BIT absolute's opcode,
    // with the following two bytes reinterpreted as BIT's operand
    // (spec §4.3, BIT special case). It has no entry of its own in the
    // opcode table because it isn't really an addressing mode.
    if mnemonic_upper == "BIT" && matches!(syntax, OperandSyntax::None) {
        return Ok(EncodeOutcome { bytes: vec![0x2C], mode: AddrMode::Absolute, length: 1, widened: false });
    }

    let is_branch = set.is_branch_mnemonic(mnemonic_upper);

    // Evaluate eagerly for everything except relative branches, where we
    // need the *offset*, not the raw target address, and the offset
    // depends on the final instruction length (resolved below).
    let (value, value_defined) = if is_branch {
        (UNDEFINED, false)
    } else {
        let v = eval_operand(&syntax, ctx)?;
        (v, !is_undefined(v))
    };

    let has_dp_opcode  = set.has_mode(mnemonic_upper, AddrMode::DirectPage)
        || set.has_mode(mnemonic_upper, AddrMode::DirectPageX)
        || set.has_mode(mnemonic_upper, AddrMode::DirectPageY);
    let has_abs_opcode = set.has_mode(mnemonic_upper, AddrMode::Absolute)
        || set.has_mode(mnemonic_upper, AddrMode::AbsoluteX)
        || set.has_mode(mnemonic_upper, AddrMode::AbsoluteY);

    let is_long_branch = is_branch && (history.forced_long_branch || !set.has_mode(mnemonic_upper, AddrMode::RelativeShort));

    let classify_input = ClassifyInput {
        mnemonic: mnemonic_upper.to_string(),
        value,
        value_defined,
        has_dp_opcode,
        has_abs_opcode,
        force_16bit,
        is_branch,
        is_long_branch,
    };
    let (mut mode, mut length) = operand::classify(&syntax, &classify_input)?;

    if is_branch {
        return encode_branch(set, mnemonic_upper, &syntax, branch_optimization, pc, ctx, history);
    }

    if !set.has_mode(mnemonic_upper, mode) {
        // The narrowed mode isn't legal for this mnemonic (e.g. a
        // zero-page-only op given an absolute operand, or an index
        // register the mnemonic doesn't support) — widen once more to
        // absolute/indexed-absolute before giving up, mirroring how a
        // real assembler falls back rather than refusing a valid-looking
        // operand outright.
        let (widened_mode, widened_len) = widen_mode(mode).ok_or_else(|| {
            format!("addressing mode {mode:?} not supported by {mnemonic_upper}")
        })?;
        if !set.has_mode(mnemonic_upper, widened_mode) {
            return Err(format!("addressing mode not supported by {mnemonic_upper}: {operand_text}"));
        }
        mode = widened_mode;
        length = widened_len;
    }

    let entry = set.lookup(mnemonic_upper, mode)
        .ok_or_else(|| format!("addressing mode not supported by {mnemonic_upper}: {operand_text}"))?;

    // 32-bit indirect (`[expr],Z`) is an 0xEA-escaped form of the
    // mnemonic's base-page indirect-Z opcode: escape byte, base opcode,
    // one zero-page operand byte (spec §4.3 "opcode prefix + base").
    if mode == AddrMode::Indirect32 {
        let bytes = vec![0xEA, entry.opcode, low_byte(value, value_defined)];
        history.prev_length = Some(entry.length);
        return Ok(EncodeOutcome { bytes, mode, length: entry.length, widened: false });
    }

    let mut bytes = vec![entry.opcode];
    match length {
        1 => {}
        2 => bytes.push(low_byte(value, value_defined)),
        3 => {
            bytes.push(low_byte(value, value_defined));
            bytes.push(high_byte(value, value_defined));
        }
        other => return Err(format!("unsupported instruction length {other}")),
    }

    history.prev_length = Some(entry.length);
    Ok(EncodeOutcome { bytes, mode, length: entry.length, widened: false })
}

fn eval_operand(syntax: &OperandSyntax, ctx: &mut EvalContext) -> Result<i32, String> {
    use OperandSyntax::*;
    match syntax {
        None | Accumulator => Ok(0),
        Immediate(text) | Bare(text, _) => expr::eval(text, ctx),
        Paren { inner, .. } => expr::eval(inner, ctx),
        Bracket { inner, .. } => expr::eval(inner, ctx),
        TestBitBranch { dp, .. } => expr::eval(dp, ctx),
    }
}

fn low_byte(v: i32, defined: bool) -> u8 {
    if !defined { 0 } else { (v & 0xFF) as u8 }
}

fn high_byte(v: i32, defined: bool) -> u8 {
    if !defined { 0 } else { ((v >> 8) & 0xFF) as u8 }
}

/// Widens a narrowed-too-far mode one step, for mnemonics that lack the
/// direct-page form this assembler tried first.
fn widen_mode(mode: AddrMode) -> Option<(AddrMode, u8)> {
    match mode {
        AddrMode::DirectPage  => Some((AddrMode::Absolute, 3)),
        AddrMode::DirectPageX => Some((AddrMode::AbsoluteX, 3)),
        AddrMode::DirectPageY => Some((AddrMode::AbsoluteY, 3)),
        _ => None,
    }
}

/// Relative-branch encoding, including the 45GS02 fixed-point widening
/// rule from spec §4.6: a branch that doesn't fit in a signed byte this
/// pass is promoted to the long encoding and `widened` is reported so
/// the pass driver knows to run at least one more pass.
fn encode_branch(
    set: &InstructionSet,
    mnemonic: &str,
    syntax: &OperandSyntax,
    branch_optimization: bool,
    pc: i32,
    ctx: &mut EvalContext,
    history: &mut EncodeHistory,
) -> Result<EncodeOutcome, String> {
    let target_text = match syntax {
        OperandSyntax::Bare(text, None) => text.as_str(),
        _ => return Err(format!("{mnemonic} requires a single branch-target operand")),
    };

    if history.forced_long_branch {
        if !set.has_mode(mnemonic, AddrMode::RelativeLong) {
            return Err(format!("{mnemonic} has no long-branch encoding on this CPU"));
        }
        let entry = set.lookup(mnemonic, AddrMode::RelativeLong).unwrap();
        let target = expr::eval(target_text, ctx)?;
        let defined = !is_undefined(target);
        let offset = if defined { target.wrapping_sub(pc + 3) } else { 0 };
        let bytes = vec![entry.opcode, (offset & 0xFF) as u8, ((offset >> 8) & 0xFF) as u8];
        history.prev_length = Some(3);
        return Ok(EncodeOutcome { bytes, mode: AddrMode::RelativeLong, length: 3, widened: false });
    }

    let has_short = set.has_mode(mnemonic, AddrMode::RelativeShort);
    let has_long  = set.has_mode(mnemonic, AddrMode::RelativeLong);

    if has_short {
        let target = expr::eval(target_text, ctx)?;
        let defined = !is_undefined(target);
        let offset = if defined { target.wrapping_sub(pc + 2) } else { 0 };
        if defined && !(-128..=127).contains(&offset) {
            if !has_long || !branch_optimization {
                return Err(format!("branch target out of range for {mnemonic}: offset {offset}"));
            }
            history.forced_long_branch = true;
            let entry = set.lookup(mnemonic, AddrMode::RelativeLong).unwrap();
            let long_offset = target.wrapping_sub(pc + 3);
            let bytes = vec![entry.opcode, (long_offset & 0xFF) as u8, ((long_offset >> 8) & 0xFF) as u8];
            history.prev_length = Some(3);
            return Ok(EncodeOutcome { bytes, mode: AddrMode::RelativeLong, length: 3, widened: true });
        }
        let entry = set.lookup(mnemonic, AddrMode::RelativeShort).unwrap();
        let bytes = vec![entry.opcode, (offset & 0xFF) as u8];
        history.prev_length = Some(2);
        return Ok(EncodeOutcome { bytes, mode: AddrMode::RelativeShort, length: 2, widened: false });
    }

    // Mnemonic only has the long form on this CPU (shouldn't occur with
    // the current table, but handled for completeness).
    let entry = set.lookup(mnemonic, AddrMode::RelativeLong)
        .ok_or_else(|| format!("{mnemonic} is not a recognized branch on this CPU"))?;
    let target = expr::eval(target_text, ctx)?;
    let defined = !is_undefined(target);
    let offset = if defined { target.wrapping_sub(pc + 3) } else { 0 };
    let bytes = vec![entry.opcode, (offset & 0xFF) as u8, ((offset >> 8) & 0xFF) as u8];
    history.prev_length = Some(3);
    Ok(EncodeOutcome { bytes, mode: AddrMode::RelativeLong, length: 3, widened: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;
    use crate::symtab::SymbolTable;

    fn set(cpu: Cpu) -> InstructionSet {
        InstructionSet::for_cpu(cpu)
    }

    #[test]
    fn lda_immediate_emits_two_bytes() {
        let s = set(Cpu::Mos6502);
        let mut t = SymbolTable::new(true);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let out = encode_instruction(&s, "LDA", "#$42", false, true, 0x1000, &mut ctx, &mut h).unwrap();
        assert_eq!(out.bytes, vec![0xA9, 0x42]);
    }

    #[test]
    fn lda_zero_page_narrows() {
        let s = set(Cpu::Mos6502);
        let mut t = SymbolTable::new(true);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let out = encode_instruction(&s, "LDA", "$10", false, true, 0x1000, &mut ctx, &mut h).unwrap();
        assert_eq!(out.bytes, vec![0xA5, 0x10]);
        assert_eq!(out.mode, AddrMode::DirectPage);
    }

    #[test]
    fn lda_forced_16bit_stays_absolute() {
        let s = set(Cpu::Mos6502);
        let mut t = SymbolTable::new(true);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let out = encode_instruction(&s, "LDA", "$10", true, true, 0x1000, &mut ctx, &mut h).unwrap();
        assert_eq!(out.bytes, vec![0xAD, 0x10, 0x00]);
    }

    #[test]
    fn bit_no_operand_is_single_byte_skip_trick() {
        let s = set(Cpu::Mos6502);
        let mut t = SymbolTable::new(true);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let out = encode_instruction(&s, "BIT", "", false, true, 0x1000, &mut ctx, &mut h).unwrap();
        assert_eq!(out.bytes, vec![0x2C]);
    }

    #[test]
    fn branch_forward_in_range() {
        let s = set(Cpu::Mos6502);
        let mut t = SymbolTable::new(true);
        t.define("TARGET", 0x1010, crate::symtab::DefMode::Position, 1);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let out = encode_instruction(&s, "BEQ", "TARGET", false, true, 0x1000, &mut ctx, &mut h).unwrap();
        assert_eq!(out.bytes, vec![0xF0, 0x0E]);
    }

    #[test]
    fn branch_out_of_range_without_long_form_errors() {
        let s = set(Cpu::Mos6502);
        let mut t = SymbolTable::new(true);
        t.define("TARGET", 0x2000, crate::symtab::DefMode::Position, 1);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let res = encode_instruction(&s, "BEQ", "TARGET", false, true, 0x1000, &mut ctx, &mut h);
        assert!(res.is_err());
    }

    #[test]
    fn gs02_branch_out_of_range_widens_to_long() {
        let s = set(Cpu::Csg45Gs02);
        let mut t = SymbolTable::new(true);
        t.define("TARGET", 0x3000, crate::symtab::DefMode::Position, 1);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let out = encode_instruction(&s, "BEQ", "TARGET", false, true, 0x1000, &mut ctx, &mut h).unwrap();
        assert_eq!(out.mode, AddrMode::RelativeLong);
        assert!(out.widened);
        assert!(h.forced_long_branch);
    }

    #[test]
    fn gs02_branch_out_of_range_errors_when_optimization_disabled() {
        let s = set(Cpu::Csg45Gs02);
        let mut t = SymbolTable::new(true);
        t.define("TARGET", 0x3000, crate::symtab::DefMode::Position, 1);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let res = encode_instruction(&s, "BEQ", "TARGET", false, false, 0x1000, &mut ctx, &mut h);
        assert!(res.is_err());
    }

    #[test]
    fn unknown_mnemonic_on_base_6502_errors() {
        let s = set(Cpu::Mos6502);
        let mut t = SymbolTable::new(true);
        let mut ctx = EvalContext::new(&mut t, 0x1000);
        let mut h = EncodeHistory::default();
        let res = encode_instruction(&s, "STZ", "$10", false, true, 0x1000, &mut ctx, &mut h);
        assert!(res.is_err());
    }
}
