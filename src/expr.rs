// Expression evaluator.
//
// Grounded on spec §4.1 (recursive precedence climbing over signed
// integers, with a sentinel UNDEFINED) and on the teacher's
// `aex::operator`/`aex::operator::dispatch` modules, which dispatch unary
// and binary operators through a table rather than an ad-hoc chain of
// `if`s — generalized here to the fixed operator set spec.md names,
// since this assembler has no user-defined operators to register.

use crate::exprlex::{Lexer, Tok};
use crate::symtab::SymbolTable;

/// Sentinel for "value not yet known" (spec §3, §4.1). Chosen, as the
/// spec requires, outside any legal 16-bit address.
pub const UNDEFINED: i32 = 0x00FF_0000;

pub fn is_undefined(v: i32) -> bool {
    v == UNDEFINED
}

/// A symbol reference observed while evaluating an expression. The
/// evaluator itself does not decide whether to append it to the symbol's
/// reference list (only the final pass does, per spec §4.1); callers
/// collect these and do that bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolRef {
    pub name: String,
}

pub struct EvalContext<'a> {
    pub symtab:  &'a mut SymbolTable,
    pub pc:      i32,
    pub refs:    Vec<SymbolRef>,
    /// Synthetic symbol name of the nearest anonymous label (`:`) defined
    /// before this point in the current pass, for a bare `-` operand
    /// (spec §8 scenario 2). `None` if none has been defined yet.
    pub anon_back: Option<String>,
    /// Synthetic symbol name of the next anonymous label to be defined
    /// in the current pass, for a bare `+` operand. Resolves like any
    /// other forward symbol reference: `UNDEFINED` until that label is
    /// reached later in this pass.
    pub anon_fwd: Option<String>,
}

impl<'a> EvalContext<'a> {
    pub fn new(symtab: &'a mut SymbolTable, pc: i32) -> Self {
        EvalContext { symtab, pc, refs: Vec::new(), anon_back: None, anon_fwd: None }
    }
}

pub fn eval(text: &str, ctx: &mut EvalContext) -> Result<i32, String> {
    let mut p = Parser { lex: Lexer::new(text), cur: Tok::Eof, ctx };
    p.advance()?;
    let v = p.expr(0)?;
    if p.cur != Tok::Eof {
        return Err(format!("unexpected trailing token in expression: {:?}", p.cur));
    }
    Ok(v)
}

/// Evaluates `text` and additionally returns the number of remaining
/// unconsumed bytes, for callers (`.BYTE`/`.WORD` lists) that split a
/// comma-separated list externally but still want to validate each item
/// is a complete expression.
pub fn eval_allow_trailing(text: &str, ctx: &mut EvalContext) -> Result<i32, String> {
    let mut p = Parser { lex: Lexer::new(text), cur: Tok::Eof, ctx };
    p.advance()?;
    p.expr(0)
}

struct Parser<'s, 'a> {
    lex: Lexer<'s>,
    cur: Tok,
    ctx: &'s mut EvalContext<'a>,
}

fn binop_prec(t: &Tok) -> Option<u8> {
    use Tok::*;
    Some(match t {
        Star | Slash               => 11,
        Plus | Minus               => 10,
        Shl | Shr                  => 9,
        Le | Lt | Ge | Gt          => 8,
        Eq | Ne                    => 7,
        Amp                        => 6,
        Caret                      => 5,
        Pipe                       => 4,
        AndAnd                     => 3,
        OrOr                       => 2,
        _ => return None,
    })
}

fn combine(v: i32) -> i32 { v }

impl<'s, 'a> Parser<'s, 'a> {
    fn advance(&mut self) -> Result<(), String> {
        self.cur = self.lex.next()?;
        Ok(())
    }

    fn expr(&mut self, min_prec: u8) -> Result<i32, String> {
        let mut lhs = self.unary()?;
        loop {
            let Some(prec) = binop_prec(&self.cur) else { break };
            if prec < min_prec { break; }
            let op = self.cur.clone();
            self.advance()?;
            let rhs = self.expr(prec + 1)?;
            lhs = apply_binop(&op, lhs, rhs);
        }
        Ok(combine(lhs))
    }

    fn unary(&mut self) -> Result<i32, String> {
        match self.cur.clone() {
            Tok::Plus => {
                self.advance()?;
                if self.cur == Tok::Eof {
                    return self.anon_ref(true);
                }
                self.unary()
            }
            Tok::Minus => {
                self.advance()?;
                if self.cur == Tok::Eof {
                    return self.anon_ref(false);
                }
                let v = self.unary()?;
                Ok(if is_undefined(v) { UNDEFINED } else { -v })
            }
            Tok::Bang => {
                self.advance()?;
                let v = self.unary()?;
                Ok(if is_undefined(v) { UNDEFINED } else if v == 0 { 1 } else { 0 })
            }
            Tok::Tilde => {
                self.advance()?;
                let v = self.unary()?;
                Ok(if is_undefined(v) { UNDEFINED } else { !v })
            }
            Tok::Lt => {
                self.advance()?;
                let v = self.unary()?;
                Ok(if is_undefined(v) { UNDEFINED } else { v & 0xFF })
            }
            Tok::Gt => {
                self.advance()?;
                let v = self.unary()?;
                Ok(if is_undefined(v) { UNDEFINED } else { (v >> 8) & 0xFF })
            }
            Tok::Star => {
                self.advance()?;
                Ok(self.ctx.pc)
            }
            Tok::Question => {
                self.advance()?;
                let name = self.expect_ident()?;
                Ok(self.ctx.symtab.byte_span(&name).unwrap_or(UNDEFINED))
            }
            Tok::LParen => {
                self.advance()?;
                let v = self.expr(0)?;
                self.expect(Tok::RParen)?;
                Ok(v)
            }
            Tok::LBracket => {
                self.advance()?;
                let v = self.expr(0)?;
                self.expect(Tok::RBracket)?;
                Ok(v)
            }
            Tok::Int(n) => { self.advance()?; Ok(n as i32) }
            Tok::Char(c) => { self.advance()?; Ok(c as i32) }
            Tok::Ident(name) => {
                self.advance()?;
                let v = self.ctx.symtab.address_of_or_register(&name);
                self.ctx.refs.push(SymbolRef { name });
                Ok(v)
            }
            other => Err(format!("unexpected token in expression: {other:?}")),
        }
    }

    /// Resolves a bare trailing `-` (`forward = false`) or `+`
    /// (`forward = true`) to the anonymous label it names (spec §8
    /// scenario 2), via the same symbol lookup a named forward/backward
    /// reference would use.
    fn anon_ref(&mut self, forward: bool) -> Result<i32, String> {
        let slot = if forward { &self.ctx.anon_fwd } else { &self.ctx.anon_back };
        let Some(name) = slot.clone() else {
            let which = if forward { "forward" } else { "backward" };
            return Err(format!("no {which} anonymous label in scope"));
        };
        let v = self.ctx.symtab.address_of_or_register(&name);
        self.ctx.refs.push(SymbolRef { name });
        Ok(v)
    }

    fn expect(&mut self, t: Tok) -> Result<(), String> {
        if self.cur == t {
            self.advance()
        } else {
            Err(format!("expected {t:?}, found {:?}", self.cur))
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.cur.clone() {
            Tok::Ident(s) => { self.advance()?; Ok(s) }
            other => Err(format!("expected identifier, found {other:?}")),
        }
    }
}

fn apply_binop(op: &Tok, a: i32, b: i32) -> i32 {
    use Tok::*;
    if is_undefined(a) || is_undefined(b) {
        // Division by UNDEFINED and division by zero both yield UNDEFINED;
        // every other operator simply propagates UNDEFINED (spec §4.1).
        return UNDEFINED;
    }
    match op {
        Star   => a.wrapping_mul(b),
        Slash  => if b == 0 { UNDEFINED } else { a / b },
        Plus   => a.wrapping_add(b),
        Minus  => a.wrapping_sub(b),
        Shl    => a << (b & 31),
        Shr    => ((a as u32) >> (b & 31)) as i32,
        Le     => (a <= b) as i32,
        Lt     => (a <  b) as i32,
        Ge     => (a >= b) as i32,
        Gt     => (a >  b) as i32,
        Eq     => (a == b) as i32,
        Ne     => (a != b) as i32,
        Amp    => a & b,
        Caret  => a ^ b,
        Pipe   => a | b,
        AndAnd => ((a != 0) && (b != 0)) as i32,
        OrOr   => ((a != 0) || (b != 0)) as i32,
        _ => unreachable!("not a binary operator: {op:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::SymbolTable;

    fn new_ctx(symtab: &mut SymbolTable) -> EvalContext {
        EvalContext::new(symtab, 0x1000)
    }

    #[test]
    fn precedence() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        assert_eq!(eval("2+3*4", &mut ctx).unwrap(), 14);
    }

    #[test]
    fn relational_yields_zero_or_one() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        assert_eq!(eval("3<5", &mut ctx).unwrap(), 1);
        assert_eq!(eval("5<3", &mut ctx).unwrap(), 0);
    }

    #[test]
    fn undefined_propagates_except_division() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        // FOO is unseen -> UNDEFINED
        let v = eval("FOO+1", &mut ctx).unwrap();
        assert!(is_undefined(v));
    }

    #[test]
    fn division_by_zero_is_undefined() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        assert!(is_undefined(eval("1/0", &mut ctx).unwrap()));
    }

    #[test]
    fn current_pc_operator() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        assert_eq!(eval("*+2", &mut ctx).unwrap(), 0x1002);
    }

    #[test]
    fn low_high_byte_operators() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        assert_eq!(eval("<$1234", &mut ctx).unwrap(), 0x34);
        assert_eq!(eval(">$1234", &mut ctx).unwrap(), 0x12);
    }

    #[test]
    fn anonymous_back_label_resolves_to_named_symbol() {
        let mut t = SymbolTable::new(true);
        t.define("@anon@0", 0x1000, crate::symtab::DefMode::Position, 1);
        let mut ctx = new_ctx(&mut t);
        ctx.anon_back = Some("@anon@0".to_string());
        assert_eq!(eval("-", &mut ctx).unwrap(), 0x1000);
    }

    #[test]
    fn anonymous_forward_label_is_undefined_until_defined() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        ctx.anon_fwd = Some("@anon@0".to_string());
        assert!(is_undefined(eval("+", &mut ctx).unwrap()));
    }

    #[test]
    fn bare_minus_without_a_prior_anonymous_label_errors() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        assert!(eval("-", &mut ctx).is_err());
    }

    #[test]
    fn grouping_brackets_and_parens() {
        let mut t = SymbolTable::new(true);
        let mut ctx = new_ctx(&mut t);
        assert_eq!(eval("[1+2]*3", &mut ctx).unwrap(), 9);
        assert_eq!(eval("(1+2)*3", &mut ctx).unwrap(), 9);
    }
}
