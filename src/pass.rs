// Pass driver.
//
// Grounded on the teacher's `aex::compiler`/`aex::compilation` idiom: one
// struct (`Assembler`) bundling every piece of mutable state a compile
// needs, built once via `new()` and driven by a top-level `run()`. Spec
// §4.2's phase-error policy and §9's multi-pass loop are layered on top of
// that: each call to `run_one_pass` re-reads the source from scratch and
// resets everything that is a function of *this pass's* reading of it
// (scope, conditionals, macros, image-write bitmap, program counter), while
// the symbol table and per-instruction `EncodeHistory` persist across
// passes so addresses and branch-widening decisions can converge.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;

use crate::charset::{self, Encoding};
use crate::conditional::ConditionalStack;
use crate::config::{Config, MAX_PASSES};
use crate::cpu::{Cpu, InstructionSet};
use crate::directive::{self, Directive};
use crate::encode::{self, EncodeHistory};
use crate::error::{AsmError, Diagnostics};
use crate::expr::{self, EvalContext};
use crate::image::{Image, StoreDirective};
use crate::line::{self, SplitLine};
use crate::listing::{self, ListingLine};
use crate::macros::MacroTable;
use crate::modscope::ModuleScope;
use crate::pos::Pos;
use crate::source::SourceStack;
use crate::symtab::{DefMode, DefOutcome, RefTag, SymbolInfo, SymbolTable};
use crate::xref;

pub struct Assembler {
    config:         Config,
    symtab:         SymbolTable,
    image:          Image,
    scope:          ModuleScope,
    macros:         MacroTable,
    conditionals:   ConditionalStack,
    cpu:            Cpu,
    set:            InstructionSet,
    diagnostics:    Diagnostics,
    listing_lines:  Vec<String>,
    preprocessed:   Vec<String>,
    encode_history: HashMap<u32, EncodeHistory>,
    /// Count of anonymous (`:`-only) labels defined so far in the
    /// current pass, reset each pass; backs the synthetic `@anon@N`
    /// symbol names `-`/`+` resolve to (spec §8 scenario 2).
    anon_seq:       u32,
}

impl Assembler {
    pub fn new(config: Config) -> Self {
        let mut symtab = SymbolTable::new(config.case_sensitive);
        for (name, value) in &config.defines {
            symtab.define_locked(name, *value);
        }
        let cpu = config.default_cpu;
        let set = InstructionSet::for_cpu(cpu);
        let image = Image::new(config.fill_byte);
        let err_max = config.err_max;
        Assembler {
            config,
            symtab,
            image,
            scope: ModuleScope::new(),
            macros: MacroTable::new(),
            conditionals: ConditionalStack::new(),
            cpu,
            set,
            diagnostics: Diagnostics::new(err_max),
            listing_lines: Vec::new(),
            preprocessed: Vec::new(),
            encode_history: HashMap::new(),
            anon_seq: 0,
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn preprocessed_text(&self) -> String {
        self.preprocessed.join("\n")
    }

    /// Final listing: per-line rows followed by the address-sorted symbol
    /// table and the two cross-reference tables (spec §6).
    pub fn listing_text(&self) -> String {
        let mut out = self.listing_lines.join("\n");
        let symbols: Vec<SymbolInfo> = self.symtab.iter().cloned().collect();
        let refs: Vec<&SymbolInfo> = symbols.iter().collect();
        out.push_str("\n\n");
        out.push_str(&listing::format_symbol_table(&refs));
        out.push('\n');
        out.push_str(&xref::format_table("ZERO PAGE XREF", &xref::zero_page_table(&symbols)));
        out.push('\n');
        out.push_str(&xref::format_table("LOW 16K XREF", &xref::low_16k_table(&symbols)));
        out
    }

    /// Drives passes until the symbol table and branch widths stabilize
    /// (spec §9), then runs one more pass with writes armed to produce the
    /// final image/listing. A residual change discovered during that final
    /// pass is a convergence failure (spec §4.2/§7).
    pub fn run(&mut self) -> Result<(), AsmError> {
        for pass_no in 1..=MAX_PASSES {
            let changed = self.run_one_pass(pass_no, false)?;
            if !changed {
                self.image.set_final_pass(true);
                self.image.reset_pass_state();
                let changed_final = self.run_one_pass(pass_no, true)?;
                if changed_final {
                    return Err(AsmError::convergence(
                        "addresses did not stabilize on the final verification pass",
                    ));
                }
                return Ok(());
            }
            if pass_no == MAX_PASSES {
                return Err(AsmError::resource(format!(
                    "exceeded {MAX_PASSES} passes without converging"
                )));
            }
        }
        unreachable!("loop always returns by the last iteration")
    }

    /// Whether `tok` (a column-1 candidate first field) is a mnemonic or
    /// directive keyword rather than a label — `line.rs` defers this
    /// check to us since it has no knowledge of either table.
    fn is_op(&self, tok: &str) -> bool {
        self.set.is_known_mnemonic(tok)
            || directive::is_known_op(&line::normalize_directive_name(tok))
            || cond_keyword(tok).is_some()
            || self.macros.is_defined(tok)
    }

    fn qualify_label(&self, raw: &str) -> String {
        if is_bso_local(raw) {
            self.scope.qualify_bso_local(raw)
        } else {
            self.scope.qualify(raw)
        }
    }

    /// Rewrites `.`/`_`-prefixed locals and BSO-style `NN$` locals inside an
    /// expression's text to their module-qualified form before evaluation,
    /// using the same whole-token scanning `macros.rs` uses for parameter
    /// substitution (spec §3, Scope).
    fn qualify_locals_in_expr(&self, text: &str) -> String {
        let mut out = String::new();
        let bytes = text.as_bytes();
        let mut i = 0usize;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if is_ident_start(c) {
                let start = i;
                let mut end = i;
                while end < bytes.len() && is_ident_continue(bytes[end] as char) {
                    end += 1;
                }
                let word = &text[start..end];
                if is_bso_local(word) {
                    out.push_str(&self.scope.qualify_bso_local(word));
                } else if word.starts_with('.') || word.starts_with('_') {
                    out.push_str(&self.scope.qualify(word));
                } else {
                    out.push_str(word);
                }
                i = end;
            } else {
                out.push(c);
                i += 1;
            }
        }
        out
    }

    fn define_symbol(
        &mut self,
        name: &str,
        value: i32,
        mode: DefMode,
        line: u32,
        pos: &Pos,
        defined_this_pass: &mut HashSet<String>,
        any_changed: &mut bool,
        final_pass: bool,
    ) -> Result<(), AsmError> {
        let key = if self.config.case_sensitive { name.to_string() } else { name.to_uppercase() };
        if !defined_this_pass.insert(key) {
            return self.diagnostics.report(
                pos.clone(), 1,
                AsmError::semantic(format!("{name} is already defined earlier in this pass")),
            );
        }
        match self.symtab.define(name, value, mode, line) {
            DefOutcome::Changed => {
                if final_pass {
                    return self.diagnostics.report(
                        pos.clone(), 1,
                        AsmError::convergence(format!("address of {name} did not converge")),
                    );
                }
                *any_changed = true;
            }
            DefOutcome::Created | DefOutcome::Unchanged | DefOutcome::LockedNoop => {}
        }
        Ok(())
    }

    /// Defines whatever label a line carries: a named label, qualified
    /// and defined as usual, or — when `split_line` reports an empty
    /// label, meaning the line's column-1 token was a bare `:` — the next
    /// anonymous label in sequence (spec §8 scenario 2).
    fn handle_label_def(
        &mut self,
        raw_label: &str,
        in_bss: bool,
        bss_pointer: i32,
        pc: Option<i32>,
        line: u32,
        pos: &Pos,
        defined_this_pass: &mut HashSet<String>,
        any_changed: &mut bool,
        final_pass: bool,
    ) -> Result<(), AsmError> {
        let value = if in_bss { bss_pointer } else { pc.unwrap_or(crate::expr::UNDEFINED) };
        if raw_label.is_empty() {
            let name = format!("@anon@{}", self.anon_seq);
            self.anon_seq += 1;
            return self.define_symbol(&name, value, DefMode::Position, line, pos, defined_this_pass, any_changed, final_pass);
        }
        let qualified = self.qualify_label(raw_label);
        let mode = if in_bss { DefMode::Bss } else { DefMode::Position };
        self.define_symbol(&qualified, value, mode, line, pos, defined_this_pass, any_changed, final_pass)
    }

    fn run_one_pass(&mut self, pass_no: u32, final_pass: bool) -> Result<bool, AsmError> {
        self.scope.reset();
        self.macros.reset();
        self.conditionals.reset();
        self.anon_seq = 0;
        self.cpu = self.config.default_cpu;
        self.set = InstructionSet::for_cpu(self.cpu);
        self.symtab.set_case_sensitive(self.config.case_sensitive);
        self.diagnostics = Diagnostics::new(self.config.err_max);
        self.listing_lines.clear();
        self.preprocessed.clear();

        let mut source = SourceStack::new(self.config.delist, self.config.line_numbers);
        source.push_file(&self.config.source)?;

        let mut pc: Option<i32> = None;
        let mut bss_pointer: i32 = 0;
        let mut in_bss = false;
        let mut load_mode = false;
        let mut base_page: u8 = 0;
        let mut module_start: Vec<i32> = Vec::new();
        let mut defined_this_pass: HashSet<String> = HashSet::new();
        let mut any_changed = false;
        let mut occurrence: u32 = 0;
        let mut capturing: Option<(String, Vec<String>, Vec<String>)> = None;

        while let Some((raw, pos)) = source.next_line()? {
            if let Some((name, params, mut body)) = capturing.take() {
                let split = line::split_line(&raw, &|tok: &str| self.is_op(tok));
                let is_end = split.label.is_none()
                    && split.op.as_deref().map(|o| o.eq_ignore_ascii_case("ENDMAC") || o.eq_ignore_ascii_case("ENDM")).unwrap_or(false);
                if is_end {
                    if let Err(e) = self.macros.define(&name, params, &body) {
                        self.diagnostics.report(pos.clone(), 1, AsmError::semantic(e))?;
                    }
                } else {
                    body.push(raw.clone());
                    capturing = Some((name, params, body));
                }
                continue;
            }

            let split = line::split_line(&raw, &|tok: &str| self.is_op(tok));
            let mut emit_preprocessed = true;

            if let Some(op) = &split.op {
                if let Some(kind) = cond_keyword(op) {
                    emit_preprocessed = false;
                    self.handle_conditional(kind, &split.operand, pass_no, &pos, pc.unwrap_or(0))?;
                    continue;
                }
            }

            if self.conditionals.is_skipping() {
                continue;
            }

            if let Some((label, name, args_text)) = classify_macro_call(&split, &self.macros) {
                emit_preprocessed = false;
                if let Some(raw_label) = label {
                    self.handle_label_def(&raw_label, in_bss, bss_pointer, pc, pos.line, &pos, &mut defined_this_pass, &mut any_changed, final_pass)?;
                }
                let args = directive::split_list(&args_text);
                match self.macros.expand(&name, &args) {
                    Ok(lines) => {
                        let frame_name = pos.file.clone();
                        source.push_memory(frame_name, pos.line, lines);
                    }
                    Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::semantic(e))?; }
                }
                continue;
            }

            match &split.op {
                None => {
                    if let Some(raw_label) = &split.label {
                        self.handle_label_def(raw_label, in_bss, bss_pointer, pc, pos.line, &pos, &mut defined_this_pass, &mut any_changed, final_pass)?;
                    }
                }
                Some(op_text) => {
                    match directive::parse_directive(op_text, &split.operand) {
                        Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax(e))?; }
                        Ok(Some(Directive::Assign(expr_text))) => {
                            match &split.label {
                                None => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax("'=' requires a label"))?; }
                                Some(raw_label) => {
                                    let qualified = self.qualify_label(raw_label);
                                    let text = self.qualify_locals_in_expr(&expr_text);
                                    let value = {
                                        let mut ctx = EvalContext::new(&mut self.symtab, pc.unwrap_or(0));
                                        let v = expr::eval(&text, &mut ctx);
                                        if final_pass {
                                            for r in ctx.refs.drain(..) {
                                                self.symtab.add_reference(&r.name, pos.line, RefTag::Def);
                                            }
                                        }
                                        v
                                    };
                                    match value {
                                        Ok(v) => {
                                            self.define_symbol(&qualified, v, DefMode::Assign, pos.line, &pos, &mut defined_this_pass, &mut any_changed, final_pass)?;
                                        }
                                        Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax(e))?; }
                                    }
                                }
                            }
                        }
                        Ok(Some(Directive::MacroBegin { name, params })) => {
                            capturing = Some((name, params, Vec::new()));
                        }
                        Ok(Some(Directive::MacroEnd)) => {
                            self.diagnostics.report(pos.clone(), 1, AsmError::syntax("ENDMAC/ENDM with no matching MACRO"))?;
                        }
                        Ok(Some(other)) => {
                            if let Some(raw_label) = &split.label {
                                self.handle_label_def(raw_label, in_bss, bss_pointer, pc, pos.line, &pos, &mut defined_this_pass, &mut any_changed, final_pass)?;
                            }
                            self.apply_directive(
                                other, &pos, &raw, &mut pc, &mut bss_pointer, &mut in_bss, &mut load_mode,
                                &mut base_page, &mut module_start, final_pass, &mut source,
                            )?;
                        }
                        Ok(None) => {
                            if let Some(raw_label) = &split.label {
                                self.handle_label_def(raw_label, in_bss, bss_pointer, pc, pos.line, &pos, &mut defined_this_pass, &mut any_changed, final_pass)?;
                            }
                            self.encode_and_emit(op_text, &split.operand, &pos, &raw, &mut pc, occurrence, final_pass, &mut any_changed)?;
                            occurrence += 1;
                        }
                    }
                }
            }

            if final_pass && self.config.write_preprocessed && emit_preprocessed {
                self.preprocessed.push(raw);
            }
        }

        Ok(any_changed)
    }

    fn handle_conditional(&mut self, kind: CondKeyword, operand: &str, pass_no: u32, pos: &Pos, pc: i32) -> Result<(), AsmError> {
        match kind {
            CondKeyword::If => {
                let skipping = self.conditionals.is_skipping();
                let condition = if skipping {
                    false
                } else {
                    let text = self.qualify_locals_in_expr(operand);
                    let mut ctx = EvalContext::new(&mut self.symtab, pc);
                    match expr::eval(&text, &mut ctx) {
                        Ok(v) => v != 0 && !expr::is_undefined(v),
                        Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax(e))?; false }
                    }
                };
                self.conditionals.push_if(condition).map_err(AsmError::semantic)?;
            }
            CondKeyword::IfDef | CondKeyword::IfNDef => {
                let skipping = self.conditionals.is_skipping();
                let defined = if skipping {
                    false
                } else {
                    let name = self.qualify_label(operand.trim());
                    self.symtab.lookup(&name).map(|id| self.symtab.get(id).is_defined()).unwrap_or(false)
                };
                let condition = if matches!(kind, CondKeyword::IfNDef) { !defined } else { defined };
                self.conditionals.push_if(condition).map_err(AsmError::semantic)?;
            }
            CondKeyword::Else => {
                self.conditionals.do_else().map_err(AsmError::semantic)?;
            }
            CondKeyword::Endif => {
                self.conditionals.do_endif().map_err(AsmError::semantic)?;
            }
            CondKeyword::Error => {
                if self.conditionals.should_fire_error(pass_no) {
                    self.diagnostics.report(pos.clone(), 1, AsmError::user(operand.to_string()))?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_directive(
        &mut self,
        directive: Directive,
        pos: &Pos,
        raw: &str,
        pc: &mut Option<i32>,
        bss_pointer: &mut i32,
        in_bss: &mut bool,
        load_mode: &mut bool,
        base_page: &mut u8,
        module_start: &mut Vec<i32>,
        final_pass: bool,
        source: &mut SourceStack,
    ) -> Result<(), AsmError> {
        match directive {
            Directive::Assign(_) | Directive::MacroBegin { .. } | Directive::MacroEnd => unreachable!("handled by caller"),
            Directive::SetPc(text) => {
                let text = self.qualify_locals_in_expr(&text);
                match self.eval_now(&text, pc.unwrap_or(0), pos, final_pass)? {
                    Some(v) => { *pc = Some(v); *in_bss = false; }
                    None => {}
                }
            }
            Directive::SetBss(text) => {
                let text = self.qualify_locals_in_expr(&text);
                if let Some(v) = self.eval_now(&text, pc.unwrap_or(0), pos, final_pass)? {
                    *bss_pointer = v;
                    *in_bss = true;
                }
            }
            Directive::Load(_) => { *load_mode = true; }
            Directive::Store { start, length, path } => {
                let start_t = self.qualify_locals_in_expr(&start);
                let len_t = self.qualify_locals_in_expr(&length);
                let s = self.eval_now(&start_t, pc.unwrap_or(0), pos, final_pass)?;
                let l = self.eval_now(&len_t, pc.unwrap_or(0), pos, final_pass)?;
                if final_pass {
                    if let (Some(s), Some(l)) = (s, l) {
                        if l <= 0 {
                            self.diagnostics.report(pos.clone(), 1, AsmError::range(".STORE length must be positive"))?;
                        } else {
                            let end = s + l - 1;
                            if !(0..=0xFFFF).contains(&s) || !(0..=0xFFFF).contains(&end) {
                                self.diagnostics.report(pos.clone(), 1, AsmError::range(".STORE range out of bounds"))?;
                            } else {
                                let store = StoreDirective {
                                    start: s as u16,
                                    end: end as u16,
                                    path,
                                    load_prefix: if *load_mode { Some(s as u16) } else { None },
                                };
                                if let Err(e) = self.image.add_store(store) {
                                    self.diagnostics.report(pos.clone(), 1, AsmError::resource(e))?;
                                }
                            }
                        }
                    }
                }
            }
            Directive::Byte(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    bytes.extend(self.encode_byte_item(item, pc.unwrap_or(0), pos, final_pass)?);
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Word(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    let text = self.qualify_locals_in_expr(item);
                    let v = self.eval_now(&text, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0);
                    bytes.push((v & 0xFF) as u8);
                    bytes.push(((v >> 8) & 0xFF) as u8);
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::BigWord(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    let text = self.qualify_locals_in_expr(item);
                    let v = self.eval_now(&text, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0);
                    bytes.push(((v >> 8) & 0xFF) as u8);
                    bytes.push((v & 0xFF) as u8);
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Hex4(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    let text = self.qualify_locals_in_expr(item);
                    let v = self.eval_now(&text, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0);
                    bytes.extend(format!("{:04X}", (v as u32) & 0xFFFF).into_bytes());
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Dec4(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    let text = self.qualify_locals_in_expr(item);
                    let v = self.eval_now(&text, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0);
                    bytes.extend(format!("{:04}", v.rem_euclid(10000)).into_bytes());
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Quad(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    let text = self.qualify_locals_in_expr(item);
                    let v = self.eval_now(&text, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0);
                    bytes.push((v & 0xFF) as u8);
                    bytes.push(((v >> 8) & 0xFF) as u8);
                    bytes.push(((v >> 16) & 0xFF) as u8);
                    bytes.push(((v >> 24) & 0xFF) as u8);
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Real(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    match item.trim().parse::<f64>() {
                        Ok(f) => match encode_float(f, false) {
                            Ok(b) => bytes.extend(b),
                            Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::range(e))?; }
                        },
                        Err(_) => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax(format!("not a floating-point literal: {item}")))?; }
                    }
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Real4(items) => {
                let mut bytes = Vec::new();
                for item in &items {
                    match item.trim().parse::<f64>() {
                        Ok(f) => match encode_float(f, true) {
                            Ok(b) => bytes.extend(b),
                            Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::range(e))?; }
                        },
                        Err(_) => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax(format!("not a floating-point literal: {item}")))?; }
                    }
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Fill(count_text, value_text) => {
                let count_q = self.qualify_locals_in_expr(&count_text);
                let count = self.eval_now(&count_q, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0);
                if count < 0 || count as usize > crate::image::ADDRESS_SPACE {
                    self.diagnostics.report(pos.clone(), 1, AsmError::range(".FILL count out of range"))?;
                } else {
                    let byte = match value_text {
                        Some(t) => {
                            let q = self.qualify_locals_in_expr(&t);
                            (self.eval_now(&q, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0) & 0xFF) as u8
                        }
                        None => self.config.fill_byte,
                    };
                    let bytes = vec![byte; count as usize];
                    self.emit_data(&bytes, pc, pos, raw, final_pass)?;
                }
            }
            Directive::Bss(text) => {
                let q = self.qualify_locals_in_expr(&text);
                let n = self.eval_now(&q, pc.unwrap_or(0), pos, final_pass)?.unwrap_or(0);
                if n < 0 {
                    self.diagnostics.report(pos.clone(), 1, AsmError::range(".BSS size must not be negative"))?;
                } else {
                    *bss_pointer += n;
                }
            }
            Directive::Bits { glyphs, msb_first } => {
                let mut bytes = Vec::new();
                for g in &glyphs {
                    match charset::pack_bits(g.trim(), msb_first) {
                        Ok(b) => bytes.push(b),
                        Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax(e))?; }
                    }
                }
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Text { text, encoding } => {
                let unescaped = unescape(&text);
                let bytes = charset::encode_str(&unescaped, encoding);
                self.emit_data(&bytes, pc, pos, raw, final_pass)?;
            }
            Directive::Cpu(name) => {
                match Cpu::from_name(&name) {
                    Some(cpu) => { self.cpu = cpu; self.set = InstructionSet::for_cpu(cpu); }
                    None => { self.diagnostics.report(pos.clone(), 1, AsmError::semantic(format!("unknown CPU: {name}")))?; }
                }
            }
            Directive::Case(enabled) => {
                self.config.case_sensitive = enabled;
                self.symtab.set_case_sensitive(enabled);
            }
            Directive::Base(text) => {
                let q = self.qualify_locals_in_expr(&text);
                if let Some(v) = self.eval_now(&q, pc.unwrap_or(0), pos, final_pass)? {
                    if !(0..=0xFF).contains(&v) {
                        self.diagnostics.report(pos.clone(), 1, AsmError::range(".BASE must be 0-255"))?;
                    } else {
                        *base_page = v as u8;
                    }
                }
            }
            Directive::Include(path) => {
                let resolved = self.config.source.parent()
                    .map(|dir| dir.join(&path))
                    .unwrap_or_else(|| Path::new(&path).to_path_buf());
                if let Err(e) = source.push_file(&resolved) {
                    return self.diagnostics.report(pos.clone(), 1, e);
                }
            }
            Directive::Size(_) => {
                let size = pc.unwrap_or(0) - module_start.last().copied().unwrap_or(0);
                if final_pass {
                    self.listing_lines.push(format!("               ; size = {size}"));
                }
            }
            Directive::End => {
                source.halt_current();
            }
            Directive::Module(name) => {
                self.scope.push(name.trim());
                module_start.push(pc.unwrap_or(0));
            }
            Directive::EndModule => {
                if self.scope.pop().is_err() {
                    self.diagnostics.report(pos.clone(), 1, AsmError::semantic("ENDMOD with no matching MODULE"))?;
                }
                module_start.pop();
            }
            Directive::Skip | Directive::Page | Directive::Name(_) | Directive::SubTitle(_) => {}
        }
        Ok(())
    }

    /// Evaluates `text`, recording references on the final pass and
    /// turning an evaluation error into a reported diagnostic rather than
    /// an early return, so the caller can keep going with a sentinel.
    fn eval_now(&mut self, text: &str, pc: i32, pos: &Pos, final_pass: bool) -> Result<Option<i32>, AsmError> {
        let mut ctx = EvalContext::new(&mut self.symtab, pc);
        let result = expr::eval(text, &mut ctx);
        let refs = std::mem::take(&mut ctx.refs);
        if final_pass {
            for r in refs {
                self.symtab.add_reference(&r.name, pos.line, RefTag::Def);
            }
        }
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) => { self.diagnostics.report(pos.clone(), 1, AsmError::syntax(e))?; Ok(None) }
        }
    }

    fn emit_data(&mut self, bytes: &[u8], pc: &mut Option<i32>, pos: &Pos, raw: &str, final_pass: bool) -> Result<(), AsmError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let Some(addr) = *pc else {
            return self.diagnostics.report(pos.clone(), 1, AsmError::semantic("data directive before program counter is set"));
        };
        if let Err(e) = self.image.write(addr, bytes) {
            self.diagnostics.report(pos.clone(), 1, AsmError::range(e))?;
        } else if final_pass {
            self.listing_lines.push(listing::format_line(
                &ListingLine { line_no: pos.line, addr: addr as u16, bytes, source: raw },
                self.config.line_numbers,
            ));
        }
        let new_pc = addr + bytes.len() as i32;
        if new_pc > 0xFFFF {
            self.diagnostics.report(pos.clone(), 1, AsmError::range("program counter overflowed $FFFF"))?;
        }
        *pc = Some(new_pc);
        Ok(())
    }

    fn encode_byte_item(&mut self, item: &str, pc: i32, pos: &Pos, final_pass: bool) -> Result<Vec<u8>, AsmError> {
        let trimmed = item.trim();
        let (prefix, quoted) = match trimmed.as_bytes().first() {
            Some(b'<') | Some(b'>') | Some(b'#') if trimmed.len() > 1 && trimmed.as_bytes()[1] == b'"' => {
                (Some(trimmed.as_bytes()[0] as char), &trimmed[1..])
            }
            _ => (None, trimmed),
        };
        if quoted.len() >= 2 && quoted.starts_with('"') && quoted.ends_with('"') {
            let inner = unescape(&quoted[1..quoted.len() - 1]);
            let encoded = charset::encode_str(&inner, Encoding::Ascii);
            return Ok(match prefix {
                Some('<') => vec![*encoded.first().unwrap_or(&0)],
                Some('>') => vec![0],
                Some('#') => {
                    let mut v = encoded;
                    v.resize(3, 0);
                    v.truncate(3);
                    v
                }
                _ => encoded,
            });
        }
        let (body, force_high_bit) = if let Some(stripped) = trimmed.strip_suffix('^') {
            (stripped, true)
        } else if let Some(stripped) = trimmed.strip_suffix("+$80") {
            (stripped, true)
        } else {
            (trimmed, false)
        };
        let text = self.qualify_locals_in_expr(body);
        let value = self.eval_now(&text, pc, pos, final_pass)?.unwrap_or(0);
        let mut byte = (value & 0xFF) as u8;
        if force_high_bit {
            byte |= 0x80;
        }
        Ok(vec![byte])
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_and_emit(
        &mut self,
        mnemonic: &str,
        operand: &str,
        pos: &Pos,
        raw: &str,
        pc: &mut Option<i32>,
        occurrence: u32,
        final_pass: bool,
        any_changed: &mut bool,
    ) -> Result<(), AsmError> {
        let Some(addr) = *pc else {
            return self.diagnostics.report(pos.clone(), 1, AsmError::semantic("instruction before program counter is set"));
        };
        let operand = operand.trim();
        let (force_16bit, operand) = match operand.strip_prefix('`') {
            Some(rest) => (true, rest),
            None => (false, operand),
        };
        let operand_q = self.qualify_locals_in_expr(operand);

        let mut history = self.encode_history.get(&occurrence).copied().unwrap_or_default();
        let anon_back = (self.anon_seq > 0).then(|| format!("@anon@{}", self.anon_seq - 1));
        let anon_fwd = Some(format!("@anon@{}", self.anon_seq));
        let outcome = {
            let mut ctx = EvalContext::new(&mut self.symtab, addr);
            ctx.anon_back = anon_back;
            ctx.anon_fwd = anon_fwd;
            let result = encode::encode_instruction(
                &self.set, mnemonic, &operand_q, force_16bit, self.config.branch_optimization,
                addr, &mut ctx, &mut history,
            );
            let refs = std::mem::take(&mut ctx.refs);
            (result, refs)
        };
        let (result, refs) = outcome;
        self.encode_history.insert(occurrence, history);

        match result {
            Ok(out) => {
                if final_pass {
                    for r in refs {
                        self.symtab.add_reference(&r.name, pos.line, RefTag::Mode(out.mode));
                    }
                }
                if out.widened {
                    *any_changed = true;
                }
                if let Err(e) = self.image.write(addr, &out.bytes) {
                    self.diagnostics.report(pos.clone(), 1, AsmError::range(e))?;
                } else if final_pass {
                    self.listing_lines.push(listing::format_line(
                        &ListingLine { line_no: pos.line, addr: addr as u16, bytes: &out.bytes, source: raw },
                        self.config.line_numbers,
                    ));
                }
                let new_pc = addr + out.bytes.len() as i32;
                if new_pc > 0xFFFF {
                    self.diagnostics.report(pos.clone(), 1, AsmError::range("program counter overflowed $FFFF"))?;
                }
                *pc = Some(new_pc);
            }
            Err(e) => {
                self.diagnostics.report(pos.clone(), 1, AsmError::semantic(e))?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum CondKeyword { If, IfDef, IfNDef, Else, Endif, Error }

fn cond_keyword(op: &str) -> Option<CondKeyword> {
    match op.to_ascii_uppercase().as_str() {
        "#IF" => Some(CondKeyword::If),
        "#IFDEF" => Some(CondKeyword::IfDef),
        "#IFNDEF" => Some(CondKeyword::IfNDef),
        "#ELSE" => Some(CondKeyword::Else),
        "#ENDIF" => Some(CondKeyword::Endif),
        "#ERROR" => Some(CondKeyword::Error),
        _ => None,
    }
}

/// Recognizes a macro invocation in any of the three shapes the
/// whitespace-based `line.rs` splitter can hand back for `NAME(args)` with
/// no internal whitespace (spec §4.6's worked example, `LDXY($C000)`):
/// a normal `label? op(args)` split, the no-label `op(args)` split, or the
/// whole call landing in `label` when it starts in column 1.
fn classify_macro_call(split: &SplitLine, macros: &MacroTable) -> Option<(Option<String>, String, String)> {
    if let Some(op) = &split.op {
        if macros.is_defined(op) {
            return Some((split.label.clone(), op.clone(), split.operand.clone()));
        }
        if split.operand.is_empty() {
            if let Some((name, args)) = split_paren_call(op) {
                if macros.is_defined(&name) {
                    return Some((split.label.clone(), name, args));
                }
            }
        }
    } else if let Some(label) = &split.label {
        if let Some((name, args)) = split_paren_call(label) {
            if macros.is_defined(&name) {
                return Some((None, name, args));
            }
        }
    }
    None
}

fn split_paren_call(token: &str) -> Option<(String, String)> {
    let open = token.find('(')?;
    if !token.ends_with(')') {
        return None;
    }
    Some((token[..open].to_string(), token[open + 1..token.len() - 1].to_string()))
}

fn is_bso_local(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() > 1 && b[b.len() - 1] == b'$' && b[..b.len() - 1].iter().all(u8::is_ascii_digit)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$'
}

/// `\r \n \a \e \0` escapes inside `.BYTE`/`.PET`/`.DISP` string literals
/// (spec §4.5's Edge Cases).
fn unescape(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('a') => out.push('\u{07}'),
            Some('e') => out.push('\u{1B}'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Commodore 5-/4-byte floating point (MFLPT5/MFLPT4): one exponent byte
/// biased by 128, followed by a sign bit packed into the top bit of the
/// mantissa field (spec §4.5). Values are normalized so the mantissa lies
/// in [0.5, 1), then the mantissa's leading implicit bit is dropped and the
/// remainder rounded to the field width, with carry propagating into the
/// exponent on overflow.
fn encode_float(value: f64, four_byte: bool) -> Result<Vec<u8>, String> {
    let mantissa_bytes = if four_byte { 3 } else { 4 };
    let total_len = mantissa_bytes + 1;
    if value == 0.0 {
        return Ok(vec![0u8; total_len]);
    }
    let sign = value.is_sign_negative();
    let mut v = value.abs();
    let mut exp: i32 = 0;
    while v >= 1.0 { v /= 2.0; exp += 1; }
    while v < 0.5 { v *= 2.0; exp -= 1; }

    let mantissa_bits = mantissa_bytes * 8 - 1;
    let scale = (1u64 << mantissa_bits) as f64;
    let mut mantissa = ((v * 2.0 - 1.0) * scale).round() as u64;
    if mantissa >= (1u64 << mantissa_bits) {
        mantissa = 0;
        exp += 1;
    }

    let exponent_byte = exp + 128;
    if !(0..=255).contains(&exponent_byte) {
        return Err(format!("floating-point value out of range: {value}"));
    }

    let combined = mantissa | ((sign as u64) << mantissa_bits);
    let mut bytes = vec![exponent_byte as u8];
    for i in 0..mantissa_bytes {
        let shift = 8 * (mantissa_bytes - 1 - i);
        bytes.push(((combined >> shift) & 0xFF) as u8);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn run_source(src: &str) -> Assembler {
        let dir = std::env::temp_dir().join(format!("asm65-pass-test-{}-{}", std::process::id(), src.len()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("main.asm");
        std::fs::File::create(&path).unwrap().write_all(src.as_bytes()).unwrap();
        let cli = crate::cli::Cli {
            source: path, list: None, delist: false, debug: false, define: vec![],
            ignore_case: false, line_numbers: false, write_preprocessed: false, branch_optimization: true,
        };
        let config = Config::from_args(cli).unwrap();
        let mut asm = Assembler::new(config);
        asm.run().unwrap();
        asm
    }

    #[test]
    fn simple_program_assembles() {
        let asm = run_source("*=$1000\nLDA #$01\nSTA $D020\nRTS\n");
        assert_eq!(asm.image().byte_at(0x1000), 0xA9);
        assert_eq!(asm.image().byte_at(0x1001), 0x01);
        assert_eq!(asm.image().byte_at(0x1002), 0x8D);
        assert_eq!(asm.image().byte_at(0x1003), 0x20);
        assert_eq!(asm.image().byte_at(0x1004), 0xD0);
        assert_eq!(asm.image().byte_at(0x1005), 0x60);
    }

    #[test]
    fn forward_reference_converges() {
        let asm = run_source("*=$1000\nJMP THERE\nTHERE RTS\n");
        assert_eq!(asm.image().byte_at(0x1000), 0x4C);
        assert_eq!(asm.image().byte_at(0x1001), 0x03);
        assert_eq!(asm.image().byte_at(0x1002), 0x10);
        assert_eq!(asm.image().byte_at(0x1003), 0x60);
    }

    #[test]
    fn macro_paren_call_expands_with_no_internal_whitespace() {
        let asm = run_source("MAC MACRO LDXY(W)\nLDX W\nLDY W+1\nENDMAC\n*=$1000\nLDXY($C000)\n");
        assert_eq!(asm.image().byte_at(0x1000), 0xAE);
        assert_eq!(asm.image().byte_at(0x1001), 0x00);
        assert_eq!(asm.image().byte_at(0x1002), 0xC0);
        assert_eq!(asm.image().byte_at(0x1003), 0xAC);
        assert_eq!(asm.image().byte_at(0x1004), 0x01);
        assert_eq!(asm.image().byte_at(0x1005), 0xC0);
    }

    #[test]
    fn byte_directive_emits_string_and_ints() {
        let asm = run_source("*=$2000\n.BYTE \"AB\", $10\n");
        assert_eq!(asm.image().byte_at(0x2000), b'A');
        assert_eq!(asm.image().byte_at(0x2001), b'B');
        assert_eq!(asm.image().byte_at(0x2002), 0x10);
    }

    #[test]
    fn conditional_assembly_skips_false_branch() {
        let asm = run_source("*=$3000\n#IF 0\nLDA #$01\n#ELSE\nLDA #$02\n#ENDIF\n");
        assert_eq!(asm.image().byte_at(0x3000), 0xA9);
        assert_eq!(asm.image().byte_at(0x3001), 0x02);
    }

    #[test]
    fn duplicate_label_in_same_pass_is_fatal() {
        let dir = std::env::temp_dir().join(format!("asm65-pass-test-dup-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("main.asm");
        std::fs::File::create(&path).unwrap().write_all(b"*=$1000\nFOO RTS\nFOO RTS\n").unwrap();
        let cli = crate::cli::Cli {
            source: path, list: None, delist: false, debug: false, define: vec![],
            ignore_case: false, line_numbers: false, write_preprocessed: false, branch_optimization: true,
        };
        let config = Config::from_args(cli).unwrap();
        let mut asm = Assembler::new(config);
        assert!(asm.run().is_err());
    }

    #[test]
    fn encode_float_zero_is_all_zero_bytes() {
        assert_eq!(encode_float(0.0, false).unwrap(), vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn encode_float_one_has_exponent_129() {
        let bytes = encode_float(1.0, false).unwrap();
        assert_eq!(bytes[0], 129);
        assert_eq!(bytes[1] & 0x80, 0);
    }

    #[test]
    fn encode_float_negative_sets_sign_bit() {
        let bytes = encode_float(-1.0, false).unwrap();
        assert_eq!(bytes[1] & 0x80, 0x80);
    }
}
