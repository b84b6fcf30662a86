// Cross-reference writer.
//
// Grounded on spec §6's two reference-count tables (zero-page symbols;
// symbols in the first 16 KiB) and §4.12. Shares no code with
// `listing.rs` beyond both consuming `&SymbolInfo` — spec §2 lists this
// as its own component with its own size share, so it stays a separate
// module rather than folding into the listing writer.

use std::fmt::Write as _;

use crate::expr::is_undefined;
use crate::symtab::SymbolInfo;

pub struct XrefEntry<'a> {
    pub name:       &'a str,
    pub address:    i32,
    pub ref_count:  usize,
}

pub fn zero_page_table<'a>(symbols: &'a [SymbolInfo]) -> Vec<XrefEntry<'a>> {
    filtered_table(symbols, |addr| (0..=0xFF).contains(&addr))
}

pub fn low_16k_table<'a>(symbols: &'a [SymbolInfo]) -> Vec<XrefEntry<'a>> {
    filtered_table(symbols, |addr| (0..0x4000).contains(&addr))
}

fn filtered_table<'a>(symbols: &'a [SymbolInfo], pred: impl Fn(i32) -> bool) -> Vec<XrefEntry<'a>> {
    let mut out: Vec<XrefEntry<'a>> = symbols.iter()
        .filter(|s| !is_undefined(s.address) && pred(s.address))
        .map(|s| XrefEntry { name: &s.name, address: s.address, ref_count: s.references.len() })
        .collect();
    out.sort_by_key(|e| e.address);
    out
}

pub fn format_table(title: &str, entries: &[XrefEntry]) -> String {
    let mut out = format!("{title}\n");
    for e in entries {
        let _ = writeln!(out, "{:04X}  {:<24} {} ref(s)", e.address as u32 & 0xFFFF, e.name, e.ref_count);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::{DefMode, SymbolTable};

    #[test]
    fn zero_page_table_filters_by_address() {
        let mut t = SymbolTable::new(true);
        t.define("ZP", 0x20, DefMode::Position, 1);
        t.define("HIGH", 0x2000, DefMode::Position, 1);
        let symbols: Vec<SymbolInfo> = t.iter().cloned().collect();
        let zp = zero_page_table(&symbols);
        assert_eq!(zp.len(), 1);
        assert_eq!(zp[0].name, "ZP");
    }

    #[test]
    fn low_16k_table_includes_zero_page_and_more() {
        let mut t = SymbolTable::new(true);
        t.define("ZP", 0x20, DefMode::Position, 1);
        t.define("MID", 0x3000, DefMode::Position, 1);
        t.define("HIGH", 0x8000, DefMode::Position, 1);
        let symbols: Vec<SymbolInfo> = t.iter().cloned().collect();
        let table = low_16k_table(&symbols);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn undefined_symbols_excluded() {
        let mut t = SymbolTable::new(true);
        t.address_of_or_register("UNSEEN");
        let symbols: Vec<SymbolInfo> = t.iter().cloned().collect();
        assert!(zero_page_table(&symbols).is_empty());
        assert!(low_16k_table(&symbols).is_empty());
    }
}
