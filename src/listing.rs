// Listing file writer.
//
// Grounded on spec §6's listing format: `[LINE] ADDR BYTES SOURCE`, each
// field fixed-width so columns line up regardless of how many bytes a
// given instruction emitted, followed by the address-sorted symbol table
// and the two reference-count tables `xref.rs` builds.

use std::fmt::Write as _;

use crate::symtab::SymbolInfo;

const LINE_WIDTH: usize = 6;
const ADDR_WIDTH: usize = 4;
const BYTES_PER_ROW: usize = 3;

/// Width, in bytes, of the `[LINE] ADDR BYTES ` prefix `-x` strips back
/// off (spec §4.8's `(added)` note). `line_nums` toggles whether the
/// `[LINE]` field is present at all (`-n` suppresses line numbers).
pub fn source_prefix_width(line_nums: bool) -> usize {
    let line_field = if line_nums { LINE_WIDTH + 1 } else { 0 };
    line_field + ADDR_WIDTH + 1 + BYTES_PER_ROW * 2 + 1
}

pub struct ListingLine<'a> {
    pub line_no: u32,
    pub addr:    u16,
    pub bytes:   &'a [u8],
    pub source:  &'a str,
}

/// Formats one source line's listing row. When `bytes` is longer than
/// `BYTES_PER_ROW`, only the first row carries the line number and source
/// text; continuation rows repeat just the address/byte columns, matching
/// how fixed-column assemblers keep one physical source line to one
/// logical listing entry while still showing every emitted byte.
pub fn format_line(entry: &ListingLine, line_nums: bool) -> String {
    let mut out = String::new();
    let mut rows = entry.bytes.chunks(BYTES_PER_ROW);
    let first = rows.next().unwrap_or(&[]);
    write_row(&mut out, entry.line_no, entry.addr, first, entry.source, line_nums, true);
    let mut addr = entry.addr as u32 + first.len() as u32;
    for row in rows {
        out.push('\n');
        write_row(&mut out, entry.line_no, addr as u16, row, "", line_nums, false);
        addr += row.len() as u32;
    }
    out
}

fn write_row(out: &mut String, line_no: u32, addr: u16, bytes: &[u8], source: &str, line_nums: bool, first_row: bool) {
    if line_nums {
        if first_row {
            let _ = write!(out, "{line_no:>width$} ", width = LINE_WIDTH);
        } else {
            let _ = write!(out, "{:width$} ", "", width = LINE_WIDTH);
        }
    }
    let _ = write!(out, "{addr:0width$X} ", width = ADDR_WIDTH);
    for i in 0..BYTES_PER_ROW {
        match bytes.get(i) {
            Some(b) => { let _ = write!(out, "{b:02X}"); }
            None => out.push_str("  "),
        }
    }
    out.push(' ');
    out.push_str(source);
}

/// Address-sorted symbol table section (spec §6).
pub fn format_symbol_table(symbols: &[&SymbolInfo]) -> String {
    let mut sorted: Vec<&&SymbolInfo> = symbols.iter().collect();
    sorted.sort_by_key(|s| (s.address, s.name.clone()));
    let mut out = String::from("SYMBOL TABLE\n");
    for sym in sorted {
        let _ = writeln!(out, "{:04X}  {}", sym.address as u32 & 0xFFFF, sym.name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_row() {
        let entry = ListingLine { line_no: 10, addr: 0x1000, bytes: &[0xA9], source: "LDA #$01" };
        let s = format_line(&entry, true);
        assert_eq!(s, "    10 1000 A9     LDA #$01");
    }

    #[test]
    fn no_line_numbers_when_disabled() {
        let entry = ListingLine { line_no: 10, addr: 0x1000, bytes: &[0xA9], source: "LDA #$01" };
        let s = format_line(&entry, false);
        assert_eq!(s, "1000 A9     LDA #$01");
    }

    #[test]
    fn continuation_row_for_long_instruction() {
        let entry = ListingLine { line_no: 1, addr: 0x2000, bytes: &[1, 2, 3, 4], source: ".BYTE 1,2,3,4" };
        let s = format_line(&entry, true);
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("2003"));
    }

    #[test]
    fn prefix_width_matches_single_row_format() {
        let entry = ListingLine { line_no: 1, addr: 0x1000, bytes: &[1, 2, 3], source: "X" };
        let formatted = format_line(&entry, true);
        let width = source_prefix_width(true);
        assert_eq!(&formatted[width..], "X");
    }
}
