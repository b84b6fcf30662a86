// Command-line interface.
//
// Mirrors spec §6's flag table field-for-field via `clap`'s derive API,
// the idiom the example pack's manifests reach for (rather than a
// hand-rolled `std::env::args()` loop).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "asm65", about = "Cross-assembler for the 6502/65C02/45GS02/65816 CPU family")]
pub struct Cli {
    /// Source file to assemble (or, with -x, a listing file to re-assemble).
    pub source: PathBuf,

    /// Listing output file (defaults to the source file's name with a
    /// `.lst` extension when omitted).
    pub list: Option<PathBuf>,

    /// Strip leading hex-listing columns from input (assembles a
    /// previously produced listing).
    #[arg(short = 'x')]
    pub delist: bool,

    /// Write a Debug.lst trace of parser/evaluator/symbol-table decisions.
    #[arg(short = 'd')]
    pub debug: bool,

    /// Define a locked symbol from the command line: NAME or NAME=VALUE.
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    pub define: Vec<String>,

    /// Ignore case in symbols.
    #[arg(short = 'i')]
    pub ignore_case: bool,

    /// Include line numbers in the listing.
    #[arg(short = 'n')]
    pub line_numbers: bool,

    /// Write preprocessed source (`file.pp`) after macro expansion and
    /// conditional trimming.
    #[arg(short = 'p')]
    pub write_preprocessed: bool,

    /// Enable branch optimization (short-to-long promotion on 45GS02).
    #[arg(short = 'b')]
    pub branch_optimization: bool,
}
