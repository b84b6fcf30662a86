// Runtime configuration.
//
// Grounded on spec §6 (External interfaces / CLI flags) and §9's
// redesign note to thread one consolidated value through the assembler
// rather than passing flags individually. `Config::from_args` also
// applies the `.src`-extension BSO-compatibility defaults (target CPU
// 45GS02, case-insensitive, branch optimization on, ROM fill byte 0xFF,
// octal `@` prefix enabled) before any source line is read.

use std::path::PathBuf;

use crate::cli::Cli;
use crate::cpu::Cpu;

pub const DEFAULT_ERR_MAX: usize = 10;
pub const MAX_PASSES: u32 = 20;

pub struct Config {
    pub source:             PathBuf,
    pub list_path:          PathBuf,
    pub delist:             bool,
    pub debug:              bool,
    pub defines:            Vec<(String, i32)>,
    pub case_sensitive:     bool,
    pub line_numbers:       bool,
    pub write_preprocessed: bool,
    pub branch_optimization: bool,
    pub err_max:            usize,
    pub default_cpu:        Cpu,
    pub fill_byte:          u8,
    pub octal_at_prefix:    bool,
}

impl Config {
    pub fn from_args(args: Cli) -> Result<Config, String> {
        let bso_mode = args.source.extension().and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("src"))
            .unwrap_or(false);

        let mut defines = Vec::new();
        for raw in &args.define {
            defines.push(parse_define(raw)?);
        }

        let list_path = args.list.clone().unwrap_or_else(|| args.source.with_extension("lst"));

        Ok(Config {
            source:             args.source,
            list_path,
            delist:             args.delist,
            debug:              args.debug,
            defines,
            case_sensitive:     !(args.ignore_case || bso_mode),
            line_numbers:       args.line_numbers,
            write_preprocessed: args.write_preprocessed,
            branch_optimization: args.branch_optimization || bso_mode,
            err_max:            DEFAULT_ERR_MAX,
            default_cpu:        if bso_mode { Cpu::Csg45Gs02 } else { Cpu::Mos6502 },
            fill_byte:          if bso_mode { 0xFF } else { 0x00 },
            octal_at_prefix:    bso_mode,
        })
    }
}

/// `-D NAME` or `-D NAME=VALUE`; a bare name defines it as `1` (the
/// conventional truthy value for presence-only locked symbols).
fn parse_define(raw: &str) -> Result<(String, i32), String> {
    match raw.split_once('=') {
        None => Ok((raw.to_string(), 1)),
        Some((name, value)) => {
            let value = if let Some(hex) = value.strip_prefix('$') {
                i32::from_str_radix(hex, 16).map_err(|e| format!("-D {raw}: {e}"))?
            } else {
                value.parse::<i32>().map_err(|e| format!("-D {raw}: {e}"))?
            };
            Ok((name.to_string(), value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_define_defaults_to_one() {
        assert_eq!(parse_define("DEBUG").unwrap(), ("DEBUG".to_string(), 1));
    }

    #[test]
    fn parses_decimal_define() {
        assert_eq!(parse_define("VERSION=3").unwrap(), ("VERSION".to_string(), 3));
    }

    #[test]
    fn parses_hex_define() {
        assert_eq!(parse_define("BASE=$C000").unwrap(), ("BASE".to_string(), 0xC000));
    }

    fn base_cli(source: &str) -> Cli {
        Cli {
            source: PathBuf::from(source),
            list: None,
            delist: false,
            debug: false,
            define: vec![],
            ignore_case: false,
            line_numbers: false,
            write_preprocessed: false,
            branch_optimization: false,
        }
    }

    #[test]
    fn src_extension_triggers_bso_defaults() {
        let cfg = Config::from_args(base_cli("prog.src")).unwrap();
        assert!(!cfg.case_sensitive);
        assert!(cfg.branch_optimization);
        assert_eq!(cfg.fill_byte, 0xFF);
        assert_eq!(cfg.default_cpu, Cpu::Csg45Gs02);
    }

    #[test]
    fn asm_extension_is_case_sensitive_and_6502_default() {
        let cfg = Config::from_args(base_cli("prog.asm")).unwrap();
        assert!(cfg.case_sensitive);
        assert_eq!(cfg.default_cpu, Cpu::Mos6502);
    }

    #[test]
    fn list_path_defaults_from_source() {
        let cfg = Config::from_args(base_cli("prog.asm")).unwrap();
        assert_eq!(cfg.list_path, PathBuf::from("prog.lst"));
    }
}
