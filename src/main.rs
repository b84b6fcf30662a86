// Process entry point: parse CLI flags, run the assembler, write its
// outputs, and translate diagnostics into an exit code.
//
// Grounded on the teacher's `aex::compiler`-drives-`aex::context` wiring in
// spirit (one top-level driver building a config, handing it to the
// compiler, and reporting accumulated messages) but using `anyhow` for the
// top-level `Result` instead of the teacher's hand-rolled error enum at
// this outermost layer, matching the ambient stack in `examples/other_examples`
// manifests (see DESIGN.md).

mod binout;
mod charset;
mod cli;
mod conditional;
mod config;
mod cpu;
mod directive;
mod encode;
mod error;
mod expr;
mod exprlex;
mod image;
mod line;
mod listing;
mod macros;
mod modscope;
mod operand;
mod pass;
mod pos;
mod source;
mod symtab;
mod xref;

use std::fs;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use crate::cli::Cli;
use crate::config::Config;
use crate::pass::Assembler;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` on a clean assembly, `Ok(false)` when assembly ran to
/// completion but accumulated reportable errors (spec §7), and `Err` for a
/// failure in the surrounding process (bad flags, unwritable outputs).
fn run(cli: Cli) -> anyhow::Result<bool> {
    let debug = cli.debug;
    let source_path = cli.source.clone();
    let config = Config::from_args(cli).map_err(anyhow::Error::msg)?;
    let list_path = config.list_path.clone();
    let delist = config.delist;
    let write_preprocessed = config.write_preprocessed;

    info!("assembling {}", source_path.display());
    let mut asm = Assembler::new(config);
    let run_result = asm.run();

    for diag in asm.diagnostics().iter() {
        eprintln!("{diag}");
    }

    if debug {
        let debug_path = source_path.with_file_name("Debug.lst");
        fs::write(&debug_path, asm.listing_text())
            .with_context(|| format!("writing {}", debug_path.display()))?;
    }

    if write_preprocessed {
        let pp_path = source_path.with_extension("pp");
        fs::write(&pp_path, asm.preprocessed_text())
            .with_context(|| format!("writing {}", pp_path.display()))?;
    }

    if let Err(e) = run_result {
        error!("{e}");
        return Ok(false);
    }

    if !delist {
        fs::write(&list_path, asm.listing_text())
            .with_context(|| format!("writing {}", list_path.display()))?;
    }

    let base_dir = source_path.parent().filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    binout::write_stores(asm.image(), base_dir)
        .with_context(|| "writing .STORE output files".to_string())?;

    Ok(!asm.diagnostics().has_errors())
}
