//! TNT code generator driver.
//!
//! Reads textual machine IR, runs the TNT pipeline on every function and
//! prints the encoded instruction words with their fixups.

use bumpalo::Bump;
use clap::Parser;
use object::Endianness;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tnt_codegen::core::CodegenSession;
use tnt_codegen::mir_text::parse_module;
use tnt_codegen::tnt::{elf_reloc_type, CodegenPipeline, FixupTarget, TargetOptions, TntTarget};

#[derive(Parser)]
#[command(name = "tntc")]
#[command(about = "TNT machine code generator")]
#[command(version)]
struct Cli {
    /// Textual machine IR to compile (stdin when omitted)
    input: Option<PathBuf>,

    /// Emit a big-endian instruction stream
    #[arg(long)]
    big_endian: bool,

    /// Keep a frame pointer in every function
    #[arg(long)]
    disable_fp_elim: bool,

    /// Print each function after lowering and relaxation
    #[arg(long)]
    print_mir: bool,

    /// Print code generation statistics to stderr
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let text = match &cli.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let options = TargetOptions {
        endianness: if cli.big_endian {
            Endianness::Big
        } else {
            Endianness::Little
        },
        disable_frame_pointer_elim: cli.disable_fp_elim,
        ..TargetOptions::default()
    };
    let target = TntTarget::new(options);
    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let pipeline = CodegenPipeline::new(&target, &session);

    let mut funcs = match parse_module(&text, &session) {
        Ok(funcs) => funcs,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    for func in &mut funcs {
        let encoded = match pipeline.run(func) {
            Ok(encoded) => encoded,
            Err(e) => {
                eprintln!("Error in {}: {e}", func.name);
                std::process::exit(1);
            }
        };

        if cli.print_mir {
            println!("{func}");
        }

        println!("{}: {} bytes", encoded.name, encoded.bytes.len());
        for (id, offset) in &encoded.block_offsets {
            let name = func.block(*id).map(|b| b.name.as_str()).unwrap_or("?");
            println!("  {name} @ {offset:#06x}");
        }
        for (n, word) in encoded.bytes.chunks(8).enumerate() {
            let hex: Vec<String> = word.iter().map(|b| format!("{b:02x}")).collect();
            println!("  {:06x}: {}", n * 8, hex.join(" "));
        }
        for fixup in &encoded.fixups {
            match fixup.target {
                FixupTarget::Symbol(_) => println!(
                    "  fixup {:#06x} {} {} r_type={}",
                    fixup.offset,
                    fixup.kind,
                    fixup.target,
                    elf_reloc_type(fixup.kind, fixup.pc_relative)?
                ),
                FixupTarget::Block(id) => println!(
                    "  fixup {:#06x} {} ^{}",
                    fixup.offset,
                    fixup.kind,
                    func.block(id).map(|b| b.name.as_str()).unwrap_or("?")
                ),
            }
        }
    }

    if cli.stats {
        eprintln!("{}", session.stats());
    }
    Ok(())
}
