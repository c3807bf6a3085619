//! TNT code generation backend.
//!
//! Machine-level lowering and encoding for the 16-bit TNT architecture.
//! The crate takes register-allocated machine functions, lays out their
//! stack frames, relaxes out-of-range branches and encodes the result into
//! 8-byte instruction words with relocation fixups.
//!
//! # Primary Usage
//!
//! ```ignore
//! use tnt_codegen::core::CodegenSession;
//! use tnt_codegen::tnt::{CodegenPipeline, TargetOptions, TntTarget};
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CodegenSession::new(&arena);
//! let target = TntTarget::new(TargetOptions::default());
//!
//! let encoded = CodegenPipeline::new(&target, &session).run(&mut func)?;
//! for reloc in encoded.relocations()? {
//!     println!("{:#x} {} {}", reloc.offset, reloc.symbol, reloc.r_type);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Machine IR, frame descriptor, session and errors
//! - [`tnt`] - The TNT target: registers, frame lowering, branch relaxation, encoder
//! - [`mir_text`] - Textual machine IR used by tests and the `tntc` driver

pub mod core;
pub mod mir_text;
pub mod tnt;

pub use core::{
    BlockId, CodegenError, CodegenResult, CodegenSession, MachineFunction, MachineInstr,
    SessionStats,
};
pub use mir_text::{parse_module, ParseError};
pub use tnt::{CodegenPipeline, EncodedFunction, TargetOptions, TntTarget};
