// This module is the TNT target: a 16-bit architecture with 2-byte pointers, a 10-bit signed
// short branch displacement, selectable instruction-stream byte order and a sign-extended
// 64-bit immediate load. It groups the register file and register info, the opcode and
// condition code tables, construction-time options, frame lowering, branch relaxation, the
// instruction encoder with its fixups and relocation mapping, the TntTarget bundle that is
// passed explicitly to every component, and the per-function code generation pipeline.

//! TNT target backend.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use tnt_codegen::core::CodegenSession;
//! use tnt_codegen::mir_text::parse_module;
//! use tnt_codegen::tnt::{CodegenPipeline, TntTarget};
//!
//! let arena = Bump::new();
//! let session = CodegenSession::new(&arena);
//! let target = TntTarget::default();
//!
//! let mut funcs = parse_module("func @f {\nentry:\n  RET\n}\n", &session)?;
//! let encoded = CodegenPipeline::new(&target, &session).run(&mut funcs[0])?;
//! assert_eq!(encoded.bytes, [0x50, 0, 0, 0, 0, 0, 0, 0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod branch_relax;
pub mod emitter;
pub mod fixup;
pub mod frame_lowering;
pub mod opcodes;
pub mod options;
pub mod pipeline;
pub mod registers;
pub mod target;

pub use branch_relax::{reverse_branch_condition, BranchRelaxation, RelaxationStats};
pub use emitter::{CodeEmitter, EncodedInstr, TntCodeEmitter};
pub use fixup::{elf_reloc_type, elf_reloc_type_raw, Fixup, FixupKind, FixupTarget};
pub use frame_lowering::{FrameLowering, TntFrameLowering};
pub use opcodes::{CondCode, Opcode};
pub use options::TargetOptions;
pub use pipeline::{CodegenPipeline, EncodedFunction, Relocation};
pub use registers::{PhysReg, PhysRegSet, RegClass, RegisterInfo};
pub use target::TntTarget;
