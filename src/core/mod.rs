// This module holds the target-independent pieces of the backend: the machine IR (operands,
// instructions, arena-indexed blocks and functions), the per-function frame descriptor, the
// arena-backed code generation session with its statistics, and the shared error type. The
// TNT target builds on these; nothing here knows about instruction encodings or frame
// layout rules.

//! Core machine IR infrastructure.

pub mod error;
pub mod frame_info;
pub mod mir;
pub mod session;

pub use error::{CodegenError, CodegenResult};
pub use frame_info::{FrameInfo, FrameObject, FunctionInfo};
pub use mir::{
    BlockId, FrameIndex, MachineBasicBlock, MachineFunction, MachineInstr, Operand, Reg, RegState,
};
pub use session::{CodegenSession, SessionStats};
