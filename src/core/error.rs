// This module defines the error type for the TNT backend using the thiserror crate. Every
// variant is a contract violation by an upstream pass (instruction selection, register
// allocation or the pipeline driver itself): malformed operand shapes, prologue insertion
// outside the entry block, epilogue insertion into a block that does not return, fixup kinds
// the object writer cannot map, leftover stack adjustments during frame index elimination,
// and a branch relaxation loop that fails to converge. None of these are recoverable; the
// driver stops compiling the module on the first one. Degenerate inputs such as empty
// callee-saved lists or zero-byte adjustments are handled as no-ops and never produce an
// error. CodegenResult<T> is the convenience alias used across the crate.

//! Error types for the TNT backend.

use thiserror::Error;

/// Contract violations detected while lowering or encoding a function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("{opcode}: operand {index} is not {expected}")]
    MalformedOperand {
        opcode: &'static str,
        index: usize,
        expected: &'static str,
    },

    #[error("{opcode}: expected {expected} operands, found {found}")]
    OperandCount {
        opcode: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("shrink-wrapping not supported: prologue requested for bb.{block}, entry is bb.{entry}")]
    ShrinkWrapping { block: u32, entry: u32 },

    #[error("can only insert epilogue into returning blocks (bb.{block} ends in {terminator})")]
    NotAReturnBlock {
        block: u32,
        terminator: &'static str,
    },

    #[error("invalid fixup kind {0}")]
    UnmappedFixupKind(u8),

    #[error("unexpected stack pointer adjustment of {0} bytes during frame index elimination")]
    UnexpectedSpAdjustment(i64),

    #[error("branch relaxation did not converge after {iterations} iterations")]
    RelaxationDidNotConverge { iterations: usize },

    #[error("frame of {stack_size} bytes cannot hold {required} bytes of fixed regions")]
    InconsistentFrame { stack_size: u64, required: u64 },

    #[error("slot for FP register must be first fixed object (got index {index}, begin {begin})")]
    FramePointerSlot { index: i32, begin: i32 },

    #[error("{opcode} reached the encoder unfinalized: {reason}")]
    Unfinalized {
        opcode: &'static str,
        reason: &'static str,
    },

    #[error("unknown frame index {0}")]
    UnknownFrameIndex(i32),

    #[error("bb.{block} has no instruction at index {index}")]
    NoInstruction { block: u32, index: usize },

    #[error("unknown basic block {0}")]
    UnknownBlock(u32),
}

/// Result type alias for code generation operations.
pub type CodegenResult<T> = Result<T, CodegenError>;
