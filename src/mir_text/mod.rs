//! Textual machine IR for tests and the `tntc` driver.
//!
//! The format describes post-allocation machine functions compactly:
//!
//! ```text
//! ; Comments start with semicolon
//! func @sum {
//!   stack_size 6
//!   object size=2 offset=-6
//!   callee_saved r5
//! entry:
//!   r12 = MOV16rm fi#0, 0
//!   CMP16ri r12, 10
//!   JCC ^done, ne
//!   JAL @helper
//! done:
//!   RET
//! }
//! ```
//!
//! Directives before the first block set up the frame: `stack_size N`,
//! `offset_adjustment N`, `var_sized_objects`, `frame_address_taken`,
//! `object size=N offset=M`, `fixed_object size=N offset=M` and
//! `callee_saved <regs>`.
//!
//! Instructions are `defs = OPCODE uses` or `OPCODE uses`. Operands are
//! register names, `%N` virtual registers, integers (decimal or `0x` hex),
//! `@symbol`, `^block`, `fi#N` frame indices, or condition-code mnemonics.
//! Register operands may be prefixed by `implicit-def`, `implicit`,
//! `killed` and `dead`.

use thiserror::Error;

pub mod parser;
pub mod printer;

pub use parser::parse_module;

/// Errors produced while reading textual machine IR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found `{found}`")]
    Expected {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("line {line}: unknown opcode `{name}`")]
    UnknownOpcode { line: usize, name: String },

    #[error("line {line}: undefined block `^{name}`")]
    UndefinedBlock { line: usize, name: String },

    #[error("line {line}: duplicate block `{name}`")]
    DuplicateBlock { line: usize, name: String },

    #[error("line {line}: invalid number `{text}`")]
    InvalidNumber { line: usize, text: String },

    #[error("line {line}: `{text}` appears outside of a block")]
    OutsideBlock { line: usize, text: String },

    #[error("line {line}: function `{name}` is never closed")]
    Unterminated { line: usize, name: String },
}

impl ParseError {
    /// 1-based line the error was detected on.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Expected { line, .. }
            | ParseError::UnknownOpcode { line, .. }
            | ParseError::UndefinedBlock { line, .. }
            | ParseError::DuplicateBlock { line, .. }
            | ParseError::InvalidNumber { line, .. }
            | ParseError::OutsideBlock { line, .. }
            | ParseError::Unterminated { line, .. } => *line,
        }
    }
}
