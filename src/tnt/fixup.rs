//! Relocation fixups and the fixup-kind to ELF relocation mapping.
//!
//! The encoder records a [`Fixup`] for every operand whose value is not
//! known at encode time. Symbol fixups are handed to the object writer,
//! which turns them into relocation records through [`elf_reloc_type`].
//! Block fixups are resolved by the assembler inside the section.

use crate::core::{BlockId, CodegenError, CodegenResult};
use object::elf;
use std::fmt;

/// Width and flavour of a deferred value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FixupKind {
    /// 4-byte data value.
    Data4 = 0,
    /// 8-byte data value.
    Data8 = 1,
    /// 4-byte section-relative value; used for call targets.
    SecRel4 = 2,
    /// 8-byte section-relative value; used for 64-bit immediate loads.
    SecRel8 = 3,
    /// 2-byte PC-relative value; used for branch targets.
    PcRel2 = 4,
}

impl FixupKind {
    pub fn size(self) -> u32 {
        match self {
            FixupKind::PcRel2 => 2,
            FixupKind::Data4 | FixupKind::SecRel4 => 4,
            FixupKind::Data8 | FixupKind::SecRel8 => 8,
        }
    }

    pub fn is_pc_relative(self) -> bool {
        self == FixupKind::PcRel2
    }

    pub fn name(self) -> &'static str {
        match self {
            FixupKind::Data4 => "FK_Data_4",
            FixupKind::Data8 => "FK_Data_8",
            FixupKind::SecRel4 => "FK_SecRel_4",
            FixupKind::SecRel8 => "FK_SecRel_8",
            FixupKind::PcRel2 => "FK_PCRel_2",
        }
    }
}

impl TryFrom<u8> for FixupKind {
    type Error = CodegenError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(FixupKind::Data4),
            1 => Ok(FixupKind::Data8),
            2 => Ok(FixupKind::SecRel4),
            3 => Ok(FixupKind::SecRel8),
            4 => Ok(FixupKind::PcRel2),
            other => Err(CodegenError::UnmappedFixupKind(other)),
        }
    }
}

impl fmt::Display for FixupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a fixup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupTarget<'a> {
    Symbol(&'a str),
    Block(BlockId),
}

impl fmt::Display for FixupTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixupTarget::Symbol(name) => write!(f, "@{name}"),
            FixupTarget::Block(id) => write!(f, "bb.{}", id.0),
        }
    }
}

/// A deferred relocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup<'a> {
    /// Byte offset of the patched field, relative to the instruction
    /// (or to the function once the pipeline has placed it).
    ///
    /// Encoder fixups point at the 32-bit value field, byte 4 of the
    /// word, not at the opcode byte.
    pub offset: u32,
    pub target: FixupTarget<'a>,
    pub kind: FixupKind,
    pub pc_relative: bool,
}

impl<'a> Fixup<'a> {
    pub fn new(offset: u32, target: FixupTarget<'a>, kind: FixupKind) -> Self {
        Self {
            offset,
            target,
            kind,
            pc_relative: kind.is_pc_relative(),
        }
    }

    /// Same fixup moved by `delta` bytes.
    pub fn shifted(self, delta: u32) -> Self {
        Self {
            offset: self.offset + delta,
            ..self
        }
    }
}

/// ELF relocation type for a fixup kind.
///
/// Branch fixups never reach the object writer; asking for one is an
/// unmapped kind.
pub fn elf_reloc_type(kind: FixupKind, pc_relative: bool) -> CodegenResult<u32> {
    match kind {
        FixupKind::SecRel8 => Ok(elf::R_X86_64_64),
        FixupKind::SecRel4 => Ok(elf::R_X86_64_PC32),
        FixupKind::Data8 => Ok(if pc_relative {
            elf::R_X86_64_PC64
        } else {
            elf::R_X86_64_64
        }),
        FixupKind::Data4 => Ok(if pc_relative {
            elf::R_X86_64_PC32
        } else {
            elf::R_X86_64_32
        }),
        FixupKind::PcRel2 => Err(CodegenError::UnmappedFixupKind(kind as u8)),
    }
}

/// [`elf_reloc_type`] over a raw kind code.
pub fn elf_reloc_type_raw(raw: u8, pc_relative: bool) -> CodegenResult<u32> {
    elf_reloc_type(FixupKind::try_from(raw)?, pc_relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocation_table() {
        assert_eq!(elf_reloc_type(FixupKind::SecRel8, false), Ok(elf::R_X86_64_64));
        assert_eq!(elf_reloc_type(FixupKind::SecRel4, false), Ok(elf::R_X86_64_PC32));
        assert_eq!(elf_reloc_type(FixupKind::Data8, true), Ok(elf::R_X86_64_PC64));
        assert_eq!(elf_reloc_type(FixupKind::Data8, false), Ok(elf::R_X86_64_64));
        assert_eq!(elf_reloc_type(FixupKind::Data4, true), Ok(elf::R_X86_64_PC32));
        assert_eq!(elf_reloc_type(FixupKind::Data4, false), Ok(elf::R_X86_64_32));
    }

    #[test]
    fn test_unmapped_kinds_are_fatal() {
        assert_eq!(
            elf_reloc_type(FixupKind::PcRel2, true),
            Err(CodegenError::UnmappedFixupKind(4))
        );
        assert_eq!(
            elf_reloc_type_raw(9, false),
            Err(CodegenError::UnmappedFixupKind(9))
        );
        assert_eq!(elf_reloc_type_raw(3, false), Ok(elf::R_X86_64_64));
    }

    #[test]
    fn test_pc_relative_flag_follows_kind() {
        let call = Fixup::new(4, FixupTarget::Symbol("callee"), FixupKind::SecRel4);
        assert!(!call.pc_relative);
        let branch = Fixup::new(4, FixupTarget::Block(BlockId(3)), FixupKind::PcRel2);
        assert!(branch.pc_relative);
        assert_eq!(branch.shifted(16).offset, 20);
        assert_eq!(branch.kind.size(), 2);
    }
}
