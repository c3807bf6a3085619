// This module implements the TNT instruction encoder. CodeEmitter is the interface branch
// relaxation and the pipeline use: size_in_bytes() is the layout-size oracle (pure, stable
// across calls) and encode() turns one finalized instruction into bytes plus fixups.
// TntCodeEmitter builds a 64-bit binary code for the instruction (opcode byte, register
// nibbles, operand value) and splits it into an 8-byte word: the opcode byte first, then the
// register byte (nibble-swapped for big-endian streams), a zero 16-bit reserved field and the
// 32-bit operand value, both written in the stream's byte order. LD_imm64 is special-cased
// into two 8-byte groups carrying the upper and lower halves of its immediate. Registers
// encode to their 4-bit target encoding, immediates to their literal value truncated to the
// field, and symbol or block operands to a zero placeholder plus exactly one fixup whose kind
// depends on the instruction: JAL gets a 4-byte section-relative fixup, LD_imm64 an 8-byte
// one, and everything else a 2-byte PC-relative branch fixup. Memory operands pack the base
// register encoding into the upper half of the value field and the 16-bit displacement into
// the lower half.

//! TNT machine code emission.

use super::fixup::{Fixup, FixupKind, FixupTarget};
use super::Opcode;
use crate::core::{CodegenError, CodegenResult, MachineInstr, Operand, Reg};
use object::endian::{Endian, Endianness};

/// Length of a standard instruction word.
pub const WORD_SIZE: usize = 8;

/// Byte offset of the operand value field inside a word.
const VALUE_FIELD_OFFSET: u32 = 4;

/// Exchange the high and low nibble of a byte.
pub fn swap_bits(val: u8) -> u8 {
    (val & 0x0f) << 4 | (val & 0xf0) >> 4
}

/// Bytes and fixups produced for one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedInstr<'a> {
    pub bytes: Vec<u8>,
    pub fixups: Vec<Fixup<'a>>,
}

/// Instruction size oracle and encoder.
pub trait CodeEmitter {
    /// Layout size of `mi` in bytes.
    fn size_in_bytes(&self, mi: &MachineInstr<'_>) -> u32;

    /// Encode a finalized instruction.
    fn encode<'a>(&self, mi: &MachineInstr<'a>) -> CodegenResult<EncodedInstr<'a>>;
}

/// Where the fields of an instruction word come from.
#[derive(Debug, Clone, Copy)]
struct WordFields {
    /// Operand feeding the low register nibble.
    dst: Option<usize>,
    /// Operand feeding the high register nibble.
    src: Option<usize>,
    value: ValueField,
}

#[derive(Debug, Clone, Copy)]
enum ValueField {
    Empty,
    Operand(usize),
    Memory(usize),
}

impl WordFields {
    const fn new(dst: Option<usize>, src: Option<usize>, value: ValueField) -> Self {
        Self { dst, src, value }
    }
}

fn word_fields(opcode: Opcode) -> Option<WordFields> {
    let fields = match opcode {
        Opcode::Push16r => WordFields::new(None, Some(0), ValueField::Empty),
        Opcode::Pop16r => WordFields::new(Some(0), None, ValueField::Empty),
        Opcode::Mov16rr | Opcode::Cmp16rr => WordFields::new(Some(0), Some(1), ValueField::Empty),
        Opcode::Mov16ri | Opcode::Cmp16ri | Opcode::LdImm64 => {
            WordFields::new(Some(0), None, ValueField::Operand(1))
        }
        Opcode::Mov16rm => WordFields::new(Some(0), None, ValueField::Memory(1)),
        Opcode::Mov16mr => WordFields::new(None, Some(2), ValueField::Memory(0)),
        Opcode::Add16rr
        | Opcode::Sub16rr
        | Opcode::And16rr
        | Opcode::Or16rr
        | Opcode::Xor16rr => WordFields::new(Some(0), Some(2), ValueField::Empty),
        Opcode::Add16ri | Opcode::Sub16ri => WordFields::new(Some(0), None, ValueField::Operand(2)),
        // Condition code rides in the destination nibble.
        Opcode::Jcc => WordFields::new(Some(1), None, ValueField::Operand(0)),
        Opcode::Jmp | Opcode::Bi | Opcode::Jal => WordFields::new(None, None, ValueField::Operand(0)),
        Opcode::Ret | Opcode::Reti => WordFields::new(None, None, ValueField::Empty),
        Opcode::AdjCallStackDown | Opcode::AdjCallStackUp => return None,
    };
    Some(fields)
}

/// TNT encoder for one instruction-stream byte order.
#[derive(Debug, Clone, Copy)]
pub struct TntCodeEmitter {
    endianness: Endianness,
}

impl TntCodeEmitter {
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }

    pub fn is_little_endian(&self) -> bool {
        self.endianness == Endianness::Little
    }

    /// Number of bytes `encode` produces for `opcode`.
    pub fn encoded_len(opcode: Opcode) -> usize {
        match opcode {
            Opcode::LdImm64 => 2 * WORD_SIZE,
            op if op.is_pseudo() => 0,
            _ => WORD_SIZE,
        }
    }

    fn fixup_kind(opcode: Opcode) -> FixupKind {
        match opcode {
            // Function call name.
            Opcode::Jal => FixupKind::SecRel4,
            Opcode::LdImm64 => FixupKind::SecRel8,
            // Basic block label.
            _ => FixupKind::PcRel2,
        }
    }

    /// Value of operand `index`, recording a fixup for symbolic operands.
    pub fn machine_op_value<'a>(
        &self,
        mi: &MachineInstr<'a>,
        index: usize,
        fixups: &mut Vec<Fixup<'a>>,
    ) -> CodegenResult<u64> {
        let target = match *mi.operand(index)? {
            Operand::Reg { reg, .. } => return register_encoding(mi, reg).map(u64::from),
            Operand::Imm(value) => return Ok(value as u64),
            Operand::Symbol(name) => FixupTarget::Symbol(name),
            Operand::Block(id) => FixupTarget::Block(id),
            Operand::FrameIndex(_) => {
                return Err(CodegenError::Unfinalized {
                    opcode: mi.opcode.name(),
                    reason: "frame index operand was not eliminated",
                })
            }
        };

        fixups.push(Fixup::new(
            VALUE_FIELD_OFFSET,
            target,
            Self::fixup_kind(mi.opcode),
        ));
        Ok(0)
    }

    /// Base register and displacement starting at operand `index`.
    pub fn memory_op_value(&self, mi: &MachineInstr<'_>, index: usize) -> CodegenResult<u64> {
        let base = match *mi.operand(index)? {
            Operand::Reg { reg, .. } => register_encoding(mi, reg)?,
            _ => return Err(mi.malformed(index, "a register")),
        };
        let disp = match *mi.operand(index + 1)? {
            Operand::Imm(disp) => disp,
            _ => return Err(mi.malformed(index + 1, "an immediate")),
        };
        Ok((u64::from(base) << 16) | (disp as u64 & 0xffff))
    }

    fn nibble(&self, mi: &MachineInstr<'_>, index: Option<usize>) -> CodegenResult<u8> {
        let Some(index) = index else {
            return Ok(0);
        };
        match *mi.operand(index)? {
            Operand::Reg { reg, .. } => register_encoding(mi, reg),
            Operand::Imm(value) => Ok((value & 0xf) as u8),
            _ => Err(mi.malformed(index, "a register or condition code")),
        }
    }

    /// Binary code: opcode in bits 56..64, register nibbles in 48..56, the
    /// operand value in the low 32 bits.
    pub fn binary_code<'a>(
        &self,
        mi: &MachineInstr<'a>,
        fixups: &mut Vec<Fixup<'a>>,
    ) -> CodegenResult<u64> {
        let unfinalized = CodegenError::Unfinalized {
            opcode: mi.opcode.name(),
            reason: "pseudo instruction was not expanded",
        };
        let (Some(opcode), Some(fields)) = (mi.opcode.encoding(), word_fields(mi.opcode)) else {
            return Err(unfinalized);
        };

        let regs = self.nibble(mi, fields.src)? << 4 | self.nibble(mi, fields.dst)?;
        let value = match fields.value {
            ValueField::Empty => 0,
            ValueField::Operand(index) => self.machine_op_value(mi, index, fixups)? & 0xffff_ffff,
            ValueField::Memory(index) => self.memory_op_value(mi, index)?,
        };

        Ok(u64::from(opcode) << 56 | u64::from(regs) << 48 | value)
    }

    fn write_word(&self, out: &mut Vec<u8>, opcode: u8, regs: u8, reserved: u16, value: u32) {
        out.push(opcode);
        out.push(if self.is_little_endian() {
            regs
        } else {
            swap_bits(regs)
        });
        out.extend_from_slice(&self.endianness.write_u16_bytes(reserved));
        out.extend_from_slice(&self.endianness.write_u32_bytes(value));
    }

    fn encode_ld_imm64<'a>(&self, mi: &MachineInstr<'a>) -> CodegenResult<EncodedInstr<'a>> {
        let mut fixups = Vec::new();
        let code = self.binary_code(mi, &mut fixups)?;
        let imm = self.machine_op_value(mi, 1, &mut Vec::new())?;

        let mut bytes = Vec::with_capacity(2 * WORD_SIZE);
        self.write_word(&mut bytes, (code >> 56) as u8, (code >> 48) as u8, 0, (imm >> 32) as u32);
        self.write_word(&mut bytes, 0, 0, 0, imm as u32);
        Ok(EncodedInstr { bytes, fixups })
    }
}

impl CodeEmitter for TntCodeEmitter {
    fn size_in_bytes(&self, mi: &MachineInstr<'_>) -> u32 {
        mi.opcode.size()
    }

    fn encode<'a>(&self, mi: &MachineInstr<'a>) -> CodegenResult<EncodedInstr<'a>> {
        if mi.opcode == Opcode::LdImm64 {
            return self.encode_ld_imm64(mi);
        }

        let mut fixups = Vec::new();
        let code = self.binary_code(mi, &mut fixups)?;
        let mut bytes = Vec::with_capacity(WORD_SIZE);
        self.write_word(
            &mut bytes,
            (code >> 56) as u8,
            (code >> 48) as u8,
            (code >> 32) as u16,
            code as u32,
        );
        Ok(EncodedInstr { bytes, fixups })
    }
}

fn register_encoding(mi: &MachineInstr<'_>, reg: Reg) -> CodegenResult<u8> {
    match reg {
        Reg::Phys(reg) => Ok(reg.encoding()),
        Reg::Virt(_) => Err(CodegenError::Unfinalized {
            opcode: mi.opcode.name(),
            reason: "virtual register was not allocated",
        }),
    }
}
