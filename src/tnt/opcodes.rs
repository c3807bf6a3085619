//! TNT opcodes and condition codes.
//!
//! `Opcode::size` is the layout size used for branch displacement
//! arithmetic; it is what branch relaxation measures blocks with. The
//! encoder packs every real instruction into an 8-byte word (16 bytes for
//! `LD_imm64`) independently of that size.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Push16r,
    Pop16r,
    Mov16rr,
    Mov16ri,
    Mov16rm,
    Mov16mr,
    Add16rr,
    Add16ri,
    Sub16rr,
    Sub16ri,
    And16rr,
    Or16rr,
    Xor16rr,
    Cmp16rr,
    Cmp16ri,
    /// Conditional branch: target, condition code.
    Jcc,
    /// Short unconditional branch.
    Jmp,
    /// Long unconditional branch.
    Bi,
    /// Call to an absolute symbol.
    Jal,
    Ret,
    Reti,
    /// Load of a sign-extended 64-bit immediate.
    LdImm64,
    AdjCallStackDown,
    AdjCallStackUp,
}

impl Opcode {
    pub const ALL: [Opcode; 24] = [
        Opcode::Push16r,
        Opcode::Pop16r,
        Opcode::Mov16rr,
        Opcode::Mov16ri,
        Opcode::Mov16rm,
        Opcode::Mov16mr,
        Opcode::Add16rr,
        Opcode::Add16ri,
        Opcode::Sub16rr,
        Opcode::Sub16ri,
        Opcode::And16rr,
        Opcode::Or16rr,
        Opcode::Xor16rr,
        Opcode::Cmp16rr,
        Opcode::Cmp16ri,
        Opcode::Jcc,
        Opcode::Jmp,
        Opcode::Bi,
        Opcode::Jal,
        Opcode::Ret,
        Opcode::Reti,
        Opcode::LdImm64,
        Opcode::AdjCallStackDown,
        Opcode::AdjCallStackUp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Push16r => "PUSH16r",
            Opcode::Pop16r => "POP16r",
            Opcode::Mov16rr => "MOV16rr",
            Opcode::Mov16ri => "MOV16ri",
            Opcode::Mov16rm => "MOV16rm",
            Opcode::Mov16mr => "MOV16mr",
            Opcode::Add16rr => "ADD16rr",
            Opcode::Add16ri => "ADD16ri",
            Opcode::Sub16rr => "SUB16rr",
            Opcode::Sub16ri => "SUB16ri",
            Opcode::And16rr => "AND16rr",
            Opcode::Or16rr => "OR16rr",
            Opcode::Xor16rr => "XOR16rr",
            Opcode::Cmp16rr => "CMP16rr",
            Opcode::Cmp16ri => "CMP16ri",
            Opcode::Jcc => "JCC",
            Opcode::Jmp => "JMP",
            Opcode::Bi => "Bi",
            Opcode::Jal => "JAL",
            Opcode::Ret => "RET",
            Opcode::Reti => "RETI",
            Opcode::LdImm64 => "LD_imm64",
            Opcode::AdjCallStackDown => "ADJCALLSTACKDOWN",
            Opcode::AdjCallStackUp => "ADJCALLSTACKUP",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Opcode byte in the instruction word; `None` for pseudos.
    pub fn encoding(self) -> Option<u8> {
        let byte = match self {
            Opcode::Push16r => 0x10,
            Opcode::Pop16r => 0x11,
            Opcode::LdImm64 => 0x18,
            Opcode::Mov16rr => 0x20,
            Opcode::Mov16ri => 0x21,
            Opcode::Mov16rm => 0x22,
            Opcode::Mov16mr => 0x23,
            Opcode::Add16rr => 0x30,
            Opcode::Add16ri => 0x31,
            Opcode::Sub16rr => 0x32,
            Opcode::Sub16ri => 0x33,
            Opcode::And16rr => 0x34,
            Opcode::Or16rr => 0x35,
            Opcode::Xor16rr => 0x36,
            Opcode::Cmp16rr => 0x38,
            Opcode::Cmp16ri => 0x39,
            Opcode::Jcc => 0x40,
            Opcode::Jmp => 0x41,
            Opcode::Bi => 0x42,
            Opcode::Jal => 0x48,
            Opcode::Ret => 0x50,
            Opcode::Reti => 0x51,
            Opcode::AdjCallStackDown | Opcode::AdjCallStackUp => return None,
        };
        Some(byte)
    }

    /// Layout size in bytes.
    pub fn size(self) -> u32 {
        match self {
            Opcode::Push16r
            | Opcode::Pop16r
            | Opcode::Mov16rr
            | Opcode::Add16rr
            | Opcode::Sub16rr
            | Opcode::And16rr
            | Opcode::Or16rr
            | Opcode::Xor16rr
            | Opcode::Cmp16rr
            | Opcode::Jcc
            | Opcode::Jmp
            | Opcode::Ret
            | Opcode::Reti => 2,
            Opcode::Mov16ri
            | Opcode::Mov16rm
            | Opcode::Mov16mr
            | Opcode::Add16ri
            | Opcode::Sub16ri
            | Opcode::Cmp16ri
            | Opcode::Bi
            | Opcode::Jal => 4,
            Opcode::LdImm64 => 8,
            Opcode::AdjCallStackDown | Opcode::AdjCallStackUp => 0,
        }
    }

    pub fn is_pseudo(self) -> bool {
        self.encoding().is_none()
    }

    pub fn is_return(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Reti)
    }

    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Jcc | Opcode::Jmp | Opcode::Bi)
    }

    pub fn is_terminator(self) -> bool {
        self.is_branch() || self.is_return()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// TNT condition codes, as carried in the JCC condition operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondCode {
    /// Equal (zero).
    Eq = 0,
    /// Not equal (not zero).
    Ne = 1,
    /// Unsigned higher or same (carry).
    Hs = 2,
    /// Unsigned lower (no carry).
    Lo = 3,
    /// Signed greater or equal.
    Ge = 4,
    /// Signed less.
    L = 5,
}

impl CondCode {
    pub const ALL: [CondCode; 6] = [
        CondCode::Eq,
        CondCode::Ne,
        CondCode::Hs,
        CondCode::Lo,
        CondCode::Ge,
        CondCode::L,
    ];

    pub fn from_imm(value: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|cc| *cc as i64 == value)
    }

    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cc| cc.mnemonic() == name)
    }

    /// The complementary condition.
    pub fn invert(self) -> Self {
        match self {
            CondCode::Eq => CondCode::Ne,
            CondCode::Ne => CondCode::Eq,
            CondCode::Hs => CondCode::Lo,
            CondCode::Lo => CondCode::Hs,
            CondCode::Ge => CondCode::L,
            CondCode::L => CondCode::Ge,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            CondCode::Eq => "eq",
            CondCode::Ne => "ne",
            CondCode::Hs => "hs",
            CondCode::Lo => "lo",
            CondCode::Ge => "ge",
            CondCode::L => "l",
        }
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
