// This module defines the machine-level IR the TNT backend operates on after instruction
// selection and register allocation. A MachineFunction owns an arena of basic blocks indexed
// by dense BlockId values plus a separate layout order; fall-through and branch displacement
// arithmetic are both derived from that layout. Each MachineBasicBlock holds its instructions
// as an ordered Vec, a layout number assigned by renumber_blocks(), and a set of live-in
// physical registers. Instructions are an opcode plus an ordered operand list; register
// operands carry def/implicit/kill/dead state the way the frame lowering code needs them.
// Memory operands are expressed as two consecutive operands (base register, displacement),
// which is the shape the encoder's memory-operand packing expects. Parent links are plain
// indices, so passes mutate blocks through the owning function without back-references.

//! Machine IR: operands, instructions, arena-indexed basic blocks and functions.

use super::error::{CodegenError, CodegenResult};
use super::frame_info::{FrameInfo, FunctionInfo};
use crate::tnt::{Opcode, PhysReg};
use hashbrown::HashSet;

/// Stable arena index of a basic block inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Abstract stack slot reference. Fixed objects use negative indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameIndex(pub i32);

impl FrameIndex {
    pub fn is_fixed(self) -> bool {
        self.0 < 0
    }
}

/// Physical or virtual register reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Phys(PhysReg),
    Virt(u32),
}

impl From<PhysReg> for Reg {
    fn from(reg: PhysReg) -> Self {
        Reg::Phys(reg)
    }
}

/// Liveness and definition flags attached to a register operand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegState {
    pub def: bool,
    pub implicit: bool,
    pub kill: bool,
    pub dead: bool,
}

impl RegState {
    pub const USE: RegState = RegState {
        def: false,
        implicit: false,
        kill: false,
        dead: false,
    };
    pub const DEF: RegState = RegState {
        def: true,
        ..RegState::USE
    };
    pub const KILL: RegState = RegState {
        kill: true,
        ..RegState::USE
    };
    pub const IMPLICIT_DEF: RegState = RegState {
        def: true,
        implicit: true,
        ..RegState::USE
    };
}

/// A single machine operand.
///
/// Symbol names are borrowed from the session arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'a> {
    Reg { reg: Reg, state: RegState },
    Imm(i64),
    Symbol(&'a str),
    Block(BlockId),
    FrameIndex(FrameIndex),
}

impl<'a> Operand<'a> {
    pub fn reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg { reg, .. } => Some(*reg),
            _ => None,
        }
    }

    pub fn imm(&self) -> Option<i64> {
        match self {
            Operand::Imm(value) => Some(*value),
            _ => None,
        }
    }

    pub fn block(&self) -> Option<BlockId> {
        match self {
            Operand::Block(id) => Some(*id),
            _ => None,
        }
    }

    pub fn frame_index(&self) -> Option<FrameIndex> {
        match self {
            Operand::FrameIndex(fi) => Some(*fi),
            _ => None,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, Operand::Reg { state, .. } if state.implicit)
    }

    pub fn is_def(&self) -> bool {
        matches!(self, Operand::Reg { state, .. } if state.def)
    }

    /// Replace this operand with a plain register use.
    pub fn change_to_register(&mut self, reg: PhysReg) {
        *self = Operand::Reg {
            reg: Reg::Phys(reg),
            state: RegState::USE,
        };
    }

    pub fn change_to_immediate(&mut self, value: i64) {
        *self = Operand::Imm(value);
    }
}

/// A machine instruction: opcode plus ordered operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInstr<'a> {
    pub opcode: Opcode,
    pub operands: Vec<Operand<'a>>,
}

impl<'a> MachineInstr<'a> {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
        }
    }

    pub fn add_reg(mut self, reg: impl Into<Reg>, state: RegState) -> Self {
        self.operands.push(Operand::Reg {
            reg: reg.into(),
            state,
        });
        self
    }

    pub fn add_def(self, reg: impl Into<Reg>) -> Self {
        self.add_reg(reg, RegState::DEF)
    }

    pub fn add_use(self, reg: impl Into<Reg>) -> Self {
        self.add_reg(reg, RegState::USE)
    }

    pub fn add_imm(mut self, value: i64) -> Self {
        self.operands.push(Operand::Imm(value));
        self
    }

    pub fn add_symbol(mut self, name: &'a str) -> Self {
        self.operands.push(Operand::Symbol(name));
        self
    }

    pub fn add_block(mut self, block: BlockId) -> Self {
        self.operands.push(Operand::Block(block));
        self
    }

    pub fn add_frame_index(mut self, fi: FrameIndex) -> Self {
        self.operands.push(Operand::FrameIndex(fi));
        self
    }

    /// Checked operand access; a missing operand is a malformed instruction.
    pub fn operand(&self, index: usize) -> CodegenResult<&Operand<'a>> {
        self.operands.get(index).ok_or(CodegenError::OperandCount {
            opcode: self.opcode.name(),
            expected: index + 1,
            found: self.operands.len(),
        })
    }

    pub fn operand_mut(&mut self, index: usize) -> CodegenResult<&mut Operand<'a>> {
        let found = self.operands.len();
        let opcode = self.opcode.name();
        self.operands
            .get_mut(index)
            .ok_or(CodegenError::OperandCount {
                opcode,
                expected: index + 1,
                found,
            })
    }

    pub fn reg_operand(&self, index: usize) -> CodegenResult<Reg> {
        self.operand(index)?
            .reg()
            .ok_or(self.malformed(index, "a register"))
    }

    pub fn imm_operand(&self, index: usize) -> CodegenResult<i64> {
        self.operand(index)?
            .imm()
            .ok_or(self.malformed(index, "an immediate"))
    }

    pub fn malformed(&self, index: usize, expected: &'static str) -> CodegenError {
        CodegenError::MalformedOperand {
            opcode: self.opcode.name(),
            index,
            expected,
        }
    }

    /// Mark a register operand dead (its value is never read).
    pub fn set_dead(&mut self, index: usize) -> CodegenResult<()> {
        let expected = self.malformed(index, "a register");
        match self.operand_mut(index)? {
            Operand::Reg { state, .. } => {
                state.dead = true;
                Ok(())
            }
            _ => Err(expected),
        }
    }

    /// Number of operands that are not implicit register operands.
    pub fn num_explicit_operands(&self) -> usize {
        self.operands.iter().filter(|op| !op.is_implicit()).count()
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}

/// A basic block in the function arena.
#[derive(Debug, Clone)]
pub struct MachineBasicBlock<'a> {
    pub id: BlockId,
    /// Dense layout number; valid after `MachineFunction::renumber_blocks`.
    pub number: u32,
    pub name: String,
    pub instrs: Vec<MachineInstr<'a>>,
    pub live_ins: HashSet<PhysReg>,
}

impl<'a> MachineBasicBlock<'a> {
    fn new(id: BlockId, name: String) -> Self {
        Self {
            id,
            number: id.0,
            name,
            instrs: Vec::new(),
            live_ins: HashSet::new(),
        }
    }

    pub fn push(&mut self, instr: MachineInstr<'a>) {
        self.instrs.push(instr);
    }

    pub fn insert(&mut self, index: usize, instr: MachineInstr<'a>) {
        self.instrs.insert(index, instr);
    }

    pub fn add_live_in(&mut self, reg: PhysReg) {
        self.live_ins.insert(reg);
    }

    pub fn is_live_in(&self, reg: PhysReg) -> bool {
        self.live_ins.contains(&reg)
    }

    pub fn last(&self) -> Option<&MachineInstr<'a>> {
        self.instrs.last()
    }

    /// Index of the first trailing terminator, or the block length.
    pub fn first_terminator(&self) -> usize {
        let mut index = self.instrs.len();
        while index > 0 && self.instrs[index - 1].is_terminator() {
            index -= 1;
        }
        index
    }
}

/// A machine function: block arena, layout order and frame state.
#[derive(Debug, Clone)]
pub struct MachineFunction<'a> {
    pub name: &'a str,
    blocks: Vec<MachineBasicBlock<'a>>,
    layout: Vec<BlockId>,
    pub frame: FrameInfo,
    pub info: FunctionInfo,
}

impl<'a> MachineFunction<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            blocks: Vec::new(),
            layout: Vec::new(),
            frame: FrameInfo::default(),
            info: FunctionInfo::default(),
        }
    }

    /// Append a new block at the end of the layout.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(MachineBasicBlock::new(id, name.into()));
        self.layout.push(id);
        id
    }

    pub fn block(&self, id: BlockId) -> CodegenResult<&MachineBasicBlock<'a>> {
        self.blocks
            .get(id.index())
            .ok_or(CodegenError::UnknownBlock(id.0))
    }

    pub fn block_mut(&mut self, id: BlockId) -> CodegenResult<&mut MachineBasicBlock<'a>> {
        self.blocks
            .get_mut(id.index())
            .ok_or(CodegenError::UnknownBlock(id.0))
    }

    /// Blocks in layout order.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn blocks(&self) -> impl Iterator<Item = &MachineBasicBlock<'a>> + '_ {
        self.layout.iter().map(move |id| &self.blocks[id.index()])
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn num_block_ids(&self) -> usize {
        self.blocks.len()
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().find(|b| b.name == name).map(|b| b.id)
    }

    /// Give the blocks a dense, in-order numbering matching the layout.
    pub fn renumber_blocks(&mut self) {
        for (number, id) in self.layout.iter().enumerate() {
            self.blocks[id.index()].number = number as u32;
        }
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks().map(|b| b.instrs.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_arena_indexed_in_layout_order() {
        let mut func = MachineFunction::new("f");
        let entry = func.add_block("entry");
        let exit = func.add_block("exit");

        assert_eq!(entry, BlockId(0));
        assert_eq!(exit, BlockId(1));
        assert_eq!(func.entry(), Some(entry));
        assert_eq!(func.find_block("exit"), Some(exit));
        assert!(func.block(BlockId(7)).is_err());
    }

    #[test]
    fn test_renumber_follows_layout() {
        let mut func = MachineFunction::new("f");
        let a = func.add_block("a");
        let b = func.add_block("b");
        func.renumber_blocks();
        assert_eq!(func.block(a).unwrap().number, 0);
        assert_eq!(func.block(b).unwrap().number, 1);
    }

    #[test]
    fn test_operand_rewrites() {
        let mut op = Operand::FrameIndex(FrameIndex(0));
        op.change_to_register(PhysReg::Fp);
        assert_eq!(op.reg(), Some(Reg::Phys(PhysReg::Fp)));
        op.change_to_immediate(-6);
        assert_eq!(op.imm(), Some(-6));
    }

    #[test]
    fn test_set_dead_on_implicit_def() {
        let mut mi = MachineInstr::new(Opcode::Sub16ri)
            .add_def(PhysReg::Sp)
            .add_use(PhysReg::Sp)
            .add_imm(4)
            .add_reg(PhysReg::Sr, RegState::IMPLICIT_DEF);
        mi.set_dead(3).unwrap();
        assert_eq!(
            mi.operands[3],
            Operand::Reg {
                reg: Reg::Phys(PhysReg::Sr),
                state: RegState {
                    def: true,
                    implicit: true,
                    kill: false,
                    dead: true
                }
            }
        );
        assert_eq!(mi.num_explicit_operands(), 3);
        assert!(mi.set_dead(2).is_err());
    }

    #[test]
    fn test_first_terminator() {
        let mut func = MachineFunction::new("f");
        let bb = func.add_block("bb");
        let block = func.block_mut(bb).unwrap();
        block.push(MachineInstr::new(Opcode::Mov16rr).add_def(PhysReg::R5).add_use(PhysReg::R6));
        block.push(MachineInstr::new(Opcode::Ret));
        assert_eq!(block.first_terminator(), 1);
    }
}
