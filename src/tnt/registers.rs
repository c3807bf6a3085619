// This module describes the TNT register file and implements the register-info queries the
// frame lowering and allocator consume. TNT has sixteen 16-bit registers: PC, SP, SR (status
// flags), CG (constant generator), FP and the general registers R5-R15, each with an 8-bit
// sub-register alias. The target-defined encoding of a register is its 4-bit index, shared
// by both widths. RegisterInfo exposes the ordered callee-saved list (order drives the push
// and pop sequences), the reserved set (PC, SP, SR, CG and their byte aliases, plus FP when
// the function keeps a frame pointer), the pointer register class and the frame register.
// It also performs frame index elimination: rewriting an abstract stack slot operand into a
// base register plus a concrete displacement, expanding the address-of-slot form of ADD16ri
// into a register move followed by an add or subtract of the offset.

//! TNT registers and register information.

use super::frame_lowering::has_fp;
use super::options::TargetOptions;
use super::Opcode;
use crate::core::{
    BlockId, CodegenError, CodegenResult, MachineFunction, MachineInstr, RegState,
};
use std::fmt;

/// Physical TNT registers, word registers first, then their byte aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhysReg {
    Pc,
    Sp,
    Sr,
    Cg,
    Fp,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Pcb,
    Spb,
    Srb,
    Cgb,
    Fpb,
    R5b,
    R6b,
    R7b,
    R8b,
    R9b,
    R10b,
    R11b,
    R12b,
    R13b,
    R14b,
    R15b,
}

impl PhysReg {
    pub const COUNT: usize = 32;

    pub const ALL: [PhysReg; Self::COUNT] = [
        PhysReg::Pc, PhysReg::Sp, PhysReg::Sr, PhysReg::Cg,
        PhysReg::Fp, PhysReg::R5, PhysReg::R6, PhysReg::R7,
        PhysReg::R8, PhysReg::R9, PhysReg::R10, PhysReg::R11,
        PhysReg::R12, PhysReg::R13, PhysReg::R14, PhysReg::R15,
        PhysReg::Pcb, PhysReg::Spb, PhysReg::Srb, PhysReg::Cgb,
        PhysReg::Fpb, PhysReg::R5b, PhysReg::R6b, PhysReg::R7b,
        PhysReg::R8b, PhysReg::R9b, PhysReg::R10b, PhysReg::R11b,
        PhysReg::R12b, PhysReg::R13b, PhysReg::R14b, PhysReg::R15b,
    ];

    const NAMES: [&'static str; Self::COUNT] = [
        "pc", "sp", "sr", "cg", "fp", "r5", "r6", "r7",
        "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
        "pcb", "spb", "srb", "cgb", "fpb", "r5b", "r6b", "r7b",
        "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b", "r15b",
    ];

    /// Linear index used for register sets.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Target-defined encoding value (4-bit register number).
    pub fn encoding(self) -> u8 {
        (self.index() % 16) as u8
    }

    pub fn is_byte(self) -> bool {
        self.index() >= 16
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self.index()]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| Self::ALL[i])
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bit set over the physical registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysRegSet {
    bits: u32,
}

impl PhysRegSet {
    pub fn new() -> Self {
        Self { bits: 0 }
    }

    pub fn contains(&self, reg: PhysReg) -> bool {
        self.bits & (1u32 << reg.index()) != 0
    }

    pub fn set(&mut self, reg: PhysReg) {
        self.bits |= 1u32 << reg.index();
    }

    pub fn count(&self) -> u32 {
        self.bits.count_ones()
    }
}

/// Register classes visible to the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegClass {
    /// 8-bit registers.
    Gr8,
    /// 16-bit registers; also the pointer class.
    Gr16,
}

impl RegClass {
    pub fn members(self) -> &'static [PhysReg] {
        match self {
            RegClass::Gr8 => &PhysReg::ALL[16..],
            RegClass::Gr16 => &PhysReg::ALL[..16],
        }
    }

    pub fn contains(self, reg: PhysReg) -> bool {
        self.members().contains(&reg)
    }
}

/// Callee-saved registers, in the order prologues save them.
const CALLEE_SAVED_REGS: [PhysReg; 8] = [
    PhysReg::Fp, PhysReg::R5, PhysReg::R6, PhysReg::R7,
    PhysReg::R8, PhysReg::R9, PhysReg::R10, PhysReg::R11,
];

/// Size of the saved return address slot.
const RETURN_ADDRESS_SIZE: i64 = 2;

/// Size of the saved frame pointer slot.
const SAVED_FP_SIZE: i64 = 2;

/// Static register tables plus frame index elimination.
#[derive(Debug, Clone, Copy)]
pub struct RegisterInfo {
    options: TargetOptions,
}

impl RegisterInfo {
    pub fn new(options: TargetOptions) -> Self {
        Self { options }
    }

    pub fn callee_saved_regs(&self) -> &'static [PhysReg] {
        &CALLEE_SAVED_REGS
    }

    pub fn reserved_regs(&self, func: &MachineFunction<'_>) -> PhysRegSet {
        let mut reserved = PhysRegSet::new();

        // Four special registers with their byte aliases.
        for reg in [
            PhysReg::Pcb, PhysReg::Spb, PhysReg::Srb, PhysReg::Cgb,
            PhysReg::Pc, PhysReg::Sp, PhysReg::Sr, PhysReg::Cg,
        ] {
            reserved.set(reg);
        }

        if has_fp(&self.options, func) {
            reserved.set(PhysReg::Fpb);
            reserved.set(PhysReg::Fp);
        }

        reserved
    }

    pub fn pointer_reg_class(&self) -> RegClass {
        RegClass::Gr16
    }

    pub fn frame_register(&self, func: &MachineFunction<'_>) -> PhysReg {
        if has_fp(&self.options, func) {
            PhysReg::Fp
        } else {
            PhysReg::Sp
        }
    }

    /// Replace the frame index operand `fi_operand` of the instruction at
    /// `index` in `block` with a base register and concrete displacement.
    ///
    /// The operand after the frame index holds an immediate addend that is
    /// folded into the displacement.
    pub fn eliminate_frame_index(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        index: usize,
        fi_operand: usize,
        sp_adj: i64,
    ) -> CodegenResult<()> {
        if sp_adj != 0 {
            return Err(CodegenError::UnexpectedSpAdjustment(sp_adj));
        }

        let has_fp = has_fp(&self.options, func);
        let base = if has_fp { PhysReg::Fp } else { PhysReg::Sp };
        let stack_size = func.frame.stack_size as i64;

        let mi = func
            .block(block)?
            .instrs
            .get(index)
            .ok_or(CodegenError::NoInstruction {
                block: block.0,
                index,
            })?;
        let fi = mi
            .operand(fi_operand)?
            .frame_index()
            .ok_or(mi.malformed(fi_operand, "a frame index"))?;
        let addend = mi.imm_operand(fi_operand + 1)?;

        // Skip the saved PC.
        let mut offset = func.frame.object_offset(fi)? + RETURN_ADDRESS_SIZE;
        if has_fp {
            offset += SAVED_FP_SIZE;
        } else {
            offset += stack_size;
        }
        offset += addend;

        let block = func.block_mut(block)?;
        let mi = &mut block.instrs[index];

        if mi.opcode == Opcode::Add16ri {
            // Address of a stack slot: two-address encoding cannot form
            // base + offset in one step, so expand into mov + add/sub.
            let dst = mi.reg_operand(0)?;
            mi.opcode = Opcode::Mov16rr;
            mi.operand_mut(fi_operand)?.change_to_register(base);
            mi.operands.truncate(fi_operand + 1);

            if offset == 0 {
                log::trace!("frame index {} folded into mov from {}", fi.0, base);
                return Ok(());
            }

            let opcode = if offset < 0 {
                Opcode::Sub16ri
            } else {
                Opcode::Add16ri
            };
            let mut materialize = MachineInstr::new(opcode)
                .add_def(dst)
                .add_use(dst)
                .add_imm(offset.abs())
                .add_reg(PhysReg::Sr, RegState::IMPLICIT_DEF);
            // The SR implicit def is dead.
            materialize.set_dead(3)?;
            block.insert(index + 1, materialize);
            log::trace!("frame index {} materialized as {} {}", fi.0, base, offset);
            return Ok(());
        }

        mi.operand_mut(fi_operand)?.change_to_register(base);
        mi.operand_mut(fi_operand + 1)?.change_to_immediate(offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FrameIndex, Reg};

    fn options(disable_fp_elim: bool) -> TargetOptions {
        TargetOptions {
            disable_frame_pointer_elim: disable_fp_elim,
            ..TargetOptions::default()
        }
    }

    fn load_from_slot<'a>(fi: FrameIndex, addend: i64) -> MachineInstr<'a> {
        MachineInstr::new(Opcode::Mov16rm)
            .add_def(PhysReg::R12)
            .add_frame_index(fi)
            .add_imm(addend)
    }

    #[test]
    fn test_register_encoding_shared_by_aliases() {
        assert_eq!(PhysReg::Pc.encoding(), 0);
        assert_eq!(PhysReg::Fp.encoding(), 4);
        assert_eq!(PhysReg::R15.encoding(), 15);
        assert_eq!(PhysReg::R15b.encoding(), 15);
        assert_eq!(PhysReg::from_name("r10b"), Some(PhysReg::R10b));
        assert_eq!(PhysReg::from_name("r16"), None);
    }

    #[test]
    fn test_callee_saved_order() {
        let info = RegisterInfo::new(TargetOptions::default());
        let regs = info.callee_saved_regs();
        assert_eq!(regs.first(), Some(&PhysReg::Fp));
        assert_eq!(regs.last(), Some(&PhysReg::R11));
        assert_eq!(regs.len(), 8);
    }

    #[test]
    fn test_reserved_regs_depend_on_frame_pointer() {
        let func = MachineFunction::new("f");
        let reserved = RegisterInfo::new(options(false)).reserved_regs(&func);
        assert_eq!(reserved.count(), 8);
        assert!(reserved.contains(PhysReg::Sp));
        assert!(reserved.contains(PhysReg::Cgb));
        assert!(!reserved.contains(PhysReg::Fp));

        let func = MachineFunction::new("g");
        let reserved = RegisterInfo::new(options(true)).reserved_regs(&func);
        assert_eq!(reserved.count(), 10);
        assert!(reserved.contains(PhysReg::Fp));
        assert!(reserved.contains(PhysReg::Fpb));
    }

    #[test]
    fn test_pointer_class_is_word_registers() {
        let info = RegisterInfo::new(TargetOptions::default());
        let class = info.pointer_reg_class();
        assert!(class.contains(PhysReg::R12));
        assert!(!class.contains(PhysReg::R12b));
    }

    #[test]
    fn test_eliminate_with_frame_pointer() {
        let mut func = MachineFunction::new("f");
        func.frame.stack_size = 20;
        let fi = func.frame.create_stack_object(2, -4);
        let bb = func.add_block("entry");
        func.block_mut(bb).unwrap().push(load_from_slot(fi, 0));

        let info = RegisterInfo::new(options(true));
        assert_eq!(info.frame_register(&func), PhysReg::Fp);
        info.eliminate_frame_index(&mut func, bb, 0, 1, 0).unwrap();

        let mi = &func.block(bb).unwrap().instrs[0];
        assert_eq!(mi.operands[1].reg(), Some(Reg::Phys(PhysReg::Fp)));
        assert_eq!(mi.operands[2].imm(), Some(0));
    }

    #[test]
    fn test_eliminate_without_frame_pointer_adds_stack_size() {
        let mut func = MachineFunction::new("f");
        func.frame.stack_size = 20;
        let fi = func.frame.create_stack_object(2, -4);
        let bb = func.add_block("entry");
        func.block_mut(bb).unwrap().push(load_from_slot(fi, 3));

        let info = RegisterInfo::new(options(false));
        info.eliminate_frame_index(&mut func, bb, 0, 1, 0).unwrap();

        let mi = &func.block(bb).unwrap().instrs[0];
        assert_eq!(mi.operands[1].reg(), Some(Reg::Phys(PhysReg::Sp)));
        // -4 + 2 (return address) + 20 (frame) + 3 (addend)
        assert_eq!(mi.operands[2].imm(), Some(21));
    }

    #[test]
    fn test_address_of_slot_expands_to_mov_and_sub() {
        let mut func = MachineFunction::new("f");
        func.frame.stack_size = 20;
        let fi = func.frame.create_stack_object(2, -10);
        let bb = func.add_block("entry");
        func.block_mut(bb).unwrap().push(
            MachineInstr::new(Opcode::Add16ri)
                .add_def(PhysReg::R12)
                .add_frame_index(fi)
                .add_imm(0)
                .add_reg(PhysReg::Sr, RegState::IMPLICIT_DEF),
        );

        let info = RegisterInfo::new(options(true));
        info.eliminate_frame_index(&mut func, bb, 0, 1, 0).unwrap();

        let instrs = &func.block(bb).unwrap().instrs;
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].opcode, Opcode::Mov16rr);
        assert_eq!(instrs[0].operands.len(), 2);
        assert_eq!(instrs[0].operands[1].reg(), Some(Reg::Phys(PhysReg::Fp)));
        assert_eq!(instrs[1].opcode, Opcode::Sub16ri);
        assert_eq!(instrs[1].operands[0].reg(), Some(Reg::Phys(PhysReg::R12)));
        // -10 + 2 + 2
        assert_eq!(instrs[1].operands[2].imm(), Some(6));
    }

    #[test]
    fn test_address_of_slot_above_frame_pointer_expands_to_mov_and_add() {
        let mut func = MachineFunction::new("f");
        func.frame.stack_size = 20;
        let fi = func.frame.create_stack_object(2, 4);
        let bb = func.add_block("entry");
        func.block_mut(bb).unwrap().push(
            MachineInstr::new(Opcode::Add16ri)
                .add_def(PhysReg::R12)
                .add_frame_index(fi)
                .add_imm(0)
                .add_reg(PhysReg::Sr, RegState::IMPLICIT_DEF),
        );

        let info = RegisterInfo::new(options(true));
        info.eliminate_frame_index(&mut func, bb, 0, 1, 0).unwrap();

        let instrs = &func.block(bb).unwrap().instrs;
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].opcode, Opcode::Mov16rr);
        assert_eq!(instrs[0].operands.len(), 2);
        assert_eq!(instrs[0].operands[0].reg(), Some(Reg::Phys(PhysReg::R12)));
        assert_eq!(instrs[0].operands[1].reg(), Some(Reg::Phys(PhysReg::Fp)));

        // 4 + 2 + 2
        let mut add = MachineInstr::new(Opcode::Add16ri)
            .add_def(PhysReg::R12)
            .add_use(PhysReg::R12)
            .add_imm(8)
            .add_reg(PhysReg::Sr, RegState::IMPLICIT_DEF);
        add.set_dead(3).unwrap();
        assert_eq!(instrs[1], add);
    }

    #[test]
    fn test_address_of_slot_with_zero_offset_is_plain_mov() {
        let mut func = MachineFunction::new("f");
        let fi = func.frame.create_stack_object(2, -4);
        let bb = func.add_block("entry");
        func.block_mut(bb).unwrap().push(
            MachineInstr::new(Opcode::Add16ri)
                .add_def(PhysReg::R12)
                .add_frame_index(fi)
                .add_imm(0),
        );

        let info = RegisterInfo::new(options(true));
        info.eliminate_frame_index(&mut func, bb, 0, 1, 0).unwrap();

        let instrs = &func.block(bb).unwrap().instrs;
        assert_eq!(instrs.len(), 1);
        assert_eq!(instrs[0].opcode, Opcode::Mov16rr);
    }

    #[test]
    fn test_pending_sp_adjustment_is_rejected() {
        let mut func = MachineFunction::new("f");
        let fi = func.frame.create_stack_object(2, -4);
        let bb = func.add_block("entry");
        func.block_mut(bb).unwrap().push(load_from_slot(fi, 0));

        let info = RegisterInfo::new(TargetOptions::default());
        assert_eq!(
            info.eliminate_frame_index(&mut func, bb, 0, 1, 4),
            Err(CodegenError::UnexpectedSpAdjustment(4))
        );
    }
}
