// This module implements stack frame lowering for the TNT target. The FrameLowering trait is
// the capability interface the pipeline driver calls; TntFrameLowering is its only
// implementation. The frame pointer decision (FP kept when frame pointer elimination is
// disabled, the frame has variable-sized objects, or the frame address escapes) is computed
// once per function and cached in the frame descriptor, because all later offset arithmetic
// depends on it. The prologue pushes FP and copies SP into it when a frame pointer is used,
// then allocates the local area with a single SP decrement placed after the callee-saved
// pushes. Epilogues mirror that in every returning block. Callee-saved registers are pushed
// in reverse list order and popped in forward order. Call-frame pseudos are deleted when the
// call frame is reserved, or turned into explicit SP adjustments rounded to the stack
// alignment when it is not. The implicit SR definition of every SP adjustment is marked dead.
//
// Frame layout with a frame pointer (stack grows down, 2-byte slots):
//   fp + 2:  return address
//   fp:      saved fp
//   fp - 2:  callee-saved registers
//   ...:     locals, spill slots and outgoing arguments

//! TNT frame lowering.

use super::options::{TargetOptions, CALLEE_SAVE_SLOT_SIZE};
use super::{Opcode, PhysReg};
use crate::core::{
    BlockId, CodegenError, CodegenResult, MachineFunction, MachineInstr, RegState,
};

/// Size of the saved frame pointer slot in bytes.
const SAVED_FP_SIZE: u64 = 2;

/// Frame-relative offset of the saved frame pointer slot.
const SAVED_FP_OFFSET: i64 = -4;

/// Index of the implicit SR definition on SP adjustments.
const SR_OPERAND: usize = 3;

/// Frame pointer decision shared by frame lowering and register info.
pub(crate) fn has_fp(options: &TargetOptions, func: &MachineFunction<'_>) -> bool {
    func.frame.has_fp_or_decide(|| {
        options.disable_frame_pointer_elim
            || func.frame.has_var_sized_objects
            || func.frame.frame_address_taken
    })
}

/// Build `reg = OPC reg, amount, implicit-def dead sr`.
fn sp_style_adjust<'a>(opcode: Opcode, reg: PhysReg, amount: u64) -> CodegenResult<MachineInstr<'a>> {
    let mut mi = MachineInstr::new(opcode)
        .add_def(reg)
        .add_use(reg)
        .add_imm(amount as i64)
        .add_reg(PhysReg::Sr, RegState::IMPLICIT_DEF);
    // The SR implicit def is dead.
    mi.set_dead(SR_OPERAND)?;
    Ok(mi)
}

/// Frame lowering hooks invoked by the code generation pipeline.
pub trait FrameLowering {
    /// Whether the function keeps a dedicated frame pointer.
    fn has_fp(&self, func: &MachineFunction<'_>) -> bool;

    /// Whether the outgoing call argument area is part of the fixed frame.
    fn has_reserved_call_frame(&self, func: &MachineFunction<'_>) -> bool;

    /// Create fixed stack objects that must exist before frame layout is final.
    fn process_function_before_frame_finalized(
        &self,
        func: &mut MachineFunction<'_>,
    ) -> CodegenResult<()>;

    fn emit_prologue(&self, func: &mut MachineFunction<'_>, block: BlockId) -> CodegenResult<()>;

    fn emit_epilogue(&self, func: &mut MachineFunction<'_>, block: BlockId) -> CodegenResult<()>;

    /// Save `csi` before instruction `index` of `block`.
    ///
    /// Returns `false` when there was nothing to save.
    fn spill_callee_saved_registers(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        index: usize,
        csi: &[PhysReg],
    ) -> CodegenResult<bool>;

    /// Restore `csi` before instruction `index` of `block`.
    fn restore_callee_saved_registers(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        index: usize,
        csi: &[PhysReg],
    ) -> CodegenResult<bool>;

    /// Replace the call-frame pseudo at `index` of `block`.
    ///
    /// Returns the index of the instruction that followed the pseudo.
    fn eliminate_call_frame_pseudo(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        index: usize,
    ) -> CodegenResult<usize>;
}

/// TNT implementation of [`FrameLowering`].
#[derive(Debug, Clone, Copy)]
pub struct TntFrameLowering {
    options: TargetOptions,
}

impl TntFrameLowering {
    pub fn new(options: TargetOptions) -> Self {
        Self { options }
    }

    pub fn stack_alignment(&self) -> u64 {
        self.options.stack_alignment.max(1) as u64
    }

    /// Bytes the prologue allocates below the callee-saved area.
    fn local_area_size(&self, func: &MachineFunction<'_>) -> CodegenResult<u64> {
        let stack_size = func.frame.stack_size;
        let callee_saved = func.info.callee_saved_frame_size;
        let fixed = if self.has_fp(func) {
            callee_saved + SAVED_FP_SIZE
        } else {
            callee_saved
        };
        stack_size
            .checked_sub(fixed)
            .ok_or(CodegenError::InconsistentFrame {
                stack_size,
                required: fixed,
            })
    }

    fn round_to_alignment(&self, amount: u64) -> u64 {
        let align = self.stack_alignment();
        amount.div_ceil(align) * align
    }
}

impl FrameLowering for TntFrameLowering {
    fn has_fp(&self, func: &MachineFunction<'_>) -> bool {
        has_fp(&self.options, func)
    }

    fn has_reserved_call_frame(&self, func: &MachineFunction<'_>) -> bool {
        !func.frame.has_var_sized_objects
    }

    fn process_function_before_frame_finalized(
        &self,
        func: &mut MachineFunction<'_>,
    ) -> CodegenResult<()> {
        if !self.has_fp(func) {
            return Ok(());
        }

        // Create a frame entry for the FP register that must be saved.
        let fi = func
            .frame
            .create_fixed_object(SAVED_FP_SIZE, SAVED_FP_OFFSET);
        let begin = func.frame.object_index_begin();
        if fi.0 != begin {
            return Err(CodegenError::FramePointerSlot { index: fi.0, begin });
        }
        Ok(())
    }

    fn emit_prologue(&self, func: &mut MachineFunction<'_>, block: BlockId) -> CodegenResult<()> {
        let entry = func.entry().ok_or(CodegenError::UnknownBlock(block.0))?;
        if entry != block {
            return Err(CodegenError::ShrinkWrapping {
                block: block.0,
                entry: entry.0,
            });
        }

        let has_fp = self.has_fp(func);
        let num_bytes = self.local_area_size(func)?;
        let mut insert_at = 0;

        if has_fp {
            func.frame.offset_adjustment = -(num_bytes as i64);

            let layout = func.layout().to_vec();
            let mbb = func.block_mut(block)?;
            // Save FP into the appropriate stack slot, then set up the new base.
            mbb.insert(
                0,
                MachineInstr::new(Opcode::Push16r).add_reg(PhysReg::Fp, RegState::KILL),
            );
            mbb.insert(
                1,
                MachineInstr::new(Opcode::Mov16rr)
                    .add_def(PhysReg::Fp)
                    .add_use(PhysReg::Sp),
            );
            insert_at = 2;

            // FP is defined here and live into every other block.
            for id in layout.into_iter().skip(1) {
                func.block_mut(id)?.add_live_in(PhysReg::Fp);
            }
        }

        let mbb = func.block_mut(block)?;
        // Skip the callee-saved push instructions.
        while insert_at < mbb.instrs.len() && mbb.instrs[insert_at].opcode == Opcode::Push16r {
            insert_at += 1;
        }

        if num_bytes != 0 {
            mbb.insert(insert_at, sp_style_adjust(Opcode::Sub16ri, PhysReg::Sp, num_bytes)?);
        }

        log::debug!(
            "prologue for {}: has_fp={}, stack_size={}, callee_saved={}, local_area={}",
            func.name,
            has_fp,
            func.frame.stack_size,
            func.info.callee_saved_frame_size,
            num_bytes
        );
        Ok(())
    }

    fn emit_epilogue(&self, func: &mut MachineFunction<'_>, block: BlockId) -> CodegenResult<()> {
        let has_fp = self.has_fp(func);
        let has_var_sized = func.frame.has_var_sized_objects;
        let callee_saved = func.info.callee_saved_frame_size;

        let mbb = func.block(block)?;
        let terminator = match mbb.last() {
            Some(mi) if mi.opcode.is_return() => mi.opcode,
            Some(mi) => {
                return Err(CodegenError::NotAReturnBlock {
                    block: block.0,
                    terminator: mi.opcode.name(),
                })
            }
            None => {
                return Err(CodegenError::NotAReturnBlock {
                    block: block.0,
                    terminator: "<empty>",
                })
            }
        };

        let num_bytes = self.local_area_size(func)?;
        let mbb = func.block_mut(block)?;
        let mut mbbi = mbb.instrs.len() - 1;

        if has_fp {
            mbb.insert(mbbi, MachineInstr::new(Opcode::Pop16r).add_def(PhysReg::Fp));
            mbbi += 1;
        }

        // Skip the callee-saved pop instructions.
        while mbbi > 0 {
            let prev = &mbb.instrs[mbbi - 1];
            if prev.opcode != Opcode::Pop16r && !prev.is_terminator() {
                break;
            }
            mbbi -= 1;
        }

        if has_var_sized {
            mbb.insert(
                mbbi,
                MachineInstr::new(Opcode::Mov16rr)
                    .add_def(PhysReg::Sp)
                    .add_use(PhysReg::Fp),
            );
            if callee_saved != 0 {
                mbb.insert(
                    mbbi + 1,
                    sp_style_adjust(Opcode::Sub16ri, PhysReg::Sp, callee_saved)?,
                );
            }
        } else if num_bytes != 0 {
            // Adjust stack pointer back: SP += num_bytes.
            mbb.insert(mbbi, sp_style_adjust(Opcode::Add16ri, PhysReg::Sp, num_bytes)?);
        }

        log::trace!(
            "epilogue in bb.{} before {}: has_fp={}, var_sized={}",
            block.0,
            terminator,
            has_fp,
            has_var_sized
        );
        Ok(())
    }

    fn spill_callee_saved_registers(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        index: usize,
        csi: &[PhysReg],
    ) -> CodegenResult<bool> {
        if csi.is_empty() {
            return Ok(false);
        }

        func.info.callee_saved_frame_size = csi.len() as u64 * CALLEE_SAVE_SLOT_SIZE as u64;
        let mbb = func.block_mut(block)?;
        for (k, &reg) in csi.iter().rev().enumerate() {
            // The callee-saved register is live-in; it's killed at the spill.
            mbb.add_live_in(reg);
            mbb.insert(
                index + k,
                MachineInstr::new(Opcode::Push16r).add_reg(reg, RegState::KILL),
            );
        }
        Ok(true)
    }

    fn restore_callee_saved_registers(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        index: usize,
        csi: &[PhysReg],
    ) -> CodegenResult<bool> {
        if csi.is_empty() {
            return Ok(false);
        }

        let mbb = func.block_mut(block)?;
        for (k, &reg) in csi.iter().enumerate() {
            mbb.insert(index + k, MachineInstr::new(Opcode::Pop16r).add_def(reg));
        }
        Ok(true)
    }

    fn eliminate_call_frame_pseudo(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        index: usize,
    ) -> CodegenResult<usize> {
        let reserved = self.has_reserved_call_frame(func);
        let mbb = func.block_mut(block)?;
        let old = mbb
            .instrs
            .get(index)
            .ok_or(CodegenError::NoInstruction {
                block: block.0,
                index,
            })?;
        let opcode = old.opcode;
        if !matches!(opcode, Opcode::AdjCallStackDown | Opcode::AdjCallStackUp) {
            return Err(old.malformed(0, "a call frame pseudo"));
        }

        let amount = old.imm_operand(0)?;
        let callee_amount = if opcode == Opcode::AdjCallStackUp {
            old.imm_operand(1)?
        } else {
            0
        };

        let mut replacement = None;
        if !reserved {
            // The SP can change after the prologue: setup becomes
            // `sub sp, amt` and destroy becomes `add sp, amt`.
            if amount != 0 {
                let amount = self.round_to_alignment(amount as u64) as i64;
                if opcode == Opcode::AdjCallStackDown {
                    replacement = Some(sp_style_adjust(Opcode::Sub16ri, PhysReg::Sp, amount as u64)?);
                } else {
                    // Factor out the amount the callee already popped.
                    let remaining = amount - callee_amount;
                    if remaining > 0 {
                        replacement =
                            Some(sp_style_adjust(Opcode::Add16ri, PhysReg::Sp, remaining as u64)?);
                    }
                }
            }
        } else if opcode == Opcode::AdjCallStackUp && callee_amount != 0 {
            // The callee popped part of a reserved frame; add it back.
            replacement = Some(sp_style_adjust(
                Opcode::Sub16ri,
                PhysReg::Sp,
                callee_amount as u64,
            )?);
        }

        let mut next = index;
        if let Some(mi) = replacement {
            log::trace!("{} replaced by {} {}", opcode, mi.opcode, mi.operands[2].imm().unwrap_or(0));
            mbb.insert(index, mi);
            next += 1;
        }
        mbb.instrs.remove(next);
        Ok(next)
    }
}
