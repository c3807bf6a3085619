// This module drives code generation for one machine function through the TNT backend. The
// pipeline takes a function that has been through instruction selection and register
// allocation (physical registers only, frame indices still abstract, call-frame pseudos still
// present) and runs the target passes in their fixed order: the frame pointer decision, the
// fixed FP slot, callee-saved spills in the entry block and restores before every return,
// the prologue and the epilogues, then a single walk that eliminates call-frame pseudos and
// resolves frame index operands while tracking the pending SP adjustment of the surrounding
// call sequence. Branch relaxation runs last, and the encoder then produces a flat byte
// stream with per-block offsets and fixups rebased to function-relative offsets. Each pass is
// strictly sequential and owns the function exclusively while it runs. The first contract
// violation aborts the function with a CodegenError; statistics are recorded in the session
// only for functions that encode successfully.

//! Per-function code generation pipeline.

use super::branch_relax::{BranchRelaxation, RelaxationStats};
use super::emitter::CodeEmitter;
use super::fixup::{elf_reloc_type, Fixup, FixupTarget};
use super::frame_lowering::FrameLowering;
use super::target::TntTarget;
use super::Opcode;
use crate::core::{BlockId, CodegenResult, CodegenSession, MachineFunction};

/// A relocation record for the object writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation<'a> {
    /// Byte offset within the function.
    pub offset: u32,
    pub symbol: &'a str,
    /// ELF `r_type`.
    pub r_type: u32,
}

/// Machine code for one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFunction<'a> {
    pub name: &'a str,
    pub bytes: Vec<u8>,
    /// Fixups with function-relative offsets.
    pub fixups: Vec<Fixup<'a>>,
    /// Start offset of every block, in layout order.
    pub block_offsets: Vec<(BlockId, u32)>,
    pub relaxation: RelaxationStats,
}

impl<'a> EncodedFunction<'a> {
    pub fn block_offset(&self, id: BlockId) -> Option<u32> {
        self.block_offsets
            .iter()
            .find(|(block, _)| *block == id)
            .map(|(_, offset)| *offset)
    }

    /// Relocations for every symbol fixup.
    ///
    /// Block fixups are resolved inside the section and are not listed.
    pub fn relocations(&self) -> CodegenResult<Vec<Relocation<'a>>> {
        let mut relocs = Vec::new();
        for fixup in &self.fixups {
            if let FixupTarget::Symbol(symbol) = fixup.target {
                relocs.push(Relocation {
                    offset: fixup.offset,
                    symbol,
                    r_type: elf_reloc_type(fixup.kind, fixup.pc_relative)?,
                });
            }
        }
        Ok(relocs)
    }
}

/// Runs the TNT passes over machine functions.
pub struct CodegenPipeline<'t, 's, 'arena> {
    target: &'t TntTarget,
    session: &'s CodegenSession<'arena>,
}

impl<'t, 's, 'arena> CodegenPipeline<'t, 's, 'arena> {
    pub fn new(target: &'t TntTarget, session: &'s CodegenSession<'arena>) -> Self {
        Self { target, session }
    }

    /// Frame lowering: callee-saved registers, prologue and epilogues,
    /// call-frame pseudos and frame indices.
    pub fn lower_frame(&self, func: &mut MachineFunction<'_>) -> CodegenResult<()> {
        let tfl = self.target.frame_lowering();
        let tri = self.target.register_info();

        let has_fp = tfl.has_fp(func);
        tfl.process_function_before_frame_finalized(func)?;

        let Some(entry) = func.entry() else {
            log::debug!("{}: no blocks, nothing to lower", func.name);
            return Ok(());
        };
        let layout = func.layout().to_vec();
        let returns: Vec<BlockId> = layout
            .iter()
            .copied()
            .filter(|&id| {
                func.block(id)
                    .ok()
                    .and_then(|b| b.last())
                    .is_some_and(|mi| mi.opcode.is_return())
            })
            .collect();

        let csi = func.info.callee_saved.clone();
        for reg in &csi {
            if !tri.callee_saved_regs().contains(reg) {
                log::warn!("{}: {} is saved but is not a callee-saved register", func.name, reg);
            }
        }
        if has_fp && csi.contains(&super::PhysReg::Fp) {
            log::warn!("{}: fp is both frame pointer and callee-saved", func.name);
        }

        tfl.spill_callee_saved_registers(func, entry, 0, &csi)?;
        for &id in &returns {
            let at = func.block(id)?.first_terminator();
            tfl.restore_callee_saved_registers(func, id, at, &csi)?;
        }

        tfl.emit_prologue(func, entry)?;
        for &id in &returns {
            tfl.emit_epilogue(func, id)?;
        }

        let align = tfl.stack_alignment() as i64;
        for &id in &layout {
            let mut sp_adj: i64 = 0;
            let mut index = 0;
            while let Some(mi) = func.block(id)?.instrs.get(index) {
                match mi.opcode {
                    Opcode::AdjCallStackDown | Opcode::AdjCallStackUp => {
                        let amount = mi.imm_operand(0)?;
                        let aligned = (amount + align - 1) / align * align;
                        if mi.opcode == Opcode::AdjCallStackDown {
                            sp_adj += aligned;
                        } else {
                            sp_adj -= aligned;
                        }
                        index = tfl.eliminate_call_frame_pseudo(func, id, index)?;
                    }
                    _ => {
                        let frame_operands: Vec<usize> = mi
                            .operands
                            .iter()
                            .enumerate()
                            .filter(|(_, op)| op.frame_index().is_some())
                            .map(|(i, _)| i)
                            .collect();
                        for operand in frame_operands {
                            tri.eliminate_frame_index(func, id, index, operand, sp_adj)?;
                        }
                        index += 1;
                    }
                }
            }
        }

        log::debug!(
            "{}: frame lowered (has_fp={}, stack_size={}, callee_saved={:?})",
            func.name,
            has_fp,
            func.frame.stack_size,
            csi
        );
        Ok(())
    }

    /// Lower, relax and encode `func`.
    pub fn run<'a>(&self, func: &mut MachineFunction<'a>) -> CodegenResult<EncodedFunction<'a>> {
        self.lower_frame(func)?;

        let emitter = self.target.emitter();
        let relaxation = BranchRelaxation::new(emitter).run(func)?;

        let mut bytes = Vec::new();
        let mut fixups = Vec::new();
        let mut block_offsets = Vec::with_capacity(func.layout().len());
        let mut instructions = 0;
        for block in func.blocks() {
            block_offsets.push((block.id, bytes.len() as u32));
            for mi in &block.instrs {
                let encoded = emitter.encode(mi)?;
                let base = bytes.len() as u32;
                fixups.extend(encoded.fixups.into_iter().map(|f| f.shifted(base)));
                bytes.extend_from_slice(&encoded.bytes);
                instructions += 1;
            }
        }

        self.session
            .record_function(instructions, bytes.len(), fixups.len());
        self.session
            .record_relaxation(relaxation.expanded, relaxation.iterations);
        log::debug!(
            "{}: encoded {} instructions into {} bytes with {} fixups",
            func.name,
            instructions,
            bytes.len(),
            fixups.len()
        );

        Ok(EncodedFunction {
            name: func.name,
            bytes,
            fixups,
            block_offsets,
            relaxation,
        })
    }
}
