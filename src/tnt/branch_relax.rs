// This module implements the TNT branch relaxation pass, the last transformation before
// encoding. Short branches (JCC and JMP) carry a 10-bit signed displacement; any branch whose
// target lies outside that range is rewritten into a long form. An out-of-range JMP becomes a
// Bi. An out-of-range JCC becomes a JCC on the inverted condition that skips 4 bytes, followed
// by a Bi to the original target:
//
//   short:  jcc  cc, target
//   long:   jcc  !cc, $+4
//           bi   target
//
// The pass renumbers blocks, measures each block with the emitter's size oracle and returns
// early when the whole function is smaller than the branch field's reach. Otherwise it scans
// every block repeatedly, growing the recorded block sizes as it relaxes, until a full scan
// makes no change. Growth is monotonic and every branch is relaxed at most once, so the loop
// is capped at one iteration per candidate branch plus a final quiet scan.

//! Branch relaxation for out-of-range short branches.

use super::emitter::CodeEmitter;
use super::{CondCode, Opcode};
use crate::core::{BlockId, CodegenError, CodegenResult, MachineFunction, MachineInstr, Operand};

/// Functions smaller than this never need relaxation.
const BRANCH_REACH: u32 = 1 << 9;

/// Width of the short branch displacement field in bits.
const SHORT_DISPLACEMENT_BITS: u32 = 10;

const SHORT_BRANCH_SIZE: u32 = 2;
const LONG_JUMP_SIZE: u32 = 4;
const LONG_CONDITIONAL_SIZE: u32 = 6;

/// Bytes the inverted branch of a long conditional skips.
const SKIP_LONG_BRANCH: i64 = 4;

fn fits_in_signed(value: i64, bits: u32) -> bool {
    let limit = 1i64 << (bits - 1);
    (-limit..limit).contains(&value)
}

/// Invert the condition code held in a JCC condition operand.
pub fn reverse_branch_condition(cond: &mut Operand<'_>) -> bool {
    let Some(cc) = cond.imm().and_then(CondCode::from_imm) else {
        return false;
    };
    cond.change_to_immediate(cc.invert() as i64);
    true
}

/// Short branches whose target is still a basic block.
fn is_relaxable(mi: &MachineInstr<'_>) -> bool {
    match mi.opcode {
        Opcode::Jcc => !matches!(mi.operands.first(), Some(Operand::Imm(_))),
        Opcode::Jmp => true,
        _ => false,
    }
}

/// Outcome of one relaxation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaxationStats {
    /// Number of branches expanded to long format.
    pub expanded: usize,
    /// Full scans performed; zero when the function was small enough.
    pub iterations: usize,
}

/// Branch relaxation pass over one function.
pub struct BranchRelaxation<'e, E: CodeEmitter> {
    emitter: &'e E,
}

impl<'e, E: CodeEmitter> BranchRelaxation<'e, E> {
    pub fn new(emitter: &'e E) -> Self {
        Self { emitter }
    }

    fn block_size(&self, func: &MachineFunction<'_>, id: BlockId) -> CodegenResult<u32> {
        Ok(func
            .block(id)?
            .instrs
            .iter()
            .map(|mi| self.emitter.size_in_bytes(mi))
            .sum())
    }

    pub fn run(&self, func: &mut MachineFunction<'_>) -> CodegenResult<RelaxationStats> {
        // Give the blocks of the function a dense, in-order numbering.
        func.renumber_blocks();
        let layout = func.layout().to_vec();

        let mut block_sizes = vec![0u32; layout.len()];
        let mut numbers = vec![0usize; func.num_block_ids()];
        let mut func_size = 0u32;
        let mut candidates = 0usize;
        for &id in &layout {
            let number = func.block(id)?.number as usize;
            let size = self.block_size(func, id)?;
            block_sizes[number] = size;
            numbers[id.index()] = number;
            func_size += size;
            candidates += func.block(id)?.instrs.iter().filter(|mi| is_relaxable(mi)).count();
        }

        if func_size < BRANCH_REACH {
            log::debug!(
                "{}: {} bytes is within branch reach, skipping relaxation",
                func.name,
                func_size
            );
            return Ok(RelaxationStats::default());
        }

        let limit = candidates + 1;
        let mut stats = RelaxationStats::default();
        let mut made_change = true;
        while made_change {
            if stats.iterations == limit {
                return Err(CodegenError::RelaxationDidNotConverge {
                    iterations: stats.iterations,
                });
            }
            made_change = false;
            stats.iterations += 1;

            for &id in &layout {
                let cur = numbers[id.index()];
                let mut offset: i64 = 0;
                let mut index = 0;

                while let Some(mi) = func.block(id)?.instrs.get(index) {
                    if !is_relaxable(mi) {
                        offset += i64::from(self.emitter.size_in_bytes(mi));
                        index += 1;
                        continue;
                    }

                    let dest = mi
                        .operand(0)?
                        .block()
                        .ok_or(mi.malformed(0, "a basic block"))?;
                    let dest_num = *numbers
                        .get(dest.index())
                        .ok_or(CodegenError::UnknownBlock(dest.0))?;

                    let displacement = if dest_num <= cur {
                        // Backwards: from this block's start to the branch,
                        // plus every block from the destination up to here.
                        offset + block_sizes[dest_num..cur].iter().map(|&s| i64::from(s)).sum::<i64>()
                    } else {
                        // Forwards: the rest of this block plus every block
                        // before the destination.
                        -offset + block_sizes[cur..dest_num].iter().map(|&s| i64::from(s)).sum::<i64>()
                    };

                    if fits_in_signed(displacement, SHORT_DISPLACEMENT_BITS) {
                        offset += i64::from(SHORT_BRANCH_SIZE);
                        index += 1;
                        continue;
                    }

                    let opcode = mi.opcode;
                    let mut long_form = Vec::with_capacity(2);
                    let new_size = if opcode == Opcode::Jmp {
                        LONG_JUMP_SIZE
                    } else {
                        // Jump over the long branch on the opposite condition.
                        let mut cond = *mi.operand(1)?;
                        if !reverse_branch_condition(&mut cond) {
                            return Err(mi.malformed(1, "a condition code"));
                        }
                        long_form.push(
                            MachineInstr::new(Opcode::Jcc)
                                .add_imm(SKIP_LONG_BRANCH)
                                .add_imm(cond.imm().unwrap_or_default()),
                        );
                        LONG_CONDITIONAL_SIZE
                    };
                    long_form.push(MachineInstr::new(Opcode::Bi).add_block(dest));

                    let inserted = long_form.len();
                    func.block_mut(id)?.instrs.splice(index..=index, long_form);
                    index += inserted;

                    block_sizes[cur] += new_size - SHORT_BRANCH_SIZE;
                    offset += i64::from(new_size);
                    stats.expanded += 1;
                    made_change = true;

                    log::trace!(
                        "{}: expanded {} in bb.{} to bb.{} (displacement {})",
                        func.name,
                        opcode,
                        cur,
                        dest_num,
                        displacement
                    );
                }
            }
        }

        log::debug!(
            "{}: relaxation expanded {} branches in {} iterations",
            func.name,
            stats.expanded,
            stats.iterations
        );
        Ok(stats)
    }
}
