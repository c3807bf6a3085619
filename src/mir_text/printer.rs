//! Textual machine IR printer.
//!
//! Output is accepted by [`parse_module`](super::parse_module).

use crate::core::{MachineFunction, MachineInstr, Operand, Reg, RegState};
use crate::tnt::{CondCode, Opcode};
use std::fmt;

impl fmt::Display for MachineFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func @{} {{", self.name)?;

        let frame = &self.frame;
        if frame.stack_size != 0 {
            writeln!(f, "  stack_size {}", frame.stack_size)?;
        }
        if frame.offset_adjustment != 0 {
            writeln!(f, "  offset_adjustment {}", frame.offset_adjustment)?;
        }
        if frame.has_var_sized_objects {
            writeln!(f, "  var_sized_objects")?;
        }
        if frame.frame_address_taken {
            writeln!(f, "  frame_address_taken")?;
        }
        for object in frame.objects() {
            writeln!(f, "  object size={} offset={}", object.size, object.offset)?;
        }
        for object in frame.fixed_objects() {
            writeln!(f, "  fixed_object size={} offset={}", object.size, object.offset)?;
        }
        if !self.info.callee_saved.is_empty() {
            write!(f, "  callee_saved")?;
            for reg in &self.info.callee_saved {
                write!(f, " {reg}")?;
            }
            writeln!(f)?;
        }

        for block in self.blocks() {
            write!(f, "{}:", block.name)?;
            if !block.live_ins.is_empty() {
                let mut live_ins: Vec<_> = block.live_ins.iter().copied().collect();
                live_ins.sort();
                write!(f, "    ; live-ins:")?;
                for reg in live_ins {
                    write!(f, " {reg}")?;
                }
            }
            writeln!(f)?;
            for mi in &block.instrs {
                write!(f, "  ")?;
                write_instr(f, self, mi)?;
                writeln!(f)?;
            }
        }
        write!(f, "}}")
    }
}

fn write_reg(f: &mut fmt::Formatter<'_>, reg: Reg) -> fmt::Result {
    match reg {
        Reg::Phys(reg) => write!(f, "{reg}"),
        Reg::Virt(num) => write!(f, "%{num}"),
    }
}

fn write_flags(f: &mut fmt::Formatter<'_>, state: RegState, as_def: bool) -> fmt::Result {
    if state.def && state.implicit {
        write!(f, "implicit-def ")?;
    } else if state.implicit {
        write!(f, "implicit ")?;
    }
    if state.kill {
        write!(f, "killed ")?;
    }
    if state.dead && (as_def || state.def) {
        write!(f, "dead ")?;
    }
    Ok(())
}

fn write_instr(
    f: &mut fmt::Formatter<'_>,
    func: &MachineFunction<'_>,
    mi: &MachineInstr<'_>,
) -> fmt::Result {
    let num_defs = mi
        .operands
        .iter()
        .take_while(|op| op.is_def() && !op.is_implicit())
        .count();

    for (i, op) in mi.operands[..num_defs].iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        if let Operand::Reg { reg, state } = *op {
            write_flags(f, state, true)?;
            write_reg(f, reg)?;
        }
    }
    if num_defs > 0 {
        write!(f, " = ")?;
    }

    write!(f, "{}", mi.opcode)?;
    for (i, op) in mi.operands.iter().enumerate().skip(num_defs) {
        write!(f, "{}", if i == num_defs { " " } else { ", " })?;
        match *op {
            Operand::Reg { reg, state } => {
                write_flags(f, state, false)?;
                write_reg(f, reg)?;
            }
            Operand::Imm(value) => {
                let cc = (mi.opcode == Opcode::Jcc && i == 1)
                    .then(|| CondCode::from_imm(value))
                    .flatten();
                match cc {
                    Some(cc) => write!(f, "{cc}")?,
                    None => write!(f, "{value}")?,
                }
            }
            Operand::Symbol(name) => write!(f, "@{name}")?,
            Operand::Block(id) => match func.block(id) {
                Ok(block) => write!(f, "^{}", block.name)?,
                Err(_) => write!(f, "^bb.{}", id.0)?,
            },
            Operand::FrameIndex(fi) => write!(f, "fi#{}", fi.0)?,
        }
    }
    Ok(())
}
