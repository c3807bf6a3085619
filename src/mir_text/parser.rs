//! Textual machine IR parser.

use super::ParseError;
use crate::core::{
    BlockId, CodegenSession, FrameIndex, MachineFunction, MachineInstr, Operand, Reg, RegState,
};
use crate::tnt::{CondCode, Opcode, PhysReg};
use hashbrown::HashMap;

/// Parse every function in `text`, interning names in the session arena.
pub fn parse_module<'arena>(
    text: &str,
    session: &CodegenSession<'arena>,
) -> Result<Vec<MachineFunction<'arena>>, ParseError> {
    Parser::new(text, session).parse()
}

#[derive(Debug, Clone, Copy)]
struct Line<'t> {
    /// 1-based line number.
    number: usize,
    text: &'t str,
}

struct Parser<'t, 's, 'arena> {
    lines: Vec<Line<'t>>,
    pos: usize,
    session: &'s CodegenSession<'arena>,

    // Per-function maps
    blocks: HashMap<&'t str, BlockId>,
}

fn label_name(text: &str) -> Option<&str> {
    let name = text.strip_suffix(':')?;
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        Some(name)
    } else {
        None
    }
}

impl<'t, 's, 'arena> Parser<'t, 's, 'arena> {
    fn new(text: &'t str, session: &'s CodegenSession<'arena>) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, raw)| {
                // Strip comments.
                let code = raw.split(';').next().unwrap_or_default();
                Line {
                    number: i + 1,
                    text: code.trim(),
                }
            })
            .filter(|line| !line.text.is_empty())
            .collect();

        Self {
            lines,
            pos: 0,
            session,
            blocks: HashMap::new(),
        }
    }

    fn parse(mut self) -> Result<Vec<MachineFunction<'arena>>, ParseError> {
        let mut functions = Vec::new();
        while self.pos < self.lines.len() {
            functions.push(self.parse_function()?);
        }
        log::debug!("parsed {} functions", functions.len());
        Ok(functions)
    }

    fn parse_function(&mut self) -> Result<MachineFunction<'arena>, ParseError> {
        let header = self.lines[self.pos];
        self.pos += 1;

        let name = header
            .text
            .strip_prefix("func")
            .and_then(|rest| rest.trim_start().strip_prefix('@'))
            .and_then(|rest| rest.strip_suffix('{'))
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.contains(char::is_whitespace))
            .ok_or_else(|| ParseError::Expected {
                line: header.number,
                expected: "`func @name {`",
                found: header.text.to_string(),
            })?;

        let body_start = self.pos;
        let body_end = self.lines[body_start..]
            .iter()
            .position(|line| line.text == "}")
            .map(|n| body_start + n)
            .ok_or_else(|| ParseError::Unterminated {
                line: header.number,
                name: name.to_string(),
            })?;
        self.pos = body_end + 1;

        let mut func = MachineFunction::new(self.session.intern_str(name));
        let body = self.lines[body_start..body_end].to_vec();

        // Create every block up front so branches may refer forward.
        self.blocks.clear();
        for line in &body {
            if let Some(label) = label_name(line.text) {
                if self.blocks.contains_key(label) {
                    return Err(ParseError::DuplicateBlock {
                        line: line.number,
                        name: label.to_string(),
                    });
                }
                self.blocks.insert(label, func.add_block(label));
            }
        }

        let mut current = None;
        for &line in &body {
            if let Some(label) = label_name(line.text) {
                current = self.blocks.get(label).copied();
                continue;
            }
            match current {
                None => self.parse_directive(&mut func, line)?,
                Some(block) => {
                    let mi = self.parse_instruction(line)?;
                    func.block_mut(block)
                        .map_err(|_| ParseError::UndefinedBlock {
                            line: line.number,
                            name: line.text.to_string(),
                        })?
                        .push(mi);
                }
            }
        }

        log::trace!(
            "parsed function {} with {} blocks",
            func.name,
            func.layout().len()
        );
        Ok(func)
    }

    fn parse_directive(
        &self,
        func: &mut MachineFunction<'arena>,
        line: Line<'t>,
    ) -> Result<(), ParseError> {
        let mut words = line.text.split_whitespace();
        let keyword = words.next().unwrap_or_default();
        match keyword {
            "stack_size" => {
                let value = self.expect_word(line, words.next(), "a stack size")?;
                func.frame.stack_size = parse_number(line, value)? as u64;
            }
            "offset_adjustment" => {
                let value = self.expect_word(line, words.next(), "an offset adjustment")?;
                func.frame.offset_adjustment = parse_number(line, value)?;
            }
            "var_sized_objects" => func.frame.has_var_sized_objects = true,
            "frame_address_taken" => func.frame.frame_address_taken = true,
            "object" | "fixed_object" => {
                let mut size = None;
                let mut offset = None;
                for word in words {
                    match word.split_once('=') {
                        Some(("size", value)) => size = Some(parse_number(line, value)? as u64),
                        Some(("offset", value)) => offset = Some(parse_number(line, value)?),
                        _ => {
                            return Err(ParseError::Expected {
                                line: line.number,
                                expected: "`size=N` or `offset=N`",
                                found: word.to_string(),
                            })
                        }
                    }
                }
                let size = size.ok_or_else(|| self.missing(line, "an object size"))?;
                let offset = offset.ok_or_else(|| self.missing(line, "an object offset"))?;
                if keyword == "object" {
                    func.frame.create_stack_object(size, offset);
                } else {
                    func.frame.create_fixed_object(size, offset);
                }
            }
            "callee_saved" => {
                for word in words {
                    let reg = PhysReg::from_name(word).ok_or_else(|| ParseError::Expected {
                        line: line.number,
                        expected: "a register",
                        found: word.to_string(),
                    })?;
                    func.info.callee_saved.push(reg);
                }
            }
            _ => {
                return Err(ParseError::OutsideBlock {
                    line: line.number,
                    text: line.text.to_string(),
                })
            }
        }
        Ok(())
    }

    fn missing(&self, line: Line<'t>, expected: &'static str) -> ParseError {
        ParseError::Expected {
            line: line.number,
            expected,
            found: line.text.to_string(),
        }
    }

    fn expect_word(
        &self,
        line: Line<'t>,
        word: Option<&'t str>,
        expected: &'static str,
    ) -> Result<&'t str, ParseError> {
        word.ok_or_else(|| self.missing(line, expected))
    }

    fn parse_instruction(&self, line: Line<'t>) -> Result<MachineInstr<'arena>, ParseError> {
        let (defs, rest) = match line.text.split_once('=') {
            Some((defs, rest)) => (Some(defs), rest.trim()),
            None => (None, line.text),
        };

        let (name, uses) = match rest.split_once(char::is_whitespace) {
            Some((name, uses)) => (name, uses.trim()),
            None => (rest, ""),
        };
        let opcode = Opcode::from_name(name).ok_or_else(|| ParseError::UnknownOpcode {
            line: line.number,
            name: name.to_string(),
        })?;

        let mut mi = MachineInstr::new(opcode);
        if let Some(defs) = defs {
            for def in defs.split(',') {
                let op = self.parse_operand(line, def.trim())?;
                match op {
                    Operand::Reg { reg, mut state } => {
                        state.def = true;
                        mi.operands.push(Operand::Reg { reg, state });
                    }
                    _ => {
                        return Err(ParseError::Expected {
                            line: line.number,
                            expected: "a register definition",
                            found: def.trim().to_string(),
                        })
                    }
                }
            }
        }

        if !uses.is_empty() {
            for operand in uses.split(',') {
                mi.operands.push(self.parse_operand(line, operand.trim())?);
            }
        }
        Ok(mi)
    }

    fn parse_operand(&self, line: Line<'t>, text: &'t str) -> Result<Operand<'arena>, ParseError> {
        let mut words: Vec<&str> = text.split_whitespace().collect();
        let value = words.pop().ok_or_else(|| self.missing(line, "an operand"))?;

        let mut state = RegState::USE;
        for flag in &words {
            match *flag {
                "implicit-def" => {
                    state.def = true;
                    state.implicit = true;
                }
                "implicit" => state.implicit = true,
                "killed" => state.kill = true,
                "dead" => state.dead = true,
                other => {
                    return Err(ParseError::Expected {
                        line: line.number,
                        expected: "an operand flag",
                        found: other.to_string(),
                    })
                }
            }
        }

        let reg = if let Some(num) = value.strip_prefix('%') {
            let num = num.parse().map_err(|_| ParseError::InvalidNumber {
                line: line.number,
                text: value.to_string(),
            })?;
            Some(Reg::Virt(num))
        } else {
            PhysReg::from_name(value).map(Reg::Phys)
        };
        if let Some(reg) = reg {
            return Ok(Operand::Reg { reg, state });
        }
        if !words.is_empty() {
            return Err(ParseError::Expected {
                line: line.number,
                expected: "a register after operand flags",
                found: text.to_string(),
            });
        }

        if let Some(symbol) = value.strip_prefix('@') {
            return Ok(Operand::Symbol(self.session.intern_str(symbol)));
        }
        if let Some(block) = value.strip_prefix('^') {
            let id = self
                .blocks
                .get(block)
                .copied()
                .ok_or_else(|| ParseError::UndefinedBlock {
                    line: line.number,
                    name: block.to_string(),
                })?;
            return Ok(Operand::Block(id));
        }
        if let Some(index) = value.strip_prefix("fi#") {
            let index = parse_number(line, index)?;
            let index = i32::try_from(index).map_err(|_| ParseError::InvalidNumber {
                line: line.number,
                text: value.to_string(),
            })?;
            return Ok(Operand::FrameIndex(FrameIndex(index)));
        }
        if let Some(cc) = CondCode::from_mnemonic(value) {
            return Ok(Operand::Imm(cc as i64));
        }
        if value.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
            return Ok(Operand::Imm(parse_number(line, value)?));
        }

        Err(ParseError::Expected {
            line: line.number,
            expected: "an operand",
            found: value.to_string(),
        })
    }
}

/// Decimal or `0x` hexadecimal, optionally negative.
fn parse_number(line: Line<'_>, text: &str) -> Result<i64, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        line: line.number,
        text: text.to_string(),
    };
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid())?,
        None => digits.parse::<u64>().map_err(|_| invalid())?,
    };
    let value = magnitude as i64;
    Ok(if negative { value.wrapping_neg() } else { value })
}
