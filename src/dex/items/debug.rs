//! `debug_info_item`: the line number and local variable state machine of one method.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        instruction::Relocation,
        item::{measure, Item, SortContext},
        items::{StringIdItem, TypeIdItem},
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{
        parser::{Parser, Register},
        writer::Writer,
    },
    utils::math::to_u32,
    Result,
};

const DBG_END_SEQUENCE: u8 = 0x00;
const DBG_ADVANCE_PC: u8 = 0x01;
const DBG_ADVANCE_LINE: u8 = 0x02;
const DBG_START_LOCAL: u8 = 0x03;
const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
const DBG_END_LOCAL: u8 = 0x05;
const DBG_RESTART_LOCAL: u8 = 0x06;
const DBG_SET_PROLOGUE_END: u8 = 0x07;
const DBG_SET_EPILOGUE_BEGIN: u8 = 0x08;
const DBG_SET_FILE: u8 = 0x09;
const DBG_FIRST_SPECIAL: u8 = 0x0A;

/// One state machine instruction.
///
/// Instructions without index or register operands are kept as their raw bytes, so they are
/// reproduced exactly as read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebugInstruction {
    /// `DBG_START_LOCAL`
    StartLocal {
        /// Register holding the local
        register: Register,
        /// Local name
        name: Option<Id<StringIdItem>>,
        /// Local type
        ty: Option<Id<TypeIdItem>>,
    },
    /// `DBG_START_LOCAL_EXTENDED`
    StartLocalExtended {
        /// Register holding the local
        register: Register,
        /// Local name
        name: Option<Id<StringIdItem>>,
        /// Local type
        ty: Option<Id<TypeIdItem>>,
        /// Generic signature
        signature: Option<Id<StringIdItem>>,
    },
    /// `DBG_END_LOCAL`
    EndLocal(Register),
    /// `DBG_RESTART_LOCAL`
    RestartLocal(Register),
    /// `DBG_SET_FILE`
    SetFile(Option<Id<StringIdItem>>),
    /// Any other instruction, opcode included
    Raw(Vec<u8>),
}

impl DebugInstruction {
    /// A raw `DBG_ADVANCE_PC`.
    #[must_use]
    pub fn advance_pc(delta: u32) -> Self {
        let mut out = Writer::new(false);
        out.write_le(DBG_ADVANCE_PC);
        out.write_uleb128(delta);
        DebugInstruction::Raw(out.into_parts().0)
    }

    /// A raw `DBG_ADVANCE_LINE`.
    #[must_use]
    pub fn advance_line(delta: i32) -> Self {
        let mut out = Writer::new(false);
        out.write_le(DBG_ADVANCE_LINE);
        out.write_sleb128(delta);
        DebugInstruction::Raw(out.into_parts().0)
    }

    /// `DBG_SET_PROLOGUE_END`.
    #[must_use]
    pub fn prologue_end() -> Self {
        DebugInstruction::Raw(vec![DBG_SET_PROLOGUE_END])
    }

    /// `DBG_SET_EPILOGUE_BEGIN`.
    #[must_use]
    pub fn epilogue_begin() -> Self {
        DebugInstruction::Raw(vec![DBG_SET_EPILOGUE_BEGIN])
    }

    /// A special opcode advancing the address by `address` units and the line by `line`,
    /// or `None` when the pair is out of the special opcodes' range.
    #[must_use]
    pub fn special(address: u8, line: i8) -> Option<Self> {
        if !(-4..=10).contains(&line) {
            return None;
        }
        let adjusted = u16::from((line + 4).unsigned_abs());
        let opcode = u16::from(address) * 15 + adjusted + u16::from(DBG_FIRST_SPECIAL);
        u8::try_from(opcode)
            .ok()
            .map(|opcode| DebugInstruction::Raw(vec![opcode]))
    }

    /// Address advance of this instruction, and the line advance of a special opcode.
    fn address_step(&self) -> Result<Option<(u32, Option<i8>)>> {
        let DebugInstruction::Raw(bytes) = self else {
            return Ok(None);
        };
        Ok(match bytes.as_slice() {
            [DBG_ADVANCE_PC, operand @ ..] => Some((Parser::new(operand).read_uleb128()?, None)),
            &[opcode] if opcode >= DBG_FIRST_SPECIAL => {
                let adjusted = opcode - DBG_FIRST_SPECIAL;
                let line = i8::try_from(adjusted % 15).unwrap_or_default() - 4;
                Some((u32::from(adjusted / 15), Some(line)))
            }
            _ => None,
        })
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Option<Self>> {
        let start = parser.pos();
        let opcode = parser.read_le::<u8>()?;
        let instruction = match opcode {
            DBG_END_SEQUENCE => return Ok(None),
            DBG_START_LOCAL => DebugInstruction::StartLocal {
                register: read_register(parser, ctx)?,
                name: read_string(parser, ctx)?,
                ty: read_type(parser, ctx)?,
            },
            DBG_START_LOCAL_EXTENDED => DebugInstruction::StartLocalExtended {
                register: read_register(parser, ctx)?,
                name: read_string(parser, ctx)?,
                ty: read_type(parser, ctx)?,
                signature: read_string(parser, ctx)?,
            },
            DBG_END_LOCAL => DebugInstruction::EndLocal(read_register(parser, ctx)?),
            DBG_RESTART_LOCAL => DebugInstruction::RestartLocal(read_register(parser, ctx)?),
            DBG_SET_FILE => DebugInstruction::SetFile(read_string(parser, ctx)?),
            _ => {
                match opcode {
                    DBG_ADVANCE_PC => {
                        parser.read_uleb128()?;
                    }
                    DBG_ADVANCE_LINE => {
                        parser.read_sleb128()?;
                    }
                    _ => {}
                }
                let end = parser.pos();
                DebugInstruction::Raw(parser.data()[start..end].to_vec())
            }
        };
        Ok(Some(instruction))
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        let preserve = dex.options().preserve_signed_registers;
        match self {
            DebugInstruction::StartLocal { register, name, ty } => {
                out.write_le(DBG_START_LOCAL);
                write_register(*register, preserve, out);
                write_string(*name, dex, out)?;
                write_type(*ty, dex, out)?;
            }
            DebugInstruction::StartLocalExtended {
                register,
                name,
                ty,
                signature,
            } => {
                out.write_le(DBG_START_LOCAL_EXTENDED);
                write_register(*register, preserve, out);
                write_string(*name, dex, out)?;
                write_type(*ty, dex, out)?;
                write_string(*signature, dex, out)?;
            }
            DebugInstruction::EndLocal(register) => {
                out.write_le(DBG_END_LOCAL);
                write_register(*register, preserve, out);
            }
            DebugInstruction::RestartLocal(register) => {
                out.write_le(DBG_RESTART_LOCAL);
                write_register(*register, preserve, out);
            }
            DebugInstruction::SetFile(name) => {
                out.write_le(DBG_SET_FILE);
                write_string(*name, dex, out)?;
            }
            DebugInstruction::Raw(bytes) => out.write_bytes(bytes),
        }
        Ok(())
    }
}

fn read_register(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Register> {
    let register = parser.read_register()?;
    if register.signed {
        ctx.note_signed_register();
    }
    Ok(register)
}

fn read_string(
    parser: &mut Parser<'_>,
    ctx: &ReadContext<'_>,
) -> Result<Option<Id<StringIdItem>>> {
    parser
        .read_uleb128p1()?
        .map(|index| ctx.index(index))
        .transpose()
}

fn read_type(parser: &mut Parser<'_>, ctx: &ReadContext<'_>) -> Result<Option<Id<TypeIdItem>>> {
    parser
        .read_uleb128p1()?
        .map(|index| ctx.index(index))
        .transpose()
}

fn write_register(register: Register, preserve: bool, out: &mut Writer) {
    match i32::try_from(register.number) {
        Ok(number) if preserve && register.signed => out.write_sleb128(number),
        _ => out.write_uleb128(register.number),
    }
}

fn write_string(name: Option<Id<StringIdItem>>, dex: &DexFile, out: &mut Writer) -> Result<()> {
    let index = name.map(|id| dex.string_ids.index_of(id)).transpose()?;
    out.write_uleb128p1(index);
    Ok(())
}

fn write_type(ty: Option<Id<TypeIdItem>>, dex: &DexFile, out: &mut Writer) -> Result<()> {
    let index = ty.map(|id| dex.type_ids.index_of(id)).transpose()?;
    out.write_uleb128p1(index);
    Ok(())
}

/// `debug_info_item`: starting line, parameter names and the state machine program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebugInfoItem {
    /// Initial value of the line register
    pub line_start: u32,
    /// Parameter names, `None` where unknown
    pub parameter_names: Vec<Option<Id<StringIdItem>>>,
    /// Program, without the terminating `DBG_END_SEQUENCE`
    pub instructions: Vec<DebugInstruction>,
}

impl DebugInfoItem {
    /// Rewrites the address advances of the program for an instruction stream that was
    /// re-encoded by `relocation`.
    ///
    /// A special opcode whose new address advance is out of its range is split into a
    /// `DBG_ADVANCE_PC` followed by a special opcode that only advances the line.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an address advance cannot be decoded or the
    /// address register overflows.
    pub fn relocate(&mut self, relocation: &Relocation) -> Result<()> {
        let mut old = 0_u32;
        let mut emitted = 0_u32;
        let mut program = Vec::with_capacity(self.instructions.len());

        for instruction in self.instructions.drain(..) {
            let Some((advance, line)) = instruction.address_step()? else {
                program.push(instruction);
                continue;
            };
            old = old
                .checked_add(advance)
                .ok_or_else(|| malformed_error!("debug info address register overflows"))?;
            let target = relocation.address(old);
            let delta = target.saturating_sub(emitted);
            emitted = target;

            let Some(line) = line else {
                program.push(DebugInstruction::advance_pc(delta));
                continue;
            };
            let special = u8::try_from(delta)
                .ok()
                .and_then(|address| DebugInstruction::special(address, line));
            match special {
                Some(special) => program.push(special),
                None => {
                    program.push(DebugInstruction::advance_pc(delta));
                    program.push(DebugInstruction::special(0, line).ok_or_else(|| {
                        malformed_error!("special opcode line advance {} out of range", line)
                    })?);
                }
            }
        }

        self.instructions = program;
        Ok(())
    }
}

impl Item for DebugInfoItem {
    const KIND: ItemKind = ItemKind::DebugInfo;
    type Key = ();

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.debug_infos
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.debug_infos
    }

    fn intern_key(&self) -> Option<()> {
        None
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let line_start = parser.read_uleb128()?;
        let parameter_count = parser.read_uleb128()?;
        let mut parameter_names = Vec::with_capacity(parameter_count.min(0x100) as usize);
        for _ in 0..parameter_count {
            parameter_names.push(read_string(parser, ctx)?);
        }

        let mut instructions = Vec::new();
        while let Some(instruction) = DebugInstruction::read(parser, ctx)? {
            instructions.push(instruction);
        }

        Ok(DebugInfoItem {
            line_start,
            parameter_names,
            instructions,
        })
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        measure(|out| self.write(dex, out))
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_uleb128(self.line_start);
        out.write_uleb128(to_u32(self.parameter_names.len())?);
        for name in &self.parameter_names {
            write_string(*name, dex, out)?;
        }
        for instruction in &self.instructions {
            instruction.write(dex, out)?;
        }
        out.write_le(DBG_END_SEQUENCE);
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        cx.cmp_opt(cx.debug_owner(a), cx.debug_owner(b))
    }

    fn summary(&self, _dex: &DexFile) -> String {
        format!("line {}", self.line_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::config::DexOptions;

    fn program(dex: &mut DexFile) -> Result<DebugInfoItem> {
        let name = dex.intern_string("count")?;
        let ty = dex.intern_type("I")?;
        Ok(DebugInfoItem {
            line_start: 10,
            parameter_names: vec![Some(name), None],
            instructions: vec![
                DebugInstruction::StartLocal {
                    register: Register {
                        number: 64,
                        signed: true,
                    },
                    name: Some(name),
                    ty: Some(ty),
                },
                DebugInstruction::advance_pc(3),
                DebugInstruction::special(1, 1).expect("in range"),
                DebugInstruction::SetFile(None),
            ],
        })
    }

    #[test]
    fn encodes_program() -> Result<()> {
        let mut dex = DexFile::new();
        let info = program(&mut dex)?;
        let info = dex.intern(info)?;
        dex.place()?;

        let item = &dex.debug_infos()[info];
        let mut out = Writer::new(false);
        item.write(&dex, &mut out)?;
        #[rustfmt::skip]
        let expected = [
            0x0A, // line 10
            0x02, 0x02, 0x00, // two parameters: "count" (string 1), unnamed
            0x03, 0x40, 0x02, 0x01, // start local v64 "count" I
            0x01, 0x03, // advance pc by 3
            0x1E, // special: address +1, line +1
            0x09, 0x00, // set file: none
            0x00, // end sequence
        ];
        assert_eq!(out.data(), &expected);
        assert_eq!(item.size(&dex)?, expected.len() as u32);
        Ok(())
    }

    #[test]
    fn signed_registers_preserved_on_request() -> Result<()> {
        let mut dex = DexFile::with_options(DexOptions::natural().with_preserve_signed_registers(true));
        let info = program(&mut dex)?;
        let info = dex.intern(info)?;
        dex.place()?;

        let mut out = Writer::new(false);
        dex.debug_infos()[info].write(&dex, &mut out)?;
        assert_eq!(&out.data()[4..9], &[0x03, 0xC0, 0x00, 0x02, 0x01]);
        Ok(())
    }

    #[test]
    fn reads_raw_and_register_instructions() -> Result<()> {
        // line 1, no parameters, advance line by -2, end local v64 (signed form),
        // restart local v3, prologue end, end
        let data = [
            0x01, 0x00, 0x02, 0x7E, 0x05, 0xC0, 0x00, 0x06, 0x03, 0x07, 0x00,
        ];
        let mut ctx = ReadContext::new(&data, DexFile::new());
        let mut parser = Parser::new(&data);
        let item = DebugInfoItem::read(&mut parser, &mut ctx)?;
        assert_eq!(parser.pos(), data.len());
        assert_eq!(
            item.instructions,
            vec![
                DebugInstruction::Raw(vec![0x02, 0x7E]),
                DebugInstruction::EndLocal(Register {
                    number: 64,
                    signed: true,
                }),
                DebugInstruction::RestartLocal(Register {
                    number: 3,
                    signed: false,
                }),
                DebugInstruction::prologue_end(),
            ]
        );
        Ok(())
    }

    #[test]
    fn end_and_restart_local_follow_the_register_option() -> Result<()> {
        let data = [0x01, 0x00, 0x05, 0xC0, 0x00, 0x06, 0x03, 0x00];
        let mut ctx = ReadContext::new(&data, DexFile::new());
        let item = DebugInfoItem::read(&mut Parser::new(&data), &mut ctx)?;

        let unsigned = DexFile::new();
        let mut out = Writer::new(false);
        item.write(&unsigned, &mut out)?;
        assert_eq!(out.data(), &[0x01, 0x00, 0x05, 0x40, 0x06, 0x03, 0x00]);

        let preserving =
            DexFile::with_options(DexOptions::natural().with_preserve_signed_registers(true));
        let mut out = Writer::new(false);
        item.write(&preserving, &mut out)?;
        assert_eq!(out.data(), &data);
        Ok(())
    }

    #[test]
    fn relocation_moves_address_advances() -> Result<()> {
        let units = [
            0x0012, // const/4 v0, 0
            0x001A, 0x0000, // const-string v0, string@0
            0x000E, // return-void
        ];
        let relocation = crate::dex::instruction::widen_string_constants(&units, &[1])?;

        let mut info = DebugInfoItem {
            line_start: 1,
            parameter_names: vec![],
            instructions: vec![
                DebugInstruction::prologue_end(),
                DebugInstruction::special(1, 2).expect("in range"),
                DebugInstruction::advance_pc(2),
                DebugInstruction::advance_line(-1),
            ],
        };
        info.relocate(&relocation)?;
        assert_eq!(
            info.instructions,
            vec![
                DebugInstruction::prologue_end(),
                DebugInstruction::special(1, 2).expect("in range"),
                DebugInstruction::advance_pc(3),
                DebugInstruction::advance_line(-1),
            ]
        );
        Ok(())
    }

    #[test]
    fn relocation_splits_special_opcodes_out_of_range() -> Result<()> {
        let mut units = vec![0x001A, 0x0000]; // const-string v0, string@0
        units.resize(17, 0x0000);
        units.push(0x000E);
        let relocation = crate::dex::instruction::widen_string_constants(&units, &[0])?;

        let mut info = DebugInfoItem {
            line_start: 1,
            parameter_names: vec![],
            instructions: vec![DebugInstruction::special(16, 0).expect("in range")],
        };
        info.relocate(&relocation)?;
        assert_eq!(
            info.instructions,
            vec![
                DebugInstruction::advance_pc(17),
                DebugInstruction::special(0, 0).expect("in range"),
            ]
        );
        Ok(())
    }

    #[test]
    fn special_opcode_range() {
        assert_eq!(DebugInstruction::special(0, -4), Some(DebugInstruction::Raw(vec![0x0A])));
        assert_eq!(DebugInstruction::special(16, 0), Some(DebugInstruction::Raw(vec![0xFE])));
        assert_eq!(DebugInstruction::special(16, 10), None);
        assert_eq!(DebugInstruction::special(17, 0), None);
        assert_eq!(DebugInstruction::special(0, 11), None);
    }
}
