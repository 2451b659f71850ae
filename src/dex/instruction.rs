//! Locating index operands inside instruction streams.
//!
//! Code items are kept as raw 16-bit units. The only parts of an instruction that depend on
//! the layout of the container are the operands holding a string, type, field or method
//! index, so those are found once at decode time and re-written with current indices on
//! encode. Everything else in the stream is copied untouched.
//!
//! Every reference-bearing format carries its index right after the opcode unit: formats
//! `21c`, `22c`, `35c` and `3rc` as one 16-bit unit, formats `31c`, `41c`, `52c` and `5rc` as
//! two units, low half first.
//!
//! # Widening string constants
//!
//! `const-string` (format `21c`) holds a 16-bit string index. When a container grows past
//! 65536 strings, [`widen_string_constants`] rewrites the affected instructions to
//! `const-string/jumbo` (format `31c`), one unit longer. Every branch whose span crosses a
//! widened instruction has its offset adjusted, `goto` and `goto/16` grow into wider forms
//! when the new offset no longer fits, and switch and array payloads are re-aligned to even
//! addresses. The returned [`Relocation`] maps old addresses to new ones so that try blocks,
//! catch handlers and debug info can follow.
//!
//! Conditional branches have no wider form; one pushed out of reach is an
//! [`crate::Error::Overflow`].
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::dex::instruction::widen_string_constants;
//!
//! // const-string v0, #5; return-void
//! let relocation = widen_string_constants(&[0x001A, 0x0005, 0x000E], &[0])?;
//! assert_eq!(relocation.units(), &[0x001B_u16, 0x0005, 0x0000, 0x000E]);
//! assert_eq!(relocation.address(2), 3);
//! # Ok::<(), dexscope::Error>(())
//! ```

use std::{collections::HashMap, fmt};

use crate::{
    utils::math::{to_u16, to_u32},
    Result,
};

/// What an index operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `string_id_item` index
    String,
    /// `type_id_item` index
    Type,
    /// `field_id_item` index
    Field,
    /// `method_id_item` index
    Method,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferenceKind::String => "string",
            ReferenceKind::Type => "type",
            ReferenceKind::Field => "field",
            ReferenceKind::Method => "method",
        })
    }
}

/// Encoded width of an index operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandWidth {
    /// One 16-bit unit
    Narrow,
    /// Two 16-bit units, low half first
    Wide,
}

/// Location of an index operand within an instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceSite {
    /// Code address of the instruction, in units
    pub address: u32,
    /// Position of the operand's first unit
    pub unit: usize,
    /// Operand width
    pub width: OperandWidth,
    /// What the operand refers to
    pub kind: ReferenceKind,
}

impl ReferenceSite {
    /// Reads the operand's current value.
    #[must_use]
    pub fn get(&self, units: &[u16]) -> u32 {
        match self.width {
            OperandWidth::Narrow => u32::from(units[self.unit]),
            OperandWidth::Wide => {
                u32::from(units[self.unit]) | (u32::from(units[self.unit + 1]) << 16)
            }
        }
    }

    /// Stores `index` into the operand.
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if a narrow operand cannot hold `index`.
    pub fn set(&self, units: &mut [u16], index: u32) -> Result<()> {
        match self.width {
            OperandWidth::Narrow => {
                let what = format!(
                    "{} reference of the instruction at code address 0x{:x}",
                    self.kind, self.address
                );
                units[self.unit] = to_u16(index, &what)?;
            }
            OperandWidth::Wide => {
                units[self.unit] = (index & 0xFFFF) as u16;
                units[self.unit + 1] = (index >> 16) as u16;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Shape {
    units: usize,
    reference: Option<(ReferenceKind, OperandWidth)>,
}

const fn plain(units: usize) -> Option<Shape> {
    Some(Shape {
        units,
        reference: None,
    })
}

const fn narrow(kind: ReferenceKind, units: usize) -> Option<Shape> {
    Some(Shape {
        units,
        reference: Some((kind, OperandWidth::Narrow)),
    })
}

const fn wide(kind: ReferenceKind, units: usize) -> Option<Shape> {
    Some(Shape {
        units,
        reference: Some((kind, OperandWidth::Wide)),
    })
}

fn shape(opcode: u8) -> Option<Shape> {
    use ReferenceKind::{Field, Method, String, Type};

    match opcode {
        0x00..=0x01
        | 0x04
        | 0x07
        | 0x0A..=0x12
        | 0x1D..=0x1E
        | 0x21
        | 0x27..=0x28
        | 0x7B..=0x8F
        | 0xB0..=0xCF
        | 0xF1 => plain(1),
        0x02
        | 0x05
        | 0x08
        | 0x13
        | 0x15..=0x16
        | 0x19
        | 0x29
        | 0x2D..=0x3D
        | 0x44..=0x51
        | 0x90..=0xAF
        | 0xD0..=0xE2
        | 0xED
        | 0xF2..=0xF7 => plain(2),
        0x03 | 0x06 | 0x09 | 0x14 | 0x17 | 0x26 | 0x2A..=0x2C | 0xEE..=0xEF | 0xF8..=0xFB => {
            plain(3)
        }
        0x18 => plain(5),
        0x1A => narrow(String, 2),
        0x1B => wide(String, 3),
        0x1C | 0x1F | 0x20 | 0x22 | 0x23 => narrow(Type, 2),
        0x24 | 0x25 => narrow(Type, 3),
        0x52..=0x6D | 0xE3..=0xEB | 0xFC..=0xFE => narrow(Field, 2),
        0x6E..=0x72 | 0x74..=0x78 | 0xF0 => narrow(Method, 3),
        _ => None,
    }
}

fn jumbo_shape(opcode: u8) -> Option<Shape> {
    use ReferenceKind::{Field, Method, Type};

    match opcode {
        0x00 | 0x01 | 0x03 => wide(Type, 4),
        0x02 | 0x04 | 0x05 => wide(Type, 5),
        0x06..=0x13 | 0xF3..=0xF8 => wide(Field, 5),
        0x14..=0x21 | 0xF9..=0xFE => wide(Field, 4),
        0x22..=0x26 | 0xF2 => wide(Method, 5),
        _ => None,
    }
}

/// Size in units of the payload pseudo-instruction at `units[0]`, if it is one.
fn payload_size(units: &[u16]) -> Option<u64> {
    let unit = |at: usize| units.get(at).copied().map(u64::from);
    match units.first()? {
        0x0100 => Some(unit(1)? * 2 + 4),
        0x0200 => Some(unit(1)? * 4 + 2),
        0x0300 => {
            let width = unit(1)?;
            let count = unit(2)? | (unit(3)? << 16);
            Some((width * count).div_ceil(2) + 4)
        }
        _ => None,
    }
}

/// Decodes the instruction starting at `position`: its size in units and its index operand.
fn step(units: &[u16], position: usize) -> Result<(usize, Option<(ReferenceKind, OperandWidth)>)> {
    let unit = units[position];
    let opcode = (unit & 0xFF) as u8;

    let (size, reference) = if opcode == 0x00 && unit != 0x0000 {
        match payload_size(&units[position..]) {
            Some(size) => (size, None),
            None if unit > 0x0300 => (1, None),
            None => {
                return Err(malformed_error!(
                    "truncated payload at code address 0x{:x}",
                    position
                ))
            }
        }
    } else {
        let shape = if opcode == 0xFF {
            jumbo_shape((unit >> 8) as u8)
        } else {
            shape(opcode)
        };
        let Some(shape) = shape else {
            return Err(malformed_error!(
                "unknown opcode 0x{:04x} at code address 0x{:x}",
                if opcode == 0xFF { unit } else { u16::from(opcode) },
                position
            ));
        };
        (shape.units as u64, shape.reference)
    };

    let end = position as u64 + size;
    if end > units.len() as u64 {
        return Err(malformed_error!(
            "instruction at code address 0x{:x} runs past the end of the code ({} units)",
            position,
            units.len()
        ));
    }
    Ok((size as usize, reference))
}

/// Finds every index operand in `units`, with its current value.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on an unused opcode or an instruction that runs past
/// the end of the stream.
pub fn scan(units: &[u16]) -> Result<Vec<(ReferenceSite, u32)>> {
    let mut sites = Vec::new();
    let mut position = 0;

    while position < units.len() {
        let (size, reference) = step(units, position)?;
        if let Some((kind, width)) = reference {
            let site = ReferenceSite {
                address: to_u32(position)?,
                unit: position + 1,
                width,
                kind,
            };
            sites.push((site, site.get(units)));
        }
        position += size;
    }

    Ok(sites)
}

const CONST_STRING: u16 = 0x1A;
const CONST_STRING_JUMBO: u16 = 0x1B;
const PACKED_SWITCH_PAYLOAD: u16 = 0x0100;
const SPARSE_SWITCH_PAYLOAD: u16 = 0x0200;
const ARRAY_PAYLOAD: u16 = 0x0300;

/// Relative branch operand of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    /// `goto`, offset in the high byte of the opcode unit
    Goto,
    /// `goto/16`
    Goto16,
    /// `goto/32`
    Goto32,
    /// `if-*` and `if-*z`, 16-bit offset
    Conditional,
    /// `fill-array-data`, `packed-switch` and `sparse-switch`, 32-bit offset to a payload
    Payload,
}

impl Branch {
    fn of(unit: u16) -> Option<Branch> {
        match unit & 0xFF {
            0x28 => Some(Branch::Goto),
            0x29 => Some(Branch::Goto16),
            0x2A => Some(Branch::Goto32),
            0x32..=0x3D => Some(Branch::Conditional),
            0x26 | 0x2B | 0x2C => Some(Branch::Payload),
            _ => None,
        }
    }

    fn offset(self, units: &[u16]) -> i32 {
        match self {
            Branch::Goto => i32::from((units[0] >> 8) as u8 as i8),
            Branch::Goto16 | Branch::Conditional => i32::from(units[1] as i16),
            Branch::Goto32 | Branch::Payload => read_i32(units, 1),
        }
    }
}

fn read_i32(units: &[u16], at: usize) -> i32 {
    (u32::from(units[at]) | (u32::from(units[at + 1]) << 16)) as i32
}

fn write_i32(units: &mut [u16], at: usize, value: i32) {
    let bits = value as u32;
    units[at] = (bits & 0xFFFF) as u16;
    units[at + 1] = (bits >> 16) as u16;
}

#[derive(Debug)]
struct Decoded {
    old: u32,
    new: u32,
    units: Vec<u16>,
    branch: Option<(Branch, u32)>,
    payload: bool,
    padding: bool,
}

fn decode(units: &[u16]) -> Result<Vec<Decoded>> {
    let mut decoded: Vec<Decoded> = Vec::new();
    let mut position = 0;

    while position < units.len() {
        let (size, _) = step(units, position)?;
        let slice = &units[position..position + size];
        let address = to_u32(position)?;

        let branch = match Branch::of(slice[0]) {
            Some(kind) => {
                let target = i64::from(address) + i64::from(kind.offset(slice));
                let target = u32::try_from(target)
                    .ok()
                    .filter(|&target| (target as usize) < units.len())
                    .ok_or_else(|| {
                        malformed_error!("branch at code address 0x{:x} leaves the method", address)
                    })?;
                Some((kind, target))
            }
            None => None,
        };

        let payload = matches!(
            slice[0],
            PACKED_SWITCH_PAYLOAD | SPARSE_SWITCH_PAYLOAD | ARRAY_PAYLOAD
        );
        if payload && address % 2 == 0 {
            if let Some(previous) = decoded.last_mut() {
                previous.padding = previous.units == [0x0000] && previous.old % 2 == 1;
            }
        }

        decoded.push(Decoded {
            old: address,
            new: address,
            units: slice.to_vec(),
            branch,
            payload,
            padding: false,
        });
        position += size;
    }

    Ok(decoded)
}

/// Assigns new addresses, aligning payloads to even addresses. Returns the new length.
fn assign(decoded: &mut [Decoded]) -> Result<u32> {
    let mut address = 0_u32;
    for insn in decoded {
        if insn.payload && address % 2 == 1 {
            address += 1;
        }
        insn.new = address;
        if !insn.padding {
            address = address
                .checked_add(to_u32(insn.units.len())?)
                .ok_or_else(|| overflow_error!("instruction stream outgrows 32-bit addresses"))?;
        }
    }
    Ok(address)
}

fn moved(decoded: &[Decoded], old: u32) -> Result<u32> {
    decoded
        .binary_search_by_key(&old, |insn| insn.old)
        .map(|slot| decoded[slot].new)
        .map_err(|_| {
            malformed_error!(
                "branch target 0x{:x} is not the start of an instruction",
                old
            )
        })
}

/// Old and new address of every instruction after an instruction stream was re-encoded.
#[derive(Debug, Clone)]
pub struct Relocation {
    units: Vec<u16>,
    starts: Vec<(u32, u32)>,
    end: (u32, u32),
}

impl Relocation {
    /// The re-encoded instruction units.
    #[must_use]
    pub fn units(&self) -> &[u16] {
        &self.units
    }

    /// New code address of `old`.
    ///
    /// Addresses inside an instruction keep their distance to its start; the end of the
    /// stream maps to the new end.
    #[must_use]
    pub fn address(&self, old: u32) -> u32 {
        if old >= self.end.0 {
            return self.end.1 + (old - self.end.0);
        }
        let slot = self.starts.partition_point(|&(start, _)| start <= old);
        match slot.checked_sub(1).and_then(|slot| self.starts.get(slot)) {
            Some(&(start, new)) => new + (old - start),
            None => old,
        }
    }
}

/// Re-encodes `units` with the `const-string` instructions at `addresses` widened to
/// `const-string/jumbo`.
///
/// Every branch, switch table and payload moves along so control flow is unchanged; a `goto`
/// or `goto/16` whose target moves out of reach is widened in turn, and payloads are
/// re-aligned with `nop` padding.
///
/// # Errors
/// - [`crate::Error::Malformed`] if the stream cannot be decoded, an address does not hold a
///   `const-string`, a branch does not land on an instruction, or a switch payload is not
///   referenced by any switch
/// - [`crate::Error::Overflow`] if a conditional branch can no longer reach its target
pub fn widen_string_constants(units: &[u16], addresses: &[u32]) -> Result<Relocation> {
    let mut decoded = decode(units)?;
    for &address in addresses {
        let Ok(slot) = decoded.binary_search_by_key(&address, |insn| insn.old) else {
            return Err(malformed_error!(
                "no instruction starts at code address 0x{:x}",
                address
            ));
        };
        let insn = &mut decoded[slot];
        match insn.units[0] & 0xFF {
            CONST_STRING => {
                insn.units = vec![
                    (insn.units[0] & 0xFF00) | CONST_STRING_JUMBO,
                    insn.units[1],
                    0,
                ];
            }
            CONST_STRING_JUMBO => {}
            _ => {
                return Err(malformed_error!(
                    "instruction at code address 0x{:x} is not a const-string",
                    address
                ))
            }
        }
    }

    let end = loop {
        let end = assign(&mut decoded)?;
        let mut grown = false;
        for slot in 0..decoded.len() {
            let Some((kind, target)) = decoded[slot].branch else {
                continue;
            };
            let offset = i64::from(moved(&decoded, target)?) - i64::from(decoded[slot].new);
            let wider = match kind {
                Branch::Goto if i8::try_from(offset).is_err() => {
                    Some(if i16::try_from(offset).is_ok() {
                        Branch::Goto16
                    } else {
                        Branch::Goto32
                    })
                }
                Branch::Goto16 if i16::try_from(offset).is_err() => Some(Branch::Goto32),
                _ => None,
            };
            if let Some(wider) = wider {
                let insn = &mut decoded[slot];
                insn.units = match wider {
                    Branch::Goto16 => vec![0x0029, 0],
                    _ => vec![0x002A, 0, 0],
                };
                insn.branch = Some((wider, target));
                grown = true;
            }
        }
        if !grown {
            break end;
        }
    };

    let mut switches = HashMap::new();
    for insn in &decoded {
        if let Some((Branch::Payload, target)) = insn.branch {
            if insn.units[0] & 0xFF != 0x26 {
                switches.entry(target).or_insert(insn.old);
            }
        }
    }

    let mut out = Vec::with_capacity(end as usize);
    for insn in &decoded {
        if insn.padding {
            continue;
        }
        out.resize(insn.new as usize, 0x0000);

        let mut units = insn.units.clone();
        if let Some((kind, target)) = insn.branch {
            let offset = i64::from(moved(&decoded, target)?) - i64::from(insn.new);
            let out_of_reach = || {
                overflow_error!(
                    "branch at code address 0x{:x} cannot reach 0x{:x} after widening",
                    insn.new,
                    target
                )
            };
            match kind {
                Branch::Goto => {
                    let offset = i8::try_from(offset).map_err(|_| out_of_reach())?;
                    units[0] = (u16::from(offset as u8) << 8) | 0x28;
                }
                Branch::Goto16 | Branch::Conditional => {
                    units[1] = i16::try_from(offset).map_err(|_| out_of_reach())? as u16;
                }
                Branch::Goto32 | Branch::Payload => {
                    let offset = i32::try_from(offset).map_err(|_| out_of_reach())?;
                    write_i32(&mut units, 1, offset);
                }
            }
        }

        if matches!(units[0], PACKED_SWITCH_PAYLOAD | SPARSE_SWITCH_PAYLOAD) {
            let Some(&switch) = switches.get(&insn.old) else {
                return Err(malformed_error!(
                    "switch payload at code address 0x{:x} is not referenced by any switch",
                    insn.old
                ));
            };
            let new_switch = moved(&decoded, switch)?;
            let count = usize::from(units[1]);
            let first = if units[0] == PACKED_SWITCH_PAYLOAD {
                4
            } else {
                2 + 2 * count
            };
            for entry in 0..count {
                let at = first + 2 * entry;
                let target = i64::from(switch) + i64::from(read_i32(&units, at));
                let target = u32::try_from(target).map_err(|_| {
                    malformed_error!("switch at code address 0x{:x} leaves the method", switch)
                })?;
                let relative = i64::from(moved(&decoded, target)?) - i64::from(new_switch);
                let relative = i32::try_from(relative).map_err(|_| {
                    overflow_error!("switch target 0x{:x} is out of reach", target)
                })?;
                write_i32(&mut units, at, relative);
            }
        }

        out.extend_from_slice(&units);
    }

    Ok(Relocation {
        units: out,
        starts: decoded.iter().map(|insn| (insn.old, insn.new)).collect(),
        end: (to_u32(units.len())?, end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn finds_references() -> Result<()> {
        let units = [
            0x001A, 0x0005, // const-string v0, string@5
            0x001B, 0x0001, 0x0002, // const-string/jumbo v0, string@0x20001
            0x2070, 0x0003, 0x0010, // invoke-direct {v0, v1}, method@3
            0x0052, 0x0007, // iget v0, v0, field@7
            0x00FF, 0x0002, 0x0000, 0x0000, // const-class/jumbo v0, type@2
            0x000E, // return-void
        ];
        let sites = scan(&units)?;
        let found: Vec<_> = sites
            .iter()
            .map(|(site, value)| (site.address, site.kind, site.width, *value))
            .collect();
        assert_eq!(
            found,
            vec![
                (0, ReferenceKind::String, OperandWidth::Narrow, 5),
                (2, ReferenceKind::String, OperandWidth::Wide, 0x2_0001),
                (5, ReferenceKind::Method, OperandWidth::Narrow, 3),
                (8, ReferenceKind::Field, OperandWidth::Narrow, 7),
                (10, ReferenceKind::Type, OperandWidth::Wide, 2),
            ]
        );
        Ok(())
    }

    #[test]
    fn skips_payloads() -> Result<()> {
        let units = [
            0x0026, 0x0004, 0x0000, // fill-array-data v0, +4
            0x000E, // return-void
            0x0300, 0x0001, 0x0003, 0x0000, 0x1A1A, 0x001A, // 3 one-byte elements
            0x0100, 0x0001, 0x0000, 0x0000, 0x0000, 0x0000, // packed-switch, 1 target
            0x0200, 0x0001, 0x001A, 0x0000, 0x0000, 0x0000, // sparse-switch, 1 key
        ];
        assert!(scan(&units)?.is_empty());
        Ok(())
    }

    #[test]
    fn rejects_bad_streams() {
        assert!(matches!(scan(&[0x003E]), Err(Error::Malformed { .. })));
        assert!(matches!(scan(&[0x001A]), Err(Error::Malformed { .. })));
        assert!(matches!(scan(&[0x0100, 0x0004]), Err(Error::Malformed { .. })));
    }

    #[test]
    fn narrow_operand_overflow() -> Result<()> {
        let mut units = [0x001C, 0x0000];
        let (site, _) = scan(&units)?[0];
        site.set(&mut units, 0xFFFF)?;
        assert_eq!(units[1], 0xFFFF);
        assert!(matches!(
            site.set(&mut units, 0x1_0000),
            Err(Error::Overflow(_))
        ));

        let mut units = [0x001B, 0x0000, 0x0000];
        let (site, _) = scan(&units)?[0];
        site.set(&mut units, 0x0012_3456)?;
        assert_eq!(units, [0x001B, 0x3456, 0x0012]);
        Ok(())
    }

    #[test]
    fn widening_moves_branches() -> Result<()> {
        let units = [
            0x0012, // const/4 v0, 0
            0x001A, 0x0005, // const-string v0, string@5
            0x0038, 0x0004, // if-eqz v0, +4
            0xFB28, // goto -5
            0x000E, // return-void
            0x000E, // return-void
        ];
        let relocation = widen_string_constants(&units, &[1])?;
        assert_eq!(
            relocation.units(),
            &[0x0012_u16, 0x001B, 0x0005, 0x0000, 0x0038, 0x0004, 0xFA28, 0x000E, 0x000E]
        );
        assert_eq!(relocation.address(0), 0);
        assert_eq!(relocation.address(3), 4);
        assert_eq!(relocation.address(4), 5);
        assert_eq!(relocation.address(7), 8);
        assert_eq!(relocation.address(8), 9);

        let (site, value) = scan(relocation.units())?[0];
        assert_eq!(site.width, OperandWidth::Wide);
        assert_eq!(value, 5);
        Ok(())
    }

    #[test]
    fn widening_grows_gotos_out_of_reach() -> Result<()> {
        let mut units = vec![
            0x7F28, // goto +127
            0x001A, 0x0000, // const-string v0, string@0
        ];
        units.resize(127, 0x0000);
        units.push(0x000E);

        let relocation = widen_string_constants(&units, &[1])?;
        let widened = relocation.units();
        assert_eq!(widened.len(), 130);
        assert_eq!(&widened[..4], &[0x0029_u16, 129, 0x001B, 0x0000]);
        assert_eq!(widened[129], 0x000E);
        assert_eq!(relocation.address(127), 129);
        Ok(())
    }

    #[test]
    fn widening_realigns_payloads() -> Result<()> {
        let units = [
            0x0012, // const/4 v0, 0
            0x001A, 0x0000, // const-string v0, string@0
            0x002B, 0x0005, 0x0000, // packed-switch v0, +5
            0x000E, // return-void
            0x0000, // alignment
            0x0100, 0x0001, 0x0000, 0x0000, 0x0003, 0x0000, // one case: +3
        ];
        let relocation = widen_string_constants(&units, &[1])?;
        assert_eq!(
            relocation.units(),
            &[
                0x0012_u16, 0x001B, 0x0000, 0x0000, 0x002B, 0x0004, 0x0000, 0x000E, 0x0100, 0x0001,
                0x0000, 0x0000, 0x0003, 0x0000,
            ]
        );
        assert_eq!(relocation.address(6), 7);
        assert_eq!(relocation.address(8), 8);
        Ok(())
    }

    #[test]
    fn widening_rejects_what_it_cannot_move() {
        let mut units = vec![
            0x0038, 0x7FFF, // if-eqz v0, +32767
            0x001A, 0x0000, // const-string v0, string@0
        ];
        units.resize(0x7FFF, 0x0000);
        units.push(0x000E);
        assert!(matches!(
            widen_string_constants(&units, &[2]),
            Err(Error::Overflow(_))
        ));

        let units = [0x001C, 0x0000, 0x000E];
        assert!(matches!(
            widen_string_constants(&units, &[0]),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            widen_string_constants(&units, &[1]),
            Err(Error::Malformed { .. })
        ));
    }
}
