//! `code_item`: a method body with its try blocks and exception handlers.

use std::{cmp::Ordering, collections::HashMap};

use crate::{
    dex::{
        context::ReadContext,
        instruction::{
            self, scan, OperandWidth, ReferenceKind, ReferenceSite, Relocation,
        },
        item::{Item, SortContext},
        items::{DebugInfoItem, FieldIdItem, MethodIdItem, StringIdItem, TypeIdItem},
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::{sleb128_size, to_u16, to_u32, uleb128_size},
    Result,
};

/// Target of an index operand inside an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A string constant
    String(Id<StringIdItem>),
    /// A type
    Type(Id<TypeIdItem>),
    /// A field
    Field(Id<FieldIdItem>),
    /// A method
    Method(Id<MethodIdItem>),
}

impl Reference {
    /// Which operand kind this target fits.
    #[must_use]
    pub fn kind(&self) -> ReferenceKind {
        match self {
            Reference::String(_) => ReferenceKind::String,
            Reference::Type(_) => ReferenceKind::Type,
            Reference::Field(_) => ReferenceKind::Field,
            Reference::Method(_) => ReferenceKind::Method,
        }
    }

    fn index(&self, dex: &DexFile) -> Result<u32> {
        match *self {
            Reference::String(id) => dex.string_ids.index_of(id),
            Reference::Type(id) => dex.type_ids.index_of(id),
            Reference::Field(id) => dex.field_ids.index_of(id),
            Reference::Method(id) => dex.method_ids.index_of(id),
        }
    }

    fn resolve(kind: ReferenceKind, index: u32, ctx: &ReadContext<'_>) -> Result<Reference> {
        Ok(match kind {
            ReferenceKind::String => Reference::String(ctx.index(index)?),
            ReferenceKind::Type => Reference::Type(ctx.index(index)?),
            ReferenceKind::Field => Reference::Field(ctx.index(index)?),
            ReferenceKind::Method => Reference::Method(ctx.index(index)?),
        })
    }
}

/// A range of instructions guarded by one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TryItem {
    /// First guarded code address
    pub start_address: u32,
    /// Number of guarded units
    pub unit_count: u16,
    /// Position of the handler in [`CodeItem::handlers`]
    pub handler: usize,
}

/// One typed catch clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeAddressPair {
    /// Caught exception type
    pub ty: Id<TypeIdItem>,
    /// Handler code address
    pub address: u32,
}

/// The catch clauses shared by one or more try blocks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CatchHandler {
    /// Typed clauses, in match order
    pub catches: Vec<TypeAddressPair>,
    /// Address of the catch-all clause
    pub catch_all: Option<u32>,
}

impl CatchHandler {
    fn read(parser: &mut Parser<'_>, ctx: &ReadContext<'_>) -> Result<Self> {
        let size = parser.read_sleb128()?;
        let mut catches = Vec::with_capacity(size.unsigned_abs().min(0x100) as usize);
        for _ in 0..size.unsigned_abs() {
            let ty = parser.read_uleb128()?;
            let address = parser.read_uleb128()?;
            catches.push(TypeAddressPair {
                ty: ctx.index(ty)?,
                address,
            });
        }
        let catch_all = if size <= 0 {
            Some(parser.read_uleb128()?)
        } else {
            None
        };
        Ok(CatchHandler { catches, catch_all })
    }

    fn encoded_size(&self) -> Result<i32> {
        let count = i32::try_from(self.catches.len())
            .map_err(|_| overflow_error!("{} catch clauses in one handler", self.catches.len()))?;
        Ok(if self.catch_all.is_some() { -count } else { count })
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        let mut size = sleb128_size(self.encoded_size()?);
        for pair in &self.catches {
            size += uleb128_size(dex.type_ids.index_of(pair.ty)?) + uleb128_size(pair.address);
        }
        if let Some(address) = self.catch_all {
            size += uleb128_size(address);
        }
        Ok(size)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_sleb128(self.encoded_size()?);
        for pair in &self.catches {
            out.write_uleb128(dex.type_ids.index_of(pair.ty)?);
            out.write_uleb128(pair.address);
        }
        if let Some(address) = self.catch_all {
            out.write_uleb128(address);
        }
        Ok(())
    }
}

/// `code_item`: registers, instructions and exception handling of one method.
///
/// Instructions are kept as raw units; the operands holding indices are tracked alongside
/// them and rewritten with the current indices whenever the item is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeItem {
    /// Number of registers used
    pub registers: u16,
    /// Number of incoming argument words
    pub ins: u16,
    /// Number of outgoing argument words for invocations
    pub outs: u16,
    /// Line and local variable information
    pub debug_info: Option<Id<DebugInfoItem>>,
    /// Try blocks, in address order
    pub tries: Vec<TryItem>,
    /// Exception handlers referenced by [`CodeItem::tries`]
    pub handlers: Vec<CatchHandler>,
    instructions: Vec<u16>,
    references: Vec<(ReferenceSite, Reference)>,
}

impl CodeItem {
    /// Creates a body from raw instruction units.
    ///
    /// `references` supplies the target of every index operand in `instructions`, in stream
    /// order; the index values already present in the units are ignored.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `instructions` cannot be decoded, and
    /// [`crate::Error::Format`] if `references` does not match the operands found.
    pub fn new(
        registers: u16,
        ins: u16,
        outs: u16,
        instructions: Vec<u16>,
        references: Vec<Reference>,
    ) -> Result<Self> {
        let sites = scan(&instructions)?;
        if sites.len() != references.len() {
            return Err(format_error!(
                "instructions hold {} index operands, but {} targets were supplied",
                sites.len(),
                references.len()
            ));
        }

        let mut paired = Vec::with_capacity(sites.len());
        for ((site, _), target) in sites.into_iter().zip(references) {
            if site.kind != target.kind() {
                return Err(format_error!(
                    "instruction at code address 0x{:x} takes a {} reference, got a {}",
                    site.address,
                    site.kind,
                    target.kind()
                ));
            }
            paired.push((site, target));
        }

        Ok(CodeItem {
            registers,
            ins,
            outs,
            debug_info: None,
            tries: Vec::new(),
            handlers: Vec::new(),
            instructions,
            references: paired,
        })
    }

    /// Instruction units as last read or constructed.
    #[must_use]
    pub fn instructions(&self) -> &[u16] {
        &self.instructions
    }

    /// Index operands and their targets, in stream order.
    #[must_use]
    pub fn references(&self) -> &[(ReferenceSite, Reference)] {
        &self.references
    }

    /// Instruction units with every index operand set to its target's current index.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if a target is unplaced and
    /// [`crate::Error::Overflow`] if an index no longer fits its operand.
    pub fn resolved_instructions(&self, dex: &DexFile) -> Result<Vec<u16>> {
        let mut units = self.instructions.clone();
        for (site, target) in &self.references {
            site.set(&mut units, target.index(dex)?)?;
        }
        Ok(units)
    }

    /// Code addresses of the narrow `const-string` operands whose string index no longer
    /// fits 16 bits.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if a referenced string is unplaced.
    pub fn overflowing_string_operands(&self, dex: &DexFile) -> Result<Vec<u32>> {
        let mut addresses = Vec::new();
        for (site, target) in &self.references {
            if let Reference::String(id) = *target {
                if site.width == OperandWidth::Narrow && dex.string_ids.index_of(id)? > 0xFFFF {
                    addresses.push(site.address);
                }
            }
        }
        Ok(addresses)
    }

    /// Widens the `const-string` instructions at `addresses` to `const-string/jumbo` and moves
    /// try blocks and handler addresses along with the instructions.
    ///
    /// The returned [`Relocation`] maps old code addresses to new ones, for the debug info.
    ///
    /// # Errors
    /// See [`instruction::widen_string_constants`]; additionally [`crate::Error::Overflow`] if a try block
    /// grows past 65535 units.
    pub fn widen_string_constants(&mut self, addresses: &[u32]) -> Result<Relocation> {
        let relocation = instruction::widen_string_constants(&self.instructions, addresses)?;
        let sites = scan(relocation.units())?;
        if sites.len() != self.references.len() {
            return Err(malformed_error!(
                "widening changed the operand count from {} to {}",
                self.references.len(),
                sites.len()
            ));
        }

        self.references = sites
            .into_iter()
            .zip(&self.references)
            .map(|((site, _), &(_, target))| (site, target))
            .collect();
        self.instructions = relocation.units().to_vec();

        for entry in &mut self.tries {
            let start = relocation.address(entry.start_address);
            let end = relocation.address(entry.start_address + u32::from(entry.unit_count));
            entry.start_address = start;
            entry.unit_count = u16::try_from(end - start).map_err(|_| {
                overflow_error!("try block at 0x{:x} grows to {} units", start, end - start)
            })?;
        }
        for handler in &mut self.handlers {
            for pair in &mut handler.catches {
                pair.address = relocation.address(pair.address);
            }
            if let Some(address) = &mut handler.catch_all {
                *address = relocation.address(*address);
            }
        }
        Ok(relocation)
    }

    fn handler_offsets(&self, dex: &DexFile) -> Result<(Vec<u16>, u32)> {
        let mut offsets = Vec::with_capacity(self.handlers.len());
        let mut size = uleb128_size(to_u32(self.handlers.len())?);
        for handler in &self.handlers {
            offsets.push(to_u16(size, "exception handler offset")?);
            size += handler.size(dex)?;
        }
        Ok((offsets, size))
    }

    fn has_padding(&self) -> bool {
        !self.tries.is_empty() && self.instructions.len() % 2 == 1
    }
}

impl Item for CodeItem {
    const KIND: ItemKind = ItemKind::Code;
    type Key = ();

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.code_items
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.code_items
    }

    fn intern_key(&self) -> Option<()> {
        None
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let registers = parser.read_le::<u16>()?;
        let ins = parser.read_le::<u16>()?;
        let outs = parser.read_le::<u16>()?;
        let try_count = parser.read_le::<u16>()?;
        let debug_info = parser.read_le::<u32>()?;
        let unit_count = parser.read_le::<u32>()?;

        let mut instructions = Vec::with_capacity(unit_count.min(0x1_0000) as usize);
        for _ in 0..unit_count {
            instructions.push(parser.read_le::<u16>()?);
        }

        let mut references = Vec::new();
        for (site, index) in scan(&instructions)? {
            references.push((site, Reference::resolve(site.kind, index, ctx)?));
        }

        let mut item = CodeItem {
            registers,
            ins,
            outs,
            debug_info: ctx.optional_offset(debug_info)?,
            tries: Vec::new(),
            handlers: Vec::new(),
            instructions,
            references,
        };

        if try_count == 0 {
            return Ok(item);
        }

        if unit_count % 2 == 1 {
            parser.read_le::<u16>()?;
        }

        let mut raw_tries = Vec::with_capacity(usize::from(try_count));
        for _ in 0..try_count {
            let start_address = parser.read_le::<u32>()?;
            let unit_count = parser.read_le::<u16>()?;
            let handler_offset = parser.read_le::<u16>()?;
            raw_tries.push((start_address, unit_count, handler_offset));
        }

        let list_start = parser.pos();
        let handler_count = parser.read_uleb128()?;
        let mut by_offset = HashMap::new();
        for index in 0..handler_count as usize {
            by_offset.insert(parser.pos() - list_start, index);
            item.handlers.push(CatchHandler::read(parser, ctx)?);
        }

        for (start_address, unit_count, handler_offset) in raw_tries {
            let Some(&handler) = by_offset.get(&usize::from(handler_offset)) else {
                return Err(malformed_error!(
                    "try block at 0x{:x} points at handler offset 0x{:x}, which starts no handler",
                    start_address,
                    handler_offset
                ));
            };
            item.tries.push(TryItem {
                start_address,
                unit_count,
                handler,
            });
        }

        Ok(item)
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        let mut size = 16 + 2 * to_u32(self.instructions.len())?;
        if !self.tries.is_empty() {
            if self.has_padding() {
                size += 2;
            }
            size += 8 * to_u32(self.tries.len())?;
            size += self.handler_offsets(dex)?.1;
        }
        Ok(size)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(self.registers);
        out.write_le(self.ins);
        out.write_le(self.outs);
        out.write_le(to_u16(to_u32(self.tries.len())?, "try block count")?);
        match self.debug_info {
            Some(debug_info) => out.write_le(dex.debug_infos.offset_of(debug_info)?),
            None => out.write_le(0_u32),
        }
        out.write_le(to_u32(self.instructions.len())?);
        for unit in self.resolved_instructions(dex)? {
            out.write_le(unit);
        }

        if self.tries.is_empty() {
            return Ok(());
        }
        if self.has_padding() {
            out.write_le(0_u16);
        }

        let (offsets, _) = self.handler_offsets(dex)?;
        for entry in &self.tries {
            let Some(&offset) = offsets.get(entry.handler) else {
                return Err(resolution_error!(
                    "try block at 0x{:x} refers to handler {} of {}",
                    entry.start_address,
                    entry.handler,
                    self.handlers.len()
                ));
            };
            out.write_le(entry.start_address);
            out.write_le(entry.unit_count);
            out.write_le(offset);
        }

        out.write_uleb128(to_u32(self.handlers.len())?);
        for handler in &self.handlers {
            handler.write(dex, out)?;
        }
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        cx.cmp_opt(cx.code_owner(a), cx.code_owner(b))
    }

    fn summary(&self, _dex: &DexFile) -> String {
        format!(
            "{} registers, {} units, {} tries",
            self.registers,
            self.instructions.len(),
            self.tries.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn body(dex: &mut DexFile) -> Result<CodeItem> {
        let hello = dex.intern_string("hello")?;
        let exception = dex.intern_type("Ljava/lang/Exception;")?;
        let mut code = CodeItem::new(
            1,
            0,
            0,
            vec![
                0x001A, 0x0000, // const-string v0, "hello"
                0x000E, // return-void
            ],
            vec![Reference::String(hello)],
        )?;
        code.handlers.push(CatchHandler {
            catches: vec![TypeAddressPair {
                ty: exception,
                address: 2,
            }],
            catch_all: Some(2),
        });
        code.tries.push(TryItem {
            start_address: 0,
            unit_count: 2,
            handler: 0,
        });
        Ok(code)
    }

    #[test]
    fn encodes_tries_and_handlers() -> Result<()> {
        let mut dex = DexFile::new();
        let code = body(&mut dex)?;
        let code = dex.intern(code)?;
        dex.place()?;

        let item = &dex.code_items()[code];
        let mut out = Writer::new(false);
        item.write(&dex, &mut out)?;

        #[rustfmt::skip]
        let expected = [
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, // registers, ins, outs, tries
            0x00, 0x00, 0x00, 0x00, // no debug info
            0x03, 0x00, 0x00, 0x00, // 3 units
            0x1A, 0x00, 0x01, 0x00, 0x0E, 0x00, // "hello" is string 1
            0x00, 0x00, // padding
            0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, // try: start 0, 2 units, handler @1
            0x01, // one handler
            0x7F, 0x00, 0x02, 0x02, // sleb -1: one typed clause plus catch-all
        ];
        assert_eq!(out.data(), &expected);
        assert_eq!(item.size(&dex)?, expected.len() as u32);
        Ok(())
    }

    #[test]
    fn decodes_what_it_encodes() -> Result<()> {
        let mut dex = DexFile::new();
        let code = body(&mut dex)?;
        let code = dex.intern(code)?;
        dex.place()?;
        let bytes = dex.encode()?;

        let parsed = DexFile::from_bytes(&bytes)?;
        let (_, item) = parsed.code_items().iter().next().expect("one code item");
        assert_eq!(
            item.resolved_instructions(&parsed)?,
            dex.code_items()[code].resolved_instructions(&dex)?
        );
        assert_eq!(item.instructions(), &[0x001A, 0x0001, 0x000E]);
        assert_eq!(item.tries, dex.code_items()[code].tries);
        assert_eq!(item.handlers.len(), 1);
        assert_eq!(item.handlers[0].catch_all, Some(2));
        Ok(())
    }

    #[test]
    fn rejects_mismatched_references() -> Result<()> {
        let mut dex = DexFile::new();
        let ty = dex.intern_type("LFoo;")?;
        let result = CodeItem::new(1, 0, 0, vec![0x001A, 0x0000], vec![Reference::Type(ty)]);
        assert!(matches!(result, Err(Error::Format(_))));
        let result = CodeItem::new(1, 0, 0, vec![0x000E], vec![Reference::Type(ty)]);
        assert!(matches!(result, Err(Error::Format(_))));
        Ok(())
    }
}
