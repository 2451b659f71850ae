//! `class_data_item`: the fields and methods a class defines.

use std::{cmp::Ordering, collections::HashSet};

use crate::{
    dex::{
        context::ReadContext,
        item::{measure, Item, SortContext},
        items::{AccessFlags, CodeItem, FieldIdItem, MethodIdItem, TypeIdItem},
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::to_u32,
    Result,
};

/// A field defined by a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedField {
    /// The field
    pub field: Id<FieldIdItem>,
    /// Field access flags
    pub access_flags: AccessFlags,
}

/// A method defined by a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedMethod {
    /// The method
    pub method: Id<MethodIdItem>,
    /// Method access flags
    pub access_flags: AccessFlags,
    /// Body, absent for abstract and native methods
    pub code: Option<Id<CodeItem>>,
}

/// `class_data_item`: member lists of one class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ClassDataItem {
    /// Static fields
    pub static_fields: Vec<EncodedField>,
    /// Instance fields
    pub instance_fields: Vec<EncodedField>,
    /// Static, private and constructor methods
    pub direct_methods: Vec<EncodedMethod>,
    /// Overridable methods
    pub virtual_methods: Vec<EncodedMethod>,
}

fn dedup_by<T: Copy, K: Eq + std::hash::Hash>(items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

impl ClassDataItem {
    /// Builds member lists, dropping repeated members.
    ///
    /// # Errors
    /// Returns [`crate::Error::Format`] if a method is listed as both direct and virtual.
    pub fn new(
        static_fields: Vec<EncodedField>,
        instance_fields: Vec<EncodedField>,
        direct_methods: Vec<EncodedMethod>,
        virtual_methods: Vec<EncodedMethod>,
    ) -> Result<Self> {
        let direct_methods = dedup_by(direct_methods, |entry| entry.method);
        let virtual_methods = dedup_by(virtual_methods, |entry| entry.method);

        let direct: HashSet<_> = direct_methods.iter().map(|entry| entry.method).collect();
        if let Some(both) = virtual_methods
            .iter()
            .find(|entry| direct.contains(&entry.method))
        {
            return Err(format_error!(
                "method {:?} is listed as both direct and virtual",
                both.method
            ));
        }

        Ok(ClassDataItem {
            static_fields: dedup_by(static_fields, |entry| entry.field),
            instance_fields: dedup_by(instance_fields, |entry| entry.field),
            direct_methods,
            virtual_methods,
        })
    }

    /// True when the class defines no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.static_fields.is_empty()
            && self.instance_fields.is_empty()
            && self.direct_methods.is_empty()
            && self.virtual_methods.is_empty()
    }

    /// The class owning these members, taken from the first member.
    #[must_use]
    pub fn owner(&self, dex: &DexFile) -> Option<Id<TypeIdItem>> {
        self.static_fields
            .iter()
            .chain(&self.instance_fields)
            .map(|entry| dex.field_ids[entry.field].class)
            .chain(
                self.direct_methods
                    .iter()
                    .chain(&self.virtual_methods)
                    .map(|entry| dex.method_ids[entry.method].class),
            )
            .next()
    }

    fn read_fields(
        parser: &mut Parser<'_>,
        ctx: &ReadContext<'_>,
        count: u32,
    ) -> Result<Vec<EncodedField>> {
        let mut fields = Vec::with_capacity(count.min(0x1000) as usize);
        let mut index = 0_u32;
        for _ in 0..count {
            index = index
                .checked_add(parser.read_uleb128()?)
                .ok_or_else(|| malformed_error!("field index delta overflows"))?;
            let access_flags = AccessFlags::from_bits_retain(parser.read_uleb128()?);
            fields.push(EncodedField {
                field: ctx.index(index)?,
                access_flags,
            });
        }
        Ok(fields)
    }

    fn read_methods(
        parser: &mut Parser<'_>,
        ctx: &mut ReadContext<'_>,
        count: u32,
    ) -> Result<Vec<EncodedMethod>> {
        let mut methods = Vec::with_capacity(count.min(0x1000) as usize);
        let mut index = 0_u32;
        for _ in 0..count {
            index = index
                .checked_add(parser.read_uleb128()?)
                .ok_or_else(|| malformed_error!("method index delta overflows"))?;
            let access_flags = AccessFlags::from_bits_retain(parser.read_uleb128()?);
            let code = parser.read_uleb128()?;
            let code = if ctx.dex().options().skip_instructions {
                None
            } else {
                ctx.optional_offset(code)?
            };
            methods.push(EncodedMethod {
                method: ctx.index(index)?,
                access_flags,
                code,
            });
        }
        Ok(methods)
    }

    fn write_fields(fields: &[EncodedField], dex: &DexFile, out: &mut Writer) -> Result<()> {
        let mut sorted = fields
            .iter()
            .map(|entry| Ok((dex.field_ids.index_of(entry.field)?, entry)))
            .collect::<Result<Vec<_>>>()?;
        sorted.sort_by_key(|&(index, _)| index);

        let mut previous = 0;
        for (index, entry) in sorted {
            out.write_uleb128(index - previous);
            out.write_uleb128(entry.access_flags.bits());
            previous = index;
        }
        Ok(())
    }

    fn write_methods(methods: &[EncodedMethod], dex: &DexFile, out: &mut Writer) -> Result<()> {
        let mut sorted = methods
            .iter()
            .map(|entry| Ok((dex.method_ids.index_of(entry.method)?, entry)))
            .collect::<Result<Vec<_>>>()?;
        sorted.sort_by_key(|&(index, _)| index);

        let mut previous = 0;
        for (index, entry) in sorted {
            out.write_uleb128(index - previous);
            out.write_uleb128(entry.access_flags.bits());
            match entry.code {
                Some(code) => out.write_uleb128(dex.code_items.offset_of(code)?),
                None => out.write_uleb128(0),
            }
            previous = index;
        }
        Ok(())
    }
}

impl Item for ClassDataItem {
    const KIND: ItemKind = ItemKind::ClassData;
    type Key = ClassDataItem;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.class_data
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.class_data
    }

    fn intern_key(&self) -> Option<ClassDataItem> {
        Some(self.clone())
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let static_count = parser.read_uleb128()?;
        let instance_count = parser.read_uleb128()?;
        let direct_count = parser.read_uleb128()?;
        let virtual_count = parser.read_uleb128()?;

        Ok(ClassDataItem {
            static_fields: Self::read_fields(parser, ctx, static_count)?,
            instance_fields: Self::read_fields(parser, ctx, instance_count)?,
            direct_methods: Self::read_methods(parser, ctx, direct_count)?,
            virtual_methods: Self::read_methods(parser, ctx, virtual_count)?,
        })
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        measure(|out| self.write(dex, out))
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_uleb128(to_u32(self.static_fields.len())?);
        out.write_uleb128(to_u32(self.instance_fields.len())?);
        out.write_uleb128(to_u32(self.direct_methods.len())?);
        out.write_uleb128(to_u32(self.virtual_methods.len())?);
        Self::write_fields(&self.static_fields, dex, out)?;
        Self::write_fields(&self.instance_fields, dex, out)?;
        Self::write_methods(&self.direct_methods, dex, out)?;
        Self::write_methods(&self.virtual_methods, dex, out)
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.class_data;
        cx.cmp_opt(section[a].owner(cx.dex), section[b].owner(cx.dex))
    }

    fn summary(&self, dex: &DexFile) -> String {
        self.owner(dex)
            .map(|owner| dex.type_descriptor(owner).to_string())
            .unwrap_or_default()
    }
}
