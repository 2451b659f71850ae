//! `type_id_item` and `type_list`.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        items::StringIdItem,
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::{to_u16, to_u32},
    Result,
};

/// `type_id_item`: a type, named by its descriptor string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeIdItem {
    /// Descriptor such as `Ljava/lang/Object;` or `[I`
    pub descriptor: Id<StringIdItem>,
}

impl Item for TypeIdItem {
    const KIND: ItemKind = ItemKind::TypeId;
    type Key = Id<StringIdItem>;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.type_ids
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.type_ids
    }

    fn intern_key(&self) -> Option<Id<StringIdItem>> {
        Some(self.descriptor)
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let index = parser.read_le::<u32>()?;
        Ok(TypeIdItem {
            descriptor: ctx.index(index)?,
        })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        Ok(4)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(dex.string_ids.index_of(self.descriptor)?);
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.type_ids;
        cx.cmp(section[a].descriptor, section[b].descriptor)
    }

    fn summary(&self, dex: &DexFile) -> String {
        dex.string(self.descriptor).to_string()
    }
}

/// `type_list`: an ordered list of types, used for parameters and interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeListItem {
    /// The listed types
    pub types: Vec<Id<TypeIdItem>>,
}

impl TypeListItem {
    /// The type list's descriptors joined without separators, e.g. `ILjava/lang/String;`.
    #[must_use]
    pub fn descriptors(&self, dex: &DexFile) -> String {
        self.types
            .iter()
            .map(|&ty| dex.type_descriptor(ty).to_string())
            .collect()
    }
}

impl Item for TypeListItem {
    const KIND: ItemKind = ItemKind::TypeList;
    type Key = Vec<Id<TypeIdItem>>;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.type_lists
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.type_lists
    }

    fn intern_key(&self) -> Option<Vec<Id<TypeIdItem>>> {
        Some(self.types.clone())
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let count = parser.read_le::<u32>()?;
        let mut types = Vec::with_capacity(count.min(0x1_0000) as usize);
        for _ in 0..count {
            let index = parser.read_le::<u16>()?;
            types.push(ctx.index(u32::from(index))?);
        }
        Ok(TypeListItem { types })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        Ok(4 + 2 * to_u32(self.types.len())?)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(to_u32(self.types.len())?);
        for &ty in &self.types {
            let index = dex.type_ids.index_of(ty)?;
            out.write_le(to_u16(index, "type").map_err(|e| {
                e.within(format!("type list entry {}", dex.type_descriptor(ty)))
            })?);
        }
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.type_lists;
        let (a, b) = (&section[a].types, &section[b].types);
        a.iter()
            .zip(b)
            .map(|(&a, &b)| cx.cmp(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len()))
    }

    fn summary(&self, dex: &DexFile) -> String {
        format!("({})", self.descriptors(dex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DexOptions;

    #[test]
    fn type_list_orders_elementwise_then_by_length() -> Result<()> {
        let mut dex = DexFile::with_options(DexOptions::canonical());
        let int = dex.intern_type("I")?;
        let long = dex.intern_type("J")?;
        let short = dex.intern_type_list(&[int])?;
        let longer = dex.intern_type_list(&[int, long])?;
        let other = dex.intern_type_list(&[long])?;

        let cx = SortContext::new(&dex);
        assert_eq!(cx.cmp(short, longer), Ordering::Less);
        assert_eq!(cx.cmp(longer, other), Ordering::Less);
        assert_eq!(dex.type_lists()[longer].descriptors(&dex), "IJ");
        Ok(())
    }

    #[test]
    fn type_list_encoding() -> Result<()> {
        let mut dex = DexFile::new();
        let object = dex.intern_type("Ljava/lang/Object;")?;
        let int = dex.intern_type("I")?;
        let list = dex.intern_type_list(&[object, int])?;
        dex.place()?;

        let item = &dex.type_lists()[list];
        let mut out = Writer::new(false);
        item.write(&dex, &mut out)?;
        // "I" sorts before "Ljava/lang/Object;"
        assert_eq!(out.data(), &[0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(item.size(&dex)?, 8);
        Ok(())
    }
}
