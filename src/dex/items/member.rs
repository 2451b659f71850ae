//! `field_id_item` and `method_id_item`, the 8-byte member references.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        items::{ProtoIdItem, StringIdItem, TypeIdItem},
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::to_u16,
    Result,
};

/// `field_id_item`: a reference to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldIdItem {
    /// Defining class
    pub class: Id<TypeIdItem>,
    /// Field type
    pub ty: Id<TypeIdItem>,
    /// Field name
    pub name: Id<StringIdItem>,
}

impl FieldIdItem {
    fn indices(&self, dex: &DexFile) -> Result<(u16, u16, u32)> {
        Ok((
            to_u16(dex.type_ids.index_of(self.class)?, "class type")?,
            to_u16(dex.type_ids.index_of(self.ty)?, "field type")?,
            dex.string_ids.index_of(self.name)?,
        ))
    }
}

impl Item for FieldIdItem {
    const KIND: ItemKind = ItemKind::FieldId;
    type Key = FieldIdItem;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.field_ids
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.field_ids
    }

    fn intern_key(&self) -> Option<FieldIdItem> {
        Some(*self)
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let class = parser.read_le::<u16>()?;
        let ty = parser.read_le::<u16>()?;
        let name = parser.read_le::<u32>()?;
        Ok(FieldIdItem {
            class: ctx.index(u32::from(class))?,
            ty: ctx.index(u32::from(ty))?,
            name: ctx.index(name)?,
        })
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        self.indices(dex)?;
        Ok(8)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        let (class, ty, name) = self.indices(dex)?;
        out.write_le(class);
        out.write_le(ty);
        out.write_le(name);
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.field_ids;
        let (a, b) = (&section[a], &section[b]);
        cx.cmp(a.class, b.class)
            .then_with(|| cx.cmp(a.name, b.name))
            .then_with(|| cx.cmp(a.ty, b.ty))
    }

    fn summary(&self, dex: &DexFile) -> String {
        format!(
            "{}->{}:{}",
            dex.type_descriptor(self.class),
            dex.string(self.name),
            dex.type_descriptor(self.ty)
        )
    }
}

/// `method_id_item`: a reference to a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodIdItem {
    /// Defining class
    pub class: Id<TypeIdItem>,
    /// Prototype
    pub proto: Id<ProtoIdItem>,
    /// Method name
    pub name: Id<StringIdItem>,
}

impl MethodIdItem {
    fn indices(&self, dex: &DexFile) -> Result<(u16, u16, u32)> {
        Ok((
            to_u16(dex.type_ids.index_of(self.class)?, "class type")?,
            to_u16(dex.proto_ids.index_of(self.proto)?, "prototype")?,
            dex.string_ids.index_of(self.name)?,
        ))
    }
}

impl Item for MethodIdItem {
    const KIND: ItemKind = ItemKind::MethodId;
    type Key = MethodIdItem;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.method_ids
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.method_ids
    }

    fn intern_key(&self) -> Option<MethodIdItem> {
        Some(*self)
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let class = parser.read_le::<u16>()?;
        let proto = parser.read_le::<u16>()?;
        let name = parser.read_le::<u32>()?;
        Ok(MethodIdItem {
            class: ctx.index(u32::from(class))?,
            proto: ctx.index(u32::from(proto))?,
            name: ctx.index(name)?,
        })
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        self.indices(dex)?;
        Ok(8)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        let (class, proto, name) = self.indices(dex)?;
        out.write_le(class);
        out.write_le(proto);
        out.write_le(name);
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.method_ids;
        let (a, b) = (&section[a], &section[b]);
        cx.cmp(a.class, b.class)
            .then_with(|| cx.cmp(a.name, b.name))
            .then_with(|| cx.cmp(a.proto, b.proto))
    }

    fn summary(&self, dex: &DexFile) -> String {
        format!(
            "{}->{}{}",
            dex.type_descriptor(self.class),
            dex.string(self.name),
            dex.proto_ids[self.proto].summary(dex)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_encoding() -> Result<()> {
        let mut dex = DexFile::new();
        let field = dex.intern_field("LFoo;", "count", "I")?;
        dex.place()?;

        let item = &dex.fields()[field];
        assert_eq!(item.summary(&dex), "LFoo;->count:I");

        // strings: "I", "LFoo;", "count"; types: I, LFoo;
        let mut out = Writer::new(false);
        item.write(&dex, &mut out)?;
        assert_eq!(out.data(), &[0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn method_summary() -> Result<()> {
        let mut dex = DexFile::new();
        let method = dex.intern_method("LFoo;", "run", "V", &["I", "Ljava/lang/String;"])?;
        assert_eq!(
            dex.methods()[method].summary(&dex),
            "LFoo;->run(ILjava/lang/String;)V"
        );
        Ok(())
    }
}
