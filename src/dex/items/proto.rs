//! `proto_id_item`.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        items::{StringIdItem, TypeIdItem, TypeListItem},
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    Result,
};

/// `proto_id_item`: a method prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtoIdItem {
    /// Short-form descriptor, one character per type with references collapsed to `L`
    pub shorty: Id<StringIdItem>,
    /// Return type
    pub return_type: Id<TypeIdItem>,
    /// Parameter types, absent for a prototype without parameters
    pub parameters: Option<Id<TypeListItem>>,
}

/// Builds the short-form descriptor for a return type and parameter list.
///
/// Every descriptor contributes its first character; descriptors longer than one character
/// (classes and arrays) contribute `L`.
#[must_use]
pub fn shorty_descriptor<'a>(types: impl IntoIterator<Item = &'a str>) -> String {
    types
        .into_iter()
        .map(|descriptor| {
            let mut chars = descriptor.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => 'L',
            }
        })
        .collect()
}

impl Item for ProtoIdItem {
    const KIND: ItemKind = ItemKind::ProtoId;
    type Key = ProtoIdItem;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.proto_ids
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.proto_ids
    }

    fn intern_key(&self) -> Option<ProtoIdItem> {
        Some(*self)
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let shorty = parser.read_le::<u32>()?;
        let return_type = parser.read_le::<u32>()?;
        let parameters = parser.read_le::<u32>()?;
        Ok(ProtoIdItem {
            shorty: ctx.index(shorty)?,
            return_type: ctx.index(return_type)?,
            parameters: ctx.optional_offset(parameters)?,
        })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        Ok(12)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(dex.string_ids.index_of(self.shorty)?);
        out.write_le(dex.type_ids.index_of(self.return_type)?);
        match self.parameters {
            Some(parameters) => out.write_le(dex.type_lists.offset_of(parameters)?),
            None => out.write_le(0_u32),
        }
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.proto_ids;
        let (a, b) = (&section[a], &section[b]);
        cx.cmp(a.return_type, b.return_type)
            .then_with(|| cx.cmp_opt(a.parameters, b.parameters))
    }

    fn summary(&self, dex: &DexFile) -> String {
        let parameters = self
            .parameters
            .map(|list| dex.type_lists[list].descriptors(dex))
            .unwrap_or_default();
        format!("({parameters}){}", dex.type_descriptor(self.return_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorty_collapses_references() {
        assert_eq!(shorty_descriptor(["V"]), "V");
        assert_eq!(
            shorty_descriptor(["Ljava/lang/String;", "I", "[J", "Z"]),
            "LILZ"
        );
    }

    #[test]
    fn proto_summary_and_ordering() -> Result<()> {
        let mut dex = DexFile::new();
        let void = dex.intern_type("V")?;
        let int = dex.intern_type("I")?;
        let string = dex.intern_type("Ljava/lang/String;")?;

        let no_args = dex.intern_proto(void, &[])?;
        let one_arg = dex.intern_proto(void, &[int])?;
        let returns_int = dex.intern_proto(int, &[string, int])?;

        assert_eq!(dex.protos()[no_args].parameters, None);
        assert_eq!(dex.protos()[returns_int].summary(&dex), "(Ljava/lang/String;I)I");
        assert_eq!(dex.string(dex.protos()[returns_int].shorty).to_string(), "ILI");

        let cx = SortContext::new(&dex);
        assert_eq!(cx.cmp(no_args, one_arg), Ordering::Less);
        // "I" < "V"
        assert_eq!(cx.cmp(returns_int, no_args), Ordering::Less);
        Ok(())
    }
}
