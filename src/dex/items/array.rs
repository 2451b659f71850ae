//! `encoded_array_item`, used for static field initial values.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        kind::ItemKind,
        section::{Id, Section},
        value::EncodedValue,
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    Result,
};

/// `encoded_array_item`: a list of constant values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedArrayItem {
    /// The values, in order
    pub values: Vec<EncodedValue>,
}

impl Item for EncodedArrayItem {
    const KIND: ItemKind = ItemKind::EncodedArray;
    type Key = Vec<EncodedValue>;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.encoded_arrays
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.encoded_arrays
    }

    fn intern_key(&self) -> Option<Vec<EncodedValue>> {
        Some(self.values.clone())
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        Ok(EncodedArrayItem {
            values: EncodedValue::read_array(parser, ctx)?,
        })
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        EncodedValue::array_size(&self.values, dex)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        EncodedValue::write_array(&self.values, dex, out)
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.encoded_arrays;
        EncodedValue::compare_arrays(&section[a].values, &section[b].values, cx)
    }

    fn summary(&self, dex: &DexFile) -> String {
        EncodedValue::Array(self.values.clone()).display(dex)
    }
}
