//! `annotation_item`, `annotation_set_item` and `annotation_set_ref_list`.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        kind::ItemKind,
        section::{Id, Section},
        value::EncodedAnnotation,
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::to_u32,
    Result,
};

/// Retention of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Visibility {
    /// Visible at build time only
    Build = 0x00,
    /// Visible at runtime
    Runtime = 0x01,
    /// Visible to the system only
    System = 0x02,
}

impl Visibility {
    fn from_byte(byte: u8) -> Result<Visibility> {
        match byte {
            0x00 => Ok(Visibility::Build),
            0x01 => Ok(Visibility::Runtime),
            0x02 => Ok(Visibility::System),
            other => Err(malformed_error!("invalid annotation visibility 0x{:02x}", other)),
        }
    }
}

/// `annotation_item`: one annotation with its visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationItem {
    /// Retention
    pub visibility: Visibility,
    /// Type and elements
    pub annotation: EncodedAnnotation,
}

impl Item for AnnotationItem {
    const KIND: ItemKind = ItemKind::Annotation;
    type Key = AnnotationItem;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.annotations
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.annotations
    }

    fn intern_key(&self) -> Option<AnnotationItem> {
        Some(self.clone())
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let visibility = Visibility::from_byte(parser.read_le::<u8>()?)?;
        let annotation = EncodedAnnotation::read(parser, ctx)?;
        Ok(AnnotationItem {
            visibility,
            annotation,
        })
    }

    fn size(&self, dex: &DexFile) -> Result<u32> {
        Ok(1 + self.annotation.size(dex)?)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(self.visibility as u8);
        self.annotation.write(dex, out)
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.annotations;
        let (a, b) = (&section[a], &section[b]);
        a.visibility
            .cmp(&b.visibility)
            .then_with(|| a.annotation.compare(&b.annotation, cx))
    }

    fn summary(&self, dex: &DexFile) -> String {
        self.annotation.display(dex)
    }
}

/// `annotation_set_item`: the annotations of one class, field, method or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationSetItem {
    /// Member annotations
    pub annotations: Vec<Id<AnnotationItem>>,
}

impl AnnotationSetItem {
    /// Members in the order they are written: by annotation type index.
    fn sorted(&self, dex: &DexFile) -> Result<Vec<(u32, Id<AnnotationItem>)>> {
        let mut sorted = self
            .annotations
            .iter()
            .map(|&id| {
                let ty = dex.annotations[id].annotation.ty;
                Ok((dex.type_ids.index_of(ty)?, id))
            })
            .collect::<Result<Vec<_>>>()?;
        sorted.sort_by_key(|&(index, _)| index);
        Ok(sorted)
    }
}

impl Item for AnnotationSetItem {
    const KIND: ItemKind = ItemKind::AnnotationSet;
    type Key = Vec<Id<AnnotationItem>>;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.annotation_sets
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.annotation_sets
    }

    fn intern_key(&self) -> Option<Vec<Id<AnnotationItem>>> {
        Some(self.annotations.clone())
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let count = parser.read_le::<u32>()?;
        let mut annotations = Vec::with_capacity(count.min(0x1000) as usize);
        for _ in 0..count {
            let offset = parser.read_le::<u32>()?;
            annotations.push(ctx.offset(offset)?);
        }
        Ok(AnnotationSetItem { annotations })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        Ok(4 + 4 * to_u32(self.annotations.len())?)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(to_u32(self.annotations.len())?);
        for (_, id) in self.sorted(dex)? {
            out.write_le(dex.annotations.offset_of(id)?);
        }
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.annotation_sets;
        cx.cmp_len_then_items(&section[a].annotations, &section[b].annotations)
    }

    fn summary(&self, _dex: &DexFile) -> String {
        format!("{} annotations", self.annotations.len())
    }
}

/// `annotation_set_ref_list`: per-parameter annotation sets of one method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationSetRefListItem {
    /// One entry per parameter; `None` for a parameter without annotations
    pub sets: Vec<Option<Id<AnnotationSetItem>>>,
}

impl Item for AnnotationSetRefListItem {
    const KIND: ItemKind = ItemKind::AnnotationSetRefList;
    type Key = Vec<Option<Id<AnnotationSetItem>>>;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.annotation_set_ref_lists
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.annotation_set_ref_lists
    }

    fn intern_key(&self) -> Option<Vec<Option<Id<AnnotationSetItem>>>> {
        Some(self.sets.clone())
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let count = parser.read_le::<u32>()?;
        let mut sets = Vec::with_capacity(count.min(0x1000) as usize);
        for _ in 0..count {
            let offset = parser.read_le::<u32>()?;
            sets.push(ctx.optional_offset(offset)?);
        }
        Ok(AnnotationSetRefListItem { sets })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        Ok(4 + 4 * to_u32(self.sets.len())?)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(to_u32(self.sets.len())?);
        for set in &self.sets {
            match set {
                Some(set) => out.write_le(dex.annotation_sets.offset_of(*set)?),
                None => out.write_le(0_u32),
            }
        }
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.annotation_set_ref_lists;
        let (a, b) = (&section[a].sets, &section[b].sets);
        a.len().cmp(&b.len()).then_with(|| {
            a.iter()
                .zip(b)
                .map(|(&a, &b)| cx.cmp_opt(a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }

    fn summary(&self, _dex: &DexFile) -> String {
        format!("{} parameters", self.sets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::value::{AnnotationElement, EncodedValue};

    #[test]
    fn annotation_encoding() -> Result<()> {
        let mut dex = DexFile::new();
        let ty = dex.intern_type("Ldalvik/annotation/Signature;")?;
        let name = dex.intern_string("value")?;
        let annotation = dex.intern(AnnotationItem {
            visibility: Visibility::System,
            annotation: EncodedAnnotation {
                ty,
                elements: vec![AnnotationElement {
                    name,
                    value: EncodedValue::Int(7),
                }],
            },
        })?;
        dex.place()?;

        let item = &dex.annotations()[annotation];
        let mut out = Writer::new(false);
        item.write(&dex, &mut out)?;
        // visibility, type 0, one element, name 1, int 7
        assert_eq!(out.data(), &[0x02, 0x00, 0x01, 0x01, 0x04, 0x07]);
        assert_eq!(item.size(&dex)?, 6);
        assert_eq!(item.summary(&dex), "@Ldalvik/annotation/Signature;(value=7)");
        Ok(())
    }

    #[test]
    fn set_written_sorted_by_type_index() -> Result<()> {
        let mut dex = DexFile::new();
        let late = dex.intern_type("Lz/Late;")?;
        let early = dex.intern_type("La/Early;")?;
        let make = |ty| AnnotationItem {
            visibility: Visibility::Runtime,
            annotation: EncodedAnnotation {
                ty,
                elements: Vec::new(),
            },
        };
        let first = dex.intern(make(late))?;
        let second = dex.intern(make(early))?;
        let set = dex.intern(AnnotationSetItem {
            annotations: vec![first, second],
        })?;
        dex.place()?;

        let mut out = Writer::new(false);
        dex.annotation_sets()[set].write(&dex, &mut out)?;
        let mut expected = 2_u32.to_le_bytes().to_vec();
        expected.extend_from_slice(&dex.offset_of(second)?.to_le_bytes());
        expected.extend_from_slice(&dex.offset_of(first)?.to_le_bytes());
        assert_eq!(out.data(), expected.as_slice());
        Ok(())
    }

    #[test]
    fn invalid_visibility() {
        assert!(Visibility::from_byte(3).is_err());
        assert_eq!(Visibility::from_byte(1).unwrap(), Visibility::Runtime);
    }
}
