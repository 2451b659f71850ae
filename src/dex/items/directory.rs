//! `annotations_directory_item`.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        items::{
            AnnotationSetItem, AnnotationSetRefListItem, FieldIdItem, MethodIdItem, TypeIdItem,
        },
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::to_u32,
    Result,
};

/// Annotations of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldAnnotation {
    /// The annotated field
    pub field: Id<FieldIdItem>,
    /// Its annotations
    pub annotations: Id<AnnotationSetItem>,
}

/// Annotations of one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodAnnotation {
    /// The annotated method
    pub method: Id<MethodIdItem>,
    /// Its annotations
    pub annotations: Id<AnnotationSetItem>,
}

/// Parameter annotations of one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterAnnotation {
    /// The method whose parameters are annotated
    pub method: Id<MethodIdItem>,
    /// One annotation set per parameter
    pub annotations: Id<AnnotationSetRefListItem>,
}

/// `annotations_directory_item`: every annotation attached to one class and its members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AnnotationsDirectoryItem {
    /// Annotations on the class itself
    pub class_annotations: Option<Id<AnnotationSetItem>>,
    /// Field annotations
    pub fields: Vec<FieldAnnotation>,
    /// Method annotations
    pub methods: Vec<MethodAnnotation>,
    /// Parameter annotations
    pub parameters: Vec<ParameterAnnotation>,
}

impl AnnotationsDirectoryItem {
    /// The class this directory belongs to, derived from its first member annotation.
    ///
    /// A directory holding only class annotations can be shared by several classes and has
    /// no single owner.
    #[must_use]
    pub fn owner(&self, dex: &DexFile) -> Option<Id<TypeIdItem>> {
        self.fields
            .first()
            .map(|entry| dex.field_ids[entry.field].class)
            .or_else(|| {
                self.methods
                    .first()
                    .map(|entry| dex.method_ids[entry.method].class)
            })
            .or_else(|| {
                self.parameters
                    .first()
                    .map(|entry| dex.method_ids[entry.method].class)
            })
    }

    fn sorted_by_index<T: Copy>(
        entries: &[T],
        index: impl Fn(&T) -> Result<u32>,
    ) -> Result<Vec<(u32, T)>> {
        let mut sorted = entries
            .iter()
            .map(|entry| Ok((index(entry)?, *entry)))
            .collect::<Result<Vec<_>>>()?;
        sorted.sort_by_key(|&(index, _)| index);
        Ok(sorted)
    }
}

impl Item for AnnotationsDirectoryItem {
    const KIND: ItemKind = ItemKind::AnnotationsDirectory;
    type Key = AnnotationsDirectoryItem;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.annotations_directories
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.annotations_directories
    }

    fn intern_key(&self) -> Option<AnnotationsDirectoryItem> {
        Some(self.clone())
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let class_annotations = parser.read_le::<u32>()?;
        let field_count = parser.read_le::<u32>()?;
        let method_count = parser.read_le::<u32>()?;
        let parameter_count = parser.read_le::<u32>()?;

        let mut directory = AnnotationsDirectoryItem {
            class_annotations: ctx.optional_offset(class_annotations)?,
            ..AnnotationsDirectoryItem::default()
        };

        for _ in 0..field_count {
            let field = parser.read_le::<u32>()?;
            let annotations = parser.read_le::<u32>()?;
            directory.fields.push(FieldAnnotation {
                field: ctx.index(field)?,
                annotations: ctx.offset(annotations)?,
            });
        }
        for _ in 0..method_count {
            let method = parser.read_le::<u32>()?;
            let annotations = parser.read_le::<u32>()?;
            directory.methods.push(MethodAnnotation {
                method: ctx.index(method)?,
                annotations: ctx.offset(annotations)?,
            });
        }
        for _ in 0..parameter_count {
            let method = parser.read_le::<u32>()?;
            let annotations = parser.read_le::<u32>()?;
            directory.parameters.push(ParameterAnnotation {
                method: ctx.index(method)?,
                annotations: ctx.offset(annotations)?,
            });
        }

        Ok(directory)
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        let entries = self.fields.len() + self.methods.len() + self.parameters.len();
        Ok(16 + 8 * to_u32(entries)?)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        match self.class_annotations {
            Some(set) => out.write_le(dex.annotation_sets.offset_of(set)?),
            None => out.write_le(0_u32),
        }
        out.write_le(to_u32(self.fields.len())?);
        out.write_le(to_u32(self.methods.len())?);
        out.write_le(to_u32(self.parameters.len())?);

        for (index, entry) in
            Self::sorted_by_index(&self.fields, |entry| dex.field_ids.index_of(entry.field))?
        {
            out.write_le(index);
            out.write_le(dex.annotation_sets.offset_of(entry.annotations)?);
        }
        for (index, entry) in
            Self::sorted_by_index(&self.methods, |entry| dex.method_ids.index_of(entry.method))?
        {
            out.write_le(index);
            out.write_le(dex.annotation_sets.offset_of(entry.annotations)?);
        }
        for (index, entry) in Self::sorted_by_index(&self.parameters, |entry| {
            dex.method_ids.index_of(entry.method)
        })? {
            out.write_le(index);
            out.write_le(dex.annotation_set_ref_lists.offset_of(entry.annotations)?);
        }
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.annotations_directories;
        let (a, b) = (&section[a], &section[b]);
        match (a.owner(cx.dex), b.owner(cx.dex)) {
            (Some(a), Some(b)) => cx.cmp(a, b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => cx.cmp_opt(a.class_annotations, b.class_annotations),
        }
    }

    fn summary(&self, dex: &DexFile) -> String {
        self.owner(dex)
            .map(|owner| dex.type_descriptor(owner).to_string())
            .unwrap_or_default()
    }
}
