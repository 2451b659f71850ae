//! `class_def_item` and the access flags shared by classes and members.

use std::cmp::Ordering;

use bitflags::bitflags;

use crate::{
    dex::{
        config::LayoutMode,
        context::{ReadContext, NO_INDEX},
        item::{Item, SortContext},
        items::{
            AnnotationsDirectoryItem, ClassDataItem, EncodedArrayItem, StringIdItem, TypeIdItem,
            TypeListItem,
        },
        kind::ItemKind,
        placer::ClassDefPlacer,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access flags of classes, fields and methods
    pub struct AccessFlags : u32 {
        /// Visible everywhere
        const PUBLIC = 0x0001;
        /// Visible to the defining class only
        const PRIVATE = 0x0002;
        /// Visible to the package and subclasses
        const PROTECTED = 0x0004;
        /// Not bound to an instance
        const STATIC = 0x0008;
        /// Not subclassable or modifiable
        const FINAL = 0x0010;
        /// Method acquires the monitor
        const SYNCHRONIZED = 0x0020;
        /// Field with special access rules; on methods, a compiler-generated bridge
        const VOLATILE = 0x0040;
        /// Compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Field not serialized; on methods, takes a variable argument count
        const TRANSIENT = 0x0080;
        /// Method takes a variable argument count
        const VARARGS = 0x0080;
        /// Implemented in native code
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Not directly instantiable or callable
        const ABSTRACT = 0x0400;
        /// Strict floating point
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Class is an annotation type
        const ANNOTATION = 0x2000;
        /// Class or field is an enum
        const ENUM = 0x4000;
        /// Constructor method
        const CONSTRUCTOR = 0x1_0000;
        /// Declared `synchronized`
        const DECLARED_SYNCHRONIZED = 0x2_0000;
    }
}

/// `class_def_item`: the definition of a class in this container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassDefItem {
    /// The defined class
    pub class: Id<TypeIdItem>,
    /// Class access flags
    pub access_flags: AccessFlags,
    /// Direct superclass, absent only for `java.lang.Object`
    pub superclass: Option<Id<TypeIdItem>>,
    /// Directly implemented interfaces
    pub interfaces: Option<Id<TypeListItem>>,
    /// Name of the source file
    pub source_file: Option<Id<StringIdItem>>,
    /// Annotations on the class and its members
    pub annotations: Option<Id<AnnotationsDirectoryItem>>,
    /// Fields and methods
    pub class_data: Option<Id<ClassDataItem>>,
    /// Initial values of static fields
    pub static_values: Option<Id<EncodedArrayItem>>,
}

impl ClassDefItem {
    /// A definition of `class` with no members or metadata.
    #[must_use]
    pub fn new(
        class: Id<TypeIdItem>,
        access_flags: AccessFlags,
        superclass: Option<Id<TypeIdItem>>,
    ) -> Self {
        ClassDefItem {
            class,
            access_flags,
            superclass,
            interfaces: None,
            source_file: None,
            annotations: None,
            class_data: None,
            static_values: None,
        }
    }
}

fn optional_index<T: Item>(dex: &DexFile, id: Option<Id<T>>) -> Result<u32> {
    id.map_or(Ok(NO_INDEX), |id| T::section(dex).index_of(id))
}

fn optional_offset<T: Item>(dex: &DexFile, id: Option<Id<T>>) -> Result<u32> {
    id.map_or(Ok(0), |id| T::section(dex).offset_of(id))
}

impl Item for ClassDefItem {
    const KIND: ItemKind = ItemKind::ClassDef;
    type Key = Id<TypeIdItem>;

    fn section(dex: &DexFile) -> &Section<Self> {
        &dex.class_defs
    }

    fn section_mut(dex: &mut DexFile) -> &mut Section<Self> {
        &mut dex.class_defs
    }

    fn intern_key(&self) -> Option<Id<TypeIdItem>> {
        Some(self.class)
    }

    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let class = parser.read_le::<u32>()?;
        let access_flags = AccessFlags::from_bits_retain(parser.read_le::<u32>()?);
        let superclass = parser.read_le::<u32>()?;
        let interfaces = parser.read_le::<u32>()?;
        let source_file = parser.read_le::<u32>()?;
        let annotations = parser.read_le::<u32>()?;
        let class_data = parser.read_le::<u32>()?;
        let static_values = parser.read_le::<u32>()?;

        Ok(ClassDefItem {
            class: ctx.index(class)?,
            access_flags,
            superclass: ctx.optional_index(superclass)?,
            interfaces: ctx.optional_offset(interfaces)?,
            source_file: ctx.optional_index(source_file)?,
            annotations: ctx.optional_offset(annotations)?,
            class_data: ctx.optional_offset(class_data)?,
            static_values: ctx.optional_offset(static_values)?,
        })
    }

    fn size(&self, _dex: &DexFile) -> Result<u32> {
        Ok(32)
    }

    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_le(dex.type_ids.index_of(self.class)?);
        out.write_le(self.access_flags.bits());
        out.write_le(optional_index(dex, self.superclass)?);
        out.write_le(optional_offset(dex, self.interfaces)?);
        out.write_le(optional_index(dex, self.source_file)?);
        out.write_le(optional_offset(dex, self.annotations)?);
        out.write_le(optional_offset(dex, self.class_data)?);
        out.write_le(optional_offset(dex, self.static_values)?);
        Ok(())
    }

    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering {
        let section = &cx.dex.class_defs;
        cx.cmp(section[a].class, section[b].class)
    }

    fn summary(&self, dex: &DexFile) -> String {
        dex.type_descriptor(self.class).to_string()
    }

    fn arrange(dex: &DexFile, mode: LayoutMode) -> Result<Vec<Id<Self>>> {
        match mode {
            LayoutMode::InPlace => Ok(dex.class_defs.ids().to_vec()),
            LayoutMode::Natural => ClassDefPlacer::new(dex, false).order(),
            LayoutMode::Canonical => ClassDefPlacer::new(dex, true).order(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_keep_unknown_bits() {
        let flags = AccessFlags::from_bits_retain(0x0001 | 0x0010 | 0x8000_0000);
        assert!(flags.contains(AccessFlags::PUBLIC | AccessFlags::FINAL));
        assert_eq!(flags.bits(), 0x8000_0011);
        assert_eq!(AccessFlags::BRIDGE, AccessFlags::VOLATILE);
    }

    #[test]
    fn class_def_encoding() -> Result<()> {
        let mut dex = DexFile::new();
        let object = dex.intern_type("Ljava/lang/Object;")?;
        let foo = dex.intern_type("LFoo;")?;
        let source = dex.intern_string("Foo.java")?;
        let mut def = ClassDefItem::new(foo, AccessFlags::PUBLIC, Some(object));
        def.source_file = Some(source);
        let def = dex.intern(def)?;
        dex.place()?;

        let item = &dex.class_defs()[def];
        let mut out = Writer::new(false);
        item.write(&dex, &mut out)?;

        // strings: "Foo.java", "LFoo;", "Ljava/lang/Object;"; types: LFoo;, Ljava/lang/Object;
        let expected: Vec<u8> = [0_u32, 1, 1, 0, 0, 0, 0, 0]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect();
        assert_eq!(out.data(), expected.as_slice());
        assert_eq!(item.summary(&dex), "LFoo;");
        Ok(())
    }
}
