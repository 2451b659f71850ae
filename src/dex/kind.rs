//! The closed set of item kinds a container holds.
//!
//! [`ItemKind`] carries the per-kind constants of the format: the map type code, the
//! alignment of each item, and the smallest encoding an item of the kind can have. The latter
//! bounds how many items a section of a given length can possibly declare.
//!
//! Three fixed orders drive the pipeline:
//!
//! - [`PARSE_ORDER`] - sections in dependency order, so index references resolve against
//!   tables that are already complete
//! - [`INDEXED_ORDER`] - the six index tables, in header order
//! - [`OFFSETTED_ORDER`] - the data sections, in the order placement lays them out

use std::fmt;

use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// Identifies the kind of an item and, through it, its section.
///
/// The discriminant is the kind's code in the map list.
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ItemKind {
    /// The fixed-size file header
    Header = 0x0000,
    /// `string_id_item`
    StringId = 0x0001,
    /// `type_id_item`
    TypeId = 0x0002,
    /// `proto_id_item`
    ProtoId = 0x0003,
    /// `field_id_item`
    FieldId = 0x0004,
    /// `method_id_item`
    MethodId = 0x0005,
    /// `class_def_item`
    ClassDef = 0x0006,
    /// The table of contents
    MapList = 0x1000,
    /// `type_list`
    TypeList = 0x1001,
    /// `annotation_set_ref_list`
    AnnotationSetRefList = 0x1002,
    /// `annotation_set_item`
    AnnotationSet = 0x1003,
    /// `class_data_item`
    ClassData = 0x2000,
    /// `code_item`
    Code = 0x2001,
    /// `string_data_item`
    StringData = 0x2002,
    /// `debug_info_item`
    DebugInfo = 0x2003,
    /// `annotation_item`
    Annotation = 0x2004,
    /// `encoded_array_item`
    EncodedArray = 0x2005,
    /// `annotations_directory_item`
    AnnotationsDirectory = 0x2006,
}

/// Indexed sections in canonical placement order.
pub const INDEXED_ORDER: [ItemKind; 6] = [
    ItemKind::StringId,
    ItemKind::TypeId,
    ItemKind::ProtoId,
    ItemKind::FieldId,
    ItemKind::MethodId,
    ItemKind::ClassDef,
];

/// Offsetted sections in canonical placement order.
pub const OFFSETTED_ORDER: [ItemKind; 10] = [
    ItemKind::AnnotationSetRefList,
    ItemKind::AnnotationSet,
    ItemKind::Code,
    ItemKind::AnnotationsDirectory,
    ItemKind::TypeList,
    ItemKind::StringData,
    ItemKind::Annotation,
    ItemKind::EncodedArray,
    ItemKind::ClassData,
    ItemKind::DebugInfo,
];

/// Sections in the order they are parsed, so that every reference resolved by index finds its
/// section already complete.
pub const PARSE_ORDER: [ItemKind; 16] = [
    ItemKind::StringData,
    ItemKind::StringId,
    ItemKind::TypeId,
    ItemKind::TypeList,
    ItemKind::ProtoId,
    ItemKind::FieldId,
    ItemKind::MethodId,
    ItemKind::Annotation,
    ItemKind::AnnotationSet,
    ItemKind::AnnotationSetRefList,
    ItemKind::AnnotationsDirectory,
    ItemKind::DebugInfo,
    ItemKind::Code,
    ItemKind::ClassData,
    ItemKind::EncodedArray,
    ItemKind::ClassDef,
];

impl ItemKind {
    /// Code of this kind in the map list.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Looks up a kind by its map list code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<ItemKind> {
        ItemKind::iter().find(|kind| kind.code() == code)
    }

    /// Byte alignment every item of this kind starts on.
    #[must_use]
    pub fn alignment(self) -> u32 {
        match self {
            ItemKind::ClassData
            | ItemKind::StringData
            | ItemKind::DebugInfo
            | ItemKind::Annotation
            | ItemKind::EncodedArray => 1,
            _ => 4,
        }
    }

    /// Smallest encoding of one item of this kind, padding excluded.
    #[must_use]
    pub fn min_size(self) -> u32 {
        match self {
            ItemKind::Header => 0x70,
            ItemKind::ClassDef => 32,
            ItemKind::Code | ItemKind::AnnotationsDirectory => 16,
            ItemKind::ProtoId => 12,
            ItemKind::FieldId | ItemKind::MethodId => 8,
            ItemKind::StringId
            | ItemKind::TypeId
            | ItemKind::MapList
            | ItemKind::TypeList
            | ItemKind::AnnotationSetRefList
            | ItemKind::AnnotationSet
            | ItemKind::ClassData => 4,
            ItemKind::DebugInfo | ItemKind::Annotation => 3,
            ItemKind::StringData => 2,
            ItemKind::EncodedArray => 1,
        }
    }

    /// Whether items of this kind are referenced by index rather than by offset.
    #[must_use]
    pub fn is_indexed(self) -> bool {
        self.code() < ItemKind::MapList.code()
    }

    /// Name of this kind as used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ItemKind::Header => "header_item",
            ItemKind::StringId => "string_id_item",
            ItemKind::TypeId => "type_id_item",
            ItemKind::ProtoId => "proto_id_item",
            ItemKind::FieldId => "field_id_item",
            ItemKind::MethodId => "method_id_item",
            ItemKind::ClassDef => "class_def_item",
            ItemKind::MapList => "map_list",
            ItemKind::TypeList => "type_list",
            ItemKind::AnnotationSetRefList => "annotation_set_ref_list",
            ItemKind::AnnotationSet => "annotation_set_item",
            ItemKind::ClassData => "class_data_item",
            ItemKind::Code => "code_item",
            ItemKind::StringData => "string_data_item",
            ItemKind::DebugInfo => "debug_info_item",
            ItemKind::Annotation => "annotation_item",
            ItemKind::EncodedArray => "encoded_array_item",
            ItemKind::AnnotationsDirectory => "annotations_directory_item",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
