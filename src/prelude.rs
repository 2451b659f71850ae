//! # dexscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dexscope library. Import this module to get quick access to the essential
//! types for reading, building and writing DEX containers.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dexscope operations
pub use crate::Error;

/// The result type used throughout dexscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The container and its pipeline state
pub use crate::dex::{DexFile, DexState};

/// Layout and encoding options
pub use crate::dex::{DexOptions, DexVersion, LayoutMode};

/// Low-level file parsing utilities
pub use crate::file::{parser::Parser, Input};

// ================================================================================================
// Item Model
// ================================================================================================

/// Item contract, storage and handles
pub use crate::dex::{Id, Item, ItemKind, Placement, Section};

/// Layout derived by placement
pub use crate::dex::{Layout, MapEntry};

// ================================================================================================
// Item Kinds
// ================================================================================================

/// Strings, types and prototypes
pub use crate::dex::items::{
    DexString, ProtoIdItem, StringDataItem, StringIdItem, TypeIdItem, TypeListItem,
};

/// Member references
pub use crate::dex::items::{FieldIdItem, MethodIdItem};

/// Class definitions and their members
pub use crate::dex::items::{
    AccessFlags, ClassDataItem, ClassDefItem, EncodedField, EncodedMethod,
};

/// Method bodies
pub use crate::dex::items::{
    CatchHandler, CodeItem, DebugInfoItem, DebugInstruction, Reference, TryItem,
    TypeAddressPair,
};

/// Annotations and static values
pub use crate::dex::items::{
    AnnotationItem, AnnotationSetItem, AnnotationSetRefListItem, AnnotationsDirectoryItem,
    EncodedArrayItem, FieldAnnotation, MethodAnnotation, ParameterAnnotation, Visibility,
};

/// Encoded values
pub use crate::dex::value::{AnnotationElement, EncodedAnnotation, EncodedValue};
