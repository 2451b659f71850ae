//! The contract every record kind implements.
//!
//! An [`Item`] knows how to decode itself from a [`Parser`] positioned at its offset, how many
//! bytes it occupies once every item it references has been placed, how to encode itself, and
//! how it orders against its siblings when a section is sorted. Storage, interning and
//! placement state live in [`crate::dex::Section`], so items themselves are plain values.

use std::{cmp::Ordering, collections::HashMap, hash::Hash};

use crate::{
    dex::{
        config::LayoutMode,
        context::ReadContext,
        items::{CodeItem, DebugInfoItem, MethodIdItem},
        kind::ItemKind,
        section::{Id, Section},
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::to_u32,
    Result,
};

/// A record kind stored in its own section of a container.
pub trait Item: Sized {
    /// The kind, which fixes the section, alignment and map code.
    const KIND: ItemKind;

    /// Structural content used for interning.
    type Key: Eq + Hash;

    /// This kind's section of `dex`.
    fn section(dex: &DexFile) -> &Section<Self>;

    /// This kind's section of `dex`, mutably.
    fn section_mut(dex: &mut DexFile) -> &mut Section<Self>;

    /// The interning key, or `None` for kinds that are only ever equal to themselves.
    fn intern_key(&self) -> Option<Self::Key>;

    /// Decodes one item at the parser's position.
    ///
    /// # Errors
    /// Any decoding or reference resolution failure.
    fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<Self>;

    /// Encoded size in bytes, excluding alignment padding in front of the item.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] when a referenced item that determines the size has not
    /// been placed, or [`crate::Error::Overflow`] when a reference outgrows its field.
    fn size(&self, dex: &DexFile) -> Result<u32>;

    /// Encodes the item; every referenced item must already be placed.
    ///
    /// # Errors
    /// Same conditions as [`Item::size`].
    fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()>;

    /// Orders two items of this kind for section sorting.
    fn compare(cx: &SortContext<'_>, a: Id<Self>, b: Id<Self>) -> Ordering;

    /// Salient content shown in diagnostics, empty when there is nothing short to show.
    fn summary(&self, _dex: &DexFile) -> String {
        String::new()
    }

    /// The order in which this kind's section is placed under `mode`.
    ///
    /// In-place layout keeps the current order. Natural layout sorts only the indexed
    /// sections, whose order the format fixes; canonical layout sorts every section.
    ///
    /// # Errors
    /// Kinds with a bespoke placement order may reject the container's contents.
    fn arrange(dex: &DexFile, mode: LayoutMode) -> Result<Vec<Id<Self>>> {
        let mut ids = Self::section(dex).ids().to_vec();
        let sort = match mode {
            LayoutMode::InPlace => false,
            LayoutMode::Natural => Self::KIND.is_indexed(),
            LayoutMode::Canonical => true,
        };
        if sort {
            let cx = SortContext::new(dex);
            ids.sort_by(|&a, &b| cx.cmp(a, b));
        }
        Ok(ids)
    }
}

/// Size of a variable-length record, measured by encoding it into a scratch buffer.
pub(crate) fn measure(encode: impl FnOnce(&mut Writer) -> Result<()>) -> Result<u32> {
    let mut scratch = Writer::new(false);
    encode(&mut scratch)?;
    to_u32(scratch.data().len())
}

/// Ordering state shared by one sorting pass.
///
/// Most kinds order by content alone. Code and debug info records order by the method that
/// owns them, which is only known by scanning the class data of the whole container, so that
/// scan happens once here.
pub struct SortContext<'a> {
    /// The container whose items are being ordered
    pub dex: &'a DexFile,
    code_owners: HashMap<Id<CodeItem>, Id<MethodIdItem>>,
    debug_owners: HashMap<Id<DebugInfoItem>, Id<CodeItem>>,
}

impl<'a> SortContext<'a> {
    /// Scans `dex` for the owners of code and debug info records.
    #[must_use]
    pub fn new(dex: &'a DexFile) -> Self {
        let mut code_owners = HashMap::new();
        for (_, class_data) in dex.class_data().iter() {
            for method in class_data
                .direct_methods
                .iter()
                .chain(class_data.virtual_methods.iter())
            {
                if let Some(code) = method.code {
                    code_owners.entry(code).or_insert(method.method);
                }
            }
        }

        let mut debug_owners = HashMap::new();
        for (id, code) in dex.code_items().iter() {
            if let Some(debug) = code.debug_info {
                debug_owners.entry(debug).or_insert(id);
            }
        }

        SortContext {
            dex,
            code_owners,
            debug_owners,
        }
    }

    /// Orders two items of any kind through this context.
    #[must_use]
    pub fn cmp<T: Item>(&self, a: Id<T>, b: Id<T>) -> Ordering {
        if a == b {
            Ordering::Equal
        } else {
            T::compare(self, a, b)
        }
    }

    /// Orders two optional references, absent first.
    #[must_use]
    pub fn cmp_opt<T: Item>(&self, a: Option<Id<T>>, b: Option<Id<T>>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => self.cmp(a, b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }

    /// Orders two reference lists by length, then elementwise.
    #[must_use]
    pub fn cmp_len_then_items<T: Item>(&self, a: &[Id<T>], b: &[Id<T>]) -> Ordering {
        a.len().cmp(&b.len()).then_with(|| {
            a.iter()
                .zip(b)
                .map(|(&a, &b)| self.cmp(a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }

    /// The method whose body is `code`, if any class data references it.
    #[must_use]
    pub fn code_owner(&self, code: Id<CodeItem>) -> Option<Id<MethodIdItem>> {
        self.code_owners.get(&code).copied()
    }

    /// The code item that references `debug`, if any.
    #[must_use]
    pub fn debug_owner(&self, debug: Id<DebugInfoItem>) -> Option<Id<CodeItem>> {
        self.debug_owners.get(&debug).copied()
    }
}
