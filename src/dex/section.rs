//! Homogeneous item storage with stable handles, interning and placement state.
//!
//! A [`Section`] is an arena: items are appended and never removed, and each one is addressed
//! by an [`Id`] that stays valid for the life of the container no matter how the section is
//! reordered. Three pieces of state sit next to the items:
//!
//! - the *order*, the sequence in which items are placed and written,
//! - one [`Placement`] per item, `Unplaced` until a placement pass assigns offset and index,
//! - the interning pool mapping structural content to the canonical [`Id`].
//!
//! Reading an offset or index before placement is a [`crate::Error::State`] error rather than a
//! stale value.
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::dex::DexFile;
//!
//! let mut dex = DexFile::new();
//! let first = dex.intern_string("hello")?;
//! let again = dex.intern_string("hello")?;
//! assert_eq!(first, again);
//! assert_eq!(dex.strings().len(), 1);
//! assert!(dex.strings().offset_of(first).is_err());
//! # Ok::<(), dexscope::Error>(())
//! ```

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Index,
};

use crate::{dex::item::Item, utils::math::to_u32, Result};

/// Stable handle to an item of kind `T` inside its container.
///
/// Handles are only meaningful for the container that produced them.
pub struct Id<T> {
    raw: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub(crate) fn new(raw: u32) -> Self {
        Id {
            raw,
            marker: PhantomData,
        }
    }

    /// The arena slot of this handle. Unrelated to the item's placed index.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.raw
    }

    fn slot(self) -> usize {
        self.raw as usize
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.raw)
    }
}

/// Where an item ended up after placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// No offset or index has been assigned yet
    #[default]
    Unplaced,
    /// Final byte offset and position within the section
    Placed {
        /// Absolute byte offset in the container
        offset: u32,
        /// Position within the section
        index: u32,
    },
}

/// Ordered collection of one item kind, with an interning pool.
pub struct Section<T: Item> {
    items: Vec<T>,
    placements: Vec<Placement>,
    order: Vec<Id<T>>,
    pool: HashMap<T::Key, Id<T>>,
    offset: Option<u32>,
}

impl<T: Item> Default for Section<T> {
    fn default() -> Self {
        Section {
            items: Vec::new(),
            placements: Vec::new(),
            order: Vec::new(),
            pool: HashMap::new(),
            offset: None,
        }
    }
}

impl<T: Item> Section<T> {
    /// Number of items in the section.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the section holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item behind `id`, or `None` for a handle from another container.
    #[must_use]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.slot())
    }

    /// Handles in current order.
    #[must_use]
    pub fn ids(&self) -> &[Id<T>] {
        &self.order
    }

    /// Iterates `(handle, item)` pairs in current order.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> + '_ {
        self.order.iter().map(move |&id| (id, &self.items[id.slot()]))
    }

    /// Handle of the item at `index` in current order.
    ///
    /// While parsing, current order is file order, so this resolves on-disk indices.
    ///
    /// # Errors
    /// Returns [`crate::Error::Resolution`] if `index` is out of range.
    pub fn id_at(&self, index: u32) -> Result<Id<T>> {
        self.order.get(index as usize).copied().ok_or_else(|| {
            resolution_error!(
                "{} index {} out of range (section holds {})",
                T::KIND,
                index,
                self.order.len()
            )
        })
    }

    /// Returns the canonical handle for content equal to `item`, without inserting.
    #[must_use]
    pub fn find(&self, item: &T) -> Option<Id<T>> {
        item.intern_key()
            .and_then(|key| self.pool.get(&key).copied())
    }

    /// Interns `item`: returns the existing handle for equal content, or appends it.
    ///
    /// The returned flag is true when the item was appended.
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the section outgrows 32-bit handles.
    pub fn intern(&mut self, item: T) -> Result<(Id<T>, bool)> {
        match item.intern_key() {
            Some(key) => match self.pool.entry(key) {
                Entry::Occupied(entry) => Ok((*entry.get(), false)),
                Entry::Vacant(entry) => {
                    let id = Id::new(to_u32(self.items.len())?);
                    entry.insert(id);
                    self.append(id, item);
                    Ok((id, true))
                }
            },
            None => {
                let id = Id::new(to_u32(self.items.len())?);
                self.append(id, item);
                Ok((id, true))
            }
        }
    }

    /// Appends a decoded item without deduplication.
    ///
    /// The first instance of any content becomes its canonical instance for later interning.
    pub(crate) fn push(&mut self, item: T) -> Result<Id<T>> {
        let id = Id::new(to_u32(self.items.len())?);
        if let Some(key) = item.intern_key() {
            self.pool.entry(key).or_insert(id);
        }
        self.append(id, item);
        Ok(id)
    }

    /// Swaps in new content for an item without an interning key.
    pub(crate) fn replace(&mut self, id: Id<T>, item: T) {
        debug_assert!(item.intern_key().is_none());
        if let Some(slot) = self.items.get_mut(id.slot()) {
            *slot = item;
        }
    }

    fn append(&mut self, id: Id<T>, item: T) {
        self.items.push(item);
        self.placements.push(Placement::Unplaced);
        self.order.push(id);
    }

    /// Placement of the item behind `id`.
    #[must_use]
    pub fn placement(&self, id: Id<T>) -> Placement {
        self.placements
            .get(id.slot())
            .copied()
            .unwrap_or(Placement::Unplaced)
    }

    /// Final byte offset of the item behind `id`.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if the item has not been placed.
    pub fn offset_of(&self, id: Id<T>) -> Result<u32> {
        match self.placement(id) {
            Placement::Placed { offset, .. } => Ok(offset),
            Placement::Unplaced => Err(state_error!(
                "offset of {} {:?} read before placement",
                T::KIND,
                id
            )),
        }
    }

    /// Final index of the item behind `id`.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if the item has not been placed.
    pub fn index_of(&self, id: Id<T>) -> Result<u32> {
        match self.placement(id) {
            Placement::Placed { index, .. } => Ok(index),
            Placement::Unplaced => Err(state_error!(
                "index of {} {:?} read before placement",
                T::KIND,
                id
            )),
        }
    }

    /// Offset of the section's first item after placement, `None` when empty or unplaced.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: Option<u32>) {
        self.offset = offset;
    }

    pub(crate) fn set_order(&mut self, order: Vec<Id<T>>) {
        debug_assert_eq!(order.len(), self.items.len());
        self.order = order;
    }

    pub(crate) fn set_placement(&mut self, id: Id<T>, placement: Placement) {
        if let Some(slot) = self.placements.get_mut(id.slot()) {
            *slot = placement;
        }
    }

    pub(crate) fn clear_placements(&mut self) {
        self.placements.fill(Placement::Unplaced);
        self.offset = None;
    }

    /// Whether every item has been placed.
    #[must_use]
    pub fn is_placed(&self) -> bool {
        self.placements
            .iter()
            .all(|placement| matches!(placement, Placement::Placed { .. }))
    }
}

impl<T: Item> Index<Id<T>> for Section<T> {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        &self.items[id.slot()]
    }
}
