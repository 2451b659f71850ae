//! The container: every section of one DEX file, plus the parse, place and encode pipeline.
//!
//! A [`DexFile`] is an arena. Items live in their kind's [`Section`] and refer to each other
//! through [`Id`] handles, so a string shared by a thousand types is stored once and the
//! graph has no ownership cycles. The container moves through three states:
//!
//! ```text
//! Unplaced --place()--> Placed --encode()--> Written
//!     ^                                         |
//!     +------------- intern(new content) -------+
//! ```
//!
//! Placement assigns every item its final offset and index and derives the map; encoding
//! serializes header, sections and map in placement order and then patches the signature and
//! checksum. Offsets and indices are never guessed: reading one before placement is an
//! [`crate::Error::State`] error.
//!
//! # Parsing
//!
//! [`DexFile::from_bytes_with`] validates the header, reads the map, declares every section
//! and then walks the sections in [`crate::dex::PARSE_ORDER`] through a
//! [`crate::dex::ReadContext`]. Every parsed item starts out placed at the offset and index
//! it was read from; [`crate::dex::LayoutMode::InPlace`] verifies and keeps those placements.
//!
//! # Placement
//!
//! [`DexFile::place`] orders every section according to the layout mode, assigns indices to
//! the index tables, widens `const-string` operands that no longer fit, assigns offsets to the
//! data sections and derives the [`crate::dex::Layout`].
//!
//! # Error Handling
//!
//! Errors raised while handling one item are wrapped with that item's identity, and the
//! wrapping nests, so a failure reads from the outermost item inward:
//!
//! ```text
//! class_def_item #2 (LHello;): class_data_item @0x3a4: Overflow - ...
//! ```
//!
//! [`crate::Error::root`] recovers the underlying error for matching.

use std::{iter, path::Path};

use tracing::{debug, warn};

use crate::{
    dex::{
        config::{DexOptions, LayoutMode},
        context::ReadContext,
        header::{DexVersion, HeaderItem, HEADER_SIZE},
        item::Item,
        items::{
            shorty_descriptor, AnnotationItem, AnnotationSetItem, AnnotationSetRefListItem,
            AnnotationsDirectoryItem, ClassDataItem, ClassDefItem, CodeItem, DebugInfoItem,
            DexString, EncodedArrayItem, FieldIdItem, MethodIdItem, ProtoIdItem, StringDataItem,
            StringIdItem, TypeIdItem, TypeListItem,
        },
        kind::{ItemKind, INDEXED_ORDER, OFFSETTED_ORDER, PARSE_ORDER},
        map::{read_map, Layout, MapEntry},
        odex::OdexHeader,
        section::{Id, Placement, Section},
    },
    file::{output::Output, parser::Parser, writer::Annotation, writer::Writer, Input},
    utils::{
        checksum,
        math::{advance, align, to_u32},
    },
    Result,
};

/// Runs `$body` with `$item` bound to the item type of `$kind`.
///
/// Header and map have no section of their own and take the `_` arm.
macro_rules! dispatch {
    ($kind:expr, $item:ident => $body:expr, _ => $fallback:expr) => {
        match $kind {
            ItemKind::StringId => {
                type $item = StringIdItem;
                $body
            }
            ItemKind::TypeId => {
                type $item = TypeIdItem;
                $body
            }
            ItemKind::ProtoId => {
                type $item = ProtoIdItem;
                $body
            }
            ItemKind::FieldId => {
                type $item = FieldIdItem;
                $body
            }
            ItemKind::MethodId => {
                type $item = MethodIdItem;
                $body
            }
            ItemKind::ClassDef => {
                type $item = ClassDefItem;
                $body
            }
            ItemKind::TypeList => {
                type $item = TypeListItem;
                $body
            }
            ItemKind::AnnotationSetRefList => {
                type $item = AnnotationSetRefListItem;
                $body
            }
            ItemKind::AnnotationSet => {
                type $item = AnnotationSetItem;
                $body
            }
            ItemKind::ClassData => {
                type $item = ClassDataItem;
                $body
            }
            ItemKind::Code => {
                type $item = CodeItem;
                $body
            }
            ItemKind::StringData => {
                type $item = StringDataItem;
                $body
            }
            ItemKind::DebugInfo => {
                type $item = DebugInfoItem;
                $body
            }
            ItemKind::Annotation => {
                type $item = AnnotationItem;
                $body
            }
            ItemKind::EncodedArray => {
                type $item = EncodedArrayItem;
                $body
            }
            ItemKind::AnnotationsDirectory => {
                type $item = AnnotationsDirectoryItem;
                $body
            }
            ItemKind::Header | ItemKind::MapList => $fallback,
        }
    };
}

/// Where a container stands in the place / encode pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DexState {
    /// Content changed since the last placement, or no placement has happened yet
    #[default]
    Unplaced,
    /// Every item has its final offset and index
    Placed(Layout),
    /// Placed and encoded at least once
    Written(Layout),
}

/// An in-memory DEX container.
///
/// Built either by parsing an existing file ([`DexFile::from_bytes`], [`DexFile::from_file`])
/// or from scratch ([`DexFile::new`]) by interning items. In both cases the container is
/// turned back into bytes with [`DexFile::place`] followed by [`DexFile::encode`].
///
/// # Examples
///
/// ```rust
/// use dexscope::DexFile;
///
/// let mut dex = DexFile::new();
/// let object = dex.intern_type("Ljava/lang/Object;")?;
/// assert_eq!(dex.intern_type("Ljava/lang/Object;")?, object);
///
/// dex.place()?;
/// let bytes = dex.encode()?;
///
/// let parsed = DexFile::from_bytes(&bytes)?;
/// assert!(parsed.find_type("Ljava/lang/Object;").is_some());
/// # Ok::<(), dexscope::Error>(())
/// ```
pub struct DexFile {
    pub(crate) string_ids: Section<StringIdItem>,
    pub(crate) string_data: Section<StringDataItem>,
    pub(crate) type_ids: Section<TypeIdItem>,
    pub(crate) type_lists: Section<TypeListItem>,
    pub(crate) proto_ids: Section<ProtoIdItem>,
    pub(crate) field_ids: Section<FieldIdItem>,
    pub(crate) method_ids: Section<MethodIdItem>,
    pub(crate) class_defs: Section<ClassDefItem>,
    pub(crate) annotations: Section<AnnotationItem>,
    pub(crate) annotation_sets: Section<AnnotationSetItem>,
    pub(crate) annotation_set_ref_lists: Section<AnnotationSetRefListItem>,
    pub(crate) annotations_directories: Section<AnnotationsDirectoryItem>,
    pub(crate) class_data: Section<ClassDataItem>,
    pub(crate) code_items: Section<CodeItem>,
    pub(crate) debug_infos: Section<DebugInfoItem>,
    pub(crate) encoded_arrays: Section<EncodedArrayItem>,
    options: DexOptions,
    header: Option<HeaderItem>,
    odex: Option<OdexHeader>,
    state: DexState,
    trace: Vec<Annotation>,
}

impl Default for DexFile {
    fn default() -> Self {
        DexFile::with_options(DexOptions::default())
    }
}

impl DexFile {
    /// Creates an empty container with default options.
    #[must_use]
    pub fn new() -> DexFile {
        DexFile::default()
    }

    /// Creates an empty container.
    #[must_use]
    pub fn with_options(options: DexOptions) -> DexFile {
        DexFile {
            string_ids: Section::default(),
            string_data: Section::default(),
            type_ids: Section::default(),
            type_lists: Section::default(),
            proto_ids: Section::default(),
            field_ids: Section::default(),
            method_ids: Section::default(),
            class_defs: Section::default(),
            annotations: Section::default(),
            annotation_sets: Section::default(),
            annotation_set_ref_lists: Section::default(),
            annotations_directories: Section::default(),
            class_data: Section::default(),
            code_items: Section::default(),
            debug_infos: Section::default(),
            encoded_arrays: Section::default(),
            options,
            header: None,
            odex: None,
            state: DexState::Unplaced,
            trace: Vec::new(),
        }
    }

    /// Parses a container held in memory, with default options.
    ///
    /// # Errors
    /// See [`DexFile::from_input`].
    pub fn from_bytes(data: &[u8]) -> Result<DexFile> {
        Self::from_bytes_with(data, DexOptions::default())
    }

    /// Parses a container held in memory.
    ///
    /// # Errors
    /// See [`DexFile::from_input`].
    pub fn from_bytes_with(data: &[u8], options: DexOptions) -> Result<DexFile> {
        Self::from_input(&Input::from_mem(data.to_vec())?, options)
    }

    /// Memory-maps and parses the file at `path`, with default options.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise see
    /// [`DexFile::from_input`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<DexFile> {
        Self::from_input(&Input::from_file(path)?, DexOptions::default())
    }

    /// Parses a loaded input. An optimized-container wrapper is kept for inspection and the
    /// container it embeds is parsed.
    ///
    /// The version in `options` is replaced by the version of the input.
    ///
    /// # Errors
    /// - [`crate::Error::Format`] for an unrecognized magic, big-endian input, a link section,
    ///   or a declared size larger than the input
    /// - [`crate::Error::Consistency`] when header and map disagree
    /// - [`crate::Error::Resolution`] for references that land nowhere
    /// - any decoding error, wrapped with the identity of the item being read
    pub fn from_input(input: &Input, options: DexOptions) -> Result<DexFile> {
        let mut dex = Self::parse(input.dex_data(), options)?;
        dex.odex = input.odex_header().copied();
        Ok(dex)
    }

    fn parse(data: &[u8], options: DexOptions) -> Result<DexFile> {
        let header = HeaderItem::read(&mut Parser::new(data))?;
        let data = data
            .get(..header.file_size as usize)
            .ok_or_else(|| out_of_bounds_error!())?;
        if let Err(error) = checksum::verify(data) {
            warn!(%error, "container checksum does not verify");
        }

        let entries = read_map(&mut Parser::at(data, header.map_offset as usize)?)
            .map_err(|e| e.within(format!("{} @0x{:x}", ItemKind::MapList, header.map_offset)))?;

        let options = options.with_version(header.version);
        let mut ctx = ReadContext::new(data, DexFile::with_options(options));
        ctx.declare(&header, &entries)?;

        let skip_code = options.skip_instructions;
        for kind in PARSE_ORDER {
            if skip_code && matches!(kind, ItemKind::Code | ItemKind::DebugInfo) {
                continue;
            }
            dispatch!(kind, T => ctx.read_section::<T>()?, _ => {});
        }

        let mut dex = ctx.finish();
        debug!(
            version = %header.version,
            file_size = header.file_size,
            sections = entries.len(),
            "parsed container"
        );
        dex.header = Some(header);
        Ok(dex)
    }

    /// The active options.
    #[must_use]
    pub fn options(&self) -> &DexOptions {
        &self.options
    }

    /// Replaces the options; takes effect at the next placement.
    pub fn set_options(&mut self, options: DexOptions) {
        self.options = options;
        self.state = DexState::Unplaced;
    }

    /// The format version written by [`DexFile::encode`].
    #[must_use]
    pub fn version(&self) -> DexVersion {
        self.options.version
    }

    /// The header as it was parsed, `None` for containers built from scratch.
    #[must_use]
    pub fn header(&self) -> Option<&HeaderItem> {
        self.header.as_ref()
    }

    /// The optimized-container wrapper the input came in, if any.
    #[must_use]
    pub fn odex_header(&self) -> Option<&OdexHeader> {
        self.odex.as_ref()
    }

    /// Current pipeline state.
    #[must_use]
    pub fn state(&self) -> &DexState {
        &self.state
    }

    /// The layout of the most recent placement, while it is still valid.
    #[must_use]
    pub fn layout(&self) -> Option<&Layout> {
        match &self.state {
            DexState::Placed(layout) | DexState::Written(layout) => Some(layout),
            DexState::Unplaced => None,
        }
    }

    /// Byte-range trace of the last encode; empty unless [`DexOptions::annotate`] is set.
    #[must_use]
    pub fn trace(&self) -> &[Annotation] {
        &self.trace
    }

    /// The trace of the last encode rendered one range per line.
    #[must_use]
    pub fn trace_dump(&self) -> String {
        self.trace
            .iter()
            .map(|annotation| format!("{annotation}\n"))
            .collect()
    }

    /// `string_id_item` section
    #[must_use]
    pub fn strings(&self) -> &Section<StringIdItem> {
        &self.string_ids
    }

    /// `string_data_item` section
    #[must_use]
    pub fn string_data(&self) -> &Section<StringDataItem> {
        &self.string_data
    }

    /// `type_id_item` section
    #[must_use]
    pub fn types(&self) -> &Section<TypeIdItem> {
        &self.type_ids
    }

    /// `type_list` section
    #[must_use]
    pub fn type_lists(&self) -> &Section<TypeListItem> {
        &self.type_lists
    }

    /// `proto_id_item` section
    #[must_use]
    pub fn protos(&self) -> &Section<ProtoIdItem> {
        &self.proto_ids
    }

    /// `field_id_item` section
    #[must_use]
    pub fn fields(&self) -> &Section<FieldIdItem> {
        &self.field_ids
    }

    /// `method_id_item` section
    #[must_use]
    pub fn methods(&self) -> &Section<MethodIdItem> {
        &self.method_ids
    }

    /// `class_def_item` section
    #[must_use]
    pub fn class_defs(&self) -> &Section<ClassDefItem> {
        &self.class_defs
    }

    /// `annotation_item` section
    #[must_use]
    pub fn annotations(&self) -> &Section<AnnotationItem> {
        &self.annotations
    }

    /// `annotation_set_item` section
    #[must_use]
    pub fn annotation_sets(&self) -> &Section<AnnotationSetItem> {
        &self.annotation_sets
    }

    /// `annotation_set_ref_list` section
    #[must_use]
    pub fn annotation_set_ref_lists(&self) -> &Section<AnnotationSetRefListItem> {
        &self.annotation_set_ref_lists
    }

    /// `annotations_directory_item` section
    #[must_use]
    pub fn annotations_directories(&self) -> &Section<AnnotationsDirectoryItem> {
        &self.annotations_directories
    }

    /// `class_data_item` section
    #[must_use]
    pub fn class_data(&self) -> &Section<ClassDataItem> {
        &self.class_data
    }

    /// `code_item` section
    #[must_use]
    pub fn code_items(&self) -> &Section<CodeItem> {
        &self.code_items
    }

    /// `debug_info_item` section
    #[must_use]
    pub fn debug_infos(&self) -> &Section<DebugInfoItem> {
        &self.debug_infos
    }

    /// `encoded_array_item` section
    #[must_use]
    pub fn encoded_arrays(&self) -> &Section<EncodedArrayItem> {
        &self.encoded_arrays
    }

    /// The contents of a string.
    ///
    /// # Panics
    /// Panics if `id` belongs to another container.
    #[must_use]
    pub fn string(&self, id: Id<StringIdItem>) -> &DexString {
        &self.string_data[self.string_ids[id].data].value
    }

    /// The descriptor of a type, e.g. `Ljava/lang/Object;`.
    ///
    /// # Panics
    /// Panics if `id` belongs to another container.
    #[must_use]
    pub fn type_descriptor(&self, id: Id<TypeIdItem>) -> &DexString {
        self.string(self.type_ids[id].descriptor)
    }

    /// Number of items of `kind`; header and map count as one.
    #[must_use]
    pub fn count(&self, kind: ItemKind) -> usize {
        dispatch!(kind, T => T::section(self).len(), _ => 1)
    }

    /// Interns `item`, returning the canonical handle for its content.
    ///
    /// Appending new content invalidates the current placement.
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the section outgrows 32-bit handles.
    pub fn intern<T: Item>(&mut self, item: T) -> Result<Id<T>> {
        let (id, added) = T::section_mut(self).intern(item)?;
        if added {
            self.state = DexState::Unplaced;
        }
        Ok(id)
    }

    /// The canonical handle for content equal to `item`, without inserting it.
    #[must_use]
    pub fn find<T: Item>(&self, item: &T) -> Option<Id<T>> {
        T::section(self).find(item)
    }

    /// Interns a string given as UTF-16 code units.
    ///
    /// # Errors
    /// See [`DexFile::intern`].
    pub fn intern_dex_string(&mut self, value: DexString) -> Result<Id<StringIdItem>> {
        let data = self.intern(StringDataItem { value })?;
        self.intern(StringIdItem { data })
    }

    /// Interns a string.
    ///
    /// # Errors
    /// See [`DexFile::intern`].
    pub fn intern_string(&mut self, value: &str) -> Result<Id<StringIdItem>> {
        self.intern_dex_string(DexString::from(value))
    }

    /// Looks up a string without interning it.
    #[must_use]
    pub fn find_string(&self, value: &str) -> Option<Id<StringIdItem>> {
        let data = self.find(&StringDataItem {
            value: DexString::from(value),
        })?;
        self.find(&StringIdItem { data })
    }

    /// Interns a type by descriptor.
    ///
    /// # Errors
    /// See [`DexFile::intern`].
    pub fn intern_type(&mut self, descriptor: &str) -> Result<Id<TypeIdItem>> {
        let descriptor = self.intern_string(descriptor)?;
        self.intern(TypeIdItem { descriptor })
    }

    /// Looks up a type by descriptor without interning it.
    #[must_use]
    pub fn find_type(&self, descriptor: &str) -> Option<Id<TypeIdItem>> {
        let descriptor = self.find_string(descriptor)?;
        self.find(&TypeIdItem { descriptor })
    }

    /// Interns a type list.
    ///
    /// # Errors
    /// See [`DexFile::intern`].
    pub fn intern_type_list(&mut self, types: &[Id<TypeIdItem>]) -> Result<Id<TypeListItem>> {
        self.intern(TypeListItem {
            types: types.to_vec(),
        })
    }

    /// Interns a prototype, deriving its shorty descriptor.
    ///
    /// # Errors
    /// See [`DexFile::intern`].
    pub fn intern_proto(
        &mut self,
        return_type: Id<TypeIdItem>,
        parameters: &[Id<TypeIdItem>],
    ) -> Result<Id<ProtoIdItem>> {
        let descriptors: Vec<String> = iter::once(return_type)
            .chain(parameters.iter().copied())
            .map(|ty| self.type_descriptor(ty).to_string())
            .collect();
        let shorty = shorty_descriptor(descriptors.iter().map(String::as_str));
        let shorty = self.intern_string(&shorty)?;

        let parameters = if parameters.is_empty() {
            None
        } else {
            Some(self.intern_type_list(parameters)?)
        };

        self.intern(ProtoIdItem {
            shorty,
            return_type,
            parameters,
        })
    }

    /// Interns a field reference from descriptors and a name.
    ///
    /// # Errors
    /// See [`DexFile::intern`].
    pub fn intern_field(&mut self, class: &str, name: &str, ty: &str) -> Result<Id<FieldIdItem>> {
        let class = self.intern_type(class)?;
        let ty = self.intern_type(ty)?;
        let name = self.intern_string(name)?;
        self.intern(FieldIdItem { class, ty, name })
    }

    /// Interns a method reference from descriptors and a name.
    ///
    /// # Errors
    /// See [`DexFile::intern`].
    pub fn intern_method(
        &mut self,
        class: &str,
        name: &str,
        return_type: &str,
        parameters: &[&str],
    ) -> Result<Id<MethodIdItem>> {
        let class = self.intern_type(class)?;
        let return_type = self.intern_type(return_type)?;
        let parameters = parameters
            .iter()
            .map(|descriptor| self.intern_type(descriptor))
            .collect::<Result<Vec<_>>>()?;
        let proto = self.intern_proto(return_type, &parameters)?;
        let name = self.intern_string(name)?;
        self.intern(MethodIdItem { class, proto, name })
    }

    /// Final byte offset of an item.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if the item has not been placed.
    pub fn offset_of<T: Item>(&self, id: Id<T>) -> Result<u32> {
        T::section(self).offset_of(id)
    }

    /// Final index of an item within its section.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if the item has not been placed.
    pub fn index_of<T: Item>(&self, id: Id<T>) -> Result<u32> {
        T::section(self).index_of(id)
    }

    /// Concise identity of an item for diagnostics, e.g. `type_id_item #3 (LFoo;)`.
    #[must_use]
    pub fn describe<T: Item>(&self, id: Id<T>) -> String {
        self.identity(id, T::section(self).placement(id))
    }

    fn identity<T: Item>(&self, id: Id<T>, placement: Placement) -> String {
        let position = match placement {
            Placement::Placed { index, .. } if T::KIND.is_indexed() => {
                format!("{} #{}", T::KIND, index)
            }
            Placement::Placed { offset, .. } => format!("{} @0x{:x}", T::KIND, offset),
            Placement::Unplaced => format!("unplaced {} {:?}", T::KIND, id),
        };

        let summary = T::section(self)
            .get(id)
            .map(|item| item.summary(self))
            .unwrap_or_default();
        if summary.is_empty() {
            position
        } else {
            format!("{position} ({summary})")
        }
    }

    /// Assigns every item its final offset and index and derives the map.
    ///
    /// Sections are laid out header first, then the indexed sections, then the data sections,
    /// then the map, each item aligned for its kind. With [`LayoutMode::InPlace`] the current
    /// section order and item positions are kept and verified instead.
    ///
    /// Outside in-place layout, once string indices are known, `const-string` instructions
    /// whose string no longer fits a 16-bit operand are widened to `const-string/jumbo`
    /// unless [`DexOptions::fix_instructions`] is off.
    ///
    /// # Errors
    /// - [`crate::Error::Format`] for a cyclic class hierarchy
    /// - [`crate::Error::State`] in place mode, when an item was added after parsing
    /// - [`crate::Error::Consistency`] in place mode, when an item would move
    /// - [`crate::Error::Overflow`] when the container outgrows 32-bit offsets
    pub fn place(&mut self) -> Result<()> {
        let mode = self.options.layout;
        let reference_map_offset = self
            .layout()
            .map(|layout| layout.map_offset)
            .or_else(|| self.header.as_ref().map(|header| header.map_offset));
        self.state = DexState::Unplaced;

        let kinds = self.section_order(mode)?;
        if mode != LayoutMode::InPlace {
            for kind in INDEXED_ORDER.into_iter().chain(OFFSETTED_ORDER) {
                dispatch!(kind, T => T::section_mut(self).clear_placements(), _ => {});
            }
        }

        let mut entries = vec![MapEntry {
            kind: ItemKind::Header,
            count: 1,
            offset: 0,
        }];
        let mut offset = HEADER_SIZE;
        for kind in kinds {
            // string indices are final once the indexed sections are placed
            if mode != LayoutMode::InPlace && kind == OFFSETTED_ORDER[0] {
                self.widen_string_operands()?;
            }
            offset = dispatch!(
                kind,
                T => self.place_section::<T>(offset, mode, &mut entries)?,
                _ => offset
            );
        }

        let map_offset = align(offset, ItemKind::MapList.alignment())?;
        if mode == LayoutMode::InPlace && reference_map_offset != Some(map_offset) {
            return Err(consistency_error!(
                "in-place layout moves the map from {} to 0x{:x}",
                reference_map_offset
                    .map_or_else(|| "nowhere".to_string(), |offset| format!("0x{offset:x}")),
                map_offset
            ));
        }

        let data_offset = entries
            .iter()
            .find(|entry| entry.kind != ItemKind::Header && !entry.kind.is_indexed())
            .map_or(map_offset, |entry| entry.offset);
        let file_size = advance(map_offset, Layout::map_size(entries.len() - 1))?;
        entries.push(MapEntry {
            kind: ItemKind::MapList,
            count: 1,
            offset: map_offset,
        });

        let layout = Layout {
            file_size,
            data_offset,
            data_size: file_size - data_offset,
            map_offset,
            entries,
        };
        debug!(
            mode = ?mode,
            file_size,
            sections = layout.entries.len(),
            "placed container"
        );
        self.state = DexState::Placed(layout);
        Ok(())
    }

    fn section_order(&self, mode: LayoutMode) -> Result<Vec<ItemKind>> {
        let canonical = INDEXED_ORDER.into_iter().chain(OFFSETTED_ORDER);
        if mode != LayoutMode::InPlace {
            return Ok(canonical.collect());
        }

        let mut kinds = Vec::new();
        for kind in canonical {
            let (len, offset) = dispatch!(
                kind,
                T => (T::section(self).len(), T::section(self).offset()),
                _ => (0, None)
            );
            if len == 0 {
                continue;
            }
            let Some(offset) = offset else {
                return Err(state_error!(
                    "{kind} was never placed; in-place layout needs a parsed or placed container"
                ));
            };
            kinds.push((offset, kind));
        }
        kinds.sort();
        Ok(kinds.into_iter().map(|(_, kind)| kind).collect())
    }

    fn widen_string_operands(&mut self) -> Result<()> {
        if !self.options.fix_instructions {
            return Ok(());
        }

        let mut pending = Vec::new();
        for (id, code) in self.code_items.iter() {
            let addresses = code
                .overflowing_string_operands(self)
                .map_err(|e| e.within(self.describe(id)))?;
            if !addresses.is_empty() {
                pending.push((id, addresses));
            }
        }

        for (id, addresses) in pending {
            let mut code = self.code_items[id].clone();
            let relocation = code
                .widen_string_constants(&addresses)
                .map_err(|e| e.within(self.describe(id)))?;

            if let Some(debug_info) = code.debug_info {
                let mut program = self.debug_infos[debug_info].clone();
                program
                    .relocate(&relocation)
                    .map_err(|e| e.within(self.describe(debug_info)))?;
                let shared = self
                    .code_items
                    .iter()
                    .filter(|(_, other)| other.debug_info == Some(debug_info))
                    .nth(1)
                    .is_some();
                if shared {
                    code.debug_info = Some(self.debug_infos.push(program)?);
                } else {
                    self.debug_infos.replace(debug_info, program);
                }
            }

            debug!(
                code = %self.describe(id),
                widened = addresses.len(),
                "widened const-string operands"
            );
            self.code_items.replace(id, code);
        }
        Ok(())
    }

    fn place_section<T: Item>(
        &mut self,
        base: u32,
        mode: LayoutMode,
        entries: &mut Vec<MapEntry>,
    ) -> Result<u32> {
        let order = T::arrange(self, mode)?;
        if order.is_empty() {
            T::section_mut(self).set_offset(None);
            return Ok(base);
        }

        let alignment = T::KIND.alignment();
        let start = align(base, alignment)?;
        let mut offset = start;
        let mut placements = Vec::with_capacity(order.len());

        let section = T::section(self);
        for (index, &id) in order.iter().enumerate() {
            offset = align(offset, alignment)?;
            let placement = Placement::Placed {
                offset,
                index: to_u32(index)?,
            };

            if mode == LayoutMode::InPlace {
                match section.placement(id) {
                    Placement::Unplaced => {
                        return Err(state_error!(
                            "{} was added after parsing and cannot be placed in place",
                            self.describe(id)
                        ));
                    }
                    previous if previous != placement => {
                        return Err(consistency_error!(
                            "in-place layout moves {} to {}",
                            self.describe(id),
                            self.identity(id, placement)
                        ));
                    }
                    _ => {}
                }
            }

            let size = section[id]
                .size(self)
                .map_err(|e| e.within(self.identity(id, placement)))?;
            placements.push((id, placement));
            offset = advance(offset, size)?;
        }

        entries.push(MapEntry {
            kind: T::KIND,
            count: to_u32(order.len())?,
            offset: start,
        });

        let section = T::section_mut(self);
        for (id, placement) in placements {
            section.set_placement(id, placement);
        }
        section.set_order(order);
        section.set_offset(Some(start));
        Ok(offset)
    }

    /// Serializes the placed container and finalizes its signature and checksum.
    ///
    /// # Errors
    /// - [`crate::Error::State`] if the container is not placed
    /// - [`crate::Error::Overflow`] when a reference outgrows its field, wrapped with the
    ///   identity of the referring item
    /// - [`crate::Error::Consistency`] if the output does not match the placed layout
    pub fn encode(&mut self) -> Result<Vec<u8>> {
        let Some(layout) = self.layout().cloned() else {
            return Err(state_error!("encode() requires a placed container; call place() first"));
        };

        let mut out = Writer::with_capacity(layout.file_size as usize, self.options.annotate);
        HeaderItem::write(self.options.version, &layout, &mut out)?;

        for entry in &layout.entries {
            match entry.kind {
                ItemKind::Header => {}
                ItemKind::MapList => {
                    out.pad_to(entry.offset)?;
                    layout.write_map(&mut out)?;
                }
                kind => dispatch!(kind, T => self.write_section::<T>(&mut out)?, _ => {}),
            }
        }

        let (mut bytes, trace) = out.into_parts();
        if bytes.len() != layout.file_size as usize {
            return Err(consistency_error!(
                "encoded {} bytes, but placement computed 0x{:x}",
                bytes.len(),
                layout.file_size
            ));
        }
        checksum::finalize(&mut bytes)?;

        debug!(bytes = bytes.len(), version = %self.options.version, "encoded container");
        self.trace = trace;
        self.state = DexState::Written(layout);
        Ok(bytes)
    }

    fn write_section<T: Item>(&self, out: &mut Writer) -> Result<()> {
        let section = T::section(self);
        for (id, item) in section.iter() {
            let offset = section.offset_of(id)?;
            out.pad_to(offset)?;
            item.write(self, out)
                .map_err(|e| e.within(self.describe(id)))?;
            out.annotate_from(offset, || self.describe(id));
        }
        Ok(())
    }

    /// Places the container if needed, encodes it and writes it to `path`.
    ///
    /// # Errors
    /// Any error from [`DexFile::place`] or [`DexFile::encode`], or
    /// [`crate::Error::WriteMmapFailed`] if the file cannot be written.
    pub fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.layout().is_none() {
            self.place()?;
        }
        let bytes = self.encode()?;

        let mut output = Output::create(path, bytes.len() as u64)?;
        output.write_at(0, &bytes)?;
        output.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dex::items::AccessFlags, Error};

    #[test]
    fn empty_container_round_trip() -> Result<()> {
        let mut dex = DexFile::new();
        dex.place()?;
        let bytes = dex.encode()?;
        assert_eq!(bytes.len() as u32, HEADER_SIZE + Layout::map_size(0));

        let parsed = DexFile::from_bytes(&bytes)?;
        assert!(parsed.strings().is_empty());
        assert_eq!(parsed.header().map(|header| header.map_offset), Some(HEADER_SIZE));
        Ok(())
    }

    #[test]
    fn single_type_layout() -> Result<()> {
        let mut dex = DexFile::new();
        let object = dex.intern_type("Ljava/lang/Object;")?;
        dex.place()?;

        assert_eq!(dex.offset_of(dex.types()[object].descriptor)?, 0x70);
        assert_eq!(dex.offset_of(object)?, 0x74);
        let layout = dex.layout().cloned().unwrap_or_default();
        assert_eq!(layout.data_offset, 0x78);
        assert_eq!(layout.map_offset, 0x8C);
        assert_eq!(layout.file_size, 0xCC);
        assert_eq!(layout.data_size, 0xCC - 0x78);

        let kinds: Vec<_> = layout.entries.iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            [
                ItemKind::Header,
                ItemKind::StringId,
                ItemKind::TypeId,
                ItemKind::StringData,
                ItemKind::MapList
            ]
        );
        Ok(())
    }

    #[test]
    fn state_transitions() -> Result<()> {
        let mut dex = DexFile::new();
        dex.intern_string("a")?;
        assert!(matches!(dex.encode(), Err(Error::State(_))));
        assert!(matches!(dex.offset_of(dex.strings().ids()[0]), Err(Error::State(_))));

        dex.place()?;
        assert!(matches!(dex.state(), DexState::Placed(_)));
        let first = dex.encode()?;
        assert!(matches!(dex.state(), DexState::Written(_)));
        assert_eq!(dex.encode()?, first);

        dex.intern_string("a")?;
        assert!(matches!(dex.state(), DexState::Written(_)));
        dex.intern_string("b")?;
        assert_eq!(dex.state(), &DexState::Unplaced);
        assert!(matches!(dex.encode(), Err(Error::State(_))));
        Ok(())
    }

    #[test]
    fn describe_names_kind_position_and_content() -> Result<()> {
        let mut dex = DexFile::new();
        let foo = dex.intern_type("LFoo;")?;
        assert!(dex.describe(foo).starts_with("unplaced type_id_item"));
        dex.place()?;
        assert_eq!(dex.describe(foo), "type_id_item #0 (LFoo;)");
        let data = dex.strings()[dex.types()[foo].descriptor].data;
        assert_eq!(dex.describe(data), "string_data_item @0x78 (\"LFoo;\")");
        Ok(())
    }

    #[test]
    fn in_place_rejects_new_items() -> Result<()> {
        let mut dex = DexFile::new();
        dex.intern_type("LFoo;")?;
        dex.place()?;
        let bytes = dex.encode()?;

        let mut parsed = DexFile::from_bytes_with(&bytes, DexOptions::in_place())?;
        parsed.place()?;
        assert_eq!(&parsed.encode()?, &bytes);

        parsed.intern_type("LBar;")?;
        assert!(matches!(parsed.place(), Err(Error::State(_))));
        Ok(())
    }

    #[test]
    fn in_place_needs_a_reference_layout() -> Result<()> {
        let mut dex = DexFile::with_options(DexOptions::in_place());
        dex.intern_string("fresh")?;
        assert!(matches!(dex.place(), Err(Error::State(_))));
        Ok(())
    }

    #[test]
    fn place_wraps_overflow_with_item_identity() -> Result<()> {
        let mut dex = DexFile::new();
        for index in 0..=0xFFFF_u32 {
            dex.intern_type(&format!("LA{index:05};"))?;
        }
        dex.intern_field("LZ;", "x", "I")?;

        let error = dex.place().unwrap_err();
        assert!(matches!(error.root(), Error::Overflow(_)));
        assert!(error.to_string().starts_with("field_id_item #0 (LZ;->x:I)"));
        assert!(matches!(dex.encode(), Err(Error::State(_))));
        Ok(())
    }

    #[test]
    fn class_defs_follow_their_superclass() -> Result<()> {
        let mut dex = DexFile::new();
        let base = dex.intern_type("LBase;")?;
        let derived = dex.intern_type("LDerived;")?;
        let derived = dex.intern(ClassDefItem::new(derived, AccessFlags::PUBLIC, Some(base)))?;
        let base = dex.intern(ClassDefItem::new(base, AccessFlags::PUBLIC, None))?;
        dex.place()?;

        assert!(dex.index_of(base)? < dex.index_of(derived)?);
        assert!(dex.offset_of(base)? < dex.offset_of(derived)?);
        assert_eq!(dex.class_defs().ids(), &[base, derived]);
        Ok(())
    }
}
