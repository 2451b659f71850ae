//! Layout and encoding options for a container.
//!
//! The options decide how [`crate::DexFile::place`] orders sections and items, which magic
//! [`crate::DexFile::encode`] writes, and whether encoding records an annotated trace.
//!
//! Parsing is affected too: [`DexOptions::skip_instructions`] leaves code and debug info
//! sections unread, and [`DexOptions::preserve_signed_registers`] keeps legacy signed register
//! encodings in debug info as they were found. [`DexOptions::fix_instructions`] lets a
//! non-in-place placement widen `const-string` instructions whose string index no longer fits
//! in 16 bits.
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::dex::{DexOptions, LayoutMode};
//!
//! let options = DexOptions::canonical().with_annotate(true);
//! assert_eq!(options.layout, LayoutMode::Canonical);
//! assert!(options.fix_instructions);
//! ```

use crate::dex::header::DexVersion;

/// How placement orders sections and items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    /// Reproduce the parsed layout exactly. Placement fails if any item would move.
    InPlace,
    /// Canonical section order; only the indexed sections the format requires to be sorted
    /// are sorted, everything else keeps insertion order.
    #[default]
    Natural,
    /// Canonical section order with every section sorted, for deterministic output.
    Canonical,
}

/// Options controlling placement and encoding of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexOptions {
    /// Section and item ordering used by placement
    pub layout: LayoutMode,

    /// Format version written by encoding; taken from the input magic when parsing
    pub version: DexVersion,

    /// Record a byte-range trace while encoding, see [`crate::DexFile::trace`]
    pub annotate: bool,

    /// Re-emit debug info register operands read in the legacy signed form in that form.
    /// When disabled they are normalized to unsigned LEB128.
    pub preserve_signed_registers: bool,

    /// Widen `const-string` instructions whose string index outgrows 16 bits to
    /// `const-string/jumbo` during natural and canonical placement, see
    /// [`crate::dex::items::CodeItem::widen_string_constants`]
    pub fix_instructions: bool,

    /// Parse without code: method bodies and debug info are skipped and every method is read
    /// without a code item. Useful when only classes and their members are of interest.
    pub skip_instructions: bool,
}

impl Default for DexOptions {
    fn default() -> Self {
        Self {
            layout: LayoutMode::Natural,
            version: DexVersion::V035,
            annotate: false,
            preserve_signed_registers: false,
            fix_instructions: true,
            skip_instructions: false,
        }
    }
}

impl DexOptions {
    /// Options for reproducing a parsed container byte for byte.
    ///
    /// Keeps legacy register encodings so the debug info stream is unchanged.
    #[must_use]
    pub fn in_place() -> Self {
        Self {
            layout: LayoutMode::InPlace,
            preserve_signed_registers: true,
            ..Self::default()
        }
    }

    /// The default options: format-mandated sorting only.
    #[must_use]
    pub fn natural() -> Self {
        Self::default()
    }

    /// Options for deterministic output suitable for diffing.
    #[must_use]
    pub fn canonical() -> Self {
        Self {
            layout: LayoutMode::Canonical,
            ..Self::default()
        }
    }

    /// Returns these options with `layout` replaced.
    #[must_use]
    pub fn with_layout(mut self, layout: LayoutMode) -> Self {
        self.layout = layout;
        self
    }

    /// Returns these options with `version` replaced.
    #[must_use]
    pub fn with_version(mut self, version: DexVersion) -> Self {
        self.version = version;
        self
    }

    /// Returns these options with annotation recording switched on or off.
    #[must_use]
    pub fn with_annotate(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Returns these options with signed register preservation switched on or off.
    #[must_use]
    pub fn with_preserve_signed_registers(mut self, preserve: bool) -> Self {
        self.preserve_signed_registers = preserve;
        self
    }

    /// Returns these options with `const-string` widening switched on or off.
    #[must_use]
    pub fn with_fix_instructions(mut self, fix: bool) -> Self {
        self.fix_instructions = fix;
        self
    }

    /// Returns these options with code skipping switched on or off.
    #[must_use]
    pub fn with_skip_instructions(mut self, skip: bool) -> Self {
        self.skip_instructions = skip;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let options = DexOptions::default();
        assert_eq!(options.layout, LayoutMode::Natural);
        assert_eq!(options.version, DexVersion::V035);
        assert!(!options.annotate);
        assert!(options.fix_instructions);
        assert!(!options.skip_instructions);
        assert_eq!(options, DexOptions::natural());

        let options = DexOptions::in_place();
        assert_eq!(options.layout, LayoutMode::InPlace);
        assert!(options.preserve_signed_registers);

        assert_eq!(DexOptions::canonical().layout, LayoutMode::Canonical);
    }

    #[test]
    fn builder_setters() {
        let options = DexOptions::canonical()
            .with_version(DexVersion::V036)
            .with_annotate(true)
            .with_preserve_signed_registers(true)
            .with_fix_instructions(false)
            .with_skip_instructions(true)
            .with_layout(LayoutMode::Natural);

        assert_eq!(options.layout, LayoutMode::Natural);
        assert_eq!(options.version, DexVersion::V036);
        assert!(options.annotate);
        assert!(options.preserve_signed_registers);
        assert!(!options.fix_instructions);
        assert!(options.skip_instructions);
    }
}
