use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

macro_rules! format_error {
    ($($arg:tt)*) => {
        crate::Error::Format(format!($($arg)*))
    };
}

macro_rules! consistency_error {
    ($($arg:tt)*) => {
        crate::Error::Consistency(format!($($arg)*))
    };
}

macro_rules! resolution_error {
    ($($arg:tt)*) => {
        crate::Error::Resolution(format!($($arg)*))
    };
}

macro_rules! state_error {
    ($($arg:tt)*) => {
        crate::Error::State(format!($($arg)*))
    };
}

macro_rules! overflow_error {
    ($($arg:tt)*) => {
        crate::Error::Overflow(format!($($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure raised while decoding, placing or encoding an item is wrapped in
/// [`Error::Item`] carrying that item's concise identity, so a failure deep inside a nested
/// structure reads as a chain from the top-level container call down to the failing field.
///
/// # Error Categories
///
/// ## Container Errors
/// - [`Error::Format`] - Bad magic, wrong endianness or an unsupported variant
/// - [`Error::Consistency`] - Header and map disagree, or an in-place layout would move an item
/// - [`Error::Resolution`] - An index or offset reference that cannot be resolved
/// - [`Error::State`] - An operation invoked out of phase order
/// - [`Error::Overflow`] - An index that does not fit its encoded width
///
/// ## Low-level Decoding Errors
/// - [`Error::Malformed`] - Corrupted record contents (bad LEB128, MUTF-8, opcode)
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the buffer
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::WriteMmapFailed`] - The memory-mapped output file could not be produced
///
/// # Examples
///
/// ```rust,no_run
/// use dexscope::{DexFile, Error};
///
/// match DexFile::from_file("classes.dex") {
///     Ok(dex) => println!("{} classes", dex.class_defs().len()),
///     Err(Error::Format(message)) => eprintln!("not a dex file: {message}"),
///     Err(Error::Consistency(message)) => eprintln!("inconsistent layout: {message}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is not a container this crate understands.
    ///
    /// Raised for an unknown magic value, a big-endian tag, a non-empty link section, an
    /// unexpected header size, or a class hierarchy that references itself.
    #[error("Format - {0}")]
    Format(String),

    /// Two declarations of the same fact disagree.
    ///
    /// The header and the map both declare a size and an offset for every indexed section;
    /// any difference between them is reported with the section name and both values. An
    /// in-place layout that would move an item is reported the same way.
    #[error("Consistency - {0}")]
    Consistency(String),

    /// A reference could not be resolved.
    ///
    /// Occurs for index references past the end of their section, and for offset references
    /// that do not land on an item of the expected kind.
    #[error("Resolution - {0}")]
    Resolution(String),

    /// An operation was invoked out of phase order.
    ///
    /// Reading an item's offset or index before placement, or encoding a container that has
    /// not been placed since its last modification.
    #[error("State - {0}")]
    State(String),

    /// A value exceeds the width of the field it must be encoded into.
    ///
    /// For example a type index above 65535 referenced from an 8-byte field reference.
    #[error("Overflow - {0}")]
    Overflow(String),

    /// The data is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    ///
    /// This error occurs when trying to read data beyond the end of the buffer. It's a safety
    /// check to prevent buffer overruns during parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Creating, sizing or flushing the memory-mapped output failed.
    #[error("Memory mapped output failed - {message}")]
    WriteMmapFailed {
        /// Description of the failed step
        message: String,
    },

    /// An error raised while processing a specific item.
    ///
    /// `item` is the concise identity of the item, e.g. `type_id_item #3 (Ljava/lang/Object;)`.
    #[error("{item}: {source}")]
    Item {
        /// Concise identity of the item being processed
        item: String,
        /// The underlying failure
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps this error with the identity of the item that was being processed.
    ///
    /// ## Arguments
    ///
    /// * `item` - Concise identity of the item, usually produced by [`crate::dex::DexFile::describe`]
    #[must_use]
    pub fn within(self, item: impl Into<String>) -> Error {
        Error::Item {
            item: item.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error of an [`Error::Item`] chain.
    ///
    /// Useful for matching on the error category regardless of how many items wrapped it.
    #[must_use]
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Item { source, .. } = current {
            current = source;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_chain_display() {
        let error = overflow_error!("type index {} exceeds 65535", 70000)
            .within("field_id_item #2 (LFoo;->bar:I)")
            .within("class_def_item #0 (LFoo;)");

        assert_eq!(
            error.to_string(),
            "class_def_item #0 (LFoo;): field_id_item #2 (LFoo;->bar:I): Overflow - type index 70000 exceeds 65535"
        );
        assert!(matches!(error.root(), Error::Overflow(_)));
    }

    #[test]
    fn malformed_captures_location() {
        let error = malformed_error!("bad leb128 at {}", 12);
        match error {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "bad leb128 at 12");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("unexpected variant"),
        }
    }
}
