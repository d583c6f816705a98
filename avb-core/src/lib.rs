//! AVB Core Library
//!
//! This library decodes and re-encodes Avid bin files (`.avb`): a chunked
//! binary container holding a graph of typed objects.
//!
//! - [`codec`]: byte-order-bound primitive reader/writer
//! - [`container`]: file header and chunk table
//! - [`file`]: open-file session with the lazy reference cache
//! - [`object`], [`property`], [`reference`]: the property-based object model
//! - [`record`]: the tagged extensible record protocol
//! - [`registry`]: type code and class name lookup
//! - [`classes`]: the concrete schema set

pub mod classes;
pub mod codec;
pub mod container;
pub mod exp10;
pub mod file;
pub mod object;
pub mod options;
pub mod property;
pub mod record;
pub mod reference;
pub mod registry;
pub mod text;
pub mod types;

pub use codec::{ByteOrder, ChunkMapping, ChunkReader, ChunkWriter, Reader, Writer};
pub use container::{AvbChunk, ChunkTable, FileHeader};
pub use file::AvbFile;
pub use object::{AvbObject, SharedObject, Value};
pub use options::ReadOptions;
pub use property::{DefaultValue, PropertyDef, PropertyType};
pub use reference::{ObjectRef, RefList};
pub use registry::{registry, ClassDef, Registry};
pub use types::{FourCC, MobId, Rational, Rect, RgbColor};

/// Result type for avb-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for avb-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed header ({field}): {detail}")]
    MalformedHeader { field: &'static str, detail: String },

    #[error("Unexpected guard tag at offset {offset:#x}: expected {expected:#04x}, found {found:#04x}")]
    UnexpectedGuardTag { offset: u64, expected: u8, found: u8 },

    #[error("Unknown type code: {0}")]
    UnknownTypeCode(FourCC),

    #[error("Unknown extension tag {tag:#04x} for {class}")]
    UnknownExtensionTag { class: &'static str, tag: u8 },

    #[error("Unknown track flags {flags:#06x}")]
    UnknownTrackFlags { flags: u16 },

    #[error("Unknown value type {value_type} in {class}")]
    UnknownValueType { class: &'static str, value_type: i64 },

    #[error("Invalid reference index {index} (table length {len})")]
    InvalidReferenceIndex { index: u32, len: u32 },

    #[error("Truncated read at offset {offset:#x}: need {need} bytes")]
    TruncatedRead { offset: u64, need: usize },

    #[error("{remaining} trailing bytes after {class} record")]
    TrailingBytes { class: &'static str, remaining: usize },

    #[error("Reference to object {0} has no assigned chunk index")]
    ReferenceNotYetWritten(u32),

    #[error("Unsupported text value: {0}")]
    UnsupportedTextValue(String),

    #[error("Value {0} cannot be encoded as an exp10 float")]
    UnencodableFloat(f64),

    #[error("'{class}' has no attribute '{name}'")]
    AttributeNotFound { class: &'static str, name: String },

    #[error("'{class}' does not declare property '{name}'")]
    UnknownProperty { class: &'static str, name: String },

    #[error("Property '{class}.{name}' expects a {expected:?} value")]
    PropertyTypeMismatch {
        class: &'static str,
        name: String,
        expected: PropertyType,
    },

    #[error("'{class}.{name}' has {count} entries, more than its count field can hold")]
    TooManyEntries {
        class: &'static str,
        name: &'static str,
        count: usize,
    },

    #[error("'{class}.{name}' cannot be written without '{requires}'")]
    MissingDependentProperty {
        class: &'static str,
        name: &'static str,
        requires: &'static str,
    },

    #[error("'{class}.{name}' must be set on every entry or on none")]
    PartialExtension {
        class: &'static str,
        name: &'static str,
    },

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("{0} is not a standalone chunk class")]
    NotAChunkClass(&'static str),

    #[error("{0} is a standalone chunk class and must be created through a file")]
    NotAnEmbeddedClass(&'static str),

    #[error("{0} object has no session id")]
    DetachedObject(&'static str),

    #[error("File has no backing stream")]
    NoSource,

    #[error("File has no content object")]
    NoContent,

    #[error("Failed to decode chunk {index} ({class_id}): {source}\n{hex}")]
    Chunk {
        index: u32,
        class_id: FourCC,
        hex: String,
        source: Box<Error>,
    },
}
