//! Error types for `BrresKit`

use std::path::PathBuf;

use thiserror::Error;

/// The error type for `BrresKit` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Binary Layout Errors ====================
    /// The input ended before a value could be read.
    #[error("truncated data: expected {expected} bytes at offset {offset:#x}")]
    Truncated {
        /// Absolute offset of the read.
        offset: usize,
        /// Number of bytes the read needed.
        expected: usize,
    },

    /// An offset points outside the buffer it belongs to.
    #[error("offset {offset:#x} out of range (buffer length {len:#x})")]
    OffsetOutOfRange {
        /// The resolved absolute offset.
        offset: i64,
        /// Length of the buffer being read.
        len: usize,
    },

    /// A section did not start with the expected magic tag.
    #[error("invalid magic at offset {offset:#x}: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// The tag that should have been present.
        expected: [u8; 4],
        /// The tag actually read.
        found: [u8; 4],
        /// Offset of the tag.
        offset: usize,
    },

    /// The container references a subfile tag that is not registered.
    #[error("unknown subfile magic {0:?}")]
    UnknownMagic([u8; 4]),

    /// The subfile version is not supported for its tag.
    #[error("unsupported {magic} version: {version}")]
    UnsupportedVersion {
        /// The subfile tag.
        magic: &'static str,
        /// The version number found in the file.
        version: u32,
    },

    /// A section declares a byte length that does not fit.
    #[error("invalid section length {length:#x} at offset {offset:#x}")]
    InvalidSectionLength {
        /// Offset of the section.
        offset: usize,
        /// Declared length.
        length: u32,
    },

    /// A string could not be decoded.
    #[error("invalid name at offset {offset:#x}")]
    InvalidName {
        /// Offset of the string.
        offset: usize,
    },

    /// A draw command tag is not a strip, list or padding.
    #[error("invalid draw command {tag:#04x} at offset {offset:#x}")]
    InvalidDrawCommand {
        /// The command byte.
        tag: u8,
        /// Offset within the draw data.
        offset: usize,
    },

    /// A model definition list holds an opcode with no known length.
    #[error("invalid definition opcode {opcode:#04x} at offset {offset:#x}")]
    InvalidOpcode {
        /// The opcode byte.
        opcode: u8,
        /// Absolute offset of the opcode.
        offset: usize,
    },

    /// A kept model entry links to something that is not in the model.
    #[error("invalid link: {0}")]
    InvalidLink(String),

    /// A texture header names a pixel format that does not exist.
    #[error("invalid texture format: {0}")]
    InvalidTextureFormat(u32),

    /// A point group header names a component format that does not exist.
    #[error("invalid point format: {0}")]
    InvalidPointFormat(u32),

    /// A decode failure inside one named resource.
    #[error("{kind} '{name}': {source}")]
    Resource {
        /// The subfile tag of the resource.
        kind: &'static str,
        /// The resource name.
        name: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    // ==================== Geometry Errors ====================
    /// The color format is not one of the six packed layouts.
    #[error("unsupported color format: {0}")]
    UnsupportedColorFormat(u32),

    /// Point or face data is inconsistent.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A group holds more points than a short index can address.
    #[error("{attribute} group has {count} points, more than a short index can address")]
    IndexOverflow {
        /// The attribute kind (vertex, normal, ...).
        attribute: &'static str,
        /// The point count.
        count: usize,
    },

    /// A polygon references a group that does not exist.
    #[error("polygon '{polygon}' references missing {attribute} group {index}")]
    MissingGroup {
        /// The polygon name.
        polygon: String,
        /// The attribute kind.
        attribute: &'static str,
        /// The referenced group index.
        index: usize,
    },

    // ==================== Skeleton Errors ====================
    /// The bone links form a cycle.
    #[error("bone hierarchy contains a cycle at bone {0}")]
    BoneCycle(u16),

    /// A bone link points past the end of the bone table.
    #[error("invalid bone index: {0}")]
    InvalidBoneIndex(i32),

    // ==================== Texture / Converter Errors ====================
    /// No external image converter is registered.
    #[error("no image converter available")]
    NoConverter,

    /// The external converter process failed.
    #[error("{} exited with {status}", program.display())]
    ConverterFailed {
        /// The tool that was run.
        program: PathBuf,
        /// Its exit status description.
        status: String,
    },

    /// Image decoding or resizing failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A resource setting value is out of range.
    #[error("invalid setting {key}: {message}")]
    InvalidSetting {
        /// The setting being changed.
        key: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// No resource with the given name exists in the container.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A resource with the given name already exists.
    #[error("resource already exists: {0}")]
    DuplicateResource(String),

    // ==================== Configuration Errors ====================
    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attach the resource name to a decode failure.
    pub(crate) fn in_resource(self, kind: &'static str, name: impl Into<String>) -> Self {
        Error::Resource {
            kind,
            name: name.into(),
            source: Box::new(self),
        }
    }
}

/// A specialized Result type for `BrresKit` operations.
pub type Result<T> = std::result::Result<T, Error>;
