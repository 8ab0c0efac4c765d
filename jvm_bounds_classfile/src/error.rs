//! Class-file decoding errors

use thiserror::Error;

/// Class-file decoding error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFileError {
    /// Input ended before a complete item could be read
    #[error("unexpected end of input at offset {offset}, needed {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },

    /// The file does not start with `0xCAFEBABE`
    #[error("invalid magic number {found:#010x}")]
    InvalidMagic { found: u32 },

    /// Constant pool index is zero, past the end, or the unusable half of a long/double
    #[error("constant pool index {index} is out of range")]
    BadConstantIndex { index: u16 },

    /// Constant pool entry has a different kind than the reference requires
    #[error("constant pool entry {index} is {found}, expected {expected}")]
    WrongConstantKind {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    /// Unknown constant pool tag
    #[error("unknown constant pool tag {tag} at entry {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    /// Malformed modified UTF-8 in a `CONSTANT_Utf8` entry
    #[error("invalid modified UTF-8 in constant pool entry {index}")]
    InvalidUtf8 { index: u16 },

    /// Malformed field or method descriptor
    #[error("invalid descriptor '{descriptor}'")]
    InvalidDescriptor { descriptor: String },

    /// Bytes left over after the last class attribute
    #[error("{count} trailing bytes after the class body")]
    TrailingBytes { count: usize },
}

/// Result alias for class-file decoding
pub type Result<T> = std::result::Result<T, ClassFileError>;
