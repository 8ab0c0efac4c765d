//! Decoder for the JVM class-file format.
//!
//! This crate turns `.class` bytes into a typed [`ClassFile`] and parses the
//! field and method descriptors it contains. It performs no verification
//! beyond what is needed to decode the structure; bytecode inside `Code`
//! attributes is left as raw bytes for the caller to lower.
//!
//! # Example
//!
//! ```
//! use jvm_bounds_classfile::MethodDescriptor;
//!
//! let desc = MethodDescriptor::parse("(I[I)V").unwrap();
//! assert!(desc.is_void());
//! ```

pub mod class;
pub mod constant_pool;
pub mod descriptor;
pub mod error;
pub mod reader;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use class::{
    access, ClassFile, CodeAttribute, ExceptionHandler, LineNumberEntry, MethodInfo, MAGIC,
};
pub use constant_pool::{Constant, ConstantPool, MemberRef};
pub use descriptor::{FieldType, MethodDescriptor};
pub use error::{ClassFileError, Result};
pub use reader::Reader;
