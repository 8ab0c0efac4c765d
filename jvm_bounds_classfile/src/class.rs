//! Top-level class-file structure.
//!
//! Only the parts an intraprocedural analysis needs are kept: the constant
//! pool, the class hierarchy, the `SourceFile` attribute and every method with
//! its `Code` and `LineNumberTable`. Fields, interfaces' contents beyond their
//! names, and all other attributes are skipped.

use crate::constant_pool::ConstantPool;
use crate::error::{ClassFileError, Result};
use crate::reader::Reader;

/// `0xCAFEBABE`
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Access flag bits shared by classes and methods.
pub mod access {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
}

/// One row of a `LineNumberTable` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    /// Byte offset into the method's code.
    pub start_pc: u16,
    pub line_number: u16,
}

/// One row of a `Code` attribute's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant pool index of the caught class, 0 for `finally`.
    pub catch_type: u16,
}

/// The `Code` attribute of a concrete method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub line_numbers: Vec<LineNumberEntry>,
}

/// A method declared by a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// Absent for native and abstract methods.
    pub code: Option<CodeAttribute>,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags & access::ACC_STATIC != 0
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & access::ACC_NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ACC_ABSTRACT != 0
    }
}

/// A decoded class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    /// Internal name, e.g. `com/example/Main`.
    pub this_class: String,
    /// `None` only for `java/lang/Object` and module descriptors.
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<MethodInfo>,
    pub source_file: Option<String>,
}

impl ClassFile {
    /// Decodes a complete class file.
    ///
    /// # Example
    ///
    /// ```
    /// use jvm_bounds_classfile::{ClassFile, ClassFileError};
    ///
    /// let err = ClassFile::parse(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap_err();
    /// assert_eq!(err, ClassFileError::InvalidMagic { found: 0xDEAD_BEEF });
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic { found: magic });
        }
        let minor_version = reader.u16()?;
        let major_version = reader.u16()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.u16()?;
        let this_class = constant_pool.class_name(reader.u16()?)?.to_string();
        let super_class = match reader.u16()? {
            0 => None,
            index => Some(constant_pool.class_name(index)?.to_string()),
        };

        let interface_count = reader.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(constant_pool.class_name(reader.u16()?)?.to_string());
        }

        // Fields: access, name, descriptor, attributes.
        let field_count = reader.u16()?;
        for _ in 0..field_count {
            reader.skip(6)?;
            skip_attributes(&mut reader)?;
        }

        let method_count = reader.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(parse_method(&mut reader, &constant_pool)?);
        }

        let mut source_file = None;
        let attribute_count = reader.u16()?;
        for _ in 0..attribute_count {
            let name = constant_pool.utf8(reader.u16()?)?;
            let len = reader.u32()? as usize;
            let mut body = Reader::new(reader.bytes(len)?);
            if name == "SourceFile" {
                source_file = Some(constant_pool.utf8(body.u16()?)?.to_string());
            }
        }

        if !reader.is_empty() {
            return Err(ClassFileError::TrailingBytes {
                count: reader.remaining(),
            });
        }

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            methods,
            source_file,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::ACC_INTERFACE != 0
    }
}

fn skip_attributes(reader: &mut Reader<'_>) -> Result<()> {
    let count = reader.u16()?;
    for _ in 0..count {
        reader.skip(2)?;
        let len = reader.u32()? as usize;
        reader.skip(len)?;
    }
    Ok(())
}

fn parse_method(reader: &mut Reader<'_>, pool: &ConstantPool) -> Result<MethodInfo> {
    let access_flags = reader.u16()?;
    let name = pool.utf8(reader.u16()?)?.to_string();
    let descriptor = pool.utf8(reader.u16()?)?.to_string();

    let mut code = None;
    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?)?;
        let len = reader.u32()? as usize;
        let body = reader.bytes(len)?;
        if attribute_name == "Code" {
            code = Some(parse_code(&mut Reader::new(body), pool)?);
        }
    }

    Ok(MethodInfo {
        access_flags,
        name,
        descriptor,
        code,
    })
}

fn parse_code(reader: &mut Reader<'_>, pool: &ConstantPool) -> Result<CodeAttribute> {
    let max_stack = reader.u16()?;
    let max_locals = reader.u16()?;
    let code_len = reader.u32()? as usize;
    let code = reader.bytes(code_len)?.to_vec();

    let handler_count = reader.u16()?;
    let mut exception_table = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        exception_table.push(ExceptionHandler {
            start_pc: reader.u16()?,
            end_pc: reader.u16()?,
            handler_pc: reader.u16()?,
            catch_type: reader.u16()?,
        });
    }

    let mut line_numbers = Vec::new();
    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let name = pool.utf8(reader.u16()?)?;
        let len = reader.u32()? as usize;
        let mut body = Reader::new(reader.bytes(len)?);
        if name == "LineNumberTable" {
            let entries = body.u16()?;
            for _ in 0..entries {
                line_numbers.push(LineNumberEntry {
                    start_pc: body.u16()?,
                    line_number: body.u16()?,
                });
            }
        }
    }

    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table,
        line_numbers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ClassBuilder, MethodCode};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_assembled_class() {
        let mut builder = ClassBuilder::new("demo/Arrays");
        builder.source_file("Arrays.java");
        builder.method(
            access::ACC_PUBLIC | access::ACC_STATIC,
            "first",
            "([I)I",
            Some(MethodCode {
                max_stack: 2,
                max_locals: 1,
                // aload_0; iconst_0; iaload; ireturn
                code: vec![0x2A, 0x03, 0x2E, 0xAC],
                line_numbers: vec![(0, 7)],
            }),
        );
        builder.method(
            access::ACC_PUBLIC | access::ACC_NATIVE,
            "peek",
            "()I",
            None,
        );
        let class = ClassFile::parse(&builder.build()).unwrap();

        assert_eq!(class.this_class, "demo/Arrays");
        assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.source_file.as_deref(), Some("Arrays.java"));
        assert_eq!(class.methods.len(), 2);

        let first = &class.methods[0];
        assert!(first.is_static());
        let code = first.code.as_ref().unwrap();
        assert_eq!(code.code, vec![0x2A, 0x03, 0x2E, 0xAC]);
        assert_eq!(
            code.line_numbers,
            vec![LineNumberEntry {
                start_pc: 0,
                line_number: 7
            }]
        );

        let peek = &class.methods[1];
        assert!(peek.is_native());
        assert!(peek.code.is_none());
    }

    #[test]
    fn test_truncated_class_is_rejected() {
        let bytes = ClassBuilder::new("demo/Empty").build();
        let err = ClassFile::parse(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, ClassFileError::UnexpectedEof { .. }), "{err:?}");
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = ClassBuilder::new("demo/Empty").build();
        bytes.push(0);
        assert_eq!(
            ClassFile::parse(&bytes).unwrap_err(),
            ClassFileError::TrailingBytes { count: 1 }
        );
    }
}
