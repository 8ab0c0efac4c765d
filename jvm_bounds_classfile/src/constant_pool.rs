//! The class-file constant pool.
//!
//! Entries are stored at their 1-based pool index. Index 0 and the slot that
//! follows every `Long` and `Double` entry hold [`Constant::Unusable`], so a
//! reference into either is rejected the same way as an out-of-range index.

use crate::error::{ClassFileError, Result};
use crate::reader::Reader;

/// A single constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Index 0 and the second slot of a long or double.
    Unusable,
}

impl Constant {
    /// Short kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class { .. } => "Class",
            Constant::String { .. } => "String",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module { .. } => "Module",
            Constant::Package { .. } => "Package",
            Constant::Unusable => "unusable",
        }
    }
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the owning class, e.g. `java/lang/String`.
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// The decoded constant pool of one class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        while entries.len() < count as usize {
            let index = entries.len() as u16;
            let tag = reader.u8()?;
            let constant = match tag {
                1 => {
                    let len = reader.u16()? as usize;
                    let bytes = reader.bytes(len)?;
                    let text = decode_modified_utf8(bytes)
                        .ok_or(ClassFileError::InvalidUtf8 { index })?;
                    Constant::Utf8(text)
                }
                3 => Constant::Integer(reader.i32()?),
                4 => Constant::Float(f32::from_bits(reader.u32()?)),
                5 => Constant::Long(reader.i64()?),
                6 => Constant::Double(f64::from_bits(reader.i64()? as u64)),
                7 => Constant::Class {
                    name_index: reader.u16()?,
                },
                8 => Constant::String {
                    string_index: reader.u16()?,
                },
                9 => Constant::FieldRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.u16()?,
                    descriptor_index: reader.u16()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.u8()?,
                    reference_index: reader.u16()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.u16()?,
                },
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                19 => Constant::Module {
                    name_index: reader.u16()?,
                },
                20 => Constant::Package {
                    name_index: reader.u16()?,
                },
                tag => return Err(ClassFileError::UnknownConstantTag { tag, index }),
            };
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        Ok(Self { entries })
    }

    /// Number of pool slots, including the unusable slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Looks up an entry by its pool index.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::BadConstantIndex { index }),
            Some(constant) => Ok(constant),
        }
    }

    fn wrong_kind(&self, index: u16, expected: &'static str) -> ClassFileError {
        ClassFileError::WrongConstantKind {
            index,
            expected,
            found: self
                .entries
                .get(index as usize)
                .map_or("missing", Constant::kind_name),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text),
            _ => Err(self.wrong_kind(index, "Utf8")),
        }
    }

    /// Internal name of a `CONSTANT_Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(self.wrong_kind(index, "Class")),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(self.wrong_kind(index, "NameAndType")),
        }
    }

    /// Resolves a `Fieldref`, `Methodref` or `InterfaceMethodref` entry.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    owner,
                    name,
                    descriptor,
                })
            }
            _ => Err(self.wrong_kind(index, "member reference")),
        }
    }

    /// Name and descriptor of an `InvokeDynamic` call site.
    pub fn invoke_dynamic(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                name_and_type_index,
                ..
            } => self.name_and_type(*name_and_type_index),
            _ => Err(self.wrong_kind(index, "InvokeDynamic")),
        }
    }
}

/// Decodes the JVM's modified UTF-8: `U+0000` is encoded in two bytes and
/// supplementary characters as surrogate pairs of three bytes each.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        match b0 {
            0x01..=0x7F => {
                units.push(b0);
                i += 1;
            }
            0xC0..=0xDF => {
                let b1 = continuation(bytes.get(i + 1))?;
                units.push(((b0 & 0x1F) << 6) | b1);
                i += 2;
            }
            0xE0..=0xEF => {
                let b1 = continuation(bytes.get(i + 1))?;
                let b2 = continuation(bytes.get(i + 2))?;
                units.push(((b0 & 0x0F) << 12) | (b1 << 6) | b2);
                i += 3;
            }
            _ => return None,
        }
    }
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

fn continuation(byte: Option<&u8>) -> Option<u16> {
    match byte {
        Some(b) if b & 0xC0 == 0x80 => Some((*b & 0x3F) as u16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(bytes: &[u8]) -> Result<ConstantPool> {
        ConstantPool::parse(&mut Reader::new(bytes))
    }

    #[test]
    fn test_long_takes_two_slots() {
        // count = 4: #1 Long, #2 unusable, #3 Utf8 "x"
        let bytes = [
            0x00, 0x04, 5, 0, 0, 0, 0, 0, 0, 0, 7, 1, 0x00, 0x01, b'x',
        ];
        let pool = pool(&bytes).unwrap();
        assert_eq!(pool.get(1).unwrap(), &Constant::Long(7));
        assert_eq!(
            pool.get(2).unwrap_err(),
            ClassFileError::BadConstantIndex { index: 2 }
        );
        assert_eq!(pool.utf8(3).unwrap(), "x");
    }

    #[test]
    fn test_wrong_kind_is_reported() {
        let bytes = [0x00, 0x02, 3, 0, 0, 0, 1];
        let pool = pool(&bytes).unwrap();
        assert_eq!(
            pool.utf8(1).unwrap_err(),
            ClassFileError::WrongConstantKind {
                index: 1,
                expected: "Utf8",
                found: "Integer"
            }
        );
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = [0x00, 0x02, 2, 0, 0];
        assert_eq!(
            pool(&bytes).unwrap_err(),
            ClassFileError::UnknownConstantTag { tag: 2, index: 1 }
        );
    }

    #[test]
    fn test_modified_utf8_null_and_supplementary() {
        assert_eq!(decode_modified_utf8(&[0xC0, 0x80]).as_deref(), Some("\0"));
        // U+1F600 as a surrogate pair
        let encoded = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&encoded).as_deref(), Some("\u{1F600}"));
        assert_eq!(decode_modified_utf8(&[0x00]), None);
    }
}
