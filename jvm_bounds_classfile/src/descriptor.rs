//! Field and method descriptors.
//!
//! Descriptors use the compact JVM grammar:
//!
//! ```text
//! FieldType        = "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z"
//!                  | "L" ClassName ";" | "[" FieldType
//! MethodDescriptor = "(" FieldType* ")" ( FieldType | "V" )
//! ```
//!
//! # Example
//!
//! ```
//! use jvm_bounds_classfile::{FieldType, MethodDescriptor};
//!
//! let desc = MethodDescriptor::parse("([IJ)Ljava/lang/String;").unwrap();
//! assert_eq!(desc.parameters.len(), 2);
//! assert_eq!(desc.parameter_slots(), 3);
//! assert_eq!(desc.return_type, Some(FieldType::Object("java/lang/String".into())));
//! ```

use crate::error::{ClassFileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a field, parameter, local or array element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Class or interface, by internal name.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parses a complete field descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        match Self::parse_prefix(descriptor) {
            Some((ty, "")) => Ok(ty),
            _ => Err(invalid(descriptor)),
        }
    }

    /// Parses one field type from the front of `input`, returning the rest.
    fn parse_prefix(input: &str) -> Option<(Self, &str)> {
        let mut chars = input.chars();
        let ty = match chars.next()? {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            'Z' => FieldType::Boolean,
            'L' => {
                let body = chars.as_str();
                let end = body.find(';')?;
                if end == 0 {
                    return None;
                }
                return Some((FieldType::Object(body[..end].to_string()), &body[end + 1..]));
            }
            '[' => {
                let (element, rest) = Self::parse_prefix(chars.as_str())?;
                return Some((FieldType::Array(Box::new(element)), rest));
            }
            _ => return None,
        };
        Some((ty, chars.as_str()))
    }

    /// Parses the operand of `anewarray`, `checkcast` and friends, which is
    /// either an internal class name or an array descriptor.
    pub fn from_class_name(name: &str) -> Result<Self> {
        if name.starts_with('[') {
            Self::parse(name)
        } else if name.is_empty() {
            Err(invalid(name))
        } else {
            Ok(FieldType::Object(name.to_string()))
        }
    }

    /// `long` and `double` take two local-variable slots.
    pub fn is_category2(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    /// Element type of an array type.
    pub fn element(&self) -> Option<&FieldType> {
        match self {
            FieldType::Array(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => write!(f, "B"),
            FieldType::Char => write!(f, "C"),
            FieldType::Double => write!(f, "D"),
            FieldType::Float => write!(f, "F"),
            FieldType::Int => write!(f, "I"),
            FieldType::Long => write!(f, "J"),
            FieldType::Short => write!(f, "S"),
            FieldType::Boolean => write!(f, "Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(element) => write!(f, "[{}", element),
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    /// `None` for `void`.
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut rest = descriptor
            .strip_prefix('(')
            .ok_or_else(|| invalid(descriptor))?;
        let mut parameters = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = FieldType::parse_prefix(rest).ok_or_else(|| invalid(descriptor))?;
            parameters.push(ty);
            rest = tail;
        }
        let ret = &rest[1..];
        let return_type = if ret == "V" {
            None
        } else {
            Some(FieldType::parse(ret).map_err(|_| invalid(descriptor))?)
        };
        Ok(Self {
            parameters,
            return_type,
        })
    }

    /// Number of local-variable slots the parameters occupy, not counting
    /// the receiver.
    pub fn parameter_slots(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| if p.is_category2() { 2 } else { 1 })
            .sum()
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }
}

fn invalid(descriptor: &str) -> ClassFileError {
    ClassFileError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Int);
        assert_eq!(
            FieldType::parse("[[J").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Long))))
        );
        assert_eq!(
            FieldType::parse("Ljava/util/List;").unwrap(),
            FieldType::Object("java/util/List".to_string())
        );
    }

    #[test]
    fn test_rejects_malformed_field_types() {
        for bad in ["", "L;", "Ljava/lang/String", "II", "Q", "["] {
            assert!(FieldType::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_display_round_trips_descriptor_text() {
        let text = "[Ljava/lang/Object;";
        assert_eq!(FieldType::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(IDLjava/lang/Thread;)V").unwrap();
        assert_eq!(
            desc.parameters,
            vec![
                FieldType::Int,
                FieldType::Double,
                FieldType::Object("java/lang/Thread".to_string())
            ]
        );
        assert!(desc.is_void());
        assert_eq!(desc.parameter_slots(), 4);
    }

    #[test]
    fn test_rejects_malformed_method_descriptors() {
        for bad in ["I)V", "(I", "(I)", "(I)VV", "(X)V"] {
            assert!(MethodDescriptor::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_from_class_name() {
        assert_eq!(
            FieldType::from_class_name("java/lang/String").unwrap(),
            FieldType::Object("java/lang/String".to_string())
        );
        assert_eq!(
            FieldType::from_class_name("[I").unwrap(),
            FieldType::Array(Box::new(FieldType::Int))
        );
    }
}
