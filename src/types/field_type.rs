//! Field types and the basic types they erase to.

use std::{fmt, str::FromStr};

use itertools::Itertools;

use super::Descriptor;
use crate::macros::see_jvm_spec;

/// A primitive type in Java.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum PrimitiveType {
    /// The `boolean` type.
    Boolean,
    /// The `char` type.
    Char,
    /// The `float` type.
    Float,
    /// The `double` type.
    Double,
    /// The `byte` type.
    Byte,
    /// The `short` type.
    Short,
    /// The `int` type.
    Int,
    /// The `long` type.
    Long,
}

impl PrimitiveType {
    /// Returns the number of bytes a field of this type occupies.
    #[must_use]
    pub const fn size_in_bytes(self) -> u32 {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
        }
    }

    /// Returns `true` for the two types occupying two local variable slots.
    #[must_use]
    pub const fn is_double_word(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    const fn descriptor_char(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Char => 'C',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Byte => 'B',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'J',
        }
    }
}

impl TryFrom<char> for PrimitiveType {
    type Error = InvalidDescriptor;

    fn try_from(descriptor: char) -> Result<Self, Self::Error> {
        match descriptor {
            'Z' => Ok(Self::Boolean),
            'C' => Ok(Self::Char),
            'F' => Ok(Self::Float),
            'D' => Ok(Self::Double),
            'B' => Ok(Self::Byte),
            'S' => Ok(Self::Short),
            'I' => Ok(Self::Int),
            'J' => Ok(Self::Long),
            _ => Err(InvalidDescriptor),
        }
    }
}

/// The type of a field, a parameter, or a local variable.
#[doc = see_jvm_spec!(4, 3, 2)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum FieldType {
    /// A primitive type.
    Base(PrimitiveType),
    /// A class or interface type, by binary name.
    Object(String),
    /// An array type.
    Array(Box<FieldType>),
}

/// Maximum number of dimensions of an array type.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

impl FieldType {
    /// Creates an array type with `self` as the element type.
    #[must_use]
    pub fn into_array_type(self) -> Self {
        Self::Array(Box::new(self))
    }

    /// Returns `true` if values of this type are object references.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// Returns the number of local variable slots a value of this type occupies.
    #[must_use]
    pub const fn slot_size(&self) -> u16 {
        match self {
            Self::Base(it) if it.is_double_word() => 2,
            _ => 1,
        }
    }

    /// Parses one field type at the start of `chars`, leaving the rest in place.
    pub(crate) fn parse_prefix(
        chars: &mut std::str::Chars<'_>,
    ) -> Result<Self, InvalidDescriptor> {
        let mut dimensions = 0usize;
        loop {
            match chars.next() {
                Some('[') => {
                    dimensions += 1;
                    if dimensions > MAX_ARRAY_DIMENSIONS {
                        return Err(InvalidDescriptor);
                    }
                }
                Some('L') => {
                    let binary_name: String = chars.take_while_ref(|c| *c != ';').collect();
                    if chars.next() != Some(';') || binary_name.is_empty() {
                        return Err(InvalidDescriptor);
                    }
                    let base = Self::Object(binary_name);
                    return Ok((0..dimensions).fold(base, |it, _| it.into_array_type()));
                }
                Some(c) => {
                    let base = PrimitiveType::try_from(c).map(Self::Base)?;
                    return Ok((0..dimensions).fold(base, |it, _| it.into_array_type()));
                }
                None => return Err(InvalidDescriptor),
            }
        }
    }
}

impl FromStr for FieldType {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let mut chars = descriptor.chars();
        let field_type = Self::parse_prefix(&mut chars)?;
        if chars.next().is_some() {
            return Err(InvalidDescriptor);
        }
        Ok(field_type)
    }
}

impl Descriptor for FieldType {
    fn descriptor(&self) -> String {
        match self {
            Self::Base(it) => it.descriptor_char().to_string(),
            Self::Object(binary_name) => format!("L{binary_name};"),
            Self::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// An error indicating that the descriptor string is invalid.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[error("Invalid descriptor")]
pub struct InvalidDescriptor;
