//! Non-generic JVM method descriptors.

use std::{fmt, str::FromStr};

use super::{
    Descriptor,
    field_type::{FieldType, InvalidDescriptor},
};
use crate::macros::see_jvm_spec;

/// The descriptor of a method.
/// Consists of the parameters types and the return type.
#[doc = see_jvm_spec!(4, 3, 3)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct MethodDescriptor {
    /// The type of the parameters.
    pub parameters_types: Vec<FieldType>,
    /// The return type.
    pub return_type: ReturnType,
}

/// Denotes the return type of a method.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum ReturnType {
    /// The method returns a specific type.
    Some(FieldType),
    /// The return type of the method is `void`.
    Void,
}

impl MethodDescriptor {
    /// Returns the number of local variable slots taken by the parameters, not counting
    /// the receiver.
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.parameters_types
            .iter()
            .map(|it| usize::from(it.slot_size()))
            .sum()
    }
}

impl FromStr for MethodDescriptor {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let mut chars = descriptor.chars();
        if chars.next() != Some('(') {
            return Err(InvalidDescriptor);
        }
        let mut parameters_types = Vec::new();
        loop {
            if chars.as_str().starts_with(')') {
                chars.next();
                break;
            }
            parameters_types.push(FieldType::parse_prefix(&mut chars)?);
        }
        let return_type = ReturnType::from_str(chars.as_str())?;
        Ok(Self {
            parameters_types,
            return_type,
        })
    }
}

impl FromStr for ReturnType {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        match descriptor {
            "V" => Ok(Self::Void),
            it => FieldType::from_str(it).map(Self::Some),
        }
    }
}

impl Descriptor for ReturnType {
    fn descriptor(&self) -> String {
        match self {
            Self::Some(it) => it.descriptor(),
            Self::Void => "V".to_owned(),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.parameters_types {
            write!(f, "{}", param.descriptor())?;
        }
        write!(f, ")")?;
        write!(f, "{}", self.return_type.descriptor())
    }
}
