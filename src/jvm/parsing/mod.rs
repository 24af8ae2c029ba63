//! Parsing and checking of class files.
//!
//! [`ClassFileParser`] drives the stages in the order they appear in the file. Every stage
//! reads from the same [`ClassFileStream`] and receives a [`ParseContext`] describing
//! the class being loaded.

pub(crate) mod annotations;
mod class_attributes;
pub mod class_file;
mod constant_pool;
mod fields;
mod methods;
pub mod stream;
pub(crate) mod verifier;

pub use class_file::{ClassFileParser, LoadRequest};
pub use stream::ClassFileStream;

use annotations::AnnotationPolicy;
use verifier::FormatChecker;

use super::{
    class::Version,
    constant_pool::{ConstantPool, CpPatch},
};
use crate::{errors::LoadError, options::LoadOptions, symbols::Symbol};

/// Facts about the class being parsed shared by every stage.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseContext<'a> {
    pub options: &'a LoadOptions,
    pub version: Version,
    pub need_verify: bool,
    /// The binary name of the class, empty until `this_class` has been read.
    pub class_name: &'a str,
    /// Constant pool patches, present only for classes defined for a host class.
    pub patches: Option<&'a [Option<CpPatch>]>,
    pub annotation_policy: AnnotationPolicy,
}

impl<'a> ParseContext<'a> {
    pub(crate) fn for_class(self, class_name: &'a str) -> Self {
        Self { class_name, ..self }
    }

    pub(crate) const fn major_version(&self) -> u16 {
        self.version.major
    }

    pub(crate) fn checker(&self) -> FormatChecker<'a> {
        FormatChecker::new(self.need_verify, self.version.major).for_class(self.class_name)
    }

    pub(crate) fn patch_at(&self, index: u16) -> Option<&'a CpPatch> {
        self.patches
            .and_then(|patches| patches.get(usize::from(index)))
            .and_then(Option::as_ref)
    }
}

/// Widens an attribute length read from the class file.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Targets with 16-bit pointers are not supported."
)]
pub(crate) const fn attribute_size(length: u32) -> usize {
    length as usize
}

/// Reads the name index and the length of an attribute.
pub(crate) fn read_attribute_header<'p>(
    stream: &mut ClassFileStream<'_>,
    pool: &'p ConstantPool,
    owner: &str,
) -> Result<(&'p Symbol, u32), LoadError> {
    stream.guarantee_more(6)?;
    let name_index = stream.get_u2_fast();
    let length = stream.get_u4_fast();
    let name = pool
        .utf8_at(name_index)
        .map_err(|_| LoadError::class_format(format!("Invalid {owner} attribute index {name_index}")))?;
    Ok((name, length))
}

/// Reads the body of an attribute kept as raw bytes.
pub(crate) fn read_blob(stream: &mut ClassFileStream<'_>, length: u32) -> Result<Vec<u8>, LoadError> {
    Ok(stream.get_bytes(attribute_size(length))?.to_vec())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A context for a verified Java 8 class named `Test`.
    pub(crate) fn context(options: &LoadOptions) -> ParseContext<'_> {
        ParseContext {
            options,
            version: Version::new(52, 0),
            need_verify: true,
            class_name: "Test",
            patches: None,
            annotation_policy: AnnotationPolicy {
                privileged: false,
                restrict_contended: true,
            },
        }
    }

    /// Big-endian byte buffer builder for hand-written class file fragments.
    #[derive(Debug, Default)]
    pub(crate) struct Bytes(pub Vec<u8>);

    impl Bytes {
        pub(crate) fn u1(mut self, value: u8) -> Self {
            self.0.push(value);
            self
        }

        pub(crate) fn u2(mut self, value: u16) -> Self {
            self.0.extend_from_slice(&value.to_be_bytes());
            self
        }

        pub(crate) fn u4(mut self, value: u32) -> Self {
            self.0.extend_from_slice(&value.to_be_bytes());
            self
        }

        pub(crate) fn utf8(self, value: &str) -> Self {
            let bytes = cesu8::to_java_cesu8(value);
            let length = u16::try_from(bytes.len()).unwrap();
            let mut this = self.u1(1).u2(length);
            this.0.extend_from_slice(&bytes);
            this
        }

        pub(crate) fn raw(mut self, bytes: &[u8]) -> Self {
            self.0.extend_from_slice(bytes);
            self
        }
    }
}
