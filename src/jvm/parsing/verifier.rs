//! Format checks on names, descriptors, and modifiers.
//!
//! Every check is a no-op when the class does not need verification.

use crate::{
    errors::LoadError,
    jvm::{
        class::{ClassAccessFlags, JAVA_1_3_VERSION, JAVA_1_5_VERSION, JAVA_7_VERSION, JAVA_8_VERSION},
        field::FieldAccessFlags,
        method::{CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME, MethodAccessFlags},
    },
    macros::malform,
    types::field_type::MAX_ARRAY_DIMENSIONS,
};

/// The largest number of local variable slots arguments may take, receiver included.
pub(crate) const MAX_ARGS_SIZE: usize = 255;

/// Checks that `bytes` is legal modified UTF-8.
///
/// Zero bytes and four-byte forms are rejected. Up to version 47, two and three byte
/// forms must encode their value in the shortest form, except for the two-byte NUL.
/// Newer versions accept overlong forms.
pub(crate) fn is_legal_utf8(bytes: &[u8], major_version: u16) -> bool {
    let strict = major_version <= JAVA_1_3_VERSION;
    let is_continuation = |byte: Option<&u8>| byte.is_some_and(|b| b & 0xC0 == 0x80);
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c >> 4 {
            0x0 if c == 0 => return false,
            0x0..=0x7 => i += 1,
            0xC | 0xD => {
                let Some(&c2) = bytes.get(i + 1).filter(|b| **b & 0xC0 == 0x80) else {
                    return false;
                };
                let value = (u32::from(c & 0x1F) << 6) | u32::from(c2 & 0x3F);
                if strict && value != 0 && value < 0x80 {
                    return false;
                }
                i += 2;
            }
            0xE => {
                if !is_continuation(bytes.get(i + 1)) || !is_continuation(bytes.get(i + 2)) {
                    return false;
                }
                let value = (u32::from(c & 0x0F) << 12)
                    | (u32::from(bytes[i + 1] & 0x3F) << 6)
                    | u32::from(bytes[i + 2] & 0x3F);
                if strict && value < 0x800 {
                    return false;
                }
                i += 3;
            }
            _ => return false,
        }
    }
    true
}

/// What kind of unqualified name is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Class,
    Field,
    Method,
}

fn is_legal_unqualified_name(name: &str, kind: NameKind) -> bool {
    if name.is_empty() {
        return false;
    }
    let bytes = name.as_bytes();
    for (i, &byte) in bytes.iter().enumerate() {
        match byte {
            b'.' | b';' | b'[' => return false,
            b'/' => {
                let is_legal_separator = kind == NameKind::Class
                    && i != 0
                    && i + 1 < bytes.len()
                    && bytes[i + 1] != b'/';
                if !is_legal_separator {
                    return false;
                }
            }
            b'<' | b'>' if kind == NameKind::Method => return false,
            _ => {}
        }
    }
    true
}

fn is_java_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_java_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Skips a Java identifier, possibly qualified with `/` when `slash_ok` holds. Returns
/// the byte offset of the first character that is not part of it, or [`None`] if there
/// is no identifier at all.
fn skip_over_field_name(name: &str, slash_ok: bool) -> Option<usize> {
    let mut last_is_slash = false;
    let mut not_first = false;
    for (offset, c) in name.char_indices() {
        let is_legal = if c.is_ascii() {
            if c.is_ascii_alphabetic() || c == '_' || c == '$' || (not_first && c.is_ascii_digit()) {
                last_is_slash = false;
                true
            } else if slash_ok && c == '/' {
                if last_is_slash {
                    return None;
                }
                last_is_slash = true;
                true
            } else {
                false
            }
        } else {
            last_is_slash = false;
            if not_first {
                is_java_identifier_part(c)
            } else {
                is_java_identifier_start(c)
            }
        };
        if !is_legal {
            return not_first.then_some(offset);
        }
        not_first = true;
    }
    not_first.then_some(name.len())
}

/// The format checker of one class file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FormatChecker<'a> {
    pub need_verify: bool,
    pub major_version: u16,
    /// The name of the class, empty while it is not known yet.
    pub class_name: &'a str,
}

impl<'a> FormatChecker<'a> {
    pub(crate) fn new(need_verify: bool, major_version: u16) -> Self {
        Self {
            need_verify,
            major_version,
            class_name: "",
        }
    }

    pub(crate) fn for_class(self, class_name: &'a str) -> Self {
        Self { class_name, ..self }
    }

    pub(crate) fn in_class(&self) -> String {
        if self.class_name.is_empty() {
            String::new()
        } else {
            format!(" in class {}", self.class_name)
        }
    }

    /// Skips one field descriptor at the start of `signature`, returning the offset just
    /// past it.
    fn skip_over_field_signature(
        &self,
        signature: &str,
        void_ok: bool,
    ) -> Result<Option<usize>, LoadError> {
        let bytes = signature.as_bytes();
        let mut void_ok = void_ok;
        let mut dimensions = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            match byte {
                b'V' if !void_ok => return Ok(None),
                b'V' | b'Z' | b'B' | b'C' | b'S' | b'I' | b'F' | b'J' | b'D' => {
                    return Ok(Some(i + 1));
                }
                b'L' => {
                    let rest = &signature[i + 1..];
                    if self.major_version < JAVA_1_5_VERSION {
                        return Ok(skip_over_field_name(rest, true)
                            .filter(|&end| end > 0 && rest.as_bytes().get(end) == Some(&b';'))
                            .map(|end| i + 1 + end + 1));
                    }
                    let Some(end) = rest.find(';') else {
                        return Ok(None);
                    };
                    if rest[..end].contains('.') {
                        malform!("Class name contains illegal character '.' in descriptor");
                    }
                    if !is_legal_unqualified_name(&rest[..end], NameKind::Class) {
                        return Ok(None);
                    }
                    return Ok(Some(i + 1 + end + 1));
                }
                b'[' => {
                    dimensions += 1;
                    if dimensions > MAX_ARRAY_DIMENSIONS {
                        malform!("Array type descriptor has more than 255 dimensions");
                    }
                    void_ok = false;
                }
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Checks a class name, which may also be an array descriptor.
    pub(crate) fn verify_legal_class_name(&self, name: &str) -> Result<(), LoadError> {
        if !self.need_verify {
            return Ok(());
        }
        let is_legal = if name.starts_with('[') {
            self.skip_over_field_signature(name, false)? == Some(name.len())
        } else if self.major_version < JAVA_1_5_VERSION {
            !name.starts_with('<') && skip_over_field_name(name, true) == Some(name.len())
        } else {
            is_legal_unqualified_name(name, NameKind::Class)
        };
        if !is_legal {
            malform!("Illegal class name \"{name}\"");
        }
        Ok(())
    }

    pub(crate) fn verify_legal_field_name(&self, name: &str) -> Result<(), LoadError> {
        if !self.need_verify {
            return Ok(());
        }
        let is_legal = if self.major_version < JAVA_1_5_VERSION {
            !name.starts_with('<') && skip_over_field_name(name, false) == Some(name.len())
        } else {
            is_legal_unqualified_name(name, NameKind::Field)
        };
        if !is_legal {
            malform!("Illegal field name \"{name}\"{}", self.in_class());
        }
        Ok(())
    }

    pub(crate) fn verify_legal_method_name(&self, name: &str) -> Result<(), LoadError> {
        if !self.need_verify {
            return Ok(());
        }
        let is_legal = if name.starts_with('<') {
            name == CONSTRUCTOR_NAME || name == CLASS_INITIALIZER_NAME
        } else if self.major_version < JAVA_1_5_VERSION {
            skip_over_field_name(name, false) == Some(name.len())
        } else {
            is_legal_unqualified_name(name, NameKind::Method)
        };
        if !is_legal {
            malform!("Illegal method name \"{name}\"{}", self.in_class());
        }
        Ok(())
    }

    pub(crate) fn illegal_signature(&self, kind: &str, name: &str, signature: &str) -> LoadError {
        LoadError::class_format(format!(
            "{kind} \"{name}\"{} has illegal signature \"{signature}\"",
            self.in_class()
        ))
    }

    pub(crate) fn verify_legal_field_signature(
        &self,
        name: &str,
        signature: &str,
    ) -> Result<(), LoadError> {
        if !self.need_verify {
            return Ok(());
        }
        if self.skip_over_field_signature(signature, false)? != Some(signature.len()) {
            return Err(self.illegal_signature("Field", name, signature));
        }
        Ok(())
    }

    /// Checks a method descriptor and returns the number of argument slots, receiver
    /// excluded. Returns [`None`] when verification is off.
    pub(crate) fn verify_legal_method_signature(
        &self,
        name: &str,
        signature: &str,
    ) -> Result<Option<usize>, LoadError> {
        if !self.need_verify {
            return Ok(None);
        }
        let illegal = || self.illegal_signature("Method", name, signature);
        if name == CLASS_INITIALIZER_NAME
            && signature != "()V"
            && self.major_version >= JAVA_7_VERSION
        {
            return Err(illegal());
        }
        let Some(mut rest) = signature.strip_prefix('(') else {
            return Err(illegal());
        };
        let mut args_size = 0;
        while let Some(end) = self.skip_over_field_signature(rest, false)? {
            args_size += if matches!(rest.as_bytes()[0], b'J' | b'D') { 2 } else { 1 };
            rest = &rest[end..];
        }
        let Some(return_type) = rest.strip_prefix(')') else {
            return Err(illegal());
        };
        let is_legal_return = if name == CONSTRUCTOR_NAME {
            return_type == "V"
        } else {
            self.skip_over_field_signature(return_type, true)? == Some(return_type.len())
        };
        if is_legal_return {
            Ok(Some(args_size))
        } else {
            Err(illegal())
        }
    }

    pub(crate) fn verify_legal_class_modifiers(
        &self,
        flags: ClassAccessFlags,
    ) -> Result<(), LoadError> {
        if !self.need_verify {
            return Ok(());
        }
        let is_interface = flags.contains(ClassAccessFlags::INTERFACE);
        let is_abstract = flags.contains(ClassAccessFlags::ABSTRACT);
        let is_final = flags.contains(ClassAccessFlags::FINAL);
        let is_super = flags.contains(ClassAccessFlags::SUPER);
        let is_enum = flags.contains(ClassAccessFlags::ENUM);
        let is_annotation = flags.contains(ClassAccessFlags::ANNOTATION);
        let major_gte_15 = self.major_version >= JAVA_1_5_VERSION;
        if (is_abstract && is_final)
            || (is_interface && !is_abstract)
            || (is_interface && major_gte_15 && (is_super || is_enum))
            || (!is_interface && major_gte_15 && is_annotation)
        {
            malform!(
                "Illegal class modifiers{}: 0x{:X}",
                self.in_class(),
                flags.bits()
            );
        }
        Ok(())
    }

    pub(crate) fn verify_legal_field_modifiers(
        &self,
        flags: FieldAccessFlags,
        is_interface: bool,
    ) -> Result<(), LoadError> {
        use FieldAccessFlags as F;
        if !self.need_verify {
            return Ok(());
        }
        let is_illegal = if is_interface {
            !flags.contains(F::PUBLIC | F::STATIC | F::FINAL)
                || flags.intersects(F::PRIVATE | F::PROTECTED | F::VOLATILE | F::TRANSIENT)
                || (self.major_version >= JAVA_1_5_VERSION && flags.contains(F::ENUM))
        } else {
            has_illegal_visibility(flags.bits())
                || flags.contains(F::FINAL | F::VOLATILE)
        };
        if is_illegal {
            malform!(
                "Illegal field modifiers{}: 0x{:X}",
                self.in_class(),
                flags.bits()
            );
        }
        Ok(())
    }

    pub(crate) fn verify_legal_method_modifiers(
        &self,
        flags: MethodAccessFlags,
        is_interface: bool,
        name: &str,
    ) -> Result<(), LoadError> {
        use MethodAccessFlags as M;
        if !self.need_verify {
            return Ok(());
        }
        let is_public = flags.contains(M::PUBLIC);
        let is_private = flags.contains(M::PRIVATE);
        let is_static = flags.contains(M::STATIC);
        let is_final = flags.contains(M::FINAL);
        let is_native = flags.contains(M::NATIVE);
        let is_abstract = flags.contains(M::ABSTRACT);
        let is_strict = flags.contains(M::STRICT);
        let is_synchronized = flags.contains(M::SYNCHRONIZED);
        let major_gte_15 = self.major_version >= JAVA_1_5_VERSION;
        let major_gte_8 = self.major_version >= JAVA_8_VERSION;

        let is_illegal = if is_interface {
            if major_gte_8 {
                is_public == is_private
                    || flags.intersects(M::NATIVE | M::PROTECTED | M::FINAL | M::SYNCHRONIZED)
                    || (is_abstract && (is_private || is_static || is_strict))
            } else if major_gte_15 {
                !is_public
                    || is_static
                    || is_final
                    || is_synchronized
                    || is_native
                    || !is_abstract
                    || is_strict
            } else {
                !is_public || is_static || is_final || is_native || !is_abstract
            }
        } else if name == CONSTRUCTOR_NAME {
            is_static
                || is_final
                || is_synchronized
                || is_native
                || is_abstract
                || (major_gte_15 && flags.contains(M::BRIDGE))
        } else {
            (is_abstract
                && (is_final
                    || is_native
                    || is_private
                    || is_static
                    || (major_gte_15 && (is_synchronized || is_strict))))
                || has_illegal_visibility(flags.bits())
        };
        if is_illegal {
            malform!(
                "Method {name}{} has illegal modifiers: 0x{:X}",
                self.in_class(),
                flags.bits()
            );
        }
        Ok(())
    }
}

/// Checks if more than one of `public`, `protected`, and `private` is set.
fn has_illegal_visibility(flags: u16) -> bool {
    (flags & 0x0007).count_ones() > 1
}
