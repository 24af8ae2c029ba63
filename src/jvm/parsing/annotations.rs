//! Recognition of the annotations that change how the VM treats a class or member.
//!
//! Only `RuntimeVisibleAnnotations` are inspected. Element values are skipped without
//! being materialised, and a malformed annotation ends the walk without an error.

use crate::jvm::{constant_pool::ConstantPool, method::MethodIntrinsicFlags};

/// Where the annotations being walked are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnnotationLocation {
    Class,
    Field,
    Method,
}

/// The annotations recognised on a class or member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ParsedAnnotations {
    /// The contention group, 0 for the default group.
    pub contended_group: Option<u16>,
    pub is_stable: bool,
    pub method_flags: MethodIntrinsicFlags,
}

/// Who is allowed to use which annotation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AnnotationPolicy {
    /// Whether the loader may use VM-internal annotations.
    pub privileged: bool,
    /// Whether `@Contended` requires a privileged loader.
    pub restrict_contended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnownAnnotation {
    Contended,
    Stable,
    Method(MethodIntrinsicFlags),
}

fn classify(
    descriptor: &str,
    location: AnnotationLocation,
    policy: AnnotationPolicy,
) -> Option<KnownAnnotation> {
    let method_flag = match descriptor {
        "Lsun/reflect/CallerSensitive;" | "Ljdk/internal/reflect/CallerSensitive;" => {
            Some(MethodIntrinsicFlags::CALLER_SENSITIVE)
        }
        "Ljava/lang/invoke/ForceInline;" | "Ljdk/internal/vm/annotation/ForceInline;" => {
            Some(MethodIntrinsicFlags::FORCE_INLINE)
        }
        "Ljava/lang/invoke/DontInline;" | "Ljdk/internal/vm/annotation/DontInline;" => {
            Some(MethodIntrinsicFlags::DONT_INLINE)
        }
        "Ljava/lang/invoke/LambdaForm$Compiled;" => Some(MethodIntrinsicFlags::LAMBDA_FORM_COMPILED),
        "Ljava/lang/invoke/LambdaForm$Hidden;" | "Ljdk/internal/vm/annotation/Hidden;" => {
            Some(MethodIntrinsicFlags::HIDDEN)
        }
        _ => None,
    };
    if let Some(flag) = method_flag {
        return (location == AnnotationLocation::Method && policy.privileged)
            .then_some(KnownAnnotation::Method(flag));
    }
    match descriptor {
        "Ljava/lang/invoke/Stable;" | "Ljdk/internal/vm/annotation/Stable;" => {
            (location == AnnotationLocation::Field && policy.privileged)
                .then_some(KnownAnnotation::Stable)
        }
        "Lsun/misc/Contended;" | "Ljdk/internal/vm/annotation/Contended;" => {
            let allowed_here = location != AnnotationLocation::Method;
            let permitted = policy.privileged || !policy.restrict_contended;
            (allowed_here && permitted).then_some(KnownAnnotation::Contended)
        }
        _ => None,
    }
}

fn u2_at(data: &[u8], index: usize) -> Option<u16> {
    let bytes = data.get(index..index + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Returns the index just past the annotation starting at `index`.
fn skip_annotation(data: &[u8], index: usize) -> usize {
    let limit = data.len();
    // Skip the type index.
    let mut index = index + 2;
    let Some(member_count) = u2_at(data, index) else {
        return limit;
    };
    index += 2;
    for _ in 0..member_count {
        if index >= limit {
            break;
        }
        index = skip_element_value(data, index + 2);
    }
    index
}

/// Returns the index just past the element value starting at `index`.
fn skip_element_value(data: &[u8], index: usize) -> usize {
    let limit = data.len();
    let Some(&tag) = data.get(index) else {
        return limit;
    };
    let index = index + 1;
    match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' | b'D' | b'F' | b'J' | b'c' | b's' => index + 2,
        b'e' => index + 4,
        b'[' => {
            let Some(value_count) = u2_at(data, index) else {
                return limit;
            };
            let mut index = index + 2;
            for _ in 0..value_count {
                if index >= limit {
                    break;
                }
                index = skip_element_value(data, index);
            }
            index
        }
        b'@' => skip_annotation(data, index),
        _ => limit,
    }
}

/// Walks a `RuntimeVisibleAnnotations` attribute and collects the recognised ones.
pub(crate) fn parse_annotations(
    data: &[u8],
    constant_pool: &ConstantPool,
    location: AnnotationLocation,
    policy: AnnotationPolicy,
) -> ParsedAnnotations {
    // A single string-valued member: type, count, name, tag, value.
    const STRING_MEMBER_SIZE: usize = 9;
    const MIN_SIZE: usize = 4;

    let mut parsed = ParsedAnnotations::default();
    let Some(count) = u2_at(data, 0) else {
        return parsed;
    };
    let mut index = 2;
    for _ in 0..count {
        if index + MIN_SIZE > data.len() {
            break;
        }
        let start = index;
        index = skip_annotation(data, index);
        let (Some(type_index), Some(member_count)) = (u2_at(data, start), u2_at(data, start + 2))
        else {
            break;
        };
        let Ok(descriptor) = constant_pool.utf8_at(type_index) else {
            break;
        };
        let member_name = if member_count >= 1 {
            let name = u2_at(data, start + 4).and_then(|it| constant_pool.utf8_at(it).ok());
            if name.is_none() {
                break;
            }
            name
        } else {
            None
        };
        match classify(descriptor, location, policy) {
            None => {}
            Some(KnownAnnotation::Stable) => parsed.is_stable = true,
            Some(KnownAnnotation::Method(flag)) => parsed.method_flags |= flag,
            Some(KnownAnnotation::Contended) => {
                let mut group = 0;
                if member_count == 1
                    && index - start == STRING_MEMBER_SIZE
                    && data.get(start + 6) == Some(&b's')
                    && member_name.is_some_and(|it| *it == "value")
                {
                    group = u2_at(data, start + 7)
                        .filter(|&it| constant_pool.utf8_at(it).is_ok_and(|value| !value.is_empty()))
                        .unwrap_or(0);
                }
                parsed.contended_group = Some(group);
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{jvm::constant_pool::Entry, symbols::Symbol};

    const PRIVILEGED: AnnotationPolicy = AnnotationPolicy {
        privileged: true,
        restrict_contended: true,
    };
    const UNPRIVILEGED: AnnotationPolicy = AnnotationPolicy {
        privileged: false,
        restrict_contended: true,
    };

    fn pool(strings: &[&str]) -> ConstantPool {
        let length = u16::try_from(strings.len() + 1).unwrap();
        let mut pool = ConstantPool::with_length(length);
        for (i, it) in strings.iter().enumerate() {
            pool.set(u16::try_from(i + 1).unwrap(), Entry::Utf8(Symbol::new(it)));
        }
        pool
    }

    #[test]
    fn contended_with_group() {
        let pool = pool(&["Lsun/misc/Contended;", "value", "group1"]);
        let data = [0, 1, 0, 1, 0, 1, 0, 2, b's', 0, 3];
        let parsed = parse_annotations(&data, &pool, AnnotationLocation::Field, PRIVILEGED);
        assert_eq!(parsed.contended_group, Some(3));
    }

    #[test]
    fn contended_without_members_is_default_group() {
        let pool = pool(&["Ljdk/internal/vm/annotation/Contended;"]);
        let data = [0, 1, 0, 1, 0, 0];
        let parsed = parse_annotations(&data, &pool, AnnotationLocation::Class, PRIVILEGED);
        assert_eq!(parsed.contended_group, Some(0));
    }

    #[test]
    fn contended_requires_privilege_when_restricted() {
        let pool = pool(&["Lsun/misc/Contended;"]);
        let data = [0, 1, 0, 1, 0, 0];
        let parsed = parse_annotations(&data, &pool, AnnotationLocation::Field, UNPRIVILEGED);
        assert_eq!(parsed.contended_group, None);
        let relaxed = AnnotationPolicy {
            restrict_contended: false,
            ..UNPRIVILEGED
        };
        let parsed = parse_annotations(&data, &pool, AnnotationLocation::Field, relaxed);
        assert_eq!(parsed.contended_group, Some(0));
    }

    #[test]
    fn unknown_annotations_are_skipped() {
        let pool = pool(&["LFoo;", "values", "Ljava/lang/invoke/ForceInline;"]);
        // @Foo(values = {1, @Foo}) followed by @ForceInline.
        let data = [
            0, 2, //
            0, 1, 0, 1, 0, 2, b'[', 0, 2, b'I', 0, 1, b'@', 0, 1, 0, 0, //
            0, 3, 0, 0,
        ];
        let parsed = parse_annotations(&data, &pool, AnnotationLocation::Method, PRIVILEGED);
        assert_eq!(parsed.method_flags, MethodIntrinsicFlags::FORCE_INLINE);
        let parsed = parse_annotations(&data, &pool, AnnotationLocation::Method, UNPRIVILEGED);
        assert!(parsed.method_flags.is_empty());
    }

    #[test]
    fn stable_only_on_fields() {
        let pool = pool(&["Ljava/lang/invoke/Stable;"]);
        let data = [0, 1, 0, 1, 0, 0];
        assert!(parse_annotations(&data, &pool, AnnotationLocation::Field, PRIVILEGED).is_stable);
        assert!(!parse_annotations(&data, &pool, AnnotationLocation::Method, PRIVILEGED).is_stable);
    }

    #[test]
    fn truncated_data_is_tolerated() {
        let pool = pool(&["Lsun/misc/Contended;"]);
        let data = [0, 3, 0, 1];
        let parsed = parse_annotations(&data, &pool, AnnotationLocation::Field, PRIVILEGED);
        assert_eq!(parsed, ParsedAnnotations::default());
    }
}
