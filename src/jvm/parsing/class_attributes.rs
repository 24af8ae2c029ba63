//! Parsing of the attributes that follow the `methods` table.

use super::{
    ClassFileStream, ParseContext, attribute_size,
    annotations::{AnnotationLocation, parse_annotations},
    read_attribute_header, read_blob,
};
use crate::{
    errors::LoadError,
    jvm::{
        class::{
            BootstrapMethod, ClassAccessFlags, ClassAnnotations, EnclosingMethod,
            InnerClassEntry, JAVA_1_5_VERSION, JAVA_6_VERSION, JAVA_7_VERSION,
        },
        constant_pool::{ConstantPool, Entry, tag},
    },
    macros::{check_format, malform},
    symbols::Symbol,
};

/// `private`, `protected` and `static` are only meaningful on member classes.
const RECOGNIZED_INNER_CLASS_MODIFIERS: u16 =
    ClassAccessFlags::all().bits() | 0x0002 | 0x0004 | 0x0008;

/// The class-level attributes of a class file.
#[derive(Debug, Default)]
pub(crate) struct ClassAttributes {
    pub source_file: Option<Symbol>,
    pub source_debug_extension: Option<Vec<u8>>,
    pub generic_signature: Option<Symbol>,
    pub inner_classes: Vec<InnerClassEntry>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub bootstrap_methods: Vec<BootstrapMethod>,
    pub annotations: ClassAnnotations,
    pub is_contended: bool,
    pub is_synthetic: bool,
    pub is_deprecated: bool,
}

const fn is_loadable_constant(tag: u8) -> bool {
    matches!(
        tag,
        tag::INTEGER
            | tag::FLOAT
            | tag::LONG
            | tag::DOUBLE
            | tag::CLASS
            | tag::STRING
            | tag::METHOD_HANDLE
            | tag::METHOD_TYPE
    )
}

fn read_utf8_index(
    stream: &mut ClassFileStream<'_>,
    pool: &ConstantPool,
    attribute: &str,
    length: u32,
) -> Result<Symbol, LoadError> {
    check_format!(length == 2, "Wrong {attribute} attribute length {length}");
    let index = stream.get_u2()?;
    match pool.utf8_at(index) {
        Ok(value) => Ok(value.clone()),
        Err(_) => malform!("Invalid {attribute} attribute at constant pool index {index}"),
    }
}

fn parse_inner_classes(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    length: u32,
) -> Result<Vec<InnerClassEntry>, LoadError> {
    let count = stream.get_u2()?;
    if ctx.need_verify && ctx.major_version() >= JAVA_1_5_VERSION {
        check_format!(
            length == 2 + u32::from(count) * 8,
            "Wrong InnerClasses attribute length"
        );
    }
    stream.guarantee_more(usize::from(count) * 8)?;
    let checker = ctx.checker();
    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let inner_class_info_index = stream.get_u2_fast();
        check_format!(
            inner_class_info_index == 0 || pool.tag_at(inner_class_info_index) == tag::CLASS,
            "inner_class_info_index {inner_class_info_index} has bad constant type"
        );
        let outer_class_info_index = stream.get_u2_fast();
        check_format!(
            outer_class_info_index == 0 || pool.tag_at(outer_class_info_index) == tag::CLASS,
            "outer_class_info_index {outer_class_info_index} has bad constant type"
        );
        let inner_name_index = stream.get_u2_fast();
        check_format!(
            inner_name_index == 0 || pool.tag_at(inner_name_index) == tag::UTF8,
            "inner_name_index {inner_name_index} has bad constant type"
        );
        if ctx.need_verify {
            check_format!(
                inner_class_info_index != outer_class_info_index,
                "Class is both outer and inner class"
            );
        }
        let mut flags = stream.get_u2_fast() & RECOGNIZED_INNER_CLASS_MODIFIERS;
        if flags & ClassAccessFlags::INTERFACE.bits() != 0 && ctx.major_version() < JAVA_6_VERSION {
            flags |= ClassAccessFlags::ABSTRACT.bits();
        }
        checker.verify_legal_class_modifiers(ClassAccessFlags::from_bits_truncate(flags))?;
        entries.push(InnerClassEntry {
            inner_class_info_index,
            outer_class_info_index,
            inner_name_index,
            inner_access_flags: flags,
        });
    }

    if ctx.need_verify && ctx.major_version() >= JAVA_1_5_VERSION {
        for (position, entry) in entries.iter().enumerate() {
            check_format!(
                !entries[position + 1..].contains(entry),
                "Duplicate entry in InnerClasses"
            );
        }
    }
    if ctx.need_verify {
        check_redeclared_inner_classes(pool, &entries)?;
        if has_outer_class_cycle(pool, &entries) {
            log::warn!(
                "Ignoring the InnerClasses attribute of {}: the outer class chain is circular",
                ctx.class_name
            );
            entries.clear();
        }
    }
    Ok(entries)
}

fn class_name_at(pool: &ConstantPool, index: u16) -> Option<&Symbol> {
    pool.klass_name_at(index).ok()
}

/// Finds the outer class recorded for `inner`, if `inner` has an entry.
fn outer_class_of(pool: &ConstantPool, entries: &[InnerClassEntry], inner: u16) -> Option<u16> {
    let name = class_name_at(pool, inner)?;
    entries
        .iter()
        .find(|entry| {
            entry.inner_class_info_index != 0
                && class_name_at(pool, entry.inner_class_info_index) == Some(name)
        })
        .map(|entry| entry.outer_class_info_index)
}

/// Follows the outer class chain of every entry. A chain longer than the table revisits a class.
fn has_outer_class_cycle(pool: &ConstantPool, entries: &[InnerClassEntry]) -> bool {
    entries
        .iter()
        .filter(|entry| entry.inner_class_info_index != 0)
        .any(|entry| {
            let inner = class_name_at(pool, entry.inner_class_info_index);
            let mut current = entry.outer_class_info_index;
            for _ in 0..=entries.len() {
                if current == 0 {
                    return false;
                }
                if class_name_at(pool, current) == inner {
                    return true;
                }
                match outer_class_of(pool, entries, current) {
                    Some(next) => current = next,
                    None => return false,
                }
            }
            true
        })
}

fn check_redeclared_inner_classes(
    pool: &ConstantPool,
    entries: &[InnerClassEntry],
) -> Result<(), LoadError> {
    for (position, entry) in entries.iter().enumerate() {
        let Some(name) = class_name_at(pool, entry.inner_class_info_index) else {
            continue;
        };
        check_format!(
            !entries[position + 1..]
                .iter()
                .any(|other| class_name_at(pool, other.inner_class_info_index) == Some(name)),
            "Duplicate inner_class_info_index for {name} in InnerClasses"
        );
    }
    Ok(())
}

fn parse_enclosing_method(
    stream: &mut ClassFileStream<'_>,
    pool: &ConstantPool,
    length: u32,
) -> Result<EnclosingMethod, LoadError> {
    check_format!(length == 4, "Wrong EnclosingMethod attribute length {length}");
    stream.guarantee_more(4)?;
    let class_index = stream.get_u2_fast();
    let method_index = stream.get_u2_fast();
    check_format!(class_index != 0, "Invalid class index in EnclosingMethod attribute");
    check_format!(
        pool.tag_at(class_index) == tag::CLASS,
        "Invalid or out-of-bounds class index in EnclosingMethod attribute"
    );
    check_format!(
        method_index == 0 || pool.tag_at(method_index) == tag::NAME_AND_TYPE,
        "Invalid or out-of-bounds method index in EnclosingMethod attribute"
    );
    Ok(EnclosingMethod {
        class_index,
        method_index,
    })
}

fn parse_bootstrap_methods(
    stream: &mut ClassFileStream<'_>,
    pool: &ConstantPool,
    length: u32,
) -> Result<Vec<BootstrapMethod>, LoadError> {
    check_format!(length >= 2, "Invalid BootstrapMethods attribute length {length}");
    let start = stream.current_offset();
    let count = stream.get_u2()?;
    let mut methods = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        stream.guarantee_more(4)?;
        let method_ref = stream.get_u2_fast();
        let argument_count = stream.get_u2_fast();
        check_format!(
            pool.tag_at(method_ref) == tag::METHOD_HANDLE,
            "bootstrap_method_index {method_ref} has bad constant type"
        );
        stream.guarantee_more(usize::from(argument_count) * 2)?;
        let arguments: Vec<u16> = (0..argument_count).map(|_| stream.get_u2_fast()).collect();
        for &argument in &arguments {
            check_format!(
                is_loadable_constant(pool.tag_at(argument)),
                "argument_index {argument} has bad constant type"
            );
        }
        methods.push(BootstrapMethod {
            method_ref,
            arguments,
        });
    }
    check_format!(
        stream.current_offset() - start == attribute_size(length),
        "Invalid BootstrapMethods attribute length {length}"
    );
    Ok(methods)
}

/// The largest bootstrap method index named by an `invokedynamic` constant.
fn max_bootstrap_specifier_index(pool: &ConstantPool) -> Option<u16> {
    pool.iter()
        .filter_map(|(_, entry)| match entry {
            Entry::InvokeDynamic {
                bootstrap_method_attr_index,
                ..
            } => Some(*bootstrap_method_attr_index),
            _ => None,
        })
        .max()
}

fn set_once<T>(slot: &mut Option<T>, value: T, attribute: &str) -> Result<(), LoadError> {
    check_format!(slot.is_none(), "Multiple {attribute} attributes");
    *slot = Some(value);
    Ok(())
}

/// Parses the attribute table of the class, including its `u2` count.
#[allow(
    clippy::too_many_lines,
    reason = "The attributes of a class are dispatched in one place."
)]
pub(crate) fn parse_class_attributes(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
) -> Result<ClassAttributes, LoadError> {
    let mut attributes = ClassAttributes::default();
    let mut parsed_inner_classes = false;
    let mut parsed_bootstrap_methods = false;
    let is_at_least_1_5 = ctx.major_version() >= JAVA_1_5_VERSION;
    let count = stream.get_u2()?;
    for _ in 0..count {
        let (name, length) = read_attribute_header(stream, pool, "class")?;
        match &**name {
            "SourceFile" => {
                let value = read_utf8_index(stream, pool, "SourceFile", length)?;
                set_once(&mut attributes.source_file, value, "SourceFile")?;
            }
            "SourceDebugExtension" => {
                let value = read_blob(stream, length)?;
                set_once(&mut attributes.source_debug_extension, value, "SourceDebugExtension")?;
            }
            "InnerClasses" => {
                check_format!(!parsed_inner_classes, "Multiple InnerClasses attributes");
                parsed_inner_classes = true;
                attributes.inner_classes = parse_inner_classes(stream, ctx, pool, length)?;
            }
            "Synthetic" => {
                check_format!(length == 0, "Invalid Synthetic classfile attribute length {length}");
                attributes.is_synthetic = true;
            }
            "Deprecated" => {
                check_format!(length == 0, "Invalid Deprecated classfile attribute length {length}");
                attributes.is_deprecated = true;
            }
            "Signature" if is_at_least_1_5 => {
                let value = read_utf8_index(stream, pool, "Signature", length)?;
                set_once(&mut attributes.generic_signature, value, "Signature")?;
            }
            "EnclosingMethod" if is_at_least_1_5 => {
                let value = parse_enclosing_method(stream, pool, length)?;
                set_once(&mut attributes.enclosing_method, value, "EnclosingMethod")?;
            }
            "RuntimeVisibleAnnotations" if is_at_least_1_5 => {
                let data = read_blob(stream, length)?;
                attributes.is_contended = parse_annotations(
                    &data,
                    pool,
                    AnnotationLocation::Class,
                    ctx.annotation_policy,
                )
                .contended_group
                .is_some();
                set_once(&mut attributes.annotations.visible, data, "RuntimeVisibleAnnotations")?;
            }
            "RuntimeInvisibleAnnotations" if is_at_least_1_5 => {
                let data = read_blob(stream, length)?;
                set_once(&mut attributes.annotations.invisible, data, "RuntimeInvisibleAnnotations")?;
            }
            "RuntimeVisibleTypeAnnotations" if is_at_least_1_5 => {
                let data = read_blob(stream, length)?;
                set_once(
                    &mut attributes.annotations.visible_type,
                    data,
                    "RuntimeVisibleTypeAnnotations",
                )?;
            }
            "RuntimeInvisibleTypeAnnotations" if is_at_least_1_5 => {
                let data = read_blob(stream, length)?;
                set_once(
                    &mut attributes.annotations.invisible_type,
                    data,
                    "RuntimeInvisibleTypeAnnotations",
                )?;
            }
            "BootstrapMethods" if ctx.major_version() >= JAVA_7_VERSION => {
                check_format!(!parsed_bootstrap_methods, "Multiple BootstrapMethods attributes");
                parsed_bootstrap_methods = true;
                attributes.bootstrap_methods = parse_bootstrap_methods(stream, pool, length)?;
            }
            _ => stream.skip_u1(attribute_size(length))?,
        }
    }
    if let Some(max_index) = max_bootstrap_specifier_index(pool) {
        check_format!(parsed_bootstrap_methods, "Missing BootstrapMethods attribute");
        check_format!(
            usize::from(max_index) < attributes.bootstrap_methods.len(),
            "Short length on BootstrapMethods"
        );
    }
    Ok(attributes)
}
