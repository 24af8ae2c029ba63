//! Parsing of the `fields` table.

use std::collections::HashSet;

use super::{
    ClassFileStream, ParseContext,
    annotations::{AnnotationLocation, parse_annotations},
    read_attribute_header, read_blob,
};
use crate::{
    errors::{FormatContext, LoadError},
    jvm::{
        class::JAVA_1_5_VERSION,
        constant_pool::{ConstantPool, tag},
        field::{FieldAccessFlags, FieldAllocationType, FieldAnnotations, FieldInfo},
    },
    macros::{check_format, malform},
    symbols::{Symbol, SymbolTable},
    types::field_type::{FieldType, PrimitiveType},
};

/// The fields of a class: the declared ones first, then the injected ones.
#[derive(Debug)]
pub(crate) struct ParsedFields {
    pub fields: Vec<FieldInfo>,
    pub java_fields_count: usize,
}

/// Attributes of one field.
#[derive(Debug, Default)]
struct FieldAttributes {
    constant_value_index: u16,
    generic_signature_index: u16,
    is_synthetic: bool,
    is_deprecated: bool,
    contended_group: Option<u16>,
    is_stable: bool,
    annotations: FieldAnnotations,
}

/// Checks that the `ConstantValue` of a field matches its type.
fn verify_constant_value(
    pool: &ConstantPool,
    value_index: u16,
    field_type: &FieldType,
    signature: &str,
) -> Result<(), LoadError> {
    check_format!(
        pool.is_within_bounds(value_index),
        "Bad initial value index {value_index} in ConstantValue attribute"
    );
    let value_tag = pool.tag_at(value_index);
    match field_type {
        FieldType::Base(PrimitiveType::Long) => {
            check_format!(value_tag == tag::LONG, "Inconsistent constant value type");
        }
        FieldType::Base(PrimitiveType::Float) => {
            check_format!(value_tag == tag::FLOAT, "Inconsistent constant value type");
        }
        FieldType::Base(PrimitiveType::Double) => {
            check_format!(value_tag == tag::DOUBLE, "Inconsistent constant value type");
        }
        FieldType::Base(_) => {
            check_format!(value_tag == tag::INTEGER, "Inconsistent constant value type");
        }
        FieldType::Object(_) => {
            check_format!(
                signature == "Ljava/lang/String;" && value_tag == tag::STRING,
                "Bad string initial value"
            );
        }
        FieldType::Array(_) => malform!("Unable to set initial value {value_index}"),
    }
    Ok(())
}

fn parse_field_attributes(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    is_static: bool,
    field_type: &FieldType,
    signature: &str,
) -> Result<FieldAttributes, LoadError> {
    let mut attributes = FieldAttributes::default();
    let attributes_count = stream.get_u2()?;
    for _ in 0..attributes_count {
        let (name, length) = read_attribute_header(stream, pool, "field")?;
        match &**name {
            // A non-static field ignores its constant value.
            "ConstantValue" if is_static => {
                check_format!(
                    attributes.constant_value_index == 0,
                    "Duplicate ConstantValue attribute"
                );
                check_format!(
                    length == 2,
                    "Invalid ConstantValue field attribute length {length}"
                );
                let value_index = stream.get_u2()?;
                if ctx.need_verify {
                    verify_constant_value(pool, value_index, field_type, signature)?;
                }
                attributes.constant_value_index = value_index;
            }
            "Synthetic" => {
                check_format!(length == 0, "Invalid Synthetic field attribute length {length}");
                attributes.is_synthetic = true;
            }
            "Deprecated" => {
                check_format!(length == 0, "Invalid Deprecated field attribute length {length}");
                attributes.is_deprecated = true;
            }
            "Signature" if ctx.major_version() >= JAVA_1_5_VERSION => {
                check_format!(length == 2, "Wrong size {length} for field's Signature attribute");
                let index = stream.get_u2()?;
                check_format!(
                    pool.tag_at(index) == tag::UTF8,
                    "Invalid Signature attribute at constant pool index {index}"
                );
                attributes.generic_signature_index = index;
            }
            "RuntimeVisibleAnnotations" if ctx.major_version() >= JAVA_1_5_VERSION => {
                let data = read_blob(stream, length)?;
                let parsed = parse_annotations(
                    &data,
                    pool,
                    AnnotationLocation::Field,
                    ctx.annotation_policy,
                );
                attributes.contended_group = parsed.contended_group;
                attributes.is_stable = parsed.is_stable;
                attributes.annotations.visible = Some(data);
            }
            "RuntimeInvisibleAnnotations" if ctx.major_version() >= JAVA_1_5_VERSION => {
                attributes.annotations.invisible = Some(read_blob(stream, length)?);
            }
            "RuntimeVisibleTypeAnnotations" if ctx.major_version() >= JAVA_1_5_VERSION => {
                attributes.annotations.visible_type = Some(read_blob(stream, length)?);
            }
            "RuntimeInvisibleTypeAnnotations" if ctx.major_version() >= JAVA_1_5_VERSION => {
                attributes.annotations.invisible_type = Some(read_blob(stream, length)?);
            }
            _ => stream.skip_u1(super::attribute_size(length))?,
        }
    }
    Ok(attributes)
}

fn parse_field(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    is_interface: bool,
) -> Result<FieldInfo, LoadError> {
    let checker = ctx.checker();
    stream.guarantee_more(6)?;
    let access_flags = FieldAccessFlags::from_bits_truncate(stream.get_u2_fast());
    checker.verify_legal_field_modifiers(access_flags, is_interface)?;

    let name_index = stream.get_u2_fast();
    let name = pool
        .utf8_at(name_index)
        .format_context(|| format!("Invalid constant pool index {name_index} for field name"))?
        .clone();
    checker.verify_legal_field_name(&name)?;

    let signature_index = stream.get_u2_fast();
    let signature = pool
        .utf8_at(signature_index)
        .format_context(|| {
            format!("Invalid constant pool index {signature_index} for field signature")
        })?
        .clone();
    checker.verify_legal_field_signature(&name, &signature)?;
    let field_type: FieldType = signature.parse().format_context(|| {
        format!("Field \"{name}\" has illegal signature \"{signature}\"")
    })?;

    let is_static = access_flags.contains(FieldAccessFlags::STATIC);
    let attributes = parse_field_attributes(stream, ctx, pool, is_static, &field_type, &signature)?;
    Ok(FieldInfo {
        access_flags,
        name,
        signature,
        allocation_type: FieldAllocationType::new(&field_type, is_static),
        field_type,
        name_index,
        signature_index,
        initial_value_index: attributes.constant_value_index,
        generic_signature_index: attributes.generic_signature_index,
        contended_group: attributes.contended_group,
        is_stable: attributes.is_stable,
        is_injected: false,
        is_synthetic: attributes.is_synthetic,
        is_deprecated: attributes.is_deprecated,
        annotations: attributes.annotations,
        offset: 0,
    })
}

/// Builds the fields the VM adds to the class being parsed.
fn injected_fields(
    ctx: &ParseContext<'_>,
    symbols: &SymbolTable,
    declared: &[FieldInfo],
) -> Result<Vec<FieldInfo>, LoadError> {
    let Some(injected) = ctx.options.injected_fields.get(ctx.class_name) else {
        return Ok(Vec::new());
    };
    let mut fields = Vec::with_capacity(injected.len());
    for field in injected {
        let declared_in_java = declared
            .iter()
            .any(|it| it.name == field.name.as_str() && it.signature == field.signature.as_str());
        if field.may_be_java && declared_in_java {
            continue;
        }
        let field_type: FieldType = field.signature.parse().format_context(|| {
            format!(
                "Injected field \"{}\" has illegal signature \"{}\"",
                field.name, field.signature
            )
        })?;
        fields.push(FieldInfo {
            access_flags: FieldAccessFlags::empty(),
            name: symbols.intern(&field.name),
            signature: symbols.intern(&field.signature),
            allocation_type: FieldAllocationType::new(&field_type, false),
            field_type,
            name_index: 0,
            signature_index: 0,
            initial_value_index: 0,
            generic_signature_index: 0,
            contended_group: None,
            is_stable: false,
            is_injected: true,
            is_synthetic: false,
            is_deprecated: false,
            annotations: FieldAnnotations::default(),
            offset: 0,
        });
    }
    Ok(fields)
}

/// Parses the `fields` table, including its `u2` count, and appends the injected fields.
pub(crate) fn parse_fields(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    symbols: &SymbolTable,
    is_interface: bool,
) -> Result<ParsedFields, LoadError> {
    let count = stream.get_u2()?;
    let mut fields = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        fields.push(parse_field(stream, ctx, pool, is_interface)?);
    }
    if ctx.need_verify && fields.len() > 1 {
        let mut seen: HashSet<(&Symbol, &Symbol)> = HashSet::with_capacity(fields.len());
        for field in &fields {
            check_format!(
                seen.insert((&field.name, &field.signature)),
                "Duplicate field name \"{}\" with signature \"{}\"",
                field.name,
                field.signature
            );
        }
    }
    let java_fields_count = fields.len();
    let injected = injected_fields(ctx, symbols, &fields)?;
    fields.extend(injected);
    Ok(ParsedFields {
        fields,
        java_fields_count,
    })
}
