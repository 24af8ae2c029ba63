//! Parsing of the `methods` table and of method bodies.

use std::collections::{HashMap, HashSet};

use super::{
    ClassFileStream, ParseContext, attribute_size,
    annotations::{AnnotationLocation, parse_annotations},
    read_attribute_header, read_blob,
    verifier::MAX_ARGS_SIZE,
};
use crate::{
    errors::{FormatContext, LoadError},
    jvm::{
        class::{JAVA_1_5_VERSION, JAVA_6_VERSION, JAVA_7_VERSION},
        constant_pool::{ConstantPool, tag},
        line_numbers::LineNumberWriter,
        method::{
            CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME, Code, ExceptionTableEntry,
            LocalVariableEntry, MethodAccessFlags, MethodAnnotations, MethodInfo,
            MethodIntrinsicFlags, MethodParameter,
        },
    },
    macros::{check_format, malform},
    symbols::Symbol,
    types::method_descriptor::MethodDescriptor,
};

/// The largest bytecode array a method may have.
const MAX_CODE_SIZE: u32 = 65535;

/// Which of the two local variable tables is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalVariableTable {
    Types,
    Descriptors,
}

impl LocalVariableTable {
    const fn name(self) -> &'static str {
        match self {
            Self::Descriptors => "LocalVariableTable",
            Self::Types => "LocalVariableTypeTable",
        }
    }
}

/// The key identifying a local variable across its two tables.
type LocalVariableKey = (u16, u16, u16, u16);

const fn local_variable_key(entry: &LocalVariableEntry) -> LocalVariableKey {
    (entry.start_pc, entry.length, entry.name_index, entry.slot)
}

/// Facts about the method whose body is being read.
#[derive(Debug, Clone, Copy)]
struct MethodShape {
    /// Argument slots including the receiver, [`None`] when not verifying.
    args_size: Option<usize>,
}

fn parse_exception_table(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    code_length: u32,
) -> Result<Vec<ExceptionTableEntry>, LoadError> {
    let length = stream.get_u2()?;
    stream.guarantee_more(usize::from(length) * 8)?;
    let mut table = Vec::with_capacity(usize::from(length));
    for _ in 0..length {
        let entry = ExceptionTableEntry {
            start_pc: stream.get_u2_fast(),
            end_pc: stream.get_u2_fast(),
            handler_pc: stream.get_u2_fast(),
            catch_type_index: stream.get_u2_fast(),
        };
        if ctx.need_verify {
            check_format!(
                entry.start_pc < entry.end_pc && u32::from(entry.end_pc) <= code_length,
                "Illegal exception table range"
            );
            check_format!(
                u32::from(entry.handler_pc) < code_length,
                "Illegal exception table handler"
            );
            check_format!(
                entry.catch_type_index == 0 || pool.tag_at(entry.catch_type_index) == tag::CLASS,
                "Catch type in exception table has bad constant type"
            );
        }
        table.push(entry);
    }
    Ok(table)
}

fn parse_line_number_table(
    stream: &mut ClassFileStream<'_>,
    attribute_length: u32,
    code_length: u32,
    writer: &mut LineNumberWriter,
) -> Result<(), LoadError> {
    let count = stream.get_u2()?;
    let length_in_bytes = u32::from(count) * 4;
    check_format!(
        attribute_length == 2 + length_in_bytes,
        "LineNumberTable attribute has wrong length"
    );
    stream.guarantee_more(attribute_size(length_in_bytes))?;
    for _ in 0..count {
        let bci = stream.get_u2_fast();
        let line = stream.get_u2_fast();
        if stream.need_verify() {
            check_format!(
                u32::from(bci) < code_length,
                "Invalid pc {bci} in LineNumberTable"
            );
        }
        writer.write_pair(bci, line);
    }
    Ok(())
}

fn parse_local_variable_table(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    table: LocalVariableTable,
    attribute_length: u32,
    code: (u32, u16),
) -> Result<Vec<LocalVariableEntry>, LoadError> {
    let (code_length, max_locals) = code;
    let table_name = table.name();
    let count = stream.get_u2()?;
    let size = u32::from(count) * 10;
    if ctx.need_verify {
        check_format!(
            attribute_length == 2 + size,
            "{table_name} attribute has wrong length"
        );
    }
    stream.guarantee_more(attribute_size(size))?;
    let checker = ctx.checker();
    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let start_pc = stream.get_u2_fast();
        let length = stream.get_u2_fast();
        let name_index = stream.get_u2_fast();
        let descriptor_index = stream.get_u2_fast();
        let slot = stream.get_u2_fast();
        if ctx.need_verify {
            let end_pc = u32::from(start_pc) + u32::from(length);
            check_format!(
                u32::from(start_pc) < code_length,
                "Invalid start_pc {start_pc} in {table_name}"
            );
            check_format!(end_pc <= code_length, "Invalid length {length} in {table_name}");
            let name = pool.utf8_at(name_index).format_context(|| {
                format!("Name index {name_index} in {table_name} has bad constant type")
            })?;
            let descriptor = pool.utf8_at(descriptor_index).format_context(|| {
                format!("Signature index {descriptor_index} in {table_name} has bad constant type")
            })?;
            checker.verify_legal_field_name(name)?;
            let mut extra_slot = 0;
            if table == LocalVariableTable::Descriptors {
                checker.verify_legal_field_signature(name, descriptor)?;
                if *descriptor == "J" || *descriptor == "D" {
                    extra_slot = 1;
                }
            }
            check_format!(
                u32::from(slot) + extra_slot < u32::from(max_locals),
                "Invalid index {slot} in {table_name}"
            );
        }
        entries.push(LocalVariableEntry {
            start_pc,
            length,
            name_index,
            descriptor_index,
            signature_index: 0,
            slot,
        });
    }
    Ok(entries)
}

/// Merges the generic signatures of `types` into the matching `descriptors` entries.
fn merge_local_variable_tables(
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    mut descriptors: Vec<LocalVariableEntry>,
    types: &[LocalVariableEntry],
) -> Result<Vec<LocalVariableEntry>, LoadError> {
    let name_of = |index: u16| pool.utf8_at(index).map_or("", |it| it.as_str());
    let mut by_key: HashMap<LocalVariableKey, usize> = HashMap::with_capacity(descriptors.len());
    for (position, entry) in descriptors.iter().enumerate() {
        let is_new = by_key.insert(local_variable_key(entry), position).is_none();
        if ctx.need_verify && !is_new {
            malform!(
                "Duplicated LocalVariableTable attribute entry for '{}'",
                name_of(entry.name_index)
            );
        }
    }
    for entry in types {
        let Some(&position) = by_key.get(&local_variable_key(entry)) else {
            if ctx.need_verify && !ctx.options.relax_local_variable_type_table {
                malform!(
                    "LVTT entry for '{}' does not match any LVT entry",
                    name_of(entry.name_index)
                );
            }
            continue;
        };
        let target = &mut descriptors[position];
        if target.signature_index != 0 && ctx.need_verify {
            malform!(
                "Duplicated LocalVariableTypeTable attribute entry for '{}'",
                name_of(entry.name_index)
            );
        }
        target.signature_index = entry.descriptor_index;
    }
    Ok(descriptors)
}

/// Parses the body of a `Code` attribute of `attribute_length` bytes.
fn parse_code(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    shape: MethodShape,
    attribute_length: u32,
) -> Result<Code, LoadError> {
    let (max_stack, max_locals, code_length, header_size) = if ctx.version.has_compact_code_sizes()
    {
        stream.guarantee_more(4)?;
        let max_stack = u16::from(stream.get_u1_fast());
        let max_locals = u16::from(stream.get_u1_fast());
        (max_stack, max_locals, u32::from(stream.get_u2_fast()), 4_u32)
    } else {
        stream.guarantee_more(8)?;
        (stream.get_u2_fast(), stream.get_u2_fast(), stream.get_u4_fast(), 8)
    };
    if let Some(args_size) = shape.args_size {
        check_format!(
            args_size <= usize::from(max_locals),
            "Arguments can't fit into locals"
        );
        check_format!(
            code_length > 0 && code_length <= MAX_CODE_SIZE,
            "Invalid method Code length {code_length}"
        );
    }
    let bytecode = stream.get_bytes(attribute_size(code_length))?.to_vec();
    let exception_table = parse_exception_table(stream, ctx, pool, code_length)?;
    let attributes_count = stream.get_u2()?;

    #[allow(
        clippy::cast_possible_truncation,
        reason = "The exception table has at most 65535 entries."
    )]
    let mut calculated_length = u64::from(header_size)
        + u64::from(code_length)
        + 2
        + 2
        + exception_table.len() as u64 * 8;
    let mut line_numbers = LineNumberWriter::new();
    let mut descriptor_tables = Vec::new();
    let mut type_tables = Vec::new();
    let mut stack_map_table = None;
    for _ in 0..attributes_count {
        let (name, length) = read_attribute_header(stream, pool, "code")?;
        calculated_length += u64::from(length) + 6;
        match &**name {
            "LineNumberTable" => {
                parse_line_number_table(stream, length, code_length, &mut line_numbers)?;
            }
            "LocalVariableTable" => {
                descriptor_tables.extend(parse_local_variable_table(
                    stream,
                    ctx,
                    pool,
                    LocalVariableTable::Descriptors,
                    length,
                    (code_length, max_locals),
                )?);
            }
            "LocalVariableTypeTable" if ctx.major_version() >= JAVA_1_5_VERSION => {
                type_tables.extend(parse_local_variable_table(
                    stream,
                    ctx,
                    pool,
                    LocalVariableTable::Types,
                    length,
                    (code_length, max_locals),
                )?);
            }
            "StackMapTable" if ctx.major_version() >= JAVA_6_VERSION => {
                check_format!(stack_map_table.is_none(), "Multiple StackMapTable attributes");
                stack_map_table = Some(read_blob(stream, length)?);
            }
            _ => stream.skip_u1(attribute_size(length))?,
        }
    }
    if ctx.need_verify {
        check_format!(
            u64::from(attribute_length) == calculated_length,
            "Code segment has wrong length"
        );
    }
    let local_variables = merge_local_variable_tables(ctx, pool, descriptor_tables, &type_tables)?;
    Ok(Code {
        max_stack,
        max_locals,
        bytecode,
        exception_table,
        line_numbers: line_numbers.finish(),
        local_variables,
        stack_map_table,
    })
}

fn parse_checked_exceptions(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    attribute_length: u32,
) -> Result<Vec<u16>, LoadError> {
    let count = stream.get_u2()?;
    stream.guarantee_more(usize::from(count) * 2)?;
    let exceptions: Vec<u16> = (0..count).map(|_| stream.get_u2_fast()).collect();
    if ctx.need_verify {
        for &index in &exceptions {
            check_format!(
                pool.tag_at(index) == tag::CLASS,
                "Exception name has bad type at constant pool {index}"
            );
        }
        check_format!(
            attribute_length == 2 + u32::from(count) * 2,
            "Exceptions attribute has wrong length"
        );
    }
    Ok(exceptions)
}

fn parse_method_parameters(
    stream: &mut ClassFileStream<'_>,
    attribute_length: u32,
) -> Result<Vec<MethodParameter>, LoadError> {
    let count = stream.get_u1()?;
    check_format!(
        attribute_length == u32::from(count) * 4 + 1,
        "Invalid MethodParameters method attribute length {attribute_length}"
    );
    stream.guarantee_more(usize::from(count) * 4)?;
    Ok((0..count)
        .map(|_| MethodParameter {
            name_index: stream.get_u2_fast(),
            access_flags: stream.get_u2_fast(),
        })
        .collect())
}

/// Adjusts the access flags of `<clinit>`, which are ignored before Java 7.
fn class_initializer_flags(
    flags: MethodAccessFlags,
    major_version: u16,
) -> Result<MethodAccessFlags, LoadError> {
    if major_version < JAVA_7_VERSION {
        Ok(MethodAccessFlags::STATIC)
    } else if flags.contains(MethodAccessFlags::STATIC) {
        Ok(flags & (MethodAccessFlags::STATIC | MethodAccessFlags::STRICT))
    } else {
        malform!("Method <clinit> is not static")
    }
}

#[allow(
    clippy::too_many_lines,
    reason = "The attributes of a method are dispatched in one place."
)]
fn parse_method(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    is_interface: bool,
) -> Result<MethodInfo, LoadError> {
    let checker = ctx.checker();
    stream.guarantee_more(8)?;
    let raw_flags = stream.get_u2_fast();
    let name_index = stream.get_u2_fast();
    let name: Symbol = pool
        .utf8_at(name_index)
        .format_context(|| format!("Illegal constant pool index {name_index} for method name"))?
        .clone();
    checker.verify_legal_method_name(&name)?;
    check_format!(
        !(is_interface && name == CONSTRUCTOR_NAME),
        "Interface cannot have a method named <init>"
    );

    let signature_index = stream.get_u2_fast();
    let signature: Symbol = pool
        .utf8_at(signature_index)
        .format_context(|| {
            format!("Illegal constant pool index {signature_index} for method signature")
        })?
        .clone();

    let declared_flags = MethodAccessFlags::from_bits_truncate(raw_flags);
    let access_flags = if name == CLASS_INITIALIZER_NAME {
        class_initializer_flags(declared_flags, ctx.major_version())?
    } else {
        checker.verify_legal_method_modifiers(declared_flags, is_interface, &name)?;
        declared_flags
    };
    let receiver_slots = usize::from(!access_flags.contains(MethodAccessFlags::STATIC));

    let args_size = checker
        .verify_legal_method_signature(&name, &signature)?
        .map(|slots| slots + receiver_slots);
    if let Some(args_size) = args_size {
        check_format!(
            args_size <= MAX_ARGS_SIZE,
            "Too many arguments in method signature"
        );
    }
    let descriptor: MethodDescriptor = signature.parse().format_context(|| {
        format!("Method \"{name}\" has illegal signature \"{signature}\"")
    })?;
    let size_of_parameters = u16::try_from(descriptor.parameter_slots() + receiver_slots)
        .format_context(|| "Too many arguments in method signature")?;

    let is_native_or_abstract =
        access_flags.intersects(MethodAccessFlags::NATIVE | MethodAccessFlags::ABSTRACT);
    let mut code = None;
    let mut checked_exceptions = None;
    let mut parameters = None;
    let mut generic_signature_index = 0;
    let mut intrinsic_flags = MethodIntrinsicFlags::empty();
    let mut is_synthetic = false;
    let mut is_deprecated = false;
    let mut annotations = MethodAnnotations::default();
    let attributes_count = stream.get_u2()?;
    for _ in 0..attributes_count {
        let (attribute_name, length) = read_attribute_header(stream, pool, "method")?;
        let is_at_least_1_5 = ctx.major_version() >= JAVA_1_5_VERSION;
        match &**attribute_name {
            "Code" => {
                if ctx.need_verify {
                    check_format!(
                        !is_native_or_abstract,
                        "Code attribute in native or abstract methods"
                    );
                }
                check_format!(code.is_none(), "Multiple Code attributes");
                let shape = MethodShape { args_size };
                code = Some(parse_code(stream, ctx, pool, shape, length)?);
            }
            "Exceptions" => {
                check_format!(checked_exceptions.is_none(), "Multiple Exceptions attributes");
                checked_exceptions = Some(parse_checked_exceptions(stream, ctx, pool, length)?);
            }
            "MethodParameters" => {
                check_format!(parameters.is_none(), "Multiple MethodParameters attributes");
                parameters = Some(parse_method_parameters(stream, length)?);
            }
            "Synthetic" => {
                check_format!(length == 0, "Invalid Synthetic method attribute length {length}");
                is_synthetic = true;
            }
            "Deprecated" => {
                check_format!(length == 0, "Invalid Deprecated method attribute length {length}");
                is_deprecated = true;
            }
            "Signature" if is_at_least_1_5 => {
                check_format!(length == 2, "Invalid Signature attribute length {length}");
                let index = stream.get_u2()?;
                check_format!(
                    pool.tag_at(index) == tag::UTF8,
                    "Invalid Signature attribute at constant pool index {index}"
                );
                generic_signature_index = index;
            }
            "RuntimeVisibleAnnotations" if is_at_least_1_5 => {
                let data = read_blob(stream, length)?;
                intrinsic_flags = parse_annotations(
                    &data,
                    pool,
                    AnnotationLocation::Method,
                    ctx.annotation_policy,
                )
                .method_flags;
                annotations.visible = Some(data);
            }
            "RuntimeInvisibleAnnotations" if is_at_least_1_5 => {
                annotations.invisible = Some(read_blob(stream, length)?);
            }
            "RuntimeVisibleParameterAnnotations" if is_at_least_1_5 => {
                annotations.visible_parameter = Some(read_blob(stream, length)?);
            }
            "RuntimeInvisibleParameterAnnotations" if is_at_least_1_5 => {
                annotations.invisible_parameter = Some(read_blob(stream, length)?);
            }
            "AnnotationDefault" if is_at_least_1_5 => {
                annotations.default = Some(read_blob(stream, length)?);
            }
            "RuntimeVisibleTypeAnnotations" if is_at_least_1_5 => {
                annotations.visible_type = Some(read_blob(stream, length)?);
            }
            "RuntimeInvisibleTypeAnnotations" if is_at_least_1_5 => {
                annotations.invisible_type = Some(read_blob(stream, length)?);
            }
            _ => stream.skip_u1(attribute_size(length))?,
        }
    }
    if ctx.need_verify {
        check_format!(
            is_native_or_abstract || code.is_some(),
            "Absent Code attribute in method that is not native or abstract"
        );
    }
    Ok(MethodInfo {
        access_flags,
        name,
        signature,
        name_index,
        signature_index,
        size_of_parameters,
        code,
        checked_exceptions: checked_exceptions.unwrap_or_default(),
        parameters: parameters.unwrap_or_default(),
        generic_signature_index,
        intrinsic_flags,
        is_synthetic,
        is_deprecated,
        annotations,
    })
}

/// Parses the `methods` table, including its `u2` count, in declaration order.
pub(crate) fn parse_methods(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    pool: &ConstantPool,
    is_interface: bool,
) -> Result<Vec<MethodInfo>, LoadError> {
    let count = stream.get_u2()?;
    let mut methods = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        methods.push(parse_method(stream, ctx, pool, is_interface)?);
    }
    if ctx.need_verify && methods.len() > 1 {
        let mut seen: HashSet<(&Symbol, &Symbol)> = HashSet::with_capacity(methods.len());
        for method in &methods {
            check_format!(
                seen.insert((&method.name, &method.signature)),
                "Duplicate method name \"{}\" with signature \"{}\"",
                method.name,
                method.signature
            );
        }
    }
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        LoadOptions,
        jvm::{
            class::Version,
            constant_pool::Entry,
            parsing::test_support::{Bytes, context},
        },
    };

    const NAMES: &[&str] = &[
        "run",                    // 1
        "()V",                    // 2
        "Code",                   // 3
        "LineNumberTable",        // 4
        "LocalVariableTable",     // 5
        "LocalVariableTypeTable", // 6
        "this",                   // 7
        "LTest;",                 // 8
        "LTest<TT;>;",            // 9
        "<clinit>",               // 10
        "Exceptions",             // 11
        "(JJ)V",                  // 12
    ];

    fn pool() -> ConstantPool {
        let length = u16::try_from(NAMES.len() + 2).unwrap();
        let mut pool = ConstantPool::with_length(length);
        for (i, name) in (1u16..).zip(NAMES) {
            pool.set(i, Entry::Utf8(Symbol::new(name)));
        }
        // 13
        pool.set(length - 1, Entry::UnresolvedClass(Symbol::new("java/io/IOException")));
        pool
    }

    fn parse_with(
        bytes: &Bytes,
        options: &LoadOptions,
        version: Version,
    ) -> Result<Vec<MethodInfo>, LoadError> {
        let ctx = ParseContext {
            version,
            ..context(options)
        };
        let mut stream = ClassFileStream::new(&bytes.0, "test", true);
        let methods = parse_methods(&mut stream, &ctx, &pool(), false)?;
        assert!(stream.at_eos());
        Ok(methods)
    }

    fn parse(bytes: &Bytes) -> Result<Vec<MethodInfo>, LoadError> {
        parse_with(bytes, &LoadOptions::default(), Version::new(52, 0))
    }

    /// `public void run()` whose body is `return` followed by the given code attributes.
    fn run_method(code_attributes: &[Bytes]) -> Bytes {
        let nested: Vec<u8> = code_attributes.iter().flat_map(|it| it.0.clone()).collect();
        let count = u16::try_from(code_attributes.len()).unwrap();
        let code_length = u32::try_from(12 + 1 + 2 + nested.len()).unwrap();
        Bytes::default()
            .u2(1)
            .u2(0x0001)
            .u2(1)
            .u2(2)
            .u2(1)
            .u2(3)
            .u4(code_length)
            .u2(1)
            .u2(1)
            .u4(1)
            .u1(0xB1)
            .u2(0)
            .u2(count)
            .raw(&nested)
    }

    fn local_variables(table_name: u16, descriptor_index: u16) -> Bytes {
        Bytes::default()
            .u2(table_name)
            .u4(12)
            .u2(1)
            .u2(0)
            .u2(1)
            .u2(7)
            .u2(descriptor_index)
            .u2(0)
    }

    #[test]
    fn simple_body() {
        let lines = Bytes::default().u2(4).u4(6).u2(1).u2(0).u2(42);
        let methods = parse(&run_method(&[lines])).unwrap();
        let code = methods[0].code.as_ref().unwrap();
        assert_eq!(code.bytecode, [0xB1]);
        assert_eq!(methods[0].size_of_parameters, 1);
        let lines: Vec<_> = code.line_numbers.as_ref().unwrap().iter().collect();
        assert_eq!(lines, [(0, 42)]);
    }

    #[test]
    fn generic_signatures_are_merged() {
        let methods = parse(&run_method(&[
            local_variables(5, 8),
            local_variables(6, 9),
        ]))
        .unwrap();
        let code = methods[0].code.as_ref().unwrap();
        assert_eq!(code.local_variables.len(), 1);
        assert_eq!(code.local_variables[0].descriptor_index, 8);
        assert_eq!(code.local_variables[0].signature_index, 9);
    }

    #[test]
    fn unmatched_type_entry() {
        let mut unmatched = local_variables(6, 9);
        // Different length.
        unmatched.0[11] = 0;
        let bytes = run_method(&[local_variables(5, 8), unmatched]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.message(), "LVTT entry for 'this' does not match any LVT entry");
        let relaxed = LoadOptions::default().with_relaxed_local_variable_type_table(true);
        assert!(parse_with(&bytes, &relaxed, Version::new(52, 0)).is_ok());
    }

    #[test]
    fn duplicated_local_variable() {
        let bytes = run_method(&[local_variables(5, 8), local_variables(5, 8)]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(
            err.message(),
            "Duplicated LocalVariableTable attribute entry for 'this'"
        );
    }

    #[test]
    fn wrong_code_length() {
        let mut bytes = run_method(&[]);
        // Low byte of the declared Code attribute length.
        bytes.0[15] += 1;
        bytes.0.push(0);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.message(), "Code segment has wrong length");
    }

    #[test]
    fn line_number_out_of_code() {
        let err = parse(&run_method(&[lines_past_end()])).unwrap_err();
        assert_eq!(err.message(), "Invalid pc 1 in LineNumberTable");

        let options = LoadOptions::default();
        let ctx = ParseContext {
            need_verify: false,
            ..context(&options)
        };
        let bytes = run_method(&[lines_past_end()]);
        let mut stream = ClassFileStream::new(&bytes.0, "test", false);
        let methods = parse_methods(&mut stream, &ctx, &pool(), false).unwrap();
        let code = methods[0].code.as_ref().unwrap();
        let lines: Vec<_> = code.line_numbers.as_ref().unwrap().iter().collect();
        assert_eq!(lines, [(1, 42)]);
    }

    fn lines_past_end() -> Bytes {
        Bytes::default().u2(4).u4(6).u2(1).u2(1).u2(42)
    }

    #[test]
    fn missing_code() {
        let bytes = Bytes::default().u2(1).u2(0x0001).u2(1).u2(2).u2(0);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(
            err.message(),
            "Absent Code attribute in method that is not native or abstract"
        );
        let abstract_method = Bytes::default().u2(1).u2(0x0401).u2(1).u2(2).u2(0);
        assert!(parse(&abstract_method).unwrap()[0].code.is_none());
    }

    #[test]
    fn class_initializer_flags_by_version() {
        // private <clinit>
        let bytes = Bytes::default().u2(1).u2(0x0002).u2(10).u2(2).u2(0);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.message(), "Method <clinit> is not static");

        let err = parse_with(&bytes, &LoadOptions::default(), Version::new(50, 0)).unwrap_err();
        // Before Java 7 the flags become `static`, so the body is required.
        assert!(err.message().starts_with("Absent Code attribute"));
    }

    #[test]
    fn checked_exceptions() {
        let bytes = Bytes::default()
            .u2(1)
            .u2(0x0401)
            .u2(1)
            .u2(2)
            .u2(1)
            .u2(11)
            .u4(4)
            .u2(1)
            .u2(13);
        let methods = parse(&bytes).unwrap();
        assert_eq!(methods[0].checked_exceptions, [13]);
    }

    #[test]
    fn arguments_must_fit_into_locals() {
        // public void run(long, long) with max_locals 1.
        let mut bytes = run_method(&[]);
        bytes.0[6..8].copy_from_slice(&12u16.to_be_bytes());
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.message(), "Arguments can't fit into locals");
    }

    #[test]
    fn duplicate_methods() {
        let method = Bytes::default().u2(0x0401).u2(1).u2(2).u2(0);
        let bytes = Bytes::default().u2(2).raw(&method.0).raw(&method.0);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(
            err.message(),
            "Duplicate method name \"run\" with signature \"()V\""
        );
    }
}
