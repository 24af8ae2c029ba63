//! Reading and resolving the constant pool.
//!
//! Entries are read in one pass, then cross references are checked and class and string
//! entries are converted to their resolved forms, and finally names and descriptors are
//! checked against the grammar of the JVM specification.

use super::{ClassFileStream, ParseContext, verifier::is_legal_utf8};
use crate::{
    errors::LoadError,
    jvm::{
        class::{JAVA_7_VERSION, JAVA_8_VERSION},
        constant_pool::{ConstantPool, CpPatch, Entry, ReferenceKind, tag},
        method::{CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME},
    },
    macros::{check_format, malform},
    symbols::{Symbol, SymbolTable},
};

/// New UTF-8 entries waiting to be interned together.
struct PendingSymbols<'a> {
    indices: Vec<u16>,
    names: Vec<&'a [u8]>,
    batch_size: usize,
}

impl<'a> PendingSymbols<'a> {
    fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            indices: Vec::with_capacity(batch_size),
            names: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    fn push(
        &mut self,
        index: u16,
        name: &'a [u8],
        pool: &mut ConstantPool,
        symbols: &SymbolTable,
    ) {
        self.indices.push(index);
        self.names.push(name);
        if self.indices.len() >= self.batch_size {
            self.flush(pool, symbols);
        }
    }

    fn flush(&mut self, pool: &mut ConstantPool, symbols: &SymbolTable) {
        if self.names.is_empty() {
            return;
        }
        let interned = symbols.batch_intern(&self.names);
        for (index, symbol) in self.indices.drain(..).zip(interned) {
            pool.set(index, Entry::Utf8(symbol));
        }
        self.names.clear();
    }
}

/// Reads the raw entries of a pool of `length` slots.
fn parse_constant_pool_entries<'a>(
    stream: &mut ClassFileStream<'a>,
    pool: &mut ConstantPool,
    ctx: &ParseContext<'_>,
    symbols: &SymbolTable,
) -> Result<(), LoadError> {
    let length = pool.length();
    let mut pending = PendingSymbols::new(ctx.options.symbol_batch_size);
    let mut patched_names = Vec::new();
    let mut index = 1;
    while index < length {
        let tag = stream.get_u1()?;
        match tag {
            tag::CLASS => {
                let name_index = stream.get_u2()?;
                pool.set(index, Entry::ClassIndex { name_index });
            }
            tag::FIELDREF | tag::METHODREF | tag::INTERFACE_METHODREF => {
                stream.guarantee_more(4)?;
                let class_index = stream.get_u2_fast();
                let name_and_type_index = stream.get_u2_fast();
                let entry = match tag {
                    tag::FIELDREF => Entry::FieldRef {
                        class_index,
                        name_and_type_index,
                    },
                    tag::METHODREF => Entry::MethodRef {
                        class_index,
                        name_and_type_index,
                    },
                    _ => Entry::InterfaceMethodRef {
                        class_index,
                        name_and_type_index,
                    },
                };
                pool.set(index, entry);
            }
            tag::METHOD_HANDLE | tag::METHOD_TYPE | tag::INVOKE_DYNAMIC => {
                check_format!(
                    ctx.major_version() >= JAVA_7_VERSION,
                    "Class file version does not support constant tag {tag}"
                );
                check_format!(
                    ctx.options.enable_invokedynamic,
                    "This loader does not support constant tag {tag}"
                );
                let entry = match tag {
                    tag::METHOD_HANDLE => {
                        stream.guarantee_more(3)?;
                        let kind = stream.get_u1_fast();
                        let reference_index = stream.get_u2_fast();
                        let Some(reference_kind) = ReferenceKind::from_u8(kind) else {
                            malform!("Bad method handle kind at constant pool index {index}");
                        };
                        Entry::MethodHandle {
                            reference_kind,
                            reference_index,
                        }
                    }
                    tag::METHOD_TYPE => Entry::MethodType {
                        signature_index: stream.get_u2()?,
                    },
                    _ => {
                        stream.guarantee_more(4)?;
                        Entry::InvokeDynamic {
                            bootstrap_method_attr_index: stream.get_u2_fast(),
                            name_and_type_index: stream.get_u2_fast(),
                        }
                    }
                };
                pool.set(index, entry);
            }
            tag::STRING => {
                let string_index = stream.get_u2()?;
                pool.set(index, Entry::StringIndex { string_index });
            }
            tag::INTEGER => {
                #[allow(clippy::cast_possible_wrap, reason = "The bits are a two's complement int.")]
                let value = stream.get_u4()? as i32;
                pool.set(index, Entry::Integer(value));
            }
            tag::FLOAT => {
                let bytes = stream.get_u4()?;
                pool.set(index, Entry::Float(f32::from_bits(bytes)));
            }
            tag::LONG | tag::DOUBLE => {
                // A long or double takes two slots; the second one stays invalid.
                check_format!(
                    index + 1 < length,
                    "Invalid constant pool entry {index}"
                );
                let bytes = stream.get_u8()?;
                #[allow(clippy::cast_possible_wrap, reason = "The bits are a two's complement long.")]
                let entry = if tag == tag::LONG {
                    Entry::Long(bytes as i64)
                } else {
                    Entry::Double(f64::from_bits(bytes))
                };
                pool.set(index, entry);
                index += 1;
            }
            tag::NAME_AND_TYPE => {
                stream.guarantee_more(4)?;
                let name_index = stream.get_u2_fast();
                let signature_index = stream.get_u2_fast();
                pool.set(
                    index,
                    Entry::NameAndType {
                        name_index,
                        signature_index,
                    },
                );
            }
            tag::UTF8 => {
                let utf8_length = stream.get_u2()?;
                let bytes = stream.get_bytes(usize::from(utf8_length))?;
                if let Some(patch) = ctx.patch_at(index) {
                    let CpPatch::Utf8(value) = patch else {
                        malform!("Illegal utf8 patch at {index}");
                    };
                    patched_names.push((index, value.as_str()));
                } else {
                    check_format!(
                        !stream.need_verify() || is_legal_utf8(bytes, ctx.major_version()),
                        "Illegal UTF8 string in constant pool"
                    );
                    match symbols.lookup_only(bytes) {
                        Some(symbol) => pool.set(index, Entry::Utf8(symbol)),
                        None => pending.push(index, bytes, pool, symbols),
                    }
                }
            }
            _ => malform!("Unknown constant tag {tag}"),
        }
        index += 1;
    }
    pending.flush(pool, symbols);
    for (index, value) in patched_names {
        pool.set(index, Entry::Utf8(symbols.intern(value)));
    }
    Ok(())
}

fn expect_tag(pool: &ConstantPool, index: u16, expected: u8, kind: &str) -> Result<(), LoadError> {
    check_format!(
        pool.tag_at(index) == expected,
        "Invalid constant pool index {index}: expected {kind}"
    );
    Ok(())
}

fn symbol_at(pool: &ConstantPool, index: u16) -> Result<Symbol, LoadError> {
    pool.utf8_at(index).cloned()
}

/// Checks that `reference_index` designates a member a method handle of `kind` may refer
/// to.
fn check_method_handle_target(
    pool: &ConstantPool,
    kind: ReferenceKind,
    reference_index: u16,
    major_version: u16,
) -> Result<(), LoadError> {
    let target = pool.tag_at(reference_index);
    let is_valid = match kind {
        ReferenceKind::GetField
        | ReferenceKind::GetStatic
        | ReferenceKind::PutField
        | ReferenceKind::PutStatic => target == tag::FIELDREF,
        ReferenceKind::InvokeVirtual | ReferenceKind::NewInvokeSpecial => {
            target == tag::METHODREF
        }
        ReferenceKind::InvokeStatic | ReferenceKind::InvokeSpecial => {
            target == tag::METHODREF
                || (target == tag::INTERFACE_METHODREF && major_version >= JAVA_8_VERSION)
        }
        ReferenceKind::InvokeInterface => target == tag::INTERFACE_METHODREF,
    };
    check_format!(
        is_valid,
        "Invalid constant pool index {reference_index}: bad target of method handle kind {}",
        kind as u8
    );
    Ok(())
}

/// Checks cross references and converts class and string entries.
fn resolve_references(pool: &mut ConstantPool, major_version: u16) -> Result<(), LoadError> {
    for index in 1..pool.length() {
        let Some(entry) = pool.get(index) else {
            break;
        };
        match *entry {
            Entry::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Entry::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Entry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                expect_tag(pool, class_index, tag::CLASS, "CONSTANT_Class")?;
                expect_tag(
                    pool,
                    name_and_type_index,
                    tag::NAME_AND_TYPE,
                    "CONSTANT_NameAndType",
                )?;
            }
            Entry::NameAndType {
                name_index,
                signature_index,
            } => {
                expect_tag(pool, name_index, tag::UTF8, "CONSTANT_Utf8")?;
                expect_tag(pool, signature_index, tag::UTF8, "CONSTANT_Utf8")?;
            }
            Entry::ClassIndex { name_index } => {
                let name = symbol_at(pool, name_index)?;
                pool.set(index, Entry::UnresolvedClass(name));
            }
            Entry::StringIndex { string_index } => {
                let value = symbol_at(pool, string_index)?;
                pool.set(index, Entry::UnresolvedString(value));
            }
            Entry::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                check_method_handle_target(pool, reference_kind, reference_index, major_version)?;
            }
            Entry::MethodType { signature_index } => {
                expect_tag(pool, signature_index, tag::UTF8, "CONSTANT_Utf8")?;
            }
            Entry::InvokeDynamic {
                name_and_type_index,
                ..
            } => {
                expect_tag(
                    pool,
                    name_and_type_index,
                    tag::NAME_AND_TYPE,
                    "CONSTANT_NameAndType",
                )?;
            }
            Entry::Invalid
            | Entry::Utf8(_)
            | Entry::Integer(_)
            | Entry::Float(_)
            | Entry::Long(_)
            | Entry::Double(_)
            | Entry::UnresolvedClass(_)
            | Entry::UnresolvedString(_) => {}
        }
    }
    Ok(())
}

/// Substitutes a patched value for the entry at `index`.
fn apply_patch(
    pool: &mut ConstantPool,
    symbols: &SymbolTable,
    index: u16,
    patch: &CpPatch,
) -> Result<(), LoadError> {
    let entry = match (pool.get(index), patch) {
        // Applied while reading the entries.
        (Some(Entry::Utf8(_)), CpPatch::Utf8(_)) => return Ok(()),
        (Some(Entry::UnresolvedClass(_)), CpPatch::Class(name)) => {
            Entry::UnresolvedClass(symbols.intern(name))
        }
        (Some(Entry::UnresolvedString(_)), CpPatch::String(value)) => {
            Entry::UnresolvedString(symbols.intern(value))
        }
        (Some(Entry::Integer(_)), &CpPatch::Integer(value)) => Entry::Integer(value),
        (Some(Entry::Float(_)), &CpPatch::Float(value)) => Entry::Float(value),
        (Some(Entry::Long(_)), &CpPatch::Long(value)) => Entry::Long(value),
        (Some(Entry::Double(_)), &CpPatch::Double(value)) => Entry::Double(value),
        (Some(
            Entry::Integer(_)
            | Entry::Float(_)
            | Entry::Long(_)
            | Entry::Double(_)
            | Entry::UnresolvedClass(_)
            | Entry::UnresolvedString(_),
        ), _) => malform!("Illegal type patch at {index}"),
        _ => malform!("Illegal unexpected patch at {index}"),
    };
    pool.set(index, entry);
    Ok(())
}

fn apply_patches(
    stream: &ClassFileStream<'_>,
    pool: &mut ConstantPool,
    symbols: &SymbolTable,
    patches: &[Option<CpPatch>],
) -> Result<(), LoadError> {
    check_format!(
        patches.len() <= usize::from(pool.length()),
        "Too many constant pool patches: {} for a pool of {} entries",
        patches.len(),
        pool.length()
    );
    // Peek at `this_class`, which follows the access flags.
    let mut peek = stream.clone();
    peek.guarantee_more(4)?;
    let _access_flags = peek.get_u2_fast();
    let this_class_index = peek.get_u2_fast();
    for (index, patch) in (0u16..).zip(patches) {
        let Some(patch) = patch else {
            continue;
        };
        check_format!(
            index != this_class_index,
            "Illegal constant pool patch to self at {index}"
        );
        apply_patch(pool, symbols, index, patch)?;
    }
    Ok(())
}

fn referenced_name_and_type(
    pool: &ConstantPool,
    name_and_type_index: u16,
) -> Result<(u16, Symbol, Symbol), LoadError> {
    let (name_index, signature_index) = pool.name_and_type_at(name_and_type_index)?;
    Ok((
        name_index,
        symbol_at(pool, name_index)?,
        symbol_at(pool, signature_index)?,
    ))
}

/// Checks the grammar of every name and descriptor in the pool.
fn verify_names(pool: &ConstantPool, ctx: &ParseContext<'_>) -> Result<(), LoadError> {
    let checker = ctx.checker();
    let major_version = ctx.major_version();
    for (_, entry) in pool.iter() {
        match *entry {
            Entry::UnresolvedClass(ref name) => checker.verify_legal_class_name(name)?,
            Entry::NameAndType {
                name_index,
                signature_index,
            } if major_version >= JAVA_7_VERSION => {
                let name = pool.utf8_at(name_index)?;
                let signature = pool.utf8_at(signature_index)?;
                if signature.starts_with('(') {
                    checker.verify_legal_method_signature(name, signature)?;
                } else {
                    checker.verify_legal_field_signature(name, signature)?;
                }
            }
            Entry::FieldRef {
                name_and_type_index,
                ..
            } => {
                let (_, name, signature) = referenced_name_and_type(pool, name_and_type_index)?;
                checker.verify_legal_field_name(&name)?;
                if major_version >= JAVA_7_VERSION {
                    // The descriptor itself was checked with its NameAndType.
                    if signature.starts_with('(') {
                        return Err(checker.illegal_signature("Field", &name, &signature));
                    }
                } else {
                    checker.verify_legal_field_signature(&name, &signature)?;
                }
            }
            Entry::MethodRef {
                name_and_type_index,
                ..
            }
            | Entry::InterfaceMethodRef {
                name_and_type_index,
                ..
            }
            | Entry::InvokeDynamic {
                name_and_type_index,
                ..
            } => {
                let (name_index, name, signature) =
                    referenced_name_and_type(pool, name_and_type_index)?;
                checker.verify_legal_method_name(&name)?;
                if major_version >= JAVA_7_VERSION {
                    if !signature.starts_with('(') {
                        return Err(checker.illegal_signature("Method", &name, &signature));
                    }
                } else {
                    checker.verify_legal_method_signature(&name, &signature)?;
                }
                if matches!(entry, Entry::MethodRef { .. }) {
                    check_format!(
                        !name.starts_with('<') || &*name == CONSTRUCTOR_NAME,
                        "Bad method name at constant pool index {name_index}"
                    );
                }
            }
            Entry::MethodHandle {
                reference_kind,
                reference_index,
            } if !reference_kind.is_field_access() => {
                let name_and_type_index = match pool.get(reference_index) {
                    Some(
                        &(Entry::MethodRef {
                            name_and_type_index,
                            ..
                        }
                        | Entry::InterfaceMethodRef {
                            name_and_type_index,
                            ..
                        }),
                    ) => name_and_type_index,
                    _ => malform!("Invalid constant pool index {reference_index}"),
                };
                let (name_index, name, _) = referenced_name_and_type(pool, name_and_type_index)?;
                if reference_kind == ReferenceKind::NewInvokeSpecial {
                    check_format!(
                        &*name == CONSTRUCTOR_NAME,
                        "Bad constructor name at constant pool index {name_index}"
                    );
                } else {
                    check_format!(
                        &*name != CONSTRUCTOR_NAME && &*name != CLASS_INITIALIZER_NAME,
                        "Bad method name at constant pool index {name_index}"
                    );
                }
            }
            Entry::MethodType { signature_index } => {
                let signature = pool.utf8_at(signature_index)?;
                checker.verify_legal_method_signature("type", signature)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Parses the constant pool, including its `u2` count.
pub(crate) fn parse_constant_pool(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    symbols: &SymbolTable,
) -> Result<ConstantPool, LoadError> {
    let length = stream.get_u2()?;
    check_format!(length >= 1, "Illegal constant pool size {length}");
    let mut pool = ConstantPool::with_length(length);
    parse_constant_pool_entries(stream, &mut pool, ctx, symbols)?;
    resolve_references(&mut pool, ctx.major_version())?;
    if let Some(patches) = ctx.patches {
        apply_patches(stream, &mut pool, symbols, patches)?;
    }
    if stream.need_verify() {
        verify_names(&pool, ctx)?;
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        LoadErrorKind, LoadOptions,
        jvm::parsing::test_support::{Bytes, context},
    };

    fn parse(bytes: &Bytes, options: &LoadOptions) -> Result<ConstantPool, LoadError> {
        let symbols = SymbolTable::new();
        let ctx = context(options);
        let mut stream = ClassFileStream::new(&bytes.0, "test", true);
        parse_constant_pool(&mut stream, &ctx, &symbols)
    }

    fn field_ref_pool() -> Bytes {
        Bytes::default().u2(7).raw(&field_ref_entries().0)
    }

    fn field_ref_entries() -> Bytes {
        Bytes::default()
            .utf8("Foo") // 1
            .u1(tag::CLASS)
            .u2(1) // 2
            .utf8("count") // 3
            .utf8("I") // 4
            .u1(tag::NAME_AND_TYPE)
            .u2(3)
            .u2(4) // 5
            .u1(tag::FIELDREF)
            .u2(2)
            .u2(5) // 6
    }

    #[test]
    fn resolves_classes_and_references() {
        let pool = parse(&field_ref_pool(), &LoadOptions::default()).unwrap();
        assert_eq!(pool.length(), 7);
        assert_eq!(pool.klass_name_at(2).unwrap().as_str(), "Foo");
        assert_eq!(pool.name_and_type_at(5).unwrap(), (3, 4));
        assert_eq!(pool.tag_at(6), tag::FIELDREF);
        assert_eq!(pool.get(0), Some(&Entry::Invalid));
    }

    #[test]
    fn long_takes_two_slots() {
        let bytes = Bytes::default()
            .u2(5)
            .u1(tag::LONG)
            .u4(0)
            .u4(42) // 1, 2
            .u1(tag::DOUBLE)
            .u4(0x3FF0_0000)
            .u4(0); // 3, 4
        let pool = parse(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(pool.get(1), Some(&Entry::Long(42)));
        assert_eq!(pool.get(2), Some(&Entry::Invalid));
        assert_eq!(pool.get(3), Some(&Entry::Double(1.0)));
        assert_eq!(pool.tag_at(4), 0);
        let err = pool.utf8_at(2).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
    }

    #[test]
    fn long_in_last_slot_is_rejected() {
        let bytes = Bytes::default().u2(2).u1(tag::LONG).u4(0).u4(1);
        let err = parse(&bytes, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.message(), "Invalid constant pool entry 1");
    }

    #[test]
    fn empty_pool_count_is_rejected() {
        let err = parse(&Bytes::default().u2(0), &LoadOptions::default()).unwrap_err();
        assert_eq!(err.message(), "Illegal constant pool size 0");
    }

    #[test]
    fn unknown_tag() {
        let bytes = Bytes::default().u2(2).u1(17).u2(0);
        let err = parse(&bytes, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.message(), "Unknown constant tag 17");
    }

    #[test]
    fn reference_to_wrong_tag() {
        let bytes = Bytes::default()
            .u2(3)
            .utf8("Foo")
            .u1(tag::FIELDREF)
            .u2(1)
            .u2(1);
        let err = parse(&bytes, &LoadOptions::default()).unwrap_err();
        assert_eq!(
            err.message(),
            "Invalid constant pool index 1: expected CONSTANT_Class"
        );
    }

    #[test]
    fn invokedynamic_constants_are_gated() {
        let bytes = Bytes::default().u2(3).utf8("()V").u1(tag::METHOD_TYPE).u2(1);
        assert!(parse(&bytes, &LoadOptions::default()).is_ok());
        let disabled = LoadOptions::default().with_invokedynamic(false);
        assert!(parse(&bytes, &disabled).is_err());

        let symbols = SymbolTable::new();
        let options = LoadOptions::default();
        let ctx = ParseContext {
            version: crate::jvm::class::Version::new(50, 0),
            ..context(&options)
        };
        let mut stream = ClassFileStream::new(&bytes.0, "test", true);
        let err = parse_constant_pool(&mut stream, &ctx, &symbols).unwrap_err();
        assert_eq!(
            err.message(),
            "Class file version does not support constant tag 16"
        );
    }

    #[test]
    fn method_handle_targets() {
        let pool_with = |kind: u8, name: &str| {
            Bytes::default()
                .u2(12)
                .raw(&field_ref_entries().0)
                .utf8(name) // 7
                .utf8("()V") // 8
                .u1(tag::NAME_AND_TYPE)
                .u2(7)
                .u2(8) // 9
                .u1(tag::METHODREF)
                .u2(2)
                .u2(9) // 10
                .u1(tag::METHOD_HANDLE)
                .u1(kind)
                .u2(10) // 11
        };
        let options = LoadOptions::default();
        assert!(parse(&pool_with(5, "run"), &options).is_ok());
        assert!(parse(&pool_with(8, "<init>"), &options).is_ok());
        let err = parse(&pool_with(8, "run"), &options).unwrap_err();
        assert_eq!(err.message(), "Bad constructor name at constant pool index 7");
        let err = parse(&pool_with(5, "<init>"), &options).unwrap_err();
        assert_eq!(err.message(), "Bad method name at constant pool index 7");
        // Kind 1 (getField) needs a Fieldref.
        let err = parse(&pool_with(1, "run"), &options).unwrap_err();
        assert!(err.message().starts_with("Invalid constant pool index 10"));
    }

    #[test]
    fn illegal_names_are_rejected_when_verifying() {
        let bytes = Bytes::default().u2(3).utf8("a;b").u1(tag::CLASS).u2(1);
        let err = parse(&bytes, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.message(), "Illegal class name \"a;b\"");

        let symbols = SymbolTable::new();
        let options = LoadOptions::default();
        let ctx = ParseContext {
            need_verify: false,
            ..context(&options)
        };
        let mut stream = ClassFileStream::new(&bytes.0, "test", false);
        assert!(parse_constant_pool(&mut stream, &ctx, &symbols).is_ok());
    }

    #[test]
    fn utf8_entries_are_interned_in_batches() {
        let mut bytes = Bytes::default().u2(21);
        for i in 0..20 {
            bytes = bytes.utf8(&format!("name{i}"));
        }
        let symbols = SymbolTable::new();
        let options = LoadOptions::default();
        let ctx = context(&options);
        let mut stream = ClassFileStream::new(&bytes.0, "test", true);
        let first = parse_constant_pool(&mut stream, &ctx, &symbols).unwrap();
        assert_eq!(symbols.len(), 20);
        let mut stream = ClassFileStream::new(&bytes.0, "test", true);
        let second = parse_constant_pool(&mut stream, &ctx, &symbols).unwrap();
        assert_eq!(symbols.len(), 20);
        assert!(first.utf8_at(7).unwrap().ptr_eq(second.utf8_at(7).unwrap()));
    }

    fn parse_patched(patches: &[Option<CpPatch>], this_class: u16) -> Result<ConstantPool, LoadError> {
        parse_patched_with(&SymbolTable::new(), patches, this_class)
    }

    fn parse_patched_with(
        symbols: &SymbolTable,
        patches: &[Option<CpPatch>],
        this_class: u16,
    ) -> Result<ConstantPool, LoadError> {
        let bytes = Bytes::default()
            .u2(6)
            .utf8("Anon") // 1
            .u1(tag::CLASS)
            .u2(1) // 2
            .utf8("Target") // 3
            .u1(tag::CLASS)
            .u2(3) // 4
            .u1(tag::INTEGER)
            .u4(7) // 5
            // access flags and this_class
            .u2(0x21)
            .u2(this_class);
        let options = LoadOptions::default();
        let ctx = ParseContext {
            patches: Some(patches),
            ..context(&options)
        };
        let mut stream = ClassFileStream::new(&bytes.0, "test", true);
        parse_constant_pool(&mut stream, &ctx, symbols)
    }

    #[test]
    fn patches_replace_entries() {
        let patches = [
            None,
            None,
            None,
            None,
            Some(CpPatch::Class("java/lang/Runnable".to_owned())),
            Some(CpPatch::Integer(-1)),
        ];
        let pool = parse_patched(&patches, 2).unwrap();
        assert_eq!(pool.klass_name_at(4).unwrap().as_str(), "java/lang/Runnable");
        assert_eq!(pool.get(5), Some(&Entry::Integer(-1)));
    }

    #[test]
    fn patched_names_are_interned() {
        let symbols = SymbolTable::new();
        let runnable = symbols.intern("java/lang/Runnable");
        let patches = [
            None,
            None,
            None,
            None,
            Some(CpPatch::Class("java/lang/Runnable".to_owned())),
        ];
        let pool = parse_patched_with(&symbols, &patches, 2).unwrap();
        assert!(pool.klass_name_at(4).unwrap().ptr_eq(&runnable));
    }

    #[test]
    fn utf8_patch_is_applied_before_resolution() {
        let patches = [None, None, None, Some(CpPatch::Utf8("Other".to_owned()))];
        let pool = parse_patched(&patches, 2).unwrap();
        assert_eq!(pool.klass_name_at(4).unwrap().as_str(), "Other");
    }

    #[test]
    fn illegal_patches() {
        let self_patch = [None, None, Some(CpPatch::Class("X".to_owned()))];
        let err = parse_patched(&self_patch, 2).unwrap_err();
        assert_eq!(err.message(), "Illegal constant pool patch to self at 2");

        let wrong_type = [None, None, None, None, None, Some(CpPatch::Long(1))];
        let err = parse_patched(&wrong_type, 2).unwrap_err();
        assert_eq!(err.message(), "Illegal type patch at 5");

        let too_many = vec![None; 7];
        assert!(parse_patched(&too_many, 2).is_err());
    }
}
