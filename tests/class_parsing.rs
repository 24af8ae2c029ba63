mod common;

use cafeload::{
    LoadErrorKind, LoadOptions,
    jvm::{
        class::ClassAccessFlags,
        constant_pool::{CpPatch, Entry},
        field::FieldAllocationType,
        parsing::LoadRequest,
        resolver::LoaderContext,
    },
    types::field_type::{FieldType, PrimitiveType},
};
use common::*;

fn point_class() -> ClassBuilder {
    let mut class = ClassBuilder::new("org/example/Point");
    class
        .field(ACC_PRIVATE, "x", "I")
        .field(ACC_PRIVATE, "y", "I")
        .field(ACC_PRIVATE, "label", "Ljava/lang/String;")
        .default_constructor("java/lang/Object")
        .method(ACC_PUBLIC, "getX", "()I", &[0x03, 0xAC]);
    class
}

#[test]
fn parse_simple_class() {
    let loader = TestLoader::new();
    let class = loader.parse(&point_class().build()).unwrap();
    assert_eq!(class.name.as_str(), "org/example/Point");
    assert_eq!(class.version.major, 52);
    assert!(class.access_flags.contains(ClassAccessFlags::PUBLIC));
    assert_eq!(
        class.super_class.as_ref().map(|it| it.name.as_str()),
        Some("java/lang/Object")
    );
    assert_eq!(class.java_fields_count, 3);
    let label = class.find_field("label", "Ljava/lang/String;").unwrap();
    assert_eq!(
        label.field_type,
        FieldType::Object("java/lang/String".to_owned())
    );
    assert_eq!(label.allocation_type, FieldAllocationType::NonstaticOop);
    let x = class.find_field("x", "I").unwrap();
    assert_eq!(x.field_type, FieldType::Base(PrimitiveType::Int));
    let get_x = class.find_method("getX", "()I").unwrap();
    assert_eq!(get_x.size_of_parameters, 1);
    assert!(class.has_vanilla_constructor);
    assert!(!class.has_finalizer);
}

#[test]
fn methods_are_sorted_and_ordering_is_kept() {
    let mut builder = ClassBuilder::new("Sorted");
    builder
        .method(ACC_PUBLIC | ACC_ABSTRACT, "zeta", "()V", &[])
        .method(ACC_PUBLIC | ACC_ABSTRACT, "alpha", "(I)V", &[])
        .method(ACC_PUBLIC | ACC_ABSTRACT, "alpha", "()V", &[])
        .access_flags(ACC_PUBLIC | ACC_SUPER | ACC_ABSTRACT);
    let class = TestLoader::new().parse(&builder.build()).unwrap();
    let order: Vec<_> = class
        .methods
        .iter()
        .map(|m| format!("{}{}", m.name, m.signature))
        .collect();
    assert_eq!(order, ["alpha()V", "alpha(I)V", "zeta()V"]);
    assert_eq!(class.method_ordering, [2, 1, 0]);
}

#[test]
fn parsing_is_idempotent() {
    let bytes = point_class().build();
    let loader = TestLoader::new();
    let first = loader.parse(&bytes).unwrap();
    let second = TestLoader::new().parse(&bytes).unwrap();
    let offsets = |class: &cafeload::jvm::ClassDescriptor| {
        class.fields.iter().map(|f| f.offset).collect::<Vec<_>>()
    };
    assert_eq!(offsets(&first), offsets(&second));
    assert_eq!(first.layout.oop_maps, second.layout.oop_maps);
    assert_eq!(first.method_ordering, second.method_ordering);
    assert_eq!(first.layout, second.layout);
}

#[test]
fn errors_name_the_source() {
    let mut builder = point_class();
    builder.field(ACC_PRIVATE, "x", "I");
    let bytes = builder.build();
    let loader = TestLoader::new();
    let err = loader
        .parse_request(&LoadRequest::new(&bytes, "/tmp/Point.class"))
        .unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
    assert_eq!(
        err.message(),
        "Duplicate field name \"x\" with signature \"I\" in class file /tmp/Point.class"
    );
}

#[test]
fn duplicate_fields_are_accepted_without_verification() {
    let mut builder = point_class();
    builder.field(ACC_PRIVATE, "x", "I");
    let bytes = builder.build();
    let loader = TestLoader::new();
    let class = loader
        .parse_request(&LoadRequest::new(&bytes, "Point.class").with_verify(false))
        .unwrap();
    assert_eq!(class.java_fields_count, 4);
}

#[test]
fn duplicate_interfaces() {
    let loader = TestLoader::new();
    loader
        .define(&ClassBuilder::interface("Marker").build())
        .unwrap();
    let mut builder = ClassBuilder::new("Twice");
    builder.implements("Marker").implements("Marker");
    let err = loader.parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
    assert!(err.message().starts_with("Duplicate interface name"));
}

#[test]
fn duplicate_inner_class_entries() {
    let mut builder = ClassBuilder::new("Outer");
    let outer = builder.class("Outer");
    let inner = builder.class("Outer$Inner");
    let name = builder.utf8("Inner");
    let mut data = vec![0, 2];
    for _ in 0..2 {
        for value in [inner, outer, name, ACC_PUBLIC | ACC_STATIC] {
            data.extend_from_slice(&value.to_be_bytes());
        }
    }
    builder.class_attribute("InnerClasses", &data);
    let err = TestLoader::new().parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
    assert!(err.message().starts_with("Duplicate entry in InnerClasses"));
}

#[test]
fn long_takes_two_slots() {
    let mut builder = ClassBuilder::new("Constants");
    let long = builder.long(0x0123_4567_89AB_CDEF);
    let after = builder.integer(7);
    let class = TestLoader::new().parse(&builder.build()).unwrap();
    assert_eq!(after, long + 2);
    assert_eq!(
        class.constant_pool.get(long),
        Some(&Entry::Long(0x0123_4567_89AB_CDEF))
    );
    assert_eq!(class.constant_pool.get(long + 1), Some(&Entry::Invalid));
    assert!(class.constant_pool.utf8_at(long + 1).is_err());
    assert_eq!(class.constant_pool.get(after), Some(&Entry::Integer(7)));
}

#[test]
fn reference_into_second_slot_of_long() {
    let mut builder = ClassBuilder::new("Constants");
    let long = builder.long(1);
    let second_slot = long + 1;
    builder.raw_entry(8, &second_slot.to_be_bytes());
    let err = TestLoader::new().parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
}

#[test]
fn version_gating() {
    let loader = TestLoader::new();
    for (major, minor) in [(44, 0), (53, 0), (52, 1)] {
        let mut builder = point_class();
        builder.version(major, minor);
        let err = loader.parse(&builder.build()).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::UnsupportedClassVersion, "{major}.{minor}");
        assert!(err.message().contains(&format!("{major}.{minor}")));
        assert!(err.message().contains("52.0"));
    }
    let mut old = point_class();
    old.version(45, 3);
    assert!(loader.parse(&old.build()).is_ok());

    let limited = TestLoader::with_options(LoadOptions::default().with_max_version(50, 0));
    let mut builder = point_class();
    builder.version(50, 0);
    assert!(limited.parse(&builder.build()).is_ok());
    builder.version(51, 0);
    let err = limited.parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::UnsupportedClassVersion);
    assert!(err.message().contains("50.0"));
}

#[test]
fn overlong_utf8_is_legal_only_in_newer_versions() {
    let loader = TestLoader::new();
    let mut builder = point_class();
    // An overlong two byte encoding of 'A'.
    builder.raw_entry(1, &[0, 2, 0xC1, 0x81]);
    assert!(loader.parse(&builder.build()).is_ok());

    builder.version(47, 0);
    let err = loader.parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
    assert!(err.message().starts_with("Illegal UTF8 string in constant pool"));
}

#[test]
fn class_names_in_field_descriptors() {
    let loader = TestLoader::new();
    let mut legal = ClassBuilder::new("A");
    legal.field(0, "x", "La/b;");
    assert!(loader.parse(&legal.build()).is_ok());

    for descriptor in ["L;", "La//b;", "L/a;", "La/;", "L[I;"] {
        let mut builder = ClassBuilder::new("A");
        builder.field(0, "x", descriptor);
        let err = loader.parse(&builder.build()).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::ClassFormat, "{descriptor}");
        assert!(err.message().contains("has illegal signature"), "{descriptor}");
    }
}

#[test]
fn wrong_name_hint() {
    let bytes = point_class().build();
    let loader = TestLoader::new();
    let err = loader
        .parse_request(&LoadRequest::new(&bytes, "Point.class").with_name_hint("org/example/Other"))
        .unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::NoClassDefFound);
    assert!(
        err.message()
            .starts_with("org.example.Other (wrong name: org.example.Point)")
    );
    let hinted = LoadRequest::new(&bytes, "Point.class").with_name_hint("org/example/Point");
    assert!(loader.parse_request(&hinted).is_ok());
}

#[test]
fn module_info_is_not_a_class() {
    let mut builder = ClassBuilder::new("module-info");
    builder.access_flags(0x8000);
    let err = TestLoader::new().parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::NoClassDefFound);
    assert!(err.message().contains("ACC_MODULE"));
}

#[test]
fn extra_bytes_after_attributes() {
    let mut bytes = point_class().build();
    bytes.push(0);
    let err = TestLoader::new().parse(&bytes).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
    assert!(err.message().starts_with("Extra bytes at the end of class file"));
}

#[test]
fn truncation_is_reported() {
    let bytes = point_class().build();
    let loader = TestLoader::new();
    for length in [3, 9, 40, bytes.len() - 1] {
        let err = loader.parse(&bytes[..length]).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::TruncatedInput, "length {length}");
    }
}

#[test]
fn illegal_class_modifiers() {
    let mut builder = point_class();
    builder.access_flags(ACC_PUBLIC | ACC_FINAL | ACC_ABSTRACT);
    let err = TestLoader::new().parse(&builder.build()).unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
    assert!(err.message().starts_with("Illegal class modifiers"));
}

#[test]
fn old_interfaces_become_abstract() {
    let mut builder = ClassBuilder::interface("OldMarker");
    builder.version(49, 0).access_flags(ACC_PUBLIC | ACC_INTERFACE);
    let class = TestLoader::new().parse(&builder.build()).unwrap();
    assert!(class.is_abstract());
}

#[test]
fn class_attributes_are_kept() {
    let mut builder = point_class();
    let source = builder.utf8("Point.java");
    builder
        .class_attribute("SourceFile", &source.to_be_bytes())
        .class_attribute("Deprecated", &[])
        .class_attribute("Custom", &[1, 2, 3]);
    let class = TestLoader::new().parse(&builder.build()).unwrap();
    assert_eq!(class.source_file.as_deref(), Some("Point.java"));
    assert!(class.is_deprecated);
}

#[test]
fn symbols_are_shared_between_classes() {
    let loader = TestLoader::new();
    let first = loader.parse(&point_class().build()).unwrap();
    let second = loader.parse(&point_class().build()).unwrap();
    assert!(first.name.ptr_eq(&second.name));
    assert!(
        first.fields[0]
            .signature
            .ptr_eq(&second.fields[0].signature)
    );
}

#[test]
fn application_loader_ignores_privileged_annotations() {
    let mut builder = ClassBuilder::new("Padded");
    let contended = builder.contended(None);
    builder.field_with(ACC_PRIVATE, "x", "I", &[contended]);
    let bytes = builder.build();
    let loader = TestLoader::new();
    let boot = loader.parse(&bytes).unwrap();
    assert_eq!(boot.fields[0].contended_group, Some(0));
    let app = loader
        .parse_request(
            &LoadRequest::new(&bytes, "Padded.class").with_loader(LoaderContext::application("app")),
        )
        .unwrap();
    assert_eq!(app.fields[0].contended_group, None);
}

#[test]
fn patches_apply_for_host_classes() {
    let loader = TestLoader::new();
    let host = loader.parse(&point_class().build()).unwrap();
    let mut builder = ClassBuilder::new("Anonymous");
    let constant = builder.integer(1);
    let bytes = builder.build();
    let mut patches = vec![None; usize::from(constant) + 1];
    patches[usize::from(constant)] = Some(CpPatch::Integer(99));
    let request = LoadRequest::new(&bytes, "Anonymous")
        .with_host_class(host)
        .with_patches(&patches);
    let class = loader.parse_request(&request).unwrap();
    assert_eq!(class.constant_pool.get(constant), Some(&Entry::Integer(99)));
    assert!(class.host_class.is_some());
}
