//! Builds class files byte by byte so the tests need no Java compiler.
#![allow(dead_code)]

use std::collections::HashMap;

use cafeload::{
    LoadError, LoadOptions, SymbolTable,
    jvm::{
        ClassHandle,
        parsing::{ClassFileParser, LoadRequest},
        resolver::ClassRegistry,
    },
};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

pub const ALOAD_0: u8 = 0x2A;
pub const INVOKESPECIAL: u8 = 0xB7;
pub const RETURN: u8 = 0xB1;
pub const NOP: u8 = 0x00;

fn u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn count(len: usize) -> u16 {
    u16::try_from(len).unwrap()
}

/// A class file under construction.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    major: u16,
    minor: u16,
    pool: Vec<u8>,
    pool_count: u16,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<Vec<u8>>,
}

impl ClassBuilder {
    /// A public Java 8 class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            major: 52,
            minor: 0,
            pool: Vec::new(),
            pool_count: 1,
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        builder.this_class = builder.class(name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    /// A public interface.
    pub fn interface(name: &str) -> Self {
        let mut builder = Self::new(name);
        builder.access_flags(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        builder
    }

    pub fn version(&mut self, major: u16, minor: u16) -> &mut Self {
        self.major = major;
        self.minor = minor;
        self
    }

    pub fn access_flags(&mut self, flags: u16) -> &mut Self {
        self.access_flags = flags;
        self
    }

    pub fn super_class(&mut self, name: Option<&str>) -> &mut Self {
        let index = name.map_or(0, |name| self.class(name));
        self.super_class = index;
        self
    }

    pub fn implements(&mut self, name: &str) -> &mut Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    fn entry(&mut self, tag: u8, body: &[u8], slots: u16) -> u16 {
        let index = self.pool_count;
        self.pool.push(tag);
        self.pool.extend_from_slice(body);
        self.pool_count += slots;
        index
    }

    /// Appends a raw constant pool entry with the given tag and body.
    pub fn raw_entry(&mut self, tag: u8, body: &[u8]) -> u16 {
        self.entry(tag, body, 1)
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.utf8s.get(value) {
            return index;
        }
        let mut body = Vec::new();
        u2(&mut body, count(value.len()));
        body.extend_from_slice(value.as_bytes());
        let index = self.entry(1, &body, 1);
        self.utf8s.insert(value.to_owned(), index);
        index
    }

    pub fn class(&mut self, name: &str) -> u16 {
        if let Some(&index) = self.classes.get(name) {
            return index;
        }
        let name_index = self.utf8(name);
        let index = self.entry(7, &name_index.to_be_bytes(), 1);
        self.classes.insert(name.to_owned(), index);
        index
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.entry(3, &value.to_be_bytes(), 1)
    }

    /// Adds a `CONSTANT_Long`, which takes two slots.
    pub fn long(&mut self, value: i64) -> u16 {
        self.entry(5, &value.to_be_bytes(), 2)
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let value_index = self.utf8(value);
        self.entry(8, &value_index.to_be_bytes(), 1)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut name_and_type = Vec::new();
        u2(&mut name_and_type, name_index);
        u2(&mut name_and_type, descriptor_index);
        let name_and_type_index = self.entry(12, &name_and_type, 1);
        let mut body = Vec::new();
        u2(&mut body, class_index);
        u2(&mut body, name_and_type_index);
        self.entry(10, &body, 1)
    }

    /// Encodes an attribute named `name`.
    pub fn attribute(&mut self, name: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        u2(&mut out, self.utf8(name));
        u4(&mut out, u32::try_from(data.len()).unwrap());
        out.extend_from_slice(data);
        out
    }

    /// A `RuntimeVisibleAnnotations` attribute holding `@Contended`, with a group name
    /// if given.
    pub fn contended(&mut self, group: Option<&str>) -> Vec<u8> {
        let mut data = Vec::new();
        u2(&mut data, 1);
        u2(&mut data, self.utf8("Lsun/misc/Contended;"));
        match group {
            None => u2(&mut data, 0),
            Some(group) => {
                u2(&mut data, 1);
                u2(&mut data, self.utf8("value"));
                data.push(b's');
                u2(&mut data, self.utf8(group));
            }
        }
        self.attribute("RuntimeVisibleAnnotations", &data)
    }

    pub fn field_with(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        attributes: &[Vec<u8>],
    ) -> &mut Self {
        let mut out = Vec::new();
        u2(&mut out, flags);
        u2(&mut out, self.utf8(name));
        u2(&mut out, self.utf8(descriptor));
        u2(&mut out, count(attributes.len()));
        for attribute in attributes {
            out.extend_from_slice(attribute);
        }
        self.fields.push(out);
        self
    }

    pub fn field(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        self.field_with(flags, name, descriptor, &[])
    }

    /// A `Code` attribute with room for 16 locals.
    pub fn code(&mut self, bytecode: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        u2(&mut data, 4);
        u2(&mut data, 16);
        u4(&mut data, u32::try_from(bytecode.len()).unwrap());
        data.extend_from_slice(bytecode);
        u2(&mut data, 0);
        u2(&mut data, 0);
        self.attribute("Code", &data)
    }

    pub fn method_with(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        attributes: &[Vec<u8>],
    ) -> &mut Self {
        let mut out = Vec::new();
        u2(&mut out, flags);
        u2(&mut out, self.utf8(name));
        u2(&mut out, self.utf8(descriptor));
        u2(&mut out, count(attributes.len()));
        for attribute in attributes {
            out.extend_from_slice(attribute);
        }
        self.methods.push(out);
        self
    }

    /// Adds a method; abstract and native methods get no body.
    pub fn method(&mut self, flags: u16, name: &str, descriptor: &str, body: &[u8]) -> &mut Self {
        if flags & (ACC_ABSTRACT | ACC_NATIVE) != 0 {
            self.method_with(flags, name, descriptor, &[])
        } else {
            let code = self.code(body);
            self.method_with(flags, name, descriptor, &[code])
        }
    }

    /// Adds `public <init>()V` calling the constructor of `super_name`.
    pub fn default_constructor(&mut self, super_name: &str) -> &mut Self {
        let [high, low] = self
            .method_ref(super_name, "<init>", "()V")
            .to_be_bytes();
        self.method(
            ACC_PUBLIC,
            "<init>",
            "()V",
            &[ALOAD_0, INVOKESPECIAL, high, low, RETURN],
        )
    }

    /// Adds an attribute already encoded with [`ClassBuilder::attribute`].
    pub fn encoded_class_attribute(&mut self, attribute: Vec<u8>) -> &mut Self {
        self.attributes.push(attribute);
        self
    }

    pub fn class_attribute(&mut self, name: &str, data: &[u8]) -> &mut Self {
        let attribute = self.attribute(name, data);
        self.attributes.push(attribute);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        u4(&mut out, 0xCAFE_BABE);
        u2(&mut out, self.minor);
        u2(&mut out, self.major);
        u2(&mut out, self.pool_count);
        out.extend_from_slice(&self.pool);
        u2(&mut out, self.access_flags);
        u2(&mut out, self.this_class);
        u2(&mut out, self.super_class);
        u2(&mut out, count(self.interfaces.len()));
        for &interface in &self.interfaces {
            u2(&mut out, interface);
        }
        for table in [&self.fields, &self.methods, &self.attributes] {
            u2(&mut out, count(table.len()));
            for item in table {
                out.extend_from_slice(item);
            }
        }
        out
    }
}

/// `java/lang/Object` with the virtual methods of the real one.
pub fn object_class() -> ClassBuilder {
    let mut object = ClassBuilder::new("java/lang/Object");
    object
        .version(49, 0)
        .super_class(None)
        .method(ACC_PUBLIC, "<init>", "()V", &[RETURN])
        .method(ACC_PROTECTED, "finalize", "()V", &[RETURN])
        .method(ACC_PUBLIC | ACC_NATIVE, "hashCode", "()I", &[])
        .method(ACC_PUBLIC, "equals", "(Ljava/lang/Object;)Z", &[0x03, 0xAC])
        .method(ACC_PUBLIC | ACC_NATIVE, "toString", "()Ljava/lang/String;", &[])
        .method(ACC_PROTECTED | ACC_NATIVE, "clone", "()Ljava/lang/Object;", &[])
        .method(ACC_PUBLIC | ACC_FINAL | ACC_NATIVE, "getClass", "()Ljava/lang/Class;", &[])
        .method(ACC_PUBLIC | ACC_FINAL | ACC_NATIVE, "notify", "()V", &[])
        .method(ACC_PUBLIC | ACC_FINAL | ACC_NATIVE, "wait", "(J)V", &[]);
    object
}

/// A loader with its own symbol table and registry, preloaded with `java/lang/Object`.
#[derive(Debug)]
pub struct TestLoader {
    pub options: LoadOptions,
    pub symbols: SymbolTable,
    pub registry: ClassRegistry,
}

impl TestLoader {
    pub fn new() -> Self {
        Self::with_options(LoadOptions::default())
    }

    pub fn with_options(options: LoadOptions) -> Self {
        let loader = Self {
            options,
            symbols: SymbolTable::new(),
            registry: ClassRegistry::new(),
        };
        loader.define(&object_class().build()).unwrap();
        loader
    }

    pub fn parse_request(&self, request: &LoadRequest<'_>) -> Result<ClassHandle, LoadError> {
        ClassFileParser::new(&self.options, &self.symbols, &self.registry).parse_class_file(request)
    }

    /// Parses a class file without publishing it.
    pub fn parse(&self, bytes: &[u8]) -> Result<ClassHandle, LoadError> {
        self.parse_request(&LoadRequest::new(bytes, "Test.class"))
    }

    /// Parses a class file and publishes it for later resolution.
    pub fn define(&self, bytes: &[u8]) -> Result<ClassHandle, LoadError> {
        let class = self.parse(bytes)?;
        self.registry.define(class.clone());
        Ok(class)
    }
}
