//! Assembly of a [`ClassDescriptor`] from the bytes of a class file.

use std::sync::Arc;

use super::{
    ClassFileStream, ParseContext,
    annotations::AnnotationPolicy,
    class_attributes::parse_class_attributes,
    constant_pool::parse_constant_pool,
    fields::parse_fields,
    methods::parse_methods,
};
use crate::{
    errors::{LoadError, LoadErrorKind},
    jvm::{
        class::{
            ACC_MODULE, ClassAccessFlags, ClassDescriptor, ClassHandle, JAVA_6_VERSION,
            JAVA_8_VERSION, JAVA_LANG_OBJECT, Version, package_of,
        },
        constant_pool::{ConstantPool, CpPatch, tag},
        layout::{LayoutInput, layout_fields},
        method::{MethodAccessFlags, MethodInfo},
        resolver::{ClassResolver, LoaderContext},
        vtable::{VtableInput, compute_vtable_sizes},
    },
    macros::{check_format, malform, see_jvm_spec},
    options::LoadOptions,
    symbols::{Symbol, SymbolTable},
};

/// The magic number identifying a class file.
#[doc = see_jvm_spec!(4, 1)]
const JAVA_CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// A class file to be loaded together with the context it is loaded in.
#[derive(Debug, Clone)]
pub struct LoadRequest<'a> {
    bytes: &'a [u8],
    source: &'a str,
    name_hint: Option<&'a str>,
    patches: Option<&'a [Option<CpPatch>]>,
    host_class: Option<ClassHandle>,
    loader: LoaderContext,
    verify: bool,
}

impl<'a> LoadRequest<'a> {
    /// Creates a request to load `bytes` in the boot loader. `source` describes where the
    /// bytes come from and is quoted in error messages.
    #[must_use]
    pub fn new(bytes: &'a [u8], source: &'a str) -> Self {
        Self {
            bytes,
            source,
            name_hint: None,
            patches: None,
            host_class: None,
            loader: LoaderContext::boot(),
            verify: true,
        }
    }

    /// Requires the class file to define the class with the given binary name.
    #[must_use]
    pub fn with_name_hint(mut self, name: &'a str) -> Self {
        self.name_hint = Some(name);
        self
    }

    /// Replaces constant pool entries before resolution. `patches[i]` applies to entry
    /// `i`; only classes defined for a host class accept patches.
    #[must_use]
    pub fn with_patches(mut self, patches: &'a [Option<CpPatch>]) -> Self {
        self.patches = Some(patches);
        self
    }

    /// Defines the class on behalf of `host`, whose access rights it shares.
    #[must_use]
    pub fn with_host_class(mut self, host: ClassHandle) -> Self {
        self.host_class = Some(host);
        self
    }

    /// Defines the class in the given loader.
    #[must_use]
    pub fn with_loader(mut self, loader: LoaderContext) -> Self {
        self.loader = loader;
        self
    }

    /// Sets whether the caller requires the class file to be checked. Checks only run
    /// when both the caller and [`LoadOptions::verify`] ask for them.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// Loads class files into [`ClassDescriptor`]s.
///
/// The parser holds no state of its own between calls; every call to
/// [`ClassFileParser::parse_class_file`] works on a fresh context, so one parser may
/// serve several threads.
#[derive(Debug)]
pub struct ClassFileParser<'a, R: ?Sized> {
    options: &'a LoadOptions,
    symbols: &'a SymbolTable,
    resolver: &'a R,
}

/// The access flags as declared, after the version-dependent adjustments.
fn read_class_flags(
    stream: &mut ClassFileStream<'_>,
    ctx: &ParseContext<'_>,
    expected_name: &str,
) -> Result<ClassAccessFlags, LoadError> {
    let raw_flags = stream.get_u2()?;
    if raw_flags & ACC_MODULE != 0 {
        return Err(LoadError::no_class_def_found(format!(
            "{expected_name} is not a class because access_flag ACC_MODULE is set"
        )));
    }
    let mut flags = ClassAccessFlags::from_bits_truncate(raw_flags);
    if flags.contains(ClassAccessFlags::INTERFACE) && ctx.major_version() < JAVA_6_VERSION {
        flags |= ClassAccessFlags::ABSTRACT;
    }
    Ok(flags)
}

/// Converts a binary name to the dotted form used in messages.
fn external_name(binary_name: &str) -> String {
    binary_name.replace('/', ".")
}

/// The class whose access rights a class being defined uses.
struct Accessor<'a> {
    name: &'a str,
    loader: &'a LoaderContext,
}

impl Accessor<'_> {
    fn can_access(&self, target: &ClassDescriptor) -> bool {
        target.is_public()
            || (package_of(self.name) == target.package_name() && *self.loader == target.loader)
    }
}

/// Computes every interface implemented by a class. The result shares storage with the
/// interfaces of the super class or with `local` when it adds nothing to them.
fn compute_transitive_interfaces(
    super_class: Option<&ClassDescriptor>,
    local: &Arc<[ClassHandle]>,
) -> Arc<[ClassHandle]> {
    let super_interfaces = super_class.map(|it| &it.transitive_interfaces);
    let super_size = super_interfaces.map_or(0, |it| it.len());
    let max_size = super_size
        + local.len()
        + local
            .iter()
            .map(|it| it.transitive_interfaces.len())
            .sum::<usize>();
    if max_size == 0 {
        return Arc::from([]);
    }
    if let Some(super_interfaces) = super_interfaces
        && max_size == super_size
    {
        return Arc::clone(super_interfaces);
    }
    if max_size == local.len() {
        return Arc::clone(local);
    }

    let mut result: Vec<ClassHandle> = Vec::with_capacity(max_size);
    let mut append = |interfaces: &[ClassHandle]| {
        for interface in interfaces {
            if !result.iter().any(|it| Arc::ptr_eq(it, interface)) {
                result.push(Arc::clone(interface));
            }
        }
    };
    if let Some(super_interfaces) = super_interfaces {
        append(&super_interfaces[..]);
    }
    for interface in local.iter() {
        append(&interface.transitive_interfaces[..]);
    }
    append(&local[..]);
    result.into()
}

/// Sorts the methods by name and descriptor, returning the original position of each.
fn sort_methods(methods: Vec<MethodInfo>) -> (Vec<MethodInfo>, Vec<u16>) {
    let mut indexed: Vec<(u16, MethodInfo)> = (0u16..).zip(methods).collect();
    indexed.sort_by(|(_, lhs), (_, rhs)| {
        (lhs.name.as_str(), lhs.signature.as_str())
            .cmp(&(rhs.name.as_str(), rhs.signature.as_str()))
    });
    indexed.into_iter().map(|(index, method)| (method, index)).unzip()
}

/// Finds a method by name and descriptor in `class` or its super classes.
fn lookup_method<'c>(
    class: &'c ClassDescriptor,
    name: &str,
    signature: &str,
) -> Option<(&'c ClassDescriptor, &'c MethodInfo)> {
    std::iter::successors(Some(class), |it| it.super_class.as_deref())
        .find_map(|holder| holder.find_method(name, signature).map(|m| (holder, m)))
}

fn check_final_method_override(
    class_name: &str,
    accessor: &Accessor<'_>,
    super_class: Option<&ClassDescriptor>,
    methods: &[MethodInfo],
) -> Result<(), LoadError> {
    for method in methods {
        if method.is_static() || method.is_private() || method.is_constructor() {
            continue;
        }
        let mut next = super_class;
        while let Some(class) = next {
            let Some((holder, overridden)) = lookup_method(class, &method.name, &method.signature)
            else {
                break;
            };
            let is_accessible = !overridden.is_private()
                && (overridden
                    .access_flags
                    .intersects(MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED)
                    || (package_of(accessor.name) == holder.package_name()
                    && *accessor.loader == holder.loader));
            if overridden.is_final() && !overridden.is_static() && is_accessible {
                return Err(LoadError::verify(format!(
                    "class {} overrides final method {}.{}",
                    external_name(class_name),
                    method.name,
                    method.signature
                )));
            }
            next = holder.super_class.as_deref();
        }
    }
    Ok(())
}

fn check_illegal_static_methods(
    class_name: &str,
    version: Version,
    is_interface: bool,
    methods: &[MethodInfo],
) -> Result<(), LoadError> {
    if !is_interface || version.major >= JAVA_8_VERSION {
        return Ok(());
    }
    match methods
        .iter()
        .find(|m| m.is_static() && !m.is_class_initializer())
    {
        Some(method) => Err(LoadError::verify(format!(
            "Illegal static method {} in interface {}",
            method.name,
            external_name(class_name)
        ))),
        None => Ok(()),
    }
}

impl<'a, R> ClassFileParser<'a, R>
where
    R: ClassResolver + ?Sized,
{
    /// Creates a parser interning names in `symbols` and resolving super types with
    /// `resolver`.
    #[must_use]
    pub fn new(options: &'a LoadOptions, symbols: &'a SymbolTable, resolver: &'a R) -> Self {
        Self {
            options,
            symbols,
            resolver,
        }
    }

    /// Parses, checks and lays out the class in `request`.
    ///
    /// # Errors
    /// Returns the first violation found; see [`LoadErrorKind`] for the possible kinds.
    /// The message ends with the source of the request.
    pub fn parse_class_file(&self, request: &LoadRequest<'_>) -> Result<ClassHandle, LoadError> {
        log::debug!("Parsing class file {}", request.source);
        let class = self
            .parse(request)
            .map_err(|err| err.in_source(request.source))?;
        log::debug!(
            "Loaded {} (version {}) from {}: {} fields, {} methods, instance size {} bytes, vtable length {}",
            class.name,
            class.version,
            request.source,
            class.fields.len(),
            class.methods.len(),
            class.layout.instance_size_in_bytes(),
            class.vtable.vtable_length,
        );
        Ok(Arc::new(class))
    }

    fn read_version(
        &self,
        stream: &mut ClassFileStream<'_>,
        request: &LoadRequest<'_>,
    ) -> Result<Version, LoadError> {
        stream.guarantee_more(8)?;
        let magic = stream.get_u4_fast();
        check_format!(magic == JAVA_CLASS_MAGIC, "Incompatible magic value {magic}");
        let minor = stream.get_u2_fast();
        let major = stream.get_u2_fast();
        if !self.options.is_supported_version(major, minor) {
            return Err(LoadError::new(
                LoadErrorKind::UnsupportedClassVersion,
                format!(
                    "{} : Unsupported major.minor version {major}.{minor} (supported up to {}.{})",
                    request.name_hint.unwrap_or("<Unknown>"),
                    self.options.max_major_version,
                    self.options.max_minor_version,
                ),
            ));
        }
        Ok(Version::new(major, minor))
    }

    fn read_this_class(
        stream: &mut ClassFileStream<'_>,
        pool: &ConstantPool,
        request: &LoadRequest<'_>,
    ) -> Result<Symbol, LoadError> {
        let index = stream.get_u2()?;
        check_format!(
            pool.tag_at(index) == tag::CLASS,
            "Invalid this class index {index} in constant pool"
        );
        let name = pool.klass_name_at(index)?.clone();
        if stream.need_verify() {
            check_format!(!name.starts_with('['), "Bad class name");
        }
        if let Some(expected) = request.name_hint
            && expected != name.as_str()
        {
            return Err(LoadError::no_class_def_found(format!(
                "{} (wrong name: {})",
                external_name(expected),
                external_name(&name)
            )));
        }
        Ok(name)
    }

    fn read_super_class_name(
        stream: &mut ClassFileStream<'_>,
        pool: &ConstantPool,
        class_name: &str,
    ) -> Result<Option<Symbol>, LoadError> {
        let index = stream.get_u2()?;
        if index == 0 {
            check_format!(
                class_name == JAVA_LANG_OBJECT,
                "Invalid superclass index {index}"
            );
            return Ok(None);
        }
        check_format!(
            class_name != JAVA_LANG_OBJECT,
            "java.lang.Object cannot have a super class"
        );
        check_format!(
            pool.tag_at(index) == tag::CLASS,
            "Invalid superclass index {index}"
        );
        let name = pool.klass_name_at(index)?.clone();
        if stream.need_verify() {
            check_format!(!name.starts_with('['), "Bad superclass name");
        }
        Ok(Some(name))
    }

    fn resolve_super_type(
        &self,
        class_name: &str,
        super_name: &str,
        loader: &LoaderContext,
    ) -> Result<ClassHandle, LoadError> {
        if class_name == super_name {
            return Err(LoadError::new(
                LoadErrorKind::ClassCircularity,
                external_name(class_name),
            ));
        }
        self.resolver.resolve_class(super_name, loader)
    }

    fn read_interfaces(
        &self,
        stream: &mut ClassFileStream<'_>,
        pool: &ConstantPool,
        class_name: &str,
        accessor: &Accessor<'_>,
    ) -> Result<Arc<[ClassHandle]>, LoadError> {
        let count = stream.get_u2()?;
        check_format!(
            count == 0 || class_name != JAVA_LANG_OBJECT,
            "java.lang.Object cannot implement an interface"
        );
        stream.guarantee_more(usize::from(count) * 2)?;
        let mut interfaces: Vec<ClassHandle> = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let index = stream.get_u2_fast();
            check_format!(
                pool.tag_at(index) == tag::CLASS,
                "Interface name has bad constant pool index {index}"
            );
            let name = pool.klass_name_at(index)?;
            check_format!(!name.starts_with('['), "Bad interface name");
            let interface = self.resolve_super_type(class_name, name, accessor.loader)?;
            if !interface.is_interface() {
                return Err(LoadError::incompatible_class_change("Implementing class"));
            }
            if !accessor.can_access(&interface) {
                return Err(LoadError::new(
                    LoadErrorKind::IllegalAccess,
                    format!(
                        "class {} cannot access its superinterface {}",
                        external_name(class_name),
                        external_name(&interface.name)
                    ),
                ));
            }
            interfaces.push(interface);
        }
        if stream.need_verify() {
            for (position, interface) in interfaces.iter().enumerate() {
                check_format!(
                    !interfaces[position + 1..]
                        .iter()
                        .any(|other| other.name == interface.name),
                    "Duplicate interface name"
                );
            }
        }
        Ok(interfaces.into())
    }

    fn resolve_super_class(
        &self,
        class_name: &str,
        super_name: Option<&Symbol>,
        is_interface: bool,
        accessor: &Accessor<'_>,
    ) -> Result<Option<ClassHandle>, LoadError> {
        let Some(super_name) = super_name else {
            return Ok(None);
        };
        if is_interface {
            check_format!(
                *super_name == JAVA_LANG_OBJECT,
                "Interfaces must have java.lang.Object as superclass"
            );
        }
        let super_class = self.resolve_super_type(class_name, super_name, accessor.loader)?;
        if super_class.is_interface() {
            return Err(LoadError::incompatible_class_change(format!(
                "class {} has interface {} as super class",
                external_name(class_name),
                external_name(&super_class.name)
            )));
        }
        if super_class.is_final() {
            return Err(LoadError::verify("Cannot inherit from final class"));
        }
        if !accessor.can_access(&super_class) {
            return Err(LoadError::new(
                LoadErrorKind::IllegalAccess,
                format!(
                    "class {} cannot access its superclass {}",
                    external_name(class_name),
                    external_name(&super_class.name)
                ),
            ));
        }
        Ok(Some(super_class))
    }

    #[allow(
        clippy::too_many_lines,
        reason = "The stages run in the order of the class file."
    )]
    fn parse(&self, request: &LoadRequest<'_>) -> Result<ClassDescriptor, LoadError> {
        if request.patches.is_some() && request.host_class.is_none() {
            malform!("Constant pool patches require a host class");
        }
        let need_verify = self.options.verify && request.verify;
        let mut stream = ClassFileStream::new(request.bytes, request.source, need_verify);
        let version = self.read_version(&mut stream, request)?;
        let base_ctx = ParseContext {
            options: self.options,
            version,
            need_verify,
            class_name: "",
            patches: request.patches,
            annotation_policy: AnnotationPolicy {
                privileged: request.loader.is_privileged || request.host_class.is_some(),
                restrict_contended: self.options.restrict_contended,
            },
        };

        let constant_pool = parse_constant_pool(&mut stream, &base_ctx, self.symbols)?;
        let expected_name = request.name_hint.unwrap_or("<Unknown>");
        let access_flags = read_class_flags(&mut stream, &base_ctx, expected_name)?;
        let is_interface = access_flags.contains(ClassAccessFlags::INTERFACE);
        let name = Self::read_this_class(&mut stream, &constant_pool, request)?;
        let ctx = base_ctx.for_class(&name);
        ctx.checker().verify_legal_class_modifiers(access_flags)?;
        let accessor = match &request.host_class {
            Some(host) => Accessor {
                name: &host.name,
                loader: &host.loader,
            },
            None => Accessor {
                name: &name,
                loader: &request.loader,
            },
        };

        let super_name = Self::read_super_class_name(&mut stream, &constant_pool, &name)?;
        let local_interfaces = self.read_interfaces(&mut stream, &constant_pool, &name, &accessor)?;
        let parsed_fields =
            parse_fields(&mut stream, &ctx, &constant_pool, self.symbols, is_interface)?;
        let methods = parse_methods(&mut stream, &ctx, &constant_pool, is_interface)?;
        let attributes = parse_class_attributes(&mut stream, &ctx, &constant_pool)?;
        if need_verify {
            check_format!(stream.at_eos(), "Extra bytes at the end of class file");
        }

        let super_class =
            self.resolve_super_class(&name, super_name.as_ref(), is_interface, &accessor)?;
        let super_ref = super_class.as_deref();
        check_final_method_override(&name, &accessor, super_ref, &methods)?;
        check_illegal_static_methods(&name, version, is_interface, &methods)?;

        let has_empty_finalizer = methods.iter().any(|m| {
            m.name == "finalize" && m.signature == "()V" && !m.is_static() && m.is_empty_method()
        });
        let has_finalizer = !has_empty_finalizer
            && (methods.iter().any(MethodInfo::is_finalizer)
                || super_ref.is_some_and(|it| it.has_finalizer));
        let has_vanilla_constructor = super_ref.is_none_or(|it| {
            it.has_vanilla_constructor && methods.iter().any(MethodInfo::is_vanilla_constructor)
        });
        let declares_nonstatic_concrete_methods = is_interface
            && methods
                .iter()
                .any(|m| !m.is_abstract() && !m.is_static());
        let has_nonstatic_concrete_methods = declares_nonstatic_concrete_methods
            || super_ref.is_some_and(|it| it.has_nonstatic_concrete_methods)
            || local_interfaces
                .iter()
                .any(|it| it.has_nonstatic_concrete_methods);
        let transitive_interfaces = compute_transitive_interfaces(super_ref, &local_interfaces);

        let (methods, method_ordering) = sort_methods(methods);
        let vtable = compute_vtable_sizes(&VtableInput {
            class_name: &name,
            loader: &request.loader,
            is_interface,
            is_final: access_flags.contains(ClassAccessFlags::FINAL),
            super_class: super_ref,
            methods: &methods,
            local_interfaces: &local_interfaces,
            transitive_interfaces: &transitive_interfaces,
        });

        let mut fields = parsed_fields.fields;
        let layout = layout_fields(
            &mut fields,
            &LayoutInput {
                class_name: &name,
                super_layout: super_ref.map(|it| &it.layout),
                is_contended: attributes.is_contended,
                is_abstract: access_flags.contains(ClassAccessFlags::ABSTRACT) || is_interface,
                is_interface,
                has_finalizer,
                is_boot_loader: request.loader.is_boot(),
            },
            self.options,
        );

        Ok(ClassDescriptor {
            name,
            version,
            access_flags,
            super_class,
            local_interfaces,
            transitive_interfaces,
            constant_pool,
            fields,
            java_fields_count: parsed_fields.java_fields_count,
            methods,
            method_ordering,
            layout,
            vtable,
            source_file: attributes.source_file,
            source_debug_extension: attributes.source_debug_extension,
            generic_signature: attributes.generic_signature,
            inner_classes: attributes.inner_classes,
            enclosing_method: attributes.enclosing_method,
            bootstrap_methods: attributes.bootstrap_methods,
            annotations: attributes.annotations,
            has_finalizer,
            has_vanilla_constructor,
            declares_nonstatic_concrete_methods,
            has_nonstatic_concrete_methods,
            is_contended: attributes.is_contended,
            is_synthetic: attributes.is_synthetic,
            is_deprecated: attributes.is_deprecated,
            loader: request.loader.clone(),
            host_class: request.host_class.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::{parsing::test_support::Bytes, resolver::ClassRegistry};

    fn parse(options: &LoadOptions, bytes: &[u8]) -> Result<ClassHandle, LoadError> {
        let symbols = SymbolTable::new();
        let registry = ClassRegistry::new();
        ClassFileParser::new(options, &symbols, &registry)
            .parse_class_file(&LoadRequest::new(bytes, "Test.class"))
    }

    #[test]
    fn bad_magic() {
        let bytes = Bytes::default().u4(0xCAFE_BABF).u2(0).u2(52);
        let err = parse(&LoadOptions::default(), &bytes.0).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::ClassFormat);
        assert_eq!(
            err.message(),
            "Incompatible magic value 3405691583 in class file Test.class"
        );
    }

    #[test]
    fn version_is_checked_before_the_constant_pool() {
        // No constant pool follows the version.
        let bytes = Bytes::default().u4(JAVA_CLASS_MAGIC).u2(0).u2(53);
        let err = parse(&LoadOptions::default(), &bytes.0).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::UnsupportedClassVersion);
        assert!(err.message().contains("53.0"));
        assert!(err.message().contains("52.0"));

        let old = Bytes::default().u4(JAVA_CLASS_MAGIC).u2(0).u2(44);
        let err = parse(&LoadOptions::default(), &old.0).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::UnsupportedClassVersion);
    }

    #[test]
    fn truncated_after_version() {
        let bytes = Bytes::default().u4(JAVA_CLASS_MAGIC).u2(0).u2(52);
        let err = parse(&LoadOptions::default(), &bytes.0).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::TruncatedInput);
    }

    #[test]
    fn patches_need_a_host() {
        let symbols = SymbolTable::new();
        let registry = ClassRegistry::new();
        let patches = [None, Some(CpPatch::Integer(1))];
        let request = LoadRequest::new(&[], "Test.class").with_patches(&patches);
        let err = ClassFileParser::new(&LoadOptions::default(), &symbols, &registry)
            .parse_class_file(&request)
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Constant pool patches require a host class in class file Test.class"
        );
    }

    #[test]
    fn methods_are_sorted_with_their_original_positions() {
        let method = |name: &str| {
            crate::jvm::method::tests::method(name, "()V", MethodAccessFlags::PUBLIC, &[0xB1])
        };
        let (sorted, ordering) = sort_methods(vec![method("b"), method("a"), method("c")]);
        let names: Vec<_> = sorted.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(ordering, [1, 0, 2]);
    }
}
