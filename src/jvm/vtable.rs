//! Sizing of the virtual and interface dispatch tables.

use super::{
    class::{ClassDescriptor, ClassHandle, package_of},
    method::{CONSTRUCTOR_NAME, MethodAccessFlags, MethodInfo},
    resolver::LoaderContext,
};

/// Words taken by one interface entry of the itable: the interface and its offset.
pub const ITABLE_OFFSET_ENTRY_SIZE: u32 = 2;
/// Words taken by one method entry of the itable.
pub const ITABLE_METHOD_ENTRY_SIZE: u32 = 1;

/// Sizes of the dispatch tables of a class, in entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VtableSizes {
    /// The number of vtable entries, inherited ones included.
    pub vtable_length: u32,
    /// The size of the itable in words.
    pub itable_length: u32,
    /// The number of interface methods that need a new vtable entry because neither the
    /// class nor its super classes implement them.
    pub miranda_count: u32,
}

/// The class whose dispatch tables are being sized.
#[derive(Debug, Clone, Copy)]
pub struct VtableInput<'a> {
    /// The binary name of the class.
    pub class_name: &'a str,
    /// The loader defining the class.
    pub loader: &'a LoaderContext,
    /// Whether the class is an interface.
    pub is_interface: bool,
    /// Whether the class is final.
    pub is_final: bool,
    /// The super class, [`None`] only for `java/lang/Object`.
    pub super_class: Option<&'a ClassDescriptor>,
    /// The methods declared by the class.
    pub methods: &'a [MethodInfo],
    /// The interfaces declared by the class.
    pub local_interfaces: &'a [ClassHandle],
    /// All interfaces implemented by the class.
    pub transitive_interfaces: &'a [ClassHandle],
}

/// Finds a method by name and descriptor in `class` or its super classes, together with
/// the class declaring it.
fn lookup_method<'a>(
    class: &'a ClassDescriptor,
    name: &str,
    signature: &str,
) -> Option<(&'a ClassDescriptor, &'a MethodInfo)> {
    std::iter::once(class)
        .chain(class.super_classes().map(|it| &**it))
        .find_map(|holder| holder.find_method(name, signature).map(|m| (holder, m)))
}

/// Finds a non-static method in any interface implemented by `class`.
fn lookup_method_in_all_interfaces<'a>(
    class: &'a ClassDescriptor,
    name: &str,
    signature: &str,
) -> Option<&'a MethodInfo> {
    class
        .transitive_interfaces
        .iter()
        .filter_map(|it| it.find_method(name, signature))
        .find(|m| !m.is_static())
}

/// Checks if `super_method`, declared in `holder`, is overridden by a method of the same
/// name and descriptor declared in the class being sized.
fn is_override(
    holder: &ClassDescriptor,
    super_method: &MethodInfo,
    class: &VtableInput<'_>,
) -> bool {
    if super_method.is_private() {
        return false;
    }
    if super_method
        .access_flags
        .intersects(MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED)
    {
        return true;
    }
    holder.package_name() == package_of(class.class_name) && holder.loader == *class.loader
}

fn needs_new_vtable_entry(method: &MethodInfo, class: &VtableInput<'_>) -> bool {
    if class.is_interface {
        return false;
    }
    if class.is_final
        || method.is_final()
        || method.is_static()
        || method.name == CONSTRUCTOR_NAME
    {
        return false;
    }
    let Some(super_class) = class.super_class else {
        return true;
    };
    if method.is_private() {
        return true;
    }
    let mut current = Some(super_class);
    while let Some(klass) = current {
        let Some((holder, super_method)) = lookup_method(klass, &method.name, &method.signature)
        else {
            break;
        };
        if !super_method.is_static()
            && !super_method.is_private()
            && is_override(holder, super_method, class)
        {
            return false;
        }
        current = holder.super_class.as_deref();
    }
    // A public or protected method may reuse the entry of a super class miranda.
    !(super_class.vtable.miranda_count > 0
        && lookup_method_in_all_interfaces(super_class, &method.name, &method.signature)
            .is_some())
}

/// Checks if an interface method needs an entry because the class hierarchy does not
/// implement it.
fn is_miranda(
    interface_method: &MethodInfo,
    methods: &[MethodInfo],
    super_class: Option<&ClassDescriptor>,
) -> bool {
    if interface_method.is_static() || interface_method.is_private() {
        return false;
    }
    let name = &*interface_method.name;
    let signature = &*interface_method.signature;
    if methods
        .iter()
        .any(|m| !m.is_static() && m.name == name && m.signature == signature)
    {
        return false;
    }
    let Some(super_class) = super_class else {
        return true;
    };
    let mut found = lookup_method(super_class, name, signature);
    // Static methods do not implement interface methods; keep looking above them.
    while let Some((holder, method)) = found
        && method.is_static()
    {
        found = holder
            .super_class
            .as_deref()
            .and_then(|it| lookup_method(it, name, signature));
    }
    found.is_none_or(|(_, method)| method.is_private())
}

/// Collects the interface methods that need new vtable entries.
fn new_mirandas<'a>(class: &VtableInput<'a>) -> Vec<&'a MethodInfo> {
    let mut mirandas: Vec<&MethodInfo> = Vec::new();
    let interfaces = class
        .local_interfaces
        .iter()
        .flat_map(|it| std::iter::once(it).chain(it.transitive_interfaces.iter()));
    for interface in interfaces {
        for method in &interface.methods {
            let is_duplicate = mirandas
                .iter()
                .any(|m| m.name == method.name && m.signature == method.signature);
            if is_duplicate || !is_miranda(method, class.methods, class.super_class) {
                continue;
            }
            let inherited = class.super_class.is_some_and(|it| {
                lookup_method_in_all_interfaces(it, &method.name, &method.signature).is_some()
            });
            if !inherited {
                mirandas.push(method);
            }
        }
    }
    mirandas
}

/// Checks if an interface method is dispatched through the itable.
fn needs_itable_index(method: &MethodInfo) -> bool {
    !method.is_static() && !method.is_initializer() && method.access_flags.contains(MethodAccessFlags::PUBLIC)
}

fn itable_length(transitive_interfaces: &[ClassHandle]) -> u32 {
    let mut interface_count = 0;
    let mut method_count = 0;
    for interface in transitive_interfaces {
        let methods = interface
            .methods
            .iter()
            .filter(|m| needs_itable_index(m))
            .count();
        if methods > 0 || !interface.transitive_interfaces.is_empty() {
            interface_count += 1;
            method_count += methods;
        }
    }
    // One more interface entry terminates the table.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "A class file holds at most 65535 interfaces and methods."
    )]
    let length = (interface_count as u32 + 1) * ITABLE_OFFSET_ENTRY_SIZE
        + method_count as u32 * ITABLE_METHOD_ENTRY_SIZE;
    length
}

/// Computes the vtable length, the itable size, and the number of miranda methods.
#[must_use]
pub fn compute_vtable_sizes(class: &VtableInput<'_>) -> VtableSizes {
    let inherited = class.super_class.map_or(0, |it| it.vtable.vtable_length);
    #[allow(
        clippy::cast_possible_truncation,
        reason = "A class file holds at most 65535 methods."
    )]
    let new_entries = class
        .methods
        .iter()
        .filter(|m| needs_new_vtable_entry(m, class))
        .count() as u32;
    #[allow(
        clippy::cast_possible_truncation,
        reason = "A class file holds at most 65535 methods per interface."
    )]
    let miranda_count = new_mirandas(class).len() as u32;
    let mut vtable_length = inherited + new_entries;
    if !class.is_interface {
        vtable_length += miranda_count;
    }
    let itable_length = if class.is_interface {
        0
    } else {
        itable_length(class.transitive_interfaces)
    };
    log::trace!(
        "{}: vtable length {vtable_length} ({miranda_count} miranda), itable length {itable_length}",
        class.class_name
    );
    VtableSizes {
        vtable_length,
        itable_length,
        miranda_count,
    }
}
