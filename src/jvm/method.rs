//! Methods of a loaded class.

use bitflags::bitflags;

use super::line_numbers::CompressedLineNumbers;
use crate::{macros::see_jvm_spec, symbols::Symbol};

bitflags! {
    /// The access flags of a method.
    #[doc = see_jvm_spec!(4, 6)]
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
    pub struct MethodAccessFlags: u16 {
        /// Declared `public`; may be accessed from outside its package.
        const PUBLIC = 0x0001;
        /// Declared `private`; accessible only within the defining class and other classes belonging to the same nest.
        const PRIVATE = 0x0002;
        /// Declared `protected`; may be accessed within subclasses.
        const PROTECTED = 0x0004;
        /// Declared `static`.
        const STATIC = 0x0008;
        /// Declared `final`; must not be overridden.
        const FINAL = 0x0010;
        /// Declared `synchronized`; invocation is wrapped by a monitor use.
        const SYNCHRONIZED = 0x0020;
        /// A bridge method, generated by the compiler.
        const BRIDGE = 0x0040;
        /// Declared with variable number of arguments.
        const VARARGS = 0x0080;
        /// Declared `native`; implemented in a language other than the Java programming language.
        const NATIVE = 0x0100;
        /// Declared `abstract`; no implementation is provided.
        const ABSTRACT = 0x0400;
        /// In a class file whose major version number is at least 46 and at most 60, declared `strictfp`.
        const STRICT = 0x0800;
        /// Declared synthetic; not present in the source code.
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Properties of a method recognised from annotations.
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
    pub struct MethodIntrinsicFlags: u8 {
        /// `@ForceInline`
        const FORCE_INLINE = 0x01;
        /// `@DontInline`
        const DONT_INLINE = 0x02;
        /// `@CallerSensitive`
        const CALLER_SENSITIVE = 0x04;
        /// `@LambdaForm.Compiled`
        const LAMBDA_FORM_COMPILED = 0x08;
        /// `@LambdaForm.Hidden`
        const HIDDEN = 0x10;
    }
}

/// The name of instance initialization methods.
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// The name of class initialization methods.
pub const CLASS_INITIALIZER_NAME: &str = "<clinit>";

/// An entry of the exception table of a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionTableEntry {
    /// The first covered bytecode index.
    pub start_pc: u16,
    /// The first bytecode index past the covered range.
    pub end_pc: u16,
    /// The bytecode index of the handler.
    pub handler_pc: u16,
    /// The constant pool index of the caught class, 0 to catch everything.
    pub catch_type_index: u16,
}

/// An entry of the merged local variable table of a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalVariableEntry {
    /// The first bytecode index where the variable has a value.
    pub start_pc: u16,
    /// The length of the range where the variable has a value.
    pub length: u16,
    /// The constant pool index of the name.
    pub name_index: u16,
    /// The constant pool index of the descriptor.
    pub descriptor_index: u16,
    /// The constant pool index of the generic signature, 0 if there is none.
    pub signature_index: u16,
    /// The local variable slot.
    pub slot: u16,
}

/// The `Code` attribute of a method.
#[doc = see_jvm_spec!(4, 7, 3)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// The maximum depth of the operand stack.
    pub max_stack: u16,
    /// The number of local variable slots.
    pub max_locals: u16,
    /// The raw bytecode.
    pub bytecode: Vec<u8>,
    /// The exception handlers, in declaration order.
    pub exception_table: Vec<ExceptionTableEntry>,
    /// The compressed line number table.
    pub line_numbers: Option<CompressedLineNumbers>,
    /// The local variable table with generic signatures merged in.
    pub local_variables: Vec<LocalVariableEntry>,
    /// The raw `StackMapTable`, left for the bytecode verifier.
    pub stack_map_table: Option<Vec<u8>>,
}

/// Raw annotation data attached to a method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodAnnotations {
    /// `RuntimeVisibleAnnotations`
    pub visible: Option<Vec<u8>>,
    /// `RuntimeInvisibleAnnotations`
    pub invisible: Option<Vec<u8>>,
    /// `RuntimeVisibleParameterAnnotations`
    pub visible_parameter: Option<Vec<u8>>,
    /// `RuntimeInvisibleParameterAnnotations`
    pub invisible_parameter: Option<Vec<u8>>,
    /// `AnnotationDefault`
    pub default: Option<Vec<u8>>,
    /// `RuntimeVisibleTypeAnnotations`
    pub visible_type: Option<Vec<u8>>,
    /// `RuntimeInvisibleTypeAnnotations`
    pub invisible_type: Option<Vec<u8>>,
}

/// An entry of the `MethodParameters` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodParameter {
    /// The constant pool index of the name, 0 if the parameter is unnamed.
    pub name_index: u16,
    /// The access flags of the parameter.
    pub access_flags: u16,
}

/// A method of a loaded class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// The access flags after version-specific masking.
    pub access_flags: MethodAccessFlags,
    /// The name of the method.
    pub name: Symbol,
    /// The descriptor of the method.
    pub signature: Symbol,
    /// The constant pool index of the name.
    pub name_index: u16,
    /// The constant pool index of the descriptor.
    pub signature_index: u16,
    /// The number of local variable slots taken by the arguments, receiver included.
    pub size_of_parameters: u16,
    /// The body of the method, absent for `abstract` and `native` methods.
    pub code: Option<Code>,
    /// The constant pool indices of the checked exceptions.
    pub checked_exceptions: Vec<u16>,
    /// The `MethodParameters` attribute.
    pub parameters: Vec<MethodParameter>,
    /// The constant pool index of the generic `Signature`, 0 if there is none.
    pub generic_signature_index: u16,
    /// Properties recognised from annotations.
    pub intrinsic_flags: MethodIntrinsicFlags,
    /// Whether the method carries the `Synthetic` attribute.
    pub is_synthetic: bool,
    /// Whether the method carries the `Deprecated` attribute.
    pub is_deprecated: bool,
    /// Raw annotation data.
    pub annotations: MethodAnnotations,
}

impl MethodInfo {
    /// Checks if the method is static.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Checks if the method is abstract.
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }

    /// Checks if the method is private.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PRIVATE)
    }

    /// Checks if the method is final.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::FINAL)
    }

    /// Checks if the method is a constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Checks if the method is a class initializer.
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.name == CLASS_INITIALIZER_NAME
    }

    /// Checks if the method is an instance initializer or a class initializer.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        self.is_constructor() || self.is_class_initializer()
    }

    /// Checks if the method takes part in virtual dispatch.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private() && !self.is_initializer()
    }

    /// Checks if the method is `void finalize()` with a non-trivial body.
    #[must_use]
    pub fn is_finalizer(&self) -> bool {
        self.name == "finalize"
            && self.signature == "()V"
            && !self.is_static()
            && !self.is_empty_method()
    }

    /// Checks if the body consists of nothing but `return`.
    #[must_use]
    pub fn is_empty_method(&self) -> bool {
        const RETURN: u8 = 0xB1;
        self.code
            .as_ref()
            .is_some_and(|code| code.bytecode.as_slice() == [RETURN])
    }

    /// Checks if the method is `<init>()V` doing nothing beyond one `invokespecial` on the
    /// receiver. The assembler additionally requires the super class to be vanilla.
    #[must_use]
    pub fn is_vanilla_constructor(&self) -> bool {
        const ALOAD_0: u8 = 0x2A;
        const INVOKESPECIAL: u8 = 0xB7;
        const RETURN: u8 = 0xB1;
        self.is_constructor()
            && self.signature == "()V"
            && self.code.as_ref().is_some_and(|code| {
                matches!(
                    code.bytecode.as_slice(),
                    [ALOAD_0, INVOKESPECIAL, _, _, RETURN] | [RETURN]
                )
            })
    }
}
