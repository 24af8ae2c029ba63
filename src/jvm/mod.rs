//! Module containing the APIs for the JVM elements.

pub mod class;
pub mod constant_pool;
pub mod field;
pub mod layout;
pub mod line_numbers;
pub mod method;
pub mod parsing;
pub mod resolver;
pub mod vtable;

pub use class::{ClassDescriptor, ClassHandle};
pub use resolver::{ClassRegistry, ClassResolver, LoaderContext};
