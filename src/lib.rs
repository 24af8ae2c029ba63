#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    rust_2021_compatibility
)]
#![allow(clippy::module_name_repetitions)]
#![deny(rustdoc::broken_intra_doc_links)]

//! `cafeload` turns raw JVM class-file bytes into fully verified,
//! memory-laid-out class descriptors.
//!
//! The pipeline reads the class file through a bounds-checked
//! [`ClassFileStream`](jvm::parsing::ClassFileStream), parses and resolves the
//! constant pool, parses fields and methods with their attributes, checks the
//! format rules of the JVM specification, resolves the super class and
//! interfaces through a [`ClassResolver`](jvm::resolver::ClassResolver), and
//! finally assigns an offset to every field.
//!
//! ```no_run
//! use cafeload::{
//!     LoadOptions, SymbolTable,
//!     jvm::{parsing::{ClassFileParser, LoadRequest}, resolver::ClassRegistry},
//! };
//!
//! let bytes = std::fs::read("Foo.class").unwrap();
//! let symbols = SymbolTable::new();
//! let options = LoadOptions::default();
//! let registry = ClassRegistry::new();
//! let parser = ClassFileParser::new(&options, &symbols, &registry);
//! let class = parser
//!     .parse_class_file(&LoadRequest::new(&bytes, "Foo.class"))
//!     .unwrap();
//! println!("{} is {} bytes", class.name, class.layout.instance_size_in_bytes());
//! ```
//! ## Features
#![doc = document_features::document_features!()]

pub mod errors;
pub mod jvm;
pub(crate) mod macros;
pub mod options;
pub mod symbols;
pub mod types;

pub use errors::{LoadError, LoadErrorKind};
pub use options::LoadOptions;
pub use symbols::{Symbol, SymbolTable};
