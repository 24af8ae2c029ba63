//! Resolution of the super class and interfaces of a class being loaded.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::class::ClassHandle;
use crate::errors::LoadError;

/// The loader and protection domain a class is defined in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LoaderContext {
    /// The name of the defining loader, [`None`] for the boot loader.
    pub loader_name: Option<Arc<str>>,
    /// An opaque description of the protection domain.
    pub protection_domain: Option<Arc<str>>,
    /// Whether the loader is trusted to use VM-internal annotations.
    pub is_privileged: bool,
}

impl LoaderContext {
    /// The boot loader, which is always privileged.
    #[must_use]
    pub fn boot() -> Self {
        Self {
            loader_name: None,
            protection_domain: None,
            is_privileged: true,
        }
    }

    /// An application loader with the given name.
    #[must_use]
    pub fn application(name: &str) -> Self {
        Self {
            loader_name: Some(Arc::from(name)),
            protection_domain: None,
            is_privileged: false,
        }
    }

    /// Checks if this is the boot loader.
    #[must_use]
    pub const fn is_boot(&self) -> bool {
        self.loader_name.is_none()
    }
}

/// Finds already loaded classes by name on behalf of the loader.
pub trait ClassResolver {
    /// Resolves the class with the given binary name as seen from `loader`.
    ///
    /// # Errors
    /// Returns a [`LoadErrorKind::NoClassDefFound`](crate::LoadErrorKind::NoClassDefFound)
    /// error if the class cannot be found.
    fn resolve_class(&self, name: &str, loader: &LoaderContext) -> Result<ClassHandle, LoadError>;
}

impl<T> ClassResolver for &T
where
    T: ClassResolver + ?Sized,
{
    fn resolve_class(&self, name: &str, loader: &LoaderContext) -> Result<ClassHandle, LoadError> {
        (**self).resolve_class(name, loader)
    }
}

/// An in-memory registry of defined classes shared by all loaders.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Mutex<HashMap<String, ClassHandle>>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a class. A class previously registered under the same name is replaced
    /// and returned.
    pub fn define(&self, class: ClassHandle) -> Option<ClassHandle> {
        let mut classes = self.classes.lock().unwrap_or_else(PoisonError::into_inner);
        classes.insert(class.name.to_string(), class)
    }

    /// Gets a registered class by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ClassHandle> {
        let classes = self.classes.lock().unwrap_or_else(PoisonError::into_inner);
        classes.get(name).cloned()
    }

    /// Returns the number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no class has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClassResolver for ClassRegistry {
    fn resolve_class(&self, name: &str, _loader: &LoaderContext) -> Result<ClassHandle, LoadError> {
        self.get(name)
            .ok_or_else(|| LoadError::no_class_def_found(name.replace('/', ".")))
    }
}
