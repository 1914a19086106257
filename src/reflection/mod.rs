//! Reflection layer
//!
//! This module describes the types the inspector can show and the objects
//! it can bind to:
//! - Property descriptors with a closed [`PropertyKind`] enum
//! - A [`TypeRegistry`] with inheritance and computed layouts
//! - The [`Reflection`] trait hosts implement for runtime type and
//!   archetype lookups
//! - [`ObjectWorld`], an in-process host backed by a [`MemoryArena`](crate::memory::MemoryArena)

use crate::memory::{Address, MemoryWriter};
use std::fmt;
use std::sync::Arc;

mod descriptor;
mod registry;
mod world;

pub use descriptor::{PropertyDescriptor, PropertyFlags, PropertyKind, PropertyMeta, ScalarKind};
pub use registry::{PropertySpec, TypeBuilder, TypeDescriptor, TypeKind, TypeRegistry};
pub use world::ObjectWorld;

/// Opaque reference to a live object instance
///
/// The wrapped value is the instance's start address in host memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(Address);

impl ObjectRef {
    /// Wrap an instance start address
    #[inline]
    pub const fn from_address(address: Address) -> Self {
        Self(address)
    }

    /// Start address of the instance
    #[inline]
    pub const fn address(self) -> Address {
        self.0
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(0x{:X})", self.0)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Runtime type information provided by the host
pub trait Reflection {
    /// All known types
    fn registry(&self) -> &TypeRegistry;

    /// Runtime type of a live object, `None` once it has been destroyed
    fn class_of(&self, object: ObjectRef) -> Option<Arc<TypeDescriptor>>;

    /// The prototype an object was instantiated from
    fn archetype_of(&self, object: ObjectRef) -> Option<ObjectRef>;

    /// Display name of an object
    fn object_name(&self, object: ObjectRef) -> Option<String>;

    /// Find a live object by name
    fn find_object(&self, name: &str) -> Option<ObjectRef>;

    /// Whether an object is still alive
    fn is_live(&self, object: ObjectRef) -> bool {
        self.class_of(object).is_some()
    }
}

/// Everything a property tree needs from its host
pub trait ObjectHost: Reflection + MemoryWriter {}

impl<T: Reflection + MemoryWriter> ObjectHost for T {}
