//! Type registry and layout builder

use super::descriptor::{
    PropertyDescriptor, PropertyFlags, PropertyKind, PropertyMeta, ScalarKind,
};
use crate::memory::ArrayHeader;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Whether a type is a class (instantiable object) or an inline struct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Object class
    Class,
    /// Inline aggregate
    Struct,
}

/// Reflection metadata for one type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Type name
    pub name: String,
    /// Direct super type
    pub super_type: Option<String>,
    /// Class or struct
    pub kind: TypeKind,
    /// Instance size in bytes, including inherited members
    pub size: usize,
    /// Alignment in bytes
    pub align: usize,
    /// Properties declared by this type, in declaration order
    pub properties: Vec<Arc<PropertyDescriptor>>,
    /// Show properties without category grouping
    pub collapse_categories: bool,
    /// Categories never shown for this type
    pub hidden_categories: Vec<String>,
}

/// All known types, keyed by name
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type; names must be unique
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        if self.types.contains_key(&descriptor.name) {
            return Err(Error::DuplicateType(descriptor.name));
        }

        if let Some(parent) = &descriptor.super_type {
            if !self.types.contains_key(parent) {
                return Err(Error::TypeNotFound(parent.clone()));
            }
        }

        let descriptor = Arc::new(descriptor);
        self.types.insert(descriptor.name.clone(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Look up a type by name
    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The type and its super types, most-derived first
    pub fn ancestors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Arc<TypeDescriptor>> + 'a {
        let mut current = self.types.get(name);
        std::iter::from_fn(move || {
            let ty = current?;
            current = ty.super_type.as_deref().and_then(|s| self.types.get(s));
            Some(ty)
        })
    }

    /// Whether `child` is `parent` or derives from it
    pub fn is_child_of(&self, child: &str, parent: &str) -> bool {
        self.ancestors(child).any(|ty| ty.name == parent)
    }

    /// Most-derived type every named type derives from
    pub fn common_base_type<'a, I>(&self, names: I) -> Option<Arc<TypeDescriptor>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names = names.into_iter();
        let first = names.next()?;
        let mut candidate = self.get(first)?;

        for name in names {
            while !self.is_child_of(name, &candidate.name) {
                let parent = candidate.super_type.as_deref()?;
                candidate = self.get(parent)?;
            }
        }

        Some(Arc::clone(candidate))
    }

    /// Every property of a type, inherited properties first
    pub fn all_properties(&self, name: &str) -> Vec<Arc<PropertyDescriptor>> {
        let mut chain: Vec<_> = self.ancestors(name).collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|ty| ty.properties.iter().cloned())
            .collect()
    }

    /// Categories hidden anywhere in a type's inheritance chain
    pub fn hidden_categories(&self, name: &str) -> Vec<String> {
        self.ancestors(name)
            .flat_map(|ty| ty.hidden_categories.iter().cloned())
            .collect()
    }

    /// Whether any type in the chain disables category grouping
    pub fn collapses_categories(&self, name: &str) -> bool {
        self.ancestors(name).any(|ty| ty.collapse_categories)
    }

    fn layout_of(&self, kind: &PropertyKind) -> Result<(usize, usize)> {
        Ok(match kind {
            PropertyKind::Scalar(scalar) => (scalar.size(), scalar.size()),
            PropertyKind::Struct { type_name } => {
                let ty = self
                    .get(type_name)
                    .ok_or_else(|| Error::TypeNotFound(type_name.clone()))?;
                (ty.size, ty.align)
            }
            PropertyKind::Array { .. } => (ArrayHeader::SIZE, 8),
            PropertyKind::Object { .. } => (8, 8),
            PropertyKind::Interface { .. } => (16, 8),
        })
    }
}

#[derive(Debug, Clone)]
enum SpecKind {
    Plain(PropertyKind),
    ArrayOf(PropertyKind),
}

/// Declaration of one property for [`TypeBuilder`]
#[derive(Debug, Clone)]
pub struct PropertySpec {
    name: String,
    kind: SpecKind,
    category: String,
    flags: PropertyFlags,
    dim: usize,
    meta: PropertyMeta,
}

impl PropertySpec {
    /// An editable property of the given kind
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind: SpecKind::Plain(kind),
            category: String::new(),
            flags: PropertyFlags::EDIT,
            dim: 1,
            meta: PropertyMeta::default(),
        }
    }

    /// An editable scalar property
    pub fn scalar(name: impl Into<String>, scalar: ScalarKind) -> Self {
        Self::new(name, PropertyKind::Scalar(scalar))
    }

    /// An editable struct property
    pub fn structure(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Struct { type_name: type_name.into() })
    }

    /// An editable, inline-expanding object reference
    pub fn object(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Object { class: class.into() })
            .flags(PropertyFlags::EDIT | PropertyFlags::EDIT_INLINE)
    }

    /// An editable dynamic array of `element`
    pub fn array(name: impl Into<String>, element: PropertyKind) -> Self {
        Self {
            kind: SpecKind::ArrayOf(element),
            ..Self::new(name, PropertyKind::Scalar(ScalarKind::Byte))
        }
    }

    /// Set the dotted category path
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Replace the attribute flags
    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Make this a static array of `dim` elements
    pub fn dim(mut self, dim: usize) -> Self {
        self.dim = dim.max(1);
        self
    }

    /// Replace the metadata
    pub fn meta(mut self, meta: PropertyMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Set the script-defined order index
    pub fn order(mut self, index: i32) -> Self {
        self.meta.order_index = Some(index);
        self
    }
}

/// Builds a [`TypeDescriptor`] and computes its memory layout
///
/// Members are placed after the super type's storage, each aligned to its
/// natural alignment, in declaration order.
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    name: String,
    kind: TypeKind,
    super_type: Option<String>,
    properties: Vec<PropertySpec>,
    collapse_categories: bool,
    hidden_categories: Vec<String>,
}

impl TypeBuilder {
    /// Start a class
    pub fn class(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Class)
    }

    /// Start a struct
    pub fn structure(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Struct)
    }

    fn with_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            super_type: None,
            properties: Vec::new(),
            collapse_categories: false,
            hidden_categories: Vec::new(),
        }
    }

    /// Derive from an already-registered type
    pub fn extends(mut self, super_type: impl Into<String>) -> Self {
        self.super_type = Some(super_type.into());
        self
    }

    /// Declare a property
    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// Disable category grouping for this type
    pub fn collapse_categories(mut self) -> Self {
        self.collapse_categories = true;
        self
    }

    /// Hide a category for this type and its subclasses
    pub fn hide_category(mut self, category: impl Into<String>) -> Self {
        self.hidden_categories.push(category.into());
        self
    }

    /// Lay out the type and add it to `registry`
    pub fn register(self, registry: &mut TypeRegistry) -> Result<Arc<TypeDescriptor>> {
        let (mut cursor, mut align) = match &self.super_type {
            Some(parent) => {
                let parent = registry
                    .get(parent)
                    .ok_or_else(|| Error::TypeNotFound(parent.clone()))?;
                (parent.size, parent.align)
            }
            None => (0, 1),
        };

        let mut properties = Vec::with_capacity(self.properties.len());
        for spec in self.properties {
            let kind = match spec.kind {
                SpecKind::Plain(kind) => kind,
                SpecKind::ArrayOf(element) => {
                    let (element_size, _) = registry.layout_of(&element)?;
                    let inner = PropertyDescriptor {
                        name: spec.name.clone(),
                        category: spec.category.clone(),
                        kind: element,
                        offset: 0,
                        element_size,
                        array_dim: 1,
                        flags: spec.flags,
                        meta: PropertyMeta::default(),
                        owner: self.name.clone(),
                    };
                    PropertyKind::Array { inner: Arc::new(inner) }
                }
            };

            let (element_size, element_align) = registry.layout_of(&kind)?;
            cursor = align_up(cursor, element_align);
            align = align.max(element_align);

            properties.push(Arc::new(PropertyDescriptor {
                name: spec.name,
                category: spec.category,
                kind,
                offset: cursor,
                element_size,
                array_dim: spec.dim,
                flags: spec.flags,
                meta: spec.meta,
                owner: self.name.clone(),
            }));

            cursor += element_size * spec.dim;
        }

        registry.register(TypeDescriptor {
            name: self.name,
            super_type: self.super_type,
            kind: self.kind,
            size: align_up(cursor.max(1), align),
            align,
            properties,
            collapse_categories: self.collapse_categories,
            hidden_categories: self.hidden_categories,
        })
    }
}

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    let align = align.max(1);
    value.div_ceil(align) * align
}
