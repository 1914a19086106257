//! Property descriptors
//!
//! A descriptor is the reflection metadata for one field of a type: its
//! name, category, kind, placement and attribute flags.

use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Attribute flags carried by a property descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u32 {
        /// Visible and editable in the inspector.
        const EDIT = 1 << 0;
        /// Visible but read-only.
        const EDIT_CONST = 1 << 1;
        /// Object references expand into the referenced object's properties.
        const EDIT_INLINE = 1 << 2;
        /// Inline expansion that additionally offers object selection.
        const EDIT_INLINE_USE = 1 << 3;
        /// Array length cannot be changed from the inspector.
        const EDIT_FIXED_SIZE = 1 << 4;
    }
}

/// Scalar value kinds and their storage encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// One byte, zero or one
    Bool,
    /// Unsigned byte
    Byte,
    /// Signed 32-bit integer
    Int,
    /// 32-bit float
    Float,
}

impl ScalarKind {
    /// Storage size in bytes
    pub const fn size(self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::Byte => 1,
            ScalarKind::Int | ScalarKind::Float => 4,
        }
    }
}

/// Closed set of property kinds
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// A single scalar value
    Scalar(ScalarKind),
    /// An aggregate laid out inline
    Struct {
        /// Name of the struct type in the registry
        type_name: String,
    },
    /// A dynamic array stored as an [`ArrayHeader`](crate::memory::ArrayHeader)
    Array {
        /// Descriptor of one element
        inner: Arc<PropertyDescriptor>,
    },
    /// Pointer to another reflectable object
    Object {
        /// Class every referenced object derives from
        class: String,
    },
    /// Interface pointer; the object address is stored first
    Interface {
        /// Interface class
        class: String,
    },
}

impl PropertyKind {
    /// Whether the value is a reference to another object
    pub fn is_reference(&self) -> bool {
        matches!(self, PropertyKind::Object { .. } | PropertyKind::Interface { .. })
    }

    /// Whether the value is a dynamic array
    pub fn is_dynamic_array(&self) -> bool {
        matches!(self, PropertyKind::Array { .. })
    }

    /// Struct type name, if this is a struct
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            PropertyKind::Struct { type_name } => Some(type_name),
            _ => None,
        }
    }
}

/// Optional metadata attached to a property
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMeta {
    /// Explicit position under script-defined ordering
    pub order_index: Option<i32>,
    /// Children of this property keep script-defined ordering
    pub force_script_order: bool,
    /// Upper bound on how many levels below this property are built
    pub max_depth: Option<u32>,
    /// Expand the whole subtree once it is built
    pub fully_expand: bool,
    /// Free-form help text for the host UI
    pub tooltip: Option<String>,
}

/// Reflection metadata for one field
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Field name
    pub name: String,
    /// Dotted category path, empty when uncategorized
    pub category: String,
    /// Value kind
    pub kind: PropertyKind,
    /// Byte offset from the start of the owning object or struct
    pub offset: usize,
    /// Size of one element in bytes
    pub element_size: usize,
    /// Number of inline elements; greater than one for static arrays
    pub array_dim: usize,
    /// Attribute flags
    pub flags: PropertyFlags,
    /// Metadata
    pub meta: PropertyMeta,
    /// Type that declares this property
    pub owner: String,
}

impl PropertyDescriptor {
    /// Whether this property is a fixed-size inline array
    #[inline]
    pub fn is_static_array(&self) -> bool {
        self.array_dim > 1
    }

    /// Total storage used by the property
    #[inline]
    pub fn total_size(&self) -> usize {
        self.element_size * self.array_dim.max(1)
    }

    /// Whether the property is shown in the inspector
    #[inline]
    pub fn is_editable(&self) -> bool {
        self.flags.contains(PropertyFlags::EDIT)
    }

    /// Whether object references should expand in place
    #[inline]
    pub fn is_edit_inline(&self) -> bool {
        self.kind.is_reference()
            && self
                .flags
                .intersects(PropertyFlags::EDIT_INLINE | PropertyFlags::EDIT_INLINE_USE)
    }

    /// Whether the property is a boolean
    #[inline]
    pub fn is_bool(&self) -> bool {
        self.kind == PropertyKind::Scalar(ScalarKind::Bool)
    }
}
