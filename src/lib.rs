//! property-inspector: multi-object property inspection trees
//!
//! This library binds a reflection-driven tree of property nodes to one or
//! more live object instances at once, and keeps it consistent as those
//! objects are edited, resized or destroyed behind its back.
//!
//! # Architecture
//!
//! - **Memory Layer**: Safe, address-based access to instance storage
//! - **Reflection Layer**: Type descriptors, layouts and the host interface
//! - **Values**: Equality semantics and text export/import per property kind
//! - **Tree**: Node arena, child construction, address resolution,
//!   multi-object comparison, filtering, favorites and staleness detection
//! - **Persistence**: Expanded-path and favorites stores keyed by type name
//! - **Config**: Inspector options loaded from JSON

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod memory;
pub mod persistence;
pub mod reflection;
pub mod tree;
pub mod value;

// Re-export commonly used types
pub use config::InspectorConfig;
pub use memory::{Address, MemoryReader, MemoryWriter};
pub use persistence::{JsonFileLayoutStore, LayoutStore, MemoryLayoutStore};
pub use reflection::{ObjectHost, ObjectRef, ObjectWorld, Reflection};
pub use tree::{EditorContext, NodeId, PropertyTree};

/// Result type used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the inspector
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Memory access error
    #[error("Memory error: {0}")]
    Memory(#[from] memory::MemoryError),

    /// A node's value could not be located for one of the bound instances
    #[error("Failed to resolve address of '{path}' for instance {instance}")]
    AddressResolution {
        /// Qualified path of the node
        path: String,
        /// The instance that failed to resolve
        instance: ObjectRef,
    },

    /// The operation requires exactly one bound instance
    #[error("Operation requires a single selection, {count} objects are bound")]
    MultipleSelection {
        /// Number of bound instances
        count: usize,
    },

    /// No instances are bound above the node
    #[error("No objects are bound")]
    NoInstances,

    /// Bound instances disagree on an array's length
    #[error("Array '{0}' has different lengths across the bound objects")]
    ArrayShapeMismatch(String),

    /// The node is read-only
    #[error("Property '{0}' is read-only")]
    EditConst(String),

    /// The node is not a dynamic array or array element
    #[error("Property '{0}' is not a dynamic array")]
    NotAnArray(String),

    /// The array's length cannot be edited
    #[error("Array '{0}' has a fixed size")]
    FixedSizeArray(String),

    /// An array element index is past the array's length
    #[error("Index {index} is out of bounds for '{path}' with {len} elements")]
    IndexOutOfBounds {
        /// Qualified path of the array
        path: String,
        /// The rejected index
        index: usize,
        /// Current length
        len: usize,
    },

    /// The node is not, or cannot be, a favorite
    #[error("'{0}' is not a favorite")]
    NotAFavorite(String),

    /// The node id does not refer to a live node
    #[error("Node no longer exists")]
    InvalidNode,

    /// Text could not be imported into a property
    #[error("Cannot import '{text}': {reason}")]
    ValueImport {
        /// The rejected text
        text: String,
        /// Why it was rejected
        reason: String,
    },

    /// A referenced type is not registered
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// A type name was registered twice
    #[error("Type already registered: {0}")]
    DuplicateType(String),

    /// A property path does not exist on a type
    #[error("Property path '{path}' not found on {type_name}")]
    PropertyNotFound {
        /// Type the path was resolved against
        type_name: String,
        /// The path
        path: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging for the library
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("property_inspector=info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
