//! Property nodes and the arena that owns them

use crate::reflection::{ObjectRef, PropertyDescriptor, TypeDescriptor};
use std::sync::Arc;

/// Stable handle to a node in one tree
///
/// Ids are generation-checked: once a node is destroyed its id never
/// resolves again, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Object-root payload: the instances edited together
#[derive(Debug, Clone, Default)]
pub struct ObjectNode {
    pub(crate) instances: Vec<ObjectRef>,
    pub(crate) base_type: Option<Arc<TypeDescriptor>>,
}

impl ObjectNode {
    /// Bound instances
    pub fn instances(&self) -> &[ObjectRef] {
        &self.instances
    }

    /// Most-derived type shared by every instance
    pub fn base_type(&self) -> Option<&Arc<TypeDescriptor>> {
        self.base_type.as_ref()
    }
}

/// How an item node relates to its parent's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    /// A field of an object or struct
    Member,
    /// One slot of a fixed-size inline array
    StaticElement,
    /// One element of a dynamic array
    DynamicElement,
}

/// Node variants
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Binds a set of instances; transparent in the visible list
    Object(ObjectNode),
    /// Groups properties under a dotted category path
    Category {
        /// Full dotted path of the category
        name: String,
    },
    /// A property value
    Item(ItemRole),
}

/// Why a node stopped producing children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// The referenced object is already bound by an ancestor
    CircularReference,
    /// The remaining child depth reached zero
    DepthExhausted,
}

/// Expansion-related node state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionState {
    /// Children are shown
    pub expanded: bool,
    /// The node can have children
    pub expandable: bool,
    /// Children are only built on first expansion
    pub on_demand: bool,
    /// The node has been expanded at least once
    pub ever_expanded: bool,
    /// Children have been built for the current data
    pub materialized: bool,
    /// Set when child construction was cut short
    pub truncation: Option<Truncation>,
}

/// Visibility flags recomputed by every filter pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityState {
    /// Currently shown
    pub seen: bool,
    /// The node itself passed the filter
    pub seen_due_to_filter: bool,
    /// A descendant passed the filter
    pub seen_due_to_child_filter: bool,
    /// The filter lets this node open normally below its parent
    pub parent_seen_due_to_filter: bool,
    /// A descendant is a favorite
    pub seen_due_to_child_favorite: bool,
}

/// How a node orders its children
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildOrdering {
    /// Children are sorted at all
    pub sort_children: bool,
    /// Sort by declared order index instead of by name
    pub force_script_order: bool,
}

/// Favorite marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FavoriteState {
    /// The node is a favorite
    pub favorite: bool,
    /// Position in the favorites view; meaningful only for favorites
    pub sort_index: Option<u32>,
}

/// What the staleness scan expects of a node's children
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpectedChildShape {
    /// Nothing that can drift from live data
    #[default]
    Fixed,
    /// One child per live element of a dynamic array
    ArrayElements,
    /// Children exactly when the reference is non-null
    ObjectReference,
}

/// One node of a property tree
#[derive(Debug, Clone)]
pub struct PropertyNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) property: Option<Arc<PropertyDescriptor>>,
    pub(crate) offset: usize,
    pub(crate) array_index: Option<usize>,
    pub(crate) display_name: String,
    pub(crate) order_index: Option<i32>,
    pub(crate) depth_remaining: Option<u32>,
    pub(crate) edit_const: bool,
    pub(crate) expansion: ExpansionState,
    pub(crate) visibility: VisibilityState,
    pub(crate) ordering: ChildOrdering,
    pub(crate) favorite: FavoriteState,
    pub(crate) shape: ExpectedChildShape,
}

impl PropertyNode {
    pub(crate) fn new(parent: Option<NodeId>, kind: NodeKind) -> Self {
        Self {
            parent,
            children: Vec::new(),
            kind,
            property: None,
            offset: 0,
            array_index: None,
            display_name: String::new(),
            order_index: None,
            depth_remaining: None,
            edit_const: false,
            expansion: ExpansionState::default(),
            visibility: VisibilityState::default(),
            ordering: ChildOrdering::default(),
            favorite: FavoriteState::default(),
            shape: ExpectedChildShape::default(),
        }
    }

    pub(crate) fn item(
        parent: NodeId,
        role: ItemRole,
        property: Arc<PropertyDescriptor>,
        offset: usize,
        array_index: Option<usize>,
    ) -> Self {
        let order_index = property.meta.order_index;
        Self {
            property: Some(property),
            offset,
            array_index,
            order_index,
            ..Self::new(Some(parent), NodeKind::Item(role))
        }
    }

    /// Enclosing node, `None` at the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in display order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Node variant
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Property descriptor; absent for object roots and categories
    pub fn property(&self) -> Option<&Arc<PropertyDescriptor>> {
        self.property.as_ref()
    }

    /// Byte offset from the parent's value address
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Element index for array elements
    pub fn array_index(&self) -> Option<usize> {
        self.array_index
    }

    /// Human-readable name
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Remaining levels of children that may be built
    pub fn depth_remaining(&self) -> Option<u32> {
        self.depth_remaining
    }

    /// Expansion state
    pub fn expansion(&self) -> ExpansionState {
        self.expansion
    }

    /// Visibility state from the last filter pass
    pub fn visibility(&self) -> VisibilityState {
        self.visibility
    }

    /// Child ordering
    pub fn ordering(&self) -> ChildOrdering {
        self.ordering
    }

    /// Favorite marker
    pub fn favorite(&self) -> FavoriteState {
        self.favorite
    }

    /// Shape the staleness scan checks
    pub fn expected_shape(&self) -> ExpectedChildShape {
        self.shape
    }

    /// Children are shown
    pub fn is_expanded(&self) -> bool {
        self.expansion.expanded
    }

    /// The node can have children
    pub fn is_expandable(&self) -> bool {
        self.expansion.expandable
    }

    /// Currently shown
    pub fn is_seen(&self) -> bool {
        self.visibility.seen
    }

    /// Marked as a favorite
    pub fn is_favorite(&self) -> bool {
        self.favorite.favorite
    }

    /// Read-only
    pub fn is_edit_const(&self) -> bool {
        self.edit_const
    }

    /// Object-root payload, if this is an object root
    pub fn as_object(&self) -> Option<&ObjectNode> {
        match &self.kind {
            NodeKind::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Whether this is an object root
    pub fn is_object(&self) -> bool {
        matches!(self.kind, NodeKind::Object(_))
    }

    /// Whether this node stands for a whole static array rather than one slot
    pub fn is_static_array_header(&self) -> bool {
        self.array_index.is_none()
            && self.property.as_ref().is_some_and(|p| p.is_static_array())
    }

    /// Whether the node's value is a dynamic array header
    pub fn is_dynamic_array(&self) -> bool {
        !self.is_static_array_header()
            && self.property.as_ref().is_some_and(|p| p.kind.is_dynamic_array())
    }

    /// Elements compared or copied for this node's value
    pub(crate) fn value_count(&self) -> usize {
        match &self.property {
            Some(p) if self.is_static_array_header() => p.array_dim,
            _ => 1,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<PropertyNode>,
}

/// Generation-checked node storage
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl NodeArena {
    pub(crate) fn insert(&mut self, node: PropertyNode) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId { index, generation: slot.generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, node: Some(node) });
                NodeId { index, generation: 0 }
            }
        }
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<PropertyNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&PropertyNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut PropertyNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_ids_do_not_resolve() {
        let mut arena = NodeArena::default();
        let first = arena.insert(PropertyNode::new(None, NodeKind::Item(ItemRole::Member)));

        assert!(arena.remove(first).is_some());
        assert!(arena.get(first).is_none());

        let second = arena.insert(PropertyNode::new(None, NodeKind::Item(ItemRole::Member)));
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert!(arena.get(second).is_some());
        assert!(arena.remove(first).is_none());
        assert_eq!(arena.len(), 1);
    }
}
